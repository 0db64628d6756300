//! # 配置文件
//!
//! 夹爪标定限制、指令默认值、Sequencer 设置和链路地址。
//!
//! 配置文件路径：
//! - Linux: `~/.config/gripper-manager/config.toml`
//! - macOS: `~/Library/Application Support/gripper-manager/config.toml`
//! - Windows: `%APPDATA%\gripper-manager\config.toml`
//!
//! 所有字段都有默认值，文件中只需写出要覆盖的部分：
//!
//! ```toml
//! [limits]
//! max_width = 0.08
//!
//! [sequencer]
//! policy = "reject"
//! ```

use gripper_protocol::{BusyPolicy, Epsilon, GripperLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 配置目录名
pub const CONFIG_DIR_NAME: &str = "gripper-manager";
/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Cannot determine the user config directory")]
    NoConfigDir,
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConfig {
    /// 标定限制
    pub limits: GripperLimits,

    /// 指令默认值
    pub defaults: CommandDefaults,

    /// Sequencer 设置
    pub sequencer: SequencerSettings,

    /// 链路设置
    pub connection: ConnectionSettings,
}

/// 指令默认值（调用方未指定时使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDefaults {
    /// 手指速度（m/s）
    pub speed: f64,
    /// 抓取力（N）
    pub force: f64,
    /// 内侧容差（m）
    pub epsilon_inner: f64,
    /// 外侧容差（m）
    pub epsilon_outer: f64,
    /// 指令超时（ms）
    pub timeout_ms: u64,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            speed: 0.1,
            force: 40.0,
            epsilon_inner: 0.005,
            epsilon_outer: 0.005,
            timeout_ms: 5000,
        }
    }
}

impl CommandDefaults {
    pub fn epsilon(&self) -> Epsilon {
        Epsilon::new(self.epsilon_inner, self.epsilon_outer)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sequencer 设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    /// 忙碌策略：`"queue"` 或 `"reject"`
    pub policy: BusyPolicy,
    /// 排队上限
    pub max_queue_len: usize,
    /// 链路轮询周期（ms）
    pub poll_interval_ms: u64,
    /// 取消确认超时（ms）
    pub cancel_timeout_ms: u64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            policy: BusyPolicy::Queue,
            max_queue_len: 8,
            poll_interval_ms: 5,
            cancel_timeout_ms: 1000,
        }
    }
}

impl SequencerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

/// 链路设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// 链路服务地址（`host:port`）
    pub address: String,
    /// 单次请求的读写超时（ms）
    pub io_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:18890".to_string(),
            io_timeout_ms: 500,
        }
    }
}

impl ConnectionSettings {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl GripperConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR_NAME);
        path.push(CONFIG_FILE_NAME);
        Ok(path)
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML 文本
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 从文件加载；文件不存在时返回默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// 按命令行约定查找配置
    ///
    /// - 显式给出的路径必须存在
    /// - 否则读取 [`default_path`](Self::default_path)，文件不存在或没有配置目录时使用默认配置
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve_with(explicit, Self::default_path())
    }

    fn resolve_with(
        explicit: Option<&Path>,
        default_path: Result<PathBuf, ConfigError>,
    ) -> Result<Self, ConfigError> {
        match (explicit, default_path) {
            (Some(path), _) => Self::load_from_file(path),
            (None, Ok(path)) => Self::load_or_default(path),
            (None, Err(e)) => {
                debug!("{}, using defaults", e);
                Ok(Self::default())
            },
        }
    }

    /// 保存配置到文件（自动创建父目录）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_toml_string()?).map_err(io_err)?;
        Ok(())
    }

    /// 校验配置自洽
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.limits;
        let finite = [
            l.min_width,
            l.max_width,
            l.max_force,
            l.max_speed,
            l.grasp_force_ratio,
            self.defaults.speed,
            self.defaults.force,
            self.defaults.epsilon_inner,
            self.defaults.epsilon_outer,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid("values must be finite".to_string()));
        }

        if l.min_width < 0.0 || l.min_width >= l.max_width {
            return Err(ConfigError::Invalid(format!(
                "limits.min_width ({}) must be >= 0 and below limits.max_width ({})",
                l.min_width, l.max_width
            )));
        }
        if l.max_force <= 0.0 || l.max_speed <= 0.0 {
            return Err(ConfigError::Invalid(
                "limits.max_force and limits.max_speed must be positive".to_string(),
            ));
        }
        if !(l.grasp_force_ratio > 0.0 && l.grasp_force_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "limits.grasp_force_ratio ({}) must be in (0, 1]",
                l.grasp_force_ratio
            )));
        }

        let d = &self.defaults;
        if d.speed <= 0.0 || d.speed > l.max_speed {
            return Err(ConfigError::Invalid(format!(
                "defaults.speed ({}) must be in (0, {}]",
                d.speed, l.max_speed
            )));
        }
        if d.force < 0.0 || d.force > l.max_force {
            return Err(ConfigError::Invalid(format!(
                "defaults.force ({}) must be in [0, {}]",
                d.force, l.max_force
            )));
        }
        if d.epsilon_inner < 0.0 || d.epsilon_outer < 0.0 {
            return Err(ConfigError::Invalid(
                "defaults.epsilon_inner/epsilon_outer must be non-negative".to_string(),
            ));
        }
        if d.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "defaults.timeout_ms must be positive".to_string(),
            ));
        }

        let s = &self.sequencer;
        if s.poll_interval_ms == 0 || s.cancel_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sequencer.poll_interval_ms and sequencer.cancel_timeout_ms must be positive"
                    .to_string(),
            ));
        }

        if self.connection.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "connection.address must not be empty".to_string(),
            ));
        }
        if self.connection.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connection.io_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
