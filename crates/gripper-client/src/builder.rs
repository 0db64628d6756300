//! Builder 模式实现
//!
//! 提供链式构造 `GripperClient` 实例的便捷方式。

use crate::client::GripperClient;
use crate::error::ClientError;
use gripper_config::GripperConfig;
use gripper_driver::{Sequencer, SequencerConfig};
use gripper_link::{ActuatorLink, SimConfig, SimulatedGripper, TcpLink};
use std::time::Duration;
use tracing::info;

/// 链路选择
enum LinkChoice {
    /// 连接链路服务（地址为空时使用配置中的地址）
    Tcp(Option<String>),
    /// 进程内仿真夹爪
    Simulated(SimConfig),
    /// 调用方提供的链路
    Custom(Box<dyn ActuatorLink>),
}

/// Gripper Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use gripper_client::{GripperBuilder, SimConfig};
///
/// // 连接配置文件中的地址
/// let client = GripperBuilder::new().build().unwrap();
///
/// // 仿真夹爪（无硬件）
/// let client = GripperBuilder::new()
///     .simulated(SimConfig::default())
///     .build()
///     .unwrap();
/// ```
pub struct GripperBuilder {
    config: GripperConfig,
    link: LinkChoice,
    feedback_timeout: Duration,
}

impl GripperBuilder {
    /// 创建新的 Builder（默认配置，TCP 链路）
    pub fn new() -> Self {
        Self {
            config: GripperConfig::default(),
            link: LinkChoice::Tcp(None),
            feedback_timeout: Duration::from_secs(1),
        }
    }

    /// 使用指定配置
    pub fn config(mut self, config: GripperConfig) -> Self {
        self.config = config;
        self
    }

    /// 链路服务地址（覆盖配置中的 `connection.address`）
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.link = LinkChoice::Tcp(Some(address.into()));
        self
    }

    /// 使用进程内仿真夹爪
    pub fn simulated(mut self, sim: SimConfig) -> Self {
        self.link = LinkChoice::Simulated(sim);
        self
    }

    /// 使用自定义链路
    pub fn link(mut self, link: impl ActuatorLink + 'static) -> Self {
        self.link = LinkChoice::Custom(Box::new(link));
        self
    }

    /// 等待第一条反馈的时间（默认 1s）
    pub fn feedback_timeout(mut self, timeout: Duration) -> Self {
        self.feedback_timeout = timeout;
        self
    }

    /// 构建客户端
    ///
    /// 建立链路、启动 Sequencer，并等待第一条反馈确认夹爪在线。
    ///
    /// # Errors
    /// - `ClientError::Config`: 配置不自洽
    /// - `ClientError::Link`: 无法连接链路服务
    /// - `ClientError::NoFeedback`: 超时未收到反馈
    pub fn build(self) -> Result<GripperClient, ClientError> {
        self.config.validate()?;

        let link: Box<dyn ActuatorLink> = match self.link {
            LinkChoice::Tcp(address) => {
                let address = address.unwrap_or_else(|| self.config.connection.address.clone());
                let link = TcpLink::connect(&address, self.config.connection.io_timeout())?;
                info!("Connected to gripper link at {}", link.peer_addr());
                Box::new(link)
            },
            LinkChoice::Simulated(sim) => {
                info!("Using simulated gripper");
                Box::new(SimulatedGripper::new(sim))
            },
            LinkChoice::Custom(link) => link,
        };

        let settings = &self.config.sequencer;
        let sequencer = Sequencer::new(
            link,
            self.config.limits,
            SequencerConfig {
                policy: settings.policy,
                max_queue_len: settings.max_queue_len,
                poll_interval: settings.poll_interval(),
                cancel_timeout: settings.cancel_timeout(),
            },
        );

        sequencer
            .wait_for_feedback(self.feedback_timeout)
            .map_err(|_| ClientError::NoFeedback(self.feedback_timeout))?;

        Ok(GripperClient::new(sequencer, self.config.defaults))
    }
}

impl Default for GripperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
