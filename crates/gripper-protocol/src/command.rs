//! 夹爪指令定义
//!
//! `GripperCommand` 描述一次高层意图（张开、闭合、抓取、移动到宽度、回零、停止），
//! 提交后由 Sequencer 独占持有，不再修改。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认手指速度（m/s）
pub const DEFAULT_SPEED: f64 = 0.1;

/// 默认宽度容差（m）
pub const DEFAULT_EPSILON: f64 = 0.005;

/// 默认指令超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// 指令类型
///
/// 状态机根据此标签决定成功条件：
/// - 宽度类（`Open`/`Close`/`MoveTo`/`Homing`）：停止运动且宽度落在容差带内
/// - `Grasp`：停止运动且夹持力达到阈值
/// - `Stop`：停止运动即成功
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// 张开到最大宽度
    Open,
    /// 闭合到最小宽度（按宽度判定，不按力判定）
    Close,
    /// 以指定力抓取
    Grasp,
    /// 移动到指定宽度
    MoveTo,
    /// 回零：完整开合一次并重新估计最大行程
    Homing,
    /// 安全停止，总是抢占
    Stop,
}

impl CommandKind {
    /// 是否为抢占型指令（仅 `Stop`）
    pub fn is_preemptive(self) -> bool {
        self == Self::Stop
    }

    /// 是否携带宽度目标
    pub fn has_width_target(self) -> bool {
        matches!(self, Self::Open | Self::Close | Self::Grasp | Self::MoveTo)
    }

    /// 是否会驱动手指运动（需要速度参数）
    pub fn is_motion(self) -> bool {
        !matches!(self, Self::Stop)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Grasp => "grasp",
            Self::MoveTo => "move_to",
            Self::Homing => "homing",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// 宽度容差带
///
/// 成功区间为 `[target - inner, target + outer]`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Epsilon {
    /// 向内（更窄）方向的容差
    pub inner: f64,
    /// 向外（更宽）方向的容差
    pub outer: f64,
}

impl Epsilon {
    pub const fn new(inner: f64, outer: f64) -> Self {
        Self { inner, outer }
    }

    /// 对称容差
    pub const fn symmetric(epsilon: f64) -> Self {
        Self::new(epsilon, epsilon)
    }

    /// 判断宽度是否落在目标的容差带内
    pub fn contains(&self, target: f64, width: f64) -> bool {
        width >= target - self.inner && width <= target + self.outer
    }
}

impl Default for Epsilon {
    fn default() -> Self {
        Self::symmetric(DEFAULT_EPSILON)
    }
}

/// 高层夹爪指令
///
/// 使用构造函数加 `with_*` 链式方法创建，字段只读。
///
/// # 示例
///
/// ```rust
/// use gripper_protocol::{CommandKind, Epsilon, GripperCommand};
/// use std::time::Duration;
///
/// let cmd = GripperCommand::grasp(0.02, 30.0)
///     .with_epsilon(Epsilon::new(0.005, 0.01))
///     .with_timeout(Duration::from_secs(3));
///
/// assert_eq!(cmd.kind(), CommandKind::Grasp);
/// assert_eq!(cmd.target_force(), 30.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GripperCommand {
    kind: CommandKind,
    target_width: f64,
    target_force: f64,
    epsilon: Epsilon,
    speed: f64,
    timeout: Duration,
}

impl GripperCommand {
    fn new(kind: CommandKind, target_width: f64, target_force: f64) -> Self {
        Self {
            kind,
            target_width,
            target_force,
            epsilon: Epsilon::default(),
            speed: DEFAULT_SPEED,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// 张开到 `width`（通常为标定的最大宽度）
    pub fn open(width: f64) -> Self {
        Self::new(CommandKind::Open, width, 0.0)
    }

    /// 闭合到 `width`（通常为标定的最小宽度）
    pub fn close(width: f64) -> Self {
        Self::new(CommandKind::Close, width, 0.0)
    }

    /// 移动到指定宽度
    pub fn move_to(width: f64) -> Self {
        Self::new(CommandKind::MoveTo, width, 0.0)
    }

    /// 以 `force` 抓取宽度约为 `width` 的物体
    pub fn grasp(width: f64, force: f64) -> Self {
        Self::new(CommandKind::Grasp, width, force)
    }

    /// 回零
    pub fn homing() -> Self {
        Self::new(CommandKind::Homing, 0.0, 0.0)
    }

    /// 停止
    pub fn stop() -> Self {
        Self::new(CommandKind::Stop, 0.0, 0.0)
    }

    pub fn with_epsilon(mut self, epsilon: Epsilon) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_force(mut self, force: f64) -> Self {
        self.target_force = force;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn target_width(&self) -> f64 {
        self.target_width
    }

    pub fn target_force(&self) -> f64 {
        self.target_force
    }

    pub fn epsilon(&self) -> Epsilon {
        self.epsilon
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 转换为下发给执行器链路的目标
    pub fn link_target(&self) -> LinkTarget {
        match self.kind {
            CommandKind::Open | CommandKind::Close | CommandKind::MoveTo => LinkTarget::Move {
                width: self.target_width,
                speed: self.speed,
            },
            CommandKind::Grasp => LinkTarget::Grasp {
                width: self.target_width,
                speed: self.speed,
                force: self.target_force,
            },
            CommandKind::Homing => LinkTarget::Homing { speed: self.speed },
            CommandKind::Stop => LinkTarget::Stop,
        }
    }
}

/// 执行器链路目标（低层指令）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkTarget {
    /// 以恒定速度移动到宽度
    Move { width: f64, speed: f64 },
    /// 向 `width` 闭合，接触后以 `force` 夹持
    Grasp { width: f64, speed: f64, force: f64 },
    /// 回零
    Homing { speed: f64 },
    /// 立即停止
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_contains() {
        let eps = Epsilon::new(0.001, 0.002);
        assert!(eps.contains(0.04, 0.04));
        assert!(eps.contains(0.04, 0.039));
        assert!(eps.contains(0.04, 0.042));
        assert!(!eps.contains(0.04, 0.0385));
        assert!(!eps.contains(0.04, 0.0425));
    }

    #[test]
    fn test_link_target_mapping() {
        let cmd = GripperCommand::move_to(0.03).with_speed(0.05);
        assert_eq!(
            cmd.link_target(),
            LinkTarget::Move {
                width: 0.03,
                speed: 0.05
            }
        );

        let cmd = GripperCommand::grasp(0.01, 20.0);
        assert!(matches!(cmd.link_target(), LinkTarget::Grasp { force, .. } if force == 20.0));

        assert_eq!(GripperCommand::stop().link_target(), LinkTarget::Stop);
        assert!(matches!(
            GripperCommand::homing().link_target(),
            LinkTarget::Homing { .. }
        ));
    }

    #[test]
    fn test_kind_flags() {
        assert!(CommandKind::Stop.is_preemptive());
        assert!(!CommandKind::Grasp.is_preemptive());
        assert!(!CommandKind::Stop.is_motion());
        assert!(!CommandKind::Homing.has_width_target());
        assert!(CommandKind::Close.has_width_target());
        assert_eq!(CommandKind::MoveTo.to_string(), "move_to");
    }

    #[test]
    fn test_defaults() {
        let cmd = GripperCommand::open(0.08);
        assert_eq!(cmd.speed(), DEFAULT_SPEED);
        assert_eq!(cmd.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(cmd.epsilon(), Epsilon::default());
        assert_eq!(cmd.target_force(), 0.0);
    }

    #[test]
    fn test_link_target_json_shape() {
        let json = serde_json::to_string(&LinkTarget::Stop).unwrap();
        assert_eq!(json, r#"{"type":"stop"}"#);
    }
}
