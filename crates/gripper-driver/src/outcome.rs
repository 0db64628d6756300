//! 指令标识与终态

use gripper_link::LinkError;
use gripper_protocol::{GripperState, ValidationError};
use std::fmt;

/// 指令标识（由 Sequencer 分配，单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// 启动时按当前限制校验失败（限制可能在排队期间被回零更新）
    Rejected(ValidationError),
    /// 链路错误
    Link(LinkError),
    /// 执行器报告故障
    Fault(String),
    /// 被调用方取消
    Cancelled,
    /// 被 Stop 抢占
    Preempted,
    /// Sequencer 关闭
    Shutdown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(e) => write!(f, "rejected: {}", e),
            Self::Link(e) => write!(f, "link error: {}", e),
            Self::Fault(msg) => write!(f, "gripper fault: {}", msg),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Preempted => f.write_str("preempted by stop"),
            Self::Shutdown => f.write_str("sequencer shut down"),
        }
    }
}

/// 指令终态
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// 成功，附带判定成功时的反馈
    Succeeded(GripperState),
    /// 失败
    Failed(FailureReason),
    /// 超时
    TimedOut,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded(state) => write!(f, "succeeded at width {:.4} m", state.width),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// 调用方可见的指令状态
#[derive(Debug, Clone, PartialEq)]
pub enum CommandStatus {
    /// 排队中
    Queued,
    /// 正在执行
    Moving,
    /// 已请求停止，等待链路确认
    Cancelling,
    /// 已结束
    Finished(CommandOutcome),
}

impl CommandStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CommandId(7).to_string(), "#7");
        assert_eq!(
            CommandOutcome::Failed(FailureReason::Cancelled).to_string(),
            "failed: cancelled"
        );
        assert_eq!(CommandOutcome::TimedOut.to_string(), "timed out");
        assert!(
            CommandOutcome::Failed(FailureReason::Link(LinkError::Disconnected))
                .to_string()
                .contains("Link disconnected")
        );
    }

    #[test]
    fn test_is_success() {
        assert!(CommandOutcome::Succeeded(GripperState::default()).is_success());
        assert!(!CommandOutcome::TimedOut.is_success());
        assert!(CommandStatus::Finished(CommandOutcome::TimedOut).is_finished());
        assert!(!CommandStatus::Queued.is_finished());
    }
}
