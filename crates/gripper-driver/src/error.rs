//! 驱动层错误类型定义

use crate::outcome::CommandId;
use gripper_link::LinkError;
use gripper_protocol::ValidationError;
use thiserror::Error;

/// 驱动层错误类型
///
/// 仅用于提交/取消时的同步错误；链路错误和超时作为指令终态异步上报。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// 指令校验失败
    #[error("Command rejected: {0}")]
    Validation(#[from] ValidationError),

    /// 已有活动指令（拒绝策略）
    #[error("Gripper busy: command {active} is active")]
    Busy { active: CommandId },

    /// 排队已满（排队策略）
    #[error("Command queue full (capacity: {capacity})")]
    QueueFull { capacity: usize },

    /// 指令不存在或已结束
    #[error("Unknown or finished command: {0}")]
    UnknownCommand(CommandId),

    /// Sequencer 工作线程已退出
    #[error("Sequencer channel closed")]
    ChannelClosed,

    /// 等待反馈超时
    #[error("Operation timeout")]
    Timeout,

    /// 链路错误（建立连接时）
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl DriverError {
    /// 是否属于"被拒绝"类错误（校验失败或忙碌）
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Busy { .. } | Self::QueueFull { .. }
        )
    }
}
