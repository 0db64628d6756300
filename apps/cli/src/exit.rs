//! 退出码

use gripper_client::{CommandOutcome, FailureReason};
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success = 0,
    Failed = 1,
    TimedOut = 2,
    Rejected = 3,
    Setup = 4,
}

impl Exit {
    pub fn from_outcome(outcome: &CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Succeeded(_) => Self::Success,
            // 下发时按最新限制重新校验失败，同样算拒绝
            CommandOutcome::Failed(FailureReason::Rejected(_)) => Self::Rejected,
            CommandOutcome::Failed(_) => Self::Failed,
            CommandOutcome::TimedOut => Self::TimedOut,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}
