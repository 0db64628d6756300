//! 客户端错误类型

use gripper_config::ConfigError;
use gripper_driver::DriverError;
use gripper_link::LinkError;
use std::time::Duration;
use thiserror::Error;

/// 建立客户端时的错误
///
/// 指令执行期间的错误通过 `DriverError` 和 `CommandOutcome` 上报。
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to connect to gripper: {0}")]
    Link(#[from] LinkError),

    #[error("No feedback from gripper within {0:?}")]
    NoFeedback(Duration),

    #[error(transparent)]
    Driver(#[from] DriverError),
}
