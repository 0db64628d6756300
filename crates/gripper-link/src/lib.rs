//! # Gripper Actuator Link
//!
//! 执行器链路抽象层，对上提供统一的 `send`/`poll` 接口。
//!
//! - [`SimulatedGripper`]：运动学仿真夹爪（无硬件）
//! - [`TcpLink`]：连接到正在运行的夹爪服务（换行分隔 JSON）
//! - [`LinkServer`]：把任意 `ActuatorLink` 通过 TCP 暴露给一个客户端（独占）

use std::io;
use thiserror::Error;

pub use gripper_protocol::{GripperState, LinkTarget};

pub mod sim;
pub use sim::{SimConfig, SimControl, SimulatedGripper};

#[cfg(feature = "tcp")]
pub mod tcp;
#[cfg(feature = "tcp")]
pub use tcp::{LinkServer, LinkServerHandle, TcpLink};

/// 链路层统一错误类型
///
/// 实现 `Clone`，以便作为指令终态原因分发给多个等待者。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("IO error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },
    #[error("Link timeout")]
    Timeout,
    #[error("Link disconnected")]
    Disconnected,
    #[error("Gripper unreachable: {0}")]
    Unreachable(String),
    #[error("Gripper in use by another client ({0})")]
    InUse(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Remote error: {0}")]
    Remote(String),
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => LinkError::Disconnected,
            kind => LinkError::Io {
                kind,
                message: e.to_string(),
            },
        }
    }
}

/// 执行器链路
///
/// 由 Sequencer 的工作线程独占持有，因此只要求 `Send`。
///
/// # 约定
///
/// - `send()` 只负责下发，不等待运动完成
/// - `poll()` 返回最新状态；每次成功返回的 `sequence` 严格递增
/// - 传输不可达时返回 `LinkError`，调用方必须把它作为指令失败上报
pub trait ActuatorLink: Send {
    /// 下发目标
    fn send(&mut self, target: LinkTarget) -> Result<(), LinkError>;

    /// 读取最新状态
    fn poll(&mut self) -> Result<GripperState, LinkError>;

    /// 请求立即停止
    fn stop(&mut self) -> Result<(), LinkError> {
        self.send(LinkTarget::Stop)
    }
}

impl<L: ActuatorLink + ?Sized> ActuatorLink for Box<L> {
    fn send(&mut self, target: LinkTarget) -> Result<(), LinkError> {
        (**self).send(target)
    }

    fn poll(&mut self) -> Result<GripperState, LinkError> {
        (**self).poll()
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        (**self).stop()
    }
}
