//! TCP 链路报文
//!
//! 每条报文是一行 JSON（以 `\n` 结尾）。
//!
//! 连接建立后服务端先发送一行问候：`ready` 表示可以开始请求，`busy` 表示夹爪已被另一个
//! 客户端占用（随后关闭连接）。之后客户端每发送一个请求，服务端恰好回复一个带相同 `id`
//! 的响应：
//!
//! ```text
//!                                                                          <- {"reply":"ready"}
//! {"op":"command","id":1,"target":{"type":"move","width":0.04,"speed":0.1}} -> {"reply":"ack","id":1}
//! {"op":"poll","id":2}                                                       -> {"reply":"state","id":2,"state":{...}}
//! ```
//!
//! 客户端丢弃 `id` 与当前请求不符的响应（例如上一个请求超时后才到达的回复）。

use crate::command::LinkTarget;
use crate::state::GripperState;
use serde::{Deserialize, Serialize};

/// 无法解析的请求对应的响应 id
pub const UNKNOWN_REQUEST_ID: u64 = 0;

/// 客户端请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireRequest {
    /// 下发链路目标
    Command { id: u64, target: LinkTarget },
    /// 读取最新状态
    Poll { id: u64 },
}

impl WireRequest {
    pub fn id(&self) -> u64 {
        match self {
            WireRequest::Command { id, .. } | WireRequest::Poll { id } => *id,
        }
    }
}

/// 服务端报文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum WireResponse {
    /// 问候：连接可用
    Ready,
    /// 问候：夹爪已被占用
    Busy { holder: String },
    /// 指令已接受
    Ack { id: u64 },
    /// 状态快照
    State { id: u64, state: GripperState },
    /// 请求失败
    Error { id: u64, message: String },
}

impl WireResponse {
    /// 对应的请求 id（问候报文没有 id）
    pub fn id(&self) -> Option<u64> {
        match self {
            WireResponse::Ready | WireResponse::Busy { .. } => None,
            WireResponse::Ack { id }
            | WireResponse::State { id, .. }
            | WireResponse::Error { id, .. } => Some(*id),
        }
    }
}
