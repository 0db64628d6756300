//! 遥测接口
//!
//! Sequencer 工作线程在状态变化和指令生命周期事件时调用已注册的 sink。
//!
//! # 性能要求
//!
//! sink 在工作线程上同步执行，必须非阻塞：
//! 推荐像 [`ChannelSink`] 一样用 `try_send` 把数据转交给其它线程处理。
//!
//! sink 中的 panic 会被隔离并记录日志，不会中断工作线程。
//!
//! # 使用示例
//!
//! ```rust
//! use gripper_driver::telemetry::{ChannelSink, SinkRegistry, TelemetrySink};
//! use gripper_protocol::GripperState;
//! use std::sync::Arc;
//!
//! let mut sinks = SinkRegistry::new();
//! let (sink, rx) = ChannelSink::new(64);
//! sinks.add_sink(Arc::new(sink));
//!
//! sinks.publish_state(&GripperState::default());
//! assert!(rx.try_recv().is_ok());
//! ```

use crate::outcome::{CommandId, CommandOutcome};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use gripper_link::LinkError;
use gripper_protocol::{CommandKind, GripperState};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// 指令生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// 进入队列
    Queued { id: CommandId, kind: CommandKind },
    /// 开始执行（已下发到链路）
    Started { id: CommandId, kind: CommandKind },
    /// 已请求取消
    Cancelling { id: CommandId },
    /// 进入终态
    Finished {
        id: CommandId,
        kind: CommandKind,
        outcome: CommandOutcome,
    },
    /// 链路轮询开始失败
    LinkLost(LinkError),
    /// 链路恢复
    LinkRestored,
}

/// 遥测 sink
pub trait TelemetrySink: Send + Sync {
    /// 状态变化（忽略序号后内容不同）时调用
    fn on_state(&self, state: &GripperState);

    /// 指令事件（可选）
    fn on_event(&self, event: &CommandEvent) {
        let _ = event;
    }
}

/// sink 列表
///
/// 本身不做同步，由 Sequencer 放在 `RwLock` 中共享。
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl SinkRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }

    pub fn clear(&mut self) {
        self.sinks.clear();
    }

    pub fn publish_state(&self, state: &GripperState) {
        for sink in self.sinks.iter() {
            if catch_unwind(AssertUnwindSafe(|| sink.on_state(state))).is_err() {
                error!("Telemetry sink panicked in on_state");
            }
        }
    }

    pub fn publish_event(&self, event: &CommandEvent) {
        for sink in self.sinks.iter() {
            if catch_unwind(AssertUnwindSafe(|| sink.on_event(event))).is_err() {
                error!("Telemetry sink panicked in on_event");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// 通过通道转发的遥测记录
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    State(GripperState),
    Event(CommandEvent),
}

/// 有界通道 sink
///
/// 队列满时丢弃记录并计数，不阻塞工作线程。
pub struct ChannelSink {
    tx: Sender<TelemetryRecord>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// 创建 sink 和接收端
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<TelemetryRecord>) {
        let (tx, rx) = bounded(capacity);
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    /// 丢弃计数
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    fn forward(&self, record: TelemetryRecord) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(record) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl TelemetrySink for ChannelSink {
    fn on_state(&self, state: &GripperState) {
        self.forward(TelemetryRecord::State(state.clone()));
    }

    fn on_event(&self, event: &CommandEvent) {
        self.forward(TelemetryRecord::Event(event.clone()));
    }
}
