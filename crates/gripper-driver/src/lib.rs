//! 驱动层模块
//!
//! 本模块负责把高层夹爪指令变成受监督的执行过程，包括：
//! - Grasp 状态机：从提交到成功/失败/超时的单条指令生命周期
//! - Command Sequencer：每个夹爪同一时刻只有一条活动指令（排队、拒绝或抢占）
//! - 遥测接口：状态变化与指令事件的非阻塞分发
//!
//! # 使用场景
//!
//! 适用于需要直接持有执行器链路的场景。
//! 大多数用户应该使用 `gripper-client` 提供的 `GripperClient`。

mod error;
pub mod handle;
pub mod outcome;
pub mod sequencer;
pub mod state_machine;
pub mod telemetry;

pub use error::DriverError;
pub use handle::CommandHandle;
pub use outcome::{CommandId, CommandOutcome, CommandStatus, FailureReason};
pub use sequencer::{QueueSnapshot, Sequencer, SequencerConfig};
pub use state_machine::{CommandPhase, GraspStateMachine};
pub use telemetry::{ChannelSink, CommandEvent, SinkRegistry, TelemetryRecord, TelemetrySink};
