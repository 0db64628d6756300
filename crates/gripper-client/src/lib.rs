//! # Gripper Client
//!
//! 夹爪管理器的高层 API：
//! - [`GripperBuilder`]：按配置建立链路（TCP 服务或仿真夹爪）并启动 Sequencer
//! - [`GripperClient`]：提交指令（自动填充配置中的默认速度、力、容差和超时）、取消、读取状态
//!
//! # 示例
//!
//! ```rust,no_run
//! use gripper_client::GripperBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GripperBuilder::new().address("127.0.0.1:18890").build()?;
//! let handle = client.grasp(0.02, 40.0)?;
//! println!("grasp finished: {}", handle.wait());
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod error;

pub use builder::GripperBuilder;
pub use client::GripperClient;
pub use error::ClientError;

pub use gripper_config::GripperConfig;
pub use gripper_driver::{
    ChannelSink, CommandEvent, CommandHandle, CommandId, CommandOutcome, CommandStatus,
    DriverError, FailureReason, QueueSnapshot, TelemetryRecord, TelemetrySink,
};
pub use gripper_link::{LinkError, SimConfig, SimControl};
pub use gripper_protocol::{
    BusyPolicy, CommandKind, Epsilon, GripperCommand, GripperLimits, GripperState,
};
