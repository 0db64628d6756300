//! # Gripper Protocol
//!
//! 夹爪管理器的数据模型定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 高层夹爪指令（`GripperCommand`）与链路目标（`LinkTarget`）
//! - `state`: 执行器反馈状态（`GripperState`）
//! - `limits`: 标定行程与力限制（`GripperLimits`）以及忙碌策略
//! - `validation`: 指令校验器（纯函数，无副作用）
//! - `wire`: TCP 链路的换行分隔 JSON 报文
//!
//! ## 单位
//!
//! 宽度单位为米（m），力单位为牛顿（N），速度单位为 m/s。

pub mod command;
pub mod limits;
pub mod state;
pub mod validation;
pub mod wire;

// 重新导出常用类型
pub use command::{CommandKind, Epsilon, GripperCommand, LinkTarget};
pub use limits::{BusyPolicy, GripperLimits};
pub use state::GripperState;
pub use validation::{ValidationError, validate};
pub use wire::{WireRequest, WireResponse};
