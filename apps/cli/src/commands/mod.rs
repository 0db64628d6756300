//! 命令定义和实现

pub mod config;
pub mod motion;
pub mod state;

pub use config::ConfigCommand;
pub use motion::MotionArgs;
