//! 客户端门面

use gripper_config::CommandDefaults;
use gripper_driver::{
    CommandHandle, CommandId, CommandOutcome, DriverError, QueueSnapshot, Sequencer,
    TelemetrySink,
};
use gripper_protocol::{GripperCommand, GripperLimits, GripperState};
use std::sync::Arc;

/// 夹爪客户端
///
/// 包装一个 Sequencer，并用配置中的默认值填充调用方没有指定的参数。
/// 所有方法都是线程安全的（`&self`）。
pub struct GripperClient {
    sequencer: Sequencer,
    defaults: CommandDefaults,
}

impl std::fmt::Debug for GripperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GripperClient")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl GripperClient {
    pub(crate) fn new(sequencer: Sequencer, defaults: CommandDefaults) -> Self {
        Self {
            sequencer,
            defaults,
        }
    }

    /// 张开到当前标定的最大宽度
    pub fn open(&self) -> Result<CommandHandle, DriverError> {
        let width = self.limits().max_width;
        self.submit(self.with_defaults(GripperCommand::open(width)))
    }

    /// 闭合到最小宽度（不建立夹持力）
    pub fn close(&self) -> Result<CommandHandle, DriverError> {
        let width = self.limits().min_width;
        self.submit(self.with_defaults(GripperCommand::close(width)))
    }

    /// 移动到指定宽度（m）
    pub fn move_to(&self, width: f64) -> Result<CommandHandle, DriverError> {
        self.submit(self.with_defaults(GripperCommand::move_to(width)))
    }

    /// 以指定力（N）抓取期望宽度（m）的物体
    pub fn grasp(&self, width: f64, force: f64) -> Result<CommandHandle, DriverError> {
        self.submit(self.with_defaults(GripperCommand::grasp(width, force)))
    }

    /// 以默认力抓取
    pub fn grasp_default(&self, width: f64) -> Result<CommandHandle, DriverError> {
        self.grasp(width, self.defaults.force)
    }

    /// 回零：完整闭合再张开，完成后更新最大宽度估计
    pub fn homing(&self) -> Result<CommandHandle, DriverError> {
        self.submit(self.with_defaults(GripperCommand::homing()))
    }

    /// 停止（抢占当前和排队中的所有指令）
    pub fn stop(&self) -> Result<CommandHandle, DriverError> {
        self.submit(self.with_defaults(GripperCommand::stop()))
    }

    /// 原样提交指令（不填充默认值）
    pub fn submit(&self, command: GripperCommand) -> Result<CommandHandle, DriverError> {
        self.sequencer.submit(command)
    }

    /// 提交并阻塞等待终态
    pub fn execute(&self, command: GripperCommand) -> Result<CommandOutcome, DriverError> {
        Ok(self.submit(command)?.wait())
    }

    /// 用配置 `[defaults]` 填充 speed、epsilon 和 timeout
    ///
    /// 三个字段总是被覆盖，包括调用方已经设置过的值。需要自定义时先调用本方法，
    /// 再用 `with_speed` 等方法设置：
    ///
    /// ```rust,no_run
    /// # use gripper_client::{GripperBuilder, GripperCommand};
    /// # let client = GripperBuilder::new().build()?;
    /// let command = client
    ///     .with_defaults(GripperCommand::move_to(0.03))
    ///     .with_speed(0.02);
    /// # Ok::<(), gripper_client::ClientError>(())
    /// ```
    pub fn with_defaults(&self, command: GripperCommand) -> GripperCommand {
        command
            .with_speed(self.defaults.speed)
            .with_epsilon(self.defaults.epsilon())
            .with_timeout(self.defaults.timeout())
    }

    pub fn cancel(&self, handle: &CommandHandle) -> Result<(), DriverError> {
        self.sequencer.cancel(handle)
    }

    pub fn cancel_id(&self, id: CommandId) -> Result<(), DriverError> {
        self.sequencer.cancel_id(id)
    }

    /// 最新反馈
    pub fn state(&self) -> GripperState {
        self.sequencer.state()
    }

    /// 当前标定限制
    pub fn limits(&self) -> GripperLimits {
        self.sequencer.limits()
    }

    pub fn snapshot(&self) -> Result<QueueSnapshot, DriverError> {
        self.sequencer.snapshot()
    }

    pub fn defaults(&self) -> &CommandDefaults {
        &self.defaults
    }

    pub fn add_sink(&self, sink: Arc<dyn TelemetrySink>) {
        self.sequencer.add_sink(sink);
    }
}
