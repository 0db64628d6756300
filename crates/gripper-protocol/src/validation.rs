//! 指令校验器
//!
//! 纯函数，根据标定限制检查指令目标，不产生任何副作用。

use crate::command::GripperCommand;
use crate::limits::GripperLimits;
use thiserror::Error;

/// 指令校验失败原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// 数值为 NaN 或无穷大
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    /// 宽度超出标定行程
    #[error("Target width {width:.4} m outside [{min:.4}, {max:.4}]")]
    WidthOutOfRange { width: f64, min: f64, max: f64 },

    /// 力超出范围
    #[error("Target force {force:.2} N outside [0, {max:.2}]")]
    ForceOutOfRange { force: f64, max: f64 },

    /// 容差为负
    #[error("Epsilon must be non-negative (inner: {inner}, outer: {outer})")]
    NegativeEpsilon { inner: f64, outer: f64 },

    /// 内容差大于外容差
    #[error("Epsilon inner {inner} exceeds outer {outer}")]
    EpsilonInverted { inner: f64, outer: f64 },

    /// 速度超出范围
    #[error("Speed {speed:.3} m/s outside (0, {max:.3}]")]
    SpeedOutOfRange { speed: f64, max: f64 },

    /// 超时为零
    #[error("Timeout must be greater than zero")]
    ZeroTimeout,
}

/// 校验指令
///
/// # 规则
///
/// - 所有数值必须有限
/// - 超时必须大于零
/// - 容差 `inner`/`outer` 不能为负，且 `inner <= outer`
/// - 带宽度目标的指令：`min_width <= width <= max_width`
/// - 力：`0 <= force <= max_force`
/// - 运动类指令：`0 < speed <= max_speed`
///
/// `Stop` 与 `Homing` 不携带宽度目标，跳过宽度检查。
///
/// # 示例
///
/// ```rust
/// use gripper_protocol::{GripperCommand, GripperLimits, ValidationError, validate};
///
/// let limits = GripperLimits::default();
/// assert!(validate(&GripperCommand::move_to(0.04), &limits).is_ok());
/// assert!(matches!(
///     validate(&GripperCommand::move_to(0.2), &limits),
///     Err(ValidationError::WidthOutOfRange { .. })
/// ));
/// ```
pub fn validate(cmd: &GripperCommand, limits: &GripperLimits) -> Result<(), ValidationError> {
    let epsilon = cmd.epsilon();

    for (field, value) in [
        ("target_width", cmd.target_width()),
        ("target_force", cmd.target_force()),
        ("epsilon_inner", epsilon.inner),
        ("epsilon_outer", epsilon.outer),
        ("speed", cmd.speed()),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field });
        }
    }

    if cmd.timeout().is_zero() {
        return Err(ValidationError::ZeroTimeout);
    }

    if epsilon.inner < 0.0 || epsilon.outer < 0.0 {
        return Err(ValidationError::NegativeEpsilon {
            inner: epsilon.inner,
            outer: epsilon.outer,
        });
    }
    if epsilon.inner > epsilon.outer {
        return Err(ValidationError::EpsilonInverted {
            inner: epsilon.inner,
            outer: epsilon.outer,
        });
    }

    let kind = cmd.kind();
    if kind.has_width_target() {
        let width = cmd.target_width();
        if width < limits.min_width || width > limits.max_width {
            return Err(ValidationError::WidthOutOfRange {
                width,
                min: limits.min_width,
                max: limits.max_width,
            });
        }
    }

    let force = cmd.target_force();
    if !(0.0..=limits.max_force).contains(&force) {
        return Err(ValidationError::ForceOutOfRange {
            force,
            max: limits.max_force,
        });
    }

    if kind.is_motion() {
        let speed = cmd.speed();
        if speed <= 0.0 || speed > limits.max_speed {
            return Err(ValidationError::SpeedOutOfRange {
                speed,
                max: limits.max_speed,
            });
        }
    }

    Ok(())
}
