//! 执行器反馈状态

use serde::{Deserialize, Serialize};

/// 夹爪状态快照
///
/// 仅由 Actuator Link 在收到反馈时生成，上层只读。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GripperState {
    /// 当前手指开口宽度（m）
    pub width: f64,
    /// 当前估计的最大开口宽度（m），回零后更新
    pub max_width: f64,
    /// 当前夹持力（N）
    pub force: f64,
    /// 手指是否仍在运动
    pub is_moving: bool,
    /// 是否夹持住物体
    pub is_grasped: bool,
    /// 执行器报告的最近一次故障
    pub last_error: Option<String>,
    /// 反馈序号（严格递增），0 表示尚未收到任何反馈
    pub sequence: u64,
}

impl GripperState {
    /// 是否为有效反馈（至少收到过一帧）
    pub fn is_valid(&self) -> bool {
        self.sequence > 0
    }

    /// 比较物理内容是否相同（忽略序号）
    pub fn same_reading(&self, other: &Self) -> bool {
        self.width == other.width
            && self.max_width == other.max_width
            && self.force == other.force
            && self.is_moving == other.is_moving
            && self.is_grasped == other.is_grasped
            && self.last_error == other.last_error
    }
}
