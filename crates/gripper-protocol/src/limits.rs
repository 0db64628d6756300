//! 标定限制与 Sequencer 忙碌策略

use serde::{Deserialize, Serialize};

/// 夹爪标定限制（只读）
///
/// 默认值对应 Franka Hand：行程 0-80 mm，持续夹持力 70 N，峰值 140 N。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperLimits {
    /// 最小宽度（m）
    pub min_width: f64,
    /// 最大宽度（m）
    pub max_width: f64,
    /// 最大夹持力（N）
    pub max_force: f64,
    /// 最大手指速度（m/s）
    pub max_speed: f64,
    /// 抓取成功阈值比例：力 >= `target_force * grasp_force_ratio` 视为夹持成功
    pub grasp_force_ratio: f64,
}

impl GripperLimits {
    /// 抓取成功所需的最小夹持力
    pub fn grasp_threshold(&self, target_force: f64) -> f64 {
        target_force * self.grasp_force_ratio
    }

    /// 使用回零后估计的行程更新最大宽度
    pub fn with_max_width(mut self, max_width: f64) -> Self {
        self.max_width = max_width;
        self
    }
}

impl Default for GripperLimits {
    fn default() -> Self {
        Self {
            min_width: 0.0,
            max_width: 0.08,
            max_force: 140.0,
            max_speed: 0.2,
            grasp_force_ratio: 0.9,
        }
    }
}

/// 有指令在执行时，新提交的处理策略
///
/// `Stop` 不受此策略约束，总是抢占。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// 排队等待当前指令结束（默认）
    #[default]
    Queue,
    /// 直接拒绝
    Reject,
}
