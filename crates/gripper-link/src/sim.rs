//! 仿真夹爪
//!
//! 恒速运动学模型，不依赖任何硬件：
//! - 手指以指令速度匀速逼近目标宽度
//! - 可放置一个指定宽度的物体，闭合时在物体处堵转；抓取指令在接触时建立夹持力
//! - 回零先完全闭合再完全张开，结束后把最大宽度估计更新为真实行程
//!
//! `poll()`/`send()` 按墙钟时间推进模型；测试可直接调用 [`SimulatedGripper::step`]。

use crate::{ActuatorLink, LinkError};
use gripper_protocol::{GripperState, LinkTarget};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 仿真配置
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// 真实手指行程（m）
    pub travel: f64,
    /// 初始宽度（m）
    pub initial_width: f64,
    /// 回零前的最大宽度估计（m）
    pub uncalibrated_max_width: f64,
    /// 两指之间的物体宽度（m），`None` 表示没有物体
    pub object_width: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            travel: 0.08,
            initial_width: 0.08,
            uncalibrated_max_width: 0.08,
            object_width: None,
        }
    }
}

#[derive(Debug, Default)]
struct SimFlags {
    unreachable: bool,
    fault: Option<String>,
    object_width: Option<f64>,
}

/// 仿真夹爪的外部控制句柄
///
/// 仿真实例被 Sequencer 独占后，仍可通过此句柄注入故障或移动物体。
#[derive(Debug, Clone, Default)]
pub struct SimControl {
    flags: Arc<Mutex<SimFlags>>,
}

impl SimControl {
    /// 模拟传输断开：之后的 `send`/`poll` 返回 `LinkError::Unreachable`
    pub fn set_unreachable(&self, unreachable: bool) {
        self.flags.lock().unreachable = unreachable;
    }

    /// 注入（或清除）执行器故障，通过 `GripperState::last_error` 上报
    pub fn set_fault(&self, fault: Option<String>) {
        self.flags.lock().fault = fault;
    }

    /// 放置（或移除）物体
    pub fn set_object_width(&self, width: Option<f64>) {
        self.flags.lock().object_width = width;
    }

    fn object_width(&self) -> Option<f64> {
        self.flags.lock().object_width
    }

    fn fault(&self) -> Option<String> {
        self.flags.lock().fault.clone()
    }

    fn check_reachable(&self) -> Result<(), LinkError> {
        if self.flags.lock().unreachable {
            return Err(LinkError::Unreachable("simulated gripper offline".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Move { width: f64, speed: f64 },
    Grasp { width: f64, speed: f64, force: f64 },
    Homing { speed: f64, opening: bool },
}

/// 仿真夹爪
pub struct SimulatedGripper {
    travel: f64,
    control: SimControl,
    width: f64,
    max_width: f64,
    force: f64,
    is_grasped: bool,
    motion: Option<Motion>,
    sequence: u64,
    last_step: Instant,
}

impl SimulatedGripper {
    pub fn new(config: SimConfig) -> Self {
        let control = SimControl::default();
        control.set_object_width(config.object_width);
        Self {
            travel: config.travel,
            control,
            width: config.initial_width.clamp(0.0, config.travel),
            max_width: config.uncalibrated_max_width,
            force: 0.0,
            is_grasped: false,
            motion: None,
            sequence: 0,
            last_step: Instant::now(),
        }
    }

    /// 获取控制句柄
    pub fn control(&self) -> SimControl {
        self.control.clone()
    }

    /// 当前状态（不推进模型，不递增序号）
    pub fn snapshot(&self) -> GripperState {
        GripperState {
            width: self.width,
            max_width: self.max_width,
            force: self.force,
            is_moving: self.motion.is_some(),
            is_grasped: self.is_grasped,
            last_error: self.control.fault(),
            sequence: self.sequence,
        }
    }

    /// 推进模型 `dt`
    pub fn step(&mut self, dt: Duration) {
        let Some(motion) = self.motion else {
            return;
        };
        let delta = dt.as_secs_f64();

        match motion {
            Motion::Move { width, speed } => {
                let target = width.clamp(0.0, self.travel);
                match self.advance_towards(target, speed * delta) {
                    Travel::Reached => self.motion = None,
                    Travel::Contact(at) => {
                        debug!("Simulated fingers stalled on object at {:.4} m", at);
                        self.motion = None;
                    },
                    Travel::Moving => {},
                }
            },
            Motion::Grasp {
                width,
                speed,
                force,
            } => {
                let target = width.clamp(0.0, self.travel);
                match self.advance_towards(target, speed * delta) {
                    Travel::Reached => {
                        // 没有碰到物体，抓空
                        self.motion = None;
                    },
                    Travel::Contact(at) => {
                        debug!("Simulated grasp contact at {:.4} m, force {:.1} N", at, force);
                        self.force = force;
                        self.is_grasped = true;
                        self.motion = None;
                    },
                    Travel::Moving => {},
                }
            },
            Motion::Homing { speed, opening } => {
                // 回零忽略物体
                let target = if opening { self.travel } else { 0.0 };
                self.width = approach(self.width, target, speed * delta);
                if self.width == target {
                    if opening {
                        self.max_width = self.travel;
                        self.motion = None;
                        debug!("Simulated homing finished, max width {:.4} m", self.max_width);
                    } else {
                        self.motion = Some(Motion::Homing {
                            speed,
                            opening: true,
                        });
                    }
                }
            },
        }
    }

    fn advance_towards(&mut self, target: f64, max_delta: f64) -> Travel {
        let next = approach(self.width, target, max_delta);
        if let Some(object) = self.control.object_width()
            && self.width >= object
            && next < object
        {
            self.width = object;
            return Travel::Contact(object);
        }
        self.width = next;
        if next == target {
            Travel::Reached
        } else {
            Travel::Moving
        }
    }

    fn advance_clock(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_step);
        self.last_step = now;
        self.step(dt);
    }

    fn release(&mut self) {
        self.force = 0.0;
        self.is_grasped = false;
    }
}

enum Travel {
    Moving,
    Reached,
    Contact(f64),
}

fn approach(current: f64, target: f64, max_delta: f64) -> f64 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + max_delta.copysign(target - current)
    }
}

impl ActuatorLink for SimulatedGripper {
    fn send(&mut self, target: LinkTarget) -> Result<(), LinkError> {
        self.control.check_reachable()?;
        self.advance_clock();
        trace!("Simulated gripper target: {:?}", target);

        self.motion = match target {
            LinkTarget::Stop => None,
            LinkTarget::Move { width, speed } => {
                self.release();
                Some(Motion::Move { width, speed })
            },
            LinkTarget::Grasp {
                width,
                speed,
                force,
            } => {
                self.release();
                Some(Motion::Grasp {
                    width,
                    speed,
                    force,
                })
            },
            LinkTarget::Homing { speed } => {
                self.release();
                Some(Motion::Homing {
                    speed,
                    opening: false,
                })
            },
        };
        Ok(())
    }

    fn poll(&mut self) -> Result<GripperState, LinkError> {
        self.control.check_reachable()?;
        self.advance_clock();
        self.sequence += 1;
        Ok(self.snapshot())
    }
}
