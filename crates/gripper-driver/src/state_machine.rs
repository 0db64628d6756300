//! Grasp 状态机
//!
//! 驱动单条指令从提交到终态：
//!
//! ```text
//! Idle ──start──▶ Moving ──反馈满足条件──▶ Succeeded
//!   │               │ ├──超时────────────▶ TimedOut
//!   │               │ ├──链路错误/故障───▶ Failed(Link | Fault)
//!   │               │ └──Stop 抢占───────▶ Failed(Preempted)
//!   │               └──cancel──▶ Cancelling ──停止确认/取消超时──▶ Failed(Cancelled)
//!   └──校验失败/链路错误──▶ Failed(Rejected | Link)
//! ```
//!
//! 终态不可再转换，新指令总是创建新的实例。
//! 所有方法都显式接收 `now`，便于在测试中控制时间。

use crate::outcome::{CommandOutcome, FailureReason};
use gripper_link::{ActuatorLink, LinkError};
use gripper_protocol::{CommandKind, GripperCommand, GripperLimits, GripperState, validate};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 状态机阶段
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPhase {
    Idle,
    Moving,
    Cancelling,
    Succeeded(GripperState),
    Failed(FailureReason),
    TimedOut,
}

impl CommandPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded(_) | Self::Failed(_) | Self::TimedOut
        )
    }

    /// 终态对应的结果
    pub fn outcome(&self) -> Option<CommandOutcome> {
        match self {
            Self::Succeeded(state) => Some(CommandOutcome::Succeeded(state.clone())),
            Self::Failed(reason) => Some(CommandOutcome::Failed(reason.clone())),
            Self::TimedOut => Some(CommandOutcome::TimedOut),
            _ => None,
        }
    }
}

/// 单条指令的状态机
#[derive(Debug)]
pub struct GraspStateMachine {
    command: GripperCommand,
    phase: CommandPhase,
    /// 指令超时截止时间（下发时设置）
    deadline: Option<Instant>,
    /// 取消确认截止时间
    cancel_deadline: Option<Instant>,
    /// 只有序号大于此值的反馈才参与判定
    fresh_after: u64,
    /// 抓取成功所需的最小夹持力
    grasp_threshold: f64,
    /// 下发后是否观测到过运动
    seen_motion: bool,
}

impl GraspStateMachine {
    pub fn new(command: GripperCommand) -> Self {
        Self {
            command,
            phase: CommandPhase::Idle,
            deadline: None,
            cancel_deadline: None,
            fresh_after: 0,
            grasp_threshold: 0.0,
            seen_motion: false,
        }
    }

    pub fn command(&self) -> &GripperCommand {
        &self.command
    }

    pub fn phase(&self) -> &CommandPhase {
        &self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// 超时截止时间（尚未启动时为 `None`）
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 启动指令（Idle → Moving）
    ///
    /// # 参数
    /// - `link`: 执行器链路
    /// - `limits`: 当前标定限制（重新校验，排队期间限制可能已变化）
    /// - `last_sequence`: 下发前最后一次反馈的序号
    /// - `now`: 当前时间
    pub fn start(
        &mut self,
        link: &mut dyn ActuatorLink,
        limits: &GripperLimits,
        last_sequence: u64,
        now: Instant,
    ) -> &CommandPhase {
        if self.phase != CommandPhase::Idle {
            return &self.phase;
        }

        if let Err(e) = validate(&self.command, limits) {
            debug!("{} rejected at dispatch: {}", self.command.kind(), e);
            self.phase = CommandPhase::Failed(FailureReason::Rejected(e));
            return &self.phase;
        }

        self.grasp_threshold = limits.grasp_threshold(self.command.target_force());
        self.fresh_after = last_sequence;

        match link.send(self.command.link_target()) {
            Ok(()) => {
                self.deadline = Some(now + self.command.timeout());
                self.phase = CommandPhase::Moving;
            },
            Err(e) => {
                self.phase = CommandPhase::Failed(FailureReason::Link(e));
            },
        }
        &self.phase
    }

    /// 处理一条反馈
    pub fn on_feedback(&mut self, state: &GripperState, now: Instant) -> &CommandPhase {
        if !matches!(self.phase, CommandPhase::Moving | CommandPhase::Cancelling) {
            return &self.phase;
        }

        if state.sequence > self.fresh_after {
            trace!(
                "feedback #{}: width {:.4} force {:.2} moving {}",
                state.sequence, state.width, state.force, state.is_moving
            );
            if state.is_moving {
                self.seen_motion = true;
            }

            match self.phase {
                CommandPhase::Moving => {
                    if let Some(fault) = &state.last_error {
                        self.phase = CommandPhase::Failed(FailureReason::Fault(fault.clone()));
                        return &self.phase;
                    }
                    if !state.is_moving && self.target_reached(state) {
                        self.phase = CommandPhase::Succeeded(state.clone());
                        return &self.phase;
                    }
                },
                CommandPhase::Cancelling => {
                    if !state.is_moving || state.last_error.is_some() {
                        self.phase = CommandPhase::Failed(FailureReason::Cancelled);
                        return &self.phase;
                    }
                },
                _ => {},
            }
        }

        self.check_timeout(now)
    }

    /// 处理链路错误
    ///
    /// 取消过程中的链路错误仍以 `Cancelled` 结束。
    pub fn on_link_error(&mut self, error: LinkError) -> &CommandPhase {
        match self.phase {
            CommandPhase::Moving => {
                self.phase = CommandPhase::Failed(FailureReason::Link(error));
            },
            CommandPhase::Cancelling => {
                self.phase = CommandPhase::Failed(FailureReason::Cancelled);
            },
            _ => {},
        }
        &self.phase
    }

    /// 检查超时
    pub fn check_timeout(&mut self, now: Instant) -> &CommandPhase {
        match self.phase {
            CommandPhase::Moving => {
                if self.deadline.is_some_and(|deadline| now >= deadline) {
                    self.phase = CommandPhase::TimedOut;
                }
            },
            CommandPhase::Cancelling => {
                if self.cancel_deadline.is_some_and(|deadline| now >= deadline) {
                    debug!("Cancel confirmation timed out, finishing as cancelled");
                    self.phase = CommandPhase::Failed(FailureReason::Cancelled);
                }
            },
            _ => {},
        }
        &self.phase
    }

    /// 取消指令
    ///
    /// - `Idle`：直接进入 `Failed(Cancelled)`
    /// - `Moving`：请求链路停止并进入 `Cancelling`，等待停止确认或 `cancel_timeout`
    /// - 其它：无操作
    ///
    /// 链路停止请求失败时直接以 `Cancelled` 结束，并把链路错误返回给调用方记录。
    pub fn cancel(
        &mut self,
        link: &mut dyn ActuatorLink,
        cancel_timeout: Duration,
        last_sequence: u64,
        now: Instant,
    ) -> Result<(), LinkError> {
        match self.phase {
            CommandPhase::Idle => {
                self.phase = CommandPhase::Failed(FailureReason::Cancelled);
                Ok(())
            },
            CommandPhase::Moving => {
                if let Err(e) = link.stop() {
                    self.phase = CommandPhase::Failed(FailureReason::Cancelled);
                    return Err(e);
                }
                self.fresh_after = last_sequence;
                self.cancel_deadline = Some(now + cancel_timeout);
                self.phase = CommandPhase::Cancelling;
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// 以指定原因立即结束（抢占、关闭）
    pub fn abort(&mut self, reason: FailureReason) -> &CommandPhase {
        if !self.phase.is_terminal() {
            self.phase = CommandPhase::Failed(reason);
        }
        &self.phase
    }

    fn target_reached(&self, state: &GripperState) -> bool {
        let epsilon = self.command.epsilon();
        match self.command.kind() {
            CommandKind::Open | CommandKind::Close | CommandKind::MoveTo => {
                epsilon.contains(self.command.target_width(), state.width)
            },
            CommandKind::Grasp => state.is_grasped && state.force >= self.grasp_threshold,
            // 回零总会运动，必须先观测到运动，避免把下发前的静止状态当成完成
            CommandKind::Homing => self.seen_motion && epsilon.contains(state.max_width, state.width),
            CommandKind::Stop => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gripper_protocol::{Epsilon, LinkTarget};

    /// 记录下发目标的链路
    #[derive(Default)]
    struct RecordingLink {
        sent: Vec<LinkTarget>,
        fail_send: bool,
    }

    impl ActuatorLink for RecordingLink {
        fn send(&mut self, target: LinkTarget) -> Result<(), LinkError> {
            if self.fail_send {
                return Err(LinkError::Disconnected);
            }
            self.sent.push(target);
            Ok(())
        }

        fn poll(&mut self) -> Result<GripperState, LinkError> {
            Ok(GripperState::default())
        }
    }

    fn feedback(sequence: u64, width: f64, is_moving: bool) -> GripperState {
        GripperState {
            width,
            max_width: 0.08,
            is_moving,
            sequence,
            ..Default::default()
        }
    }

    /// 例：限制 [0, 80] mm，MoveTo(40, ε=1/1, 2s)，反馈到 40.3 mm 停止 → Succeeded
    fn move_40mm() -> GripperCommand {
        GripperCommand::move_to(0.040)
            .with_epsilon(Epsilon::new(0.001, 0.001))
            .with_timeout(Duration::from_secs(2))
    }

    fn started(cmd: GripperCommand, link: &mut RecordingLink, t0: Instant) -> GraspStateMachine {
        let mut sm = GraspStateMachine::new(cmd);
        sm.start(link, &GripperLimits::default(), 10, t0);
        sm
    }

    #[test]
    fn test_move_succeeds_within_epsilon() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);
        assert_eq!(sm.phase(), &CommandPhase::Moving);
        assert_eq!(link.sent.len(), 1);

        sm.on_feedback(&feedback(11, 0.060, true), t0 + Duration::from_millis(100));
        assert_eq!(sm.phase(), &CommandPhase::Moving);

        // 宽度已到但仍在运动，不算完成
        sm.on_feedback(&feedback(12, 0.0403, true), t0 + Duration::from_millis(200));
        assert_eq!(sm.phase(), &CommandPhase::Moving);

        sm.on_feedback(&feedback(13, 0.0403, false), t0 + Duration::from_millis(300));
        assert!(matches!(sm.phase(), CommandPhase::Succeeded(s) if s.width == 0.0403));
    }

    #[test]
    fn test_move_times_out_without_feedback_change() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);

        for (i, ms) in [500u64, 1000, 1999].iter().enumerate() {
            sm.on_feedback(
                &feedback(11 + i as u64, 0.08, false),
                t0 + Duration::from_millis(*ms),
            );
            assert_eq!(sm.phase(), &CommandPhase::Moving);
        }

        sm.on_feedback(&feedback(20, 0.08, false), t0 + Duration::from_secs(2));
        assert_eq!(sm.phase(), &CommandPhase::TimedOut);
    }

    #[test]
    fn test_stale_feedback_is_ignored() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);

        // 序号 10 是下发前的反馈，即使宽度满足也不能完成
        sm.on_feedback(&feedback(10, 0.040, false), t0);
        assert_eq!(sm.phase(), &CommandPhase::Moving);
    }

    #[test]
    fn test_grasp_succeeds_on_force_threshold() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(GripperCommand::grasp(0.02, 40.0), &mut link, t0);

        let mut state = feedback(11, 0.03, false);
        state.is_grasped = true;
        state.force = 30.0; // 低于 36 N 阈值
        sm.on_feedback(&state, t0);
        assert_eq!(sm.phase(), &CommandPhase::Moving);

        state.sequence = 12;
        state.force = 37.0;
        sm.on_feedback(&state, t0);
        assert!(matches!(sm.phase(), CommandPhase::Succeeded(_)));
    }

    #[test]
    fn test_homing_requires_observed_motion() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(GripperCommand::homing(), &mut link, t0);

        sm.on_feedback(&feedback(11, 0.08, false), t0);
        assert_eq!(sm.phase(), &CommandPhase::Moving);

        sm.on_feedback(&feedback(12, 0.02, true), t0);
        sm.on_feedback(&feedback(13, 0.08, false), t0);
        assert!(matches!(sm.phase(), CommandPhase::Succeeded(_)));
    }

    #[test]
    fn test_start_rejects_against_current_limits() {
        let mut link = RecordingLink::default();
        let mut sm = GraspStateMachine::new(GripperCommand::move_to(0.075));
        let limits = GripperLimits::default().with_max_width(0.07);
        sm.start(&mut link, &limits, 0, Instant::now());

        assert!(matches!(
            sm.phase(),
            CommandPhase::Failed(FailureReason::Rejected(_))
        ));
        assert!(link.sent.is_empty());
    }

    #[test]
    fn test_start_link_error_fails() {
        let mut link = RecordingLink {
            fail_send: true,
            ..Default::default()
        };
        let t0 = Instant::now();
        let sm = started(move_40mm(), &mut link, t0);
        assert_eq!(
            sm.phase(),
            &CommandPhase::Failed(FailureReason::Link(LinkError::Disconnected))
        );
    }

    #[test]
    fn test_fault_fails_command() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);

        let mut state = feedback(11, 0.05, true);
        state.last_error = Some("motor overcurrent".to_string());
        sm.on_feedback(&state, t0);
        assert_eq!(
            sm.phase(),
            &CommandPhase::Failed(FailureReason::Fault("motor overcurrent".to_string()))
        );
    }

    #[test]
    fn test_cancel_never_succeeds() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);

        sm.cancel(&mut link, Duration::from_secs(1), 11, t0).unwrap();
        assert_eq!(sm.phase(), &CommandPhase::Cancelling);
        assert_eq!(link.sent.last(), Some(&LinkTarget::Stop));

        // 停止前的旧反馈不确认取消
        sm.on_feedback(&feedback(11, 0.040, false), t0);
        assert_eq!(sm.phase(), &CommandPhase::Cancelling);

        // 仍在运动
        sm.on_feedback(&feedback(12, 0.041, true), t0);
        assert_eq!(sm.phase(), &CommandPhase::Cancelling);

        // 停止且宽度恰好在容差内，结果仍是取消
        sm.on_feedback(&feedback(13, 0.040, false), t0);
        assert_eq!(sm.phase(), &CommandPhase::Failed(FailureReason::Cancelled));
    }

    #[test]
    fn test_cancel_confirmation_timeout() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);
        sm.cancel(&mut link, Duration::from_millis(100), 10, t0).unwrap();

        sm.on_feedback(&feedback(11, 0.05, true), t0 + Duration::from_millis(50));
        assert_eq!(sm.phase(), &CommandPhase::Cancelling);

        // 指令超时（2s）不会把取消变成 TimedOut
        sm.check_timeout(t0 + Duration::from_secs(3));
        assert_eq!(sm.phase(), &CommandPhase::Failed(FailureReason::Cancelled));
    }

    #[test]
    fn test_link_error_while_cancelling_is_cancelled() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);
        sm.cancel(&mut link, Duration::from_secs(1), 10, t0).unwrap();
        sm.on_link_error(LinkError::Timeout);
        assert_eq!(sm.phase(), &CommandPhase::Failed(FailureReason::Cancelled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut link = RecordingLink::default();
        let t0 = Instant::now();
        let mut sm = started(move_40mm(), &mut link, t0);
        sm.on_feedback(&feedback(11, 0.040, false), t0);
        assert!(sm.is_terminal());

        sm.on_link_error(LinkError::Disconnected);
        sm.abort(FailureReason::Preempted);
        sm.check_timeout(t0 + Duration::from_secs(10));
        assert!(matches!(sm.phase(), CommandPhase::Succeeded(_)));
        assert!(sm.phase().outcome().is_some_and(|o| o.is_success()));
    }

    #[test]
    fn test_cancel_idle() {
        let mut link = RecordingLink::default();
        let mut sm = GraspStateMachine::new(move_40mm());
        sm.cancel(&mut link, Duration::from_secs(1), 0, Instant::now())
            .unwrap();
        assert_eq!(sm.phase(), &CommandPhase::Failed(FailureReason::Cancelled));
        assert!(link.sent.is_empty());
    }
}
