//! Command Sequencer
//!
//! 每个物理夹爪一个 Sequencer。后台工作线程独占执行器链路、当前活动指令和等待队列，
//! 调用方通过通道提交请求，因此新提交与正在完成的指令之间的所有状态转换都是串行的。
//!
//! # 忙碌处理
//!
//! - `BusyPolicy::Queue`（默认）：排在当前指令之后（有界 FIFO）
//! - `BusyPolicy::Reject`：返回 `DriverError::Busy`
//! - `Stop`：总是抢占，活动和排队中的指令以 `Failed(Preempted)` 结束
//!
//! # 线程模型
//!
//! ```text
//! caller ──Request──▶ [crossbeam channel] ──▶ worker: handle() / tick() every poll_interval
//!                                               │
//!                                               ├─ link.poll() → state machine → CommandSlot
//!                                               └─ ArcSwap<GripperState>（无锁读取）
//! ```

use crate::error::DriverError;
use crate::handle::{CommandHandle, CommandSlot};
use crate::outcome::{CommandId, CommandOutcome, CommandStatus, FailureReason};
use crate::state_machine::{CommandPhase, GraspStateMachine};
use crate::telemetry::{CommandEvent, SinkRegistry, TelemetrySink};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use gripper_link::ActuatorLink;
use gripper_protocol::{
    BusyPolicy, CommandKind, GripperCommand, GripperLimits, GripperState, validate,
};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 限时回收工作线程
///
/// `JoinHandle::join` 没有超时参数，这里把 join 交给一个收尾线程，
/// 调用方只等待 `timeout`。线程按时正常退出时返回 `true`。
fn reap_worker(worker: JoinHandle<()>, timeout: Duration) -> bool {
    let (done_tx, done_rx) = bounded(1);
    spawn(move || {
        let clean = worker.join().is_ok();
        let _ = done_tx.send(clean);
    });

    match done_rx.recv_timeout(timeout) {
        Ok(true) => true,
        Ok(false) => {
            error!("Sequencer worker panicked");
            false
        },
        Err(_) => {
            error!("Sequencer worker still running after {:?}", timeout);
            false
        },
    }
}

/// Sequencer 配置
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    /// 忙碌策略
    pub policy: BusyPolicy,
    /// 排队上限（仅 `BusyPolicy::Queue`）
    pub max_queue_len: usize,
    /// 链路轮询周期
    pub poll_interval: Duration,
    /// 取消后等待停止确认的最长时间
    pub cancel_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            policy: BusyPolicy::Queue,
            max_queue_len: 8,
            poll_interval: Duration::from_millis(5),
            cancel_timeout: Duration::from_secs(1),
        }
    }
}

/// 队列快照
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueSnapshot {
    /// 活动指令
    pub active: Option<(CommandId, CommandKind)>,
    /// 排队中的指令（FIFO 顺序）
    pub queued: Vec<CommandId>,
}

enum Request {
    Submit {
        command: GripperCommand,
        reply: Sender<Result<CommandHandle, DriverError>>,
    },
    Cancel {
        id: CommandId,
        reply: Sender<Result<(), DriverError>>,
    },
    Snapshot {
        reply: Sender<QueueSnapshot>,
    },
}

/// Command Sequencer（对外 API）
pub struct Sequencer {
    request_tx: Sender<Request>,
    limits: Arc<ArcSwap<GripperLimits>>,
    state: Arc<ArcSwap<GripperState>>,
    sinks: Arc<RwLock<SinkRegistry>>,
    config: SequencerConfig,
    is_running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Sequencer {
    /// 创建 Sequencer 并启动工作线程
    ///
    /// # 参数
    /// - `link`: 执行器链路（移动到工作线程，由其独占）
    /// - `limits`: 初始标定限制
    /// - `config`: Sequencer 配置
    pub fn new(
        link: impl ActuatorLink + 'static,
        limits: GripperLimits,
        config: SequencerConfig,
    ) -> Self {
        let (request_tx, request_rx) = unbounded();
        let limits = Arc::new(ArcSwap::from_pointee(limits));
        let state = Arc::new(ArcSwap::from_pointee(GripperState::default()));
        let sinks = Arc::new(RwLock::new(SinkRegistry::new()));
        let is_running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            link: Box::new(link),
            config: config.clone(),
            limits: limits.clone(),
            state: state.clone(),
            sinks: sinks.clone(),
            active: None,
            queue: VecDeque::new(),
            next_id: 1,
            last_sequence: 0,
            link_healthy: true,
        };
        let running = is_running.clone();
        let worker = spawn(move || worker.run(request_rx, running));

        Self {
            request_tx,
            limits,
            state,
            sinks,
            config,
            is_running,
            worker: Some(worker),
        }
    }

    /// 提交指令
    ///
    /// # 错误
    /// - `DriverError::Validation`: 指令超出当前限制
    /// - `DriverError::Busy`: 拒绝策略下已有活动指令
    /// - `DriverError::QueueFull`: 排队策略下队列已满
    /// - `DriverError::ChannelClosed`: 工作线程已退出
    pub fn submit(&self, command: GripperCommand) -> Result<CommandHandle, DriverError> {
        let (reply, rx) = bounded(1);
        self.request(Request::Submit { command, reply }, rx)?
    }

    /// 取消指令
    ///
    /// 排队中的指令立即以 `Failed(Cancelled)` 结束；活动指令请求链路停止，
    /// 在停止确认或取消超时后以 `Failed(Cancelled)` 结束。
    pub fn cancel(&self, handle: &CommandHandle) -> Result<(), DriverError> {
        self.cancel_id(handle.id())
    }

    /// 按标识取消
    pub fn cancel_id(&self, id: CommandId) -> Result<(), DriverError> {
        let (reply, rx) = bounded(1);
        self.request(Request::Cancel { id, reply }, rx)?
    }

    /// 当前活动指令与队列
    pub fn snapshot(&self) -> Result<QueueSnapshot, DriverError> {
        let (reply, rx) = bounded(1);
        self.request(Request::Snapshot { reply }, rx)
    }

    /// 活动指令
    pub fn active(&self) -> Result<Option<(CommandId, CommandKind)>, DriverError> {
        Ok(self.snapshot()?.active)
    }

    /// 排队中的指令数
    pub fn queued_len(&self) -> Result<usize, DriverError> {
        Ok(self.snapshot()?.queued.len())
    }

    /// 最新反馈（无锁读取）
    pub fn state(&self) -> GripperState {
        self.state.load().as_ref().clone()
    }

    /// 当前标定限制（回零成功后会更新最大宽度）
    pub fn limits(&self) -> GripperLimits {
        **self.limits.load()
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// 注册遥测 sink
    pub fn add_sink(&self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.write().add_sink(sink);
    }

    /// 等待第一条有效反馈
    ///
    /// # 错误
    /// - `DriverError::Timeout`: 超时未收到反馈（链路不可达时也表现为超时）
    pub fn wait_for_feedback(&self, timeout: Duration) -> Result<GripperState, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if state.is_valid() {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout);
            }
            std::thread::sleep(self.config.poll_interval.min(Duration::from_millis(5)));
        }
    }

    /// 工作线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn request<T>(&self, request: Request, rx: Receiver<T>) -> Result<T, DriverError> {
        self.request_tx
            .send(request)
            .map_err(|_| DriverError::ChannelClosed)?;
        rx.recv().map_err(|_| DriverError::ChannelClosed)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            reap_worker(worker, Duration::from_secs(2));
        }
    }
}

struct Entry {
    id: CommandId,
    machine: GraspStateMachine,
    slot: Arc<CommandSlot>,
}

impl Entry {
    fn kind(&self) -> CommandKind {
        self.machine.command().kind()
    }
}

impl Drop for Entry {
    /// 工作线程异常退出时仍未结束的指令以 `Failed(Shutdown)` 结束，等待者随之返回
    fn drop(&mut self) {
        self.slot.set(CommandStatus::Finished(CommandOutcome::Failed(
            FailureReason::Shutdown,
        )));
    }
}

struct Worker {
    link: Box<dyn ActuatorLink>,
    config: SequencerConfig,
    limits: Arc<ArcSwap<GripperLimits>>,
    state: Arc<ArcSwap<GripperState>>,
    sinks: Arc<RwLock<SinkRegistry>>,
    active: Option<Entry>,
    queue: VecDeque<Entry>,
    next_id: u64,
    last_sequence: u64,
    link_healthy: bool,
}

impl Worker {
    fn run(mut self, requests: Receiver<Request>, running: Arc<AtomicBool>) {
        info!(
            "Sequencer worker started (policy: {:?}, poll interval: {:?})",
            self.config.policy, self.config.poll_interval
        );

        let mut next_poll = Instant::now();
        while running.load(Ordering::Acquire) {
            let wait = next_poll.saturating_duration_since(Instant::now());
            match requests.recv_timeout(wait) {
                Ok(request) => self.handle(request),
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if now >= next_poll {
                self.tick(now);
                next_poll = now + self.config.poll_interval;
            }
        }

        self.shutdown();
    }

    fn handle(&mut self, request: Request) {
        let now = Instant::now();
        match request {
            Request::Submit { command, reply } => {
                let _ = reply.send(self.submit(command, now));
            },
            Request::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id, now));
            },
            Request::Snapshot { reply } => {
                let _ = reply.send(QueueSnapshot {
                    active: self.active.as_ref().map(|a| (a.id, a.kind())),
                    queued: self.queue.iter().map(|e| e.id).collect(),
                });
            },
        }
    }

    fn submit(&mut self, command: GripperCommand, now: Instant) -> Result<CommandHandle, DriverError> {
        let limits: GripperLimits = **self.limits.load();
        if let Err(e) = validate(&command, &limits) {
            warn!("{} rejected: {}", command.kind(), e);
            return Err(e.into());
        }

        let kind = command.kind();
        if kind.is_preemptive() {
            self.preempt_all();
        } else if let Some(active) = &self.active {
            match self.config.policy {
                BusyPolicy::Reject => {
                    warn!("{} rejected: command {} is active", kind, active.id);
                    return Err(DriverError::Busy { active: active.id });
                },
                BusyPolicy::Queue if self.queue.len() >= self.config.max_queue_len => {
                    warn!("{} rejected: queue full", kind);
                    return Err(DriverError::QueueFull {
                        capacity: self.config.max_queue_len,
                    });
                },
                BusyPolicy::Queue => {},
            }
        }

        let id = CommandId(self.next_id);
        self.next_id += 1;
        let slot = CommandSlot::new(CommandStatus::Queued);
        let handle = CommandHandle::new(id, kind, slot.clone());
        let entry = Entry {
            id,
            machine: GraspStateMachine::new(command),
            slot,
        };

        if self.active.is_none() {
            self.activate(entry, now);
            self.settle(now);
        } else {
            debug!("Command {} ({}) queued at position {}", id, kind, self.queue.len());
            self.sinks.read().publish_event(&CommandEvent::Queued { id, kind });
            self.queue.push_back(entry);
        }
        Ok(handle)
    }

    fn cancel(&mut self, id: CommandId, now: Instant) -> Result<(), DriverError> {
        if let Some(pos) = self.queue.iter().position(|e| e.id == id) {
            if let Some(mut entry) = self.queue.remove(pos) {
                entry.machine.abort(FailureReason::Cancelled);
                self.finish(entry);
            }
            return Ok(());
        }

        let cancel_timeout = self.config.cancel_timeout;
        let last_sequence = self.last_sequence;
        match self.active.as_mut() {
            Some(active) if active.id == id => {
                info!("Cancelling command {}", id);
                if let Err(e) =
                    active
                        .machine
                        .cancel(&mut *self.link, cancel_timeout, last_sequence, now)
                {
                    error!("Stop request for cancelled command {} failed: {}", id, e);
                }
                if !active.machine.is_terminal() {
                    active.slot.set(CommandStatus::Cancelling);
                    self.sinks
                        .read()
                        .publish_event(&CommandEvent::Cancelling { id });
                }
            },
            _ => return Err(DriverError::UnknownCommand(id)),
        }

        self.settle(now);
        Ok(())
    }

    fn tick(&mut self, now: Instant) {
        match self.link.poll() {
            Ok(state) => {
                if !self.link_healthy {
                    self.link_healthy = true;
                    info!("Gripper link restored");
                    self.sinks.read().publish_event(&CommandEvent::LinkRestored);
                }
                self.record_feedback(&state);
                if let Some(active) = self.active.as_mut() {
                    active.machine.on_feedback(&state, now);
                }
            },
            Err(e) => {
                if self.link_healthy {
                    self.link_healthy = false;
                    error!("Gripper link poll failed: {}", e);
                    self.sinks
                        .read()
                        .publish_event(&CommandEvent::LinkLost(e.clone()));
                }
                if let Some(active) = self.active.as_mut() {
                    active.machine.on_link_error(e);
                }
            },
        }

        if let Some(active) = self.active.as_mut() {
            active.machine.check_timeout(now);
        }
        self.settle(now);
    }

    fn record_feedback(&mut self, state: &GripperState) {
        trace!(
            "feedback #{}: width {:.4} m, force {:.2} N, moving {}",
            state.sequence, state.width, state.force, state.is_moving
        );
        self.last_sequence = state.sequence;
        let previous = self.state.swap(Arc::new(state.clone()));
        if !previous.same_reading(state) {
            self.sinks.read().publish_state(state);
        }
    }

    /// 启动指令并设为活动指令（调用前必须没有活动指令）
    fn activate(&mut self, mut entry: Entry, now: Instant) {
        let limits: GripperLimits = **self.limits.load();
        let phase = entry
            .machine
            .start(&mut *self.link, &limits, self.last_sequence, now);

        if *phase == CommandPhase::Moving {
            info!(
                "Command {} ({}) started, timeout {:?}",
                entry.id,
                entry.kind(),
                entry.machine.command().timeout()
            );
            entry.slot.set(CommandStatus::Moving);
            self.sinks.read().publish_event(&CommandEvent::Started {
                id: entry.id,
                kind: entry.kind(),
            });
        }
        self.active = Some(entry);
    }

    /// 结束已到终态的活动指令，并启动队首指令
    fn settle(&mut self, now: Instant) {
        loop {
            if self
                .active
                .as_ref()
                .is_some_and(|a| a.machine.is_terminal())
                && let Some(done) = self.active.take()
            {
                self.finish(done);
            }
            if self.active.is_some() {
                return;
            }
            match self.queue.pop_front() {
                Some(next) => self.activate(next, now),
                None => return,
            }
        }
    }

    fn preempt_all(&mut self) {
        if let Some(mut active) = self.active.take() {
            info!("Stop preempts command {}", active.id);
            active.machine.abort(FailureReason::Preempted);
            self.finish(active);
        }
        for mut entry in std::mem::take(&mut self.queue) {
            entry.machine.abort(FailureReason::Preempted);
            self.finish(entry);
        }
    }

    fn finish(&mut self, entry: Entry) {
        let kind = entry.kind();
        let outcome = entry
            .machine
            .phase()
            .outcome()
            .unwrap_or(CommandOutcome::Failed(FailureReason::Shutdown));

        match &outcome {
            CommandOutcome::Succeeded(state) => {
                info!("Command {} ({}) succeeded", entry.id, kind);
                if kind == CommandKind::Homing {
                    self.adopt_max_width(state.max_width);
                }
            },
            CommandOutcome::Failed(reason) => {
                warn!("Command {} ({}) failed: {}", entry.id, kind, reason);
            },
            CommandOutcome::TimedOut => {
                warn!("Command {} ({}) timed out", entry.id, kind);
            },
        }

        // 先发事件再唤醒等待者，等待返回时事件已可见
        self.sinks.read().publish_event(&CommandEvent::Finished {
            id: entry.id,
            kind,
            outcome: outcome.clone(),
        });
        entry.slot.set(CommandStatus::Finished(outcome));
    }

    fn adopt_max_width(&self, max_width: f64) {
        let limits: GripperLimits = **self.limits.load();
        if max_width.is_finite() && max_width > limits.min_width && max_width != limits.max_width {
            info!(
                "Homing estimated max width {:.4} m (was {:.4} m)",
                max_width, limits.max_width
            );
            self.limits
                .store(Arc::new(limits.with_max_width(max_width)));
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut active) = self.active.take() {
            if matches!(
                active.machine.phase(),
                CommandPhase::Moving | CommandPhase::Cancelling
            ) && let Err(e) = self.link.stop()
            {
                warn!("Failed to stop gripper during shutdown: {}", e);
            }
            active.machine.abort(FailureReason::Shutdown);
            self.finish(active);
        }
        for mut entry in std::mem::take(&mut self.queue) {
            entry.machine.abort(FailureReason::Shutdown);
            self.finish(entry);
        }
        info!("Sequencer worker stopped");
    }
}
