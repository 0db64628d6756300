//! 指令句柄
//!
//! Sequencer 为每条已接受的指令创建一个共享槽位，工作线程在状态变化时写入并唤醒等待者。
//! 调用方持有的 `CommandHandle` 可以克隆，用于查询、等待或取消。

use crate::outcome::{CommandId, CommandOutcome, CommandStatus};
use gripper_protocol::CommandKind;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) struct CommandSlot {
    status: Mutex<CommandStatus>,
    changed: Condvar,
}

impl CommandSlot {
    pub(crate) fn new(status: CommandStatus) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(status),
            changed: Condvar::new(),
        })
    }

    /// 更新状态；已结束的槽位不再改变
    pub(crate) fn set(&self, status: CommandStatus) {
        let mut current = self.status.lock();
        if current.is_finished() {
            return;
        }
        *current = status;
        self.changed.notify_all();
    }
}

/// 指令句柄
#[derive(Debug, Clone)]
pub struct CommandHandle {
    id: CommandId,
    kind: CommandKind,
    slot: Arc<CommandSlot>,
}

impl CommandHandle {
    pub(crate) fn new(id: CommandId, kind: CommandKind, slot: Arc<CommandSlot>) -> Self {
        Self { id, kind, slot }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// 当前状态快照
    pub fn status(&self) -> CommandStatus {
        self.slot.status.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.slot.status.lock().is_finished()
    }

    /// 终态（尚未结束时为 `None`）
    pub fn outcome(&self) -> Option<CommandOutcome> {
        match &*self.slot.status.lock() {
            CommandStatus::Finished(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// 阻塞等待终态
    ///
    /// 每条指令都带超时，Sequencer 保证最终进入终态，因此此调用不会永久阻塞。
    pub fn wait(&self) -> CommandOutcome {
        let mut status = self.slot.status.lock();
        loop {
            if let CommandStatus::Finished(outcome) = &*status {
                return outcome.clone();
            }
            self.slot.changed.wait(&mut status);
        }
    }

    /// 带超时的等待；超时返回 `None`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CommandOutcome> {
        let deadline = Instant::now() + timeout;
        let mut status = self.slot.status.lock();
        loop {
            if let CommandStatus::Finished(outcome) = &*status {
                return Some(outcome.clone());
            }
            if self
                .slot
                .changed
                .wait_until(&mut status, deadline)
                .timed_out()
            {
                return match &*status {
                    CommandStatus::Finished(outcome) => Some(outcome.clone()),
                    _ => None,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureReason;

    #[test]
    fn test_wait_wakes_on_finish() {
        let slot = CommandSlot::new(CommandStatus::Moving);
        let handle = CommandHandle::new(CommandId(1), CommandKind::Open, slot.clone());

        let waiter = {
            let handle = handle.clone();
            std::thread::spawn(move || handle.wait())
        };
        std::thread::sleep(Duration::from_millis(20));
        slot.set(CommandStatus::Finished(CommandOutcome::TimedOut));

        assert_eq!(waiter.join().unwrap(), CommandOutcome::TimedOut);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let slot = CommandSlot::new(CommandStatus::Queued);
        let handle = CommandHandle::new(CommandId(2), CommandKind::Close, slot);
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);
        assert_eq!(handle.status(), CommandStatus::Queued);
        assert_eq!(handle.outcome(), None);
    }

    #[test]
    fn test_finished_slot_is_final() {
        let slot = CommandSlot::new(CommandStatus::Moving);
        let handle = CommandHandle::new(CommandId(3), CommandKind::Grasp, slot.clone());
        slot.set(CommandStatus::Finished(CommandOutcome::Failed(
            FailureReason::Cancelled,
        )));
        slot.set(CommandStatus::Moving);
        assert_eq!(
            handle.outcome(),
            Some(CommandOutcome::Failed(FailureReason::Cancelled))
        );
    }
}
