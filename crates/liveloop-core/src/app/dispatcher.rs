//! Dispatcher - 定期的にワーカーへタスクを投げるタイマー
//!
//! タイマー本体は呼び出し側ランタイム上の tokio タスク。
//! 発火のたびに「いまの」ワーカーを読み、いなければ何もしない。
//!
//! # 解除のルール
//! - 新しい世代を arm すると古いタイマーは即座に止める（常に高々 1 本）
//! - ワーカーは終了時に `disarm(自分の id)` を呼ぶ。別世代のタイマーには触らない

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::app::log_book::LogWriter;
use crate::app::worker_loop::{LoopTask, WorkerPort};
use crate::domain::{WorkerId, WorkerLabel, running_line};
use crate::ports::IdGenerator;

/// The worker the dispatcher currently targets.
///
/// 書くのはコントローラだけ、読むのはタイマー。
#[derive(Debug, Clone, Default)]
pub struct CurrentWorker {
    port: Arc<Mutex<Option<WorkerPort>>>,
}

impl CurrentWorker {
    pub fn set(&self, port: WorkerPort) {
        *self.lock() = Some(port);
    }

    pub fn get(&self) -> Option<WorkerPort> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<WorkerPort>> {
        self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Armed {
    owner: WorkerId,
    abort: AbortHandle,
}

/// Slot holding the one armed periodic timer, if any.
#[derive(Debug, Clone, Default)]
pub struct DispatcherSlot {
    armed: Arc<Mutex<Option<Armed>>>,
}

impl DispatcherSlot {
    /// Start a repeating timer on `runtime` on behalf of worker `owner`.
    ///
    /// The first firing happens one `period` after arming.
    pub fn arm<G>(
        &self,
        owner: WorkerId,
        runtime: &Handle,
        period: Duration,
        target: CurrentWorker,
        log: LogWriter,
        ids: G,
    ) where
        G: IdGenerator + 'static,
    {
        let timer = runtime.spawn(dispatch_loop(period, target, log, ids));
        self.arm_with(owner, timer.abort_handle());
    }

    /// Install an already running timer, stopping any previous one.
    pub fn arm_with(&self, owner: WorkerId, abort: AbortHandle) {
        let previous = self.lock().replace(Armed { owner, abort });
        if let Some(previous) = previous {
            tracing::debug!(owner = %previous.owner, "replacing armed dispatcher");
            previous.abort.abort();
        }
    }

    /// Stop the timer if it is still armed for `owner`. Returns whether it was.
    pub fn disarm(&self, owner: WorkerId) -> bool {
        let mut armed = self.lock();
        if !armed.as_ref().is_some_and(|current| current.owner == owner) {
            return false;
        }
        if let Some(current) = armed.take() {
            current.abort.abort();
        }
        true
    }

    /// Stop whatever timer is armed.
    pub fn disarm_any(&self) -> bool {
        match self.lock().take() {
            Some(armed) => {
                armed.abort.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    pub fn armed_owner(&self) -> Option<WorkerId> {
        self.lock().as_ref().map(|armed| armed.owner)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Armed>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn dispatch_loop<G: IdGenerator>(
    period: Duration,
    target: CurrentWorker,
    log: LogWriter,
    ids: G,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(port) = target.get() else {
            continue;
        };

        let log = log.clone();
        let task = LoopTask::new(ids.generate_task_id(), move || {
            log.append(running_line(&WorkerLabel::of_current_thread()));
        });
        let task_id = task.id();

        match port.post(task) {
            Ok(()) => tracing::trace!(%task_id, worker = %port.info().label, "task posted"),
            // 停止済みのワーカー。終了時に解除されるまでの間だけ起きうる
            Err(err) => tracing::debug!(%task_id, %err, "task not posted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{SystemClock, UlidGenerator};

    fn ids() -> UlidGenerator<SystemClock> {
        UlidGenerator::new(SystemClock)
    }

    fn pending_timer() -> AbortHandle {
        pending_task().abort_handle()
    }

    fn pending_task() -> tokio::task::JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[tokio::test]
    async fn arming_again_stops_the_previous_timer() {
        let slot = DispatcherSlot::default();
        let first = ids().generate_worker_id();
        let second = ids().generate_worker_id();

        let first_timer = pending_task();
        slot.arm_with(first, first_timer.abort_handle());
        slot.arm_with(second, pending_timer());

        let err = first_timer.await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(slot.armed_owner(), Some(second));
    }

    #[tokio::test]
    async fn disarm_ignores_other_owners() {
        let slot = DispatcherSlot::default();
        let owner = ids().generate_worker_id();
        let stranger = ids().generate_worker_id();

        slot.arm_with(owner, pending_timer());

        assert!(!slot.disarm(stranger));
        assert!(slot.is_armed());
        assert!(slot.disarm(owner));
        assert!(!slot.is_armed());
        assert!(!slot.disarm(owner));
    }

    #[tokio::test]
    async fn disarm_any_is_idempotent() {
        let slot = DispatcherSlot::default();
        slot.arm_with(ids().generate_worker_id(), pending_timer());

        assert!(slot.disarm_any());
        assert!(!slot.disarm_any());
    }

    #[tokio::test]
    async fn firing_without_a_worker_does_nothing() {
        let (writer, book, _drain) = crate::app::log_book::LogBook::spawn(SystemClock);
        let slot = DispatcherSlot::default();

        slot.arm(
            ids().generate_worker_id(),
            &Handle::current(),
            Duration::from_millis(10),
            CurrentWorker::default(),
            writer,
            ids(),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(book.is_empty());
        assert!(slot.disarm_any());
    }
}
