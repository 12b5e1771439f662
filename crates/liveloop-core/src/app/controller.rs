//! LivingController - ワーカーのライフサイクル管理
//!
//! # 公開操作
//! - **start_living / start**: ワーカーを立ててディスパッチャを arm する
//! - **stop_living / stop**: 停止フラグを立てるだけ。後片付けはワーカー側
//! - **log**: 追記専用ログの表示側
//!
//! 状態・停止フラグ・ワーカー/タイマーの参照を書き換えるのは `&mut self` の
//! メソッドだけなので、書き手は常に呼び出し側の 1 コンテキストに限られる。

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::app::dispatcher::{CurrentWorker, DispatcherSlot};
use crate::app::log_book::{LogBook, LogWriter};
use crate::app::worker_loop::{self, WorkerHandle, WorkerSpawn};
use crate::config::LivingConfig;
use crate::domain::{STARTED_LINE, STARTING_LINE, Status, Transition, WorkerInfo, WorkerLabel};
use crate::error::Result;
use crate::ports::{Clock, IdGenerator, SharedClock, SystemClock, UlidGenerator};

pub struct LivingController {
    config: LivingConfig,
    status: Status,
    stop_tx: watch::Sender<bool>,
    worker: Option<WorkerHandle>,
    /// Replaced workers that may still be winding down.
    retired: Vec<WorkerHandle>,
    target: CurrentWorker,
    dispatcher: DispatcherSlot,
    clock: SharedClock,
    ids: UlidGenerator<SharedClock>,
    log: LogWriter,
    book: LogBook,
    runtime: Handle,
    has_history: bool,
}

impl LivingController {
    /// Must be called from within a tokio runtime; the dispatcher timer and the
    /// log writer run on it.
    pub fn new(config: LivingConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LivingConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()?;
        let (log, book, _drain) = LogBook::spawn(Arc::clone(&clock));
        let (stop_tx, _) = watch::channel(true);

        Ok(Self {
            config,
            status: Status::Stopped,
            stop_tx,
            worker: None,
            retired: Vec::new(),
            target: CurrentWorker::default(),
            dispatcher: DispatcherSlot::default(),
            ids: UlidGenerator::new(Arc::clone(&clock)),
            clock,
            log,
            book,
            runtime,
            has_history: false,
        })
    }

    /// UI の「Start living」ボタン
    pub fn start_living(&mut self) -> Result<Transition> {
        self.start()
    }

    /// UI の「Stop living」ボタン
    pub fn stop_living(&mut self) -> Transition {
        self.stop()
    }

    pub fn start(&mut self) -> Result<Transition> {
        if self.status == Status::Running {
            tracing::debug!("start ignored, already running");
            return Ok(Transition::Ignored);
        }

        if let Some(previous) = self.worker.take() {
            if !previous.is_cancelled() {
                tracing::debug!(worker = %previous.info().label, "cancelling previous worker");
                previous.cancel();
            }
            self.retired.push(previous);
        }
        self.retired.retain(|worker| !worker.is_finished());

        self.stop_tx.send_replace(false);

        if self.has_history {
            self.log.append(self.config.separator.clone());
        }
        self.has_history = true;
        self.log.append(STARTING_LINE);

        let info = WorkerInfo {
            id: self.ids.generate_worker_id(),
            label: WorkerLabel::random(self.config.label_length),
            started_at: self.clock.now(),
        };
        let worker = worker_loop::spawn(WorkerSpawn {
            info,
            stop_rx: self.stop_tx.subscribe(),
            log: self.log.clone(),
            dispatcher: self.dispatcher.clone(),
            stack_size: self.config.worker_stack_size,
        })?;
        let owner = worker.info().id;
        tracing::info!(worker = %worker.info().label, worker_id = %owner, "worker started");

        self.target.set(worker.port());
        self.worker = Some(worker);
        self.log.append(STARTED_LINE);

        self.dispatcher.arm(
            owner,
            &self.runtime,
            self.config.dispatch_interval(),
            self.target.clone(),
            self.log.clone(),
            self.ids.clone(),
        );
        self.status = Status::Running;
        Ok(Transition::Applied)
    }

    /// Request the worker to stop. Returns before the worker has exited.
    pub fn stop(&mut self) -> Transition {
        if self.status == Status::Stopped {
            tracing::debug!("stop ignored, already stopped");
            return Transition::Ignored;
        }

        self.stop_tx.send_replace(true);
        self.status = Status::Stopped;
        tracing::info!("stop requested");
        Transition::Applied
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn config(&self) -> &LivingConfig {
        &self.config
    }

    /// The most recently started worker, even after a stop request.
    pub fn current_worker(&self) -> Option<&WorkerInfo> {
        self.worker.as_ref().map(WorkerHandle::info)
    }

    pub fn is_dispatcher_armed(&self) -> bool {
        self.dispatcher.is_armed()
    }

    /// Workers whose thread has not returned yet, current one included.
    pub fn live_workers(&self) -> usize {
        self.worker
            .iter()
            .chain(self.retired.iter())
            .filter(|worker| !worker.is_finished())
            .count()
    }

    /// A fresh observer of the log.
    pub fn log(&self) -> LogBook {
        self.book.clone()
    }

    /// Stop, cancel and join every worker thread this controller started.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop();
        self.dispatcher.disarm_any();
        self.target.clear();

        let workers: Vec<WorkerHandle> = self
            .worker
            .take()
            .into_iter()
            .chain(self.retired.drain(..))
            .collect();
        for worker in &workers {
            worker.cancel();
        }

        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(WorkerHandle::join)
                .collect::<Result<Vec<()>>>()
        })
        .await?;
        joined?;
        tracing::info!("controller shut down");
        Ok(())
    }
}

impl Drop for LivingController {
    fn drop(&mut self) {
        // スレッドは待たない。キャンセルだけ伝えて抜ける
        self.dispatcher.disarm_any();
        self.target.clear();
        for worker in self.worker.iter().chain(self.retired.iter()) {
            worker.cancel();
        }
    }
}

impl std::fmt::Debug for LivingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivingController")
            .field("status", &self.status)
            .field("worker", &self.current_worker())
            .field("retired", &self.retired.len())
            .field("dispatcher_armed", &self.is_dispatcher_armed())
            .finish()
    }
}
