//! WorkerLoop - 生き続けるバックグラウンドスレッド
//!
//! # フロー
//! 1. ラベル名の OS スレッドを立て、その上で current-thread の tokio ランタイムを回す
//! 2. `select!` で「投げられたタスク」「停止フラグ」「キャンセル」を待つ
//! 3. タスクが来たら実行し、次の周回の頭でフラグを確認する
//! 4. ループを抜けたら自分の世代のディスパッチャを解除し、終了をログに残す
//!
//! 停止フラグはコントローラ全体で共有、キャンセルはワーカーごと。
//! どちらか一方が立てばループは終わる。

use std::io;
use std::thread;

use tokio::sync::{mpsc, watch};

use crate::app::dispatcher::DispatcherSlot;
use crate::app::log_book::LogWriter;
use crate::domain::{ENDED_LINE, TaskId, WorkerInfo};
use crate::error::{LivingError, Result};

/// A unit of work posted onto a worker's loop.
pub struct LoopTask {
    id: TaskId,
    body: Box<dyn FnOnce() + Send + 'static>,
}

impl LoopTask {
    pub fn new<F>(id: TaskId, body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            body: Box::new(body),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    fn run(self) {
        (self.body)()
    }
}

impl std::fmt::Debug for LoopTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopTask").field("id", &self.id).finish()
    }
}

/// Why a worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The shared stop flag was set.
    Stopped,
    /// This worker was cancelled because a newer one replaced it.
    Cancelled,
    /// Every controlling handle was dropped.
    Detached,
}

/// Sending side of a worker's task channel, as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct WorkerPort {
    info: WorkerInfo,
    tasks: mpsc::UnboundedSender<LoopTask>,
}

impl WorkerPort {
    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    /// Fire-and-forget: queue `task` on the worker without waiting for it to run.
    pub fn post(&self, task: LoopTask) -> Result<()> {
        self.tasks
            .send(task)
            .map_err(|_| LivingError::WorkerGone(self.info.label.to_string()))
    }
}

/// Everything a new worker needs from its controller.
pub(crate) struct WorkerSpawn {
    pub info: WorkerInfo,
    pub stop_rx: watch::Receiver<bool>,
    pub log: LogWriter,
    pub dispatcher: DispatcherSlot,
    pub stack_size: Option<usize>,
}

/// Owning handle of one worker generation.
///
/// Dropping the handle detaches the worker; its loop then exits on its own.
#[derive(Debug)]
pub struct WorkerHandle {
    port: WorkerPort,
    cancel_tx: watch::Sender<bool>,
    join: thread::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn info(&self) -> &WorkerInfo {
        &self.port.info
    }

    pub fn port(&self) -> WorkerPort {
        self.port.clone()
    }

    /// Best-effort cancellation. Does not wait for the loop to notice.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// `true` once the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the worker thread returns.
    pub fn join(self) -> Result<()> {
        let label = self.port.info.label.to_string();
        let Self { port, cancel_tx, join } = self;
        // 自分の送信側を先に落としておく。残っていると Detached で抜けられない
        drop(port);
        let joined = join.join();
        drop(cancel_tx);
        joined.map_err(|_| LivingError::WorkerPanicked(label))
    }
}

/// Outcome of building the worker's event loop, sent back before `spawn` returns.
type ReadyRx = std::sync::mpsc::Receiver<io::Result<()>>;

/// Launch a worker thread named after `spawn.info.label`.
///
/// The event loop is built on the new thread. Blocks until it is up or has failed.
pub(crate) fn spawn(spawn: WorkerSpawn) -> Result<WorkerHandle> {
    let WorkerSpawn {
        info,
        stop_rx,
        log,
        dispatcher,
        stack_size,
    } = spawn;
    let label = info.label.to_string();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (task_tx, task_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

    let worker_id = info.id;
    let thread_label = label.clone();
    let mut builder = thread::Builder::new().name(label.clone());
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    let join = builder
        .spawn(move || {
            // ランタイムはこのスレッドで作ってこのスレッドで捨てる
            let event_loop = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(event_loop) => {
                    let _ = ready_tx.send(Ok(()));
                    event_loop
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            tracing::debug!(worker = %thread_label, %worker_id, "worker loop entered");
            let reason = event_loop.block_on(run_loop(stop_rx, cancel_rx, task_rx));
            tracing::info!(worker = %thread_label, %worker_id, ?reason, "worker loop exited");

            if dispatcher.disarm(worker_id) {
                tracing::debug!(worker = %thread_label, "dispatcher disarmed by exiting worker");
            }
            log.append(ENDED_LINE);
        })
        .map_err(|source| LivingError::Spawn {
            label: label.clone(),
            source,
        })?;

    wait_ready(&ready_rx, &label)?;

    Ok(WorkerHandle {
        port: WorkerPort {
            info,
            tasks: task_tx,
        },
        cancel_tx,
        join,
    })
}

fn wait_ready(ready_rx: &ReadyRx, label: &str) -> Result<()> {
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(LivingError::EventLoop {
            label: label.to_string(),
            source,
        }),
        // 報告前にスレッドが落ちた
        Err(_) => Err(LivingError::WorkerPanicked(label.to_string())),
    }
}

async fn run_loop(
    mut stop_rx: watch::Receiver<bool>,
    mut cancel_rx: watch::Receiver<bool>,
    mut tasks: mpsc::UnboundedReceiver<LoopTask>,
) -> ExitReason {
    loop {
        // 周回の頭でフラグを見る
        let stopped = *stop_rx.borrow_and_update();
        if stopped {
            return ExitReason::Stopped;
        }
        let cancelled = *cancel_rx.borrow_and_update();
        if cancelled {
            return ExitReason::Cancelled;
        }

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return ExitReason::Detached;
                }
            }
            changed = cancel_rx.changed() => {
                if changed.is_err() {
                    return ExitReason::Detached;
                }
            }
            task = tasks.recv() => match task {
                Some(task) => {
                    tracing::trace!(task_id = %task.id(), "running posted task");
                    task.run();
                }
                None => return ExitReason::Detached,
            },
        }
    }
}
