//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **LivingController**: start/stop とワーカー世代の管理
//! - **WorkerLoop**: 生き続けるスレッドとそのイベントループ
//! - **Dispatcher**: 一定周期でワーカーへタスクを投げるタイマー
//! - **LogBook**: 単一の書き手で直列化される追記専用ログ

pub mod controller;
pub mod dispatcher;
pub mod log_book;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::controller::LivingController;
pub use self::dispatcher::{CurrentWorker, DispatcherSlot};
pub use self::log_book::{LogBook, LogWriter};
pub use self::worker_loop::{ExitReason, LoopTask, WorkerHandle, WorkerPort};
