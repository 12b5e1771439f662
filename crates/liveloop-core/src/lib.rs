//! liveloop-core
//!
//! バックグラウンドスレッドを 1 本だけ生かし続け、そのイベントループへ
//! 一定周期でタスクを投げるための部品。
//!
//! # モジュール構成
//! - **domain**: 値オブジェクト（ids, label, status, log entry）
//! - **ports**: 差し替え可能な抽象（Clock, IdGenerator）
//! - **app**: コントローラ、ワーカーループ、ディスパッチャ、ログ
//! - **config**: 起動時設定
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use app::{LivingController, LogBook};
pub use config::LivingConfig;
pub use domain::{LogEntry, Status, Transition, WorkerInfo};
pub use error::{LivingError, Result};
