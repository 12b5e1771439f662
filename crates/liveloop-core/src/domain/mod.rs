//! Domain model (ids, labels, status, log entries).
//!
//! ランタイム（スレッド・タイマー・チャネル）には依存しない値だけを置く。

pub mod ids;
pub mod label;
pub mod log_entry;
pub mod status;
pub mod worker;

pub use ids::{TaskId, WorkerId};
pub use label::WorkerLabel;
pub use log_entry::{
    ENDED_LINE, LogEntry, STARTED_LINE, STARTING_LINE, parse_running_line, running_line,
};
pub use status::{Status, Transition};
pub use worker::WorkerInfo;
