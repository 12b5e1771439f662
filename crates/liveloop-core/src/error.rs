use thiserror::Error;

/// liveloop-core の共通エラー型
///
/// start/stop の不正な遷移はエラーではなく `Transition::Ignored` で表す。
/// ここにあるのは OS やランタイム由来の本物の失敗だけ。
#[derive(Debug, Error)]
pub enum LivingError {
    #[error("no tokio runtime on the calling thread: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to build event loop for worker {label}: {source}")]
    EventLoop {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn worker thread {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {0} is no longer accepting tasks")]
    WorkerGone(String),

    #[error("worker thread {0} panicked")]
    WorkerPanicked(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, LivingError>;
