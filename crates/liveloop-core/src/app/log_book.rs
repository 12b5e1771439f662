//! LogBook - 追記専用のログ
//!
//! # 構成
//! - **LogWriter**: どのスレッドからでも `append()` できる送信側（Clone 可）
//! - **ドレインタスク**: 呼び出し側ランタイム上の唯一の書き手。チャネルから
//!   受け取った順に `LogEntry` を積む
//! - **LogBook**: 表示側。スナップショットと「増えたら起こす」通知を持つ
//!
//! 行の順序は `append()` がチャネルに積まれた順。別スレッドで起きた出来事の
//! 発生順とは一致しないことがある。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::LogEntry;
use crate::ports::Clock;

/// Sending half of the log. Cheap to clone, usable from any thread.
#[derive(Debug, Clone)]
pub struct LogWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl LogWriter {
    pub fn append(&self, line: impl Into<String>) {
        // drain が先に終わっている（LogBook ごと破棄済み）なら捨てる
        if let Err(err) = self.tx.send(line.into()) {
            tracing::debug!(line = %err.0, "log drain closed, line dropped");
        }
    }
}

/// Read side of the log.
///
/// Clone ごとに独立した通知受信側を持つ。
#[derive(Debug, Clone)]
pub struct LogBook {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    len_rx: watch::Receiver<usize>,
}

impl LogBook {
    /// Spawn the drain task on the current tokio runtime and return both halves.
    pub fn spawn<C: Clock + 'static>(clock: C) -> (LogWriter, LogBook, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (len_tx, len_rx) = watch::channel(0);
        let entries = Arc::new(Mutex::new(Vec::new()));

        let drain = tokio::spawn(drain(rx, Arc::clone(&entries), len_tx, clock));

        (LogWriter { tx }, LogBook { entries, len_rx }, drain)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries from `from` onwards; used by displays that stream new lines.
    pub fn entries_since(&self, from: usize) -> Vec<LogEntry> {
        self.lock().get(from..).map(<[LogEntry]>::to_vec).unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.line.clone()).collect()
    }

    /// The whole log as one text blob, every line terminated by `\n`.
    pub fn render(&self) -> String {
        self.lock().iter().fold(String::new(), |mut out, entry| {
            out.push_str(&entry.line);
            out.push('\n');
            out
        })
    }

    /// Wait until at least one new line has been stored.
    ///
    /// Returns `false` once every `LogWriter` is gone and the drain has finished.
    pub async fn changed(&mut self) -> bool {
        self.len_rx.changed().await.is_ok()
    }

    /// Wait until `pred` holds for the stored lines and return a snapshot.
    ///
    /// If the log is closed first, the last snapshot is returned as is.
    pub async fn wait_until<F>(&mut self, mut pred: F) -> Vec<String>
    where
        F: FnMut(&[String]) -> bool,
    {
        loop {
            let lines = self.lines();
            if pred(&lines) || !self.changed().await {
                return self.lines();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn drain<C: Clock>(
    mut rx: mpsc::UnboundedReceiver<String>,
    entries: Arc<Mutex<Vec<LogEntry>>>,
    len_tx: watch::Sender<usize>,
    clock: C,
) {
    while let Some(line) = rx.recv().await {
        tracing::info!(target: "liveloop::log", "{line}");
        let len = {
            let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.push(LogEntry::new(clock.now(), line));
            entries.len()
        };
        // 受信側がいなくても積んだ行は残る
        len_tx.send_replace(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2021, 11, 13, 9, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn lines_keep_append_order() {
        let (writer, mut book, _drain) = LogBook::spawn(clock());

        writer.append("one");
        writer.append("two");
        writer.append("three");

        let lines = book.wait_until(|lines| lines.len() == 3).await;
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(book.render(), "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn entries_are_stamped_by_the_clock() {
        let (writer, mut book, _drain) = LogBook::spawn(clock());

        writer.append("hello");
        book.wait_until(|lines| !lines.is_empty()).await;

        let entries = book.entries();
        assert_eq!(entries[0].at, clock().now());
        assert_eq!(entries[0].line, "hello");
    }

    #[tokio::test]
    async fn appends_from_other_threads_are_collected() {
        let (writer, mut book, _drain) = LogBook::spawn(clock());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let writer = writer.clone();
                std::thread::spawn(move || writer.append(format!("from thread {i}")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = tokio::time::timeout(
            Duration::from_secs(2),
            book.wait_until(|lines| lines.len() == 4),
        )
        .await
        .unwrap();
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn changed_reports_closed_log() {
        let (writer, mut book, drain) = LogBook::spawn(clock());

        writer.append("last");
        drop(writer);
        drain.await.unwrap();

        // 最後の行の通知は受け取れる
        assert!(book.changed().await);
        assert!(!book.changed().await);
        assert_eq!(book.lines(), vec!["last"]);
    }

    #[tokio::test]
    async fn entries_since_skips_seen_lines() {
        let (writer, mut book, _drain) = LogBook::spawn(clock());

        writer.append("a");
        writer.append("b");
        book.wait_until(|lines| lines.len() == 2).await;

        let rest = book.entries_since(1);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].line, "b");
        assert!(book.entries_since(5).is_empty());
    }
}
