//! WorkerLabel - ワーカーの短いランダム名
//!
//! ラベルはそのまま OS スレッド名になり、ディスパッチされたタスクは
//! `std::thread::current().name()` でこれを読み返す。

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Label shown for a task that runs on a thread without a name.
pub const UNNAMED_THREAD: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerLabel(String);

impl WorkerLabel {
    /// `[a-zA-Z0-9]` から `len` 文字をランダムに選ぶ
    pub fn random(len: usize) -> Self {
        Self::random_with(&mut rand::thread_rng(), len)
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let label = rng
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        Self(label)
    }

    /// Label of the thread this is called on, `---` if it has none.
    pub fn of_current_thread() -> String {
        std::thread::current()
            .name()
            .unwrap_or(UNNAMED_THREAD)
            .to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerLabel {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for WorkerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_label_has_requested_length_and_alphabet() {
        let label = WorkerLabel::random(5);
        assert_eq!(label.as_str().len(), 5);
        assert!(label.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let a = WorkerLabel::random_with(&mut StdRng::seed_from_u64(7), 8);
        let b = WorkerLabel::random_with(&mut StdRng::seed_from_u64(7), 8);
        assert_eq!(a, b);
    }

    #[test]
    fn named_thread_reports_its_label() {
        let name = std::thread::Builder::new()
            .name("abcde".to_string())
            .spawn(WorkerLabel::of_current_thread)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name, "abcde");
    }

    #[test]
    fn unnamed_thread_reports_placeholder() {
        let name = std::thread::spawn(WorkerLabel::of_current_thread)
            .join()
            .unwrap();
        assert_eq!(name, UNNAMED_THREAD);
    }
}
