//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type で型分けする。
//! ULID は時刻でソートできるので、WorkerId の大小がそのまま世代の新旧になる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"worker-", "task-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは Ulid と同じ。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Worker のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// ワーカーへ投げるタスクのマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of one worker generation (one start).
pub type WorkerId = Id<Worker>;

/// Identifier of one task posted by the dispatcher.
pub type TaskId = Id<Task>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_marker_prefix() {
        let worker = WorkerId::from_ulid(Ulid::new());
        let task = TaskId::from_ulid(Ulid::new());

        assert!(worker.to_string().starts_with("worker-"));
        assert!(task.to_string().starts_with("task-"));
    }

    #[test]
    fn later_generations_sort_after_earlier_ones() {
        let first = WorkerId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = WorkerId::from_ulid(Ulid::new());

        assert!(first < second);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<WorkerId>(), size_of::<Ulid>());
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
    }

    #[test]
    fn ids_serialize_as_plain_ulid() {
        let ulid = Ulid::new();
        let id = WorkerId::from_ulid(ulid);

        let json = serde_json::to_string(&id).unwrap();
        let back: WorkerId = serde_json::from_str(&json).unwrap();

        assert_eq!(back, id);
        assert!(json.contains(&ulid.to_string()));
    }
}
