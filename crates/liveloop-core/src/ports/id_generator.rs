//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + ランダム部で ULID を作る

use crate::domain::{TaskId, WorkerId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はワーカー世代とタスクの ID を生成
///
/// # Thread Safety
/// - ディスパッチャのタイマータスクからも呼ぶので `Send + Sync`
pub trait IdGenerator: Send + Sync {
    fn generate_worker_id(&self) -> WorkerId;

    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が固定される（ランダム部は毎回変わる）。
#[derive(Debug, Clone)]
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_worker_id(&self) -> WorkerId {
        WorkerId::from(self.next_ulid())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }
}
