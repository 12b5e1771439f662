use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{WorkerId, WorkerLabel};

/// WorkerInfo はワーカー 1 世代分の識別情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub label: WorkerLabel,
    pub started_at: DateTime<Utc>,
}
