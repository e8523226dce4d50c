//! Append-only record of every committed mutation (spec §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub node_id: Option<i64>,
    pub command_kind: String,
    pub payload: serde_json::Value,
    pub result: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}
