//! Per-dataset staging spool record (spec §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StagingStatus {
    Open,
    Flushing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingBatch {
    pub id: i64,
    pub dataset_id: i64,
    pub table_name: String,
    pub schema_version_id: i64,
    pub partition_key: HashMap<String, serde_json::Value>,
    pub partition_attributes: HashMap<String, serde_json::Value>,
    pub time_range: TimeRange,
    pub ingestion_signature: String,
    pub status: StagingStatus,
    pub row_count: i64,
    pub byte_count: i64,
    /// Key into the redb spool holding this batch's row data.
    pub spool_key: String,
    pub received_at: DateTime<Utc>,
}
