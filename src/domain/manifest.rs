//! Dataset manifest: one per dataset per shard day (spec §3, §4.7).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    Draft,
    Published,
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub row_count: i64,
    pub byte_size: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for ManifestSummary {
    fn default() -> Self {
        Self { row_count: 0, byte_size: 0, start_time: None, end_time: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: i64,
    pub dataset_id: i64,
    pub shard: NaiveDate,
    pub version: i32,
    pub status: ManifestStatus,
    pub schema_version_id: i64,
    pub partition_ids: Vec<i64>,
    pub summary: ManifestSummary,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    pub fn total_rows(&self, partitions: &[super::partition::Partition]) -> i64 {
        partitions.iter().filter(|p| self.partition_ids.contains(&p.id)).map(|p| p.row_count).sum()
    }
}
