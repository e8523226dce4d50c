//! Immutable partition files (spec §3, §4.7, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Duckdb,
    Parquet,
    Clickhouse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub min: Option<serde_json::Value>,
    pub max: Option<serde_json::Value>,
    pub null_count: i64,
    pub row_count: i64,
    /// Bloom filter bits, present only for columns configured for it.
    pub bloom_filter: Option<Vec<u8>>,
    /// Equi-width histogram bin counts, present only for configured columns.
    pub histogram: Option<Vec<i64>>,
}

impl ColumnStatistics {
    /// Whether the predicate `col >= value` can be definitively excluded
    /// by this column's statistics (spec §4.8 step 4).
    pub fn excludes_ge(&self, value: &serde_json::Value) -> bool {
        match (&self.max, value) {
            (Some(max), v) => compare_json(max, v) == std::cmp::Ordering::Less,
            _ => false,
        }
    }

    pub fn excludes_le(&self, value: &serde_json::Value) -> bool {
        match (&self.min, value) {
            (Some(min), v) => compare_json(min, v) == std::cmp::Ordering::Greater,
            _ => false,
        }
    }

    pub fn excludes_eq(&self, value: &serde_json::Value) -> bool {
        self.excludes_ge(value) || self.excludes_le(value)
    }
}

fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub id: i64,
    pub manifest_id: i64,
    pub storage_target_id: i64,
    pub partition_key: HashMap<String, serde_json::Value>,
    pub partition_attributes: HashMap<String, serde_json::Value>,
    pub file_format: FileFormat,
    pub file_path: String,
    pub file_size_bytes: i64,
    pub row_count: i64,
    pub checksum: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub column_statistics: HashMap<String, ColumnStatistics>,
    pub ingestion_signature: String,
    pub created_at: DateTime<Utc>,
}

impl Partition {
    /// Does `[start_time, end_time)` intersect the query window?
    pub fn intersects(&self, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> bool {
        self.start_time < range_end && self.end_time > range_start
    }
}
