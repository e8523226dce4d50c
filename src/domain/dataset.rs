//! Timestore dataset (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub default_storage_target_id: i64,
    pub status: DatasetStatus,
    pub metadata: HashMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}
