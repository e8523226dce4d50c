//! Reconciliation job record (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl ReconciliationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationReason {
    Drift,
    Audit,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationJob {
    pub id: i64,
    pub job_key: String,
    pub backend_mount_id: i64,
    pub node_id: Option<i64>,
    pub path: String,
    pub status: ReconciliationStatus,
    pub attempt: i32,
    pub reason: ReconciliationReason,
    pub detect_children: bool,
    pub error: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReconciliationJob {
    pub fn job_key(backend_mount_id: i64, path: &str) -> String {
        format!("reconcile:{backend_mount_id}:{path}")
    }
}

/// Outcome returned to callers after a job runs; kept distinct from the
/// persisted `status` field per spec §9's `status`/`outcome` resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub job_id: i64,
    pub status: ReconciliationStatus,
    pub node_id: Option<i64>,
    pub detail: String,
}
