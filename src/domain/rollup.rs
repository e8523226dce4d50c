//! Per-node aggregate of descendant size/file/directory counts (spec §3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RollupState {
    UpToDate,
    Pending,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rollup {
    pub node_id: i64,
    pub size_bytes: i64,
    pub file_count: i64,
    pub directory_count: i64,
    pub child_count: i64,
    pub state: RollupState,
    pub last_calculated_at: Option<DateTime<Utc>>,
}

impl Rollup {
    pub fn empty(node_id: i64) -> Self {
        Self {
            node_id,
            size_bytes: 0,
            file_count: 0,
            directory_count: 0,
            child_count: 0,
            state: RollupState::Pending,
            last_calculated_at: None,
        }
    }
}

/// A single delta to apply to a rollup row (spec §4.4 `increments[]`).
#[derive(Debug, Clone, Default)]
pub struct RollupIncrement {
    pub node_id: i64,
    pub size_bytes_delta: i64,
    pub file_count_delta: i64,
    pub directory_count_delta: i64,
    pub child_count_delta: i64,
    pub mark_pending: bool,
}

/// `{nodeId, state}` pair marking a rollup as no-longer-trustworthy.
#[derive(Debug, Clone)]
pub struct RollupInvalidate {
    pub node_id: i64,
    pub state: RollupState,
}

/// A candidate for the background recalculation queue.
#[derive(Debug, Clone)]
pub struct RollupScheduleCandidate {
    pub node_id: i64,
    pub backend_mount_id: i64,
    pub reason: &'static str,
    pub depth: i32,
    pub child_count_delta: i64,
}

/// Synchronously produced during a mutation transaction, applied by
/// [`crate::filestore::rollup::apply_plan`].
#[derive(Debug, Clone, Default)]
pub struct RollupPlan {
    pub ensure: Vec<i64>,
    pub increments: Vec<RollupIncrement>,
    pub invalidate: Vec<RollupInvalidate>,
    pub touched_node_ids: Vec<i64>,
    pub schedule_candidates: Vec<RollupScheduleCandidate>,
}

impl RollupPlan {
    pub fn is_empty(&self) -> bool {
        self.ensure.is_empty() && self.increments.is_empty() && self.invalidate.is_empty()
    }
}
