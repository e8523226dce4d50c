//! Background rollup recalculation worker (spec §4.4): consumes
//! [`RollupScheduleCandidate`]s produced by a mutation's [`RollupPlan`] and
//! drives [`super::rollup::recalculate_and_cascade`] through the queue
//! runtime (C9).

use super::rollup::recalculate_and_cascade;
use super::rollup_cache::RollupCache;
use crate::config::RollupConfig;
use crate::domain::rollup::RollupScheduleCandidate;
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::Database;
use crate::infrastructure::queue::Queue;

/// `true` if `candidate` crosses the depth/child-delta threshold spec §4.4
/// uses to decide a touched subtree needs a background recalculation pass
/// rather than relying on the synchronous delta alone.
pub fn needs_recalculation(candidate: &RollupScheduleCandidate, config: &RollupConfig) -> bool {
    candidate.depth as u32 >= config.recalc_depth_threshold
        || candidate.child_count_delta.unsigned_abs() as i64 >= config.recalc_child_threshold
}

/// Enqueue every candidate crossing the threshold (spec §4.4 `afterCommit`).
/// Coalesced by `job_key = rollup:<nodeId>` — a burst of mutations under the
/// same subtree collapses to one recalculation pass.
pub async fn enqueue_candidates(
    queue: &dyn Queue,
    candidates: &[RollupScheduleCandidate],
    config: &RollupConfig,
) -> CoreResult<()> {
    for candidate in candidates {
        if !needs_recalculation(candidate, config) {
            continue;
        }
        let payload = serde_json::json!({
            "nodeId": candidate.node_id,
            "backendMountId": candidate.backend_mount_id,
            "reason": candidate.reason,
        });
        queue.enqueue(payload, Some(format!("rollup:{}", candidate.node_id))).await?;
    }
    Ok(())
}

/// The handler bound into a [`Queue`] for the rollup queue: recalculates and
/// cascades, then invalidates the cache so the next read falls through to
/// C1 and re-populates with the fresh summary.
pub async fn run_recalculation(
    db: &Database,
    cache: &RollupCache,
    max_cascade_depth: u32,
    payload: serde_json::Value,
) -> CoreResult<serde_json::Value> {
    let node_id = payload
        .get("nodeId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| CoreError::InvariantViolation("rollup job payload missing nodeId".into()))?;

    db.with_transaction(|txn| async move { recalculate_and_cascade(txn, node_id, max_cascade_depth).await })
        .await?;

    cache.invalidate(node_id);
    Ok(serde_json::json!({ "nodeId": node_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> RollupConfig {
        RollupConfig {
            queue_name: "rollup".into(),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 16,
            recalc_depth_threshold: 4,
            recalc_child_threshold: 50,
            max_cascade_depth: 64,
        }
    }

    #[test]
    fn crosses_threshold_on_depth() {
        let candidate = RollupScheduleCandidate { node_id: 1, backend_mount_id: 1, reason: "mutation", depth: 5, child_count_delta: 0 };
        assert!(needs_recalculation(&candidate, &config()));
    }

    #[test]
    fn crosses_threshold_on_child_delta() {
        let candidate = RollupScheduleCandidate { node_id: 1, backend_mount_id: 1, reason: "mutation", depth: 1, child_count_delta: -60 };
        assert!(needs_recalculation(&candidate, &config()));
    }

    #[test]
    fn below_threshold_is_skipped() {
        let candidate = RollupScheduleCandidate { node_id: 1, backend_mount_id: 1, reason: "mutation", depth: 1, child_count_delta: 1 };
        assert!(!needs_recalculation(&candidate, &config()));
    }
}
