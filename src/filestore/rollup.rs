//! Rollup plan application and ancestor cascade (spec §4.4, component C4).

use crate::domain::node::NodeKind;
use crate::domain::rollup::{Rollup, RollupPlan, RollupState};
use crate::error::CoreResult;
use crate::infrastructure::database::repo;
use sea_orm::ConnectionTrait;
use std::collections::HashSet;

/// Apply `plan`'s ensure → increment → invalidate sequence in deterministic
/// node-id order (spec §4.4 — avoids lock-order deadlocks across concurrent
/// mutations touching overlapping subtrees). Callers invoke this inside the
/// same transaction as the mutation it was built from.
pub async fn apply_plan<C: ConnectionTrait>(conn: &C, plan: &RollupPlan) -> CoreResult<Vec<Rollup>> {
    let mut ensure_ids = plan.ensure.clone();
    ensure_ids.sort_unstable();
    ensure_ids.dedup();
    for node_id in ensure_ids {
        repo::rollups::ensure(conn, node_id).await?;
    }

    let mut increments = plan.increments.clone();
    increments.sort_unstable_by_key(|i| i.node_id);
    let mut updated = Vec::with_capacity(increments.len());
    for increment in &increments {
        updated.push(repo::rollups::apply_delta(conn, increment.node_id, increment).await?);
    }

    let mut invalidations = plan.invalidate.clone();
    invalidations.sort_unstable_by_key(|i| i.node_id);
    for invalidate in &invalidations {
        repo::rollups::set_state(conn, invalidate.node_id, invalidate.state).await?;
    }

    Ok(updated)
}

/// Recompute `node_id`'s rollup from its current node and active children
/// (spec §4.4 `recalculateRollup`): children are either `up_to_date` — and
/// so contribute their own rollup sums — or counted as zero with this
/// node's result marked `pending` in turn. Returns the new record and the
/// parent id so the caller can cascade.
pub async fn recalculate_node<C: ConnectionTrait>(conn: &C, node_id: i64) -> CoreResult<(Rollup, Option<i64>)> {
    let node = repo::nodes::get_by_id(conn, node_id, false).await?;
    let children = repo::nodes::children(conn, node_id).await?;

    let mut size_bytes = 0i64;
    let mut file_count = 0i64;
    let mut directory_count = 0i64;
    let mut child_count = 0i64;
    let mut any_child_pending = false;

    for child in children.iter().filter(|c| c.is_active()) {
        child_count += 1;
        match child.kind {
            NodeKind::File => {
                file_count += 1;
                size_bytes += child.size_bytes;
            }
            NodeKind::Directory => {
                directory_count += 1;
                match repo::rollups::get(conn, child.id, false).await? {
                    Some(child_rollup) if child_rollup.state == RollupState::UpToDate => {
                        size_bytes += child_rollup.size_bytes;
                        file_count += child_rollup.file_count;
                        directory_count += child_rollup.directory_count;
                    }
                    _ => any_child_pending = true,
                }
            }
        }
    }

    repo::rollups::ensure(conn, node_id).await?;
    let mut rollup = repo::rollups::recalculate(conn, node_id, size_bytes, file_count, directory_count, child_count).await?;
    if any_child_pending {
        rollup = repo::rollups::set_state(conn, node_id, RollupState::Pending).await?;
    }
    Ok((rollup, node.parent_id))
}

/// Cascade [`recalculate_node`] from `node_id` up to the root, stopping at
/// `parentId = null`, a revisited node, or `max_cascade_depth` (spec §4.4
/// safety bound, default 64).
pub async fn recalculate_and_cascade<C: ConnectionTrait>(
    conn: &C,
    node_id: i64,
    max_cascade_depth: u32,
) -> CoreResult<()> {
    let mut current = Some(node_id);
    let mut visited = HashSet::new();
    let mut hops = 0u32;
    while let Some(id) = current {
        if !visited.insert(id) || hops >= max_cascade_depth {
            break;
        }
        hops += 1;
        let (_, parent_id) = recalculate_node(conn, id).await?;
        current = parent_id;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NodeKind;
    use crate::infrastructure::database::{repo::nodes::NewNode, Database};

    async fn make_directory(db: &Database, mount_id: i64, parent_id: Option<i64>, path: &str, depth: i32) -> i64 {
        db.with_connection(|conn| async move {
            repo::nodes::insert(
                conn,
                NewNode {
                    backend_mount_id: mount_id,
                    parent_id,
                    path: path.to_string(),
                    name: path.rsplit('/').next().unwrap_or(path).to_string(),
                    depth,
                    kind: NodeKind::Directory,
                    size_bytes: 0,
                    checksum: None,
                    content_hash: None,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap()
            .id
        })
        .await
    }

    #[tokio::test]
    async fn recalculate_sums_active_file_children() {
        let db = Database::in_memory().await.unwrap();
        let root_id = make_directory(&db, 1, None, "root", 1).await;
        db.with_connection(|conn| async move {
            repo::rollups::ensure(conn, root_id).await.unwrap();
            repo::nodes::insert(
                conn,
                NewNode {
                    backend_mount_id: 1,
                    parent_id: Some(root_id),
                    path: "root/a.txt".into(),
                    name: "a.txt".into(),
                    depth: 2,
                    kind: NodeKind::File,
                    size_bytes: 100,
                    checksum: None,
                    content_hash: None,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
        })
        .await;

        db.with_connection(|conn| async move { recalculate_node(conn, root_id).await.unwrap() }).await;

        let rollup = db
            .with_connection(|conn| async move { repo::rollups::get(conn, root_id, false).await.unwrap().unwrap() })
            .await;
        assert_eq!(rollup.size_bytes, 100);
        assert_eq!(rollup.file_count, 1);
        assert_eq!(rollup.state, RollupState::UpToDate);
    }
}
