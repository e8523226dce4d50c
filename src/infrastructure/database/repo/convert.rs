//! Row <-> domain-type conversions shared by the repo submodules.

use crate::domain::node::{ConsistencyState, Node, NodeKind, NodeState};
use crate::error::CoreError;
use crate::infrastructure::database::entities::node;
use std::collections::HashMap;
use std::str::FromStr;

pub fn node_from_row(row: node::Model) -> Result<Node, CoreError> {
    let metadata: HashMap<String, serde_json::Value> = match row.metadata {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    Ok(Node {
        id: row.id,
        backend_mount_id: row.backend_mount_id,
        parent_id: row.parent_id,
        path: row.path,
        name: row.name,
        depth: row.depth,
        kind: NodeKind::from_str(&row.kind)
            .map_err(|_| CoreError::InvariantViolation(format!("bad node kind {}", row.kind)))?,
        state: NodeState::from_str(&row.state)
            .map_err(|_| CoreError::InvariantViolation(format!("bad node state {}", row.state)))?,
        size_bytes: row.size_bytes,
        checksum: row.checksum,
        content_hash: row.content_hash,
        metadata,
        version: row.version,
        consistency_state: ConsistencyState::from_str(&row.consistency_state).map_err(|_| {
            CoreError::InvariantViolation(format!(
                "bad node consistency state {}",
                row.consistency_state
            ))
        })?,
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_seen_at: row.last_seen_at,
        last_modified_at: row.last_modified_at,
        consistency_checked_at: row.consistency_checked_at,
        last_reconciled_at: row.last_reconciled_at,
    })
}
