//! Node repository: lookups and mutations backing filestore operations
//! (spec §4.1/§4.3).

use super::node_from_row;
use crate::domain::node::{Node, NodeState};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::entities::node;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    LockType, QueryFilter, QueryOrder, QuerySelect,
};

/// Look up a node by id. When `for_update` is set, the row is locked with
/// `SELECT ... FOR UPDATE` for the lifetime of the enclosing transaction
/// (spec §5) — callers must invoke this inside [`super::super::Database::with_transaction`].
pub async fn get_by_id<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    for_update: bool,
) -> CoreResult<Node> {
    let mut query = node::Entity::find_by_id(id);
    if for_update {
        query = query.lock(LockType::Update);
    }
    let row = query
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
    node_from_row(row)
}

pub async fn get_by_path<C: ConnectionTrait>(
    conn: &C,
    backend_mount_id: i64,
    path: &str,
) -> CoreResult<Option<Node>> {
    let row = node::Entity::find()
        .filter(node::Column::BackendMountId.eq(backend_mount_id))
        .filter(node::Column::Path.eq(path))
        .one(conn)
        .await?;
    row.map(node_from_row).transpose()
}

pub struct NewNode {
    pub backend_mount_id: i64,
    pub parent_id: Option<i64>,
    pub path: String,
    pub name: String,
    pub depth: i32,
    pub kind: crate::domain::node::NodeKind,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub content_hash: Option<String>,
    pub metadata: serde_json::Value,
}

pub async fn insert<C: ConnectionTrait>(conn: &C, new: NewNode) -> CoreResult<Node> {
    if let Some(existing) = get_by_path(conn, new.backend_mount_id, &new.path).await? {
        if existing.is_active() {
            return Err(CoreError::PathInUse(new.path));
        }
    }
    let now = Utc::now();
    let active = node::ActiveModel {
        id: Default::default(),
        backend_mount_id: Set(new.backend_mount_id),
        parent_id: Set(new.parent_id),
        path: Set(new.path),
        name: Set(new.name),
        depth: Set(new.depth),
        kind: Set(new.kind.to_string()),
        state: Set("active".to_string()),
        size_bytes: Set(new.size_bytes),
        checksum: Set(new.checksum),
        content_hash: Set(new.content_hash),
        metadata: Set(new.metadata),
        version: Set(1),
        consistency_state: Set("consistent".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        last_seen_at: Set(Some(now)),
        last_modified_at: Set(Some(now)),
        consistency_checked_at: Set(None),
        last_reconciled_at: Set(None),
    };
    let row = active.insert(conn).await?;
    node_from_row(row)
}

/// Apply a state/consistency transition with optimistic version check
/// (spec §4.5 — reconciliation writes observed state back under this).
pub async fn update_state<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    expected_version: i64,
    state: crate::domain::node::NodeState,
    consistency_state: crate::domain::node::ConsistencyState,
) -> CoreResult<Node> {
    let row = node::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
    if row.version != expected_version {
        return Err(CoreError::VersionConflict(format!("node {id}")));
    }
    let now = Utc::now();
    let mut active: node::ActiveModel = row.into();
    active.state = Set(state.to_string());
    active.consistency_state = Set(consistency_state.to_string());
    active.version = Set(expected_version + 1);
    active.updated_at = Set(now);
    active.consistency_checked_at = Set(Some(now));
    let row = active.update(conn).await?;
    node_from_row(row)
}

pub async fn children<C: ConnectionTrait>(conn: &C, parent_id: i64) -> CoreResult<Vec<Node>> {
    let rows = node::Entity::find()
        .filter(node::Column::ParentId.eq(parent_id))
        .all(conn)
        .await?;
    rows.into_iter().map(node_from_row).collect()
}

/// `path` itself plus every node whose path is a descendant of it (used by
/// move/copy/delete cascades, spec §4.3). Ordered shallowest-first so
/// callers can update parents before children.
pub async fn descendants<C: ConnectionTrait>(
    conn: &C,
    backend_mount_id: i64,
    path: &str,
) -> CoreResult<Vec<Node>> {
    let prefix = format!("{path}/%");
    let rows = node::Entity::find()
        .filter(node::Column::BackendMountId.eq(backend_mount_id))
        .filter(
            Condition::any()
                .add(node::Column::Path.eq(path))
                .add(node::Column::Path.like(&prefix)),
        )
        .order_by_asc(node::Column::Depth)
        .all(conn)
        .await?;
    rows.into_iter().map(node_from_row).collect()
}

/// Up to `batch_size` nodes in `{inconsistent, missing}`, newest-updated
/// first (spec §4.5 audit sweep).
pub async fn find_needing_audit<C: ConnectionTrait>(conn: &C, batch_size: u64) -> CoreResult<Vec<Node>> {
    let rows = node::Entity::find()
        .filter(
            Condition::any()
                .add(node::Column::State.eq("inconsistent"))
                .add(node::Column::State.eq("missing")),
        )
        .order_by_desc(node::Column::UpdatedAt)
        .limit(batch_size)
        .all(conn)
        .await?;
    rows.into_iter().map(node_from_row).collect()
}

/// Rewrite path/name/parent/depth after a move (spec §4.3 `move`), bumping
/// `version`.
pub async fn relocate<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    new_parent_id: Option<i64>,
    new_path: &str,
    new_name: &str,
    new_depth: i32,
) -> CoreResult<Node> {
    let row = node::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
    let now = Utc::now();
    let mut active: node::ActiveModel = row.clone().into();
    active.parent_id = Set(new_parent_id);
    active.path = Set(new_path.to_string());
    active.name = Set(new_name.to_string());
    active.depth = Set(new_depth);
    active.version = Set(row.version + 1);
    active.updated_at = Set(now);
    let row = active.update(conn).await?;
    node_from_row(row)
}

/// Merge/remove metadata keys (spec §4.3 `patch-metadata`), bumping `version`.
pub async fn patch_metadata<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    set: &std::collections::HashMap<String, serde_json::Value>,
    unset: &[String],
) -> CoreResult<Node> {
    let row = node::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
    let mut metadata = match row.metadata.clone() {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for key in unset {
        metadata.remove(key);
    }
    for (key, value) in set {
        metadata.insert(key.clone(), value.clone());
    }
    let now = Utc::now();
    let version = row.version + 1;
    let mut active: node::ActiveModel = row.into();
    active.metadata = Set(serde_json::Value::Object(metadata));
    active.version = Set(version);
    active.updated_at = Set(now);
    let row = active.update(conn).await?;
    node_from_row(row)
}

/// Overwrite content attributes after an upload (spec §4.3 `upload-file`
/// with `overwrite = true`), bumping `version`.
pub async fn overwrite_content<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    size_bytes: i64,
    checksum: Option<String>,
    content_hash: Option<String>,
) -> CoreResult<Node> {
    let row = node::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
    let now = Utc::now();
    let version = row.version + 1;
    let mut active: node::ActiveModel = row.into();
    active.size_bytes = Set(size_bytes);
    active.checksum = Set(checksum);
    active.content_hash = Set(content_hash);
    active.version = Set(version);
    active.updated_at = Set(now);
    active.last_modified_at = Set(Some(now));
    let row = active.update(conn).await?;
    node_from_row(row)
}

/// Soft-delete: mark `deleted`, leaving the row (and its path) in place for
/// audit; a new node may later reuse the path (spec §3 invariant: at most
/// one *non-deleted* node per path).
pub async fn soft_delete<C: ConnectionTrait>(conn: &C, id: i64) -> CoreResult<Node> {
    let row = node::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
    let now = Utc::now();
    let version = row.version + 1;
    let mut active: node::ActiveModel = row.into();
    active.state = Set(NodeState::Deleted.to_string());
    active.version = Set(version);
    active.updated_at = Set(now);
    let row = active.update(conn).await?;
    node_from_row(row)
}
