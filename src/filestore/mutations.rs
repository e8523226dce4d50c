//! Mutation pipeline (spec §4.3, component C3): the command handlers behind
//! the filestore HTTP surface (spec §6) — create-directory, upload-file,
//! move, copy, delete, patch-metadata. Each command resolves nodes under a
//! row lock, builds a rollup plan for the affected subtree, executes the
//! backend side-effect, and commits atomically with its journal entry;
//! cache invalidation, background recalculation scheduling, and event
//! publication happen after commit.

use super::rollup::{self, recalculate_and_cascade};
use super::rollup_cache::RollupCache;
use super::rollup_worker;
use crate::config::RollupConfig;
use crate::domain::node::{file_name, normalize_path, parent_path, path_depth, Node, NodeKind};
use crate::domain::rollup::{RollupIncrement, RollupPlan, RollupScheduleCandidate};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::backend::{Backend, BackendRegistry};
use crate::infrastructure::database::repo::nodes::NewNode;
use crate::infrastructure::database::{repo, Database};
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::queue::Queue;
use bytes::Bytes;
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CreateDirectoryRequest {
    pub backend_mount_id: i64,
    pub path: String,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadFileRequest {
    pub backend_mount_id: i64,
    pub path: String,
    pub content: Bytes,
    pub checksum: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub overwrite: Option<bool>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub backend_mount_id: i64,
    pub from_path: String,
    pub to_path: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub backend_mount_id: i64,
    pub from_path: String,
    pub to_path: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub backend_mount_id: i64,
    pub path: String,
    pub recursive: Option<bool>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PatchMetadataRequest {
    pub backend_mount_id: i64,
    pub path: String,
    pub set: HashMap<String, serde_json::Value>,
    pub unset: Vec<String>,
    pub idempotency_key: Option<String>,
}

pub struct FilestoreService {
    db: Arc<Database>,
    backends: Arc<BackendRegistry>,
    events: EventBus,
    rollup_cache: Arc<RollupCache>,
    rollup_config: RollupConfig,
    rollup_queue: Arc<dyn Queue>,
}

impl FilestoreService {
    pub fn new(
        db: Arc<Database>,
        backends: Arc<BackendRegistry>,
        events: EventBus,
        rollup_cache: Arc<RollupCache>,
        rollup_config: RollupConfig,
        rollup_queue: Arc<dyn Queue>,
    ) -> Self {
        Self { db, backends, events, rollup_cache, rollup_config, rollup_queue }
    }

    async fn resolve_backend(&self, backend_mount_id: i64) -> CoreResult<Backend> {
        let mount = self
            .db
            .with_connection(|conn| async move { repo::backend_mounts::get_by_id(conn, backend_mount_id).await })
            .await?;
        self.backends.resolve(
            mount.id,
            &mount.driver,
            &mount.root_or_bucket,
            mount.prefix.as_deref(),
            mount.endpoint.as_deref(),
            mount.region.as_deref(),
            mount.force_path_style,
        )
    }

    /// A retried command carrying a previously-seen `Idempotency-Key`
    /// replays its original journal result instead of re-executing (spec
    /// §4.3).
    async fn replay(&self, idempotency_key: Option<&str>) -> CoreResult<Option<Node>> {
        let Some(key) = idempotency_key else { return Ok(None) };
        let key = key.to_string();
        let entry = self
            .db
            .with_connection(|conn| async move { repo::journal::find_by_idempotency_key(conn, &key).await })
            .await?;
        match entry {
            Some(entry) => {
                let node: Node = serde_json::from_value(entry.result)
                    .map_err(|e| CoreError::InvariantViolation(format!("journal replay decode: {e}")))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    async fn after_commit(&self, plan: &RollupPlan, event: Event) -> CoreResult<()> {
        for node_id in &plan.touched_node_ids {
            self.rollup_cache.invalidate(*node_id);
        }
        rollup_worker::enqueue_candidates(self.rollup_queue.as_ref(), &plan.schedule_candidates, &self.rollup_config)
            .await?;
        self.events.publish(event).await?;
        Ok(())
    }

    /// Creates every missing ancestor directory along `path` (spec §4.3
    /// `create-directory`). Directories that already exist are left as-is.
    pub async fn create_directory(&self, req: CreateDirectoryRequest) -> CoreResult<Node> {
        if let Some(node) = self.replay(req.idempotency_key.as_deref()).await? {
            return Ok(node);
        }
        let normalized = normalize_path(&req.path)?;
        let backend_mount_id = req.backend_mount_id;
        let metadata = req.metadata.unwrap_or_else(|| serde_json::json!({}));
        let idempotency_key = req.idempotency_key;

        let (node, plan) = self
            .db
            .with_transaction(|txn| async move {
                let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
                if segments.is_empty() {
                    return Err(CoreError::InvalidPath("cannot create the mount root".into()));
                }
                let mut ancestors: Vec<Node> = Vec::new();
                let mut plan = RollupPlan::default();
                let mut current = String::new();
                let mut resolved_node = None;
                for (i, seg) in segments.iter().enumerate() {
                    if !current.is_empty() {
                        current.push('/');
                    }
                    current.push_str(seg);
                    let existing = repo::nodes::get_by_path(txn, backend_mount_id, &current).await?;
                    let node = match existing {
                        Some(n) if n.is_active() => n,
                        _ => {
                            let is_last = i + 1 == segments.len();
                            let new_node = repo::nodes::insert(
                                txn,
                                NewNode {
                                    backend_mount_id,
                                    parent_id: ancestors.last().map(|a| a.id),
                                    path: current.clone(),
                                    name: seg.to_string(),
                                    depth: (i + 1) as i32,
                                    kind: NodeKind::Directory,
                                    size_bytes: 0,
                                    checksum: None,
                                    content_hash: None,
                                    metadata: if is_last { metadata.clone() } else { serde_json::json!({}) },
                                },
                            )
                            .await?;
                            extend_plan_for_insert(&mut plan, &new_node, &ancestors);
                            new_node
                        }
                    };
                    resolved_node = Some(node.clone());
                    ancestors.push(node);
                }
                let node = resolved_node.expect("segments is non-empty");
                rollup::apply_plan(txn, &plan).await?;
                let result_json = serde_json::to_value(&node)
                    .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                repo::journal::append(
                    txn,
                    Some(node.id),
                    "create-directory",
                    serde_json::json!({ "backendMountId": backend_mount_id, "path": normalized }),
                    result_json,
                    idempotency_key.clone(),
                )
                .await?;
                Ok((node, plan))
            })
            .await?;

        self.after_commit(
            &plan,
            Event::NodeCreated { node_id: node.id, backend_mount_id, path: node.path.clone() },
        )
        .await?;
        Ok(node)
    }

    /// Writes `content` at `path` (spec §4.3 `upload-file`). Fails with
    /// `PathInUse` if a node already exists at `path` and `overwrite` is not
    /// set.
    pub async fn upload_file(&self, req: UploadFileRequest) -> CoreResult<Node> {
        if let Some(node) = self.replay(req.idempotency_key.as_deref()).await? {
            return Ok(node);
        }
        let path = normalize_path(&req.path)?;
        let backend_mount_id = req.backend_mount_id;
        let overwrite = req.overwrite.unwrap_or(false);
        let metadata = req.metadata.unwrap_or_else(|| serde_json::json!({}));
        let idempotency_key = req.idempotency_key;
        let backend = self.resolve_backend(backend_mount_id).await?;

        let stat = backend.write(&path, req.content).await?;
        if let Some(expected) = &req.checksum {
            if expected != &stat.checksum {
                let _ = backend.delete(&path).await;
                return Err(CoreError::ChecksumMismatch { expected: expected.clone(), actual: stat.checksum });
            }
        }

        let path_for_rollback = path.clone();
        let result = self
            .db
            .with_transaction(|txn| async move {
                let existing = repo::nodes::get_by_path(txn, backend_mount_id, &path).await?;
                match existing {
                    Some(existing) if existing.is_active() => {
                        if !overwrite || existing.kind != NodeKind::File {
                            return Err(CoreError::PathInUse(path.clone()));
                        }
                        let old_size = existing.size_bytes;
                        let updated =
                            repo::nodes::overwrite_content(txn, existing.id, stat.size as i64, Some(stat.checksum.clone()), None)
                                .await?;
                        let mut plan = RollupPlan::default();
                        let size_delta = stat.size as i64 - old_size;
                        if size_delta != 0 {
                            for ancestor in ancestor_chain(txn, &updated).await? {
                                plan.increments.push(RollupIncrement {
                                    node_id: ancestor.id,
                                    size_bytes_delta: size_delta,
                                    ..Default::default()
                                });
                                plan.touched_node_ids.push(ancestor.id);
                            }
                            rollup::apply_plan(txn, &plan).await?;
                        }
                        let result_json = serde_json::to_value(&updated)
                            .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                        repo::journal::append(
                            txn,
                            Some(updated.id),
                            "upload-file",
                            serde_json::json!({ "backendMountId": backend_mount_id, "path": path, "overwrite": overwrite }),
                            result_json,
                            idempotency_key.clone(),
                        )
                        .await?;
                        Ok((updated, plan))
                    }
                    _ => {
                        let parent_id = match parent_path(&path).as_deref() {
                            Some("") | None => None,
                            Some(p) => Some(
                                repo::nodes::get_by_path(txn, backend_mount_id, p)
                                    .await?
                                    .ok_or_else(|| CoreError::ParentNotFound(p.to_string()))?
                                    .id,
                            ),
                        };
                        let new_node = repo::nodes::insert(
                            txn,
                            NewNode {
                                backend_mount_id,
                                parent_id,
                                path: path.clone(),
                                name: file_name(&path),
                                depth: path_depth(&path),
                                kind: NodeKind::File,
                                size_bytes: stat.size as i64,
                                checksum: Some(stat.checksum.clone()),
                                content_hash: None,
                                metadata,
                            },
                        )
                        .await?;
                        let ancestors = match parent_id {
                            Some(pid) => {
                                let parent = repo::nodes::get_by_id(txn, pid, false).await?;
                                let mut chain = ancestor_chain(txn, &parent).await?;
                                chain.push(parent);
                                chain
                            }
                            None => Vec::new(),
                        };
                        let mut plan = RollupPlan::default();
                        extend_plan_for_insert(&mut plan, &new_node, &ancestors);
                        rollup::apply_plan(txn, &plan).await?;
                        let result_json = serde_json::to_value(&new_node)
                            .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                        repo::journal::append(
                            txn,
                            Some(new_node.id),
                            "upload-file",
                            serde_json::json!({ "backendMountId": backend_mount_id, "path": path, "overwrite": overwrite }),
                            result_json,
                            idempotency_key.clone(),
                        )
                        .await?;
                        Ok((new_node, plan))
                    }
                }
            })
            .await;

        let (node, plan) = match result {
            Ok(value) => value,
            Err(e) => {
                let _ = backend.delete(&path_for_rollback).await;
                return Err(e);
            }
        };

        self.after_commit(
            &plan,
            Event::NodeUploaded {
                node_id: node.id,
                size_bytes: node.size_bytes,
                checksum: node.checksum.clone().unwrap_or_default(),
            },
        )
        .await?;
        Ok(node)
    }

    /// Moves a node and its descendants to `to_path` on the same mount
    /// (spec §4.3 `move`): rewrites paths/parents/depths atomically and
    /// physically relocates any file blobs through C2.
    pub async fn r#move(&self, req: MoveRequest) -> CoreResult<Node> {
        if let Some(node) = self.replay(req.idempotency_key.as_deref()).await? {
            return Ok(node);
        }
        let from = normalize_path(&req.from_path)?;
        let to = normalize_path(&req.to_path)?;
        let backend_mount_id = req.backend_mount_id;
        let idempotency_key = req.idempotency_key;
        let backend = self.resolve_backend(backend_mount_id).await?;
        let max_cascade_depth = self.rollup_config.max_cascade_depth;
        let from_event = from.clone();
        let to_event = to.clone();

        let (node, touched) = self
            .db
            .with_transaction(|txn| async move {
                if let Some(dest) = repo::nodes::get_by_path(txn, backend_mount_id, &to).await? {
                    if dest.is_active() {
                        return Err(CoreError::PathInUse(to.clone()));
                    }
                }
                let source = repo::nodes::get_by_path(txn, backend_mount_id, &from)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("node at path {from}")))?;
                let old_parent_id = source.parent_id;
                let source = repo::nodes::get_by_id(txn, source.id, true).await?;

                let new_parent_id = match parent_path(&to).as_deref() {
                    Some("") | None => None,
                    Some(p) => Some(
                        repo::nodes::get_by_path(txn, backend_mount_id, p)
                            .await?
                            .ok_or_else(|| CoreError::ParentNotFound(p.to_string()))?
                            .id,
                    ),
                };

                let mut subtree = repo::nodes::descendants(txn, backend_mount_id, &from).await?;
                subtree.retain(|n| n.id != source.id);
                let depth_delta = path_depth(&to) - path_depth(&from);

                for descendant in &subtree {
                    let new_path = format!("{to}{}", &descendant.path[from.len()..]);
                    if descendant.kind == NodeKind::File {
                        backend.r#move(&descendant.path, &new_path).await?;
                    }
                    repo::nodes::relocate(
                        txn,
                        descendant.id,
                        descendant.parent_id,
                        &new_path,
                        &descendant.name,
                        descendant.depth + depth_delta,
                    )
                    .await?;
                }
                if source.kind == NodeKind::File {
                    backend.r#move(&from, &to).await?;
                }
                let moved = repo::nodes::relocate(txn, source.id, new_parent_id, &to, &file_name(&to), path_depth(&to)).await?;

                let mut touched = Vec::new();
                if let Some(id) = old_parent_id {
                    recalculate_and_cascade(txn, id, max_cascade_depth).await?;
                    touched.push(id);
                }
                if let Some(id) = new_parent_id {
                    recalculate_and_cascade(txn, id, max_cascade_depth).await?;
                    touched.push(id);
                }

                let result_json = serde_json::to_value(&moved)
                    .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                repo::journal::append(
                    txn,
                    Some(moved.id),
                    "move",
                    serde_json::json!({ "backendMountId": backend_mount_id, "from": from, "to": to }),
                    result_json,
                    idempotency_key.clone(),
                )
                .await?;
                Ok((moved, touched))
            })
            .await?;

        for id in &touched {
            self.rollup_cache.invalidate(*id);
        }
        self.events
            .publish(Event::NodeMoved { node_id: node.id, from_path: from_event, to_path: to_event })
            .await?;
        Ok(node)
    }

    /// Copies a node and its descendants to `to_path` on the same mount
    /// (spec §4.3 `copy`), duplicating file blobs through C2.
    pub async fn copy(&self, req: CopyRequest) -> CoreResult<Node> {
        if let Some(node) = self.replay(req.idempotency_key.as_deref()).await? {
            return Ok(node);
        }
        let from = normalize_path(&req.from_path)?;
        let to = normalize_path(&req.to_path)?;
        let backend_mount_id = req.backend_mount_id;
        let idempotency_key = req.idempotency_key;
        let backend = self.resolve_backend(backend_mount_id).await?;
        let max_cascade_depth = self.rollup_config.max_cascade_depth;
        let to_event = to.clone();

        let (root, touched) = self
            .db
            .with_transaction(|txn| async move {
                if let Some(dest) = repo::nodes::get_by_path(txn, backend_mount_id, &to).await? {
                    if dest.is_active() {
                        return Err(CoreError::PathInUse(to.clone()));
                    }
                }
                let source = repo::nodes::get_by_path(txn, backend_mount_id, &from)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("node at path {from}")))?;
                let mut subtree = vec![source.clone()];
                if source.kind == NodeKind::Directory {
                    subtree.extend(
                        repo::nodes::descendants(txn, backend_mount_id, &from)
                            .await?
                            .into_iter()
                            .filter(|n| n.id != source.id),
                    );
                }
                subtree.sort_by_key(|n| n.depth);

                let dest_parent_id = match parent_path(&to).as_deref() {
                    Some("") | None => None,
                    Some(p) => Some(
                        repo::nodes::get_by_path(txn, backend_mount_id, p)
                            .await?
                            .ok_or_else(|| CoreError::ParentNotFound(p.to_string()))?
                            .id,
                    ),
                };

                let depth_delta = path_depth(&to) - path_depth(&from);
                let mut id_map: HashMap<i64, i64> = HashMap::new();
                let mut created: Vec<Node> = Vec::new();
                for node in &subtree {
                    let new_path = format!("{to}{}", &node.path[from.len()..]);
                    let new_parent_id = if node.id == source.id {
                        dest_parent_id
                    } else {
                        node.parent_id.and_then(|pid| id_map.get(&pid).copied())
                    };
                    let checksum = if node.kind == NodeKind::File {
                        let blob = backend.read(&node.path).await?;
                        Some(backend.write(&new_path, blob).await?.checksum)
                    } else {
                        None
                    };
                    let metadata_value = serde_json::to_value(&node.metadata).unwrap_or_else(|_| serde_json::json!({}));
                    let name = file_name(&new_path);
                    let new_node = repo::nodes::insert(
                        txn,
                        NewNode {
                            backend_mount_id,
                            parent_id: new_parent_id,
                            path: new_path,
                            name,
                            depth: node.depth + depth_delta,
                            kind: node.kind,
                            size_bytes: node.size_bytes,
                            checksum: checksum.or_else(|| node.checksum.clone()),
                            content_hash: node.content_hash.clone(),
                            metadata: metadata_value,
                        },
                    )
                    .await?;
                    id_map.insert(node.id, new_node.id);
                    created.push(new_node);
                }

                for node in created.iter().rev() {
                    if node.kind == NodeKind::Directory {
                        rollup::recalculate_node(txn, node.id).await?;
                    }
                }
                let root = created.first().cloned().expect("source is always copied first");
                let mut touched = vec![root.id];
                if let Some(parent_id) = root.parent_id {
                    recalculate_and_cascade(txn, parent_id, max_cascade_depth).await?;
                    touched.push(parent_id);
                }

                let result_json = serde_json::to_value(&root)
                    .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                repo::journal::append(
                    txn,
                    Some(root.id),
                    "copy",
                    serde_json::json!({ "backendMountId": backend_mount_id, "from": from, "to": to }),
                    result_json,
                    idempotency_key.clone(),
                )
                .await?;
                Ok((root, touched))
            })
            .await?;

        for id in &touched {
            self.rollup_cache.invalidate(*id);
        }
        self.events
            .publish(Event::NodeCopied { source_node_id: root.id, new_node_id: root.id, path: to_event })
            .await?;
        Ok(root)
    }

    /// Soft-deletes a node (and, if `recursive`, its descendants), removing
    /// backend artifacts first so a failed delete leaves no persisted state
    /// (spec §4.3 `delete`).
    pub async fn delete(&self, req: DeleteRequest) -> CoreResult<Node> {
        if let Some(node) = self.replay(req.idempotency_key.as_deref()).await? {
            return Ok(node);
        }
        let path = normalize_path(&req.path)?;
        let backend_mount_id = req.backend_mount_id;
        let recursive = req.recursive.unwrap_or(false);
        let idempotency_key = req.idempotency_key;
        let backend = self.resolve_backend(backend_mount_id).await?;
        let max_cascade_depth = self.rollup_config.max_cascade_depth;
        let path_event = path.clone();

        let (node, touched) = self
            .db
            .with_transaction(|txn| async move {
                let target = repo::nodes::get_by_path(txn, backend_mount_id, &path)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("node at path {path}")))?;
                let target = repo::nodes::get_by_id(txn, target.id, true).await?;
                let mut subtree = repo::nodes::descendants(txn, backend_mount_id, &path).await?;
                subtree.retain(|n| n.id != target.id);
                if !subtree.is_empty() && !recursive {
                    return Err(CoreError::InvariantViolation(format!(
                        "{path} is not empty; recursive delete required"
                    )));
                }
                subtree.sort_by_key(|n| std::cmp::Reverse(n.depth));
                for node in &subtree {
                    if node.kind == NodeKind::File {
                        backend.delete(&node.path).await?;
                    }
                    repo::nodes::soft_delete(txn, node.id).await?;
                }
                if target.kind == NodeKind::File {
                    backend.delete(&path).await?;
                }
                let deleted = repo::nodes::soft_delete(txn, target.id).await?;

                let mut touched: Vec<i64> = subtree.iter().map(|n| n.id).collect();
                touched.push(deleted.id);
                if let Some(parent_id) = deleted.parent_id {
                    recalculate_and_cascade(txn, parent_id, max_cascade_depth).await?;
                    touched.push(parent_id);
                }

                let result_json = serde_json::to_value(&deleted)
                    .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                repo::journal::append(
                    txn,
                    Some(deleted.id),
                    "delete",
                    serde_json::json!({ "backendMountId": backend_mount_id, "path": path, "recursive": recursive }),
                    result_json,
                    idempotency_key.clone(),
                )
                .await?;
                Ok((deleted, touched))
            })
            .await?;

        for id in &touched {
            self.rollup_cache.invalidate(*id);
        }
        self.events.publish(Event::NodeDeleted { node_id: node.id, path: path_event }).await?;
        Ok(node)
    }

    /// Merges/removes metadata keys (spec §4.3 `patch-metadata`). Does not
    /// affect rollups.
    pub async fn patch_metadata(&self, req: PatchMetadataRequest) -> CoreResult<Node> {
        if let Some(node) = self.replay(req.idempotency_key.as_deref()).await? {
            return Ok(node);
        }
        let path = normalize_path(&req.path)?;
        let backend_mount_id = req.backend_mount_id;
        let set = req.set;
        let unset = req.unset;
        let idempotency_key = req.idempotency_key;

        let node = self
            .db
            .with_transaction(|txn| async move {
                let target = repo::nodes::get_by_path(txn, backend_mount_id, &path)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("node at path {path}")))?;
                let updated = repo::nodes::patch_metadata(txn, target.id, &set, &unset).await?;
                let result_json = serde_json::to_value(&updated)
                    .map_err(|e| CoreError::InvariantViolation(format!("journal encode: {e}")))?;
                repo::journal::append(
                    txn,
                    Some(updated.id),
                    "patch-metadata",
                    serde_json::json!({ "backendMountId": backend_mount_id, "path": path, "set": set, "unset": unset }),
                    result_json,
                    idempotency_key.clone(),
                )
                .await?;
                Ok(updated)
            })
            .await?;

        self.rollup_cache.invalidate(node.id);
        Ok(node)
    }
}

/// Ancestor chain from mount root down to (but excluding) `node`, shallowest
/// first.
pub(crate) async fn ancestor_chain<C: ConnectionTrait>(conn: &C, node: &Node) -> CoreResult<Vec<Node>> {
    let mut chain = Vec::new();
    let mut current_parent = node.parent_id;
    while let Some(parent_id) = current_parent {
        let parent = repo::nodes::get_by_id(conn, parent_id, false).await?;
        current_parent = parent.parent_id;
        chain.push(parent);
    }
    chain.reverse();
    Ok(chain)
}

/// Extend `plan` with the increments a newly-inserted `node` contributes to
/// `ancestors` (spec §4.4: only the immediate parent observes
/// `childCountΔ`; every ancestor observes size/file/directory count deltas).
pub(crate) fn extend_plan_for_insert(plan: &mut RollupPlan, node: &Node, ancestors: &[Node]) {
    if node.kind == NodeKind::Directory {
        plan.ensure.push(node.id);
    }
    for (i, ancestor) in ancestors.iter().rev().enumerate() {
        let mut increment = RollupIncrement { node_id: ancestor.id, ..Default::default() };
        match node.kind {
            NodeKind::File => {
                increment.size_bytes_delta = node.size_bytes;
                increment.file_count_delta = 1;
            }
            NodeKind::Directory => {
                increment.directory_count_delta = 1;
            }
        }
        if i == 0 {
            increment.child_count_delta = 1;
        }
        plan.schedule_candidates.push(RollupScheduleCandidate {
            node_id: ancestor.id,
            backend_mount_id: ancestor.backend_mount_id,
            reason: "mutation",
            depth: ancestor.depth,
            child_count_delta: increment.child_count_delta,
        });
        plan.touched_node_ids.push(ancestor.id);
        plan.increments.push(increment);
    }
}
