//! Reconciliation manager (spec §4.5, component C5): drift-triggered,
//! audit-scheduled, and manually-triggered re-synchronisation between the
//! tracked node tree and what a backend mount actually holds.

use super::mutations::{ancestor_chain, extend_plan_for_insert};
use super::rollup;
use super::rollup_cache::RollupCache;
use crate::config::RollupConfig;
use crate::domain::node::{file_name, parent_path, path_depth, ConsistencyState, NodeKind, NodeState};
use crate::domain::reconciliation::{
    ReconciliationJob, ReconciliationOutcome, ReconciliationReason, ReconciliationStatus,
};
use crate::domain::rollup::{RollupIncrement, RollupPlan};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::backend::{Backend, BackendRegistry};
use crate::infrastructure::database::repo::nodes::NewNode;
use crate::infrastructure::database::{repo, Database};
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::queue::Queue;
use sea_orm::ConnectionTrait;
use std::sync::Arc;

pub struct ReconciliationManager {
    db: Arc<Database>,
    backends: Arc<BackendRegistry>,
    events: EventBus,
    rollup_cache: Arc<RollupCache>,
    rollup_config: RollupConfig,
    queue: Arc<dyn Queue>,
}

struct ChildJob {
    backend_mount_id: i64,
    node_id: Option<i64>,
    path: String,
    detect_children: bool,
}

struct JobOutcome {
    status: ReconciliationStatus,
    detail: String,
    drifted: bool,
    node_id: Option<i64>,
    node_event: Option<Event>,
    touched_rollup_ids: Vec<i64>,
    child_jobs: Vec<ChildJob>,
}

struct BackendProbe {
    kind: NodeKind,
    size: i64,
    checksum: Option<String>,
}

impl ReconciliationManager {
    pub fn new(
        db: Arc<Database>,
        backends: Arc<BackendRegistry>,
        events: EventBus,
        rollup_cache: Arc<RollupCache>,
        rollup_config: RollupConfig,
        queue: Arc<dyn Queue>,
    ) -> Self {
        Self { db, backends, events, rollup_cache, rollup_config, queue }
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

    /// Enqueue a job under `reconcile:<mountId>:<path>`, coalescing onto an
    /// already-active job for the same key (spec §4.5).
    async fn enqueue(
        &self,
        backend_mount_id: i64,
        node_id: Option<i64>,
        path: &str,
        reason: ReconciliationReason,
        detect_children: bool,
    ) -> CoreResult<ReconciliationJob> {
        let job_key = ReconciliationJob::job_key(backend_mount_id, path);
        let key_for_lookup = job_key.clone();
        if let Some(existing) = self
            .db
            .with_connection(|conn| async move { repo::reconciliation::find_active_by_key(conn, &key_for_lookup).await })
            .await?
        {
            return Ok(existing);
        }
        let path_owned = path.to_string();
        let job = self
            .db
            .with_connection(|conn| async move {
                repo::reconciliation::insert(conn, backend_mount_id, node_id, &path_owned, reason, detect_children).await
            })
            .await?;
        self.events
            .publish(Event::ReconciliationJobQueued { job_id: job.id, job_key: job.job_key.clone() })
            .await?;
        self.queue.enqueue(serde_json::json!({ "jobId": job.id }), Some(job.job_key.clone())).await?;
        Ok(job)
    }

    pub async fn trigger_drift(&self, backend_mount_id: i64, node_id: Option<i64>, path: &str) -> CoreResult<ReconciliationJob> {
        self.enqueue(backend_mount_id, node_id, path, ReconciliationReason::Drift, true).await
    }

    pub async fn trigger_manual(
        &self,
        backend_mount_id: i64,
        node_id: Option<i64>,
        path: &str,
        detect_children: bool,
    ) -> CoreResult<ReconciliationJob> {
        self.enqueue(backend_mount_id, node_id, path, ReconciliationReason::Manual, detect_children).await
    }

    /// Periodic sweep (spec §4.5 — default every 5 minutes, up to
    /// `auditBatchSize` nodes in `{inconsistent, missing}`).
    pub async fn trigger_audit_sweep(&self, batch_size: u64) -> CoreResult<Vec<ReconciliationJob>> {
        let candidates = self
            .db
            .with_connection(|conn| async move { repo::nodes::find_needing_audit(conn, batch_size).await })
            .await?;
        let mut jobs = Vec::with_capacity(candidates.len());
        for node in candidates {
            let job = self.enqueue(node.backend_mount_id, Some(node.id), &node.path, ReconciliationReason::Audit, false).await?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Cancels a still-queued job; running jobs are not cancellable
    /// mid-flight (spec §5).
    pub async fn cancel(&self, job_id: i64) -> CoreResult<ReconciliationJob> {
        let job = self
            .db
            .with_transaction(|txn| async move {
                let job = repo::reconciliation::update_status(txn, job_id, ReconciliationStatus::Cancelled, None, None).await?;
                Ok(job)
            })
            .await?;
        self.events.publish(Event::ReconciliationJobCancelled { job_id: job.id }).await?;
        Ok(job)
    }

    /// Runs the per-job algorithm (spec §4.5 steps 1-6): resolve the node,
    /// probe the backend, decide the outcome, apply the rollup plan, and
    /// record the job transition, all inside one C1 transaction. Child jobs
    /// discovered under a `detectChildren` directory are scheduled only
    /// after this transaction commits.
    pub async fn run_job(&self, job_id: i64) -> CoreResult<ReconciliationOutcome> {
        let job = self
            .db
            .with_connection(|conn| async move {
                repo::reconciliation::update_status(conn, job_id, ReconciliationStatus::Running, None, None).await
            })
            .await?;
        self.events.publish(Event::ReconciliationJobStarted { job_id: job.id }).await?;

        let backend = self.resolve_backend(job.backend_mount_id).await?;
        let max_cascade_depth = self.rollup_config.max_cascade_depth;
        let job_for_txn = job.clone();

        let result = self
            .db
            .with_transaction(|txn| async move { reconcile_one(txn, &backend, &job_for_txn, max_cascade_depth).await })
            .await;

        match result {
            Ok(outcome) => {
                let status = outcome.status;
                let detail = outcome.detail.clone();
                self.db
                    .with_connection(|conn| async move {
                        repo::reconciliation::update_status(conn, job_id, status, None, Some(serde_json::json!({ "detail": detail })))
                            .await
                    })
                    .await?;
                for id in &outcome.touched_rollup_ids {
                    self.rollup_cache.invalidate(*id);
                }
                self.events
                    .publish(Event::ReconciliationJobCompleted {
                        job_id,
                        nodes_scanned: 1,
                        nodes_drifted: if outcome.drifted { 1 } else { 0 },
                    })
                    .await?;
                if let Some(event) = outcome.node_event {
                    self.events.publish(event).await?;
                }
                for child in &outcome.child_jobs {
                    self.enqueue(child.backend_mount_id, child.node_id, &child.path, ReconciliationReason::Drift, child.detect_children)
                        .await?;
                }
                Ok(ReconciliationOutcome { job_id, status, node_id: outcome.node_id, detail: outcome.detail })
            }
            Err(e) => {
                let error_json = serde_json::json!({ "message": e.to_string(), "code": e.code() });
                let _ = self
                    .db
                    .with_connection(|conn| async move {
                        repo::reconciliation::update_status(conn, job_id, ReconciliationStatus::Failed, Some(error_json), None).await
                    })
                    .await;
                self.events.publish(Event::ReconciliationJobFailed { job_id, error: e.to_string() }).await?;
                Err(e)
            }
        }
    }
}

async fn probe_backend(backend: &Backend, path: &str, kind_hint: Option<NodeKind>) -> CoreResult<Option<BackendProbe>> {
    if kind_hint == Some(NodeKind::Directory) {
        let entries = backend.list(path).await?;
        return Ok(if entries.is_empty() { None } else { Some(BackendProbe { kind: NodeKind::Directory, size: 0, checksum: None }) });
    }
    match backend.stat(path).await {
        Ok(stat) => Ok(Some(BackendProbe { kind: NodeKind::File, size: stat.size as i64, checksum: Some(stat.checksum) })),
        Err(CoreError::ObjectStore(object_store::Error::NotFound { .. })) => {
            let entries = backend.list(path).await?;
            Ok(if entries.is_empty() { None } else { Some(BackendProbe { kind: NodeKind::Directory, size: 0, checksum: None }) })
        }
        Err(e) => Err(e),
    }
}

async fn reconcile_one<C: ConnectionTrait>(
    conn: &C,
    backend: &Backend,
    job: &ReconciliationJob,
    max_cascade_depth: u32,
) -> CoreResult<JobOutcome> {
    let existing_node = match job.node_id {
        Some(id) => Some(repo::nodes::get_by_id(conn, id, true).await?),
        None => repo::nodes::get_by_path(conn, job.backend_mount_id, &job.path).await?,
    };
    let probe = probe_backend(backend, &job.path, existing_node.as_ref().map(|n| n.kind)).await?;

    match (probe, existing_node) {
        (None, None) => Ok(JobOutcome {
            status: ReconciliationStatus::Skipped,
            detail: format!("{} absent on backend and untracked", job.path),
            drifted: false,
            node_id: None,
            node_event: None,
            touched_rollup_ids: Vec::new(),
            child_jobs: Vec::new(),
        }),
        (None, Some(node)) => {
            let was_active = node.is_active();
            let updated =
                repo::nodes::update_state(conn, node.id, node.version, NodeState::Missing, ConsistencyState::Missing).await?;
            repo::snapshots::insert(conn, node.id, None, None, "missing", false).await?;
            let mut touched = Vec::new();
            if was_active {
                if let Some(parent_id) = node.parent_id {
                    rollup::recalculate_and_cascade(conn, parent_id, max_cascade_depth).await?;
                    touched.push(parent_id);
                }
            }
            Ok(JobOutcome {
                status: ReconciliationStatus::Succeeded,
                detail: format!("{} missing on backend", job.path),
                drifted: true,
                node_id: Some(updated.id),
                node_event: Some(Event::NodeMissing { node_id: updated.id, path: job.path.clone() }),
                touched_rollup_ids: touched,
                child_jobs: Vec::new(),
            })
        }
        (Some(probed), None) => {
            let parent_id = match parent_path(&job.path).as_deref() {
                Some("") | None => None,
                Some(p) => Some(
                    repo::nodes::get_by_path(conn, job.backend_mount_id, p)
                        .await?
                        .ok_or_else(|| CoreError::ParentNotFound(p.to_string()))?
                        .id,
                ),
            };
            let new_node = repo::nodes::insert(
                conn,
                NewNode {
                    backend_mount_id: job.backend_mount_id,
                    parent_id,
                    path: job.path.clone(),
                    name: file_name(&job.path),
                    depth: path_depth(&job.path),
                    kind: probed.kind,
                    size_bytes: probed.size,
                    checksum: probed.checksum.clone(),
                    content_hash: None,
                    metadata: serde_json::json!({}),
                },
            )
            .await?;
            let mut plan = RollupPlan::default();
            if let Some(pid) = parent_id {
                let parent = repo::nodes::get_by_id(conn, pid, false).await?;
                let mut chain = ancestor_chain(conn, &parent).await?;
                chain.push(parent);
                extend_plan_for_insert(&mut plan, &new_node, &chain);
            }
            rollup::apply_plan(conn, &plan).await?;
            repo::snapshots::insert(conn, new_node.id, Some(probed.size), probed.checksum.clone(), &probed.kind.to_string(), false)
                .await?;
            Ok(JobOutcome {
                status: ReconciliationStatus::Succeeded,
                detail: format!("{} discovered on backend", job.path),
                drifted: true,
                node_id: Some(new_node.id),
                node_event: Some(Event::NodeReconciled { node_id: new_node.id, matched: false }),
                touched_rollup_ids: plan.touched_node_ids,
                child_jobs: Vec::new(),
            })
        }
        (Some(probed), Some(node)) => {
            let matched = node.is_active() && node.size_bytes == probed.size && node.checksum == probed.checksum;
            let mut touched = Vec::new();
            if !matched && node.kind == NodeKind::File {
                let size_delta = probed.size - node.size_bytes;
                if size_delta != 0 {
                    if let Some(parent_id) = node.parent_id {
                        let parent = repo::nodes::get_by_id(conn, parent_id, false).await?;
                        let mut chain = ancestor_chain(conn, &parent).await?;
                        chain.push(parent);
                        for ancestor in &chain {
                            repo::rollups::apply_delta(
                                conn,
                                ancestor.id,
                                &RollupIncrement { node_id: ancestor.id, size_bytes_delta: size_delta, ..Default::default() },
                            )
                            .await?;
                            touched.push(ancestor.id);
                        }
                    }
                }
                repo::nodes::overwrite_content(conn, node.id, probed.size, probed.checksum.clone(), None).await?;
            }
            let updated = repo::nodes::update_state(conn, node.id, node.version, NodeState::Active, ConsistencyState::Consistent).await?;
            repo::snapshots::insert(conn, node.id, Some(probed.size), probed.checksum.clone(), &probed.kind.to_string(), matched)
                .await?;

            let mut child_jobs = Vec::new();
            if node.kind == NodeKind::Directory && job.detect_children {
                for entry in backend.list(&job.path).await? {
                    child_jobs.push(ChildJob {
                        backend_mount_id: job.backend_mount_id,
                        node_id: None,
                        path: entry.path,
                        detect_children: false,
                    });
                }
            }
            Ok(JobOutcome {
                status: ReconciliationStatus::Succeeded,
                detail: format!("{} reconciled (drift={})", job.path, !matched),
                drifted: !matched,
                node_id: Some(updated.id),
                node_event: Some(Event::NodeReconciled { node_id: updated.id, matched }),
                touched_rollup_ids: touched,
                child_jobs,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RollupConfig;
    use crate::infrastructure::database::Database;
    use crate::infrastructure::queue::InlineQueue;
    use std::time::Duration;

    fn rollup_config() -> RollupConfig {
        RollupConfig {
            queue_name: "rollup".into(),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 16,
            recalc_depth_threshold: 4,
            recalc_child_threshold: 50,
            max_cascade_depth: 64,
        }
    }

    #[tokio::test]
    async fn missing_backend_marks_node_missing_and_skips_untracked() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::local(dir.path().to_str().unwrap()).unwrap();

        let node = db
            .with_connection(|conn| async move {
                repo::nodes::insert(
                    conn,
                    NewNode {
                        backend_mount_id: 1,
                        parent_id: None,
                        path: "a.txt".into(),
                        name: "a.txt".into(),
                        depth: 1,
                        kind: NodeKind::File,
                        size_bytes: 10,
                        checksum: None,
                        content_hash: None,
                        metadata: serde_json::json!({}),
                    },
                )
                .await
                .unwrap()
            })
            .await;

        let job = db
            .with_connection(|conn| async move {
                repo::reconciliation::insert(conn, 1, Some(node.id), "a.txt", ReconciliationReason::Manual, false)
                    .await
                    .unwrap()
            })
            .await;

        let outcome = db
            .with_transaction(|txn| async move { reconcile_one(txn, &backend, &job, rollup_config().max_cascade_depth).await })
            .await
            .unwrap();

        assert_eq!(outcome.status, ReconciliationStatus::Succeeded);
        assert!(outcome.drifted);
        assert!(matches!(outcome.node_event, Some(Event::NodeMissing { .. })));
    }
}
