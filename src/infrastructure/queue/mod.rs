//! Queue runtime (spec §4.9, component C9): at-least-once job dispatch with
//! an inline fallback, grounded in the teacher's
//! `infrastructure/jobs/manager.rs` dispatch-and-track pattern but stripped
//! down to the generic `enqueue`/worker-loop contract spec §4.9 names —
//! this crate has no `Library`/task-system coupling to carry over.

use crate::error::CoreResult;
use crate::infrastructure::database::{repo, Database};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Status of a persisted queue job. Also the vocabulary for the depth
/// metrics spec §4.9 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Paused,
}

/// A persisted job record (only meaningful for [`PersistentQueue`];
/// [`InlineQueue`] never materializes one).
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: i64,
    pub queue_name: String,
    pub job_key: Option<String>,
    pub payload: serde_json::Value,
    pub status: QueueStatus,
    pub attempt: i32,
    pub error: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Depth metrics exported per queue (spec §4.9).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueDepth {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: u64,
}

/// Outcome of an `enqueue` call.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOutcome {
    pub id: i64,
    /// `true` if this call coalesced onto an already-waiting job with the
    /// same `job_key` rather than inserting a new one.
    pub coalesced: bool,
}

/// The handler a queue dispatches enqueued payloads to.
pub type Handler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, CoreResult<serde_json::Value>> + Send + Sync>;

#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue `payload`. Jobs sharing `job_key` are coalesced while still
    /// queued (spec §4.9).
    async fn enqueue(&self, payload: serde_json::Value, job_key: Option<String>) -> CoreResult<EnqueueOutcome>;

    async fn depth(&self) -> CoreResult<QueueDepth>;
}

/// Synchronous fallback: `enqueue` runs the handler on the caller's task and
/// returns only after it completes (spec §4.9 — "Inline mode: enqueue runs
/// the handler on the caller's task and returns after completion").
pub struct InlineQueue {
    handler: Handler,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl InlineQueue {
    pub fn new(handler: Handler) -> Self {
        Self { handler, completed: AtomicU64::new(0), failed: AtomicU64::new(0) }
    }
}

#[async_trait]
impl Queue for InlineQueue {
    async fn enqueue(&self, payload: serde_json::Value, job_key: Option<String>) -> CoreResult<EnqueueOutcome> {
        debug!(job_key = ?job_key, "running job inline");
        match (self.handler)(payload).await {
            Ok(_) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }
        Ok(EnqueueOutcome { id: 0, coalesced: false })
    }

    async fn depth(&self) -> CoreResult<QueueDepth> {
        Ok(QueueDepth {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ..Default::default()
        })
    }
}

/// Durable queue backed by the `queued_jobs` table: job records survive a
/// process restart, and at-least-once delivery holds because a job stays
/// `active` (not removed) until the worker observes success or failure.
pub struct PersistentQueue {
    db: Arc<Database>,
    name: String,
    handler: Handler,
}

impl PersistentQueue {
    pub fn new(db: Arc<Database>, name: impl Into<String>, handler: Handler) -> Self {
        Self { db, name: name.into(), handler }
    }

    /// Run the worker loop until `shutdown` is signalled. Polls for waiting
    /// jobs, marks each `active` then `completed`/`failed`; an empty queue
    /// backs off for `idle_poll` before checking again.
    pub async fn run(&self, idle_poll: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.name, "queue worker starting");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let name = self.name.clone();
            let claimed = self
                .db
                .with_connection(|conn| async move { repo::queue::claim_next(conn, &name).await })
                .await;

            match claimed {
                Ok(Some(job)) => {
                    self.run_one(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(idle_poll) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(queue = %self.name, error = %e, "failed to claim next job");
                    tokio::time::sleep(idle_poll).await;
                }
            }
        }
        info!(queue = %self.name, "queue worker stopped");
    }

    async fn run_one(&self, job: QueueJob) {
        debug!(queue = %self.name, job_id = job.id, attempt = job.attempt, "running job");
        let outcome = (self.handler)(job.payload.clone()).await;
        let result = match outcome {
            Ok(value) => {
                self.db
                    .with_connection(|conn| async move { repo::queue::complete(conn, job.id, value).await })
                    .await
            }
            Err(e) => {
                warn!(queue = %self.name, job_id = job.id, error = %e, "job failed");
                let error = serde_json::json!({ "message": e.to_string(), "code": e.code() });
                self.db
                    .with_connection(|conn| async move { repo::queue::fail(conn, job.id, error).await })
                    .await
            }
        };
        if let Err(e) = result {
            error!(queue = %self.name, job_id = job.id, error = %e, "failed to persist job outcome");
        }
    }
}

#[async_trait]
impl Queue for PersistentQueue {
    async fn enqueue(&self, payload: serde_json::Value, job_key: Option<String>) -> CoreResult<EnqueueOutcome> {
        let name = self.name.clone();
        self.db
            .with_transaction(|txn| async move {
                if let Some(key) = job_key.as_deref() {
                    if let Some(existing) = repo::queue::find_waiting_by_key(txn, &name, key).await? {
                        return Ok(EnqueueOutcome { id: existing.id, coalesced: true });
                    }
                }
                let job = repo::queue::insert(txn, &name, job_key.as_deref(), payload).await?;
                Ok(EnqueueOutcome { id: job.id, coalesced: false })
            })
            .await
    }

    async fn depth(&self) -> CoreResult<QueueDepth> {
        self.db
            .with_connection(|conn| async move {
                Ok(QueueDepth {
                    waiting: repo::queue::count_by_status(conn, &self.name, QueueStatus::Waiting).await?,
                    active: repo::queue::count_by_status(conn, &self.name, QueueStatus::Active).await?,
                    completed: repo::queue::count_by_status(conn, &self.name, QueueStatus::Completed).await?,
                    failed: repo::queue::count_by_status(conn, &self.name, QueueStatus::Failed).await?,
                    delayed: repo::queue::count_by_status(conn, &self.name, QueueStatus::Delayed).await?,
                    paused: repo::queue::count_by_status(conn, &self.name, QueueStatus::Paused).await?,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[tokio::test]
    async fn inline_queue_runs_handler_before_returning() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let queue = InlineQueue::new(Arc::new(move |payload| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(payload)
            })
        }));
        queue.enqueue(serde_json::json!({"a": 1}), None).await.unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(queue.depth().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn persistent_queue_coalesces_by_job_key() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let queue = PersistentQueue::new(db, "test", Arc::new(|payload| Box::pin(async move { Ok(payload) })));
        let first = queue.enqueue(serde_json::json!({}), Some("k1".into())).await.unwrap();
        let second = queue.enqueue(serde_json::json!({}), Some("k1".into())).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.coalesced);
        assert_eq!(queue.depth().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn persistent_queue_worker_drains_waiting_job() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let queue = Arc::new(PersistentQueue::new(
            db,
            "test",
            Arc::new(|payload| Box::pin(async move { Ok(payload) })),
        ));
        queue.enqueue(serde_json::json!({"x": 1}), None).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker_queue = queue.clone();
        let worker = tokio::spawn(async move { worker_queue.run(Duration::from_millis(10), shutdown_rx).await });
        for _ in 0..50 {
            if queue.depth().await.unwrap().completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = shutdown_tx.send(true);
        worker.await.unwrap();
        let depth = queue.depth().await.unwrap();
        assert_eq!(depth.completed, 1);
        assert_eq!(depth.waiting, 0);
    }
}
