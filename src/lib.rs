//! Platform core: a unified, headless metadata-driven storage core
//! combining a hierarchical filestore (§4.1–§4.5) and a time-partitioned
//! dataset timestore (§4.6–§4.8) over pluggable object storage backends.

pub mod config;
pub mod domain;
pub mod error;
pub mod filestore;
pub mod infrastructure;
pub mod timestore;

use crate::config::AppConfig;
use crate::error::CoreResult;
use crate::filestore::rollup_cache::RollupCache;
use crate::filestore::{rollup_worker, FilestoreService, ReconciliationManager};
use crate::infrastructure::backend::BackendRegistry;
use crate::infrastructure::database::Database;
use crate::infrastructure::events::EventBus;
use crate::infrastructure::queue::{PersistentQueue, Queue};
use crate::timestore::{QueryPlanner, Spool, TimestoreService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

/// The wired-up core. Cheaply `Clone`-able handles to every subsystem; an
/// embedding process builds one of these at startup and drives the
/// `FilestoreService`/`TimestoreService`/`QueryPlanner`/`ReconciliationManager`
/// methods directly (spec §6 — this crate does not bind HTTP routes itself).
pub struct Core {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub backends: Arc<BackendRegistry>,
    pub events: EventBus,
    pub filestore: Arc<FilestoreService>,
    pub reconciliation: Arc<ReconciliationManager>,
    pub timestore: Arc<TimestoreService>,
    pub query_planner: Arc<QueryPlanner>,

    rollup_queue: Arc<dyn Queue>,
    reconcile_queue: Arc<dyn Queue>,
    shutdown_tx: watch::Sender<bool>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
}

impl Core {
    /// Wire every subsystem in startup order (spec §5): database, backend
    /// registry, rollup manager, reconciliation manager, then the
    /// timestore/queue workers.
    pub async fn new_with_config(config: AppConfig) -> CoreResult<Self> {
        info!("initializing platform core");
        let config = Arc::new(config);

        // 1. Metadata store.
        let db = Arc::new(Database::connect(&config.database).await?);

        // 2. Backend registry over pluggable object storage.
        let backends = Arc::new(BackendRegistry::new(config.storage.clone()));

        // 3. Event bus.
        let events = EventBus::from_config(&config.events);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = JoinSet::new();

        // 4. Rollup manager: cache plus a durable queue driving background
        // recalculation passes (spec §4.4).
        let rollup_cache = Arc::new(RollupCache::new(config.rollup.cache_max_entries, config.rollup.cache_ttl));
        let rollup_queue: Arc<dyn Queue> = {
            let db = db.clone();
            let cache = rollup_cache.clone();
            let max_cascade_depth = config.rollup.max_cascade_depth;
            let handler = Arc::new(move |payload: serde_json::Value| {
                let db = db.clone();
                let cache = cache.clone();
                Box::pin(async move { rollup_worker::run_recalculation(&db, &cache, max_cascade_depth, payload).await })
                    as futures::future::BoxFuture<'static, CoreResult<serde_json::Value>>
            });
            let queue = Arc::new(PersistentQueue::new(db.clone(), config.rollup.queue_name.clone(), handler));
            let worker = queue.clone();
            let shutdown_rx = shutdown_rx.clone();
            workers.spawn(async move { worker.run(Duration::from_millis(500), shutdown_rx).await });
            queue
        };

        let filestore = Arc::new(FilestoreService::new(
            db.clone(),
            backends.clone(),
            events.clone(),
            rollup_cache.clone(),
            config.rollup.clone(),
            rollup_queue.clone(),
        ));

        // 5. Reconciliation manager: drift-triggered, audit-scheduled, and
        // manually-triggered re-sync (spec §4.5), backed by its own durable
        // queue. The queue's handler needs to call back into the manager it
        // is itself a field of; a `OnceCell` set right after construction
        // breaks that cycle, before the worker loop starts dispatching jobs.
        let manager_cell: Arc<tokio::sync::OnceCell<Arc<ReconciliationManager>>> =
            Arc::new(tokio::sync::OnceCell::new());
        let handler_cell = manager_cell.clone();
        let handler = Arc::new(move |payload: serde_json::Value| {
            let handler_cell = handler_cell.clone();
            Box::pin(async move {
                let job_id = payload.get("jobId").and_then(|v| v.as_i64()).ok_or_else(|| {
                    crate::error::CoreError::InvariantViolation("reconciliation job payload missing jobId".into())
                })?;
                let manager = handler_cell.get().expect("reconciliation manager initialized before queue starts").clone();
                manager.run_job(job_id).await.map(|outcome| serde_json::to_value(outcome).unwrap_or_default())
            }) as futures::future::BoxFuture<'static, CoreResult<serde_json::Value>>
        });
        let reconcile_persistent_queue =
            Arc::new(PersistentQueue::new(db.clone(), config.reconcile.queue_name.clone(), handler));
        {
            let worker = reconcile_persistent_queue.clone();
            let shutdown_rx = shutdown_rx.clone();
            workers.spawn(async move { worker.run(Duration::from_millis(500), shutdown_rx).await });
        }
        let reconcile_queue: Arc<dyn Queue> = reconcile_persistent_queue;

        let reconciliation = Arc::new(ReconciliationManager::new(
            db.clone(),
            backends.clone(),
            events.clone(),
            rollup_cache.clone(),
            config.rollup.clone(),
            reconcile_queue.clone(),
        ));
        manager_cell.set(reconciliation.clone()).ok();

        // Periodic audit sweep (spec §4.5 — default every 5 minutes).
        {
            let reconciliation = reconciliation.clone();
            let interval = config.reconcile.audit_interval;
            let batch_size = config.reconcile.audit_batch_size as u64;
            let mut shutdown_rx = shutdown_rx.clone();
            workers.spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(e) = reconciliation.trigger_audit_sweep(batch_size).await {
                                tracing::error!(error = %e, "audit sweep failed");
                            }
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            });
        }

        // 6. Timestore: ingestion processor and query planner over the same
        // metadata store and backend registry (spec §4.6–§4.8).
        let spool = Arc::new(Spool::open(&config.staging.spool_path)?);
        let timestore = Arc::new(TimestoreService::new(
            db.clone(),
            backends.clone(),
            events.clone(),
            spool.clone(),
            config.staging.clone(),
        ));
        let query_planner = Arc::new(QueryPlanner::new(db.clone()));

        info!("platform core initialized");

        Ok(Self {
            config,
            db,
            backends,
            events,
            filestore,
            reconciliation,
            timestore,
            query_planner,
            rollup_queue,
            reconcile_queue,
            shutdown_tx,
            workers: tokio::sync::Mutex::new(workers),
        })
    }

    /// Graceful shutdown: signal every background worker, then wait for them
    /// to drain within a bounded grace window (spec §5).
    pub async fn shutdown(&self) -> CoreResult<()> {
        info!("shutting down platform core");
        let _ = self.shutdown_tx.send(true);

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("worker drain exceeded grace window, continuing shutdown");
            workers.abort_all();
        }

        info!("platform core shutdown complete");
        Ok(())
    }

    pub fn rollup_queue(&self) -> Arc<dyn Queue> {
        self.rollup_queue.clone()
    }

    pub fn reconcile_queue(&self) -> Arc<dyn Queue> {
        self.reconcile_queue.clone()
    }
}
