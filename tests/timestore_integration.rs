//! End-to-end coverage of the ingestion-to-query-plan path (spec
//! §4.6–§4.8) over a fully wired [`platform_core::Core`].

use platform_core::config::{
    AppConfig, DatabaseConfig, EventsConfig, ReconcileConfig, RollupConfig, StagingConfig, StorageConfig,
};
use platform_core::domain::schema::{FieldType, SchemaField};
use platform_core::domain::staging::TimeRange;
use platform_core::infrastructure::database::repo;
use platform_core::timestore::{Filter, IngestRequest, Predicate, QueryRequest};
use platform_core::Core;
use chrono::TimeZone;
use std::collections::HashMap;
use std::time::Duration;

async fn test_core(storage_root: &std::path::Path, spool_path: &std::path::Path) -> Core {
    let config = AppConfig {
        storage: StorageConfig::Local { root: storage_root.to_str().unwrap().to_string() },
        reconcile: ReconcileConfig {
            queue_name: "reconcile-test".into(),
            queue_concurrency: 1,
            audit_interval: Duration::from_secs(3600),
            audit_batch_size: 100,
        },
        rollup: RollupConfig {
            queue_name: "rollup-test".into(),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 64,
            recalc_depth_threshold: 4,
            recalc_child_threshold: 50,
            max_cascade_depth: 64,
        },
        staging: StagingConfig {
            flush_max_rows: 1,
            flush_max_bytes: 8 * 1024 * 1024,
            flush_max_age: Duration::from_secs(30),
            spool_path: spool_path.to_str().unwrap().to_string(),
        },
        events: EventsConfig::Inline,
        database: DatabaseConfig { url: "sqlite::memory:".into(), schema: None, pool_max: 1 },
    };
    Core::new_with_config(config).await.unwrap()
}

fn weather_schema() -> Vec<SchemaField> {
    vec![
        SchemaField { name: "ts".into(), field_type: FieldType::Timestamp, nullable: false, description: None },
        SchemaField { name: "temp".into(), field_type: FieldType::Double, nullable: true, description: None },
    ]
}

#[tokio::test]
async fn single_row_ingest_flushes_and_is_queryable() {
    let storage_dir = tempfile::tempdir().unwrap();
    let spool_dir = tempfile::tempdir().unwrap();
    let core = test_core(storage_dir.path(), &spool_dir.path().join("staging.redb")).await;

    let storage_root = storage_dir.path().to_str().unwrap().to_string();
    let mount = core
        .db
        .with_connection(|conn| async move { repo::backend_mounts::insert(conn, "lake", "local", &storage_root, None, None, None, false).await })
        .await
        .unwrap();

    let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(1);

    let outcome = core
        .timestore
        .ingest(IngestRequest {
            dataset_slug: "weather".into(),
            dataset_name: "weather".into(),
            default_storage_target_id: mount.id,
            table_name: "readings".into(),
            schema: weather_schema(),
            partition_key: HashMap::new(),
            partition_attributes: HashMap::new(),
            time_range: TimeRange { start, end },
            rows: vec![serde_json::json!({"ts": start.to_rfc3339(), "temp": 21.5})],
            idempotency_key: None,
            backfill_on_evolution: false,
        })
        .await
        .unwrap();

    assert!(outcome.flushed);
    let partition = outcome.partition.expect("flush produces a partition");
    assert_eq!(partition.row_count, 1);

    let plan = core
        .query_planner
        .plan(QueryRequest {
            dataset_slug: "weather".into(),
            time_range_start: start - chrono::Duration::minutes(5),
            time_range_end: end + chrono::Duration::minutes(5),
            columns: vec!["temp".into()],
            filters: vec![],
        })
        .await
        .unwrap();
    assert_eq!(plan.entries.len(), 1);
    assert_eq!(plan.partitions_considered, 1);
    assert_eq!(plan.partitions_pruned, 0);

    let pruned_plan = core
        .query_planner
        .plan(QueryRequest {
            dataset_slug: "weather".into(),
            time_range_start: start - chrono::Duration::minutes(5),
            time_range_end: end + chrono::Duration::minutes(5),
            columns: vec!["temp".into()],
            filters: vec![Filter { column: "temp".into(), predicate: Predicate::Ge(serde_json::json!(100.0)) }],
        })
        .await
        .unwrap();
    assert_eq!(pruned_plan.entries.len(), 0);
    assert_eq!(pruned_plan.partitions_pruned, 1);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn replayed_ingest_with_same_signature_does_not_reflush() {
    let storage_dir = tempfile::tempdir().unwrap();
    let spool_dir = tempfile::tempdir().unwrap();
    let core = test_core(storage_dir.path(), &spool_dir.path().join("staging.redb")).await;

    let storage_root = storage_dir.path().to_str().unwrap().to_string();
    let mount = core
        .db
        .with_connection(|conn| async move { repo::backend_mounts::insert(conn, "lake", "local", &storage_root, None, None, None, false).await })
        .await
        .unwrap();

    let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(1);

    let request = || IngestRequest {
        dataset_slug: "weather".into(),
        dataset_name: "weather".into(),
        default_storage_target_id: mount.id,
        table_name: "readings".into(),
        schema: weather_schema(),
        partition_key: HashMap::new(),
        partition_attributes: HashMap::new(),
        time_range: TimeRange { start, end },
        rows: vec![serde_json::json!({"ts": start.to_rfc3339(), "temp": 21.5})],
        idempotency_key: Some("weather-batch-1".into()),
        backfill_on_evolution: false,
    };

    let first = core.timestore.ingest(request()).await.unwrap();
    assert!(first.flushed);
    let second = core.timestore.ingest(request()).await.unwrap();
    assert!(!second.flushed);
    assert_eq!(first.partition.unwrap().id, second.partition.unwrap().id);

    core.shutdown().await.unwrap();
}
