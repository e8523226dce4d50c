//! End-to-end coverage of the filestore mutation/rollup/reconciliation path
//! over a fully wired [`platform_core::Core`] (spec §4.2–§4.5).

use bytes::Bytes;
use platform_core::config::{
    AppConfig, DatabaseConfig, EventsConfig, ReconcileConfig, RollupConfig, StagingConfig, StorageConfig,
};
use platform_core::domain::node::NodeKind;
use platform_core::filestore::mutations::{CreateDirectoryRequest, DeleteRequest, UploadFileRequest};
use platform_core::infrastructure::database::repo;
use platform_core::Core;
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

#[tokio::test]
async fn create_upload_reconcile_delete_roundtrip() {
    let storage_dir = tempfile::tempdir().unwrap();
    let spool_dir = tempfile::tempdir().unwrap();
    let core = test_core(storage_dir.path(), &spool_dir.path().join("staging.redb")).await;

    let storage_root = storage_dir.path().to_str().unwrap().to_string();
    let mount = core
        .db
        .with_connection(|conn| async move { repo::backend_mounts::insert(conn, "primary", "local", &storage_root, None, None, None, false).await })
        .await
        .unwrap();

    let dir = core
        .filestore
        .create_directory(CreateDirectoryRequest {
            backend_mount_id: mount.id,
            path: "docs".into(),
            metadata: None,
            idempotency_key: None,
        })
        .await
        .unwrap();
    assert_eq!(dir.kind, NodeKind::Directory);
    assert_eq!(dir.path, "docs");

    let file = core
        .filestore
        .upload_file(UploadFileRequest {
            backend_mount_id: mount.id,
            path: "docs/a.txt".into(),
            content: Bytes::from_static(b"hello world"),
            checksum: None,
            metadata: None,
            overwrite: None,
            idempotency_key: None,
        })
        .await
        .unwrap();
    assert_eq!(file.kind, NodeKind::File);
    assert_eq!(file.size_bytes, 11);

    let rollup = core.db.with_connection(|conn| async move { repo::rollups::get(conn, dir.id, false).await }).await.unwrap();
    let rollup = rollup.expect("directory rollup exists");
    assert_eq!(rollup.size_bytes, 11);
    assert_eq!(rollup.file_count, 1);

    let job = core.reconciliation.trigger_manual(mount.id, Some(file.id), "docs/a.txt", false).await.unwrap();
    let mut settled = None;
    for _ in 0..30 {
        let job_key = job.job_key.clone();
        let current = core
            .db
            .with_connection(|conn| async move { repo::reconciliation::find_active_by_key(conn, &job_key).await })
            .await
            .unwrap();
        if current.is_none() {
            settled = core.db.with_connection(|conn| async move { repo::reconciliation::get_by_id(conn, job.id).await }).await.unwrap();
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let settled = settled.expect("reconciliation job reached a terminal state within the timeout");
    assert!(!settled.status.is_active());

    let deleted = core
        .filestore
        .delete(DeleteRequest { backend_mount_id: mount.id, path: "docs/a.txt".into(), recursive: Some(false), idempotency_key: None })
        .await
        .unwrap();
    assert_eq!(deleted.id, file.id);

    let rollup_after_delete =
        core.db.with_connection(|conn| async move { repo::rollups::get(conn, dir.id, false).await }).await.unwrap().unwrap();
    assert_eq!(rollup_after_delete.size_bytes, 0);
    assert_eq!(rollup_after_delete.file_count, 0);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn idempotency_key_replays_the_original_result() {
    let storage_dir = tempfile::tempdir().unwrap();
    let spool_dir = tempfile::tempdir().unwrap();
    let core = test_core(storage_dir.path(), &spool_dir.path().join("staging.redb")).await;

    let storage_root = storage_dir.path().to_str().unwrap().to_string();
    let mount = core
        .db
        .with_connection(|conn| async move { repo::backend_mounts::insert(conn, "primary", "local", &storage_root, None, None, None, false).await })
        .await
        .unwrap();

    let request = || CreateDirectoryRequest {
        backend_mount_id: mount.id,
        path: "reports".into(),
        metadata: None,
        idempotency_key: Some("create-reports-once".into()),
    };

    let first = core.filestore.create_directory(request()).await.unwrap();
    let second = core.filestore.create_directory(request()).await.unwrap();
    assert_eq!(first.id, second.id);

    core.shutdown().await.unwrap();
}
