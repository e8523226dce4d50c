//! `platform-corectl`: an operator CLI over the core's filestore and
//! timestore services, for local testing and scripted administration.

use clap::{Parser, Subcommand};
use platform_core::config::AppConfig;
use platform_core::domain::schema::{FieldType, SchemaField};
use platform_core::domain::staging::TimeRange;
use platform_core::filestore::mutations::{CreateDirectoryRequest, DeleteRequest, UploadFileRequest};
use platform_core::timestore::IngestRequest;
use platform_core::Core;
use std::collections::HashMap;

#[derive(Parser)]
#[command(name = "platform-corectl")]
#[command(about = "Operator CLI for the platform core", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a directory node under a backend mount
    Mkdir {
        backend_mount_id: i64,
        path: String,
    },
    /// Upload a file's bytes (read from stdin) under a backend mount
    Upload {
        backend_mount_id: i64,
        path: String,
    },
    /// Delete a node (and its subtree, if a directory)
    Rm {
        backend_mount_id: i64,
        path: String,
    },
    /// Manually trigger reconciliation for a path
    Reconcile {
        backend_mount_id: i64,
        path: String,
        #[arg(long)]
        detect_children: bool,
    },
    /// Ingest a single JSON row into a dataset, creating it if absent
    Ingest {
        dataset_slug: String,
        storage_target_id: i64,
        /// JSON object, e.g. '{"ts": "2026-01-01T00:00:00Z", "temp": 21.5}'
        row: String,
    },
    /// Print the queue depth counters for the rollup and reconciliation queues
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("platform_core={log_level}")));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let core = Core::new_with_config(AppConfig::from_env()).await?;

    match cli.command {
        Commands::Mkdir { backend_mount_id, path } => {
            let node = core
                .filestore
                .create_directory(CreateDirectoryRequest {
                    backend_mount_id,
                    path,
                    metadata: None,
                    idempotency_key: None,
                })
                .await?;
            println!("created directory node {}", node.id);
        }
        Commands::Upload { backend_mount_id, path } => {
            use std::io::Read;
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            let node = core
                .filestore
                .upload_file(UploadFileRequest {
                    backend_mount_id,
                    path,
                    content: bytes.into(),
                    checksum: None,
                    metadata: None,
                    overwrite: None,
                    idempotency_key: None,
                })
                .await?;
            println!("uploaded node {} ({} bytes)", node.id, node.size_bytes);
        }
        Commands::Rm { backend_mount_id, path } => {
            let deleted = core
                .filestore
                .delete(DeleteRequest { backend_mount_id, path, recursive: Some(true), idempotency_key: None })
                .await?;
            println!("deleted node {}", deleted.id);
        }
        Commands::Reconcile { backend_mount_id, path, detect_children } => {
            let job = core
                .reconciliation
                .trigger_manual(backend_mount_id, None, &path, detect_children)
                .await?;
            println!("reconciliation job {} queued", job.id);
        }
        Commands::Ingest { dataset_slug, storage_target_id, row } => {
            let value: serde_json::Value = serde_json::from_str(&row)?;
            let schema = vec![SchemaField {
                name: "ts".into(),
                field_type: FieldType::Timestamp,
                nullable: false,
                description: None,
            }];
            let now = chrono::Utc::now();
            let outcome = core
                .timestore
                .ingest(IngestRequest {
                    dataset_slug: dataset_slug.clone(),
                    dataset_name: dataset_slug,
                    default_storage_target_id: storage_target_id,
                    table_name: "default".into(),
                    schema,
                    partition_key: HashMap::new(),
                    partition_attributes: HashMap::new(),
                    time_range: TimeRange { start: now, end: now },
                    rows: vec![value],
                    idempotency_key: None,
                    backfill_on_evolution: false,
                })
                .await?;
            println!("ingested: flushed={}", outcome.flushed);
        }
        Commands::Status => {
            let rollup_depth = core.rollup_queue().depth().await?;
            let reconcile_depth = core.reconcile_queue().depth().await?;
            println!("rollup queue:       {rollup_depth:?}");
            println!("reconciliation queue: {reconcile_depth:?}");
        }
    }

    core.shutdown().await?;
    Ok(())
}
