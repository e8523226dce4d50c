//! Environment-driven configuration (spec §6).
//!
//! Unlike the desktop-app configuration this core was adapted from (which
//! loaded a JSON file from a data directory), this is a headless library
//! embedded behind a service process, so configuration is read from the
//! process environment once at startup.

use std::env;
use std::time::Duration;

/// Where partition/node artifacts physically live.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { root: String },
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    },
}

impl StorageConfig {
    pub fn from_env() -> Self {
        match env::var("STORAGE_DRIVER").unwrap_or_else(|_| "local".into()).as_str() {
            "s3" => StorageConfig::S3 {
                bucket: env::var("S3_BUCKET").unwrap_or_default(),
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: env::var("S3_REGION").ok(),
                access_key_id: env::var("S3_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("S3_SECRET_ACCESS_KEY").ok(),
                force_path_style: env::var("S3_FORCE_PATH_STYLE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
            },
            _ => StorageConfig::Local {
                root: env::var("STORAGE_ROOT").unwrap_or_else(|_| "./data/storage".into()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub queue_name: String,
    pub queue_concurrency: usize,
    pub audit_interval: Duration,
    pub audit_batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            queue_name: env::var("RECONCILE_QUEUE_NAME").unwrap_or_else(|_| "reconcile".into()),
            queue_concurrency: env_usize("RECONCILE_QUEUE_CONCURRENCY", 1),
            audit_interval: Duration::from_millis(env_u64("RECONCILE_AUDIT_INTERVAL_MS", 300_000)),
            audit_batch_size: env_usize("RECONCILE_AUDIT_BATCH_SIZE", 100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollupConfig {
    pub queue_name: String,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub recalc_depth_threshold: u32,
    pub recalc_child_threshold: i64,
    pub max_cascade_depth: u32,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            queue_name: env::var("ROLLUP_QUEUE_NAME").unwrap_or_else(|_| "rollup".into()),
            cache_ttl: Duration::from_secs(env_u64("ROLLUP_CACHE_TTL_SECONDS", 300)),
            cache_max_entries: env_usize("ROLLUP_CACHE_MAX_ENTRIES", 1024),
            recalc_depth_threshold: env_u64("ROLLUP_RECALC_DEPTH_THRESHOLD", 4) as u32,
            recalc_child_threshold: env_u64("ROLLUP_RECALC_CHILD_THRESHOLD", 50) as i64,
            max_cascade_depth: env_u64("ROLLUP_MAX_CASCADE_DEPTH", 64) as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub flush_max_rows: u64,
    pub flush_max_bytes: u64,
    pub flush_max_age: Duration,
    /// Path to the `redb` staging spool file (spec §4.7 step 5).
    pub spool_path: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            flush_max_rows: env_u64("STAGING_FLUSH_MAX_ROWS", 1),
            flush_max_bytes: env_u64("STAGING_FLUSH_MAX_BYTES", 8 * 1024 * 1024),
            flush_max_age: Duration::from_millis(env_u64("STAGING_FLUSH_MAX_AGE_MS", 30_000)),
            spool_path: env::var("STAGING_SPOOL_PATH").unwrap_or_else(|_| "./data/staging.redb".into()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EventsConfig {
    Inline,
    Redis { url: String, channel: String },
}

impl EventsConfig {
    pub fn from_env() -> Self {
        match env::var("EVENTS_MODE").unwrap_or_else(|_| "inline".into()).as_str() {
            "redis" => EventsConfig::Redis {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1".into()),
                channel: env::var("EVENTS_CHANNEL").unwrap_or_else(|_| "core.events".into()),
            },
            _ => EventsConfig::Inline,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub schema: Option<String>,
    pub pool_max: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".into()),
            schema: env::var("PG_SCHEMA").ok(),
            pool_max: env_u64("PGPOOL_MAX", 10) as u32,
        }
    }
}

/// Top-level process configuration, assembled entirely from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub reconcile: ReconcileConfig,
    pub rollup: RollupConfig,
    pub staging: StagingConfig,
    pub events: EventsConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            storage: StorageConfig::from_env(),
            reconcile: ReconcileConfig::default(),
            rollup: RollupConfig::default(),
            staging: StagingConfig::default(),
            events: EventsConfig::from_env(),
            database: DatabaseConfig::default(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
