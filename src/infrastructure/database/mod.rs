//! The metadata store (spec §4.1, component C1).
//!
//! A thin wrapper over a sea-orm connection exposing the two primitives the
//! rest of the crate builds on — [`Database::with_transaction`] and
//! [`Database::with_connection`] — plus the typed repository modules under
//! [`repo`]. Any `applyDelta` on a rollup or read-then-write on a node
//! acquires its row lock through `SELECT ... FOR UPDATE` inside the active
//! transaction (see `repo::nodes::lock_for_update`).

use crate::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr, TransactionTrait};
use std::future::Future;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;
pub mod repo;

pub struct Database {
    conn: DatabaseConnection,
}

impl Database {
    /// Connect using the given configuration and run pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new(config.url.clone());
        opt.max_connections(config.pool_max)
            .min_connections(config.pool_max.min(4))
            .connect_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt).await?;
        info!(url = %redact(&config.url), "connected to metadata store");
        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self, DbErr> {
        let conn = SeaDatabase::connect("sqlite::memory:").await?;
        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), DbErr> {
        use sea_orm_migration::MigratorTrait;
        migration::Migrator::up(&self.conn, None).await?;
        info!("metadata store migrations applied");
        Ok(())
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`. Row locks taken with `FOR UPDATE` inside `f` are released at
    /// that boundary (spec §5).
    pub async fn with_transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&sea_orm::DatabaseTransaction) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbErr>,
    {
        let txn = self.conn.begin().await.map_err(E::from)?;
        match f(&txn).await {
            Ok(value) => {
                txn.commit().await.map_err(E::from)?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    pub async fn with_connection<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(&DatabaseConnection) -> Fut,
        Fut: Future<Output = T>,
    {
        f(&self.conn).await
    }
}

fn redact(url: &str) -> String {
    match url.find('@') {
        Some(at) => format!("***{}", &url[at..]),
        None => url.to_string(),
    }
}
