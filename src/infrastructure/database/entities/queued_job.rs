//! Persistent queue job record backing [`crate::infrastructure::queue::PersistentQueue`]
//! (spec §4.9).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "queued_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub queue_name: String,
    /// Jobs sharing a `job_key` are coalesced while still `waiting`.
    pub job_key: Option<String>,
    pub payload: Json,
    /// "waiting" | "active" | "completed" | "failed" | "delayed" | "paused"
    pub status: String,
    pub attempt: i32,
    pub error: Option<Json>,
    pub result: Option<Json>,
    pub run_after: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
