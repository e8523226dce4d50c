//! Reconciliation job entity (spec §4.5, component C5).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reconciliation_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Coalescing key: `reconcile:{backend_mount_id}:{path}`. A job already
    /// queued or running under this key absorbs a duplicate trigger instead
    /// of spawning a second one (spec §4.5).
    #[sea_orm(indexed)]
    pub job_key: String,
    pub backend_mount_id: i64,
    pub node_id: Option<i64>,
    pub path: String,
    /// "queued" | "running" | "succeeded" | "failed" | "skipped" | "cancelled"
    pub status: String,
    pub attempt: i32,
    /// "drift" | "audit" | "manual"
    pub reason: String,
    pub detect_children: bool,
    pub error: Option<Json>,
    pub result: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::node::Entity",
        from = "Column::NodeId",
        to = "super::node::Column::Id"
    )]
    Node,
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Node.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
