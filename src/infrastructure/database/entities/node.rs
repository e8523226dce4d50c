//! Node entity (spec §3).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub backend_mount_id: i64,
    pub parent_id: Option<i64>,
    pub path: String,
    pub name: String,
    pub depth: i32,
    /// "file" | "directory"
    pub kind: String,
    /// "active" | "missing" | "inconsistent" | "deleted"
    pub state: String,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub content_hash: Option<String>,
    /// Free-form metadata, stored as a JSON object.
    pub metadata: Json,
    pub version: i64,
    /// "consistent" | "inconsistent" | "missing"
    pub consistency_state: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub last_seen_at: Option<DateTimeUtc>,
    pub last_modified_at: Option<DateTimeUtc>,
    pub consistency_checked_at: Option<DateTimeUtc>,
    pub last_reconciled_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::backend_mount::Entity",
        from = "Column::BackendMountId",
        to = "super::backend_mount::Column::Id"
    )]
    BackendMount,
    #[sea_orm(has_one = "super::rollup::Entity")]
    Rollup,
}

impl Related<super::backend_mount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BackendMount.def()
    }
}

impl Related<super::rollup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rollup.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
