//! Rollup entity: aggregated descendant statistics for a directory node
//! (spec §4.4, component C4).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rollups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub node_id: i64,
    pub size_bytes: i64,
    pub file_count: i64,
    pub directory_count: i64,
    pub child_count: i64,
    /// "up_to_date" | "pending" | "invalid"
    pub state: String,
    /// Internal optimistic-concurrency counter; not part of the domain
    /// `Rollup` value returned to callers.
    pub version: i64,
    pub last_calculated_at: Option<DateTimeUtc>,
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
