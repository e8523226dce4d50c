//! Dataset manifest entity: the authoritative partition list for one
//! dataset shard (spec §4.7/§4.8, components C7/C8).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dataset_manifests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub dataset_id: i64,
    pub shard: Date,
    pub version: i32,
    /// "draft" | "published" | "superseded"
    pub status: String,
    pub schema_version_id: i64,
    pub partition_ids: Json,
    pub row_count: i64,
    pub byte_size: i64,
    pub start_time: Option<DateTimeUtc>,
    pub end_time: Option<DateTimeUtc>,
    pub metadata: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dataset::Entity",
        from = "Column::DatasetId",
        to = "super::dataset::Column::Id"
    )]
    Dataset,
    #[sea_orm(has_many = "super::manifest_partition::Entity")]
    Partitions,
}

impl Related<super::dataset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dataset.def()
    }
}

impl Related<super::manifest_partition::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Partitions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
