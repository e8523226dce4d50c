//! Dataset entity: a named, schema-evolving time-series table (spec §4.7,
//! component C7).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "datasets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub slug: String,
    pub name: String,
    pub default_storage_target_id: i64,
    /// "active" | "inactive"
    pub status: String,
    pub metadata: Json,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dataset_schema_version::Entity")]
    SchemaVersions,
    #[sea_orm(has_many = "super::dataset_manifest::Entity")]
    Manifests,
    #[sea_orm(has_many = "super::staging_batch::Entity")]
    StagingBatches,
}

impl Related<super::dataset_schema_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SchemaVersions.def()
    }
}

impl Related<super::dataset_manifest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Manifests.def()
    }
}

impl Related<super::staging_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StagingBatches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
