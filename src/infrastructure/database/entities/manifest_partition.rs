//! Manifest partition entity: one immutable columnar file and its pruning
//! statistics (spec §4.7/§4.8, component C8).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "manifest_partitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub manifest_id: i64,
    pub storage_target_id: i64,
    pub partition_key: Json,
    pub partition_attributes: Json,
    /// "duckdb" | "parquet" | "clickhouse"
    pub file_format: String,
    pub file_path: String,
    pub file_size_bytes: i64,
    pub row_count: i64,
    pub checksum: String,
    pub start_time: DateTimeUtc,
    pub end_time: DateTimeUtc,
    /// Map of column name -> [`crate::domain::partition::ColumnStatistics`].
    pub column_statistics: Json,
    pub ingestion_signature: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dataset_manifest::Entity",
        from = "Column::ManifestId",
        to = "super::dataset_manifest::Column::Id"
    )]
    Manifest,
}

impl Related<super::dataset_manifest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Manifest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
