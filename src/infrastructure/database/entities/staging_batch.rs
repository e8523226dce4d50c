//! Staging batch entity: the metadata-store side of an open staging spool
//! entry (spec §4.7, component C7). The row data itself lives in the
//! `redb` spool (see `crate::timestore::spool`); this row tracks lifecycle
//! so a flush survives a process restart.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "staging_batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub dataset_id: i64,
    pub table_name: String,
    pub schema_version_id: i64,
    pub partition_key: Json,
    pub partition_attributes: Json,
    pub time_range_start: DateTimeUtc,
    pub time_range_end: DateTimeUtc,
    pub ingestion_signature: String,
    /// "open" | "flushing"
    pub status: String,
    pub row_count: i64,
    pub byte_count: i64,
    pub spool_key: String,
    pub received_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dataset::Entity",
        from = "Column::DatasetId",
        to = "super::dataset::Column::Id"
    )]
    Dataset,
}

impl Related<super::dataset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dataset.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
