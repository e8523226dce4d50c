//! Timestore tables: datasets, schema versions, manifests, partitions,
//! staging batches, access events.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Datasets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Datasets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Datasets::Slug).string().not_null().unique_key())
                    .col(ColumnDef::new(Datasets::Name).string().not_null())
                    .col(
                        ColumnDef::new(Datasets::DefaultStorageTargetId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Datasets::Status).string().not_null())
                    .col(ColumnDef::new(Datasets::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(Datasets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DatasetSchemaVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetSchemaVersions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DatasetSchemaVersions::DatasetId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatasetSchemaVersions::Version)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DatasetSchemaVersions::Fields).json().not_null())
                    .col(
                        ColumnDef::new(DatasetSchemaVersions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DatasetSchemaVersions::Table, DatasetSchemaVersions::DatasetId)
                            .to(Datasets::Table, Datasets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schema_versions_dataset_version")
                    .table(DatasetSchemaVersions::Table)
                    .col(DatasetSchemaVersions::DatasetId)
                    .col(DatasetSchemaVersions::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DatasetManifests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetManifests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DatasetManifests::DatasetId).integer().not_null())
                    .col(ColumnDef::new(DatasetManifests::Shard).date().not_null())
                    .col(ColumnDef::new(DatasetManifests::Version).integer().not_null())
                    .col(ColumnDef::new(DatasetManifests::Status).string().not_null())
                    .col(
                        ColumnDef::new(DatasetManifests::SchemaVersionId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DatasetManifests::PartitionIds).json().not_null())
                    .col(
                        ColumnDef::new(DatasetManifests::RowCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatasetManifests::ByteSize)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DatasetManifests::StartTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(DatasetManifests::EndTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(DatasetManifests::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(DatasetManifests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DatasetManifests::Table, DatasetManifests::DatasetId)
                            .to(Datasets::Table, Datasets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_manifests_dataset_shard_version")
                    .table(DatasetManifests::Table)
                    .col(DatasetManifests::DatasetId)
                    .col(DatasetManifests::Shard)
                    .col(DatasetManifests::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ManifestPartitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ManifestPartitions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::ManifestId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::StorageTargetId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ManifestPartitions::PartitionKey).json().not_null())
                    .col(
                        ColumnDef::new(ManifestPartitions::PartitionAttributes)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ManifestPartitions::FileFormat).string().not_null())
                    .col(ColumnDef::new(ManifestPartitions::FilePath).string().not_null())
                    .col(
                        ColumnDef::new(ManifestPartitions::FileSizeBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::RowCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ManifestPartitions::Checksum).string().not_null())
                    .col(
                        ColumnDef::new(ManifestPartitions::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::ColumnStatistics)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::IngestionSignature)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestPartitions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ManifestPartitions::Table, ManifestPartitions::ManifestId)
                            .to(DatasetManifests::Table, DatasetManifests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_partitions_manifest_time")
                    .table(ManifestPartitions::Table)
                    .col(ManifestPartitions::ManifestId)
                    .col(ManifestPartitions::StartTime)
                    .col(ManifestPartitions::EndTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_partitions_ingestion_signature")
                    .table(ManifestPartitions::Table)
                    .col(ManifestPartitions::IngestionSignature)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StagingBatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StagingBatches::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StagingBatches::DatasetId).integer().not_null())
                    .col(ColumnDef::new(StagingBatches::TableName).string().not_null())
                    .col(
                        ColumnDef::new(StagingBatches::SchemaVersionId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StagingBatches::PartitionKey).json().not_null())
                    .col(
                        ColumnDef::new(StagingBatches::PartitionAttributes)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StagingBatches::TimeRangeStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StagingBatches::TimeRangeEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StagingBatches::IngestionSignature)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StagingBatches::Status).string().not_null())
                    .col(
                        ColumnDef::new(StagingBatches::RowCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StagingBatches::ByteCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(StagingBatches::SpoolKey).string().not_null())
                    .col(
                        ColumnDef::new(StagingBatches::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(StagingBatches::Table, StagingBatches::DatasetId)
                            .to(Datasets::Table, Datasets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_staging_batches_dataset_status")
                    .table(StagingBatches::Table)
                    .col(StagingBatches::DatasetId)
                    .col(StagingBatches::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_staging_batches_signature")
                    .table(StagingBatches::Table)
                    .col(StagingBatches::IngestionSignature)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DatasetAccessEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetAccessEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DatasetAccessEvents::DatasetId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DatasetAccessEvents::Kind).string().not_null())
                    .col(
                        ColumnDef::new(DatasetAccessEvents::PartitionsConsidered)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatasetAccessEvents::PartitionsPruned)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DatasetAccessEvents::RowsReturned).big_integer())
                    .col(
                        ColumnDef::new(DatasetAccessEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DatasetAccessEvents::Table, DatasetAccessEvents::DatasetId)
                            .to(Datasets::Table, Datasets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DatasetAccessEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StagingBatches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ManifestPartitions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DatasetManifests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DatasetSchemaVersions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Datasets::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum Datasets {
    Table,
    Id,
    Slug,
    Name,
    DefaultStorageTargetId,
    Status,
    Metadata,
    UpdatedAt,
}

#[derive(Iden)]
enum DatasetSchemaVersions {
    Table,
    Id,
    DatasetId,
    Version,
    Fields,
    CreatedAt,
}

#[derive(Iden)]
enum DatasetManifests {
    Table,
    Id,
    DatasetId,
    Shard,
    Version,
    Status,
    SchemaVersionId,
    PartitionIds,
    RowCount,
    ByteSize,
    StartTime,
    EndTime,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
enum ManifestPartitions {
    Table,
    Id,
    ManifestId,
    StorageTargetId,
    PartitionKey,
    PartitionAttributes,
    FileFormat,
    FilePath,
    FileSizeBytes,
    RowCount,
    Checksum,
    StartTime,
    EndTime,
    ColumnStatistics,
    IngestionSignature,
    CreatedAt,
}

#[derive(Iden)]
enum StagingBatches {
    Table,
    Id,
    DatasetId,
    TableName,
    SchemaVersionId,
    PartitionKey,
    PartitionAttributes,
    TimeRangeStart,
    TimeRangeEnd,
    IngestionSignature,
    Status,
    RowCount,
    ByteCount,
    SpoolKey,
    ReceivedAt,
}

#[derive(Iden)]
enum DatasetAccessEvents {
    Table,
    Id,
    DatasetId,
    Kind,
    PartitionsConsidered,
    PartitionsPruned,
    RowsReturned,
    OccurredAt,
}
