//! Initial migration: creates the filestore tables (backend mounts, nodes,
//! rollups, snapshots, journal entries, reconciliation jobs).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackendMounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackendMounts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BackendMounts::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(BackendMounts::Driver).string().not_null())
                    .col(ColumnDef::new(BackendMounts::RootOrBucket).string().not_null())
                    .col(ColumnDef::new(BackendMounts::Prefix).string())
                    .col(ColumnDef::new(BackendMounts::Endpoint).string())
                    .col(ColumnDef::new(BackendMounts::Region).string())
                    .col(
                        ColumnDef::new(BackendMounts::ForcePathStyle)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(BackendMounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Nodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Nodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Nodes::BackendMountId).integer().not_null())
                    .col(ColumnDef::new(Nodes::ParentId).integer())
                    .col(ColumnDef::new(Nodes::Path).string().not_null())
                    .col(ColumnDef::new(Nodes::Name).string().not_null())
                    .col(ColumnDef::new(Nodes::Depth).integer().not_null())
                    .col(ColumnDef::new(Nodes::Kind).string().not_null())
                    .col(ColumnDef::new(Nodes::State).string().not_null())
                    .col(
                        ColumnDef::new(Nodes::SizeBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Nodes::Checksum).string())
                    .col(ColumnDef::new(Nodes::ContentHash).string())
                    .col(ColumnDef::new(Nodes::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(Nodes::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Nodes::ConsistencyState).string().not_null())
                    .col(
                        ColumnDef::new(Nodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Nodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Nodes::LastSeenAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Nodes::LastModifiedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Nodes::ConsistencyCheckedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Nodes::LastReconciledAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Nodes::Table, Nodes::BackendMountId)
                            .to(BackendMounts::Table, BackendMounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Nodes::Table, Nodes::ParentId)
                            .to(Nodes::Table, Nodes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_mount_path")
                    .table(Nodes::Table)
                    .col(Nodes::BackendMountId)
                    .col(Nodes::Path)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_parent")
                    .table(Nodes::Table)
                    .col(Nodes::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Rollups::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rollups::NodeId).integer().not_null().primary_key())
                    .col(
                        ColumnDef::new(Rollups::SizeBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Rollups::FileCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Rollups::DirectoryCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Rollups::ChildCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Rollups::State).string().not_null())
                    .col(
                        ColumnDef::new(Rollups::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Rollups::LastCalculatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Rollups::Table, Rollups::NodeId)
                            .to(Nodes::Table, Nodes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Snapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Snapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Snapshots::NodeId).integer().not_null())
                    .col(ColumnDef::new(Snapshots::ObservedSizeBytes).big_integer())
                    .col(ColumnDef::new(Snapshots::ObservedChecksum).string())
                    .col(ColumnDef::new(Snapshots::ObservedState).string().not_null())
                    .col(
                        ColumnDef::new(Snapshots::Matched)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Snapshots::TakenAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Snapshots::Table, Snapshots::NodeId)
                            .to(Nodes::Table, Nodes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_snapshots_node")
                    .table(Snapshots::Table)
                    .col(Snapshots::NodeId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JournalEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalEntries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JournalEntries::NodeId).integer())
                    .col(ColumnDef::new(JournalEntries::CommandKind).string().not_null())
                    .col(ColumnDef::new(JournalEntries::Payload).json().not_null())
                    .col(ColumnDef::new(JournalEntries::Result).json().not_null())
                    .col(
                        ColumnDef::new(JournalEntries::IdempotencyKey)
                            .string()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(JournalEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReconciliationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationJobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReconciliationJobs::JobKey).string().not_null())
                    .col(
                        ColumnDef::new(ReconciliationJobs::BackendMountId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReconciliationJobs::NodeId).integer())
                    .col(ColumnDef::new(ReconciliationJobs::Path).string().not_null())
                    .col(ColumnDef::new(ReconciliationJobs::Status).string().not_null())
                    .col(
                        ColumnDef::new(ReconciliationJobs::Attempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ReconciliationJobs::Reason).string().not_null())
                    .col(
                        ColumnDef::new(ReconciliationJobs::DetectChildren)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ReconciliationJobs::Error).json())
                    .col(ColumnDef::new(ReconciliationJobs::Result).json())
                    .col(
                        ColumnDef::new(ReconciliationJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ReconciliationJobs::Table, ReconciliationJobs::BackendMountId)
                            .to(BackendMounts::Table, BackendMounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ReconciliationJobs::Table, ReconciliationJobs::NodeId)
                            .to(Nodes::Table, Nodes::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reconciliation_jobs_key")
                    .table(ReconciliationJobs::Table)
                    .col(ReconciliationJobs::JobKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReconciliationJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JournalEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Snapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rollups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Nodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackendMounts::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum BackendMounts {
    Table,
    Id,
    Name,
    Driver,
    RootOrBucket,
    Prefix,
    Endpoint,
    Region,
    ForcePathStyle,
    CreatedAt,
}

#[derive(Iden)]
enum Nodes {
    Table,
    Id,
    BackendMountId,
    ParentId,
    Path,
    Name,
    Depth,
    Kind,
    State,
    SizeBytes,
    Checksum,
    ContentHash,
    Metadata,
    Version,
    ConsistencyState,
    CreatedAt,
    UpdatedAt,
    LastSeenAt,
    LastModifiedAt,
    ConsistencyCheckedAt,
    LastReconciledAt,
}

#[derive(Iden)]
enum Rollups {
    Table,
    NodeId,
    SizeBytes,
    FileCount,
    DirectoryCount,
    ChildCount,
    State,
    Version,
    LastCalculatedAt,
}

#[derive(Iden)]
enum Snapshots {
    Table,
    Id,
    NodeId,
    ObservedSizeBytes,
    ObservedChecksum,
    ObservedState,
    Matched,
    TakenAt,
}

#[derive(Iden)]
enum JournalEntries {
    Table,
    Id,
    NodeId,
    CommandKind,
    Payload,
    Result,
    IdempotencyKey,
    CreatedAt,
}

#[derive(Iden)]
enum ReconciliationJobs {
    Table,
    Id,
    JobKey,
    BackendMountId,
    NodeId,
    Path,
    Status,
    Attempt,
    Reason,
    DetectChildren,
    Error,
    Result,
    CreatedAt,
    UpdatedAt,
}
