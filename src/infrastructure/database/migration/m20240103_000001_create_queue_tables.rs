//! Persistent queue table backing [`crate::infrastructure::queue::PersistentQueue`].

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QueuedJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QueuedJobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QueuedJobs::QueueName).string().not_null())
                    .col(ColumnDef::new(QueuedJobs::JobKey).string())
                    .col(ColumnDef::new(QueuedJobs::Payload).json().not_null())
                    .col(ColumnDef::new(QueuedJobs::Status).string().not_null())
                    .col(ColumnDef::new(QueuedJobs::Attempt).integer().not_null())
                    .col(ColumnDef::new(QueuedJobs::Error).json())
                    .col(ColumnDef::new(QueuedJobs::Result).json())
                    .col(ColumnDef::new(QueuedJobs::RunAfter).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(QueuedJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QueuedJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_queued_jobs_queue_status")
                    .table(QueuedJobs::Table)
                    .col(QueuedJobs::QueueName)
                    .col(QueuedJobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_queued_jobs_queue_job_key")
                    .table(QueuedJobs::Table)
                    .col(QueuedJobs::QueueName)
                    .col(QueuedJobs::JobKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QueuedJobs::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum QueuedJobs {
    Table,
    Id,
    QueueName,
    JobKey,
    Payload,
    Status,
    Attempt,
    Error,
    Result,
    RunAfter,
    CreatedAt,
    UpdatedAt,
}
