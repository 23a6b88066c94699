//! Migration to create the sync_queue table.
//!
//! Besides the table itself this installs the two partial unique indexes that
//! make the queue safe under concurrent writers:
//!
//! - `idx_sync_queue_open_per_type` rejects a second open (pending/processing)
//!   job for the same user, provider and sync type.
//! - `idx_sync_queue_single_flight` rejects a second processing job for the
//!   same user and provider, so a lost claim race fails at the store.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncQueue::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncQueue::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncQueue::UserId).uuid().not_null())
                    .col(ColumnDef::new(SyncQueue::Provider).text().not_null())
                    .col(
                        ColumnDef::new(SyncQueue::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncQueue::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SyncQueue::SyncType).text().not_null())
                    .col(
                        ColumnDef::new(SyncQueue::ScheduledFor)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncQueue::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncQueue::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncQueue::ErrorMessage).text().null())
                    .col(ColumnDef::new(SyncQueue::ErrorKind).text().null())
                    .col(
                        ColumnDef::new(SyncQueue::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncQueue::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Dequeue scans pending rows by due time and priority
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_queue_status_scheduled_priority \
                 ON sync_queue (status, scheduled_for, priority DESC)"
                    .to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_queue_user_provider_status")
                    .table(SyncQueue::Table)
                    .col(SyncQueue::UserId)
                    .col(SyncQueue::Provider)
                    .col(SyncQueue::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_queue_open_per_type \
                 ON sync_queue (user_id, provider, sync_type) \
                 WHERE status IN ('pending','processing')"
                    .to_string(),
            ))
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_queue_single_flight \
                 ON sync_queue (user_id, provider) \
                 WHERE status = 'processing'"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [
            "idx_sync_queue_single_flight",
            "idx_sync_queue_open_per_type",
            "idx_sync_queue_user_provider_status",
            "idx_sync_queue_status_scheduled_priority",
        ] {
            manager
                .get_connection()
                .execute(Statement::from_string(
                    manager.get_database_backend(),
                    format!("DROP INDEX IF EXISTS {index}"),
                ))
                .await?;
        }

        manager
            .drop_table(Table::drop().table(SyncQueue::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncQueue {
    Table,
    Id,
    UserId,
    Provider,
    Priority,
    Status,
    SyncType,
    ScheduledFor,
    StartedAt,
    CompletedAt,
    ErrorMessage,
    ErrorKind,
    AttemptCount,
    CreatedAt,
    UpdatedAt,
}
