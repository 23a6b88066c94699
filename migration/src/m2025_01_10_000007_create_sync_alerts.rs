//! Migration to create the sync_alerts table.
//!
//! Alerts are the active notifications raised for terminal sync failures and
//! expired provider authorization.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncAlerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncAlerts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncAlerts::UserId).uuid().not_null())
                    .col(ColumnDef::new(SyncAlerts::Provider).text().not_null())
                    .col(ColumnDef::new(SyncAlerts::Kind).text().not_null())
                    .col(ColumnDef::new(SyncAlerts::Message).text().not_null())
                    .col(ColumnDef::new(SyncAlerts::JobId).uuid().null())
                    .col(
                        ColumnDef::new(SyncAlerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncAlerts::AcknowledgedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_alerts_user_ack")
                    .table(SyncAlerts::Table)
                    .col(SyncAlerts::UserId)
                    .col(SyncAlerts::AcknowledgedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sync_alerts_user_ack").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncAlerts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncAlerts {
    Table,
    Id,
    UserId,
    Provider,
    Kind,
    Message,
    JobId,
    CreatedAt,
    AcknowledgedAt,
}
