//! Migration to create the append-only connection_events table.
//!
//! The id is a monotonically increasing integer so readers can break
//! `created_at` ties by insertion order.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectionEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectionEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConnectionEvents::UserId).uuid().not_null())
                    .col(ColumnDef::new(ConnectionEvents::Provider).text().not_null())
                    .col(ColumnDef::new(ConnectionEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(ConnectionEvents::EventData)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectionEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connection_events_user_provider_created")
                    .table(ConnectionEvents::Table)
                    .col(ConnectionEvents::UserId)
                    .col(ConnectionEvents::Provider)
                    .col(ConnectionEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connection_events_user_provider_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ConnectionEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConnectionEvents {
    Table,
    Id,
    UserId,
    Provider,
    EventType,
    EventData,
    CreatedAt,
}
