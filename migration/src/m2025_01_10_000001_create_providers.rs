//! Migration to create the providers table.
//!
//! Each row is one user's connection to an external health-data source. Rows are
//! soft-disconnected rather than deleted so queue and rotation state can keep
//! referring to them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Providers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Providers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Providers::UserId).uuid().not_null())
                    .col(ColumnDef::new(Providers::Slug).text().not_null())
                    .col(ColumnDef::new(Providers::DisplayName).text().not_null())
                    .col(
                        ColumnDef::new(Providers::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Providers::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Providers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Providers::UpdatedAt)
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
                    .name("idx_providers_user_slug")
                    .table(Providers::Table)
                    .col(Providers::UserId)
                    .col(Providers::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_providers_user_slug").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Providers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
    UserId,
    Slug,
    DisplayName,
    Status,
    Metadata,
    CreatedAt,
    UpdatedAt,
}
