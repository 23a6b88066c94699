//! Migration to create the rotation_state table.
//!
//! One row per user. `version` backs the compare-and-swap used by every
//! rotation mutation.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RotationState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RotationState::UserId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RotationState::RotationOrder)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RotationState::CurrentSourceIndex)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RotationState::IntervalSeconds)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(RotationState::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RotationState::TotalRotations)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RotationState::LastRotationAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RotationState::NextRotationAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RotationState::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RotationState::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Rotation driver scans enabled states by due time
        manager
            .create_index(
                Index::create()
                    .name("idx_rotation_state_enabled_next")
                    .table(RotationState::Table)
                    .col(RotationState::Enabled)
                    .col(RotationState::NextRotationAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_rotation_state_enabled_next")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(RotationState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RotationState {
    Table,
    UserId,
    RotationOrder,
    CurrentSourceIndex,
    IntervalSeconds,
    Enabled,
    TotalRotations,
    LastRotationAt,
    NextRotationAt,
    Version,
    UpdatedAt,
}
