//! Migration to create the rotation_schedule table.
//!
//! Tracks the next periodic background refresh per user and provider,
//! independent of ad-hoc sync jobs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RotationSchedule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RotationSchedule::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RotationSchedule::UserId).uuid().not_null())
                    .col(ColumnDef::new(RotationSchedule::Provider).text().not_null())
                    .col(
                        ColumnDef::new(RotationSchedule::Status)
                            .text()
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(
                        ColumnDef::new(RotationSchedule::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RotationSchedule::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RotationSchedule::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RotationSchedule::NextScheduledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RotationSchedule::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RotationSchedule::IntervalSeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rotation_schedule_user_provider")
                    .table(RotationSchedule::Table)
                    .col(RotationSchedule::UserId)
                    .col(RotationSchedule::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rotation_schedule_next")
                    .table(RotationSchedule::Table)
                    .col(RotationSchedule::NextScheduledAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_rotation_schedule_next").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_rotation_schedule_user_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(RotationSchedule::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RotationSchedule {
    Table,
    Id,
    UserId,
    Provider,
    Status,
    ScheduledAt,
    StartedAt,
    CompletedAt,
    NextScheduledAt,
    AttemptCount,
    IntervalSeconds,
}
