//! Migration to create the analytics_cache table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AnalyticsCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AnalyticsCache::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AnalyticsCache::UserId).uuid().not_null())
                    .col(ColumnDef::new(AnalyticsCache::Provider).text().not_null())
                    .col(ColumnDef::new(AnalyticsCache::Period).text().not_null())
                    .col(
                        ColumnDef::new(AnalyticsCache::SampleCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(AnalyticsCache::Sum).double().not_null())
                    .col(ColumnDef::new(AnalyticsCache::Avg).double().not_null())
                    .col(ColumnDef::new(AnalyticsCache::Min).double().null())
                    .col(ColumnDef::new(AnalyticsCache::Max).double().null())
                    .col(ColumnDef::new(AnalyticsCache::Latest).double().null())
                    .col(ColumnDef::new(AnalyticsCache::Trend).double().not_null())
                    .col(
                        ColumnDef::new(AnalyticsCache::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AnalyticsCache::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AnalyticsCache::Generation)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AnalyticsCache::Stale)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_analytics_cache_user_provider_period")
                    .table(AnalyticsCache::Table)
                    .col(AnalyticsCache::UserId)
                    .col(AnalyticsCache::Provider)
                    .col(AnalyticsCache::Period)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_analytics_cache_user_provider_period")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(AnalyticsCache::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AnalyticsCache {
    Table,
    Id,
    UserId,
    Provider,
    Period,
    SampleCount,
    Sum,
    Avg,
    Min,
    Max,
    Latest,
    Trend,
    ComputedAt,
    ExpiresAt,
    Generation,
    Stale,
}
