//! Rotation schedule repository
//!
//! Bookkeeping for periodic background refreshes. Claims use the stored
//! `next_scheduled_at` as the compare-and-swap predicate so concurrent
//! refresh loops cannot both fire for the same row.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::EngineResult;
use crate::models::rotation_schedule::{
    self, Column, Entity as RotationSchedule, STATUS_COMPLETED, STATUS_FAILED, STATUS_PAUSED,
    STATUS_RUNNING, STATUS_SCHEDULED,
};

#[derive(Debug, Clone)]
pub struct ScheduleRepository {
    db: Arc<DatabaseConnection>,
}

impl ScheduleRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> EngineResult<Option<rotation_schedule::Model>> {
        Ok(RotationSchedule::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .one(&*self.db)
            .await?)
    }

    /// Creates or resumes the refresh schedule for a provider, first due one
    /// interval from `now`.
    pub async fn ensure(
        &self,
        user_id: Uuid,
        provider: &str,
        interval_seconds: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<rotation_schedule::Model> {
        let next = to_db_time(now + Duration::seconds(interval_seconds));

        if let Some(existing) = self.find(user_id, provider).await? {
            let mut am: rotation_schedule::ActiveModel = existing.into();
            am.status = Set(STATUS_SCHEDULED.to_string());
            am.scheduled_at = Set(to_db_time(now));
            am.next_scheduled_at = Set(Some(next));
            am.attempt_count = Set(0);
            am.interval_seconds = Set(interval_seconds);
            return Ok(am.update(&*self.db).await?);
        }

        let am = rotation_schedule::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider: Set(provider.to_string()),
            status: Set(STATUS_SCHEDULED.to_string()),
            scheduled_at: Set(to_db_time(now)),
            started_at: Set(None),
            completed_at: Set(None),
            next_scheduled_at: Set(Some(next)),
            attempt_count: Set(0),
            interval_seconds: Set(interval_seconds),
        };
        Ok(am.insert(&*self.db).await?)
    }

    /// Stops refreshing the provider until `ensure` is called again.
    pub async fn pause(&self, user_id: Uuid, provider: &str) -> EngineResult<u64> {
        let result = RotationSchedule::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PAUSED))
            .col_expr(
                Column::NextScheduledAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Rows whose next refresh is due, earliest first.
    pub async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> EngineResult<Vec<rotation_schedule::Model>> {
        Ok(RotationSchedule::find()
            .filter(Column::Status.ne(STATUS_PAUSED))
            .filter(Column::NextScheduledAt.is_not_null())
            .filter(Column::NextScheduledAt.lte(to_db_time(now)))
            .order_by_asc(Column::NextScheduledAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Claims a due row and pushes its next refresh to `next_at`.
    /// Returns false when another process claimed it first.
    pub async fn claim(
        &self,
        row: &rotation_schedule::Model,
        now: DateTime<Utc>,
        next_at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let Some(expected_next) = row.next_scheduled_at else {
            return Ok(false);
        };

        let result = RotationSchedule::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_RUNNING))
            .col_expr(Column::ScheduledAt, Expr::value(expected_next))
            .col_expr(Column::StartedAt, Expr::value(Some(to_db_time(now))))
            .col_expr(Column::NextScheduledAt, Expr::value(Some(to_db_time(next_at))))
            .filter(Column::Id.eq(row.id))
            .filter(Column::Status.ne(STATUS_PAUSED))
            .filter(Column::NextScheduledAt.eq(expected_next))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Records how the refresh started by the last claim ended.
    pub async fn record_outcome(
        &self,
        user_id: Uuid,
        provider: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let mut update = RotationSchedule::update_many()
            .col_expr(Column::CompletedAt, Expr::value(Some(to_db_time(now))))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Status.eq(STATUS_RUNNING));

        update = if success {
            update
                .col_expr(Column::Status, Expr::value(STATUS_COMPLETED))
                .col_expr(Column::AttemptCount, Expr::value(0))
        } else {
            update
                .col_expr(Column::Status, Expr::value(STATUS_FAILED))
                .col_expr(
                    Column::AttemptCount,
                    Expr::col(Column::AttemptCount).add(1),
                )
        };

        Ok(update.exec(&*self.db).await?.rows_affected)
    }
}
