//! Alert repository
//!
//! Alerts are raised by the sync queue for terminal failures and dismissed by
//! the user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::{EngineError, EngineResult};
use crate::models::sync_alert::{self, Column, Entity as SyncAlert};

#[derive(Debug, Clone)]
pub struct AlertRepository {
    db: Arc<DatabaseConnection>,
}

impl AlertRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn raise(
        &self,
        user_id: Uuid,
        provider: &str,
        kind: &str,
        message: &str,
        job_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> EngineResult<sync_alert::Model> {
        let am = sync_alert::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider: Set(provider.to_string()),
            kind: Set(kind.to_string()),
            message: Set(message.to_string()),
            job_id: Set(job_id),
            created_at: Set(to_db_time(now)),
            acknowledged_at: Set(None),
        };
        let alert = am.insert(&*self.db).await?;

        tracing::warn!(
            user_id = %user_id,
            provider = %provider,
            alert_id = %alert.id,
            kind = %kind,
            "sync alert raised"
        );
        Ok(alert)
    }

    /// Unacknowledged alerts, newest first.
    pub async fn active(&self, user_id: Uuid) -> EngineResult<Vec<sync_alert::Model>> {
        Ok(SyncAlert::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::AcknowledgedAt.is_null())
            .order_by_desc(Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Marks the alert acknowledged. Acknowledging twice keeps the first timestamp.
    pub async fn acknowledge(
        &self,
        user_id: Uuid,
        alert_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<sync_alert::Model> {
        let alert = SyncAlert::find_by_id(alert_id)
            .filter(Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("alert", alert_id))?;

        if alert.acknowledged_at.is_some() {
            return Ok(alert);
        }

        let mut am: sync_alert::ActiveModel = alert.into();
        am.acknowledged_at = Set(Some(to_db_time(now)));
        Ok(am.update(&*self.db).await?)
    }
}
