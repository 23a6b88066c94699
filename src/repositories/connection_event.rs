//! EventLog
//!
//! Append-only record of provider state transitions. Nothing here drives
//! behavior; the log exists for the UI and for auditing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::{EngineError, EngineResult};
use crate::models::connection_event::{self, Column, Entity as ConnectionEvent, EventType};

/// Upper bound on `recent` page size.
pub const MAX_RECENT: u64 = 500;

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: Uuid,
    pub provider: String,
    pub event_type: EventType,
    pub event_data: JsonValue,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    db: Arc<DatabaseConnection>,
}

impl EventLog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts an immutable event row.
    ///
    /// The timestamp is clamped so it never precedes the provider's latest
    /// event, keeping per-provider order stable when writer clocks disagree.
    pub async fn append(
        &self,
        event: NewEvent,
        now: DateTime<Utc>,
    ) -> EngineResult<connection_event::Model> {
        let mut created_at = to_db_time(now);
        if let Some(last) = ConnectionEvent::find()
            .filter(Column::UserId.eq(event.user_id))
            .filter(Column::Provider.eq(event.provider.as_str()))
            .order_by_desc(Column::CreatedAt)
            .one(&*self.db)
            .await?
            && last.created_at > created_at
        {
            created_at = last.created_at;
        }

        let am = connection_event::ActiveModel {
            id: NotSet,
            user_id: Set(event.user_id),
            provider: Set(event.provider),
            event_type: Set(event.event_type.as_str().to_string()),
            event_data: Set(event.event_data),
            created_at: Set(created_at),
        };
        let model = am.insert(&*self.db).await?;

        tracing::debug!(
            user_id = %model.user_id,
            provider = %model.provider,
            event_type = %model.event_type,
            event_id = model.id,
            "connection event recorded"
        );
        Ok(model)
    }

    /// Latest `limit` events for the user, newest first, optionally for one provider.
    pub async fn recent(
        &self,
        user_id: Uuid,
        limit: u64,
        provider: Option<&str>,
    ) -> EngineResult<Vec<connection_event::Model>> {
        if limit == 0 || limit > MAX_RECENT {
            return Err(EngineError::validation(format!(
                "limit must be between 1 and {MAX_RECENT}"
            )));
        }

        let mut query = ConnectionEvent::find().filter(Column::UserId.eq(user_id));
        if let Some(provider) = provider {
            query = query.filter(Column::Provider.eq(provider));
        }

        Ok(query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
