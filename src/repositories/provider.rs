//! Provider repository
//!
//! Per-user provider rows. The connection layer creates them and the sync queue
//! moves their status as jobs succeed or fail terminally.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::{EngineError, EngineResult};
use crate::models::provider::{self, Column, Entity as Provider, ProviderStatus};

#[derive(Debug, Clone)]
pub struct ProviderRepository {
    db: Arc<DatabaseConnection>,
}

impl ProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, user_id: Uuid, slug: &str) -> EngineResult<Option<provider::Model>> {
        Ok(Provider::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Slug.eq(slug))
            .one(&*self.db)
            .await?)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> EngineResult<Vec<provider::Model>> {
        Ok(Provider::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_asc(Column::Slug)
            .all(&*self.db)
            .await?)
    }

    /// Slugs currently in `error` or `disconnected` status.
    pub async fn unavailable_slugs(&self, user_id: Uuid) -> EngineResult<HashSet<String>> {
        let rows = Provider::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.is_in([
                ProviderStatus::Error.as_str(),
                ProviderStatus::Disconnected.as_str(),
            ]))
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|p| p.slug).collect())
    }

    /// Creates the provider or reactivates an existing row.
    pub async fn upsert_active(
        &self,
        user_id: Uuid,
        slug: &str,
        display_name: &str,
        metadata: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> EngineResult<provider::Model> {
        let ts = to_db_time(now);

        if let Some(existing) = self.find(user_id, slug).await? {
            let mut am: provider::ActiveModel = existing.into();
            am.display_name = Set(display_name.to_string());
            am.status = Set(ProviderStatus::Active.as_str().to_string());
            if metadata.is_some() {
                am.metadata = Set(metadata);
            }
            am.updated_at = Set(ts);
            return Ok(am.update(&*self.db).await?);
        }

        let am = provider::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            slug: Set(slug.to_string()),
            display_name: Set(display_name.to_string()),
            status: Set(ProviderStatus::Active.as_str().to_string()),
            metadata: Set(metadata),
            created_at: Set(ts),
            updated_at: Set(ts),
        };
        Ok(am.insert(&*self.db).await?)
    }

    pub async fn set_status(
        &self,
        user_id: Uuid,
        slug: &str,
        status: ProviderStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<provider::Model> {
        let existing = self
            .find(user_id, slug)
            .await?
            .ok_or_else(|| EngineError::not_found("provider", slug))?;

        let mut am: provider::ActiveModel = existing.into();
        am.status = Set(status.as_str().to_string());
        am.updated_at = Set(to_db_time(now));
        Ok(am.update(&*self.db).await?)
    }

    /// Sets `status` unless the provider was disconnected in the meantime.
    /// Returns the number of rows changed.
    pub async fn set_status_if_connected(
        &self,
        user_id: Uuid,
        slug: &str,
        status: ProviderStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let result = Provider::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Slug.eq(slug))
            .filter(Column::Status.ne(ProviderStatus::Disconnected.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
