//! Analytics cache manager.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{MetricSource, Period, SummaryStats};
use crate::config::AnalyticsConfig;
use crate::db::to_db_time;
use crate::error::{EngineError, EngineResult, is_unique_violation};
use crate::models::analytics_cache::{self, Column, Entity as AnalyticsCache};
use crate::repositories::ProviderRepository;

/// Cached statistics for one provider and period
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AnalyticsSnapshot {
    pub provider: String,
    pub period: Period,
    pub stats: SummaryStats,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// False when this call recomputed the entry
    pub from_cache: bool,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RefreshReport {
    pub refreshed: Vec<AnalyticsSnapshot>,
    /// Providers whose recomputation failed
    pub failed: Vec<String>,
}

pub struct AnalyticsCacheManager {
    db: Arc<DatabaseConnection>,
    source: Arc<dyn MetricSource>,
    providers: ProviderRepository,
    config: AnalyticsConfig,
}

impl AnalyticsCacheManager {
    pub fn new(
        db: Arc<DatabaseConnection>,
        source: Arc<dyn MetricSource>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            providers: ProviderRepository::new(db.clone()),
            db,
            source,
            config,
        }
    }

    /// Returns the cached entry while fresh, recomputing when forced, missing
    /// or older than the period's TTL.
    #[instrument(skip(self), fields(user_id = %user_id, provider = %provider, period = %period))]
    pub async fn get_or_compute(
        &self,
        user_id: Uuid,
        provider: &str,
        period: Period,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<AnalyticsSnapshot> {
        if !force_refresh
            && let Some(entry) = self.find(user_id, provider, period).await?
        {
            let ttl = Duration::seconds(self.ttl_seconds(period));
            let computed_at = entry.computed_at.with_timezone(&Utc);
            if !entry.stale && now - computed_at <= ttl {
                counter!("analytics_cache_hits_total").increment(1);
                return Ok(snapshot_from_model(entry, period, true));
            }
            debug!(stale = entry.stale, "cache entry expired");
        }

        counter!("analytics_cache_misses_total").increment(1);
        self.compute_and_store(user_id, provider, period, now).await
    }

    /// Marks one period, or every period when `period` is `None`, stale.
    /// The entry's generation is bumped so a recompute already in flight
    /// cannot store results read before the invalidation. Returns how many
    /// fresh entries were dropped.
    pub async fn invalidate(
        &self,
        user_id: Uuid,
        provider: &str,
        period: Option<Period>,
    ) -> EngineResult<u64> {
        let periods = match period {
            Some(period) => vec![period],
            None => Period::ALL.to_vec(),
        };

        let mut dropped = 0;
        for period in periods {
            if self.mark_stale(user_id, provider, period).await? {
                dropped += 1;
            }
        }

        debug!(user_id = %user_id, provider = %provider, dropped, "analytics cache invalidated");
        Ok(dropped)
    }

    /// Recomputes (or serves from cache) `period` for every provider the user
    /// has connected. One provider's failure does not stop the others.
    pub async fn refresh_all(
        &self,
        user_id: Uuid,
        period: Period,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<RefreshReport> {
        let mut report = RefreshReport::default();

        for provider in self.providers.list_for_user(user_id).await? {
            match self
                .get_or_compute(user_id, &provider.slug, period, force_refresh, now)
                .await
            {
                Ok(snapshot) => report.refreshed.push(snapshot),
                Err(err) => {
                    warn!(
                        user_id = %user_id,
                        provider = %provider.slug,
                        error = %err,
                        "analytics refresh failed"
                    );
                    report.failed.push(provider.slug);
                }
            }
        }

        Ok(report)
    }

    fn ttl_seconds(&self, period: Period) -> i64 {
        i64::try_from(self.config.ttl_seconds(period))
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000)
    }

    async fn find(
        &self,
        user_id: Uuid,
        provider: &str,
        period: Period,
    ) -> EngineResult<Option<analytics_cache::Model>> {
        Ok(AnalyticsCache::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Period.eq(period.as_str()))
            .one(&*self.db)
            .await?)
    }

    async fn compute_and_store(
        &self,
        user_id: Uuid,
        provider: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> EngineResult<AnalyticsSnapshot> {
        let observed = self
            .find(user_id, provider, period)
            .await?
            .map(|entry| entry.generation);

        let window = period.window();
        let boundary = now - window;
        let samples = self
            .source
            .load_samples(user_id, provider, now - window - window, now)
            .await
            .map_err(|err| EngineError::Source(err.to_string()))?;

        let (current, previous): (Vec<_>, Vec<_>) = samples
            .into_iter()
            .filter(|s| s.recorded_at < now && s.recorded_at >= boundary - window)
            .partition(|s| s.recorded_at >= boundary);

        let stats = SummaryStats::compute(&current, &previous);
        let expires_at = now + Duration::seconds(self.ttl_seconds(period));

        match self
            .store(user_id, provider, period, &stats, now, observed)
            .await?
        {
            Some(stored) => Ok(snapshot_from_model(stored, period, false)),
            None => Ok(AnalyticsSnapshot {
                provider: provider.to_string(),
                period,
                stats,
                computed_at: now,
                expires_at,
                from_cache: false,
            }),
        }
    }

    /// Upserts on (user, provider, period), guarded by the generation seen
    /// before the samples were loaded (`None` when there was no row). Nothing
    /// is written, and `None` returned, if the entry was invalidated since or
    /// already holds a later `computed_at`.
    async fn store(
        &self,
        user_id: Uuid,
        provider: &str,
        period: Period,
        stats: &SummaryStats,
        computed_at: DateTime<Utc>,
        observed: Option<i64>,
    ) -> EngineResult<Option<analytics_cache::Model>> {
        let expires_at = computed_at + Duration::seconds(self.ttl_seconds(period));
        if observed.is_none() {
            let am = analytics_cache::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                provider: Set(provider.to_string()),
                period: Set(period.as_str().to_string()),
                sample_count: Set(stats.count as i64),
                sum: Set(stats.sum),
                avg: Set(stats.avg),
                min: Set(stats.min),
                max: Set(stats.max),
                latest: Set(stats.latest),
                trend: Set(stats.trend),
                computed_at: Set(to_db_time(computed_at)),
                expires_at: Set(to_db_time(expires_at)),
                generation: Set(0),
                stale: Set(false),
            };
            match am.insert(&*self.db).await {
                Ok(model) => return Ok(Some(model)),
                Err(err) if is_unique_violation(&err) => {
                    debug!("concurrent analytics insert, falling back to update");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let result = AnalyticsCache::update_many()
            .col_expr(Column::SampleCount, Expr::value(stats.count as i64))
            .col_expr(Column::Sum, Expr::value(stats.sum))
            .col_expr(Column::Avg, Expr::value(stats.avg))
            .col_expr(Column::Min, Expr::value(stats.min))
            .col_expr(Column::Max, Expr::value(stats.max))
            .col_expr(Column::Latest, Expr::value(stats.latest))
            .col_expr(Column::Trend, Expr::value(stats.trend))
            .col_expr(Column::ComputedAt, Expr::value(to_db_time(computed_at)))
            .col_expr(Column::ExpiresAt, Expr::value(to_db_time(expires_at)))
            .col_expr(Column::Stale, Expr::value(false))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Period.eq(period.as_str()))
            .filter(Column::Generation.eq(observed.unwrap_or(0)))
            .filter(Column::ComputedAt.lte(to_db_time(computed_at)))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            debug!("analytics entry changed during recompute, result not stored");
            return Ok(None);
        }

        self.find(user_id, provider, period).await
    }

    /// Bumps the entry's generation and flags it stale. With no entry yet, a
    /// stale placeholder is inserted so a first computation in flight is
    /// fenced too. Returns true when a fresh entry was dropped.
    async fn mark_stale(
        &self,
        user_id: Uuid,
        provider: &str,
        period: Period,
    ) -> EngineResult<bool> {
        let existing = self.find(user_id, provider, period).await?;

        if existing.is_none() {
            let epoch = to_db_time(DateTime::<Utc>::from(std::time::UNIX_EPOCH));
            let placeholder = analytics_cache::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                provider: Set(provider.to_string()),
                period: Set(period.as_str().to_string()),
                sample_count: Set(0),
                sum: Set(0.0),
                avg: Set(0.0),
                min: Set(None),
                max: Set(None),
                latest: Set(None),
                trend: Set(0.0),
                computed_at: Set(epoch),
                expires_at: Set(epoch),
                generation: Set(1),
                stale: Set(true),
            };
            match placeholder.insert(&*self.db).await {
                Ok(_) => return Ok(false),
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(err.into()),
            }
        }

        AnalyticsCache::update_many()
            .col_expr(Column::Generation, Expr::col(Column::Generation).add(1))
            .col_expr(Column::Stale, Expr::value(true))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Period.eq(period.as_str()))
            .exec(&*self.db)
            .await?;

        Ok(existing.is_some_and(|entry| !entry.stale))
    }
}

fn snapshot_from_model(
    model: analytics_cache::Model,
    period: Period,
    from_cache: bool,
) -> AnalyticsSnapshot {
    AnalyticsSnapshot {
        provider: model.provider,
        period,
        stats: SummaryStats {
            count: u64::try_from(model.sample_count).unwrap_or(0),
            sum: model.sum,
            avg: model.avg,
            min: model.min,
            max: model.max,
            latest: model.latest,
            trend: model.trend,
        },
        computed_at: model.computed_at.with_timezone(&Utc),
        expires_at: model.expires_at.with_timezone(&Utc),
        from_cache,
    }
}
