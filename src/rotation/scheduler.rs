//! # Rotation Scheduler
//!
//! Loads a user's rotation, applies one transition from [`RotationSnapshot`]
//! and writes it back guarded by the row's `version`. Concurrent sessions for
//! the same user race on that predicate; the loser reloads and reapplies its
//! transition, up to `cas_max_retries` times.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::state::RotationSnapshot;
use crate::config::RotationConfig;
use crate::db::to_db_time;
use crate::error::{EngineError, EngineResult, is_unique_violation};
use crate::models::rotation_state::{self, Column, Entity as RotationState};
use crate::repositories::ProviderRepository;

pub struct RotationScheduler {
    db: Arc<DatabaseConnection>,
    providers: ProviderRepository,
    config: RotationConfig,
    last_known: Mutex<HashMap<Uuid, RotationSnapshot>>,
}

impl RotationScheduler {
    pub fn new(db: Arc<DatabaseConnection>, config: RotationConfig) -> Self {
        Self {
            providers: ProviderRepository::new(db.clone()),
            db,
            config,
            last_known: Mutex::new(HashMap::new()),
        }
    }

    /// Persisted rotation for the user, created empty on first use.
    ///
    /// When the store cannot be read the last state this process saw is
    /// returned with `degraded` set instead of an error.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn snapshot(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        match self.load_or_create(user_id, now).await {
            Ok(state) => {
                self.remember(&state);
                Ok(state)
            }
            Err(EngineError::Persistence(err)) => match self.last_known(user_id) {
                Some(mut cached) => {
                    warn!(error = %err, "store unavailable, serving last known rotation");
                    cached.degraded = true;
                    Ok(cached)
                }
                None => Err(EngineError::Persistence(err)),
            },
            Err(err) => Err(err),
        }
    }

    pub async fn current(&self, user_id: Uuid, now: DateTime<Utc>) -> EngineResult<Option<String>> {
        Ok(self
            .snapshot(user_id, now)
            .await?
            .current()
            .map(str::to_owned))
    }

    #[instrument(skip(self, order), fields(user_id = %user_id, len = order.len()))]
    pub async fn configure(
        &self,
        user_id: Uuid,
        order: Vec<String>,
        interval_seconds: u32,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        self.mutate(user_id, now, |state| {
            state.configure(order.clone(), interval_seconds, enabled, now)?;
            Ok(true)
        })
        .await
    }

    /// Advances unconditionally (unless paused or idle).
    pub async fn tick(&self, user_id: Uuid, now: DateTime<Utc>) -> EngineResult<RotationSnapshot> {
        self.tick_inner(user_id, now, false).await
    }

    /// Advances only when the timer has expired.
    pub async fn tick_if_due(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        self.tick_inner(user_id, now, true).await
    }

    pub async fn next(&self, user_id: Uuid, now: DateTime<Utc>) -> EngineResult<RotationSnapshot> {
        self.mutate(user_id, now, |state| Ok(state.step(true, now)))
            .await
    }

    pub async fn previous(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        self.mutate(user_id, now, |state| Ok(state.step(false, now)))
            .await
    }

    pub async fn pause(&self, user_id: Uuid, now: DateTime<Utc>) -> EngineResult<RotationSnapshot> {
        self.set_enabled(user_id, now, |_| false).await
    }

    pub async fn resume(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        self.set_enabled(user_id, now, |_| true).await
    }

    pub async fn toggle(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        self.set_enabled(user_id, now, |enabled| !enabled).await
    }

    pub async fn set_interval(
        &self,
        user_id: Uuid,
        interval_seconds: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        self.mutate(user_id, now, |state| {
            state.set_interval(interval_seconds, now)?;
            Ok(true)
        })
        .await
    }

    /// Ticks every running rotation whose timer expired at or before `now`.
    /// Returns how many advanced. Per-user failures are logged and skipped.
    pub async fn poll_due(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let due = RotationState::find()
            .filter(Column::Enabled.eq(true))
            .filter(Column::NextRotationAt.is_not_null())
            .filter(Column::NextRotationAt.lte(to_db_time(now)))
            .order_by_asc(Column::NextRotationAt)
            .limit(self.config.driver_batch)
            .all(&*self.db)
            .await?;

        let mut advanced = 0;
        for row in due {
            let before = row.total_rotations;
            match self.tick_if_due(row.user_id, now).await {
                Ok(state) if state.total_rotations as i64 > before => advanced += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(user_id = %row.user_id, error = %err, "rotation tick failed");
                }
            }
        }
        Ok(advanced)
    }

    async fn tick_inner(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        only_when_due: bool,
    ) -> EngineResult<RotationSnapshot> {
        let unavailable = if self.config.skip_unavailable {
            self.providers.unavailable_slugs(user_id).await?
        } else {
            HashSet::new()
        };

        let mut advanced = false;
        let state = self
            .mutate(user_id, now, |state| {
                advanced = (!only_when_due || state.is_due(now)) && state.tick(now, &unavailable);
                Ok(advanced)
            })
            .await?;

        if advanced {
            counter!("rotation_ticks_total").increment(1);
            debug!(
                user_id = %user_id,
                current = ?state.current(),
                total = state.total_rotations,
                "rotation advanced"
            );
        }
        Ok(state)
    }

    async fn set_enabled(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        flag: impl Fn(bool) -> bool,
    ) -> EngineResult<RotationSnapshot> {
        let state = self
            .mutate(user_id, now, |state| {
                let enabled = flag(state.enabled);
                if enabled == state.enabled {
                    return Ok(false);
                }
                state.set_enabled(enabled, now);
                Ok(true)
            })
            .await?;
        info!(user_id = %user_id, enabled = state.enabled, "rotation toggled");
        Ok(state)
    }

    /// Load, apply `transition`, compare-and-swap. `transition` returns
    /// whether it changed anything; unchanged states are not written.
    async fn mutate<F>(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        mut transition: F,
    ) -> EngineResult<RotationSnapshot>
    where
        F: FnMut(&mut RotationSnapshot) -> EngineResult<bool>,
    {
        for attempt in 0..=self.config.cas_max_retries {
            let mut state = self.load_or_create(user_id, now).await?;
            if !transition(&mut state)? {
                self.remember(&state);
                return Ok(state);
            }

            if self.compare_and_swap(&state, now).await? {
                state.version += 1;
                self.remember(&state);
                return Ok(state);
            }
            debug!(user_id = %user_id, attempt, "rotation version conflict, retrying");
        }

        warn!(user_id = %user_id, "rotation update gave up after repeated conflicts");
        Err(EngineError::Conflict {
            entity: "rotation_state",
            user_id,
        })
    }

    async fn load_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationSnapshot> {
        if let Some(row) = RotationState::find_by_id(user_id).one(&*self.db).await? {
            return from_model(row, self.config.default_interval_seconds);
        }

        let initial = RotationSnapshot::initial(user_id, self.config.default_interval_seconds);
        let am = rotation_state::ActiveModel {
            user_id: Set(user_id),
            rotation_order: Set(serde_json::json!([])),
            current_source_index: Set(None),
            interval_seconds: Set(interval_column(initial.interval_seconds)),
            enabled: Set(initial.enabled),
            total_rotations: Set(0),
            last_rotation_at: Set(None),
            next_rotation_at: Set(None),
            version: Set(initial.version),
            updated_at: Set(to_db_time(now)),
        };

        match am.insert(&*self.db).await {
            Ok(row) => {
                info!(user_id = %user_id, "rotation state created");
                from_model(row, self.config.default_interval_seconds)
            }
            Err(err) if is_unique_violation(&err) => {
                let row = RotationState::find_by_id(user_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| EngineError::not_found("rotation_state", user_id))?;
                from_model(row, self.config.default_interval_seconds)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn compare_and_swap(
        &self,
        state: &RotationSnapshot,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let order = serde_json::to_value(&state.order)
            .map_err(|err| DbErr::Custom(format!("rotation order encoding: {err}")))?;

        let result = RotationState::update_many()
            .col_expr(Column::RotationOrder, Expr::value(order))
            .col_expr(
                Column::CurrentSourceIndex,
                Expr::value(state.current_index.map(|idx| idx as i32)),
            )
            .col_expr(
                Column::IntervalSeconds,
                Expr::value(interval_column(state.interval_seconds)),
            )
            .col_expr(Column::Enabled, Expr::value(state.enabled))
            .col_expr(
                Column::TotalRotations,
                Expr::value(i64::try_from(state.total_rotations).unwrap_or(i64::MAX)),
            )
            .col_expr(
                Column::LastRotationAt,
                Expr::value(state.last_rotation_at.map(to_db_time)),
            )
            .col_expr(
                Column::NextRotationAt,
                Expr::value(state.next_rotation_at.map(to_db_time)),
            )
            .col_expr(Column::Version, Expr::value(state.version + 1))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::UserId.eq(state.user_id))
            .filter(Column::Version.eq(state.version))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    fn remember(&self, state: &RotationSnapshot) {
        let mut cache = self.last_known.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(state.user_id, state.clone());
    }

    fn last_known(&self, user_id: Uuid) -> Option<RotationSnapshot> {
        let cache = self.last_known.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(&user_id).cloned()
    }
}

fn interval_column(seconds: u32) -> i32 {
    i32::try_from(seconds).unwrap_or(i32::MAX)
}

fn from_model(row: rotation_state::Model, default_interval: u32) -> EngineResult<RotationSnapshot> {
    let order: Vec<String> = serde_json::from_value(row.rotation_order)
        .map_err(|err| DbErr::Custom(format!("rotation order decoding: {err}")))?;

    let current_index = match row.current_source_index {
        _ if order.is_empty() => None,
        Some(idx) if idx >= 0 && (idx as usize) < order.len() => Some(idx as usize),
        _ => Some(0),
    };

    Ok(RotationSnapshot {
        user_id: row.user_id,
        order,
        current_index,
        interval_seconds: u32::try_from(row.interval_seconds)
            .ok()
            .filter(|s| *s > 0)
            .unwrap_or(default_interval),
        enabled: row.enabled,
        total_rotations: u64::try_from(row.total_rotations).unwrap_or(0),
        last_rotation_at: row.last_rotation_at.map(|dt| dt.with_timezone(&Utc)),
        next_rotation_at: row.next_rotation_at.map(|dt| dt.with_timezone(&Utc)),
        version: row.version,
        degraded: false,
    })
}
