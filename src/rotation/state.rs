//! Display rotation state machine.
//!
//! Pure transitions over a user's rotation. Persistence and concurrency live in
//! [`super::RotationScheduler`]; everything here is deterministic given `now`.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Current rotation of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RotationSnapshot {
    pub user_id: Uuid,
    pub order: Vec<String>,
    /// Null exactly when `order` is empty
    pub current_index: Option<usize>,
    pub interval_seconds: u32,
    pub enabled: bool,
    pub total_rotations: u64,
    pub last_rotation_at: Option<DateTime<Utc>>,
    pub next_rotation_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token of the persisted row
    pub version: i64,
    /// Set when this is the last known state served while the store is unreachable
    pub degraded: bool,
}

/// Observable phase of a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    Idle,
    Running,
    Paused,
}

impl RotationSnapshot {
    /// State created on first use: empty, enabled, never rotated.
    pub fn initial(user_id: Uuid, interval_seconds: u32) -> Self {
        Self {
            user_id,
            order: Vec::new(),
            current_index: None,
            interval_seconds,
            enabled: true,
            total_rotations: 0,
            last_rotation_at: None,
            next_rotation_at: None,
            version: 0,
            degraded: false,
        }
    }

    pub fn phase(&self) -> RotationPhase {
        match (self.order.is_empty(), self.enabled) {
            (true, _) => RotationPhase::Idle,
            (false, true) => RotationPhase::Running,
            (false, false) => RotationPhase::Paused,
        }
    }

    /// Provider currently on display.
    pub fn current(&self) -> Option<&str> {
        self.current_index
            .and_then(|idx| self.order.get(idx))
            .map(String::as_str)
    }

    /// True when the automatic timer should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.phase() == RotationPhase::Running
            && self.next_rotation_at.is_none_or(|next| next <= now)
    }

    /// Replaces the order. The index follows the current provider when it is
    /// still present and restarts at 0 otherwise; `total_rotations` is kept.
    pub fn configure(
        &mut self,
        order: Vec<String>,
        interval_seconds: u32,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        validate_interval(interval_seconds)?;

        let mut seen = HashSet::with_capacity(order.len());
        for slug in &order {
            if slug.trim().is_empty() {
                return Err(EngineError::validation("provider ids must not be empty"));
            }
            if !seen.insert(slug.as_str()) {
                return Err(EngineError::validation(format!(
                    "duplicate provider in rotation order: {slug}"
                )));
            }
        }

        let current = self.current().map(str::to_owned);
        self.current_index = if order.is_empty() {
            None
        } else {
            Some(
                current
                    .and_then(|slug| order.iter().position(|s| *s == slug))
                    .unwrap_or(0),
            )
        };
        self.order = order;
        self.interval_seconds = interval_seconds;
        self.enabled = enabled;

        if self.order.is_empty() {
            self.next_rotation_at = None;
        } else if enabled {
            self.rebase(now);
        }
        Ok(())
    }

    /// Timer-driven advance. Providers in `unavailable` are passed over unless
    /// every provider is unavailable. Returns false when nothing changed.
    pub fn tick(&mut self, now: DateTime<Utc>, unavailable: &HashSet<String>) -> bool {
        if self.phase() != RotationPhase::Running {
            return false;
        }

        let len = self.order.len();
        let start = self.current_index.unwrap_or(0);
        let next = (1..=len)
            .map(|step| (start + step) % len)
            .find(|idx| !unavailable.contains(&self.order[*idx]))
            .unwrap_or((start + 1) % len);

        self.current_index = Some(next);
        self.total_rotations = self.total_rotations.saturating_add(1);
        self.last_rotation_at = Some(now);
        self.rebase(now);
        true
    }

    /// Manual move by one position, forward or backward, with wraparound.
    /// Allowed while paused; restarts the automatic timer.
    pub fn step(&mut self, forward: bool, now: DateTime<Utc>) -> bool {
        let len = self.order.len();
        if len == 0 {
            return false;
        }

        let idx = self.current_index.unwrap_or(0);
        self.current_index = Some(if forward {
            (idx + 1) % len
        } else {
            (idx + len - 1) % len
        });
        self.rebase(now);
        true
    }

    /// Pauses or resumes. Resuming restarts the timer from `now`.
    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        if enabled && !self.enabled && !self.order.is_empty() {
            self.rebase(now);
        }
        self.enabled = enabled;
    }

    pub fn set_interval(&mut self, interval_seconds: u32, now: DateTime<Utc>) -> EngineResult<()> {
        validate_interval(interval_seconds)?;
        self.interval_seconds = interval_seconds;
        if !self.order.is_empty() {
            self.rebase(now);
        }
        Ok(())
    }

    fn rebase(&mut self, now: DateTime<Utc>) {
        self.next_rotation_at = Some(now + Duration::seconds(i64::from(self.interval_seconds)));
    }
}

/// Largest interval the `rotation_state.interval_seconds` column can hold.
pub const MAX_INTERVAL_SECONDS: u32 = i32::MAX as u32;

fn validate_interval(interval_seconds: u32) -> EngineResult<()> {
    if interval_seconds == 0 {
        return Err(EngineError::validation("interval_seconds must be > 0"));
    }
    if interval_seconds > MAX_INTERVAL_SECONDS {
        return Err(EngineError::validation(format!(
            "interval_seconds must be at most {MAX_INTERVAL_SECONDS}"
        )));
    }
    Ok(())
}
