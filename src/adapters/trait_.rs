//! Provider adapter trait definition
//!
//! The engine never talks to a health-data provider directly. Each provider is
//! reached through a [`ProviderAdapter`] supplied by the embedding application.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::provider::ProviderStatus;

/// Structured failure reported by an adapter or synthesised by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    #[serde(flatten)]
    pub kind: SyncErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Network blips, 5xx responses and similar
    Transient,
    /// Upstream throttling with an optional retry hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Provider authorization has expired or was revoked
    AuthExpired,
    /// Request can never succeed as issued
    Permanent,
    /// Attempt exceeded the job timeout
    Timeout,
    /// Job was abandoned because the provider was disconnected
    Cancelled,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::Transient => "transient",
            SyncErrorKind::RateLimited { .. } => "rate_limited",
            SyncErrorKind::AuthExpired => "auth_expired",
            SyncErrorKind::Permanent => "permanent",
            SyncErrorKind::Timeout => "timeout",
            SyncErrorKind::Cancelled => "cancelled",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncErrorKind::Transient | SyncErrorKind::RateLimited { .. } | SyncErrorKind::Timeout
        )
    }

    /// Kinds that put the provider into `error` status when they end a job.
    pub fn marks_provider_error(&self) -> bool {
        matches!(self, SyncErrorKind::AuthExpired | SyncErrorKind::Permanent)
    }

    /// Whether a terminal failure of this kind raises a user alert.
    pub fn raises_alert(&self) -> bool {
        !matches!(self, SyncErrorKind::Cancelled)
    }
}

impl SyncError {
    fn with_kind(kind: SyncErrorKind, message: Option<String>) -> Self {
        Self {
            kind,
            message,
            details: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::with_kind(SyncErrorKind::Transient, Some(message.into()))
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::with_kind(SyncErrorKind::RateLimited { retry_after_secs }, None)
    }

    pub fn auth_expired<S: Into<String>>(message: S) -> Self {
        Self::with_kind(SyncErrorKind::AuthExpired, Some(message.into()))
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self::with_kind(SyncErrorKind::Permanent, Some(message.into()))
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::with_kind(SyncErrorKind::Timeout, Some(message.into()))
    }

    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::with_kind(SyncErrorKind::Cancelled, Some(message.into()))
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self.kind {
            SyncErrorKind::RateLimited { retry_after_secs } => retry_after_secs,
            _ => None,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SyncErrorKind::RateLimited {
                retry_after_secs: Some(after),
            } => write!(f, "rate_limited (retry after: {}s)", after)?,
            kind => f.write_str(kind.as_str())?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

/// Everything an adapter needs to know about the attempt it is running
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub sync_type: String,
    /// 1-based attempt number
    pub attempt: u32,
}

/// Result of a successful sync attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub records_synced: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl SyncOutcome {
    pub fn with_records(records_synced: u64) -> Self {
        Self {
            records_synced,
            details: None,
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Pull the provider's latest data for `ctx.user_id`.
    async fn sync(&self, ctx: &SyncContext) -> Result<SyncOutcome, SyncError>;

    /// Cheap reachability/authorization check.
    async fn test_connection(&self, user_id: Uuid, provider: &str) -> Result<(), SyncError>;

    /// Provider-reported device/connection status.
    async fn get_status(&self, user_id: Uuid, provider: &str) -> Result<ProviderStatus, SyncError>;
}
