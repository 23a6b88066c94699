//! Provider entity model
//!
//! One row per user and external health-data source. Rows are never deleted
//! while referenced; disconnecting only flips `status`.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Stable provider identifier, unique per user (e.g. `fitbit`, `oura`)
    pub slug: String,

    pub display_name: String,

    /// One of [`ProviderStatus`]
    pub status: String,

    /// Free-form display metadata supplied by the connection layer
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn provider_status(&self) -> Option<ProviderStatus> {
        self.status.parse().ok()
    }
}

/// Connection status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Pending,
    Active,
    Error,
    Disconnected,
    LowBattery,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Pending => "pending",
            ProviderStatus::Active => "active",
            ProviderStatus::Error => "error",
            ProviderStatus::Disconnected => "disconnected",
            ProviderStatus::LowBattery => "low_battery",
        }
    }

    /// Providers the rotation may skip when configured to.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderStatus::Error | ProviderStatus::Disconnected)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProviderStatus::Pending),
            "active" => Ok(ProviderStatus::Active),
            "error" => Ok(ProviderStatus::Error),
            "disconnected" => Ok(ProviderStatus::Disconnected),
            "low_battery" => Ok(ProviderStatus::LowBattery),
            other => Err(format!("unknown provider status: {other}")),
        }
    }
}
