//! AnalyticsCache entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Memoized summary statistics for one (user, provider, period)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "analytics_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub provider: String,

    /// `today`, `week`, `month`, `quarter` or `year`
    pub period: String,

    pub sample_count: i64,

    pub sum: f64,

    pub avg: f64,

    pub min: Option<f64>,

    pub max: Option<f64>,

    /// Most recent sample value in the current window
    pub latest: Option<f64>,

    /// Percent change of the window average against the previous window
    pub trend: f64,

    pub computed_at: DateTimeWithTimeZone,

    pub expires_at: DateTimeWithTimeZone,

    /// Bumped by every invalidation; a recompute only stores if it is unchanged
    pub generation: i64,

    /// Invalidated and not recomputed since
    pub stale: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
