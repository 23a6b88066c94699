//! SyncAlert entity model
//!
//! Active notifications for terminal sync failures and expired authorization.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

pub const KIND_SYNC_FAILED: &str = "sync_failed";
pub const KIND_AUTH_EXPIRED: &str = "auth_expired";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub provider: String,

    /// `sync_failed` or `auth_expired`
    pub kind: String,

    pub message: String,

    /// Job whose failure raised the alert, if any
    pub job_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,

    /// Set once the user dismisses the alert
    pub acknowledged_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
