//! RotationState entity model
//!
//! Persisted form of a user's display rotation. `version` is bumped on every
//! write and used as the compare-and-swap predicate.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rotation_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,

    /// JSON array of provider slugs, no duplicates
    #[sea_orm(column_type = "JsonBinary")]
    pub rotation_order: JsonValue,

    /// Index into `rotation_order`, null when the order is empty
    pub current_source_index: Option<i32>,

    pub interval_seconds: i32,

    pub enabled: bool,

    pub total_rotations: i64,

    pub last_rotation_at: Option<DateTimeWithTimeZone>,

    pub next_rotation_at: Option<DateTimeWithTimeZone>,

    pub version: i64,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
