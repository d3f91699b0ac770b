//! System info entity - Durable key-value records that must survive restarts.
//! The update subsystem stores `last_update_at` and `failed_remote_sha` here.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// System info database model - one row per key
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_info")]
pub struct Model {
    /// Record key (e.g., `"last_update_at"`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Value stored as string
    pub value: String,
    /// When this record was last written
    pub updated_at: DateTime,
}

/// `SystemInfo` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
