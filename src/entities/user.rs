//! User entity - Account records owned by the credential store.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Login name, unique across all accounts
    #[sea_orm(unique)]
    pub username: String,
    /// Salted password hash in `salt$digest` form
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Free-form profile text
    pub bio: Option<String>,
    /// Whether the profile is visible to other users
    #[sea_orm(default_value = false)]
    pub is_public: bool,
}

/// `User` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
