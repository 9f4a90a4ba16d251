use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Credential record attached to a user.
///
/// Only the `credential` provider (email + password) exists today.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,

    pub provider_id: String,

    /// PBKDF2-HMAC-SHA256 output.
    #[serde(skip_serializing)]
    pub password_hash: Vec<u8>,

    #[serde(skip_serializing)]
    pub salt: Vec<u8>,

    pub iterations: i32,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
