use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Browser session issued on sign-in.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// 256-bit random token, hex-encoded. Sent back as the session cookie.
    #[sea_orm(unique)]
    pub token: String,

    pub user_id: String,

    /// Unix timestamp (seconds).
    pub expires_at: i64,

    /// Unix timestamp (seconds).
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
