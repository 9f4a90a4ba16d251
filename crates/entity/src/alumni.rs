use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Linkage state of a directory profile with respect to user accounts.
///
/// Profiles start `Unlinked`. An invitation moves them to `Invited`, the first
/// authenticated session of the linked account moves them to `Registered`,
/// and removing that account brings them back to `Unlinked`.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum AlumniStatus {
    #[default]
    #[sea_orm(string_value = "unlinked")]
    Unlinked,
    #[sea_orm(string_value = "invited")]
    Invited,
    #[sea_orm(string_value = "registered")]
    Registered,
}

impl AlumniStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlinked => "unlinked",
            Self::Invited => "invited",
            Self::Registered => "registered",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "unlinked" => Some(Self::Unlinked),
            "invited" => Some(Self::Invited),
            "registered" => Some(Self::Registered),
            _ => None,
        }
    }

    /// Transitions driven by the account lifecycle. Administrative edits bypass this.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unlinked, Self::Invited)
                | (Self::Unlinked, Self::Registered)
                | (Self::Invited, Self::Registered)
                | (Self::Invited, Self::Unlinked)
                | (Self::Registered, Self::Unlinked)
        )
    }
}

/// Alumni directory profile.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alumni")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub first_name: String,
    pub last_name: String,

    /// Lower-cased. Immutable once the profile exists.
    #[sea_orm(unique)]
    pub email: String,

    pub graduation_year: Option<i32>,
    pub diploma: Option<String>,
    pub city: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub avatar_url: Option<String>,

    /// Soft-delete flag.
    pub is_active: bool,

    pub status: AlumniStatus,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
