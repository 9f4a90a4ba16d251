//! Keeps profile status and account linkage consistent.
//!
//! Every cascade between the profile, account and update-request stores goes
//! through [`Lifecycle`]. Bulk operations are not transactional: a failure
//! midway leaves the earlier writes in place.

use std::collections::HashSet;

use entity::alumni::{self, AlumniStatus};
use entity::profile_update_request::{self, RequestStatus};
use entity::{account, session, user};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};

use crate::error::{Error, Result};
use crate::util::now_ts;
use crate::validation::{parse_alumni_changes, FieldScope};

pub const PROFILE_NOT_FOUND: &str = "Profil introuvable";
pub const USER_NOT_FOUND: &str = "Utilisateur introuvable";
pub const REQUEST_NOT_FOUND: &str = "Demande introuvable";
pub const REQUEST_PROFILE_NOT_FOUND: &str = "Profil alumni introuvable";

/// What [`Lifecycle::on_first_authentication`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirstLogin {
    /// Set when this call recorded the account's `last_login`.
    pub recorded_at: Option<i64>,
    /// The linked profile moved to `registered`.
    pub registered: bool,
}

pub struct Lifecycle<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> Lifecycle<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record the first authenticated session of a linked account and mark
    /// its profile registered.
    ///
    /// The `last_login IS NULL` guard makes this fire once even when several
    /// session lookups race.
    pub async fn on_first_authentication(&self, account: &user::Model) -> Result<FirstLogin> {
        let Some(alumni_id) = account.alumni_id.as_deref() else {
            return Ok(FirstLogin::default());
        };
        if account.last_login.is_some() {
            return Ok(FirstLogin::default());
        }

        let now = now_ts();
        let claimed = user::Entity::update_many()
            .col_expr(user::Column::LastLogin, Expr::value(now))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(account.id.as_str()))
            .filter(user::Column::LastLogin.is_null())
            .exec(self.db)
            .await?;
        if claimed.rows_affected != 1 {
            return Ok(FirstLogin::default());
        }

        let res = alumni::Entity::update_many()
            .col_expr(alumni::Column::Status, Expr::value(AlumniStatus::Registered))
            .col_expr(alumni::Column::UpdatedAt, Expr::value(now))
            .filter(alumni::Column::Id.eq(alumni_id))
            .filter(alumni::Column::Status.is_in([AlumniStatus::Unlinked, AlumniStatus::Invited]))
            .exec(self.db)
            .await?;

        let registered = res.rows_affected > 0;
        if registered {
            tracing::info!(user_id = %account.id, alumni_id, "profile registered on first login");
        }
        Ok(FirstLogin {
            recorded_at: Some(now),
            registered,
        })
    }

    async fn find_user(&self, user_id: &str) -> Result<user::Model> {
        user::Entity::find_by_id(user_id.to_string())
            .one(self.db)
            .await?
            .ok_or_else(|| Error::NotFound(USER_NOT_FOUND.to_string()))
    }

    async fn find_profile(&self, alumni_id: &str) -> Result<alumni::Model> {
        alumni::Entity::find_by_id(alumni_id.to_string())
            .one(self.db)
            .await?
            .ok_or_else(|| Error::NotFound(PROFILE_NOT_FOUND.to_string()))
    }

    async fn linked_account(&self, alumni_id: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::AlumniId.eq(alumni_id))
            .one(self.db)
            .await?)
    }

    async fn revoke_sessions(&self, user_ids: &[String]) -> Result<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }
        let res = session::Entity::delete_many()
            .filter(session::Column::UserId.is_in(user_ids.iter().cloned()))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected)
    }

    async fn set_banned(&self, user_id: &str, banned: bool) -> Result<()> {
        user::Entity::update_many()
            .col_expr(user::Column::Banned, Expr::value(banned))
            .col_expr(user::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(user::Column::Id.eq(user_id))
            .exec(self.db)
            .await?;
        if banned {
            self.revoke_sessions(&[user_id.to_string()]).await?;
        }
        Ok(())
    }

    async fn reset_profiles(&self, alumni_ids: Vec<String>) -> Result<u64> {
        if alumni_ids.is_empty() {
            return Ok(0);
        }
        let res = alumni::Entity::update_many()
            .col_expr(alumni::Column::Status, Expr::value(AlumniStatus::Unlinked))
            .col_expr(alumni::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(alumni::Column::Id.is_in(alumni_ids))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Hard-delete a profile. A linked account is banned first; the ban stands
    /// even if the profile turns out to be missing.
    ///
    /// Returns the id of the banned account, if any.
    pub async fn delete_profile(&self, alumni_id: &str) -> Result<Option<String>> {
        let banned = match self.linked_account(alumni_id).await? {
            Some(account) => {
                self.set_banned(&account.id, true).await?;
                tracing::info!(
                    user_id = %account.id,
                    alumni_id,
                    "account banned due to profile deletion"
                );
                Some(account.id)
            }
            None => None,
        };

        let res = alumni::Entity::delete_by_id(alumni_id.to_string())
            .exec(self.db)
            .await?;
        if res.rows_affected == 0 {
            return Err(Error::NotFound(PROFILE_NOT_FOUND.to_string()));
        }
        Ok(banned)
    }

    pub async fn bulk_delete_profiles(&self, alumni_ids: &[String]) -> Result<u64> {
        if alumni_ids.is_empty() {
            return Ok(0);
        }

        for alumni_id in alumni_ids {
            let account = match self.linked_account(alumni_id).await {
                Ok(Some(account)) => account,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        alumni_id = %alumni_id,
                        error = %e,
                        "linked account lookup failed"
                    );
                    continue;
                }
            };
            match self.set_banned(&account.id, true).await {
                Ok(()) => tracing::info!(
                    user_id = %account.id,
                    alumni_id = %alumni_id,
                    "account banned due to profile deletion"
                ),
                Err(e) => tracing::warn!(
                    user_id = %account.id,
                    error = %e,
                    "failed to ban linked account"
                ),
            }
        }

        let res = alumni::Entity::delete_many()
            .filter(alumni::Column::Id.is_in(alumni_ids.iter().cloned()))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Soft-delete. Status is left untouched.
    pub async fn deactivate_profile(&self, alumni_id: &str) -> Result<alumni::Model> {
        let profile = self.find_profile(alumni_id).await?;
        let mut active = profile.into_active_model();
        active.is_active = Set(false);
        active.updated_at = Set(now_ts());
        Ok(active.update(self.db).await?)
    }

    /// Returns how many active profiles were deactivated.
    pub async fn bulk_deactivate_profiles(&self, alumni_ids: &[String]) -> Result<u64> {
        if alumni_ids.is_empty() {
            return Ok(0);
        }
        let res = alumni::Entity::update_many()
            .col_expr(alumni::Column::IsActive, Expr::value(false))
            .col_expr(alumni::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(alumni::Column::Id.is_in(alumni_ids.iter().cloned()))
            .filter(alumni::Column::IsActive.eq(true))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Delete an account with its sessions and credentials, releasing its profile.
    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        let account = self.find_user(user_id).await?;

        if let Some(alumni_id) = account.alumni_id.clone() {
            // The profile may already be gone; that is fine.
            self.reset_profiles(vec![alumni_id]).await?;
        }

        self.purge_accounts(&[account.id]).await?;
        Ok(())
    }

    pub async fn bulk_delete_accounts(&self, user_ids: &[String]) -> Result<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let accounts = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids.iter().cloned()))
            .all(self.db)
            .await?;

        let alumni_ids: Vec<String> = accounts
            .iter()
            .filter_map(|a| a.alumni_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        self.reset_profiles(alumni_ids).await?;

        let ids: Vec<String> = accounts.into_iter().map(|a| a.id).collect();
        self.purge_accounts(&ids).await
    }

    async fn purge_accounts(&self, user_ids: &[String]) -> Result<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }
        self.revoke_sessions(user_ids).await?;
        account::Entity::delete_many()
            .filter(account::Column::UserId.is_in(user_ids.iter().cloned()))
            .exec(self.db)
            .await?;
        let res = user::Entity::delete_many()
            .filter(user::Column::Id.is_in(user_ids.iter().cloned()))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Flip the ban flag. Returns the new state.
    pub async fn toggle_ban(&self, user_id: &str) -> Result<bool> {
        let account = self.find_user(user_id).await?;
        let banned = !account.banned;
        self.set_banned(&account.id, banned).await?;
        tracing::info!(user_id = %account.id, banned, "account ban toggled");
        Ok(banned)
    }

    /// Ban every existing, not yet banned account. Other ids are skipped.
    pub async fn bulk_ban(&self, user_ids: &[String]) -> Result<u64> {
        let mut banned = 0;
        for user_id in user_ids {
            let account = match user::Entity::find_by_id(user_id.clone()).one(self.db).await {
                Ok(Some(account)) if !account.banned => account,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "account lookup failed");
                    continue;
                }
            };
            match self.set_banned(&account.id, true).await {
                Ok(()) => banned += 1,
                Err(e) => {
                    tracing::warn!(user_id = %account.id, error = %e, "failed to ban account")
                }
            }
        }
        Ok(banned)
    }

    /// Point an account at a profile. At most one account may reference a
    /// profile at a time.
    pub async fn link_account(&self, user_id: &str, alumni_id: &str) -> Result<user::Model> {
        let account = self.find_user(user_id).await?;
        self.find_profile(alumni_id).await?;

        if let Some(other) = self.linked_account(alumni_id).await? {
            if other.id != account.id {
                return Err(Error::Conflict(
                    "Ce profil est déjà lié à un autre compte".to_string(),
                ));
            }
            return Ok(other);
        }

        if let Some(previous) = account.alumni_id.clone() {
            self.reset_profiles(vec![previous]).await?;
        }

        let mut active = account.into_active_model();
        active.alumni_id = Set(Some(alumni_id.to_string()));
        active.updated_at = Set(now_ts());
        let linked = active.update(self.db).await?;
        tracing::info!(user_id = %linked.id, alumni_id, "account linked to profile");
        Ok(linked)
    }

    /// Link a freshly created account to the unclaimed profile sharing its email.
    pub async fn link_by_email(&self, account: user::Model) -> Result<user::Model> {
        if account.alumni_id.is_some() {
            return Ok(account);
        }
        let Some(profile) = alumni::Entity::find()
            .filter(alumni::Column::Email.eq(account.email.to_lowercase()))
            .one(self.db)
            .await?
        else {
            return Ok(account);
        };
        if self.linked_account(&profile.id).await?.is_some() {
            return Ok(account);
        }

        let mut active = account.into_active_model();
        active.alumni_id = Set(Some(profile.id.clone()));
        active.updated_at = Set(now_ts());
        let linked = active.update(self.db).await?;
        tracing::info!(user_id = %linked.id, alumni_id = %profile.id, "account linked by email");
        Ok(linked)
    }

    pub async fn invite_profile(&self, alumni_id: &str) -> Result<alumni::Model> {
        let profile = self.find_profile(alumni_id).await?;
        if !profile.status.can_transition_to(AlumniStatus::Invited) {
            return Err(Error::InvalidTransition(format!(
                "Impossible d'inviter un profil au statut « {} »",
                profile.status.as_str()
            )));
        }

        let mut active = profile.into_active_model();
        active.status = Set(AlumniStatus::Invited);
        active.updated_at = Set(now_ts());
        Ok(active.update(self.db).await?)
    }

    async fn pending_request(&self, request_id: &str) -> Result<profile_update_request::Model> {
        let request = profile_update_request::Entity::find_by_id(request_id.to_string())
            .one(self.db)
            .await?
            .ok_or_else(|| Error::NotFound(REQUEST_NOT_FOUND.to_string()))?;
        if request.status.is_terminal() {
            return Err(Error::AlreadyProcessed);
        }
        Ok(request)
    }

    /// Move a pending request to `status`. Only one caller can win: a request
    /// closed in the meantime yields `AlreadyProcessed`.
    async fn close_request(&self, request_id: &str, status: RequestStatus) -> Result<i64> {
        let now = now_ts();
        let res = profile_update_request::Entity::update_many()
            .col_expr(profile_update_request::Column::Status, Expr::value(status))
            .col_expr(profile_update_request::Column::UpdatedAt, Expr::value(now))
            .filter(profile_update_request::Column::Id.eq(request_id))
            .filter(profile_update_request::Column::Status.eq(RequestStatus::Pending))
            .exec(self.db)
            .await?;
        if res.rows_affected == 0 {
            return Err(Error::AlreadyProcessed);
        }
        Ok(now)
    }

    /// Merge the requested changes into the profile, then close the request.
    pub async fn accept_update_request(&self, request_id: &str) -> Result<alumni::Model> {
        let request = self.pending_request(request_id).await?;

        let profile = alumni::Entity::find_by_id(request.alumni_id.clone())
            .one(self.db)
            .await?
            .ok_or_else(|| Error::NotFound(REQUEST_PROFILE_NOT_FOUND.to_string()))?;

        let changes: serde_json::Value = serde_json::from_str(&request.changes)?;
        let changes = parse_alumni_changes(&changes, FieldScope::Owner)?;

        // Claim the request before touching the profile.
        let now = self.close_request(&request.id, RequestStatus::Accepted).await?;

        let mut active = profile.into_active_model();
        changes.apply(&mut active);
        active.updated_at = Set(now);
        let updated = active.update(self.db).await?;

        tracing::info!(request_id, alumni_id = %updated.id, "update request accepted");
        Ok(updated)
    }

    pub async fn refuse_update_request(
        &self,
        request_id: &str,
    ) -> Result<profile_update_request::Model> {
        let request = self.pending_request(request_id).await?;
        let now = self.close_request(&request.id, RequestStatus::Refused).await?;
        tracing::info!(request_id, "update request refused");
        Ok(profile_update_request::Model {
            status: RequestStatus::Refused,
            updated_at: now,
            ..request
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_connect_and_migrate;
    use entity::user::Role;
    use sea_orm::PaginatorTrait;

    async fn setup() -> DatabaseConnection {
        db_connect_and_migrate("sqlite::memory:").await.unwrap()
    }

    async fn insert_profile(
        db: &DatabaseConnection,
        id: &str,
        email: &str,
        status: AlumniStatus,
    ) -> alumni::Model {
        alumni::ActiveModel {
            id: Set(id.to_string()),
            first_name: Set("Marie".to_string()),
            last_name: Set("Curie".to_string()),
            email: Set(email.to_string()),
            graduation_year: Set(None),
            diploma: Set(None),
            city: Set(None),
            company: Set(None),
            job_title: Set(None),
            phone: Set(None),
            linkedin_url: Set(None),
            avatar_url: Set(None),
            is_active: Set(true),
            status: Set(status),
            created_at: Set(1),
            updated_at: Set(1),
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn insert_user(
        db: &DatabaseConnection,
        id: &str,
        alumni_id: Option<&str>,
    ) -> user::Model {
        user::ActiveModel {
            id: Set(id.to_string()),
            email: Set(format!("{id}@example.org")),
            name: Set(id.to_string()),
            first_name: Set(None),
            last_name: Set(None),
            role: Set(Role::Alumni),
            alumni_id: Set(alumni_id.map(str::to_string)),
            banned: Set(false),
            last_login: Set(None),
            created_at: Set(1),
            updated_at: Set(1),
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn insert_session(db: &DatabaseConnection, user_id: &str) {
        session::ActiveModel {
            id: Set(format!("s-{user_id}")),
            token: Set(format!("t-{user_id}")),
            user_id: Set(user_id.to_string()),
            expires_at: Set(i64::MAX),
            created_at: Set(1),
        }
        .insert(db)
        .await
        .unwrap();
    }

    async fn status_of(db: &DatabaseConnection, id: &str) -> AlumniStatus {
        alumni::Entity::find_by_id(id.to_string()).one(db).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn first_authentication_registers_once() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Invited).await;
        let account = insert_user(&db, "u1", Some("p1")).await;
        let lifecycle = Lifecycle::new(&db);

        let first = lifecycle.on_first_authentication(&account).await.unwrap();
        assert!(first.registered);
        assert_eq!(status_of(&db, "p1").await, AlumniStatus::Registered);

        // A stale copy of the account still has no last_login: the guard holds.
        let again = lifecycle.on_first_authentication(&account).await.unwrap();
        assert_eq!(again, FirstLogin::default());

        let reloaded = user::Entity::find_by_id("u1".to_string())
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.last_login, first.recorded_at);
    }

    #[tokio::test]
    async fn first_authentication_without_link_is_deferred() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Unlinked).await;
        let account = insert_user(&db, "u1", None).await;
        let lifecycle = Lifecycle::new(&db);

        let outcome = lifecycle.on_first_authentication(&account).await.unwrap();
        assert_eq!(outcome, FirstLogin::default());

        let linked = lifecycle.link_account("u1", "p1").await.unwrap();
        assert!(linked.last_login.is_none());
        assert!(lifecycle.on_first_authentication(&linked).await.unwrap().registered);
        assert_eq!(status_of(&db, "p1").await, AlumniStatus::Registered);
    }

    #[tokio::test]
    async fn first_authentication_records_login_for_registered_profile() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        let account = insert_user(&db, "u1", Some("p1")).await;

        let outcome = Lifecycle::new(&db)
            .on_first_authentication(&account)
            .await
            .unwrap();
        assert!(outcome.recorded_at.is_some());
        assert!(!outcome.registered);
    }

    #[tokio::test]
    async fn bulk_profile_deletion_bans_and_skips_unknown_ids() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        insert_profile(&db, "p2", "pierre@example.org", AlumniStatus::Unlinked).await;
        insert_user(&db, "u1", Some("p1")).await;
        insert_session(&db, "u1").await;
        let lifecycle = Lifecycle::new(&db);

        let ids = vec!["p1".to_string(), "nope".to_string(), "p2".to_string()];
        assert_eq!(lifecycle.bulk_delete_profiles(&ids).await.unwrap(), 2);

        let account = user::Entity::find_by_id("u1".to_string())
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(account.banned);
        assert_eq!(account.alumni_id.as_deref(), Some("p1"));
        assert_eq!(session::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(alumni::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_deactivation_counts_active_rows_and_keeps_status() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        insert_profile(&db, "p2", "pierre@example.org", AlumniStatus::Invited).await;
        let lifecycle = Lifecycle::new(&db);
        lifecycle.deactivate_profile("p2").await.unwrap();

        let ids = vec!["p1".to_string(), "p2".to_string(), "nope".to_string()];
        assert_eq!(lifecycle.bulk_deactivate_profiles(&ids).await.unwrap(), 1);

        for (id, status) in [("p1", AlumniStatus::Registered), ("p2", AlumniStatus::Invited)] {
            let profile = alumni::Entity::find_by_id(id.to_string())
                .one(&db)
                .await
                .unwrap()
                .unwrap();
            assert!(!profile.is_active);
            assert_eq!(profile.status, status);
        }
    }

    #[tokio::test]
    async fn deleting_linked_profile_bans_account() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        insert_user(&db, "u1", Some("p1")).await;
        insert_session(&db, "u1").await;
        let lifecycle = Lifecycle::new(&db);

        assert_eq!(lifecycle.delete_profile("p1").await.unwrap(), Some("u1".to_string()));

        let account = user::Entity::find_by_id("u1".to_string()).one(&db).await.unwrap().unwrap();
        assert!(account.banned);
        assert_eq!(session::Entity::find().count(&db).await.unwrap(), 0);
        assert!(matches!(
            lifecycle.delete_profile("p1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_account_releases_profile() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        insert_user(&db, "u1", Some("p1")).await;
        insert_session(&db, "u1").await;
        let lifecycle = Lifecycle::new(&db);

        lifecycle.delete_account("u1").await.unwrap();

        assert_eq!(status_of(&db, "p1").await, AlumniStatus::Unlinked);
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(session::Entity::find().count(&db).await.unwrap(), 0);
        assert!(matches!(lifecycle.delete_account("u1").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn deleting_account_with_dangling_link_succeeds() {
        let db = setup().await;
        insert_user(&db, "u1", Some("gone")).await;

        Lifecycle::new(&db).delete_account("u1").await.unwrap();
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_account_deletion_resets_profiles() {
        let db = setup().await;
        insert_profile(&db, "p1", "a@example.org", AlumniStatus::Registered).await;
        insert_profile(&db, "p2", "b@example.org", AlumniStatus::Invited).await;
        insert_user(&db, "u1", Some("p1")).await;
        insert_user(&db, "u2", Some("p2")).await;
        insert_user(&db, "u3", None).await;

        let deleted = Lifecycle::new(&db)
            .bulk_delete_accounts(&["u1".into(), "u2".into(), "missing".into()])
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(status_of(&db, "p1").await, AlumniStatus::Unlinked);
        assert_eq!(status_of(&db, "p2").await, AlumniStatus::Unlinked);
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bulk_ban_counts_only_fresh_bans() {
        let db = setup().await;
        insert_user(&db, "u1", None).await;
        insert_user(&db, "u2", None).await;
        let lifecycle = Lifecycle::new(&db);

        assert!(lifecycle.toggle_ban("u2").await.unwrap());
        let banned = lifecycle
            .bulk_ban(&["u1".into(), "u2".into(), "nope".into()])
            .await
            .unwrap();
        assert_eq!(banned, 1);

        assert!(!lifecycle.toggle_ban("u2").await.unwrap());
    }

    #[tokio::test]
    async fn linking_is_exclusive() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Unlinked).await;
        insert_user(&db, "u1", Some("p1")).await;
        insert_user(&db, "u2", None).await;
        let lifecycle = Lifecycle::new(&db);

        assert!(matches!(
            lifecycle.link_account("u2", "p1").await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            lifecycle.link_account("u2", "nope").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(lifecycle.link_account("u1", "p1").await.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn invitation_only_from_unlinked() {
        let db = setup().await;
        insert_profile(&db, "p1", "a@example.org", AlumniStatus::Unlinked).await;
        insert_profile(&db, "p2", "b@example.org", AlumniStatus::Registered).await;
        let lifecycle = Lifecycle::new(&db);

        assert_eq!(lifecycle.invite_profile("p1").await.unwrap().status, AlumniStatus::Invited);
        assert!(matches!(
            lifecycle.invite_profile("p1").await,
            Err(Error::InvalidTransition(_))
        ));
        assert!(matches!(
            lifecycle.invite_profile("p2").await,
            Err(Error::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn update_requests_close_exactly_once() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        for id in ["r1", "r2"] {
            profile_update_request::ActiveModel {
                id: Set(id.to_string()),
                alumni_id: Set("p1".to_string()),
                user_id: Set("u1".to_string()),
                changes: Set(r#"{"company":"Institut Curie","city":"Paris"}"#.to_string()),
                status: Set(RequestStatus::Pending),
                created_at: Set(1),
                updated_at: Set(1),
            }
            .insert(&db)
            .await
            .unwrap();
        }
        let lifecycle = Lifecycle::new(&db);

        let updated = lifecycle.accept_update_request("r1").await.unwrap();
        assert_eq!(updated.company.as_deref(), Some("Institut Curie"));
        assert_eq!(updated.city.as_deref(), Some("Paris"));
        assert_eq!(updated.status, AlumniStatus::Registered);

        assert!(matches!(
            lifecycle.accept_update_request("r1").await,
            Err(Error::AlreadyProcessed)
        ));
        assert!(matches!(
            lifecycle.refuse_update_request("r1").await,
            Err(Error::AlreadyProcessed)
        ));

        assert_eq!(
            lifecycle.refuse_update_request("r2").await.unwrap().status,
            RequestStatus::Refused
        );
        assert!(matches!(
            lifecycle.accept_update_request("missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stale_pending_read_cannot_close_twice() {
        let db = setup().await;
        insert_profile(&db, "p1", "marie@example.org", AlumniStatus::Registered).await;
        profile_update_request::ActiveModel {
            id: Set("r1".to_string()),
            alumni_id: Set("p1".to_string()),
            user_id: Set("u1".to_string()),
            changes: Set(r#"{"city":"Paris"}"#.to_string()),
            status: Set(RequestStatus::Pending),
            created_at: Set(1),
            updated_at: Set(1),
        }
        .insert(&db)
        .await
        .unwrap();
        let lifecycle = Lifecycle::new(&db);

        // Both callers saw the request pending; only the first close lands.
        let seen = lifecycle.pending_request("r1").await.unwrap();
        lifecycle.refuse_update_request("r1").await.unwrap();
        assert!(matches!(
            lifecycle.close_request(&seen.id, RequestStatus::Accepted).await,
            Err(Error::AlreadyProcessed)
        ));

        let request = profile_update_request::Entity::find_by_id("r1".to_string())
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::Refused);
    }

    #[tokio::test]
    async fn accepting_request_for_deleted_profile_keeps_it_pending() {
        let db = setup().await;
        profile_update_request::ActiveModel {
            id: Set("r1".to_string()),
            alumni_id: Set("gone".to_string()),
            user_id: Set("u1".to_string()),
            changes: Set("{}".to_string()),
            status: Set(RequestStatus::Pending),
            created_at: Set(1),
            updated_at: Set(1),
        }
        .insert(&db)
        .await
        .unwrap();

        assert!(matches!(
            Lifecycle::new(&db).accept_update_request("r1").await,
            Err(Error::NotFound(msg)) if msg == REQUEST_PROFILE_NOT_FOUND
        ));
        let request = profile_update_request::Entity::find_by_id("r1".to_string())
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
    }
}
