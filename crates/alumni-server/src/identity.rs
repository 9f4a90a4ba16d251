//! Built-in email/password identity provider.
//!
//! The rest of the application only sees sessions through
//! [`SessionResolver`]; everything else here backs the `/api/auth/*` routes
//! and the `seed-admin` command.

use async_trait::async_trait;
use entity::user::{self, Role};
use entity::{account, session};
use hyper::header::{self, HeaderMap};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use serde::Deserialize;
use validator::Validate;

use crate::config::Config;
use crate::crypto::{hash_password, verify_password_hash, SALT_LEN};
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::util::{generate_session_token, now_ts, random_bytes, uuid_v4};
use crate::validation::{issues_from, normalize_email};

pub const SESSION_COOKIE: &str = "alumni.session_token";
pub const CREDENTIAL_PROVIDER: &str = "credential";

/// An authenticated request context.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session: session::Model,
    pub user: user::Model,
}

impl AuthSession {
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }
}

/// Resolves the session attached to a request, if any.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve_session(&self, headers: &HeaderMap) -> Result<Option<AuthSession>>;
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = auth.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Bearer token first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_session_cookie(headers))
}

pub fn session_cookie(token: &str, max_age: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}")
}

pub fn clear_session_cookie() -> String {
    session_cookie("", 0)
}

/// Sessions stored in the `sessions` table.
pub struct DbSessionResolver {
    db: DatabaseConnection,
}

impl DbSessionResolver {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionResolver for DbSessionResolver {
    async fn resolve_session(&self, headers: &HeaderMap) -> Result<Option<AuthSession>> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };

        let Some(found) = session::Entity::find()
            .filter(session::Column::Token.eq(token))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        if found.expires_at <= now_ts() {
            session::Entity::delete_by_id(found.id.clone())
                .exec(&self.db)
                .await?;
            return Ok(None);
        }

        let Some(account) = user::Entity::find_by_id(found.user_id.clone())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        if account.banned {
            return Ok(None);
        }

        Ok(Some(AuthSession {
            session: found,
            user: account,
        }))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub name: Option<String>,
    #[serde(default)]
    #[validate(email(message = "Adresse email invalide"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Le mot de passe doit contenir au moins 8 caractères"))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignIn {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub struct Identity<'a> {
    db: &'a DatabaseConnection,
    iterations: u32,
    session_ttl_secs: i64,
}

impl<'a> Identity<'a> {
    pub fn new(db: &'a DatabaseConnection, config: &Config) -> Self {
        Self {
            db,
            iterations: config.password_iterations,
            session_ttl_secs: config.session_ttl_secs,
        }
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.session_ttl_secs
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db)
            .await?)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.find_by_email(&normalize_email(email)).await?.is_some())
    }

    /// Create an account with a credential record. Does not sign in.
    pub async fn sign_up(&self, mut input: SignUp, role: Role) -> Result<user::Model> {
        input.email = normalize_email(&input.email);
        if let Err(errors) = input.validate() {
            return Err(Error::Validation(issues_from(
                &errors,
                &[("email", "email"), ("password", "password")],
            )));
        }
        let email = input.email.clone();

        if self.find_by_email(&email).await?.is_some() {
            return Err(Error::Conflict(
                "Un compte existe déjà avec cette adresse email".to_string(),
            ));
        }

        let first_name = trimmed(&input.first_name);
        let last_name = trimmed(&input.last_name);
        let name = trimmed(&input.name)
            .or_else(|| {
                let full = [first_name.as_deref(), last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                (!full.is_empty()).then_some(full)
            })
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let now = now_ts();
        let user_id = uuid_v4()?;
        let created = user::ActiveModel {
            id: Set(user_id.clone()),
            email: Set(email),
            name: Set(name),
            first_name: Set(first_name),
            last_name: Set(last_name),
            role: Set(role),
            alumni_id: Set(None),
            banned: Set(false),
            last_login: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await?;

        self.store_credential(&user_id, &input.password, now).await?;
        tracing::info!(user_id = %created.id, role = role.as_str(), "account created");

        Lifecycle::new(self.db).link_by_email(created).await
    }

    async fn store_credential(&self, user_id: &str, password: &str, now: i64) -> Result<()> {
        let salt = random_bytes(SALT_LEN)?;
        let password_hash = hash_password(password.as_bytes(), &salt, self.iterations)?;
        let iterations = i32::try_from(self.iterations)
            .map_err(|_| Error::Internal("PBKDF2 iterations out of range".to_string()))?;

        account::ActiveModel {
            id: Set(uuid_v4()?),
            user_id: Set(user_id.to_string()),
            provider_id: Set(CREDENTIAL_PROVIDER.to_string()),
            password_hash: Set(password_hash),
            salt: Set(salt),
            iterations: Set(iterations),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await?;
        Ok(())
    }

    /// Verify credentials and open a session.
    pub async fn sign_in(&self, input: SignIn) -> Result<AuthSession> {
        let email = normalize_email(&input.email);
        let account = self
            .find_by_email(&email)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        let credential = account::Entity::find()
            .filter(account::Column::UserId.eq(account.id.as_str()))
            .filter(account::Column::ProviderId.eq(CREDENTIAL_PROVIDER))
            .one(self.db)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        let iterations = u32::try_from(credential.iterations)
            .map_err(|_| Error::Internal("stored PBKDF2 iterations are invalid".to_string()))?;
        let ok = verify_password_hash(
            input.password.as_bytes(),
            &credential.salt,
            &credential.password_hash,
            iterations,
        )?;
        if !ok {
            tracing::info!(user_id = %account.id, "sign-in rejected: wrong password");
            return Err(Error::InvalidCredentials);
        }
        if account.banned {
            return Err(Error::Banned);
        }

        let now = now_ts();
        let session = session::ActiveModel {
            id: Set(uuid_v4()?),
            token: Set(generate_session_token()?),
            user_id: Set(account.id.clone()),
            expires_at: Set(now + self.session_ttl_secs),
            created_at: Set(now),
        }
        .insert(self.db)
        .await?;

        Ok(AuthSession {
            session,
            user: account,
        })
    }

    pub async fn sign_out(&self, token: &str) -> Result<()> {
        session::Entity::delete_many()
            .filter(session::Column::Token.eq(token))
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// Create an administrator, or promote the existing account with that email.
    pub async fn seed_admin(&self, email: &str, password: &str, name: &str) -> Result<user::Model> {
        if let Some(existing) = self.find_by_email(&normalize_email(email)).await? {
            let mut active = existing.into_active_model();
            active.role = Set(Role::Admin);
            active.updated_at = Set(now_ts());
            let promoted = active.update(self.db).await?;
            tracing::info!(user_id = %promoted.id, "existing account promoted to admin");
            return Ok(promoted);
        }

        let (first_name, last_name) = match name.trim().split_once(' ') {
            Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
            None => (None, None),
        };
        self.sign_up(
            SignUp {
                name: Some(name.to_string()),
                email: email.to_string(),
                password: password.to_string(),
                first_name,
                last_name,
            },
            Role::Admin,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_connect_and_migrate;
    use hyper::header::HeaderValue;

    fn test_config() -> Config {
        Config {
            password_iterations: 10,
            ..Config::default()
        }
    }

    #[test]
    fn reads_bearer_and_cookie_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; alumni.session_token=abc123; other=1"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        let config = test_config();
        let identity = Identity::new(&db, &config);

        let created = identity
            .sign_up(
                SignUp {
                    email: "Ada@Example.org".into(),
                    password: "analytical".into(),
                    first_name: Some("Ada".into()),
                    last_name: Some("Lovelace".into()),
                    ..Default::default()
                },
                Role::Alumni,
            )
            .await
            .unwrap();
        assert_eq!(created.email, "ada@example.org");
        assert_eq!(created.name, "Ada Lovelace");

        let err = identity
            .sign_in(SignIn {
                email: "ada@example.org".into(),
                password: "wrong-password".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let auth = identity
            .sign_in(SignIn {
                email: "ADA@example.org".into(),
                password: "analytical".into(),
            })
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", auth.session.token)).unwrap(),
        );
        let resolver = DbSessionResolver::new(db.clone());
        let resolved = resolver.resolve_session(&headers).await.unwrap().unwrap();
        assert_eq!(resolved.user.id, created.id);

        identity.sign_out(&auth.session.token).await.unwrap();
        assert!(resolver.resolve_session(&headers).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_short_password_and_duplicates() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        let config = test_config();
        let identity = Identity::new(&db, &config);

        let short = SignUp {
            email: "a@example.org".into(),
            password: "short".into(),
            ..Default::default()
        };
        assert!(matches!(
            identity.sign_up(short, Role::Alumni).await,
            Err(Error::Validation(_))
        ));

        let ok = SignUp {
            email: "a@example.org".into(),
            password: "long enough".into(),
            ..Default::default()
        };
        identity.sign_up(ok.clone(), Role::Alumni).await.unwrap();
        assert!(matches!(
            identity.sign_up(ok, Role::Alumni).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn sign_up_reports_each_invalid_field() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        let config = test_config();
        let identity = Identity::new(&db, &config);

        let err = identity
            .sign_up(
                SignUp {
                    email: "ada@example..org".into(),
                    password: "short".into(),
                    ..Default::default()
                },
                Role::Alumni,
            )
            .await
            .unwrap_err();
        let issues = err.issues().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, vec!["email".to_string()]);
        assert_eq!(issues[0].message, "Adresse email invalide");
        assert_eq!(issues[1].path, vec!["password".to_string()]);
        assert_eq!(
            issues[1].message,
            "Le mot de passe doit contenir au moins 8 caractères"
        );
    }

    #[tokio::test]
    async fn seed_admin_promotes_existing_account() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        let config = test_config();
        let identity = Identity::new(&db, &config);

        let admin = identity
            .seed_admin("root@example.org", "password123", "Root Admin")
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.first_name.as_deref(), Some("Root"));

        let again = identity
            .seed_admin("root@example.org", "ignored-password", "Root Admin")
            .await
            .unwrap();
        assert_eq!(again.id, admin.id);
        assert_eq!(again.role, Role::Admin);
    }
}
