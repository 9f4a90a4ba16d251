use crate::error::{Error, Result};
use crate::http::Request;
use crate::identity::AuthSession;
use crate::lifecycle::Lifecycle;
use crate::AppState;

/// Resolve the request session, if any, and run the first-login hook.
///
/// A failing hook is logged and does not fail the request: the session
/// itself is valid.
pub async fn resolve(state: &AppState, req: &Request) -> Result<Option<AuthSession>> {
    let Some(mut auth) = state.sessions.resolve_session(&req.headers).await? else {
        return Ok(None);
    };

    if auth.user.last_login.is_none() {
        match Lifecycle::new(&state.db).on_first_authentication(&auth.user).await {
            Ok(outcome) => {
                if let Some(ts) = outcome.recorded_at {
                    auth.user.last_login = Some(ts);
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %auth.user.id, error = %e, "first-login hook failed");
            }
        }
    }

    Ok(Some(auth))
}

pub async fn authenticate(state: &AppState, req: &Request) -> Result<AuthSession> {
    resolve(state, req).await?.ok_or(Error::Unauthenticated)
}

pub async fn require_admin(state: &AppState, req: &Request) -> Result<AuthSession> {
    let auth = authenticate(state, req).await?;
    if !auth.is_admin() {
        return Err(Error::Forbidden);
    }
    Ok(auth)
}
