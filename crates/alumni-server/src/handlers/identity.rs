use entity::user::Role;
use hyper::header;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::{json_response, not_found, set_header, Request, Response};
use crate::identity::{
    clear_session_cookie, session_cookie, session_token, AuthSession, Identity, SignIn, SignUp,
};
use crate::util::ts_to_rfc3339;
use crate::AppState;

use super::admin_users::user_json;
use super::auth::resolve;

fn session_json(auth: &AuthSession) -> Value {
    json!({
        "session": {
            "id": auth.session.id,
            "token": auth.session.token,
            "userId": auth.session.user_id,
            "expiresAt": ts_to_rfc3339(auth.session.expires_at),
            "createdAt": ts_to_rfc3339(auth.session.created_at),
        },
        "user": user_json(&auth.user),
    })
}

/// `/api/auth/*`. `rest` is the path after the prefix.
pub async fn handle_auth(state: &AppState, req: &Request, rest: &str) -> Result<Response> {
    match (&req.method, rest) {
        (&Method::POST, "sign-up/email") => handle_sign_up(state, req).await,
        (&Method::POST, "sign-in/email") => handle_sign_in(state, req).await,
        (&Method::POST, "sign-out") => handle_sign_out(state, req).await,
        (&Method::GET, "get-session") => handle_get_session(state, req).await,
        _ => Ok(not_found()),
    }
}

async fn handle_sign_up(state: &AppState, req: &Request) -> Result<Response> {
    let input: SignUp = req.json()?;
    let created = Identity::new(&state.db, &state.config)
        .sign_up(input, Role::Alumni)
        .await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "token": Value::Null, "user": user_json(&created) }),
    ))
}

async fn handle_sign_in(state: &AppState, req: &Request) -> Result<Response> {
    let input: SignIn = req.json()?;
    let identity = Identity::new(&state.db, &state.config);
    let auth = identity.sign_in(input).await?;
    tracing::info!(user_id = %auth.user.id, "signed in");

    let mut resp = json_response(
        StatusCode::OK,
        &json!({ "token": auth.session.token, "user": user_json(&auth.user) }),
    );
    set_header(
        &mut resp,
        header::SET_COOKIE,
        &session_cookie(&auth.session.token, identity.session_ttl_secs()),
    );
    Ok(resp)
}

async fn handle_sign_out(state: &AppState, req: &Request) -> Result<Response> {
    if let Some(token) = session_token(&req.headers) {
        Identity::new(&state.db, &state.config)
            .sign_out(&token)
            .await?;
    }

    let mut resp = json_response(StatusCode::OK, &json!({ "success": true }));
    set_header(&mut resp, header::SET_COOKIE, &clear_session_cookie());
    Ok(resp)
}

async fn handle_get_session(state: &AppState, req: &Request) -> Result<Response> {
    let body = match resolve(state, req).await? {
        Some(auth) => session_json(&auth),
        None => Value::Null,
    };
    Ok(json_response(StatusCode::OK, &body))
}
