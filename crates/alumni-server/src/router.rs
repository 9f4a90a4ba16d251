use hyper::{Method, StatusCode};

use crate::error::Result;
use crate::handlers::{
    admin_users, alumni, health, identity, profile_update_requests, scraper, stats, users,
};
use crate::http::{empty_response, error_response, not_found, with_cors, Request, Response};
use crate::AppState;

/// Entry point for every request: dispatch, render errors, add CORS headers.
pub async fn route(state: &AppState, req: Request) -> Response {
    let resp = if req.method == Method::OPTIONS {
        empty_response(StatusCode::NO_CONTENT)
    } else {
        match dispatch(state, &req).await {
            Ok(resp) => resp,
            Err(e) => error_response(&e),
        }
    };

    with_cors(resp, &state.config.web_url)
}

async fn dispatch(state: &AppState, req: &Request) -> Result<Response> {
    if let Some(rest) = req.path.strip_prefix("/api/auth/") {
        return identity::handle_auth(state, req, rest.trim_end_matches('/')).await;
    }

    let segments: Vec<&str> = req
        .path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match (&req.method, segments.as_slice()) {
        (&Method::GET, ["health"]) => Ok(health::handle_health(state).await),
        (&Method::GET, ["users", "check-email", email]) => {
            users::handle_check_email(state, email).await
        }

        // Fixed alumni paths are matched before "/alumni/<id>".
        (&Method::GET, ["alumni"]) => alumni::handle_list(state, req).await,
        (&Method::POST, ["alumni"]) => alumni::handle_create(state, req).await,
        (&Method::GET, ["alumni", "export"]) => alumni::handle_export(state, req).await,
        (&Method::GET, ["alumni", "me"]) => alumni::handle_me(state, req).await,
        (&Method::POST, ["alumni", "import"]) => alumni::handle_import(state, req).await,
        (&Method::POST, ["alumni", "bulk-deactivate"]) => {
            alumni::handle_bulk_deactivate(state, req).await
        }
        (&Method::POST, ["alumni", "bulk-delete"]) => alumni::handle_bulk_delete(state, req).await,
        (&Method::GET, ["alumni", id]) => alumni::handle_get(state, req, id).await,
        (&Method::PUT, ["alumni", id]) => alumni::handle_update(state, req, id).await,
        (&Method::DELETE, ["alumni", id]) => alumni::handle_delete(state, req, id).await,
        (&Method::PATCH, ["alumni", id, "deactivate"]) => {
            alumni::handle_deactivate(state, req, id).await
        }
        (&Method::POST, ["alumni", id, "invite"]) => alumni::handle_invite(state, req, id).await,

        (&Method::GET, ["admin", "users"]) => admin_users::handle_list(state, req).await,
        (&Method::POST, ["admin", "users", "bulk-ban"]) => {
            admin_users::handle_bulk_ban(state, req).await
        }
        (&Method::POST, ["admin", "users", "bulk-delete"]) => {
            admin_users::handle_bulk_delete(state, req).await
        }
        (&Method::DELETE, ["admin", "users", id]) => {
            admin_users::handle_delete(state, req, id).await
        }
        (&Method::PATCH, ["admin", "users", id, "toggle-status"]) => {
            admin_users::handle_toggle_status(state, req, id).await
        }
        (&Method::PATCH, ["admin", "users", id, "link"]) => {
            admin_users::handle_link(state, req, id).await
        }

        (&Method::POST, ["profile-update-requests"]) => {
            profile_update_requests::handle_create(state, req).await
        }
        (&Method::GET, ["profile-update-requests"]) => {
            profile_update_requests::handle_list(state, req).await
        }
        (&Method::GET, ["profile-update-requests", id]) => {
            profile_update_requests::handle_get(state, req, id).await
        }
        (&Method::PATCH, ["profile-update-requests", id, "accept"]) => {
            profile_update_requests::handle_accept(state, req, id).await
        }
        (&Method::PATCH, ["profile-update-requests", id, "refuse"]) => {
            profile_update_requests::handle_refuse(state, req, id).await
        }

        (&Method::GET, ["stats"]) => stats::handle_stats(state, req).await,
        (&Method::GET, ["dashboard", "stats"]) => stats::handle_dashboard_stats(state, req).await,

        (&Method::POST, ["scraper", "extract"]) => scraper::handle_extract(state, req).await,
        (&Method::POST, ["scraper", "sync", id]) => scraper::handle_sync(state, req, id).await,

        _ => Ok(not_found()),
    }
}
