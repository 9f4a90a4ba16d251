use serde_json::json;

use crate::error::Result;
use crate::http::{success, Request, Response};
use crate::reporting::{load_basic_stats, load_dashboard_stats};
use crate::AppState;

use super::auth::require_admin;

pub async fn handle_stats(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;
    let stats = load_basic_stats(&state.db).await?;
    Ok(success(json!(stats)))
}

pub async fn handle_dashboard_stats(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;
    let stats = load_dashboard_stats(&state.db).await?;
    Ok(success(json!(stats)))
}
