use serde_json::json;

use crate::http::{json_response, Response};
use crate::AppState;

pub async fn handle_health(state: &AppState) -> Response {
    let db = match state.db.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "database ping failed");
            "disconnected"
        }
    };

    json_response(hyper::StatusCode::OK, &json!({ "status": "ok", "db": db }))
}
