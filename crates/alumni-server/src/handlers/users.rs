use serde_json::json;

use crate::error::Result;
use crate::http::{decode_path_segment, json_response, Response};
use crate::identity::Identity;
use crate::AppState;

/// Public: whether an account already uses this email.
pub async fn handle_check_email(state: &AppState, raw_email: &str) -> Result<Response> {
    let email = decode_path_segment(raw_email);
    let exists = Identity::new(&state.db, &state.config)
        .email_exists(&email)
        .await?;
    Ok(json_response(hyper::StatusCode::OK, &json!({ "exists": exists })))
}
