use entity::alumni;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::http::{success, Request, Response};
use crate::lifecycle::PROFILE_NOT_FOUND;
use crate::util::now_ts;
use crate::validation::is_valid_http_url;
use crate::AppState;

use super::alumni::alumni_json;
use super::auth::require_admin;

#[derive(Debug, Deserialize)]
struct ExtractPayload {
    url: Option<String>,
}

pub async fn handle_extract(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;

    let payload: ExtractPayload = req.json()?;
    let url = payload
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| is_valid_http_url(u))
        .ok_or_else(|| Error::BadRequest("URL invalide".to_string()))?;

    let profile = state.scraper.extract(&url).await?;
    Ok(success(json!(profile)))
}

/// Refresh a profile from its LinkedIn page. Only non-empty scraped values
/// overwrite stored fields.
pub async fn handle_sync(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;

    let profile = alumni::Entity::find_by_id(id.to_string())
        .one(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound(PROFILE_NOT_FOUND.to_string()))?;

    let Some(url) = profile.linkedin_url.clone().filter(|u| !u.trim().is_empty()) else {
        return Err(Error::BadRequest(
            "Aucune URL LinkedIn pour ce profil".to_string(),
        ));
    };

    let scraped = state.scraper.extract(&url).await?;

    let mut active = profile.into_active_model();
    scraped.merge_into(&mut active);
    active.updated_at = Set(now_ts());
    let updated = active.update(&state.db).await?;

    tracing::info!(alumni_id = %updated.id, "profile synchronised from LinkedIn");
    Ok(success(alumni_json(&updated)))
}
