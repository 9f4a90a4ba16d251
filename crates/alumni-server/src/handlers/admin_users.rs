use entity::user::{self, Role};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Issue, Result};
use crate::http::{bulk_ids, success, success_message, success_message_with_data, Request, Response};
use crate::lifecycle::Lifecycle;
use crate::util::ts_to_rfc3339;
use crate::AppState;

use super::auth::require_admin;

pub(crate) fn user_json(u: &user::Model) -> Value {
    json!({
        "id": u.id,
        "email": u.email,
        "name": u.name,
        "firstName": u.first_name,
        "lastName": u.last_name,
        "role": u.role,
        "alumniId": u.alumni_id,
        "banned": u.banned,
        "lastLogin": u.last_login.map(ts_to_rfc3339),
        "createdAt": ts_to_rfc3339(u.created_at),
        "updatedAt": ts_to_rfc3339(u.updated_at),
    })
}

pub async fn handle_list(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;

    let mut query = user::Entity::find();
    if let Some(role) = req.query("role") {
        let role = Role::parse(role)
            .ok_or_else(|| Error::Validation(vec![Issue::new("role", "Rôle invalide")]))?;
        query = query.filter(user::Column::Role.eq(role));
    }
    match req.query("status") {
        Some("active") => query = query.filter(user::Column::Banned.eq(false)),
        Some("inactive") => query = query.filter(user::Column::Banned.eq(true)),
        _ => {}
    }

    let users = query
        .order_by_desc(user::Column::CreatedAt)
        .all(&state.db)
        .await?;
    let data: Vec<Value> = users.iter().map(user_json).collect();
    Ok(success(json!(data)))
}

pub async fn handle_toggle_status(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;

    let banned = Lifecycle::new(&state.db).toggle_ban(id).await?;
    Ok(success_message(if banned {
        "Compte désactivé avec succès"
    } else {
        "Compte réactivé avec succès"
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkPayload {
    alumni_id: Option<String>,
}

pub async fn handle_link(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;

    let payload: LinkPayload = req.json()?;
    let alumni_id = payload
        .alumni_id
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            Error::Validation(vec![Issue::new("alumniId", "Identifiant de profil requis")])
        })?;

    let linked = Lifecycle::new(&state.db).link_account(id, &alumni_id).await?;
    Ok(success_message_with_data(
        "Compte lié au profil avec succès",
        user_json(&linked),
    ))
}

pub async fn handle_delete(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;
    Lifecycle::new(&state.db).delete_account(id).await?;
    Ok(success_message("Compte utilisateur supprimé avec succès"))
}

pub async fn handle_bulk_ban(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;
    let ids = bulk_ids(&req.json_value()?)?;
    let banned = Lifecycle::new(&state.db).bulk_ban(&ids).await?;
    Ok(success(json!({ "banned": banned })))
}

pub async fn handle_bulk_delete(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;
    let ids = bulk_ids(&req.json_value()?)?;
    let deleted = Lifecycle::new(&state.db).bulk_delete_accounts(&ids).await?;
    Ok(success(json!({ "deleted": deleted })))
}
