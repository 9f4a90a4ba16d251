use std::collections::HashMap;

use chrono::NaiveDate;
use entity::alumni;
use entity::profile_update_request::{self, RequestStatus};
use entity::user;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use serde_json::{json, Value};

use crate::error::{Error, Issue, Result};
use crate::http::{created, success, success_message, success_message_with_data, Request, Response};
use crate::lifecycle::{Lifecycle, PROFILE_NOT_FOUND, REQUEST_NOT_FOUND};
use crate::util::{now_ts, ts_to_rfc3339, uuid_v4};
use crate::validation::{parse_alumni_changes, FieldScope};
use crate::AppState;

use super::alumni::alumni_json;
use super::auth::{authenticate, require_admin};

const SECONDS_PER_DAY: i64 = 86_400;

fn request_json(r: &profile_update_request::Model, alumni: Value, user: Value) -> Value {
    let changes: Value = serde_json::from_str(&r.changes).unwrap_or_else(|_| json!({}));
    json!({
        "id": r.id,
        "alumniId": r.alumni_id,
        "userId": r.user_id,
        "changes": changes,
        "status": r.status,
        "createdAt": ts_to_rfc3339(r.created_at),
        "updatedAt": ts_to_rfc3339(r.updated_at),
        "alumni": alumni,
        "user": user,
    })
}

fn alumni_summary(a: &alumni::Model) -> Value {
    json!({
        "id": a.id,
        "firstName": a.first_name,
        "lastName": a.last_name,
        "email": a.email,
    })
}

fn user_summary(u: &user::Model) -> Value {
    json!({ "id": u.id, "name": u.name, "email": u.email })
}

fn invalid(field: &str, message: &str) -> Error {
    Error::Validation(vec![Issue::new(field, message)])
}

/// Any signed-in user may propose changes; an administrator decides.
pub async fn handle_create(state: &AppState, req: &Request) -> Result<Response> {
    let auth = authenticate(state, req).await?;

    let body = req.json_value()?;
    let alumni_id = body
        .get("alumniId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| invalid("alumniId", "Identifiant de profil requis"))?
        .to_string();
    let changes = body
        .get("changes")
        .filter(|c| c.is_object())
        .ok_or_else(|| invalid("changes", "Objet de modifications attendu"))?;

    let parsed = parse_alumni_changes(changes, FieldScope::Owner)?;
    if parsed.is_empty() {
        return Err(invalid("changes", "Aucune modification proposée"));
    }

    alumni::Entity::find_by_id(alumni_id.clone())
        .one(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound(PROFILE_NOT_FOUND.to_string()))?;

    let now = now_ts();
    let request = profile_update_request::ActiveModel {
        id: Set(uuid_v4()?),
        alumni_id: Set(alumni_id),
        user_id: Set(auth.user.id.clone()),
        changes: Set(serde_json::to_string(changes)?),
        status: Set(RequestStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(request_id = %request.id, user_id = %auth.user.id, "profile update requested");
    Ok(created(request_json(&request, Value::Null, Value::Null)))
}

pub async fn handle_list(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;

    let mut query = profile_update_request::Entity::find();

    if let Some(status) = req.query("status") {
        let status =
            RequestStatus::parse(status).ok_or_else(|| invalid("status", "Statut invalide"))?;
        query = query.filter(profile_update_request::Column::Status.eq(status));
    }

    if let Some(date) = req.query("date") {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| invalid("date", "Date invalide (AAAA-MM-JJ attendu)"))?;
        let start = day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| invalid("date", "Date invalide (AAAA-MM-JJ attendu)"))?;
        query = query
            .filter(profile_update_request::Column::CreatedAt.gte(start))
            .filter(profile_update_request::Column::CreatedAt.lt(start + SECONDS_PER_DAY));
    }

    if let Some(search) = req.query("search") {
        let matching: Vec<String> = alumni::Entity::find()
            .select_only()
            .column(alumni::Column::Id)
            .filter(
                Condition::any()
                    .add(alumni::Column::FirstName.contains(search))
                    .add(alumni::Column::LastName.contains(search))
                    .add(alumni::Column::Email.contains(search)),
            )
            .into_tuple()
            .all(&state.db)
            .await?;
        query = query.filter(profile_update_request::Column::AlumniId.is_in(matching));
    }

    let requests = query
        .order_by_desc(profile_update_request::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let alumni_ids: Vec<String> = requests.iter().map(|r| r.alumni_id.clone()).collect();
    let user_ids: Vec<String> = requests.iter().map(|r| r.user_id.clone()).collect();

    let profiles: HashMap<String, Value> = alumni::Entity::find()
        .filter(alumni::Column::Id.is_in(alumni_ids))
        .all(&state.db)
        .await?
        .iter()
        .map(|a| (a.id.clone(), alumni_summary(a)))
        .collect();
    let users: HashMap<String, Value> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&state.db)
        .await?
        .iter()
        .map(|u| (u.id.clone(), user_summary(u)))
        .collect();

    let data: Vec<Value> = requests
        .iter()
        .map(|r| {
            request_json(
                r,
                profiles.get(&r.alumni_id).cloned().unwrap_or(Value::Null),
                users.get(&r.user_id).cloned().unwrap_or(Value::Null),
            )
        })
        .collect();

    Ok(success(json!(data)))
}

pub async fn handle_get(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;

    let request = profile_update_request::Entity::find_by_id(id.to_string())
        .one(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound(REQUEST_NOT_FOUND.to_string()))?;

    let profile = alumni::Entity::find_by_id(request.alumni_id.clone())
        .one(&state.db)
        .await?
        .map(|a| alumni_json(&a))
        .unwrap_or(Value::Null);
    let author = user::Entity::find_by_id(request.user_id.clone())
        .one(&state.db)
        .await?
        .map(|u| user_summary(&u))
        .unwrap_or(Value::Null);

    Ok(success(request_json(&request, profile, author)))
}

pub async fn handle_accept(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;
    let updated = Lifecycle::new(&state.db).accept_update_request(id).await?;
    Ok(success_message_with_data(
        "Demande acceptée et profil mis à jour",
        alumni_json(&updated),
    ))
}

pub async fn handle_refuse(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;
    Lifecycle::new(&state.db).refuse_update_request(id).await?;
    Ok(success_message("Demande refusée"))
}
