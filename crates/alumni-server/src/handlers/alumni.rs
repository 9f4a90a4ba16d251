use entity::alumni::{self, AlumniStatus};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Select, Set, SqlErr,
};
use serde_json::{json, Value};

use crate::error::{Error, Issue, Result};
use crate::export::{alumni_csv, EXPORT_FILENAME};
use crate::http::{
    bulk_ids, created, csv_attachment, json_response, success, success_message, Request, Response,
};
use crate::lifecycle::{Lifecycle, PROFILE_NOT_FOUND};
use crate::util::{now_ts, ts_to_rfc3339, uuid_v4};
use crate::validation::{
    first_issue_message, parse_alumni_changes, parse_new_alumni, FieldScope, NewAlumni,
};
use crate::AppState;

use super::auth::{authenticate, require_admin};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
pub const MAX_IMPORT_ROWS: usize = 5000;

const DUPLICATE_EMAIL: &str = "Cette adresse email est déjà utilisée";
const IMPORT_DUPLICATE_EMAIL: &str = "Email déjà existant";

pub(crate) fn alumni_json(a: &alumni::Model) -> Value {
    json!({
        "id": a.id,
        "firstName": a.first_name,
        "lastName": a.last_name,
        "email": a.email,
        "graduationYear": a.graduation_year,
        "diploma": a.diploma,
        "city": a.city,
        "company": a.company,
        "jobTitle": a.job_title,
        "phone": a.phone,
        "linkedinUrl": a.linkedin_url,
        "avatarUrl": a.avatar_url,
        "isActive": a.is_active,
        "status": a.status,
        "createdAt": ts_to_rfc3339(a.created_at),
        "updatedAt": ts_to_rfc3339(a.updated_at),
    })
}

/// Directory filters shared by the listing and the export.
fn filtered(req: &Request) -> Result<Select<alumni::Entity>> {
    let mut query = alumni::Entity::find();

    if let Some(search) = req.query("search") {
        query = query.filter(
            Condition::any()
                .add(alumni::Column::FirstName.contains(search))
                .add(alumni::Column::LastName.contains(search))
                .add(alumni::Column::Email.contains(search)),
        );
    }
    if let Some(year) = req.query("graduationYear") {
        let year: i32 = year.parse().map_err(|_| {
            Error::Validation(vec![Issue::new("graduationYear", "Année de promotion invalide")])
        })?;
        query = query.filter(alumni::Column::GraduationYear.eq(year));
    }
    if let Some(diploma) = req.query("diploma") {
        query = query.filter(alumni::Column::Diploma.contains(diploma));
    }
    if let Some(city) = req.query("city") {
        query = query.filter(alumni::Column::City.contains(city));
    }
    if let Some(company) = req.query("company") {
        query = query.filter(alumni::Column::Company.contains(company));
    }
    if let Some(status) = req.query("status") {
        let status = AlumniStatus::parse(status)
            .ok_or_else(|| Error::Validation(vec![Issue::new("status", "Statut invalide")]))?;
        query = query.filter(alumni::Column::Status.eq(status));
    }
    if req.query("showInactive") != Some("true") {
        query = query.filter(alumni::Column::IsActive.eq(true));
    }

    Ok(query
        .order_by_asc(alumni::Column::LastName)
        .order_by_asc(alumni::Column::FirstName))
}

/// `page` (1-based) and `limit`, clamped to `MAX_PAGE_SIZE`. The row offset
/// must fit the database's signed 64-bit OFFSET.
fn page_params(req: &Request) -> Result<(u64, u64)> {
    let page = req
        .query("page")
        .and_then(|p| p.parse::<u64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);
    let limit = req
        .query("limit")
        .and_then(|l| l.parse::<u64>().ok())
        .filter(|l| *l >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);

    match (page - 1).checked_mul(limit) {
        Some(offset) if i64::try_from(offset).is_ok() => Ok((page, limit)),
        _ => Err(Error::BadRequest("Numéro de page invalide".to_string())),
    }
}

pub async fn handle_list(state: &AppState, req: &Request) -> Result<Response> {
    authenticate(state, req).await?;

    let (page, limit) = page_params(req)?;
    let paginator = filtered(req)?.paginate(&state.db, limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;

    let data: Vec<Value> = items.iter().map(alumni_json).collect();
    Ok(json_response(
        hyper::StatusCode::OK,
        &json!({
            "status": "success",
            "data": data,
            "total": total,
            "page": page,
            "pages": total.div_ceil(limit),
        }),
    ))
}

pub async fn handle_export(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;

    let profiles = filtered(req)?.all(&state.db).await?;
    let body = alumni_csv(&profiles)?;
    tracing::info!(rows = profiles.len(), "alumni export generated");
    Ok(csv_attachment(EXPORT_FILENAME, body))
}

pub async fn handle_me(state: &AppState, req: &Request) -> Result<Response> {
    let auth = authenticate(state, req).await?;

    let profile = alumni::Entity::find()
        .filter(alumni::Column::Email.eq(auth.user.email.to_lowercase()))
        .filter(alumni::Column::IsActive.eq(true))
        .one(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound(PROFILE_NOT_FOUND.to_string()))?;

    Ok(success(alumni_json(&profile)))
}

async fn find_profile(db: &DatabaseConnection, id: &str) -> Result<alumni::Model> {
    alumni::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound(PROFILE_NOT_FOUND.to_string()))
}

pub async fn handle_get(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    authenticate(state, req).await?;
    let profile = find_profile(&state.db, id).await?;
    Ok(success(alumni_json(&profile)))
}

/// Insert a validated profile. Email uniqueness covers inactive profiles too.
async fn create_profile(
    db: &DatabaseConnection,
    input: NewAlumni,
    duplicate: &str,
) -> Result<alumni::Model> {
    let existing = alumni::Entity::find()
        .filter(alumni::Column::Email.eq(input.email.as_str()))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(Error::Conflict(duplicate.to_string()));
    }

    let active = input.into_active_model(uuid_v4()?, now_ts());
    match active.insert(db).await {
        Ok(created) => Ok(created),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(Error::Conflict(duplicate.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_create(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;

    let input = parse_new_alumni(&req.json_value()?)?;
    let profile = create_profile(&state.db, input, DUPLICATE_EMAIL).await?;
    tracing::info!(alumni_id = %profile.id, "alumni profile created");
    Ok(created(alumni_json(&profile)))
}

pub async fn handle_update(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;

    let changes = parse_alumni_changes(&req.json_value()?, FieldScope::Admin)?;
    let profile = find_profile(&state.db, id).await?;

    let mut active = profile.into_active_model();
    changes.apply(&mut active);
    active.updated_at = Set(now_ts());
    let updated = active.update(&state.db).await?;

    Ok(success(alumni_json(&updated)))
}

pub async fn handle_deactivate(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;
    let profile = Lifecycle::new(&state.db).deactivate_profile(id).await?;
    Ok(success(alumni_json(&profile)))
}

pub async fn handle_invite(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;
    let profile = Lifecycle::new(&state.db).invite_profile(id).await?;
    Ok(success(alumni_json(&profile)))
}

pub async fn handle_delete(state: &AppState, req: &Request, id: &str) -> Result<Response> {
    require_admin(state, req).await?;
    Lifecycle::new(&state.db).delete_profile(id).await?;
    Ok(success_message("Profil supprimé et compte utilisateur désactivé"))
}

pub async fn handle_bulk_deactivate(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;
    let ids = bulk_ids(&req.json_value()?)?;
    let updated = Lifecycle::new(&state.db).bulk_deactivate_profiles(&ids).await?;
    Ok(success(json!({ "updated": updated })))
}

pub async fn handle_bulk_delete(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;
    let ids = bulk_ids(&req.json_value()?)?;
    let deleted = Lifecycle::new(&state.db).bulk_delete_profiles(&ids).await?;
    Ok(success(json!({ "deleted": deleted })))
}

pub async fn handle_import(state: &AppState, req: &Request) -> Result<Response> {
    require_admin(state, req).await?;

    let body = req.json_value()?;
    let rows = match body.get("rows").and_then(Value::as_array) {
        Some(rows) if !rows.is_empty() => rows,
        _ => {
            return Err(Error::BadRequest(
                "Le champ \"rows\" doit être un tableau non vide".to_string(),
            ))
        }
    };
    if rows.len() > MAX_IMPORT_ROWS {
        return Err(Error::BadRequest(format!(
            "Maximum {MAX_IMPORT_ROWS} lignes par import"
        )));
    }

    let mut imported = 0u64;
    let mut errors = Vec::new();
    let mut created_alumni = Vec::new();

    for (i, raw) in rows.iter().enumerate() {
        let row = i + 1;
        let raw_email = raw.get("email").and_then(Value::as_str).unwrap_or_default();

        let input = match parse_new_alumni(raw) {
            Ok(input) => input,
            Err(e) => {
                errors.push(json!({
                    "row": row,
                    "email": raw_email,
                    "reason": first_issue_message(&e),
                }));
                continue;
            }
        };
        let email = input.email.clone();

        match create_profile(&state.db, input, IMPORT_DUPLICATE_EMAIL).await {
            Ok(profile) => {
                imported += 1;
                created_alumni.push(json!({
                    "id": profile.id,
                    "email": profile.email,
                    "firstName": profile.first_name,
                    "lastName": profile.last_name,
                    "graduationYear": profile.graduation_year,
                }));
            }
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(row, error = %e, "import row failed");
                }
                errors.push(json!({ "row": row, "email": email, "reason": e.public_message() }));
            }
        }
    }

    let skipped = errors.len();
    tracing::info!(imported, skipped, "alumni import finished");
    Ok(success(json!({
        "imported": imported,
        "skipped": skipped,
        "errors": errors,
        "createdAlumni": created_alumni,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hyper::header::HeaderMap;
    use hyper::{Method, Uri};

    fn get(uri: &str) -> Request {
        let uri: Uri = uri.parse().unwrap();
        Request::new(Method::GET, &uri, HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn page_defaults_and_clamps() {
        assert_eq!(page_params(&get("/alumni")).unwrap(), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(page_params(&get("/alumni?page=0&limit=0")).unwrap(), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(page_params(&get("/alumni?page=3&limit=500")).unwrap(), (3, MAX_PAGE_SIZE));
        assert_eq!(page_params(&get("/alumni?page=abc&limit=5")).unwrap(), (1, 5));
    }

    #[test]
    fn page_offset_must_fit_sql() {
        let err = page_params(&get("/alumni?page=18446744073709551615&limit=100")).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let last_ok = format!("/alumni?page={}&limit=1", i64::MAX as u64 + 1);
        assert!(page_params(&get(&last_ok)).is_ok());
        let too_far = format!("/alumni?page={}&limit=1", i64::MAX as u64 + 2);
        assert!(page_params(&get(&too_far)).is_err());
    }
}
