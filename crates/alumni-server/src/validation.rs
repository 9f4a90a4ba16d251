//! Input validation for alumni profiles.
//!
//! Payloads are decoded field by field into [`ProfileInput`], then checked
//! with `validator`. Every problem is reported at once, the way clients
//! display them next to form fields.

use entity::alumni::{self, AlumniStatus};
use sea_orm::Set;
use serde_json::{Map, Value};
use validator::{Validate, ValidationErrors};

use crate::error::{Error, Issue, Result};
use crate::util::current_year;

/// Struct field name and payload key, in reporting order.
const PROFILE_FIELDS: [(&str, &str); 13] = [
    ("first_name", "firstName"),
    ("last_name", "lastName"),
    ("email", "email"),
    ("graduation_year", "graduationYear"),
    ("diploma", "diploma"),
    ("city", "city"),
    ("company", "company"),
    ("job_title", "jobTitle"),
    ("phone", "phone"),
    ("linkedin_url", "linkedinUrl"),
    ("avatar_url", "avatarUrl"),
    ("is_active", "isActive"),
    ("status", "status"),
];

const GRADUATION_YEAR_MESSAGE: &str = "Année de promotion invalide";

/// A partial set of profile field writes.
///
/// Outer `None` leaves the column alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlumniChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub graduation_year: Option<Option<i32>>,
    pub diploma: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub company: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub linkedin_url: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub status: Option<AlumniStatus>,
}

impl AlumniChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, active: &mut alumni::ActiveModel) {
        if let Some(v) = &self.first_name {
            active.first_name = Set(v.clone());
        }
        if let Some(v) = &self.last_name {
            active.last_name = Set(v.clone());
        }
        if let Some(v) = self.graduation_year {
            active.graduation_year = Set(v);
        }
        if let Some(v) = &self.diploma {
            active.diploma = Set(v.clone());
        }
        if let Some(v) = &self.city {
            active.city = Set(v.clone());
        }
        if let Some(v) = &self.company {
            active.company = Set(v.clone());
        }
        if let Some(v) = &self.job_title {
            active.job_title = Set(v.clone());
        }
        if let Some(v) = &self.phone {
            active.phone = Set(v.clone());
        }
        if let Some(v) = &self.linkedin_url {
            active.linkedin_url = Set(v.clone());
        }
        if let Some(v) = &self.avatar_url {
            active.avatar_url = Set(v.clone());
        }
        if let Some(v) = self.is_active {
            active.is_active = Set(v);
        }
        if let Some(v) = self.status {
            active.status = Set(v);
        }
    }
}

/// Decoded profile payload, before validation.
///
/// Same three-way convention as [`AlumniChanges`]: absent, cleared, set.
#[derive(Debug, Clone, Default, Validate)]
pub struct ProfileInput {
    #[validate(length(min = 2, message = "Le prénom doit contenir au moins 2 caractères"))]
    pub first_name: Option<String>,
    #[validate(length(min = 2, message = "Le nom doit contenir au moins 2 caractères"))]
    pub last_name: Option<String>,
    #[validate(email(message = "Adresse email invalide"))]
    pub email: Option<String>,
    #[validate(range(min = 1900, message = "Année de promotion invalide"))]
    pub graduation_year: Option<Option<i32>>,
    pub diploma: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub company: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    #[validate(url(message = "URL invalide"))]
    pub linkedin_url: Option<Option<String>>,
    #[validate(url(message = "URL invalide"))]
    pub avatar_url: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub status: Option<AlumniStatus>,
}

impl ProfileInput {
    /// Split off the email; the rest are column writes.
    fn into_changes(self) -> (Option<String>, AlumniChanges) {
        let changes = AlumniChanges {
            first_name: self.first_name,
            last_name: self.last_name,
            graduation_year: self.graduation_year,
            diploma: self.diploma,
            city: self.city,
            company: self.company,
            job_title: self.job_title,
            phone: self.phone,
            linkedin_url: self.linkedin_url,
            avatar_url: self.avatar_url,
            is_active: self.is_active,
            status: self.status,
        };
        (self.email, changes)
    }
}

/// A validated creation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlumni {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub fields: AlumniChanges,
}

impl NewAlumni {
    pub fn into_active_model(self, id: String, now: i64) -> alumni::ActiveModel {
        let mut active = alumni::ActiveModel {
            id: Set(id),
            first_name: Set(self.first_name),
            last_name: Set(self.last_name),
            email: Set(self.email),
            graduation_year: Set(None),
            diploma: Set(None),
            city: Set(None),
            company: Set(None),
            job_title: Set(None),
            phone: Set(None),
            linkedin_url: Set(None),
            avatar_url: Set(None),
            is_active: Set(true),
            status: Set(AlumniStatus::Unlinked),
            created_at: Set(now),
            updated_at: Set(now),
        };
        self.fields.apply(&mut active);
        active
    }
}

/// Which fields a caller may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    /// Administrators: every mutable field, including `isActive` and `status`.
    Admin,
    /// Profile owners proposing changes: descriptive fields only.
    Owner,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Turn `validator` errors into issues keyed by payload name.
///
/// `fields` maps struct fields to payload keys and fixes the order; the
/// first message of each field is kept.
pub fn issues_from(errors: &ValidationErrors, fields: &[(&str, &str)]) -> Vec<Issue> {
    let by_field = errors.field_errors();
    fields
        .iter()
        .filter_map(|&(name, key)| {
            let first = by_field.get(name)?.first()?;
            let message = first
                .message
                .as_deref()
                .map(str::to_string)
                .unwrap_or_else(|| first.code.to_string());
            Some(Issue::new(key, message))
        })
        .collect()
}

fn field_rank(issue: &Issue) -> usize {
    issue
        .path
        .first()
        .and_then(|key| PROFILE_FIELDS.iter().position(|(_, k)| *k == key.as_str()))
        .unwrap_or(PROFILE_FIELDS.len())
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        Error::Validation(vec![Issue {
            path: Vec::new(),
            message: "Objet JSON attendu".to_string(),
        }])
    })
}

/// Reads payload values into a [`ProfileInput`], recording type errors.
struct Decoder<'a> {
    obj: &'a Map<String, Value>,
    issues: Vec<Issue>,
}

impl<'a> Decoder<'a> {
    fn new(value: &'a Value) -> Result<Self> {
        Ok(Self {
            obj: as_object(value)?,
            issues: Vec::new(),
        })
    }

    /// Trimmed name. Anything but a string decodes to `""` so the length
    /// rule reports it.
    fn name(&self, key: &str) -> Option<String> {
        self.obj.get(key).map(|value| match value {
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        })
    }

    fn email(&self) -> String {
        match self.obj.get("email") {
            Some(Value::String(s)) => normalize_email(s),
            _ => String::new(),
        }
    }

    fn text(&mut self, key: &str) -> Option<Option<String>> {
        let obj = self.obj;
        match obj.get(key)? {
            Value::Null => Some(None),
            Value::String(s) => {
                let s = s.trim();
                Some((!s.is_empty()).then(|| s.to_string()))
            }
            _ => {
                self.issues.push(Issue::new(key, "Chaîne de caractères attendue"));
                None
            }
        }
    }

    /// An integer or a numeric string; null and blank clear the year.
    fn graduation_year(&mut self) -> Option<Option<i32>> {
        let obj = self.obj;
        let parsed = match obj.get("graduationYear")? {
            Value::Null => return Some(None),
            Value::String(s) if s.trim().is_empty() => return Some(None),
            Value::String(s) => s.trim().parse::<i32>().ok(),
            Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            _ => None,
        };
        match parsed {
            Some(year) => Some(Some(year)),
            None => {
                self.issues.push(Issue::new("graduationYear", GRADUATION_YEAR_MESSAGE));
                None
            }
        }
    }

    fn descriptive_fields(&mut self, input: &mut ProfileInput) {
        input.graduation_year = self.graduation_year();
        input.diploma = self.text("diploma");
        input.city = self.text("city");
        input.company = self.text("company");
        input.job_title = self.text("jobTitle");
        input.phone = self.text("phone");
        input.linkedin_url = self.text("linkedinUrl");
        input.avatar_url = self.text("avatarUrl");
    }

    fn admin_fields(&mut self, input: &mut ProfileInput) {
        let obj = self.obj;
        match obj.get("isActive") {
            None | Some(Value::Null) => {}
            Some(Value::Bool(b)) => input.is_active = Some(*b),
            Some(_) => self.issues.push(Issue::new("isActive", "Booléen attendu")),
        }
        match obj.get("status") {
            None | Some(Value::Null) => {}
            Some(value) => match value.as_str().and_then(AlumniStatus::parse) {
                Some(status) => input.status = Some(status),
                None => self.issues.push(Issue::new("status", "Statut invalide")),
            },
        }
    }

    /// Run the declarative rules and merge their issues with decode errors.
    fn finish(mut self, input: ProfileInput) -> Result<ProfileInput> {
        if let Err(errors) = input.validate() {
            self.issues.extend(issues_from(&errors, &PROFILE_FIELDS));
        }
        // The upper bound moves with the calendar.
        if let Some(Some(year)) = input.graduation_year {
            if year > current_year() {
                self.issues.push(Issue::new("graduationYear", GRADUATION_YEAR_MESSAGE));
            }
        }

        if self.issues.is_empty() {
            return Ok(input);
        }
        self.issues.sort_by_key(field_rank);
        Err(Error::Validation(self.issues))
    }
}

/// Validate a profile creation payload (manual creation and import rows).
pub fn parse_new_alumni(value: &Value) -> Result<NewAlumni> {
    let mut decoder = Decoder::new(value)?;
    let mut input = ProfileInput {
        first_name: Some(decoder.name("firstName").unwrap_or_default()),
        last_name: Some(decoder.name("lastName").unwrap_or_default()),
        email: Some(decoder.email()),
        ..ProfileInput::default()
    };
    decoder.descriptive_fields(&mut input);
    decoder.admin_fields(&mut input);

    let (email, mut fields) = decoder.finish(input)?.into_changes();
    Ok(NewAlumni {
        email: email.unwrap_or_default(),
        first_name: fields.first_name.take().unwrap_or_default(),
        last_name: fields.last_name.take().unwrap_or_default(),
        fields,
    })
}

/// Validate a partial update. `email` is never writable and is ignored.
pub fn parse_alumni_changes(value: &Value, scope: FieldScope) -> Result<AlumniChanges> {
    let mut decoder = Decoder::new(value)?;
    let mut input = ProfileInput {
        first_name: decoder.name("firstName"),
        last_name: decoder.name("lastName"),
        ..ProfileInput::default()
    };
    decoder.descriptive_fields(&mut input);
    if scope == FieldScope::Admin {
        decoder.admin_fields(&mut input);
    }

    let (_, changes) = decoder.finish(input)?.into_changes();
    Ok(changes)
}

/// First issue message, used as the skip reason of an import row.
pub fn first_issue_message(err: &Error) -> String {
    err.issues()
        .and_then(|issues| issues.first())
        .map(|issue| issue.message.clone())
        .unwrap_or_else(|| err.public_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_fields(err: Error) -> Vec<String> {
        match err {
            Error::Validation(issues) => issues.into_iter().flat_map(|i| i.path).collect(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepts_minimal_profile() {
        let parsed = parse_new_alumni(&json!({
            "firstName": " Marie ",
            "lastName": "Curie",
            "email": "Marie.Curie@Example.org",
        }))
        .unwrap();

        assert_eq!(parsed.first_name, "Marie");
        assert_eq!(parsed.email, "marie.curie@example.org");
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn reports_every_problem_in_field_order() {
        let err = parse_new_alumni(&json!({
            "linkedinUrl": "not a url",
            "graduationYear": 1850,
            "email": "not-an-email",
            "firstName": "M",
            "city": 42,
        }))
        .unwrap_err();

        assert_eq!(
            issue_fields(err),
            vec!["firstName", "lastName", "email", "graduationYear", "city", "linkedinUrl"]
        );
    }

    #[test]
    fn name_messages_are_french() {
        let err = parse_new_alumni(&json!({
            "firstName": "M",
            "lastName": "Curie",
            "email": "marie@example.org",
        }))
        .unwrap_err();
        assert_eq!(
            first_issue_message(&err),
            "Le prénom doit contenir au moins 2 caractères"
        );
    }

    #[test]
    fn empty_urls_and_strings_clear_fields() {
        let parsed = parse_new_alumni(&json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.org",
            "linkedinUrl": "",
            "city": "  ",
            "avatarUrl": null,
            "graduationYear": "2015",
            "status": "invited",
        }))
        .unwrap();

        assert_eq!(parsed.fields.linkedin_url, Some(None));
        assert_eq!(parsed.fields.city, Some(None));
        assert_eq!(parsed.fields.avatar_url, Some(None));
        assert_eq!(parsed.fields.phone, None);
        assert_eq!(parsed.fields.graduation_year, Some(Some(2015)));
        assert_eq!(parsed.fields.status, Some(AlumniStatus::Invited));
    }

    #[test]
    fn graduation_year_bounds() {
        let err = parse_alumni_changes(
            &json!({ "graduationYear": current_year() + 1 }),
            FieldScope::Admin,
        )
        .unwrap_err();
        assert_eq!(issue_fields(err), vec!["graduationYear"]);

        let err = parse_alumni_changes(&json!({ "graduationYear": 1899 }), FieldScope::Admin)
            .unwrap_err();
        assert_eq!(first_issue_message(&err), "Année de promotion invalide");

        let changes =
            parse_alumni_changes(&json!({ "graduationYear": 1900 }), FieldScope::Admin).unwrap();
        assert_eq!(changes.graduation_year, Some(Some(1900)));
    }

    #[test]
    fn owner_scope_ignores_admin_fields_and_email() {
        let changes = parse_alumni_changes(
            &json!({
                "company": "CNRS",
                "status": "registered",
                "isActive": false,
                "email": "x@y.z",
            }),
            FieldScope::Owner,
        )
        .unwrap();

        assert_eq!(changes.company, Some(Some("CNRS".to_string())));
        assert_eq!(changes.status, None);
        assert_eq!(changes.is_active, None);
    }

    #[test]
    fn partial_update_leaves_absent_names_alone() {
        let changes =
            parse_alumni_changes(&json!({ "phone": "0102030405" }), FieldScope::Admin).unwrap();
        assert_eq!(changes.first_name, None);
        assert_eq!(changes.phone, Some(Some("0102030405".to_string())));

        let err = parse_alumni_changes(&json!({ "lastName": null }), FieldScope::Admin)
            .unwrap_err();
        assert_eq!(issue_fields(err), vec!["lastName"]);
    }

    #[test]
    fn email_shapes() {
        let email_ok = |raw: &str| {
            parse_new_alumni(&json!({ "firstName": "Ada", "lastName": "Lovelace", "email": raw }))
                .is_ok()
        };
        assert!(email_ok("a@b.fr"));
        assert!(email_ok(" A@B.FR "));
        assert!(!email_ok("@b.fr"));
        assert!(!email_ok("a b@c.fr"));
        assert!(!email_ok("a@b@c.fr"));
        assert!(!email_ok("a@b..c"));
    }

    #[test]
    fn http_urls_only_for_scraping() {
        assert!(is_valid_http_url("https://www.linkedin.com/in/ada"));
        assert!(!is_valid_http_url("ftp://example.org/x"));
        assert!(!is_valid_http_url("linkedin.com/in/ada"));
    }
}
