//! Read-only aggregations over active profiles.

use std::sync::OnceLock;

use entity::alumni::{self, AlumniStatus};
use regex::Regex;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select,
};
use serde::Serialize;

use crate::error::Result;
use crate::util::{percent, ts_to_rfc3339};

pub const RECENT_LIMIT: usize = 5;
pub const TOP_LIMIT: usize = 10;

const FREELANCE_PATTERN: &str =
    r"(?i)freelance|self.?employed|independant|auto.?entrepreneur|autoentrepreneur";

fn freelance_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FREELANCE_PATTERN).expect("freelance pattern compiles"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub unlinked: u64,
    pub invited: u64,
    pub registered: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAlumni {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: AlumniStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub total: u64,
    pub by_status: StatusCounts,
    pub activation_rate: u64,
    pub recent_alumni: Vec<RecentAlumni>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CityCount {
    pub city: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyCount {
    pub company: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiplomaCount {
    pub diploma: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: u64,
    pub by_status: StatusCounts,
    pub activation_rate: u64,
    pub employment_rate: u64,
    pub freelance_rate: u64,
    pub by_graduation_year: Vec<YearCount>,
    pub by_city: Vec<CityCount>,
    pub by_company: Vec<CompanyCount>,
    pub by_diploma: Vec<DiplomaCount>,
    pub by_created_year: Vec<YearCount>,
    pub recent_alumni: Vec<RecentAlumni>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn as_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn status_counts(rows: &[(AlumniStatus, i64)]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for (status, n) in rows {
        let n = as_count(*n);
        match status {
            AlumniStatus::Unlinked => counts.unlinked += n,
            AlumniStatus::Invited => counts.invited += n,
            AlumniStatus::Registered => counts.registered += n,
        }
    }
    counts
}

/// Grouped counts, most frequent first. Ties keep alphabetical order.
fn ranked(mut rows: Vec<(String, i64)>, limit: Option<usize>) -> Vec<(String, u64)> {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows.into_iter().map(|(label, n)| (label, as_count(n))).collect()
}

/// Sums the groups whose company or job title reads as self-employment.
fn freelance_count(rows: &[(Option<String>, Option<String>, i64)]) -> u64 {
    let re = freelance_regex();
    rows.iter()
        .filter(|(company, job_title, _)| {
            [company, job_title]
                .into_iter()
                .filter_map(non_empty)
                .any(|v| re.is_match(v))
        })
        .map(|(_, _, n)| as_count(*n))
        .sum()
}

fn recent_alumni(profiles: Vec<alumni::Model>) -> Vec<RecentAlumni> {
    profiles
        .into_iter()
        .map(|p| RecentAlumni {
            created_at: ts_to_rfc3339(p.created_at),
            id: p.id,
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            status: p.status,
        })
        .collect()
}

fn active() -> Select<alumni::Entity> {
    alumni::Entity::find().filter(alumni::Column::IsActive.eq(true))
}

fn filled(col: alumni::Column) -> Condition {
    Condition::all().add(col.is_not_null()).add(col.ne(""))
}

fn row_count() -> SimpleExpr {
    Expr::col(alumni::Column::Id).count()
}

fn created_year() -> SimpleExpr {
    Expr::cust("CAST(strftime('%Y', created_at, 'unixepoch') AS INTEGER)")
}

async fn count_by_status(db: &DatabaseConnection) -> Result<StatusCounts> {
    let rows: Vec<(AlumniStatus, i64)> = active()
        .select_only()
        .column(alumni::Column::Status)
        .column_as(row_count(), "count")
        .group_by(alumni::Column::Status)
        .into_tuple()
        .all(db)
        .await?;
    Ok(status_counts(&rows))
}

async fn count_by_label(
    db: &DatabaseConnection,
    col: alumni::Column,
    limit: Option<usize>,
) -> Result<Vec<(String, u64)>> {
    let rows: Vec<(String, i64)> = active()
        .filter(filled(col))
        .select_only()
        .column(col)
        .column_as(row_count(), "count")
        .group_by(col)
        .into_tuple()
        .all(db)
        .await?;
    Ok(ranked(rows, limit))
}

async fn count_by_year(db: &DatabaseConnection, year: SimpleExpr) -> Result<Vec<YearCount>> {
    let rows: Vec<(i32, i64)> = active()
        .select_only()
        .column_as(year.clone(), "year")
        .column_as(row_count(), "count")
        .filter(Expr::expr(year.clone()).is_not_null())
        .group_by(year.clone())
        .order_by_asc(year)
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(year, n)| YearCount { year, count: as_count(n) })
        .collect())
}

async fn count_freelance(db: &DatabaseConnection) -> Result<u64> {
    let rows: Vec<(Option<String>, Option<String>, i64)> = active()
        .filter(
            Condition::any()
                .add(filled(alumni::Column::Company))
                .add(filled(alumni::Column::JobTitle)),
        )
        .select_only()
        .column(alumni::Column::Company)
        .column(alumni::Column::JobTitle)
        .column_as(row_count(), "count")
        .group_by(alumni::Column::Company)
        .group_by(alumni::Column::JobTitle)
        .into_tuple()
        .all(db)
        .await?;
    Ok(freelance_count(&rows))
}

async fn load_recent(db: &DatabaseConnection) -> Result<Vec<RecentAlumni>> {
    let profiles = active()
        .order_by_desc(alumni::Column::CreatedAt)
        .order_by_desc(alumni::Column::Id)
        .limit(RECENT_LIMIT as u64)
        .all(db)
        .await?;
    Ok(recent_alumni(profiles))
}

pub async fn load_basic_stats(db: &DatabaseConnection) -> Result<BasicStats> {
    let by_status = count_by_status(db).await?;
    let total = by_status.unlinked + by_status.invited + by_status.registered;
    Ok(BasicStats {
        total,
        activation_rate: percent(by_status.registered, total),
        by_status,
        recent_alumni: load_recent(db).await?,
    })
}

pub async fn load_dashboard_stats(db: &DatabaseConnection) -> Result<DashboardStats> {
    let basic = load_basic_stats(db).await?;
    let total = basic.total;

    let employed = active()
        .filter(filled(alumni::Column::Company))
        .filter(filled(alumni::Column::JobTitle))
        .count(db)
        .await?;
    let freelance = count_freelance(db).await?;

    let by_city = count_by_label(db, alumni::Column::City, Some(TOP_LIMIT))
        .await?
        .into_iter()
        .map(|(city, count)| CityCount { city, count })
        .collect();
    let by_company = count_by_label(db, alumni::Column::Company, Some(TOP_LIMIT))
        .await?
        .into_iter()
        .map(|(company, count)| CompanyCount { company, count })
        .collect();
    let by_diploma = count_by_label(db, alumni::Column::Diploma, None)
        .await?
        .into_iter()
        .map(|(diploma, count)| DiplomaCount { diploma, count })
        .collect();

    Ok(DashboardStats {
        total,
        by_status: basic.by_status,
        activation_rate: basic.activation_rate,
        employment_rate: percent(employed, total),
        freelance_rate: percent(freelance, total),
        by_graduation_year: count_by_year(db, Expr::col(alumni::Column::GraduationYear).into())
            .await?,
        by_city,
        by_company,
        by_diploma,
        by_created_year: count_by_year(db, created_year()).await?,
        recent_alumni: basic.recent_alumni,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_connect_and_migrate;
    use sea_orm::{ActiveModelTrait, Set};

    fn labels(rows: &[(&str, i64)]) -> Vec<(String, i64)> {
        rows.iter().map(|(l, n)| (l.to_string(), *n)).collect()
    }

    #[test]
    fn ranking_breaks_ties_alphabetically() {
        let out = ranked(labels(&[("Paris", 2), ("Nantes", 1), ("Lyon", 2)]), None);
        assert_eq!(
            out,
            vec![("Lyon".to_string(), 2), ("Paris".to_string(), 2), ("Nantes".to_string(), 1)]
        );
        assert_eq!(ranked(labels(&[("a", 1), ("b", 1)]), Some(1)).len(), 1);
    }

    #[test]
    fn freelance_groups_match_company_or_title() {
        let rows = vec![
            (Some("Freelance".to_string()), Some("Développeuse".to_string()), 2),
            (None, Some("Auto-entrepreneur".to_string()), 1),
            (Some("Acme".to_string()), Some("CTO".to_string()), 4),
            (Some(String::new()), None, 3),
        ];
        assert_eq!(freelance_count(&rows), 3);
    }

    async fn insert(
        db: &DatabaseConnection,
        id: &str,
        status: AlumniStatus,
        created_at: i64,
        edit: impl FnOnce(&mut alumni::ActiveModel),
    ) {
        let mut model = alumni::ActiveModel {
            id: Set(id.to_string()),
            first_name: Set("Prénom".to_string()),
            last_name: Set(format!("Nom {id}")),
            email: Set(format!("{id}@example.org")),
            graduation_year: Set(None),
            diploma: Set(None),
            city: Set(None),
            company: Set(None),
            job_title: Set(None),
            phone: Set(None),
            linkedin_url: Set(None),
            avatar_url: Set(None),
            is_active: Set(true),
            status: Set(status),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        };
        edit(&mut model);
        model.insert(db).await.unwrap();
    }

    #[tokio::test]
    async fn empty_directory() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        let stats = load_dashboard_stats(&db).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.activation_rate, 0);
        assert_eq!(stats.employment_rate, 0);
        assert!(stats.by_created_year.is_empty());
        assert!(stats.recent_alumni.is_empty());
    }

    #[tokio::test]
    async fn activation_rate_and_recent() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        for i in 0..7 {
            let status = if i < 2 { AlumniStatus::Registered } else { AlumniStatus::Unlinked };
            insert(&db, &format!("p{i}"), status, 1_700_000_000 + i, |_| {}).await;
        }
        insert(&db, "gone", AlumniStatus::Registered, 1_800_000_000, |m| {
            m.is_active = Set(false);
        })
        .await;

        let stats = load_basic_stats(&db).await.unwrap();
        assert_eq!(stats.total, 7);
        assert_eq!(stats.by_status.registered, 2);
        assert_eq!(stats.by_status.unlinked, 5);
        // 2 / 7 = 28.57 %
        assert_eq!(stats.activation_rate, 29);
        assert_eq!(stats.recent_alumni.len(), RECENT_LIMIT);
        assert_eq!(stats.recent_alumni[0].id, "p6");
    }

    #[tokio::test]
    async fn dashboard_breakdowns() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        // 2021-01-01
        insert(&db, "a", AlumniStatus::Unlinked, 1_609_459_200, |m| {
            m.company = Set(Some("Freelance".into()));
            m.job_title = Set(Some("Développeuse".into()));
            m.city = Set(Some("Lyon".into()));
            m.graduation_year = Set(Some(2019));
            m.diploma = Set(Some("Master".into()));
        })
        .await;
        // 2022-01-01
        insert(&db, "b", AlumniStatus::Invited, 1_640_995_200, |m| {
            m.job_title = Set(Some("Auto-entrepreneur".into()));
            m.city = Set(Some("Paris".into()));
            m.graduation_year = Set(Some(2015));
            m.diploma = Set(Some("Master".into()));
        })
        .await;
        insert(&db, "c", AlumniStatus::Registered, 1_640_995_300, |m| {
            m.company = Set(Some("Acme".into()));
            m.job_title = Set(Some("CTO".into()));
            m.city = Set(Some("Paris".into()));
            m.diploma = Set(Some("Licence".into()));
        })
        .await;
        insert(&db, "d", AlumniStatus::Unlinked, 1_640_995_400, |m| {
            m.city = Set(Some(String::new()));
        })
        .await;

        let stats = load_dashboard_stats(&db).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.employment_rate, 50);
        assert_eq!(stats.freelance_rate, 50);
        assert_eq!(
            stats.by_graduation_year,
            vec![YearCount { year: 2015, count: 1 }, YearCount { year: 2019, count: 1 }]
        );
        assert_eq!(
            stats.by_city,
            vec![
                CityCount { city: "Paris".into(), count: 2 },
                CityCount { city: "Lyon".into(), count: 1 },
            ]
        );
        assert_eq!(stats.by_company.len(), 2);
        assert_eq!(stats.by_diploma[0], DiplomaCount { diploma: "Master".into(), count: 2 });
        assert_eq!(
            stats.by_created_year,
            vec![YearCount { year: 2021, count: 1 }, YearCount { year: 2022, count: 3 }]
        );
    }

    #[tokio::test]
    async fn top_lists_are_capped() {
        let db = db_connect_and_migrate("sqlite::memory:").await.unwrap();
        for i in 0..15 {
            insert(&db, &format!("p{i}"), AlumniStatus::Unlinked, i, |m| {
                m.city = Set(Some(format!("Ville {i:02}")));
            })
            .await;
        }
        let stats = load_dashboard_stats(&db).await.unwrap();
        assert_eq!(stats.by_city.len(), TOP_LIMIT);
        assert_eq!(stats.by_city[0].city, "Ville 00");
    }
}
