//! Read-only aggregates for the dashboard and reports

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use flock_common::db::models::{Member, MemberStatus, Tithe};
use flock_common::time::{days_until_anniversary, month_start, today};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::db::attendance::ServiceSummary;
use crate::db::members::get_member;
use crate::db::shepherding::open_and_overdue_counts;
use crate::error::{ApiError, ApiResult};

/// Birthdays within this many days appear on the dashboard
pub const UPCOMING_BIRTHDAY_DAYS: i64 = 7;

#[derive(Debug, Serialize, FromRow)]
pub struct StatusCount {
    pub status: MemberStatus,
    pub count: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct MoneyTotals {
    pub tithes_cents: i64,
    pub offerings_cents: i64,
    pub expenses_cents: i64,
    pub net_cents: i64,
}

impl MoneyTotals {
    fn new(tithes_cents: i64, offerings_cents: i64, expenses_cents: i64) -> Self {
        Self {
            tithes_cents,
            offerings_cents,
            expenses_cents,
            net_cents: tithes_cents + offerings_cents - expenses_cents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Birthday {
    pub member_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    pub days_until: i64,
}

impl Birthday {
    fn from_member(member: Member, from: NaiveDate) -> Option<Self> {
        let dob = member.date_of_birth?;
        Some(Self {
            member_id: member.id,
            first_name: member.first_name,
            last_name: member.last_name,
            phone: member.phone,
            date_of_birth: dob,
            days_until: days_until_anniversary(dob, from),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub total_members: i64,
    pub members_by_status: Vec<StatusCount>,
    pub department_count: i64,
    pub new_members_this_month: i64,
    /// Omitted for users without finance access
    pub this_month: Option<MoneyTotals>,
    pub latest_service: Option<ServiceSummary>,
    pub open_follow_ups: i64,
    pub overdue_follow_ups: i64,
    pub upcoming_birthdays: Vec<Birthday>,
}

#[derive(Debug, Serialize)]
pub struct MonthTotals {
    pub month: String,
    #[serde(flatten)]
    pub totals: MoneyTotals,
}

#[derive(Debug, Serialize, FromRow)]
pub struct CategoryTotal {
    pub category: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct FinanceReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub months: Vec<MonthTotals>,
    pub expenses_by_category: Vec<CategoryTotal>,
    pub totals: MoneyTotals,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ServiceAttendance {
    pub service_id: String,
    pub service_date: NaiveDate,
    pub service_type: String,
    pub present: i64,
    pub visitors: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct AttendanceReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub services: Vec<ServiceAttendance>,
    pub average_attendance: f64,
}

#[derive(Debug, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct DepartmentCount {
    pub department_id: Option<String>,
    pub department_name: Option<String>,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MembershipReport {
    pub year: i32,
    pub joins_by_month: Vec<MonthCount>,
    pub total_joined: i64,
    pub by_status: Vec<StatusCount>,
    pub by_department: Vec<DepartmentCount>,
}

#[derive(Debug, Serialize)]
pub struct GivingStatement {
    pub member: Member,
    pub year: i32,
    pub tithes: Vec<Tithe>,
    pub by_month: Vec<MonthCount>,
    pub total_cents: i64,
}

// ========================================
// Dashboard
// ========================================

async fn status_counts(pool: &SqlitePool) -> ApiResult<Vec<StatusCount>> {
    let rows = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM members GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn money_between(pool: &SqlitePool, from: NaiveDate, to: NaiveDate) -> ApiResult<MoneyTotals> {
    let (tithes, offerings, expenses): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COALESCE(SUM(amount_cents), 0) FROM tithes WHERE paid_on BETWEEN ?1 AND ?2),
            (SELECT COALESCE(SUM(amount_cents), 0) FROM offerings WHERE service_date BETWEEN ?1 AND ?2),
            (SELECT COALESCE(SUM(amount_cents), 0) FROM expenses WHERE spent_on BETWEEN ?1 AND ?2)
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(MoneyTotals::new(tithes, offerings, expenses))
}

/// Members with a birthday in the next `UPCOMING_BIRTHDAY_DAYS` days, soonest first
pub async fn upcoming_birthdays(pool: &SqlitePool, from: NaiveDate) -> ApiResult<Vec<Birthday>> {
    let members = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE date_of_birth IS NOT NULL AND status <> 'inactive'",
    )
    .fetch_all(pool)
    .await?;

    let mut upcoming: Vec<Birthday> = members
        .into_iter()
        .filter_map(|m| Birthday::from_member(m, from))
        .filter(|b| b.days_until <= UPCOMING_BIRTHDAY_DAYS)
        .collect();
    upcoming.sort_by(|a, b| a.days_until.cmp(&b.days_until).then_with(|| a.last_name.cmp(&b.last_name)));
    Ok(upcoming)
}

pub async fn dashboard(pool: &SqlitePool) -> ApiResult<Dashboard> {
    let today = today();
    let month_from = month_start(today);

    let members_by_status = status_counts(pool).await?;
    let total_members = members_by_status.iter().map(|s| s.count).sum();

    let department_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM departments")
        .fetch_one(pool)
        .await?;

    let new_members_this_month: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE joined_on BETWEEN ? AND ?")
            .bind(month_from)
            .bind(today)
            .fetch_one(pool)
            .await?;

    let latest_service = sqlx::query_as::<_, ServiceSummary>(
        r#"
        SELECT s.*, (SELECT COUNT(*) FROM attendance a WHERE a.service_id = s.id) AS present_count
        FROM services s
        ORDER BY s.service_date DESC, s.created_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let (open_follow_ups, overdue_follow_ups) = open_and_overdue_counts(pool).await?;

    Ok(Dashboard {
        total_members,
        members_by_status,
        department_count,
        new_members_this_month,
        this_month: Some(money_between(pool, month_from, today).await?),
        latest_service,
        open_follow_ups,
        overdue_follow_ups,
        upcoming_birthdays: upcoming_birthdays(pool, today).await?,
    })
}

// ========================================
// Reports
// ========================================

async fn monthly_sums(pool: &SqlitePool, sql: &str, from: NaiveDate, to: NaiveDate) -> ApiResult<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).bind(from).bind(to).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn finance_report(pool: &SqlitePool, from: NaiveDate, to: NaiveDate) -> ApiResult<FinanceReport> {
    let tithes = monthly_sums(
        pool,
        "SELECT substr(paid_on, 1, 7) AS month, SUM(amount_cents) FROM tithes \
         WHERE paid_on BETWEEN ? AND ? GROUP BY month",
        from,
        to,
    )
    .await?;
    let offerings = monthly_sums(
        pool,
        "SELECT substr(service_date, 1, 7) AS month, SUM(amount_cents) FROM offerings \
         WHERE service_date BETWEEN ? AND ? GROUP BY month",
        from,
        to,
    )
    .await?;
    let expenses = monthly_sums(
        pool,
        "SELECT substr(spent_on, 1, 7) AS month, SUM(amount_cents) FROM expenses \
         WHERE spent_on BETWEEN ? AND ? GROUP BY month",
        from,
        to,
    )
    .await?;

    // month -> (tithes, offerings, expenses)
    let mut by_month: BTreeMap<String, (i64, i64, i64)> = BTreeMap::new();
    for (month, cents) in tithes {
        by_month.entry(month).or_default().0 += cents;
    }
    for (month, cents) in offerings {
        by_month.entry(month).or_default().1 += cents;
    }
    for (month, cents) in expenses {
        by_month.entry(month).or_default().2 += cents;
    }

    let expenses_by_category = sqlx::query_as::<_, CategoryTotal>(
        r#"
        SELECT category, SUM(amount_cents) AS amount_cents FROM expenses
        WHERE spent_on BETWEEN ? AND ?
        GROUP BY category
        ORDER BY amount_cents DESC, category
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let months: Vec<MonthTotals> = by_month
        .into_iter()
        .map(|(month, (t, o, e))| MonthTotals {
            month,
            totals: MoneyTotals::new(t, o, e),
        })
        .collect();

    let totals = MoneyTotals::new(
        months.iter().map(|m| m.totals.tithes_cents).sum(),
        months.iter().map(|m| m.totals.offerings_cents).sum(),
        months.iter().map(|m| m.totals.expenses_cents).sum(),
    );

    Ok(FinanceReport {
        from,
        to,
        months,
        expenses_by_category,
        totals,
    })
}

pub async fn attendance_report(pool: &SqlitePool, from: NaiveDate, to: NaiveDate) -> ApiResult<AttendanceReport> {
    let services = sqlx::query_as::<_, ServiceAttendance>(
        r#"
        SELECT s.id AS service_id, s.service_date, s.service_type,
               COUNT(a.member_id) AS present,
               s.visitor_count AS visitors,
               COUNT(a.member_id) + s.visitor_count AS total
        FROM services s
        LEFT JOIN attendance a ON a.service_id = s.id
        WHERE s.service_date BETWEEN ? AND ?
        GROUP BY s.id
        ORDER BY s.service_date, s.service_type
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let average_attendance = if services.is_empty() {
        0.0
    } else {
        let sum: i64 = services.iter().map(|s| s.total).sum();
        (sum as f64 / services.len() as f64 * 10.0).round() / 10.0
    };

    Ok(AttendanceReport {
        from,
        to,
        services,
        average_attendance,
    })
}

fn year_bounds(year: i32) -> ApiResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    match (start, end) {
        (Some(s), Some(e)) if (1..=9999).contains(&year) => Ok((s, e)),
        _ => Err(ApiError::BadRequest(format!("invalid year {}", year))),
    }
}

/// Twelve `YYYY-MM` buckets for `year`, zero-filled from `counts`
fn fill_months(year: i32, counts: Vec<(String, i64)>) -> Vec<MonthCount> {
    let lookup: BTreeMap<String, i64> = counts.into_iter().collect();
    (1..=12)
        .map(|m| {
            let month = format!("{:04}-{:02}", year, m);
            let count = lookup.get(&month).copied().unwrap_or(0);
            MonthCount { month, count }
        })
        .collect()
}

pub async fn membership_report(pool: &SqlitePool, year: i32) -> ApiResult<MembershipReport> {
    let (from, to) = year_bounds(year)?;

    let joins: Vec<(String, i64)> = sqlx::query_as(
        "SELECT substr(joined_on, 1, 7) AS month, COUNT(*) FROM members \
         WHERE joined_on BETWEEN ? AND ? GROUP BY month",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    let joins_by_month = fill_months(year, joins);
    let total_joined = joins_by_month.iter().map(|m| m.count).sum();

    let by_department = sqlx::query_as::<_, DepartmentCount>(
        r#"
        SELECT m.department_id, d.name AS department_name, COUNT(*) AS count
        FROM members m
        LEFT JOIN departments d ON d.id = m.department_id
        GROUP BY m.department_id
        ORDER BY d.name IS NULL, d.name COLLATE NOCASE
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(MembershipReport {
        year,
        joins_by_month,
        total_joined,
        by_status: status_counts(pool).await?,
        by_department,
    })
}

/// Year-long tithe statement for one member
pub async fn giving_statement(pool: &SqlitePool, member_id: &str, year: i32) -> ApiResult<GivingStatement> {
    let (from, to) = year_bounds(year)?;
    let member = get_member(pool, member_id).await?;

    let tithes = sqlx::query_as::<_, Tithe>(
        "SELECT * FROM tithes WHERE member_id = ? AND paid_on BETWEEN ? AND ? ORDER BY paid_on, created_at",
    )
    .bind(member_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let mut monthly: BTreeMap<String, i64> = BTreeMap::new();
    for tithe in &tithes {
        *monthly.entry(tithe.paid_on.format("%Y-%m").to_string()).or_default() += tithe.amount_cents;
    }
    let by_month = fill_months(year, monthly.into_iter().collect());
    let total_cents = tithes.iter().map(|t| t.amount_cents).sum();

    Ok(GivingStatement {
        member,
        year,
        tithes,
        by_month,
        total_cents,
    })
}

/// Members born in `month` (1-12), ordered by day
pub async fn birthdays_in_month(pool: &SqlitePool, month: u32) -> ApiResult<Vec<Birthday>> {
    if !(1..=12).contains(&month) {
        return Err(ApiError::BadRequest(format!("invalid month {}", month)));
    }
    let members = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE date_of_birth IS NOT NULL AND CAST(substr(date_of_birth, 6, 2) AS INTEGER) = ?",
    )
    .bind(month as i64)
    .fetch_all(pool)
    .await?;

    let today = today();
    let mut birthdays: Vec<Birthday> = members
        .into_iter()
        .filter_map(|m| Birthday::from_member(m, today))
        .collect();
    birthdays.sort_by(|a, b| {
        a.date_of_birth
            .day()
            .cmp(&b.date_of_birth.day())
            .then_with(|| a.last_name.cmp(&b.last_name))
    });
    Ok(birthdays)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_months_zero_fills() {
        let months = fill_months(2024, vec![("2024-03".to_string(), 4)]);
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].month, "2024-01");
        assert_eq!(months[0].count, 0);
        assert_eq!(months[2].count, 4);
    }

    #[test]
    fn test_money_totals_net() {
        let totals = MoneyTotals::new(1000, 500, 300);
        assert_eq!(totals.net_cents, 1200);
    }

    #[test]
    fn test_year_bounds_rejects_out_of_range() {
        assert!(year_bounds(0).is_err());
        assert!(year_bounds(2024).is_ok());
    }
}
