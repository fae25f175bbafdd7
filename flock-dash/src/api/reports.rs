//! Dashboard summary and reports

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{Datelike, NaiveDate};
use flock_common::auth::Permission;
use flock_common::time::today;
use serde::Deserialize;

use super::auth::CurrentUser;
use crate::db::reports::{
    self, AttendanceReport, Birthday, Dashboard, FinanceReport, GivingStatement, MembershipReport,
};
use crate::error::ApiResult;
use crate::validation::date_range;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: Option<u32>,
}

/// GET /api/dashboard
///
/// Money totals are left out for roles without finance access.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Dashboard>> {
    user.require(Permission::ReadReports)?;
    let mut dashboard = reports::dashboard(&state.db).await?;
    if !user.can(Permission::ReadFinance) {
        dashboard.this_month = None;
    }
    Ok(Json(dashboard))
}

/// GET /api/reports/finance
pub async fn finance_report(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<FinanceReport>> {
    user.require(Permission::ReadFinance)?;
    let (from, to) = date_range(query.from, query.to)?;
    Ok(Json(reports::finance_report(&state.db, from, to).await?))
}

/// GET /api/reports/attendance
pub async fn attendance_report(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<AttendanceReport>> {
    user.require(Permission::ReadReports)?;
    let (from, to) = date_range(query.from, query.to)?;
    Ok(Json(reports::attendance_report(&state.db, from, to).await?))
}

/// GET /api/reports/membership
pub async fn membership_report(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Json<MembershipReport>> {
    user.require(Permission::ReadReports)?;
    let year = query.year.unwrap_or_else(|| today().year());
    Ok(Json(reports::membership_report(&state.db, year).await?))
}

/// GET /api/reports/giving/:member_id
pub async fn giving_statement(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(member_id): Path<String>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Json<GivingStatement>> {
    user.require(Permission::ReadFinance)?;
    let year = query.year.unwrap_or_else(|| today().year());
    Ok(Json(reports::giving_statement(&state.db, &member_id, year).await?))
}

/// GET /api/reports/birthdays
pub async fn birthdays(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<Vec<Birthday>>> {
    user.require(Permission::ReadReports)?;
    let month = query.month.unwrap_or_else(|| today().month());
    Ok(Json(reports::birthdays_in_month(&state.db, month).await?))
}

pub fn reports_routes() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/api/reports/finance", get(finance_report))
        .route("/api/reports/attendance", get(attendance_report))
        .route("/api/reports/membership", get(membership_report))
        .route("/api/reports/giving/:member_id", get(giving_statement))
        .route("/api/reports/birthdays", get(birthdays))
}
