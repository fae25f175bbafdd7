//! Spreadsheet sync runs and issue resolution

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use flock_common::auth::Permission;
use flock_common::db::models::{SyncDataset, SyncIssue, SyncRun};
use serde::{Deserialize, Serialize};

use super::auth::CurrentUser;
use crate::db::sync::{self as sync_db, IssueFilter};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::sync::{resolve_issue, run_sync, ResolveOutcome, ResolveRequest, SyncContext, SyncSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RowsRequest {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: SyncRun,
    pub issues: Vec<SyncIssue>,
}

/// Write permission a dataset's rows need on top of RunSync
fn dataset_permission(dataset: SyncDataset) -> Permission {
    match dataset {
        SyncDataset::Members => Permission::WriteMembers,
        SyncDataset::Tithes => Permission::WriteFinance,
        SyncDataset::Attendance => Permission::WriteAttendance,
    }
}

fn require_sync(user: &CurrentUser, dataset: SyncDataset) -> ApiResult<()> {
    user.require(Permission::RunSync)?;
    user.require(dataset_permission(dataset))
}

fn parse_dataset(raw: &str) -> ApiResult<SyncDataset> {
    raw.parse::<SyncDataset>()
        .map_err(|_| ApiError::BadRequest(format!("unknown dataset '{}' (members, tithes or attendance)", raw)))
}

fn context<'a>(state: &'a AppState, user: &'a CurrentUser) -> SyncContext<'a> {
    SyncContext {
        pool: &state.db,
        country_code: &state.config.sms.default_country_code,
        user_id: Some(&user.id),
    }
}

/// POST /api/sync/:dataset
///
/// Pulls the configured range for the dataset from the spreadsheet.
pub async fn sync_from_sheet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(dataset): Path<String>,
) -> ApiResult<Json<SyncSummary>> {
    let dataset = parse_dataset(&dataset)?;
    require_sync(&user, dataset)?;

    let source = state
        .sheets
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("no spreadsheet is configured".to_string()))?;

    let sheets = &state.config.sheets;
    let range = match dataset {
        SyncDataset::Members => &sheets.members_range,
        SyncDataset::Tithes => &sheets.tithes_range,
        SyncDataset::Attendance => &sheets.attendance_range,
    };

    let rows = source.fetch_rows(range).await?;
    let summary = run_sync(&context(&state, &user), dataset, &source.describe(range), rows).await?;
    Ok(Json(summary))
}

/// POST /api/sync/:dataset/rows
///
/// Same import, with the rows (header first) supplied in the body.
pub async fn sync_from_rows(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(dataset): Path<String>,
    Json(payload): Json<RowsRequest>,
) -> ApiResult<Json<SyncSummary>> {
    let dataset = parse_dataset(&dataset)?;
    require_sync(&user, dataset)?;
    let summary = run_sync(&context(&state, &user), dataset, "upload", payload.rows).await?;
    Ok(Json(summary))
}

/// GET /api/sync/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<SyncRun>>> {
    user.require(Permission::RunSync)?;
    Ok(Json(sync_db::list_runs(&state.db, query.page, query.page_size).await?))
}

/// GET /api/sync/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<RunDetail>> {
    user.require(Permission::RunSync)?;
    let run = sync_db::get_run(&state.db, &id).await?;
    let issues = sync_db::issues_for_run(&state.db, &id).await?;
    Ok(Json(RunDetail { run, issues }))
}

/// GET /api/sync/issues
pub async fn list_issues(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<IssueFilter>,
) -> ApiResult<Json<Page<SyncIssue>>> {
    user.require(Permission::RunSync)?;
    Ok(Json(sync_db::list_issues(&state.db, &filter).await?))
}

/// POST /api/sync/issues/:id/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveOutcome>> {
    let issue = sync_db::get_issue(&state.db, &id).await?;
    require_sync(&user, issue.dataset)?;
    Ok(Json(resolve_issue(&context(&state, &user), &id, payload).await?))
}

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync/runs", get(list_runs))
        .route("/api/sync/runs/:id", get(get_run))
        .route("/api/sync/issues", get(list_issues))
        .route("/api/sync/issues/:id/resolve", post(resolve))
        .route("/api/sync/:dataset", post(sync_from_sheet))
        .route("/api/sync/:dataset/rows", post(sync_from_rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_permission() {
        assert_eq!(dataset_permission(SyncDataset::Members), Permission::WriteMembers);
        assert_eq!(dataset_permission(SyncDataset::Tithes), Permission::WriteFinance);
        assert_eq!(dataset_permission(SyncDataset::Attendance), Permission::WriteAttendance);
    }

    #[test]
    fn test_parse_dataset() {
        assert_eq!(parse_dataset("Tithes").unwrap(), SyncDataset::Tithes);
        assert!(matches!(parse_dataset("offerings"), Err(ApiError::BadRequest(_))));
    }
}
