//! Sync run and issue bookkeeping

use flock_common::db::models::{new_id, IssueKind, IssueStatus, SyncDataset, SyncIssue, SyncRun};
use flock_common::time::now;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};

/// Final counters for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounts {
    pub total_rows: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub invalid: i64,
    pub failed: i64,
}

/// A row that was not inserted
#[derive(Debug)]
pub struct NewIssue<'a> {
    pub dataset: SyncDataset,
    pub row_number: i64,
    pub kind: IssueKind,
    pub reason: &'a str,
    pub payload: &'a Map<String, Value>,
    pub existing_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub dataset: Option<SyncDataset>,
    pub run_id: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub async fn start_run(pool: &SqlitePool, dataset: SyncDataset, source: &str, started_by: Option<&str>) -> ApiResult<String> {
    let id = new_id();
    sqlx::query("INSERT INTO sync_runs (id, dataset, source, started_at, started_by) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(dataset)
        .bind(source)
        .bind(now())
        .bind(started_by)
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn finish_run(pool: &SqlitePool, run_id: &str, counts: RunCounts) -> ApiResult<SyncRun> {
    sqlx::query(
        r#"
        UPDATE sync_runs
        SET finished_at = ?, total_rows = ?, inserted = ?, duplicates = ?, invalid = ?, failed = ?
        WHERE id = ?
        "#,
    )
    .bind(now())
    .bind(counts.total_rows)
    .bind(counts.inserted)
    .bind(counts.duplicates)
    .bind(counts.invalid)
    .bind(counts.failed)
    .bind(run_id)
    .execute(pool)
    .await?;
    get_run(pool, run_id).await
}

pub async fn record_issue(pool: &SqlitePool, run_id: &str, issue: &NewIssue<'_>) -> ApiResult<SyncIssue> {
    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO sync_issues (id, run_id, dataset, row_number, kind, reason, payload, existing_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open', ?)
        "#,
    )
    .bind(&id)
    .bind(run_id)
    .bind(issue.dataset)
    .bind(issue.row_number)
    .bind(issue.kind)
    .bind(issue.reason)
    .bind(Json(issue.payload))
    .bind(issue.existing_id)
    .bind(now())
    .execute(pool)
    .await?;
    get_issue(pool, &id).await
}

pub async fn get_run(pool: &SqlitePool, id: &str) -> ApiResult<SyncRun> {
    sqlx::query_as::<_, SyncRun>("SELECT * FROM sync_runs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sync run {}", id)))
}

pub async fn list_runs(pool: &SqlitePool, page: Option<i64>, page_size: Option<i64>) -> ApiResult<Page<SyncRun>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs")
        .fetch_one(pool)
        .await?;
    let pagination = calculate_pagination(total, page, page_size);

    let items = sqlx::query_as::<_, SyncRun>("SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT ? OFFSET ?")
        .bind(pagination.page_size)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;
    Ok(Page::new(items, total, pagination))
}

pub async fn get_issue(pool: &SqlitePool, id: &str) -> ApiResult<SyncIssue> {
    sqlx::query_as::<_, SyncIssue>("SELECT * FROM sync_issues WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sync issue {}", id)))
}

pub async fn issues_for_run(pool: &SqlitePool, run_id: &str) -> ApiResult<Vec<SyncIssue>> {
    let issues = sqlx::query_as::<_, SyncIssue>("SELECT * FROM sync_issues WHERE run_id = ? ORDER BY row_number")
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    Ok(issues)
}

fn push_issue_filters(qb: &mut QueryBuilder<'static, Sqlite>, filter: &IssueFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(dataset) = filter.dataset {
        qb.push(" AND dataset = ").push_bind(dataset);
    }
    if let Some(run_id) = filter.run_id.clone() {
        qb.push(" AND run_id = ").push_bind(run_id);
    }
}

pub async fn list_issues(pool: &SqlitePool, filter: &IssueFilter) -> ApiResult<Page<SyncIssue>> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM sync_issues");
    push_issue_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, filter.page, filter.page_size);

    let mut qb = QueryBuilder::new("SELECT * FROM sync_issues");
    push_issue_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC, row_number LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let items = qb.build_query_as::<SyncIssue>().fetch_all(pool).await?;
    Ok(Page::new(items, total, pagination))
}

/// Mark an open issue resolved
///
/// The `status = 'open'` guard makes this the claim: only one resolution of
/// an issue can succeed, and the caller's writes share its transaction.
pub async fn claim_issue(
    conn: &mut SqliteConnection,
    id: &str,
    status: IssueStatus,
    payload: Option<&Map<String, Value>>,
    resolved_by: Option<&str>,
) -> ApiResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sync_issues
        SET status = ?, payload = COALESCE(?, payload), resolved_by = ?, resolved_at = ?
        WHERE id = ? AND status = 'open'
        "#,
    )
    .bind(status)
    .bind(payload.map(Json))
    .bind(resolved_by)
    .bind(now())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        let current: Option<IssueStatus> = sqlx::query_scalar("SELECT status FROM sync_issues WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match current {
            Some(current) => ApiError::Conflict(format!("sync issue is already {}", current)),
            None => ApiError::NotFound(format!("sync issue {}", id)),
        });
    }
    Ok(())
}
