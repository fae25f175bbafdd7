//! Sync runs and issue resolution
//!
//! A run walks the sheet once, top to bottom. Each row is validated,
//! matched against existing members, classified, and inserted when it is
//! neither a duplicate nor invalid. Rows that are not inserted become open
//! sync issues that an operator later overwrites, force-creates or dismisses.

use std::collections::HashMap;

use chrono::NaiveDate;
use flock_common::db::models::{IssueKind, IssueStatus, SyncDataset, SyncIssue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::columns::{check_headers, extract_fields, is_blank_row, row_payload, Field};
use super::matcher::{MatchOutcome, MemberIndex};
use super::rows::{parse_attendance, parse_member, parse_tithe, AttendanceRow, Identity, MemberRow, TitheRow};
use crate::db::finance::{self, TitheInput};
use crate::db::members::{self, MemberIdentity, MemberInput};
use crate::db::sync::{self as sync_db, NewIssue, RunCounts};
use crate::db::{attendance, departments};
use crate::error::{ApiError, ApiResult};

/// Who is running the sync and how phones are normalised
#[derive(Debug, Clone, Copy)]
pub struct SyncContext<'a> {
    pub pool: &'a SqlitePool,
    pub country_code: &'a str,
    pub user_id: Option<&'a str>,
}

/// Response for a completed run
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub run_id: String,
    pub dataset: SyncDataset,
    pub source: String,
    pub total_rows: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub invalid: i64,
    pub failed: i64,
    pub issues: Vec<SyncIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAction {
    Overwrite,
    ForceCreate,
    Dismiss,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub action: ResolveAction,
    /// Amended row (header -> cell) replacing the stored payload
    #[serde(default)]
    pub row: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct ResolveOutcome {
    pub issue: SyncIssue,
    /// Member, tithe or service touched by the resolution
    pub record_id: Option<String>,
}

#[derive(Debug)]
enum RowOutcome {
    Inserted,
    Skipped {
        kind: IssueKind,
        reason: String,
        existing_id: Option<String>,
    },
}

impl RowOutcome {
    fn invalid(reason: impl Into<String>) -> Self {
        RowOutcome::Skipped {
            kind: IssueKind::Invalid,
            reason: reason.into(),
            existing_id: None,
        }
    }

    fn duplicate(reason: impl Into<String>, existing_id: String) -> Self {
        RowOutcome::Skipped {
            kind: IssueKind::Duplicate,
            reason: reason.into(),
            existing_id: Some(existing_id),
        }
    }

    fn failed(err: ApiError) -> Self {
        RowOutcome::Skipped {
            kind: IssueKind::Failed,
            reason: format!("import failed: {}", err),
            existing_id: None,
        }
    }
}

type Fields = HashMap<Field, String>;

// ========================================
// Runs
// ========================================

/// Import `rows` (header row first) into `dataset`
///
/// A missing required column rejects the whole sheet before any row is
/// touched. Blank rows are skipped and not counted. Once the run has started,
/// a database error on one row marks that row failed and the run goes on.
pub async fn run_sync(
    ctx: &SyncContext<'_>,
    dataset: SyncDataset,
    source: &str,
    rows: Vec<Vec<String>>,
) -> ApiResult<SyncSummary> {
    let mut rows = rows.into_iter();
    let headers: Vec<String> = rows
        .next()
        .filter(|h| !is_blank_row(h))
        .ok_or_else(|| ApiError::BadRequest("sheet has no header row".to_string()))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    check_headers(dataset, &headers).map_err(ApiError::BadRequest)?;

    let mut index = MemberIndex::new(members::all_identities(ctx.pool).await?);
    let run_id = sync_db::start_run(ctx.pool, dataset, source, ctx.user_id).await?;
    info!(run_id = %run_id, dataset = %dataset, source, members = index.len(), "Sync run started");

    let mut counts = RunCounts::default();
    let mut issues = Vec::new();

    for (i, row) in rows.enumerate() {
        if is_blank_row(&row) {
            continue;
        }
        // Sheet row number; the header is row 1
        let row_number = i as i64 + 2;
        counts.total_rows += 1;

        let payload = row_payload(&headers, &row);
        let fields = extract_fields(&payload);

        let outcome = match dataset {
            SyncDataset::Members => import_member(ctx, &mut index, &fields).await,
            SyncDataset::Tithes => import_tithe(ctx, &index, &fields).await,
            SyncDataset::Attendance => import_attendance(ctx, &index, &fields).await,
        }
        .unwrap_or_else(RowOutcome::failed);

        match outcome {
            RowOutcome::Inserted => counts.inserted += 1,
            RowOutcome::Skipped {
                kind,
                reason,
                existing_id,
            } => {
                match kind {
                    IssueKind::Duplicate => counts.duplicates += 1,
                    IssueKind::Invalid => counts.invalid += 1,
                    IssueKind::Failed => {
                        warn!(run_id = %run_id, row_number, "Row import failed: {}", reason);
                        counts.failed += 1
                    }
                }
                debug!(row_number, kind = %kind, "Row skipped: {}", reason);
                let recorded = sync_db::record_issue(
                    ctx.pool,
                    &run_id,
                    &NewIssue {
                        dataset,
                        row_number,
                        kind,
                        reason: &reason,
                        payload: &payload,
                        existing_id: existing_id.as_deref(),
                    },
                )
                .await;
                match recorded {
                    Ok(issue) => issues.push(issue),
                    Err(e) => warn!(run_id = %run_id, row_number, "Could not record sync issue: {}", e),
                }
            }
        }
    }

    let run = sync_db::finish_run(ctx.pool, &run_id, counts).await?;
    info!(
        run_id = %run.id,
        total = run.total_rows,
        inserted = run.inserted,
        duplicates = run.duplicates,
        invalid = run.invalid,
        failed = run.failed,
        "Sync run finished"
    );

    Ok(SyncSummary {
        run_id: run.id,
        dataset: run.dataset,
        source: run.source,
        total_rows: run.total_rows,
        inserted: run.inserted,
        duplicates: run.duplicates,
        invalid: run.invalid,
        failed: run.failed,
        issues,
    })
}

/// Resolve a department name to its id; `Err` carries the invalid-row reason
async fn department_id(pool: &SqlitePool, name: Option<&str>) -> ApiResult<Result<Option<String>, String>> {
    let Some(name) = name else {
        return Ok(Ok(None));
    };
    Ok(match departments::find_by_name(pool, name).await? {
        Some(dept) => Ok(Some(dept.id)),
        None => Err(format!("unknown department '{}'", name)),
    })
}

fn resolve_member(index: &MemberIndex, identity: &Identity) -> Result<String, String> {
    match index.find(identity.full_name.as_deref(), identity.phone.as_deref()) {
        MatchOutcome::Found(id) => Ok(id),
        MatchOutcome::NotFound => Err("member not found".to_string()),
        MatchOutcome::Ambiguous(ids) => Err(format!("ambiguous member: {} existing members match", ids.len())),
    }
}

/// Validate a member row into insertable input
async fn member_input(ctx: &SyncContext<'_>, fields: &Fields) -> ApiResult<Result<MemberInput, String>> {
    let MemberRow { mut input, department } = match parse_member(fields, ctx.country_code) {
        Ok(row) => row,
        Err(reason) => return Ok(Err(reason)),
    };
    match department_id(ctx.pool, department.as_deref()).await? {
        Ok(id) => input.department_id = id,
        Err(reason) => return Ok(Err(reason)),
    }
    Ok(Ok(input))
}

async fn import_member(ctx: &SyncContext<'_>, index: &mut MemberIndex, fields: &Fields) -> ApiResult<RowOutcome> {
    let input = match member_input(ctx, fields).await? {
        Ok(input) => input,
        Err(reason) => return Ok(RowOutcome::invalid(reason)),
    };

    let full_name = format!("{} {}", input.first_name, input.last_name);
    match index.find(Some(&full_name), input.phone.as_deref()) {
        MatchOutcome::Found(id) => {
            return Ok(RowOutcome::duplicate("matches an existing member", id));
        }
        MatchOutcome::Ambiguous(ids) => {
            return Ok(RowOutcome::invalid(format!(
                "ambiguous member: {} existing members match",
                ids.len()
            )));
        }
        MatchOutcome::NotFound => {}
    }

    let mut conn = ctx.pool.acquire().await?;
    let member = members::insert_member(&mut conn, &input).await?;
    index.push(MemberIdentity {
        id: member.id,
        first_name: member.first_name,
        last_name: member.last_name,
        phone: member.phone,
    });
    Ok(RowOutcome::Inserted)
}

fn tithe_input(row: TitheRow, member_id: String) -> TitheInput {
    TitheInput {
        member_id,
        amount_cents: row.amount_cents,
        paid_on: row.paid_on,
        method: Some(row.method),
        reference: row.reference,
        notes: row.notes,
    }
}

async fn import_tithe(ctx: &SyncContext<'_>, index: &MemberIndex, fields: &Fields) -> ApiResult<RowOutcome> {
    let row = match parse_tithe(fields, ctx.country_code) {
        Ok(row) => row,
        Err(reason) => return Ok(RowOutcome::invalid(reason)),
    };
    let member_id = match resolve_member(index, &row.identity) {
        Ok(id) => id,
        Err(reason) => return Ok(RowOutcome::invalid(reason)),
    };

    if let Some(existing) = finance::tithe_exists(ctx.pool, &member_id, row.paid_on, row.amount_cents).await? {
        return Ok(RowOutcome::duplicate(
            "tithe with the same member, date and amount already recorded",
            existing,
        ));
    }

    let mut conn = ctx.pool.acquire().await?;
    finance::insert_tithe(&mut conn, &tithe_input(row, member_id), ctx.user_id).await?;
    Ok(RowOutcome::Inserted)
}

/// Mark a member present, creating the service when needed; returns the service id
async fn insert_attendance(
    conn: &mut SqliteConnection,
    service_date: NaiveDate,
    service_type: &str,
    member_id: &str,
) -> ApiResult<String> {
    let service = attendance::find_or_create_service(conn, service_date, service_type).await?;
    attendance::mark_present(conn, &service.id, member_id).await?;
    Ok(service.id)
}

async fn import_attendance(ctx: &SyncContext<'_>, index: &MemberIndex, fields: &Fields) -> ApiResult<RowOutcome> {
    let AttendanceRow {
        identity,
        service_date,
        service_type,
    } = match parse_attendance(fields, ctx.country_code) {
        Ok(row) => row,
        Err(reason) => return Ok(RowOutcome::invalid(reason)),
    };
    let member_id = match resolve_member(index, &identity) {
        Ok(id) => id,
        Err(reason) => return Ok(RowOutcome::invalid(reason)),
    };

    if let Some(service) = attendance::find_service(ctx.pool, service_date, &service_type).await? {
        if attendance::is_present(ctx.pool, &service.id, &member_id).await? {
            return Ok(RowOutcome::duplicate(
                "member already marked present at this service",
                service.id,
            ));
        }
    }

    let mut tx = ctx.pool.begin().await?;
    insert_attendance(&mut tx, service_date, &service_type, &member_id).await?;
    tx.commit().await?;
    Ok(RowOutcome::Inserted)
}

// ========================================
// Resolution
// ========================================

/// A validated write, ready to run inside the claiming transaction
enum Resolution {
    Dismiss,
    Overwrite { member_id: String, row: MemberInput },
    CreateMember(MemberInput),
    CreateTithe(TitheInput),
    CreateAttendance {
        service_date: NaiveDate,
        service_type: String,
        member_id: String,
    },
}

impl Resolution {
    fn status(&self) -> IssueStatus {
        match self {
            Resolution::Dismiss => IssueStatus::Dismissed,
            Resolution::Overwrite { .. } => IssueStatus::Overwritten,
            _ => IssueStatus::Created,
        }
    }
}

/// Apply an operator decision to an open issue
///
/// The issue is claimed and the record written in one transaction, so two
/// concurrent resolutions of the same issue cannot both write.
pub async fn resolve_issue(ctx: &SyncContext<'_>, issue_id: &str, request: ResolveRequest) -> ApiResult<ResolveOutcome> {
    let issue = sync_db::get_issue(ctx.pool, issue_id).await?;
    if issue.status != IssueStatus::Open {
        return Err(ApiError::Conflict(format!("sync issue is already {}", issue.status)));
    }

    let amended = request.row;
    let payload = amended.clone().unwrap_or_else(|| issue.payload.0.clone());
    let fields = extract_fields(&payload);
    let resolution = plan_resolution(ctx, &issue, request.action, &fields).await?;
    let status = resolution.status();

    let mut tx = ctx.pool.begin().await?;
    sync_db::claim_issue(&mut tx, issue_id, status, amended.as_ref(), ctx.user_id).await?;
    let record_id = apply_resolution(&mut tx, resolution, ctx.user_id).await?;
    tx.commit().await?;

    let issue = sync_db::get_issue(ctx.pool, issue_id).await?;
    info!(issue_id, status = %issue.status, record_id = ?record_id, "Sync issue resolved");

    Ok(ResolveOutcome { issue, record_id })
}

/// Validate the row for `action` without writing anything
async fn plan_resolution(
    ctx: &SyncContext<'_>,
    issue: &SyncIssue,
    action: ResolveAction,
    fields: &Fields,
) -> ApiResult<Resolution> {
    match action {
        ResolveAction::Dismiss => Ok(Resolution::Dismiss),
        ResolveAction::Overwrite => {
            if issue.dataset != SyncDataset::Members || issue.kind != IssueKind::Duplicate {
                return Err(ApiError::BadRequest(
                    "overwrite only applies to duplicate member rows".to_string(),
                ));
            }
            let member_id = issue
                .existing_id
                .clone()
                .ok_or_else(|| ApiError::BadRequest("issue has no matched member".to_string()))?;
            let row = member_input(ctx, fields).await?.map_err(ApiError::BadRequest)?;
            Ok(Resolution::Overwrite { member_id, row })
        }
        ResolveAction::ForceCreate => match issue.dataset {
            SyncDataset::Members => {
                let input = member_input(ctx, fields).await?.map_err(ApiError::BadRequest)?;
                Ok(Resolution::CreateMember(input))
            }
            SyncDataset::Tithes => {
                let row = parse_tithe(fields, ctx.country_code).map_err(ApiError::BadRequest)?;
                let index = MemberIndex::new(members::all_identities(ctx.pool).await?);
                let member_id = resolve_member(&index, &row.identity).map_err(ApiError::BadRequest)?;
                Ok(Resolution::CreateTithe(tithe_input(row, member_id)))
            }
            SyncDataset::Attendance => {
                let row = parse_attendance(fields, ctx.country_code).map_err(ApiError::BadRequest)?;
                let index = MemberIndex::new(members::all_identities(ctx.pool).await?);
                let member_id = resolve_member(&index, &row.identity).map_err(ApiError::BadRequest)?;
                Ok(Resolution::CreateAttendance {
                    service_date: row.service_date,
                    service_type: row.service_type,
                    member_id,
                })
            }
        },
    }
}

/// Run the write; returns the member, tithe or service touched
async fn apply_resolution(
    conn: &mut SqliteConnection,
    resolution: Resolution,
    user_id: Option<&str>,
) -> ApiResult<Option<String>> {
    match resolution {
        Resolution::Dismiss => Ok(None),
        Resolution::Overwrite { member_id, row } => {
            let id = overwrite_member(conn, &member_id, row).await?;
            Ok(Some(id))
        }
        Resolution::CreateMember(input) => {
            let member = members::insert_member(conn, &input).await?;
            Ok(Some(member.id))
        }
        Resolution::CreateTithe(input) => {
            let tithe = finance::insert_tithe(conn, &input, user_id).await?;
            Ok(Some(tithe.id))
        }
        Resolution::CreateAttendance {
            service_date,
            service_type,
            member_id,
        } => {
            let service_id = insert_attendance(conn, service_date, &service_type, &member_id).await?;
            Ok(Some(service_id))
        }
    }
}

/// Update the matched member with every non-blank field of the row
async fn overwrite_member(conn: &mut SqliteConnection, member_id: &str, row: MemberInput) -> ApiResult<String> {
    let existing = members::fetch_member(conn, member_id).await?;

    let merged = MemberInput {
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone.or(existing.phone),
        email: row.email.or(existing.email),
        gender: row.gender.or(existing.gender),
        date_of_birth: row.date_of_birth.or(existing.date_of_birth),
        address: row.address.or(existing.address),
        occupation: row.occupation.or(existing.occupation),
        status: row.status.or(Some(existing.status)),
        department_id: row.department_id.or(existing.department_id),
        joined_on: row.joined_on.or(existing.joined_on),
    };

    let member = members::update_member(conn, member_id, &merged).await?;
    Ok(member.id)
}
