//! Shepherd designation, assignments and follow-ups

use chrono::NaiveDate;
use flock_common::db::models::{new_id, FollowUp, FollowUpKind, FollowUpStatus, Member};
use flock_common::time::{now, today};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::db::members::get_member;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};
use crate::validation::clean_opt;

#[derive(Debug, Serialize, FromRow)]
pub struct ShepherdSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub member: Member,
    pub assigned_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpInput {
    pub member_id: String,
    pub shepherd_id: Option<String>,
    pub kind: FollowUpKind,
    pub due_on: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FollowUpUpdate {
    pub status: Option<FollowUpStatus>,
    pub notes: Option<String>,
    pub outcome: Option<String>,
    pub due_on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FollowUpFilter {
    pub status: Option<FollowUpStatus>,
    pub shepherd_id: Option<String>,
    pub member_id: Option<String>,
    #[serde(default)]
    pub overdue: bool,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FollowUpListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub follow_up: FollowUp,
    pub member_name: String,
    pub shepherd_name: Option<String>,
    pub overdue: bool,
}

// ========================================
// Shepherds
// ========================================

/// Designate or undesignate a shepherd
///
/// Undesignating removes every assignment to that shepherd.
pub async fn set_shepherd_flag(pool: &SqlitePool, member_id: &str, is_shepherd: bool) -> ApiResult<Member> {
    get_member(pool, member_id).await?;
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE members SET is_shepherd = ?, updated_at = ? WHERE id = ?")
        .bind(is_shepherd)
        .bind(now())
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

    if !is_shepherd {
        let removed = sqlx::query("DELETE FROM shepherd_assignments WHERE shepherd_id = ?")
            .bind(member_id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() > 0 {
            info!(shepherd_id = member_id, removed = removed.rows_affected(), "Cleared shepherd assignments");
        }
    }

    tx.commit().await?;
    get_member(pool, member_id).await
}

pub async fn list_shepherds(pool: &SqlitePool) -> ApiResult<Vec<ShepherdSummary>> {
    let rows = sqlx::query_as::<_, ShepherdSummary>(
        r#"
        SELECT m.*,
               (SELECT COUNT(*) FROM shepherd_assignments a WHERE a.shepherd_id = m.id) AS assigned_count
        FROM members m
        WHERE m.is_shepherd = 1
        ORDER BY m.last_name COLLATE NOCASE, m.first_name COLLATE NOCASE
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Members currently assigned to a shepherd
pub async fn flock_of(pool: &SqlitePool, shepherd_id: &str) -> ApiResult<Vec<Member>> {
    let rows = sqlx::query_as::<_, Member>(
        r#"
        SELECT m.* FROM shepherd_assignments a
        JOIN members m ON m.id = a.member_id
        WHERE a.shepherd_id = ?
        ORDER BY m.last_name COLLATE NOCASE, m.first_name COLLATE NOCASE
        "#,
    )
    .bind(shepherd_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Assign a member to a shepherd, or clear the assignment with `None`
pub async fn assign_shepherd(pool: &SqlitePool, member_id: &str, shepherd_id: Option<&str>) -> ApiResult<()> {
    get_member(pool, member_id).await?;

    let Some(shepherd_id) = shepherd_id else {
        sqlx::query("DELETE FROM shepherd_assignments WHERE member_id = ?")
            .bind(member_id)
            .execute(pool)
            .await?;
        return Ok(());
    };

    if shepherd_id == member_id {
        return Err(ApiError::BadRequest("a member cannot shepherd themself".to_string()));
    }

    let shepherd = sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = ?")
        .bind(shepherd_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("member {} does not exist", shepherd_id)))?;
    if !shepherd.is_shepherd {
        return Err(ApiError::BadRequest(format!(
            "{} is not designated as a shepherd",
            shepherd.full_name()
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO shepherd_assignments (member_id, shepherd_id, assigned_on)
        VALUES (?, ?, ?)
        ON CONFLICT(member_id) DO UPDATE SET shepherd_id = excluded.shepherd_id, assigned_on = excluded.assigned_on
        "#,
    )
    .bind(member_id)
    .bind(shepherd_id)
    .bind(today())
    .execute(pool)
    .await?;

    Ok(())
}

async fn assigned_shepherd(pool: &SqlitePool, member_id: &str) -> ApiResult<Option<String>> {
    let id = sqlx::query_scalar("SELECT shepherd_id FROM shepherd_assignments WHERE member_id = ?")
        .bind(member_id)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

// ========================================
// Follow-ups
// ========================================

pub async fn get_follow_up(pool: &SqlitePool, id: &str) -> ApiResult<FollowUp> {
    sqlx::query_as::<_, FollowUp>("SELECT * FROM follow_ups WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("follow-up {}", id)))
}

/// Create a pending follow-up; the shepherd defaults to the member's assigned one
pub async fn create_follow_up(pool: &SqlitePool, input: FollowUpInput, created_by: Option<&str>) -> ApiResult<FollowUp> {
    get_member(pool, &input.member_id).await?;

    let shepherd_id = match clean_opt(input.shepherd_id) {
        Some(id) => {
            get_member(pool, &id)
                .await
                .map_err(|_| ApiError::BadRequest(format!("member {} does not exist", id)))?;
            Some(id)
        }
        None => assigned_shepherd(pool, &input.member_id).await?,
    };

    let id = new_id();
    let ts = now();
    sqlx::query(
        r#"
        INSERT INTO follow_ups (id, member_id, shepherd_id, kind, status, due_on, notes, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&input.member_id)
    .bind(&shepherd_id)
    .bind(input.kind)
    .bind(input.due_on)
    .bind(clean_opt(input.notes))
    .bind(created_by)
    .bind(ts)
    .bind(ts)
    .execute(pool)
    .await?;

    get_follow_up(pool, &id).await
}

fn push_follow_up_filters(qb: &mut QueryBuilder<'static, Sqlite>, filter: &FollowUpFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND f.status = ").push_bind(status);
    }
    if let Some(shepherd_id) = filter.shepherd_id.clone() {
        qb.push(" AND f.shepherd_id = ").push_bind(shepherd_id);
    }
    if let Some(member_id) = filter.member_id.clone() {
        qb.push(" AND f.member_id = ").push_bind(member_id);
    }
    if filter.overdue {
        qb.push(" AND f.status IN ('pending', 'in_progress') AND f.due_on < ")
            .push_bind(today());
    }
}

pub async fn list_follow_ups(pool: &SqlitePool, filter: &FollowUpFilter) -> ApiResult<Page<FollowUpListItem>> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM follow_ups f");
    push_follow_up_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, filter.page, filter.page_size);

    let mut qb = QueryBuilder::new("SELECT f.*, m.first_name || ' ' || m.last_name AS member_name, ");
    qb.push("CASE WHEN s.id IS NULL THEN NULL ELSE s.first_name || ' ' || s.last_name END AS shepherd_name, ")
        .push("(f.status IN ('pending', 'in_progress') AND f.due_on < ")
        .push_bind(today())
        .push(") AS overdue ")
        .push("FROM follow_ups f JOIN members m ON m.id = f.member_id ")
        .push("LEFT JOIN members s ON s.id = f.shepherd_id");
    push_follow_up_filters(&mut qb, filter);
    qb.push(" ORDER BY f.due_on, f.created_at LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let items = qb.build_query_as::<FollowUpListItem>().fetch_all(pool).await?;
    Ok(Page::new(items, total, pagination))
}

fn check_transition(current: FollowUpStatus, next: FollowUpStatus) -> ApiResult<()> {
    if current == next {
        return Ok(());
    }
    if !current.can_transition_to(next) {
        return Err(ApiError::Conflict(format!(
            "follow-up cannot move from {} to {}",
            current, next
        )));
    }
    Ok(())
}

/// Update status, notes, outcome or due date
///
/// Terminal follow-ups accept no further changes.
pub async fn update_follow_up(pool: &SqlitePool, id: &str, update: FollowUpUpdate) -> ApiResult<FollowUp> {
    let existing = get_follow_up(pool, id).await?;
    if existing.status.is_terminal() {
        return Err(ApiError::Conflict(format!("follow-up is already {}", existing.status)));
    }

    let status = update.status.unwrap_or(existing.status);
    check_transition(existing.status, status)?;

    let completed_at = if status == FollowUpStatus::Completed {
        Some(now())
    } else {
        None
    };

    sqlx::query(
        r#"
        UPDATE follow_ups SET status = ?, notes = ?, outcome = ?, due_on = ?, completed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(clean_opt(update.notes).or(existing.notes))
    .bind(clean_opt(update.outcome).or(existing.outcome))
    .bind(update.due_on.unwrap_or(existing.due_on))
    .bind(completed_at)
    .bind(now())
    .bind(id)
    .execute(pool)
    .await?;

    get_follow_up(pool, id).await
}

/// Mark a follow-up completed with its outcome
pub async fn complete_follow_up(pool: &SqlitePool, id: &str, outcome: Option<String>) -> ApiResult<FollowUp> {
    update_follow_up(
        pool,
        id,
        FollowUpUpdate {
            status: Some(FollowUpStatus::Completed),
            outcome,
            ..Default::default()
        },
    )
    .await
}

pub async fn delete_follow_up(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM follow_ups WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("follow-up {}", id)));
    }
    Ok(())
}

/// (open, overdue) follow-up counts
pub async fn open_and_overdue_counts(pool: &SqlitePool) -> ApiResult<(i64, i64)> {
    let counts: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN due_on < ? THEN 1 ELSE 0 END), 0)
        FROM follow_ups
        WHERE status IN ('pending', 'in_progress')
        "#,
    )
    .bind(today())
    .fetch_one(pool)
    .await?;
    Ok(counts)
}
