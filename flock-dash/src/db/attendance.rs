//! Service and attendance queries

use chrono::NaiveDate;
use flock_common::db::models::{new_id, Member, Service};
use flock_common::time::now;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};
use crate::validation::{clean_opt, open_range, require_text};

#[derive(Debug, Deserialize)]
pub struct AttendanceInput {
    pub service_date: NaiveDate,
    pub service_type: String,
    #[serde(default)]
    pub visitor_count: Option<i64>,
    #[serde(default)]
    pub member_ids: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ServiceSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub service: Service,
    pub present_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ServiceDetail {
    #[serde(flatten)]
    pub service: Service,
    pub present_count: i64,
    pub members: Vec<Member>,
}

/// Find the service for (date, type), creating it when missing
pub async fn find_or_create_service(
    conn: &mut SqliteConnection,
    service_date: NaiveDate,
    service_type: &str,
) -> ApiResult<Service> {
    let existing = sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE service_date = ? AND service_type = ? COLLATE NOCASE",
    )
    .bind(service_date)
    .bind(service_type)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(service) = existing {
        return Ok(service);
    }

    let id = new_id();
    sqlx::query(
        "INSERT INTO services (id, service_date, service_type, visitor_count, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(service_date)
    .bind(service_type)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(service)
}

/// Mark a member present; returns false when already marked
pub async fn mark_present(conn: &mut SqliteConnection, service_id: &str, member_id: &str) -> ApiResult<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO attendance (service_id, member_id) VALUES (?, ?)")
        .bind(service_id)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn is_present(pool: &SqlitePool, service_id: &str, member_id: &str) -> ApiResult<bool> {
    let present: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM attendance WHERE service_id = ? AND member_id = ?)",
    )
    .bind(service_id)
    .bind(member_id)
    .fetch_one(pool)
    .await?;
    Ok(present)
}

/// Look up an existing service without creating it
pub async fn find_service(
    pool: &SqlitePool,
    service_date: NaiveDate,
    service_type: &str,
) -> ApiResult<Option<Service>> {
    let service = sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE service_date = ? AND service_type = ? COLLATE NOCASE",
    )
    .bind(service_date)
    .bind(service_type)
    .fetch_optional(pool)
    .await?;
    Ok(service)
}

/// Record attendance for a service, merging into an existing record
///
/// A supplied visitor count replaces the stored one; notes are replaced when given.
pub async fn record_attendance(pool: &SqlitePool, input: AttendanceInput) -> ApiResult<ServiceDetail> {
    let service_type = require_text(&input.service_type, "service_type")?;
    if let Some(visitors) = input.visitor_count {
        if visitors < 0 {
            return Err(ApiError::BadRequest("visitor_count cannot be negative".to_string()));
        }
    }

    let mut tx = pool.begin().await?;
    let service = find_or_create_service(&mut tx, input.service_date, &service_type).await?;

    for member_id in &input.member_ids {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM members WHERE id = ?)")
            .bind(member_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(ApiError::BadRequest(format!("member {} does not exist", member_id)));
        }
        mark_present(&mut tx, &service.id, member_id).await?;
    }

    if let Some(visitors) = input.visitor_count {
        sqlx::query("UPDATE services SET visitor_count = ? WHERE id = ?")
            .bind(visitors)
            .bind(&service.id)
            .execute(&mut *tx)
            .await?;
    }
    if let Some(notes) = clean_opt(input.notes) {
        sqlx::query("UPDATE services SET notes = ? WHERE id = ?")
            .bind(notes)
            .bind(&service.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    get_service_detail(pool, &service.id).await
}

pub async fn list_services(pool: &SqlitePool, filter: &AttendanceFilter) -> ApiResult<Page<ServiceSummary>> {
    let (from, to) = open_range(filter.from, filter.to);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM services WHERE service_date BETWEEN ? AND ?",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;

    let pagination = calculate_pagination(total, filter.page, filter.page_size);

    let items = sqlx::query_as::<_, ServiceSummary>(
        r#"
        SELECT s.*, (SELECT COUNT(*) FROM attendance a WHERE a.service_id = s.id) AS present_count
        FROM services s
        WHERE s.service_date BETWEEN ? AND ?
        ORDER BY s.service_date DESC, s.service_type
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(pagination.page_size)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, total, pagination))
}

pub async fn get_service_detail(pool: &SqlitePool, id: &str) -> ApiResult<ServiceDetail> {
    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("service {}", id)))?;

    let members = sqlx::query_as::<_, Member>(
        r#"
        SELECT m.* FROM attendance a
        JOIN members m ON m.id = a.member_id
        WHERE a.service_id = ?
        ORDER BY m.last_name COLLATE NOCASE, m.first_name COLLATE NOCASE
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(ServiceDetail {
        service,
        present_count: members.len() as i64,
        members,
    })
}

pub async fn remove_member(pool: &SqlitePool, service_id: &str, member_id: &str) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM attendance WHERE service_id = ? AND member_id = ?")
        .bind(service_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "member {} is not marked present at service {}",
            member_id, service_id
        )));
    }
    Ok(())
}

pub async fn delete_service(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("service {}", id)));
    }
    Ok(())
}
