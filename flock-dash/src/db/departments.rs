//! Department queries

use flock_common::db::models::{new_id, Department, Member};
use flock_common::time::now;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::validation::{clean_opt, require_text};

#[derive(Debug, Deserialize)]
pub struct DepartmentInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct DepartmentSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub department: Department,
    pub leader_name: Option<String>,
    pub member_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DepartmentDetail {
    #[serde(flatten)]
    pub department: Department,
    pub members: Vec<Member>,
}

fn name_conflict(err: sqlx::Error) -> ApiError {
    if flock_common::error::is_unique_violation(&err) {
        ApiError::Conflict("a department with this name already exists".to_string())
    } else {
        err.into()
    }
}

pub async fn list_departments(pool: &SqlitePool) -> ApiResult<Vec<DepartmentSummary>> {
    let rows = sqlx::query_as::<_, DepartmentSummary>(
        r#"
        SELECT d.*,
               CASE WHEN l.id IS NULL THEN NULL ELSE l.first_name || ' ' || l.last_name END AS leader_name,
               (SELECT COUNT(*) FROM members m WHERE m.department_id = d.id) AS member_count
        FROM departments d
        LEFT JOIN members l ON l.id = d.leader_id
        ORDER BY d.name COLLATE NOCASE
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_department(pool: &SqlitePool, id: &str) -> ApiResult<Department> {
    sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("department {}", id)))
}

/// Look up a department by name (case-insensitive)
pub async fn find_by_name(pool: &SqlitePool, name: &str) -> ApiResult<Option<Department>> {
    let dept = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE name = ? COLLATE NOCASE")
        .bind(name.trim())
        .fetch_optional(pool)
        .await?;
    Ok(dept)
}

pub async fn get_department_detail(pool: &SqlitePool, id: &str) -> ApiResult<DepartmentDetail> {
    let department = get_department(pool, id).await?;
    let members = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE department_id = ? ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(DepartmentDetail { department, members })
}

pub async fn create_department(pool: &SqlitePool, input: DepartmentInput) -> ApiResult<Department> {
    let name = require_text(&input.name, "name")?;
    let id = new_id();
    let ts = now();

    sqlx::query(
        "INSERT INTO departments (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&name)
    .bind(clean_opt(input.description))
    .bind(ts)
    .bind(ts)
    .execute(pool)
    .await
    .map_err(name_conflict)?;

    get_department(pool, &id).await
}

pub async fn update_department(pool: &SqlitePool, id: &str, input: DepartmentInput) -> ApiResult<Department> {
    let name = require_text(&input.name, "name")?;
    let result = sqlx::query("UPDATE departments SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(clean_opt(input.description))
        .bind(now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(name_conflict)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("department {}", id)));
    }
    get_department(pool, id).await
}

/// Delete a department; its members become unassigned
pub async fn delete_department(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("department {}", id)));
    }
    Ok(())
}

/// Set or clear the department leader; a new leader joins the department
pub async fn set_leader(pool: &SqlitePool, id: &str, leader_id: Option<&str>) -> ApiResult<Department> {
    get_department(pool, id).await?;
    let mut tx = pool.begin().await?;

    if let Some(leader) = leader_id {
        let result = sqlx::query("UPDATE members SET department_id = ?, updated_at = ? WHERE id = ?")
            .bind(id)
            .bind(now())
            .bind(leader)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::BadRequest(format!("member {} does not exist", leader)));
        }
    }

    sqlx::query("UPDATE departments SET leader_id = ?, updated_at = ? WHERE id = ?")
        .bind(leader_id)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    get_department(pool, id).await
}

/// Move the listed members into the department
///
/// All ids must exist; nothing is changed otherwise.
pub async fn assign_members(pool: &SqlitePool, id: &str, member_ids: &[String]) -> ApiResult<u64> {
    get_department(pool, id).await?;
    let mut tx = pool.begin().await?;
    let ts = now();
    let mut moved = 0;

    for member_id in member_ids {
        let result = sqlx::query("UPDATE members SET department_id = ?, updated_at = ? WHERE id = ?")
            .bind(id)
            .bind(ts)
            .bind(member_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::BadRequest(format!("member {} does not exist", member_id)));
        }
        moved += result.rows_affected();
    }

    tx.commit().await?;
    Ok(moved)
}
