//! Member queries

use chrono::NaiveDate;
use flock_common::db::models::{new_id, Gender, Member, MemberStatus};
use flock_common::phone::normalize_phone;
use flock_common::time::now;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};
use crate::validation::{clean_email, clean_opt, clean_phone, like_pattern, require_text};

/// Editable member fields, as submitted by forms and sync
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberInput {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub status: Option<MemberStatus>,
    pub department_id: Option<String>,
    pub joined_on: Option<NaiveDate>,
}

impl MemberInput {
    /// Trim text, normalise phone and email, reject missing names
    pub fn normalized(self, country_code: &str) -> ApiResult<Self> {
        Ok(Self {
            first_name: require_text(&self.first_name, "first_name")?,
            last_name: require_text(&self.last_name, "last_name")?,
            phone: clean_phone(self.phone, country_code)?,
            email: clean_email(self.email)?,
            gender: self.gender,
            date_of_birth: self.date_of_birth,
            address: clean_opt(self.address),
            occupation: clean_opt(self.occupation),
            status: self.status,
            department_id: clean_opt(self.department_id),
            joined_on: self.joined_on,
        })
    }
}

/// List filters for GET /api/members
#[derive(Debug, Default, Deserialize)]
pub struct MemberFilter {
    pub q: Option<String>,
    pub status: Option<MemberStatus>,
    pub department_id: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Member row with its department name
#[derive(Debug, Serialize, FromRow)]
pub struct MemberListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub member: Member,
    pub department_name: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ShepherdRef {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Member with department and assigned shepherd
#[derive(Debug, Serialize)]
pub struct MemberDetail {
    #[serde(flatten)]
    pub member: Member,
    pub department_name: Option<String>,
    pub shepherd: Option<ShepherdRef>,
}

/// Light projection used for duplicate matching during sync
#[derive(Debug, Clone, FromRow)]
pub struct MemberIdentity {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

fn sort_column(sort: Option<&str>) -> ApiResult<&'static str> {
    match sort.unwrap_or("last_name") {
        "last_name" => Ok("m.last_name COLLATE NOCASE"),
        "first_name" => Ok("m.first_name COLLATE NOCASE"),
        "joined_on" => Ok("m.joined_on"),
        "created_at" => Ok("m.created_at"),
        other => Err(ApiError::BadRequest(format!("cannot sort by '{}'", other))),
    }
}

fn push_filters(qb: &mut QueryBuilder<'static, Sqlite>, filter: &MemberFilter, country_code: &str) {
    qb.push(" WHERE 1 = 1");

    if let Some(q) = filter.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = like_pattern(q);
        // Phones are stored normalised, so "024..." must also be tried as "23324..."
        let phone_pattern = normalize_phone(q, country_code)
            .map(|phone| like_pattern(&phone))
            .unwrap_or_else(|| pattern.clone());
        qb.push(" AND (LOWER(m.first_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(m.last_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(m.first_name || ' ' || m.last_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR m.phone LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR m.phone LIKE ")
            .push_bind(phone_pattern)
            .push(" ESCAPE '\\' OR LOWER(m.email) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(status) = filter.status {
        qb.push(" AND m.status = ").push_bind(status);
    }
    if let Some(department_id) = filter.department_id.clone() {
        qb.push(" AND m.department_id = ").push_bind(department_id);
    }
}

pub async fn list_members(pool: &SqlitePool, filter: &MemberFilter, country_code: &str) -> ApiResult<Page<MemberListItem>> {
    let order_by = sort_column(filter.sort.as_deref())?;
    let direction = match filter.order.as_deref() {
        Some(o) if o.eq_ignore_ascii_case("desc") => "DESC",
        _ => "ASC",
    };

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM members m");
    push_filters(&mut count_qb, filter, country_code);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, filter.page, filter.page_size);

    let mut qb = QueryBuilder::new(
        "SELECT m.*, d.name AS department_name FROM members m \
         LEFT JOIN departments d ON d.id = m.department_id",
    );
    push_filters(&mut qb, filter, country_code);
    qb.push(format!(" ORDER BY {} {}, m.id", order_by, direction));
    qb.push(" LIMIT ").push_bind(pagination.page_size);
    qb.push(" OFFSET ").push_bind(pagination.offset);

    let items = qb.build_query_as::<MemberListItem>().fetch_all(pool).await?;

    Ok(Page::new(items, total, pagination))
}

pub async fn get_member(pool: &SqlitePool, id: &str) -> ApiResult<Member> {
    let mut conn = pool.acquire().await?;
    fetch_member(&mut conn, id).await
}

/// `get_member` on a connection or open transaction
pub async fn fetch_member(conn: &mut SqliteConnection, id: &str) -> ApiResult<Member> {
    sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("member {}", id)))
}

pub async fn get_member_detail(pool: &SqlitePool, id: &str) -> ApiResult<MemberDetail> {
    let member = get_member(pool, id).await?;

    let department_name: Option<String> = match &member.department_id {
        Some(dept) => sqlx::query_scalar("SELECT name FROM departments WHERE id = ?")
            .bind(dept)
            .fetch_optional(pool)
            .await?,
        None => None,
    };

    let shepherd = sqlx::query_as::<_, ShepherdRef>(
        r#"
        SELECT s.id, s.first_name, s.last_name, s.phone
        FROM shepherd_assignments a
        JOIN members s ON s.id = a.shepherd_id
        WHERE a.member_id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(MemberDetail {
        member,
        department_name,
        shepherd,
    })
}

pub async fn find_by_phone(pool: &SqlitePool, phone: &str) -> ApiResult<Option<Member>> {
    let member = sqlx::query_as::<_, Member>("SELECT * FROM members WHERE phone = ?")
        .bind(phone)
        .fetch_optional(pool)
        .await?;
    Ok(member)
}

/// All member identities, for name/phone matching
pub async fn all_identities(pool: &SqlitePool) -> ApiResult<Vec<MemberIdentity>> {
    let rows = sqlx::query_as::<_, MemberIdentity>(
        "SELECT id, first_name, last_name, phone FROM members",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn ensure_department_exists(conn: &mut SqliteConnection, department_id: Option<&str>) -> ApiResult<()> {
    if let Some(dept) = department_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM departments WHERE id = ?)")
            .bind(dept)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(ApiError::BadRequest(format!("department {} does not exist", dept)));
        }
    }
    Ok(())
}

fn phone_conflict(err: sqlx::Error) -> ApiError {
    if flock_common::error::is_unique_violation(&err) {
        ApiError::Conflict("a member with this phone number already exists".to_string())
    } else {
        err.into()
    }
}

/// Insert a member from already-normalised input
pub async fn insert_member(conn: &mut SqliteConnection, input: &MemberInput) -> ApiResult<Member> {
    ensure_department_exists(conn, input.department_id.as_deref()).await?;

    let id = new_id();
    let ts = now();
    let joined_on = input.joined_on.unwrap_or_else(flock_common::time::today);

    sqlx::query(
        r#"
        INSERT INTO members (
            id, first_name, last_name, phone, email, gender, date_of_birth, address,
            occupation, status, department_id, is_shepherd, joined_on, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(input.gender)
    .bind(input.date_of_birth)
    .bind(&input.address)
    .bind(&input.occupation)
    .bind(input.status.unwrap_or(MemberStatus::Active))
    .bind(&input.department_id)
    .bind(joined_on)
    .bind(ts)
    .bind(ts)
    .execute(&mut *conn)
    .await
    .map_err(phone_conflict)?;

    fetch_member(conn, &id).await
}

/// Replace a member's editable fields from already-normalised input
///
/// `status` and `joined_on` keep their stored values when absent.
pub async fn update_member(conn: &mut SqliteConnection, id: &str, input: &MemberInput) -> ApiResult<Member> {
    let existing = fetch_member(conn, id).await?;
    ensure_department_exists(conn, input.department_id.as_deref()).await?;

    sqlx::query(
        r#"
        UPDATE members SET
            first_name = ?, last_name = ?, phone = ?, email = ?, gender = ?,
            date_of_birth = ?, address = ?, occupation = ?, status = ?,
            department_id = ?, joined_on = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(input.gender)
    .bind(input.date_of_birth)
    .bind(&input.address)
    .bind(&input.occupation)
    .bind(input.status.unwrap_or(existing.status))
    .bind(&input.department_id)
    .bind(input.joined_on.or(existing.joined_on))
    .bind(now())
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(phone_conflict)?;

    fetch_member(conn, id).await
}

pub async fn set_status(pool: &SqlitePool, id: &str, status: MemberStatus) -> ApiResult<Member> {
    let result = sqlx::query("UPDATE members SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("member {}", id)));
    }
    get_member(pool, id).await
}

pub async fn set_photo_url(pool: &SqlitePool, id: &str, url: Option<&str>) -> ApiResult<()> {
    sqlx::query("UPDATE members SET photo_url = ?, updated_at = ? WHERE id = ?")
        .bind(url)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a member; attendance, tithes, follow-ups and assignments cascade
pub async fn delete_member(pool: &SqlitePool, id: &str) -> ApiResult<Member> {
    let member = get_member(pool, id).await?;
    sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(member)
}
