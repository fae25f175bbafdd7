//! Tithe, offering and expense queries

use chrono::NaiveDate;
use flock_common::db::models::{new_id, Expense, Offering, PaymentMethod, Tithe};
use flock_common::time::now;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};
use crate::validation::{clean_opt, open_range, require_text};

#[derive(Debug, Deserialize)]
pub struct TitheInput {
    pub member_id: String,
    pub amount_cents: i64,
    pub paid_on: NaiveDate,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OfferingInput {
    pub service_date: NaiveDate,
    pub offering_type: Option<String>,
    pub amount_cents: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseInput {
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub spent_on: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct FinanceFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub member_id: Option<String>,
    pub category: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TitheListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub tithe: Tithe,
    pub member_name: String,
}

/// A page of records plus the sum over every matching row
#[derive(Debug, Serialize)]
pub struct FinanceList<T> {
    #[serde(flatten)]
    pub page: Page<T>,
    pub total_amount_cents: i64,
}

fn check_amount(amount_cents: i64) -> ApiResult<()> {
    if amount_cents <= 0 {
        return Err(ApiError::BadRequest("amount_cents must be greater than zero".to_string()));
    }
    Ok(())
}

// ========================================
// Tithes
// ========================================

/// Insert a tithe for an existing member
pub async fn insert_tithe(conn: &mut SqliteConnection, input: &TitheInput, recorded_by: Option<&str>) -> ApiResult<Tithe> {
    check_amount(input.amount_cents)?;

    let member_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM members WHERE id = ?)")
        .bind(&input.member_id)
        .fetch_one(&mut *conn)
        .await?;
    if !member_exists {
        return Err(ApiError::BadRequest(format!("member {} does not exist", input.member_id)));
    }

    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO tithes (id, member_id, amount_cents, paid_on, method, reference, notes, recorded_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&input.member_id)
    .bind(input.amount_cents)
    .bind(input.paid_on)
    .bind(input.method.unwrap_or(PaymentMethod::Cash))
    .bind(clean_opt(input.reference.clone()))
    .bind(clean_opt(input.notes.clone()))
    .bind(recorded_by)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    let tithe = sqlx::query_as::<_, Tithe>("SELECT * FROM tithes WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(tithe)
}

/// Whether a tithe with the same member, date and amount already exists
pub async fn tithe_exists(pool: &SqlitePool, member_id: &str, paid_on: NaiveDate, amount_cents: i64) -> ApiResult<Option<String>> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM tithes WHERE member_id = ? AND paid_on = ? AND amount_cents = ? LIMIT 1",
    )
    .bind(member_id)
    .bind(paid_on)
    .bind(amount_cents)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

fn push_tithe_filters(qb: &mut QueryBuilder<'static, Sqlite>, filter: &FinanceFilter) {
    let (from, to) = open_range(filter.from, filter.to);
    qb.push(" WHERE t.paid_on BETWEEN ")
        .push_bind(from)
        .push(" AND ")
        .push_bind(to);
    if let Some(member_id) = filter.member_id.clone() {
        qb.push(" AND t.member_id = ").push_bind(member_id);
    }
}

pub async fn list_tithes(pool: &SqlitePool, filter: &FinanceFilter) -> ApiResult<FinanceList<TitheListItem>> {
    let mut totals = QueryBuilder::new("SELECT COUNT(*), COALESCE(SUM(t.amount_cents), 0) FROM tithes t");
    push_tithe_filters(&mut totals, filter);
    let (count, sum): (i64, i64) = totals.build_query_as().fetch_one(pool).await?;

    let pagination = calculate_pagination(count, filter.page, filter.page_size);

    let mut qb = QueryBuilder::new(
        "SELECT t.*, m.first_name || ' ' || m.last_name AS member_name \
         FROM tithes t JOIN members m ON m.id = t.member_id",
    );
    push_tithe_filters(&mut qb, filter);
    qb.push(" ORDER BY t.paid_on DESC, t.created_at DESC LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let items = qb.build_query_as::<TitheListItem>().fetch_all(pool).await?;

    Ok(FinanceList {
        page: Page::new(items, count, pagination),
        total_amount_cents: sum,
    })
}

pub async fn delete_tithe(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    delete_by_id(pool, "tithes", id).await
}

// ========================================
// Offerings
// ========================================

pub async fn insert_offering(pool: &SqlitePool, input: &OfferingInput, recorded_by: Option<&str>) -> ApiResult<Offering> {
    check_amount(input.amount_cents)?;
    let offering_type = clean_opt(input.offering_type.clone()).unwrap_or_else(|| "general".to_string());

    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO offerings (id, service_date, offering_type, amount_cents, notes, recorded_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(input.service_date)
    .bind(&offering_type)
    .bind(input.amount_cents)
    .bind(clean_opt(input.notes.clone()))
    .bind(recorded_by)
    .bind(now())
    .execute(pool)
    .await?;

    let offering = sqlx::query_as::<_, Offering>("SELECT * FROM offerings WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(offering)
}

pub async fn list_offerings(pool: &SqlitePool, filter: &FinanceFilter) -> ApiResult<FinanceList<Offering>> {
    let (from, to) = open_range(filter.from, filter.to);

    let (count, sum): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(amount_cents), 0) FROM offerings WHERE service_date BETWEEN ? AND ?",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;

    let pagination = calculate_pagination(count, filter.page, filter.page_size);

    let items = sqlx::query_as::<_, Offering>(
        r#"
        SELECT * FROM offerings
        WHERE service_date BETWEEN ? AND ?
        ORDER BY service_date DESC, created_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(pagination.page_size)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    Ok(FinanceList {
        page: Page::new(items, count, pagination),
        total_amount_cents: sum,
    })
}

pub async fn delete_offering(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    delete_by_id(pool, "offerings", id).await
}

// ========================================
// Expenses
// ========================================

pub async fn insert_expense(pool: &SqlitePool, input: &ExpenseInput, recorded_by: Option<&str>) -> ApiResult<Expense> {
    check_amount(input.amount_cents)?;
    let category = require_text(&input.category, "category")?.to_lowercase();

    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO expenses (id, category, description, amount_cents, spent_on, recorded_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&category)
    .bind(clean_opt(input.description.clone()))
    .bind(input.amount_cents)
    .bind(input.spent_on)
    .bind(recorded_by)
    .bind(now())
    .execute(pool)
    .await?;

    let expense = sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(expense)
}

fn push_expense_filters(qb: &mut QueryBuilder<'static, Sqlite>, filter: &FinanceFilter) {
    let (from, to) = open_range(filter.from, filter.to);
    qb.push(" WHERE spent_on BETWEEN ")
        .push_bind(from)
        .push(" AND ")
        .push_bind(to);
    if let Some(category) = clean_opt(filter.category.clone()) {
        qb.push(" AND category = ").push_bind(category.to_lowercase());
    }
}

pub async fn list_expenses(pool: &SqlitePool, filter: &FinanceFilter) -> ApiResult<FinanceList<Expense>> {
    let mut totals = QueryBuilder::new("SELECT COUNT(*), COALESCE(SUM(amount_cents), 0) FROM expenses");
    push_expense_filters(&mut totals, filter);
    let (count, sum): (i64, i64) = totals.build_query_as().fetch_one(pool).await?;

    let pagination = calculate_pagination(count, filter.page, filter.page_size);

    let mut qb = QueryBuilder::new("SELECT * FROM expenses");
    push_expense_filters(&mut qb, filter);
    qb.push(" ORDER BY spent_on DESC, created_at DESC LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let items = qb.build_query_as::<Expense>().fetch_all(pool).await?;

    Ok(FinanceList {
        page: Page::new(items, count, pagination),
        total_amount_cents: sum,
    })
}

pub async fn delete_expense(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    delete_by_id(pool, "expenses", id).await
}

/// `table` is always one of the fixed names above, never user input
async fn delete_by_id(pool: &SqlitePool, table: &'static str, id: &str) -> ApiResult<()> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("{} record {}", table, id)));
    }
    Ok(())
}
