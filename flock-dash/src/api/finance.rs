//! Tithes, offerings and expenses
//!
//! Reads need finance access; every role without it gets 403 here even
//! though member data is visible to them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use flock_common::auth::Permission;
use flock_common::db::models::{Expense, Offering, Tithe};
use tracing::info;

use super::auth::CurrentUser;
use crate::db::finance::{
    self, ExpenseInput, FinanceFilter, FinanceList, OfferingInput, TitheInput, TitheListItem,
};
use crate::error::ApiResult;
use crate::AppState;

/// POST /api/tithes
pub async fn create_tithe(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<TitheInput>,
) -> ApiResult<(StatusCode, Json<Tithe>)> {
    user.require(Permission::WriteFinance)?;
    let mut conn = state.db.acquire().await?;
    let tithe = finance::insert_tithe(&mut conn, &payload, Some(&user.id)).await?;
    info!("{} recorded tithe {} for member {}", user.username, tithe.id, tithe.member_id);
    Ok((StatusCode::CREATED, Json(tithe)))
}

/// GET /api/tithes
pub async fn list_tithes(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<FinanceFilter>,
) -> ApiResult<Json<FinanceList<TitheListItem>>> {
    user.require(Permission::ReadFinance)?;
    Ok(Json(finance::list_tithes(&state.db, &filter).await?))
}

/// DELETE /api/tithes/:id
pub async fn delete_tithe(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteFinance)?;
    finance::delete_tithe(&state.db, &id).await?;
    info!("{} deleted tithe {}", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/offerings
pub async fn create_offering(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<OfferingInput>,
) -> ApiResult<(StatusCode, Json<Offering>)> {
    user.require(Permission::WriteFinance)?;
    let offering = finance::insert_offering(&state.db, &payload, Some(&user.id)).await?;
    Ok((StatusCode::CREATED, Json(offering)))
}

/// GET /api/offerings
pub async fn list_offerings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<FinanceFilter>,
) -> ApiResult<Json<FinanceList<Offering>>> {
    user.require(Permission::ReadFinance)?;
    Ok(Json(finance::list_offerings(&state.db, &filter).await?))
}

/// DELETE /api/offerings/:id
pub async fn delete_offering(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteFinance)?;
    finance::delete_offering(&state.db, &id).await?;
    info!("{} deleted offering {}", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/expenses
pub async fn create_expense(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<ExpenseInput>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    user.require(Permission::WriteFinance)?;
    let expense = finance::insert_expense(&state.db, &payload, Some(&user.id)).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// GET /api/expenses
pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<FinanceFilter>,
) -> ApiResult<Json<FinanceList<Expense>>> {
    user.require(Permission::ReadFinance)?;
    Ok(Json(finance::list_expenses(&state.db, &filter).await?))
}

/// DELETE /api/expenses/:id
pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteFinance)?;
    finance::delete_expense(&state.db, &id).await?;
    info!("{} deleted expense {}", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn finance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tithes", get(list_tithes).post(create_tithe))
        .route("/api/tithes/:id", delete(delete_tithe))
        .route("/api/offerings", get(list_offerings).post(create_offering))
        .route("/api/offerings/:id", delete(delete_offering))
        .route("/api/expenses", get(list_expenses).post(create_expense))
        .route("/api/expenses/:id", delete(delete_expense))
}
