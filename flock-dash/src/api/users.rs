//! Dashboard account management (admin only)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use flock_common::auth::{Permission, Role};
use flock_common::db::models::User;
use serde::Deserialize;
use tracing::info;

use super::auth::CurrentUser;
use crate::db::users::{self, NewUser};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<User>>> {
    user.require(Permission::ManageUsers)?;
    Ok(Json(users::list_users(&state.db).await?))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    user.require(Permission::ManageUsers)?;
    let created = users::create_user(&state.db, payload).await?;
    info!("{} created user {} ({})", user.username, created.username, created.role);
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/users/:id/role
pub async fn set_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<RoleRequest>,
) -> ApiResult<Json<User>> {
    user.require(Permission::ManageUsers)?;
    let updated = users::set_role(&state.db, &user.id, &id, payload.role).await?;
    info!("{} set role of {} to {}", user.username, updated.username, updated.role);
    Ok(Json(updated))
}

/// PUT /api/users/:id/active
pub async fn set_active(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<ActiveRequest>,
) -> ApiResult<Json<User>> {
    user.require(Permission::ManageUsers)?;
    let updated = users::set_active(&state.db, &user.id, &id, payload.active).await?;
    info!(
        "{} {} user {}",
        user.username,
        if updated.active { "activated" } else { "deactivated" },
        updated.username
    );
    Ok(Json(updated))
}

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id/role", put(set_role))
        .route("/api/users/:id/active", put(set_active))
}
