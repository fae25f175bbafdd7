//! Departments and their membership

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use flock_common::auth::Permission;
use flock_common::db::models::Department;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::CurrentUser;
use crate::db::departments::{self, DepartmentDetail, DepartmentInput, DepartmentSummary};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LeaderRequest {
    pub leader_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignMembersRequest {
    pub member_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignMembersResponse {
    pub assigned: u64,
}

/// GET /api/departments
pub async fn list_departments(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<DepartmentSummary>>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(departments::list_departments(&state.db).await?))
}

/// GET /api/departments/:id
pub async fn get_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<DepartmentDetail>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(departments::get_department_detail(&state.db, &id).await?))
}

/// POST /api/departments
pub async fn create_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<DepartmentInput>,
) -> ApiResult<(StatusCode, Json<Department>)> {
    user.require(Permission::WriteMembers)?;
    let department = departments::create_department(&state.db, payload).await?;
    info!("{} created department {}", user.username, department.name);
    Ok((StatusCode::CREATED, Json(department)))
}

/// PUT /api/departments/:id
pub async fn update_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<DepartmentInput>,
) -> ApiResult<Json<Department>> {
    user.require(Permission::WriteMembers)?;
    Ok(Json(departments::update_department(&state.db, &id, payload).await?))
}

/// DELETE /api/departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteMembers)?;
    departments::delete_department(&state.db, &id).await?;
    info!("{} deleted department {}", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/departments/:id/leader
pub async fn set_leader(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<LeaderRequest>,
) -> ApiResult<Json<Department>> {
    user.require(Permission::WriteMembers)?;
    let leader = payload.leader_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    Ok(Json(departments::set_leader(&state.db, &id, leader).await?))
}

/// PUT /api/departments/:id/members
pub async fn assign_members(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<AssignMembersRequest>,
) -> ApiResult<Json<AssignMembersResponse>> {
    user.require(Permission::WriteMembers)?;
    let assigned = departments::assign_members(&state.db, &id, &payload.member_ids).await?;
    Ok(Json(AssignMembersResponse { assigned }))
}

pub fn departments_routes() -> Router<AppState> {
    Router::new()
        .route("/api/departments", get(list_departments).post(create_department))
        .route(
            "/api/departments/:id",
            get(get_department).put(update_department).delete(delete_department),
        )
        .route("/api/departments/:id/leader", put(set_leader))
        .route("/api/departments/:id/members", put(assign_members))
}
