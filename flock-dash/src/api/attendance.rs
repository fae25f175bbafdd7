//! Service attendance

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use flock_common::auth::Permission;

use super::auth::CurrentUser;
use crate::db::attendance::{self, AttendanceFilter, AttendanceInput, ServiceDetail, ServiceSummary};
use crate::error::ApiResult;
use crate::pagination::Page;
use crate::AppState;

/// POST /api/attendance
///
/// Creates the service for (date, type) or merges into the existing one.
pub async fn record_attendance(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<AttendanceInput>,
) -> ApiResult<Json<ServiceDetail>> {
    user.require(Permission::WriteAttendance)?;
    Ok(Json(attendance::record_attendance(&state.db, payload).await?))
}

/// GET /api/attendance
pub async fn list_services(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<AttendanceFilter>,
) -> ApiResult<Json<Page<ServiceSummary>>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(attendance::list_services(&state.db, &filter).await?))
}

/// GET /api/attendance/:service_id
pub async fn get_service(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(service_id): Path<String>,
) -> ApiResult<Json<ServiceDetail>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(attendance::get_service_detail(&state.db, &service_id).await?))
}

/// DELETE /api/attendance/:service_id/members/:member_id
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((service_id, member_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteAttendance)?;
    attendance::remove_member(&state.db, &service_id, &member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/attendance/:service_id
pub async fn delete_service(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(service_id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteAttendance)?;
    attendance::delete_service(&state.db, &service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/attendance", get(list_services).post(record_attendance))
        .route("/api/attendance/:service_id", get(get_service).delete(delete_service))
        .route(
            "/api/attendance/:service_id/members/:member_id",
            delete(remove_member),
        )
}
