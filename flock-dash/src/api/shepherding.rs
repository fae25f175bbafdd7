//! Shepherds, assignments and follow-ups

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use flock_common::auth::Permission;
use flock_common::db::models::{FollowUp, Member};
use serde::Deserialize;
use tracing::info;

use super::auth::CurrentUser;
use crate::db::members::{self, MemberDetail};
use crate::db::shepherding::{
    self, FollowUpFilter, FollowUpInput, FollowUpListItem, FollowUpUpdate, ShepherdSummary,
};
use crate::error::ApiResult;
use crate::pagination::Page;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ShepherdFlagRequest {
    pub is_shepherd: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignShepherdRequest {
    pub shepherd_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub outcome: Option<String>,
}

/// GET /api/shepherds
pub async fn list_shepherds(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<ShepherdSummary>>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(shepherding::list_shepherds(&state.db).await?))
}

/// PUT /api/shepherds/:member_id
pub async fn set_shepherd(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(member_id): Path<String>,
    Json(payload): Json<ShepherdFlagRequest>,
) -> ApiResult<Json<Member>> {
    user.require(Permission::WriteShepherding)?;
    let member = shepherding::set_shepherd_flag(&state.db, &member_id, payload.is_shepherd).await?;
    info!(
        "{} {} {} as shepherd",
        user.username,
        if payload.is_shepherd { "designated" } else { "removed" },
        member.full_name()
    );
    Ok(Json(member))
}

/// GET /api/shepherds/:member_id/flock
pub async fn shepherd_flock(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(member_id): Path<String>,
) -> ApiResult<Json<Vec<Member>>> {
    user.require(Permission::ReadMembers)?;
    members::get_member(&state.db, &member_id).await?;
    Ok(Json(shepherding::flock_of(&state.db, &member_id).await?))
}

/// PUT /api/members/:id/shepherd
///
/// `{"shepherd_id": null}` clears the assignment.
pub async fn assign_shepherd(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(member_id): Path<String>,
    Json(payload): Json<AssignShepherdRequest>,
) -> ApiResult<Json<MemberDetail>> {
    user.require(Permission::WriteShepherding)?;
    let shepherd_id = payload.shepherd_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    shepherding::assign_shepherd(&state.db, &member_id, shepherd_id).await?;
    Ok(Json(members::get_member_detail(&state.db, &member_id).await?))
}

/// GET /api/follow-ups
pub async fn list_follow_ups(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<FollowUpFilter>,
) -> ApiResult<Json<Page<FollowUpListItem>>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(shepherding::list_follow_ups(&state.db, &filter).await?))
}

/// POST /api/follow-ups
pub async fn create_follow_up(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<FollowUpInput>,
) -> ApiResult<(StatusCode, Json<FollowUp>)> {
    user.require(Permission::WriteShepherding)?;
    let follow_up = shepherding::create_follow_up(&state.db, payload, Some(&user.id)).await?;
    Ok((StatusCode::CREATED, Json(follow_up)))
}

/// GET /api/follow-ups/:id
pub async fn get_follow_up(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<FollowUp>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(shepherding::get_follow_up(&state.db, &id).await?))
}

/// PUT /api/follow-ups/:id
pub async fn update_follow_up(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<FollowUpUpdate>,
) -> ApiResult<Json<FollowUp>> {
    user.require(Permission::WriteShepherding)?;
    Ok(Json(shepherding::update_follow_up(&state.db, &id, payload).await?))
}

/// POST /api/follow-ups/:id/complete
pub async fn complete_follow_up(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    payload: Option<Json<CompleteRequest>>,
) -> ApiResult<Json<FollowUp>> {
    user.require(Permission::WriteShepherding)?;
    let outcome = payload.and_then(|Json(request)| request.outcome);
    let follow_up = shepherding::complete_follow_up(&state.db, &id, outcome).await?;
    info!("{} completed follow-up {}", user.username, id);
    Ok(Json(follow_up))
}

/// DELETE /api/follow-ups/:id
pub async fn delete_follow_up(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteShepherding)?;
    shepherding::delete_follow_up(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn shepherding_routes() -> Router<AppState> {
    Router::new()
        .route("/api/shepherds", get(list_shepherds))
        .route("/api/shepherds/:member_id", put(set_shepherd))
        .route("/api/shepherds/:member_id/flock", get(shepherd_flock))
        .route("/api/members/:id/shepherd", put(assign_shepherd))
        .route("/api/follow-ups", get(list_follow_ups).post(create_follow_up))
        .route(
            "/api/follow-ups/:id",
            get(get_follow_up).put(update_follow_up).delete(delete_follow_up),
        )
        .route("/api/follow-ups/:id/complete", post(complete_follow_up))
}
