//! Member records and photos

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, patch, put},
    Extension, Json, Router,
};
use flock_common::auth::Permission;
use flock_common::db::models::{Member, MemberStatus};
use serde::Deserialize;
use tracing::{info, warn};

use super::auth::CurrentUser;
use crate::db::members::{self, MemberDetail, MemberFilter, MemberInput, MemberListItem};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::services::photo_store::{extension_for, photo_key};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: MemberStatus,
}

/// GET /api/members
pub async fn list_members(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<MemberFilter>,
) -> ApiResult<Json<Page<MemberListItem>>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(
        members::list_members(&state.db, &filter, &state.config.sms.default_country_code).await?,
    ))
}

/// GET /api/members/:id
pub async fn get_member(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<MemberDetail>> {
    user.require(Permission::ReadMembers)?;
    Ok(Json(members::get_member_detail(&state.db, &id).await?))
}

/// POST /api/members
pub async fn create_member(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<MemberInput>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    user.require(Permission::WriteMembers)?;
    let input = payload.normalized(&state.config.sms.default_country_code)?;
    let mut conn = state.db.acquire().await?;
    let member = members::insert_member(&mut conn, &input).await?;
    info!("{} added member {} ({})", user.username, member.full_name(), member.id);
    Ok((StatusCode::CREATED, Json(member)))
}

/// PUT /api/members/:id
pub async fn update_member(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<MemberInput>,
) -> ApiResult<Json<Member>> {
    user.require(Permission::WriteMembers)?;
    let input = payload.normalized(&state.config.sms.default_country_code)?;
    let mut conn = state.db.acquire().await?;
    Ok(Json(members::update_member(&mut conn, &id, &input).await?))
}

/// PATCH /api/members/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> ApiResult<Json<Member>> {
    user.require(Permission::WriteMembers)?;
    Ok(Json(members::set_status(&state.db, &id, payload.status).await?))
}

/// DELETE /api/members/:id
pub async fn delete_member(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Permission::WriteMembers)?;
    let member = members::delete_member(&state.db, &id).await?;
    if let Some(url) = &member.photo_url {
        discard_photo(&state, url).await;
    }
    info!("{} deleted member {} ({})", user.username, member.full_name(), member.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a stored photo, logging rather than failing
async fn discard_photo(state: &AppState, url: &str) {
    let Some(key) = state.photos.key_for_url(url) else {
        warn!("Photo URL {} was not issued by the current store; leaving it", url);
        return;
    };
    if let Err(e) = state.photos.delete(&key).await {
        warn!("Failed to delete photo {}: {}", key, e);
    }
}

/// PUT /api/members/:id/photo
///
/// Raw image body; the key is derived from the content so identical uploads
/// land on the same object.
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Member>> {
    user.require(Permission::WriteMembers)?;
    let member = members::get_member(&state.db, &id).await?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let extension = extension_for(content_type)?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("photo body is empty".to_string()));
    }
    let max = state.config.storage.max_photo_bytes;
    if body.len() > max {
        return Err(ApiError::BadRequest(format!(
            "photo is {} bytes; the limit is {}",
            body.len(),
            max
        )));
    }

    let key = photo_key(&body, extension);
    let url = state.photos.put(&key, body.to_vec(), content_type).await?;
    members::set_photo_url(&state.db, &id, Some(&url)).await?;

    if let Some(previous) = member.photo_url.as_deref().filter(|p| *p != url) {
        discard_photo(&state, previous).await;
    }

    info!("Stored photo for member {} at {}", id, url);
    Ok(Json(members::get_member(&state.db, &id).await?))
}

/// DELETE /api/members/:id/photo
pub async fn delete_photo(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Member>> {
    user.require(Permission::WriteMembers)?;
    let member = members::get_member(&state.db, &id).await?;
    if let Some(url) = &member.photo_url {
        members::set_photo_url(&state.db, &id, None).await?;
        discard_photo(&state, url).await;
    }
    Ok(Json(members::get_member(&state.db, &id).await?))
}

/// Member routes; the photo upload accepts bodies up to `max_photo_bytes`
pub fn members_routes(max_photo_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/members", get(list_members).post(create_member))
        .route(
            "/api/members/:id",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route("/api/members/:id/status", patch(set_status))
        .route(
            "/api/members/:id/photo",
            put(upload_photo)
                .delete(delete_photo)
                .layer(DefaultBodyLimit::max(max_photo_bytes)),
        )
}
