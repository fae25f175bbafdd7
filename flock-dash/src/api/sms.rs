//! SMS broadcast and message log

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use flock_common::auth::Permission;
use flock_common::db::models::SmsMessage;

use super::auth::CurrentUser;
use crate::db::sms::{self, MessageDetail};
use crate::error::ApiResult;
use crate::pagination::{Page, PageQuery};
use crate::services::broadcast::{BroadcastRequest, Broadcaster};
use crate::AppState;

/// POST /api/sms/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<BroadcastRequest>,
) -> ApiResult<Json<MessageDetail>> {
    user.require(Permission::SendSms)?;

    let config = &state.config.sms;
    let broadcaster = Broadcaster {
        pool: &state.db,
        gateway: state.sms.as_ref(),
        sender_id: &config.sender_id,
        country_code: &config.default_country_code,
        batch_size: config.batch_size,
    };

    Ok(Json(broadcaster.send(payload, Some(&user.id)).await?))
}

/// GET /api/sms/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<SmsMessage>>> {
    user.require(Permission::SendSms)?;
    Ok(Json(sms::list_messages(&state.db, query.page, query.page_size).await?))
}

/// GET /api/sms/messages/:id
pub async fn get_message(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageDetail>> {
    user.require(Permission::SendSms)?;
    Ok(Json(sms::get_message_detail(&state.db, &id).await?))
}

pub fn sms_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sms/broadcast", post(broadcast))
        .route("/api/sms/messages", get(list_messages))
        .route("/api/sms/messages/:id", get(get_message))
}
