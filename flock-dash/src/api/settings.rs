//! Operator-editable settings

use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Extension, Json, Router};
use flock_common::auth::Permission;
use flock_common::db::settings::{get_all_settings, is_known_setting, set_setting};
use tracing::info;

use super::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    let settings = get_all_settings(&state.db).await?;
    Ok(Json(settings.into_iter().map(|s| (s.key, s.value)).collect()))
}

/// PUT /api/settings
///
/// Every key must be known; nothing is written if any key is rejected.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    user.require(Permission::ManageUsers)?;

    if let Some(unknown) = payload.keys().find(|k| !is_known_setting(k)) {
        return Err(ApiError::BadRequest(format!("unknown setting '{}'", unknown)));
    }

    for (key, value) in &payload {
        set_setting(&state.db, key, value.trim()).await?;
        info!("{} set {} = {:?}", user.username, key, value.trim());
    }

    get_settings(State(state), Extension(user)).await
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).put(update_settings))
}
