//! Session authentication
//!
//! Clients log in with username and password and receive an opaque bearer
//! token. The middleware resolves the token to a [`CurrentUser`] request
//! extension; handlers then check the permission they need.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use flock_common::auth::{Permission, Role};
use flock_common::db::models::User;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// The authenticated caller of a protected request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub role: Role,
    /// Bearer token presented with the request
    pub token: String,
}

impl CurrentUser {
    pub fn can(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }

    /// 403 unless the user's role grants `permission`
    pub fn require(&self, permission: Permission) -> ApiResult<()> {
        if self.can(permission) {
            Ok(())
        } else {
            debug!("{} ({}) denied {:?}", self.username, self.role, permission);
            Err(ApiError::Forbidden(format!(
                "role '{}' may not perform this action",
                self.role
            )))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Authentication middleware
///
/// Applied to protected routes only. Returns 401 when the token is missing,
/// unknown, expired or belongs to a deactivated user.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let user = users::user_for_token(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired session".to_string()))?;

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
        role: user.role,
        token,
    });

    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, session) = users::login(
        &state.db,
        &payload.username,
        &payload.password,
        state.config.server.session_ttl_hours,
    )
    .await?;

    info!("User {} logged in", user.username);

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    users::revoke_token(&state.db, &user.token).await?;
    info!("User {} logged out", user.username);
    Ok(Json(serde_json::json!({ "status": "logged_out" })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<User>> {
    Ok(Json(users::get_user(&state.db, &user.id).await?))
}

/// Public: login
pub fn login_routes() -> Router<AppState> {
    Router::new().route("/api/auth/login", post(login))
}

/// Protected: logout and whoami
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc123")).as_deref(), Some("abc123"));
        assert_eq!(bearer_token(&headers("bearer  abc123 ")).as_deref(), Some("abc123"));
        assert_eq!(bearer_token(&headers("Basic abc123")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_require_permission() {
        let viewer = CurrentUser {
            id: "u1".into(),
            username: "viewer".into(),
            role: Role::Viewer,
            token: "t".into(),
        };
        assert!(viewer.require(Permission::ReadMembers).is_ok());
        assert!(matches!(
            viewer.require(Permission::WriteMembers),
            Err(ApiError::Forbidden(_))
        ));
    }
}
