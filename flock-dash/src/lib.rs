//! flock-dash library - church management dashboard service
//!
//! Members, departments, attendance, finance, shepherding, SMS broadcast,
//! reports and spreadsheet sync behind a token-authenticated JSON API.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use flock_common::config::FlockConfig;
use sqlx::SqlitePool;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;
pub mod sync;
pub mod validation;

use services::{PhotoStore, SheetSource, SmsGateway};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<FlockConfig>,
    pub sms: Arc<dyn SmsGateway>,
    pub photos: Arc<dyn PhotoStore>,
    /// Spreadsheet source for `POST /api/sync/:dataset`; none when unconfigured
    pub sheets: Option<Arc<dyn SheetSource>>,
    /// Directory served at `/photos` when the local photo store is in use
    pub photos_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: FlockConfig,
        sms: Arc<dyn SmsGateway>,
        photos: Arc<dyn PhotoStore>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            sms,
            photos,
            sheets: None,
            photos_dir: None,
        }
    }

    pub fn with_sheets(mut self, sheets: Arc<dyn SheetSource>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn with_photos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.photos_dir = Some(dir.into());
        self
    }
}

/// Build application router
///
/// Everything under `/api` except login requires a bearer token; the web
/// shell, health check and local photos are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;
    use tower_http::cors::CorsLayer;
    use tower_http::services::ServeDir;
    use tower_http::trace::TraceLayer;

    let protected = Router::new()
        .merge(api::session_routes())
        .merge(api::users_routes())
        .merge(api::members_routes(state.config.storage.max_photo_bytes))
        .merge(api::departments_routes())
        .merge(api::attendance_routes())
        .merge(api::finance_routes())
        .merge(api::shepherding_routes())
        .merge(api::sms_routes())
        .merge(api::reports_routes())
        .merge(api::sync_routes())
        .merge(api::settings_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let mut public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .merge(api::login_routes())
        .merge(api::health_routes());

    if let Some(dir) = &state.photos_dir {
        public = public.nest_service(services::photo_store::LOCAL_PHOTOS_ROUTE, ServeDir::new(dir));
    }

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
