//! Shared harness for flock-dash integration tests
//!
//! Each test gets a fresh database in a temp folder, a local photo store,
//! a recording SMS gateway and an in-memory spreadsheet.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use flock_common::config::FlockConfig;
use flock_common::db::{bootstrap_admin, init_database};
use flock_dash::services::photo_store::LocalPhotoStore;
use flock_dash::services::sheets::InMemorySheetSource;
use flock_dash::services::sms_gateway::{Delivery, SmsError, SmsGateway};
use flock_dash::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

pub const ADMIN_PASSWORD: &str = "admin-password";

/// Records every batch
///
/// Batches containing a number in `fail_for` fail whole; numbers in
/// `drop_for` are left out of an otherwise successful reply.
#[derive(Default)]
pub struct RecordingGateway {
    pub batches: Mutex<Vec<Vec<String>>>,
    pub fail_for: Mutex<HashSet<String>>,
    pub drop_for: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn fail_for(&self, phone: &str) {
        self.fail_for.lock().unwrap().insert(phone.to_string());
    }

    pub fn drop_for(&self, phone: &str) {
        self.drop_for.lock().unwrap().insert(phone.to_string());
    }
}

#[async_trait]
impl SmsGateway for RecordingGateway {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_batch(&self, _sender: &str, recipients: &[String], _body: &str) -> Result<Vec<Delivery>, SmsError> {
        self.batches.lock().unwrap().push(recipients.to_vec());
        let fail = {
            let fail_for = self.fail_for.lock().unwrap();
            recipients.iter().any(|r| fail_for.contains(r))
        };
        if fail {
            return Err(SmsError::ApiError(500, "provider unavailable".to_string()));
        }
        let drop_for = self.drop_for.lock().unwrap().clone();
        Ok(recipients
            .iter()
            .enumerate()
            .filter(|(_, phone)| !drop_for.contains(*phone))
            .map(|(i, phone)| Delivery {
                phone: phone.clone(),
                provider_ref: Some(format!("msg-{}", i)),
            })
            .collect())
    }
}

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub sms: Arc<RecordingGateway>,
    pub sheets: Arc<InMemorySheetSource>,
    pub dir: TempDir,
    pub admin_token: String,
}

pub fn test_config() -> FlockConfig {
    let mut config = FlockConfig::default();
    config.sms.batch_size = 2;
    config.storage.max_photo_bytes = 64 * 1024;
    config
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: FlockConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("flock.db")).await.unwrap();
        bootstrap_admin(&pool, Some(ADMIN_PASSWORD)).await.unwrap();

        let photos_dir = dir.path().join("photos");
        let sms = Arc::new(RecordingGateway::default());
        let sheets = Arc::new(InMemorySheetSource::new());

        let state = AppState::new(
            pool.clone(),
            config,
            sms.clone(),
            Arc::new(LocalPhotoStore::new(&photos_dir)),
        )
        .with_sheets(sheets.clone())
        .with_photos_dir(&photos_dir);

        let app = build_router(state);

        let mut test_app = Self {
            app,
            pool,
            sms,
            sheets,
            dir,
            admin_token: String::new(),
        };
        test_app.admin_token = test_app.login("admin", ADMIN_PASSWORD).await;
        test_app
    }

    /// Send a JSON request; returns status and parsed body (Null when empty)
    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, body)
    }

    /// Request as the bootstrap admin
    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, Some(&self.admin_token.clone()), body).await
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Create a user with `role` and return a logged-in token for it
    pub async fn user_with_role(&self, username: &str, role: &str) -> String {
        let (status, body) = self
            .admin(
                "POST",
                "/api/users",
                Some(json!({
                    "username": username,
                    "display_name": username,
                    "password": "password123",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user failed: {}", body);
        self.login(username, "password123").await
    }

    /// Create a member and return its id
    pub async fn member(&self, first: &str, last: &str, phone: Option<&str>) -> String {
        let (status, body) = self
            .admin(
                "POST",
                "/api/members",
                Some(json!({ "first_name": first, "last_name": last, "phone": phone })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create member failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }
}
