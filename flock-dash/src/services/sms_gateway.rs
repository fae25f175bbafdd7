//! SMS gateway clients
//!
//! The HTTP gateway speaks the common bulk-send JSON shape used by West
//! African SMS providers: `POST {endpoint}` with an `api-key` header and a
//! body of `{sender, message, recipients}`. The dry-run gateway is used when
//! no API key is configured and only logs what would have been sent.

use std::time::Duration;

use async_trait::async_trait;
use flock_common::config::SmsConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("flock-dash/", env!("CARGO_PKG_VERSION"));

/// Maximum broadcast body length (6 concatenated segments)
pub const MAX_BODY_CHARS: usize = 918;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Gateway rejected request {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Per-recipient result of a successful batch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub phone: String,
    pub provider_ref: Option<String>,
}

/// Sends one batch of identical messages
///
/// A batch either fails as a whole or returns one delivery per accepted
/// recipient; recipients missing from the result were not accepted.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn send_batch(&self, sender: &str, recipients: &[String], body: &str) -> Result<Vec<Delivery>, SmsError>;
}

/// Number of billable segments for a message body
///
/// A single message holds 160 characters; concatenated parts hold 153 each.
pub fn segment_count(body: &str) -> i64 {
    let len = body.chars().count();
    if len <= 160 {
        1
    } else {
        len.div_ceil(153) as i64
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    sender: &'a str,
    message: &'a str,
    recipients: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<SendResponseItem>,
}

#[derive(Debug, Deserialize)]
struct SendResponseItem {
    recipient: String,
    #[serde(default)]
    id: Option<String>,
}

/// Bulk JSON HTTP gateway
pub struct HttpSmsGateway {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSmsGateway {
    pub fn new(endpoint: String, api_key: String) -> Result<Self, SmsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SmsError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send_batch(&self, sender: &str, recipients: &[String], body: &str) -> Result<Vec<Delivery>, SmsError> {
        debug!(recipients = recipients.len(), "Sending SMS batch");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&SendRequest {
                sender,
                message: body,
                recipients,
            })
            .send()
            .await
            .map_err(|e| SmsError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SmsError::ApiError(status.as_u16(), text));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| SmsError::ParseError(e.to_string()))?;

        if !parsed.status.eq_ignore_ascii_case("success") {
            return Err(SmsError::ApiError(
                status.as_u16(),
                parsed.message.unwrap_or(parsed.status),
            ));
        }

        Ok(deliveries_from(recipients, &parsed.data))
    }
}

/// Map a success response onto the batch
///
/// Providers echo recipients without '+', so matching is on digits. An empty
/// `data` list accepts the whole batch; otherwise recipients the provider did
/// not echo back get no delivery.
fn deliveries_from(recipients: &[String], data: &[SendResponseItem]) -> Vec<Delivery> {
    if data.is_empty() {
        return recipients
            .iter()
            .map(|phone| Delivery {
                phone: phone.clone(),
                provider_ref: None,
            })
            .collect();
    }
    recipients
        .iter()
        .filter_map(|phone| {
            data.iter()
                .find(|item| item.recipient.trim_start_matches('+') == phone.as_str())
                .map(|item| Delivery {
                    phone: phone.clone(),
                    provider_ref: item.id.clone(),
                })
        })
        .collect()
}

/// Logs broadcasts without contacting any provider
#[derive(Debug, Default)]
pub struct DryRunGateway;

#[async_trait]
impl SmsGateway for DryRunGateway {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send_batch(&self, sender: &str, recipients: &[String], body: &str) -> Result<Vec<Delivery>, SmsError> {
        info!(
            sender,
            recipients = recipients.len(),
            chars = body.chars().count(),
            "SMS dry run (no api_key configured)"
        );
        Ok(recipients
            .iter()
            .map(|phone| Delivery {
                phone: phone.clone(),
                provider_ref: None,
            })
            .collect())
    }
}

/// Build the gateway described by `[sms]`
pub fn from_config(config: &SmsConfig) -> Result<Box<dyn SmsGateway>, SmsError> {
    match &config.api_key {
        Some(key) if !key.trim().is_empty() => Ok(Box::new(HttpSmsGateway::new(
            config.endpoint.clone(),
            key.clone(),
        )?)),
        _ => Ok(Box::new(DryRunGateway)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(""), 1);
        assert_eq!(segment_count(&"a".repeat(160)), 1);
        assert_eq!(segment_count(&"a".repeat(161)), 2);
        assert_eq!(segment_count(&"a".repeat(306)), 2);
        assert_eq!(segment_count(&"a".repeat(307)), 3);
        assert_eq!(segment_count(&"a".repeat(MAX_BODY_CHARS)), 6);
    }

    #[test]
    fn test_segment_count_uses_chars() {
        // 160 two-byte characters is still one segment
        assert_eq!(segment_count(&"é".repeat(160)), 1);
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"status":"success","data":[{"recipient":"233241234567","id":"abc"}]}"#;
        let parsed: SendResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_unechoed_recipients_get_no_delivery() {
        let recipients = vec!["233241234567".to_string(), "233201234567".to_string()];
        let data = vec![SendResponseItem {
            recipient: "+233241234567".to_string(),
            id: Some("a".to_string()),
        }];
        let out = deliveries_from(&recipients, &data);
        assert_eq!(
            out,
            vec![Delivery {
                phone: "233241234567".to_string(),
                provider_ref: Some("a".to_string()),
            }]
        );
    }

    #[test]
    fn test_empty_data_accepts_batch() {
        let recipients = vec!["233241234567".to_string(), "233201234567".to_string()];
        let out = deliveries_from(&recipients, &[]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.provider_ref.is_none()));
    }

    /// Serve one canned JSON response on a random local port
    async fn mock_provider(reply: serde_json::Value) -> String {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route("/send", post(move || async move { Json(reply) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/send", addr)
    }

    #[tokio::test]
    async fn test_http_gateway_partial_acceptance() {
        let endpoint = mock_provider(serde_json::json!({
            "status": "success",
            "data": [{ "recipient": "233241234567", "id": "a" }]
        }))
        .await;
        let gateway = HttpSmsGateway::new(endpoint, "key".to_string()).unwrap();

        let out = gateway
            .send_batch("CHURCH", &["233241234567".to_string(), "233201234567".to_string()], "hi")
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].phone, "233241234567");
        assert_eq!(out[0].provider_ref.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_http_gateway_error_status() {
        let endpoint = mock_provider(serde_json::json!({ "status": "error", "message": "low balance" })).await;
        let gateway = HttpSmsGateway::new(endpoint, "key".to_string()).unwrap();

        let err = gateway
            .send_batch("CHURCH", &["233241234567".to_string()], "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::ApiError(_, ref msg) if msg == "low balance"));
    }

    #[tokio::test]
    async fn test_dry_run_accepts_everyone() {
        let gateway = DryRunGateway;
        let out = gateway
            .send_batch("CHURCH", &["233241234567".to_string(), "233201234567".to_string()], "hi")
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(gateway.name(), "dry-run");
    }

    #[test]
    fn test_from_config_without_key_is_dry_run() {
        let gateway = from_config(&SmsConfig::default()).unwrap();
        assert_eq!(gateway.name(), "dry-run");
    }
}
