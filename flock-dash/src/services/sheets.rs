//! Spreadsheet sources for sync
//!
//! A source returns a range as rows of cell text, header row first.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use flock_common::config::SheetsConfig;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Spreadsheet API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Range not found: {0}")]
    RangeNotFound(String),
}

#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Label recorded on sync runs
    fn describe(&self, range: &str) -> String;

    async fn fetch_rows(&self, range: &str) -> Result<Vec<Vec<String>>, SheetError>;
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Render a cell as text; numbers and booleans keep their JSON form
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets values API (`GET /v4/spreadsheets/{id}/values/{range}`)
pub struct GoogleSheetsSource {
    http_client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    api_key: String,
}

impl GoogleSheetsSource {
    pub fn new(base_url: &str, spreadsheet_id: &str, api_key: &str) -> Result<Self, SheetError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SheetError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// `None` when no spreadsheet is configured
    pub fn from_config(config: &SheetsConfig) -> Result<Option<Self>, SheetError> {
        match (&config.spreadsheet_id, &config.api_key) {
            (Some(id), Some(key)) => Ok(Some(Self::new(&config.base_url, id, key)?)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsSource {
    fn describe(&self, range: &str) -> String {
        format!("sheet:{}/{}", self.spreadsheet_id, range)
    }

    async fn fetch_rows(&self, range: &str) -> Result<Vec<Vec<String>>, SheetError> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, self.spreadsheet_id, range
        );
        debug!(range, "Fetching spreadsheet range");

        let response = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("majorDimension", "ROWS")])
            .send()
            .await
            .map_err(|e| SheetError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SheetError::RangeNotFound(range.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetError::ApiError(status.as_u16(), body));
        }

        let parsed: ValuesResponse = response
            .json()
            .await
            .map_err(|e| SheetError::ParseError(e.to_string()))?;

        Ok(parsed
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

/// Fixed ranges held in memory; used by tests and for offline imports
#[derive(Default)]
pub struct InMemorySheetSource {
    ranges: RwLock<HashMap<String, Vec<Vec<String>>>>,
}

impl InMemorySheetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_range(&self, range: &str, rows: Vec<Vec<String>>) {
        self.ranges.write().await.insert(range.to_string(), rows);
    }
}

#[async_trait]
impl SheetSource for InMemorySheetSource {
    fn describe(&self, range: &str) -> String {
        format!("memory:{}", range)
    }

    async fn fetch_rows(&self, range: &str) -> Result<Vec<Vec<String>>, SheetError> {
        self.ranges
            .read()
            .await
            .get(range)
            .cloned()
            .ok_or_else(|| SheetError::RangeNotFound(range.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_response_cells_become_text() {
        let json = r#"{"range":"Members!A1:C3","values":[["Name","Phone","Age"],["Ama Mensah",241234567,true],[]]}"#;
        let parsed: ValuesResponse = serde_json::from_str(json).unwrap();
        let rows: Vec<Vec<String>> = parsed
            .values
            .iter()
            .map(|r| r.iter().map(cell_text).collect())
            .collect();
        assert_eq!(rows[1], vec!["Ama Mensah", "241234567", "true"]);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn test_values_response_missing_values() {
        let parsed: ValuesResponse = serde_json::from_str(r#"{"range":"X"}"#).unwrap();
        assert!(parsed.values.is_empty());
    }

    #[test]
    fn test_from_config_requires_id_and_key() {
        assert!(GoogleSheetsSource::from_config(&SheetsConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source = InMemorySheetSource::new();
        source.set_range("Members!A1:Z", vec![vec!["Name".into()]]).await;
        assert_eq!(source.fetch_rows("Members!A1:Z").await.unwrap().len(), 1);
        assert!(matches!(
            source.fetch_rows("Tithes!A1:Z").await,
            Err(SheetError::RangeNotFound(_))
        ));
    }
}
