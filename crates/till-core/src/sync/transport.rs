//! HTTP client for the log server.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::wire::{batch_log_ids, created_log_id, BatchPayload, LogPayload, UndoReceipt};
use super::{SyncError, SyncResult};
use crate::models::LogEntry;
use crate::util::{body_excerpt, non_blank, server_base_url};

/// Requests the sync engine and logging service issue against the log server
pub trait LogTransport: Send + Sync + 'static {
    /// Push one entry; returns the server-assigned id when the server reported one
    fn send_entry(
        &self,
        entry: &LogEntry,
        timeout: Duration,
    ) -> impl Future<Output = SyncResult<Option<String>>> + Send;

    /// Push a batch; success acknowledges every entry of the batch.
    ///
    /// Returns the server ids the server reported, keyed by client id.
    fn send_batch(
        &self,
        entries: &[LogEntry],
        timeout: Duration,
    ) -> impl Future<Output = SyncResult<HashMap<Uuid, String>>> + Send;

    /// Ask the server to reverse the logged mutation with the given server id
    fn request_undo(&self, server_id: &str) -> impl Future<Output = SyncResult<UndoReceipt>> + Send;

    /// Cheap reachability check
    fn health(&self, timeout: Duration) -> impl Future<Output = SyncResult<()>> + Send;
}

#[derive(Clone)]
pub struct HttpLogTransport {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpLogTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpLogTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpLogTransport {
    pub fn new(base_url: impl Into<String>) -> SyncResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl LogTransport for HttpLogTransport {
    async fn send_entry(&self, entry: &LogEntry, timeout: Duration) -> SyncResult<Option<String>> {
        let response = self
            .client
            .post(self.url("/logs"))
            .timeout(timeout)
            .json(&LogPayload::from(entry))
            .send()
            .await?;

        let body = success_body(response).await?;
        Ok(created_log_id(&body))
    }

    async fn send_batch(
        &self,
        entries: &[LogEntry],
        timeout: Duration,
    ) -> SyncResult<HashMap<Uuid, String>> {
        let payload = BatchPayload {
            logs: entries.iter().map(LogPayload::from).collect(),
        };
        let response = self
            .client
            .post(self.url("/logs/batch"))
            .timeout(timeout)
            .json(&payload)
            .send()
            .await?;

        let body = success_body(response).await?;
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(SyncError::Api(
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("batch rejected")
                    .to_string(),
            ));
        }
        Ok(batch_log_ids(&body))
    }

    async fn request_undo(&self, server_id: &str) -> SyncResult<UndoReceipt> {
        let server_id = server_id.trim();
        if server_id.is_empty() {
            return Err(SyncError::InvalidConfiguration(
                "server log id must not be empty".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.url(&format!("/logs/{server_id}/undo")))
            .header("Accept", "application/json")
            .send()
            .await?;

        let body = success_body(response).await?;
        serde_json::from_value(body).map_err(|error| SyncError::InvalidPayload(error.to_string()))
    }

    async fn health(&self, timeout: Duration) -> SyncResult<()> {
        let response = self
            .client
            .get(self.url("/healthz"))
            .timeout(timeout)
            .send()
            .await?;
        success_body(response).await.map(|_| ())
    }
}

async fn success_body(response: reqwest::Response) -> SyncResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Api(parse_api_error(status, &body)));
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|error| SyncError::InvalidPayload(error.to_string()))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> SyncResult<String> {
    let raw = non_blank(&raw).ok_or_else(|| {
        SyncError::InvalidConfiguration("log server URL must not be empty".to_string())
    })?;
    server_base_url(&raw).ok_or_else(|| {
        SyncError::InvalidConfiguration("log server URL must include http:// or https://".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("pos.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        let transport = HttpLogTransport::new(" https://pos.example.com/api/ ").unwrap();
        assert_eq!(transport.base_url(), "https://pos.example.com/api");
        assert_eq!(transport.url("/logs"), "https://pos.example.com/api/logs");
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let message = parse_api_error(StatusCode::NOT_FOUND, r#"{"error":"Log not found: 9"}"#);
        assert_eq!(message, "Log not found: 9 (404)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "boom (500)"
        );
    }
}
