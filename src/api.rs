//! Dashboard backend API client.
//!
//! Provides authenticated HTTP communication with the back-office backend,
//! shared by the payment provider and the order gateway. Owns base-URL
//! normalisation and the mapping from transport/HTTP failures to
//! user-presentable errors.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::PaymentsConfig;
use crate::error::ApiError;

/// Header carrying the dashboard API key.
const API_KEY_HEADER: &str = "X-Backoffice-API-Key";

/// Header carrying the caller-supplied idempotency key, where one applies.
const IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // Strip trailing slashes again (in case "/api/" was present)
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> ApiError {
    if err.is_connect() {
        return ApiError::Network(format!("Cannot reach backend at {url}"));
    }
    if err.is_timeout() {
        return ApiError::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return ApiError::Network(format!("Invalid backend URL: {url}"));
    }
    ApiError::Network(format!("Network error communicating with {url}: {err}"))
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Terminal not authorized".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// Build an `ApiError::Status` from a non-success response body, preserving
/// validation details the backend may have included.
fn status_error_with_body(status: StatusCode, body_text: &str) -> ApiError {
    let message = if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        let message = json
            .get("error")
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| status_error(status));
        match json.get("details").or_else(|| json.get("errors")) {
            Some(details) => format!("{message}: {details}"),
            None => message,
        }
    } else if !body_text.trim().is_empty() {
        format!("{}: {}", status_error(status), body_text.trim())
    } else {
        status_error(status)
    };

    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated HTTP client for the dashboard backend.
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url),
            api_key: config.api_key.clone(),
        })
    }

    /// Perform an authenticated request and decode the JSON response.
    ///
    /// `path` should include the leading slash, e.g.
    /// `/api/pos/payments/qr/intents`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let full_url = format!("{}{path}", self.base_url);

        let mut req = self
            .http
            .request(method, &full_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json");

        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();

        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_error_with_body(status, &body_text));
        }

        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        Ok(serde_json::from_str(&body_text)?)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("admin.thesmall.app"),
            "https://admin.thesmall.app"
        );
        assert_eq!(
            normalize_base_url("localhost:3000"),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_base_url("https://admin.thesmall.app/"),
            "https://admin.thesmall.app"
        );
        assert_eq!(
            normalize_base_url("https://admin.thesmall.app/api/"),
            "https://admin.thesmall.app"
        );
        assert_eq!(
            normalize_base_url("  https://admin.thesmall.app/api  "),
            "https://admin.thesmall.app"
        );
    }

    #[test]
    fn test_status_error_messages() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            "API key is invalid or expired"
        );
        assert_eq!(status_error(StatusCode::FORBIDDEN), "Terminal not authorized");
        assert_eq!(
            status_error(StatusCode::NOT_FOUND),
            "Backend endpoint not found"
        );
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR),
            "Backend server error (HTTP 500)"
        );
    }

    #[test]
    fn test_status_error_with_body_extracts_message() {
        let err = status_error_with_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":"Order already paid","details":{"orderId":"ord-1"}}"#,
        );
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 422);
                assert!(message.starts_with("Order already paid"));
                assert!(message.contains("ord-1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_error_with_body_falls_back_to_status_text() {
        let err = status_error_with_body(StatusCode::BAD_GATEWAY, "upstream exploded");
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("upstream exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
