//! Request, response, and failure types shared across the transport boundary

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigPatch, TransportConfig};

/// A single outgoing request.
///
/// Immutable once issued: a replay clones it and merges the freshest adapter
/// headers over the clone, never mutating the original. `retry_exempt` opts a
/// request out of the auth-refresh retry classification regardless of the
/// client-level exemption sets.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    /// Absolute URL (base + path)
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub retry_exempt: bool,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            retry_exempt: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        let mut config = Self::new(Method::POST, url);
        config.body = Some(body);
        config
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn retry_exempt(mut self) -> Self {
        self.retry_exempt = true;
        self
    }
}

/// A successful transport response. The body is parsed JSON (`Null` when the
/// server returned an empty body).
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

/// The HTTP side of a failed request, when a response was received at all.
#[derive(Debug, Clone)]
pub struct FailureResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// A failed transport call, carrying everything needed to classify and
/// replay it.
///
/// `response: None` means no HTTP response was received: a connection-level
/// failure (DNS, refused, reset, timeout).
#[derive(Debug, Clone)]
pub struct TransportFailure {
    /// The request as it was issued, reusable for a replay
    pub config: RequestConfig,
    pub message: String,
    pub response: Option<FailureResponse>,
}

impl TransportFailure {
    /// HTTP status of the failure, when a response was received.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Parse the structured server error payload, if the body carries one.
    ///
    /// Lenient: a missing or malformed payload yields `None` rather than an
    /// error, since plenty of failures (gateways, proxies) produce bodies the
    /// API never shaped.
    pub fn server_error(&self) -> Option<ServerErrorBody> {
        let response = self.response.as_ref()?;
        serde_json::from_value(response.body.clone()).ok()
    }
}

/// Structured error payload returned by the API:
/// `{ "status_code": 401, "category": "...", "content": { "type": "...", "description": "..." } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerErrorBody {
    pub status_code: u16,
    #[serde(default)]
    pub category: Option<String>,
    pub content: ErrorContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Errors produced by a transport adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request was issued but failed; replayable and classifiable
    #[error("{}", .0.message)]
    Failure(TransportFailure),

    /// The failure happened outside the transport itself (bad URL, invalid
    /// header, serialization); nothing to retry
    #[error("non-transport error: {0}")]
    NonTransport(String),
}

/// Abstraction over the HTTP machinery the resilience layer drives.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Snapshot of the current adapter config.
    fn get_config(&self) -> TransportConfig;

    /// Merge a partial config update.
    fn set_config(&self, patch: ConfigPatch);

    /// Issue a request. Used for fresh requests and for replaying suspended
    /// ones; the adapter must not retry on its own.
    fn request(
        &self,
        config: RequestConfig,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>>;
}
