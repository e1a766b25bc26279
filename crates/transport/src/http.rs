//! Default reqwest-backed transport adapter
//!
//! One shared `reqwest::Client` with a fixed client-level timeout; there is
//! no per-request budget. Adapter config lives behind a mutex so the auth
//! token and default headers can be patched while requests are in flight.
//! Invalid header names/values from config are skipped with a warning rather
//! than failing the whole request.

use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::config::{ConfigPatch, TransportConfig};
use crate::types::{
    FailureResponse, RequestConfig, Transport, TransportError, TransportFailure, TransportResponse,
};

/// Client-level request budget applied once at construction.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Reqwest-backed `Transport` implementation.
pub struct HttpTransport {
    client: reqwest::Client,
    config: Mutex<TransportConfig>,
}

impl HttpTransport {
    /// Build an adapter with the default 60 s timeout.
    pub fn new(base_url: impl Into<String>) -> common::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Build an adapter with an explicit client-level timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| common::Error::Config(format!("building http client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wrap a caller-provided `reqwest::Client` (timeouts, proxies, and TLS
    /// already configured by the caller).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            config: Mutex::new(TransportConfig {
                base_url: base_url.into(),
                ..TransportConfig::default()
            }),
        }
    }

    fn lock_config(&self) -> std::sync::MutexGuard<'_, TransportConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build the outgoing header map: adapter defaults first, request headers win.
fn build_headers(defaults: &TransportConfig, request: &RequestConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in defaults.headers.iter().chain(request.headers.iter()) {
        let name = match HeaderName::from_str(name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
    headers
}

impl Transport for HttpTransport {
    fn get_config(&self) -> TransportConfig {
        self.lock_config().clone()
    }

    fn set_config(&self, patch: ConfigPatch) {
        self.lock_config().apply(patch);
    }

    fn request(
        &self,
        config: RequestConfig,
    ) -> std::pin::Pin<
        Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>,
    > {
        Box::pin(async move {
            let snapshot = self.get_config();
            let headers = build_headers(&snapshot, &config);

            let mut request = self
                .client
                .request(config.method.clone(), &config.url)
                .headers(headers);
            if let Some(body) = &config.body {
                request = request.json(body);
            }

            debug!(method = %config.method, url = %config.url, "issuing request");

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_builder() => {
                    return Err(TransportError::NonTransport(format!(
                        "invalid request: {e}"
                    )));
                }
                Err(e) => {
                    return Err(TransportError::Failure(TransportFailure {
                        config,
                        message: format!("network request failed: {e}"),
                        response: None,
                    }));
                }
            };

            let status = response.status().as_u16();
            let response_headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Err(TransportError::Failure(TransportFailure {
                        config,
                        message: format!("response body read failed: {e}"),
                        response: None,
                    }));
                }
            };
            let body: serde_json::Value = if text.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
            };

            if (200..300).contains(&status) {
                return Ok(TransportResponse {
                    status,
                    headers: response_headers,
                    body,
                });
            }

            Err(TransportError::Failure(TransportFailure {
                config,
                message: format!("request failed with status {status}"),
                response: Some(FailureResponse { status, body }),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_request_returns_parsed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/v1/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nickname": "dana"
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let response = transport
            .request(RequestConfig::get(format!("{}/user/v1/me", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body["nickname"], "dana");
    }

    #[tokio::test]
    async fn default_headers_sent_and_request_headers_win() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("device-type", "ios"))
            .and(header("x-trace", "override"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        transport.set_config(ConfigPatch::headers(std::collections::HashMap::from([
            ("device-type".to_string(), "ios".to_string()),
            ("x-trace".to_string(), "default".to_string()),
        ])));

        let response = transport
            .request(RequestConfig::get(format!("{}/ping", server.uri())).header("x-trace", "override"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn error_status_surfaces_replayable_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/v1/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status_code": 401,
                "category": "auth",
                "content": { "type": "access_token_expired_error", "description": "expired" }
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let url = format!("{}/user/v1/me", server.uri());
        let err = transport
            .request(RequestConfig::get(&url))
            .await
            .unwrap_err();

        match err {
            TransportError::Failure(failure) => {
                assert_eq!(failure.status(), Some(401));
                assert_eq!(failure.config.url, url);
                let server_error = failure.server_error().unwrap();
                assert_eq!(server_error.content.kind, "access_token_expired_error");
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_failure_has_no_response() {
        // Nothing listens on this port
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let err = transport
            .request(RequestConfig::get("http://127.0.0.1:9/ping"))
            .await
            .unwrap_err();

        match err {
            TransportError::Failure(failure) => {
                assert!(failure.response.is_none());
                assert!(failure.message.starts_with("network request failed"));
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_body_parses_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/sign-out"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let response = transport
            .request(RequestConfig::post(
                format!("{}/auth/v1/sign-out", server.uri()),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert!(response.body.is_null());
    }

    #[tokio::test]
    async fn invalid_config_header_is_skipped_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        transport.set_config(ConfigPatch::headers(std::collections::HashMap::from([(
            "bad header name".to_string(),
            "value".to_string(),
        )])));

        let response = transport
            .request(RequestConfig::get(format!("{}/ping", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }
}
