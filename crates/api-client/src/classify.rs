//! Failure classification
//!
//! Maps a raw transport failure into one of five handling categories. First
//! match wins and exactly one category is produced per failure:
//!
//! 1. non-transport error → `NonTransport` (nothing to retry)
//! 2. 400 + `content.type == "maintenance"` → `System`
//! 3. no response received while connectivity is reported down → `NetworkOutage`
//! 4. 401 + refresh-triggering error type on a non-exempt URL → `AuthExpired`
//! 5. everything else → `Generic`
//!
//! Only `NetworkOutage` and `AuthExpired` are retryable; the dispatcher in
//! `client` creates retry tickets for those two alone.

use std::collections::HashSet;

use transport::TransportError;

use crate::error::ApiError;

/// Server error type marking a platform-wide maintenance window.
const MAINTENANCE_ERROR_TYPE: &str = "maintenance";

/// Classification of a failed request.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Maintenance window: user-notified via callback, not retried
    System { description: Option<String> },
    /// Connection-level failure during a reported outage; retryable
    NetworkOutage,
    /// Access token expired; retryable after refresh
    AuthExpired,
    /// Terminal failure propagated to the caller
    Generic(ApiError),
    /// Failure outside the transport; forwarded raw to its callback
    NonTransport(String),
}

/// Inputs the classifier needs beyond the failure itself.
#[derive(Debug)]
pub struct ClassifyContext<'a> {
    /// Whether the platform currently reports network connectivity
    pub network_connected: bool,
    /// Absolute URLs exempt from auth-refresh retry classification
    pub not_require_retry_urls: &'a HashSet<String>,
    /// Server error types that indicate an expired access token
    pub require_update_error_types: &'a HashSet<String>,
}

/// Classify a failed request. Pure: no side effects, no callback invocation.
pub fn classify(error: &TransportError, ctx: &ClassifyContext<'_>) -> ErrorCategory {
    let failure = match error {
        TransportError::NonTransport(message) => {
            return ErrorCategory::NonTransport(message.clone());
        }
        TransportError::Failure(failure) => failure,
    };

    let server = failure.server_error();

    if failure.status() == Some(400)
        && server
            .as_ref()
            .is_some_and(|s| s.content.kind == MAINTENANCE_ERROR_TYPE)
    {
        return ErrorCategory::System {
            description: server.and_then(|s| s.content.description),
        };
    }

    if failure.response.is_none() && !ctx.network_connected {
        return ErrorCategory::NetworkOutage;
    }

    if !failure.config.retry_exempt
        && !ctx.not_require_retry_urls.contains(&failure.config.url)
        && failure.status() == Some(401)
        && server
            .as_ref()
            .is_some_and(|s| ctx.require_update_error_types.contains(&s.content.kind))
    {
        return ErrorCategory::AuthExpired;
    }

    ErrorCategory::Generic(ApiError::from_failure(failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::{FailureResponse, RequestConfig, TransportFailure};

    const ME_URL: &str = "https://api.example.com/user/v1/me";
    const TOKEN_URL: &str = "https://api.example.com/auth/v1/token";

    fn ctx<'a>(
        connected: bool,
        retry_urls: &'a HashSet<String>,
        types: &'a HashSet<String>,
    ) -> ClassifyContext<'a> {
        ClassifyContext {
            network_connected: connected,
            not_require_retry_urls: retry_urls,
            require_update_error_types: types,
        }
    }

    fn refresh_types() -> HashSet<String> {
        HashSet::from([
            "unauthorized_token_error".to_string(),
            "token_expired_error".to_string(),
            "access_token_expired_error".to_string(),
        ])
    }

    fn http_failure(url: &str, status: u16, body: serde_json::Value) -> TransportError {
        TransportError::Failure(TransportFailure {
            config: RequestConfig::get(url),
            message: format!("request failed with status {status}"),
            response: Some(FailureResponse { status, body }),
        })
    }

    fn network_failure(url: &str) -> TransportError {
        TransportError::Failure(TransportFailure {
            config: RequestConfig::get(url),
            message: "network request failed: connection refused".into(),
            response: None,
        })
    }

    fn expired_401(url: &str) -> TransportError {
        http_failure(
            url,
            401,
            serde_json::json!({
                "status_code": 401,
                "category": "auth",
                "content": { "type": "access_token_expired_error" }
            }),
        )
    }

    #[test]
    fn non_transport_error_short_circuits() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = TransportError::NonTransport("invalid request: bad url".into());

        // Even with conditions that would match later branches
        let category = classify(&error, &ctx(false, &retry_urls, &types));
        assert_eq!(
            category,
            ErrorCategory::NonTransport("invalid request: bad url".into())
        );
    }

    #[test]
    fn maintenance_400_is_system_error() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = http_failure(
            ME_URL,
            400,
            serde_json::json!({
                "status_code": 400,
                "content": { "type": "maintenance", "description": "back at 06:00 UTC" }
            }),
        );

        assert_eq!(
            classify(&error, &ctx(true, &retry_urls, &types)),
            ErrorCategory::System {
                description: Some("back at 06:00 UTC".into())
            }
        );
    }

    #[test]
    fn maintenance_type_on_other_status_is_generic() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = http_failure(
            ME_URL,
            503,
            serde_json::json!({
                "status_code": 503,
                "content": { "type": "maintenance" }
            }),
        );

        assert!(matches!(
            classify(&error, &ctx(true, &retry_urls, &types)),
            ErrorCategory::Generic(_)
        ));
    }

    #[test]
    fn plain_400_is_generic() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = http_failure(
            ME_URL,
            400,
            serde_json::json!({
                "status_code": 400,
                "content": { "type": "validation_error" }
            }),
        );

        assert!(matches!(
            classify(&error, &ctx(true, &retry_urls, &types)),
            ErrorCategory::Generic(_)
        ));
    }

    #[test]
    fn connection_failure_while_disconnected_is_outage() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        assert_eq!(
            classify(&network_failure(ME_URL), &ctx(false, &retry_urls, &types)),
            ErrorCategory::NetworkOutage
        );
    }

    #[test]
    fn connection_failure_while_connected_is_generic() {
        // A transient blip while the platform still reports connectivity is
        // not treated as an outage
        let retry_urls = HashSet::new();
        let types = refresh_types();
        assert!(matches!(
            classify(&network_failure(ME_URL), &ctx(true, &retry_urls, &types)),
            ErrorCategory::Generic(_)
        ));
    }

    #[test]
    fn expired_401_triggers_auth_expired() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        assert_eq!(
            classify(&expired_401(ME_URL), &ctx(true, &retry_urls, &types)),
            ErrorCategory::AuthExpired
        );
    }

    #[test]
    fn retry_exempt_url_is_generic() {
        let retry_urls = HashSet::from([TOKEN_URL.to_string()]);
        let types = refresh_types();
        assert!(matches!(
            classify(&expired_401(TOKEN_URL), &ctx(true, &retry_urls, &types)),
            ErrorCategory::Generic(_)
        ));
    }

    #[test]
    fn retry_exempt_flag_is_generic() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = TransportError::Failure(TransportFailure {
            config: RequestConfig::get(ME_URL).retry_exempt(),
            message: "request failed with status 401".into(),
            response: Some(FailureResponse {
                status: 401,
                body: serde_json::json!({
                    "status_code": 401,
                    "content": { "type": "access_token_expired_error" }
                }),
            }),
        });

        assert!(matches!(
            classify(&error, &ctx(true, &retry_urls, &types)),
            ErrorCategory::Generic(_)
        ));
    }

    #[test]
    fn unknown_error_type_on_401_is_generic() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = http_failure(
            ME_URL,
            401,
            serde_json::json!({
                "status_code": 401,
                "content": { "type": "wrong_password_error" }
            }),
        );

        assert!(matches!(
            classify(&error, &ctx(true, &retry_urls, &types)),
            ErrorCategory::Generic(_)
        ));
    }

    #[test]
    fn generic_carries_server_details() {
        let retry_urls = HashSet::new();
        let types = refresh_types();
        let error = http_failure(
            ME_URL,
            403,
            serde_json::json!({
                "status_code": 403,
                "category": "user",
                "content": { "type": "suspended_user_error", "description": "account suspended" }
            }),
        );

        match classify(&error, &ctx(true, &retry_urls, &types)) {
            ErrorCategory::Generic(api) => {
                assert_eq!(api.status, 403);
                assert_eq!(api.category.as_deref(), Some("user"));
                assert_eq!(api.error_type.as_deref(), Some("suspended_user_error"));
                assert_eq!(api.description.as_deref(), Some("account suspended"));
            }
            other => panic!("expected Generic, got {other:?}"),
        }
    }
}
