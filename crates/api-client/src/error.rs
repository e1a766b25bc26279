//! Caller-facing error types
//!
//! `ApiError` reshapes a transport failure into the structured form callers
//! match on: HTTP status plus the server-reported category/type/description
//! when the body carried the API's error payload, with the raw transport
//! message as fallback when it did not.

use std::fmt;

use transport::TransportFailure;

/// Message used when a failure carries no parseable server payload.
pub const DEFAULT_ERROR_MESSAGE: &str = "UNKNOWN_ERROR";

/// Terminal API failure with whatever detail the server provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status; 0 when no response was received
    pub status: u16,
    pub category: Option<String>,
    pub error_type: Option<String>,
    pub description: Option<String>,
    /// `"[<status>] <type>"` for shaped payloads, transport message otherwise
    pub message: String,
}

impl ApiError {
    /// Build from a transport failure, extracting the server payload if the
    /// body is shaped like one.
    pub fn from_failure(failure: &TransportFailure) -> Self {
        let status = failure.status().unwrap_or(0);
        match failure.server_error() {
            Some(server) => Self {
                status,
                category: server.category,
                error_type: Some(server.content.kind.clone()),
                description: server.content.description,
                message: format!("[{}] {}", server.status_code, server.content.kind),
            },
            None => Self {
                status,
                category: None,
                error_type: None,
                description: None,
                message: if failure.message.is_empty() {
                    DEFAULT_ERROR_MESSAGE.to_string()
                } else {
                    failure.message.clone()
                },
            },
        }
    }

    /// Error name derived from the HTTP status.
    pub fn name(&self) -> &'static str {
        match self.status {
            400 => "ApiBadRequestError",
            401 => "ApiUnauthorizedError",
            403 => "ApiForbiddenError",
            404 => "ApiNotFoundError",
            500 => "ApiInternalServerError",
            _ => "ApiError",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message)
    }
}

/// Errors surfaced to the original caller of a request.
///
/// Suspended requests (network outage, expired token) never produce an error
/// eagerly; they settle once through their retry ticket, either with the
/// replay's outcome or, on a cancel flush, with the original `Api` error
/// captured at suspension time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Terminal API failure with server-reported details
    #[error("{0}")]
    Api(ApiError),

    /// Maintenance-mode response (400 + maintenance payload). The user-facing
    /// banner comes from the system-error callback; this variant only settles
    /// the caller.
    #[error("service under maintenance: {}", .description.as_deref().unwrap_or("no description"))]
    System { description: Option<String> },

    /// Client-side failure outside the transport
    #[error("non-transport error: {0}")]
    NonTransport(String),
}

/// Result alias for caller-facing operations.
pub type Result<T> = std::result::Result<T, Error>;
