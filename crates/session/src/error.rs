//! Error types for session operations

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The refresh token itself was rejected (expired, reused): terminal,
    /// never retried
    #[error("refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("sign-out failed: {0}")]
    SignOut(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("session payload parse error: {0}")]
    Parse(String),

    /// Failure reported by a revoke collaborator
    #[error("collaborator failed: {0}")]
    Collaborator(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
