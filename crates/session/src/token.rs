//! Session token endpoint calls
//!
//! The refresh endpoint authenticates with the *refresh* token as the Bearer
//! credential and returns a rotated pair. Because refresh tokens are
//! single-use, a rejection carrying a terminal error type
//! (`refresh_token_expired_error`, `refresh_token_reuse_error`) must never be
//! retried: retrying with a consumed token only digs the hole deeper. Other
//! failures get a short fixed-delay retry to ride out transient blips.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Path of the token refresh endpoint, relative to the API base URL.
pub const REFRESH_TOKEN_PATH: &str = "/auth/v1/token";

/// Path of the sign-out endpoint, relative to the API base URL.
pub const SIGN_OUT_PATH: &str = "/auth/v1/sign-out";

const MAX_REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Server error types after which the refresh token is dead for good.
const TERMINAL_REFRESH_ERROR_TYPES: &[&str] =
    &["refresh_token_expired_error", "refresh_token_reuse_error"];

/// Rotated token pair returned by the refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Exchange a refresh token for a rotated pair.
///
/// Up to 3 attempts with a fixed 500 ms delay; returns immediately on a
/// terminal rejection.
pub async fn refresh_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<TokenPair> {
    let url = format!("{base_url}{REFRESH_TOKEN_PATH}");
    let mut last_error = Error::Refresh("no refresh attempt made".into());

    for attempt in 1..=MAX_REFRESH_ATTEMPTS {
        if attempt > 1 {
            debug!(attempt, "retrying token refresh");
            tokio::time::sleep(REFRESH_RETRY_DELAY).await;
        }

        let response = match client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {refresh}"))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                last_error = Error::Http(format!("token refresh request failed: {e}"));
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenPair>()
                .await
                .map_err(|e| Error::Parse(format!("invalid refresh response: {e}")));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if let Some(kind) = error_type_of(&body) {
            if TERMINAL_REFRESH_ERROR_TYPES.contains(&kind.as_str()) {
                warn!(error_type = %kind, "refresh token rejected, not retrying");
                return Err(Error::RefreshRejected(kind));
            }
        }

        last_error = Error::Refresh(format!("refresh endpoint returned {status}: {body}"));
    }

    Err(last_error)
}

/// Invalidate the current session server-side.
pub async fn sign_out(client: &reqwest::Client, base_url: &str, access: &str) -> Result<()> {
    let url = format!("{base_url}{SIGN_OUT_PATH}");
    let response = client
        .post(&url)
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .send()
        .await
        .map_err(|e| Error::Http(format!("sign-out request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::SignOut(format!(
            "sign-out endpoint returned {status}: {body}"
        )));
    }
    Ok(())
}

/// Extract the server error type from an error body, if it is shaped like
/// the API's error payload.
fn error_type_of(body: &str) -> Option<String> {
    serde_json::from_str::<transport::ServerErrorBody>(body)
        .ok()
        .map(|server| server.content.kind)
}
