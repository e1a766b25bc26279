//! Client configuration loading
//!
//! TOML file with an `API_BASE_URL` env override for the base URL (staging
//! builds point the same binary at a different backend without editing the
//! file). The resilience section defaults match the production URL sets so a
//! minimal config only needs `[api] base_url`.

use std::path::Path;

use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// Backend endpoint settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Retry / outage / refresh classification settings
#[derive(Debug, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_outage_debounce")]
    pub outage_debounce_ms: u64,
    /// Paths (joined onto `base_url`) exempt from refresh-triggered retry
    #[serde(default = "default_not_require_retry_urls")]
    pub not_require_retry_urls: Vec<String>,
    /// Paths that never receive the auth header
    #[serde(default = "default_not_require_authorization_urls")]
    pub not_require_authorization_urls: Vec<String>,
    /// Server error types that trigger the refresh flow
    #[serde(default = "default_require_update_error_types")]
    pub require_update_error_types: Vec<String>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            outage_debounce_ms: default_outage_debounce(),
            not_require_retry_urls: default_not_require_retry_urls(),
            not_require_authorization_urls: default_not_require_authorization_urls(),
            require_update_error_types: default_require_update_error_types(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_outage_debounce() -> u64 {
    3000
}

fn default_not_require_retry_urls() -> Vec<String> {
    vec![
        "/auth/v1/token".into(),
        "/auth/v1/sign-out".into(),
        "/auth/v1/sign-up".into(),
        "/user/v1/cx-information".into(),
    ]
}

fn default_not_require_authorization_urls() -> Vec<String> {
    vec![
        "/auth/v1/phone-verification".into(),
        "/auth/v1/sign-in".into(),
        "/auth/v1/sign-up".into(),
        "/auth/v1/token".into(),
        "/auth/v1/intro".into(),
    ]
}

fn default_require_update_error_types() -> Vec<String> {
    vec![
        "unauthorized_token_error".into(),
        "token_expired_error".into(),
        "access_token_expired_error".into(),
    ]
}

impl ClientConfig {
    /// Load configuration from a TOML file, then overlay environment.
    ///
    /// `API_BASE_URL` overrides `[api] base_url` when set and non-empty.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;

        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.api.base_url = base_url.trim().to_owned();
            }
        }

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.resilience.outage_debounce_ms == 0 {
            return Err(common::Error::Config(
                "outage_debounce_ms must be greater than 0".into(),
            ));
        }

        Ok(config)
    }
}
