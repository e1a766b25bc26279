//! Transport configuration and partial updates
//!
//! The config is patched at runtime (auth token changes on sign-in/refresh,
//! base URL per environment), so updates are expressed as a `ConfigPatch`
//! merged over the current value rather than wholesale replacement.

use std::collections::HashMap;

use common::Secret;

/// Adapter-level configuration shared by every outgoing request.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Base URL prefixed to relative paths (e.g. `https://api.example.com`)
    pub base_url: String,
    /// Default headers applied to every request; request headers win on conflict
    pub headers: HashMap<String, String>,
    /// Current auth token. The pipeline turns this into an
    /// `Authorization: Bearer` header for non-exempt URLs.
    pub auth: Option<Secret<String>>,
}

/// Partial update merged over a `TransportConfig`.
///
/// `None` fields leave the current value untouched. `headers` merges key-wise
/// rather than replacing the whole map.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub base_url: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub auth: Option<Secret<String>>,
}

impl ConfigPatch {
    /// Patch that only changes the base URL.
    pub fn base_url(url: impl Into<String>) -> Self {
        Self {
            base_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Patch that only replaces the auth token.
    pub fn auth(token: impl Into<String>) -> Self {
        Self {
            auth: Some(Secret::new(token.into())),
            ..Self::default()
        }
    }

    /// Patch that merges the given default headers.
    pub fn headers(headers: HashMap<String, String>) -> Self {
        Self {
            headers: Some(headers),
            ..Self::default()
        }
    }
}

impl TransportConfig {
    /// Merge a patch over the current config.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(base_url) = patch.base_url {
            self.base_url = base_url;
        }
        if let Some(headers) = patch.headers {
            self.headers.extend(headers);
        }
        if let Some(auth) = patch.auth {
            self.auth = Some(auth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_headers_keywise() {
        let mut config = TransportConfig {
            base_url: "https://api.example.com".into(),
            headers: HashMap::from([
                ("device-type".to_string(), "ios".to_string()),
                ("cache-control".to_string(), "no-cache".to_string()),
            ]),
            auth: None,
        };

        config.apply(ConfigPatch::headers(HashMap::from([
            ("device-type".to_string(), "android".to_string()),
            ("device-name".to_string(), "Pixel 9".to_string()),
        ])));

        assert_eq!(config.headers["device-type"], "android");
        assert_eq!(config.headers["device-name"], "Pixel 9");
        assert_eq!(config.headers["cache-control"], "no-cache");
    }

    #[test]
    fn apply_none_fields_leave_config_untouched() {
        let mut config = TransportConfig {
            base_url: "https://api.example.com".into(),
            headers: HashMap::new(),
            auth: Some(Secret::new("at_1".into())),
        };

        config.apply(ConfigPatch::default());

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.auth.as_ref().unwrap().expose(), "at_1");
    }

    #[test]
    fn auth_patch_replaces_token() {
        let mut config = TransportConfig::default();
        config.apply(ConfigPatch::auth("at_1"));
        config.apply(ConfigPatch::auth("at_2"));
        assert_eq!(config.auth.as_ref().unwrap().expose(), "at_2");
    }

    #[test]
    fn base_url_patch_does_not_clear_auth() {
        let mut config = TransportConfig::default();
        config.apply(ConfigPatch::auth("at_1"));
        config.apply(ConfigPatch::base_url("https://staging.example.com"));
        assert_eq!(config.base_url, "https://staging.example.com");
        assert!(config.auth.is_some());
    }
}
