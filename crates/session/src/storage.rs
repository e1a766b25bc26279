//! Session persistence
//!
//! The store persists every patch before mutating in-memory state, so the
//! storage backend sees writes as merges into a single session record.
//! `FileSessionStorage` keeps that record in a JSON file; all writes use
//! atomic temp-file + rename to prevent corruption on crash, and the file is
//! 0600 since it contains auth tokens. A tokio Mutex serializes concurrent
//! writes from the refresh path and app-driven updates.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::state::{ReviewState, SessionPatch, UserState};

/// Tokens recovered from storage at startup. `None` means the key was never
/// stored, distinct from an empty string.
#[derive(Debug, Clone, Default)]
pub struct StoredTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Storage contract consumed by `SessionStore`.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn SessionStorage>`).
pub trait SessionStorage: Send + Sync {
    /// Read the persisted token pair.
    fn load_tokens(&self) -> Pin<Box<dyn Future<Output = Result<StoredTokens>> + Send + '_>>;

    /// Merge a patch into the persisted record.
    fn persist(&self, patch: SessionPatch) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove every persisted session value.
    fn remove_all(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// The on-disk shape of the session record. Token fields distinguish a
/// missing key from an empty string, mirroring `TokenState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_state: Option<UserState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    review_state: Option<ReviewState>,
    #[serde(default, flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredSession {
    fn merge(&mut self, patch: &SessionPatch) {
        if let Some(access_token) = &patch.access_token {
            self.access_token = access_token.as_stored();
        }
        if let Some(refresh_token) = &patch.refresh_token {
            self.refresh_token = refresh_token.as_stored();
        }
        if let Some(user_state) = patch.user_state {
            self.user_state = Some(user_state);
        }
        if let Some(review_state) = patch.review_state {
            self.review_state = Some(review_state);
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// JSON-file session storage.
pub struct FileSessionStorage {
    path: PathBuf,
    state: Mutex<StoredSession>,
}

impl FileSessionStorage {
    /// Load the session record from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (first launch).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading session file: {e}")))?;
            let record: StoredSession = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), "loaded persisted session");
            record
        } else {
            info!(path = %path.display(), "session file not found, starting empty");
            let record = StoredSession::default();
            write_atomic(&path, &record).await?;
            record
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }
}

impl SessionStorage for FileSessionStorage {
    fn load_tokens(&self) -> Pin<Box<dyn Future<Output = Result<StoredTokens>> + Send + '_>> {
        Box::pin(async {
            let state = self.state.lock().await;
            Ok(StoredTokens {
                access_token: state.access_token.clone(),
                refresh_token: state.refresh_token.clone(),
            })
        })
    }

    fn persist(
        &self,
        patch: SessionPatch,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.merge(&patch);
            write_atomic(&self.path, &state).await
        })
    }

    fn remove_all(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async {
            let mut state = self.state.lock().await;
            *state = StoredSession::default();
            debug!(path = %self.path.display(), "cleared persisted session");
            write_atomic(&self.path, &state).await
        })
    }
}

/// Write the session record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains auth tokens.
async fn write_atomic(path: &Path, record: &StoredSession) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Parse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TokenState;

    #[tokio::test]
    async fn first_launch_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        assert!(!path.exists());
        let storage = FileSessionStorage::load(path.clone()).await.unwrap();
        assert!(path.exists());

        let tokens = storage.load_tokens().await.unwrap();
        assert!(tokens.access_token.is_none());
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn persist_then_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path.clone()).await.unwrap();
        storage
            .persist(SessionPatch::tokens(
                TokenState::Present("A1".into()),
                TokenState::Present("R1".into()),
            ))
            .await
            .unwrap();

        let reloaded = FileSessionStorage::load(path).await.unwrap();
        let tokens = reloaded.load_tokens().await.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("A1"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn persist_merges_partial_patches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path).await.unwrap();
        storage
            .persist(SessionPatch::tokens(
                TokenState::Present("A1".into()),
                TokenState::Present("R1".into()),
            ))
            .await
            .unwrap();

        // Patch only the access token
        storage
            .persist(SessionPatch {
                access_token: Some(TokenState::Present("A2".into())),
                ..SessionPatch::default()
            })
            .await
            .unwrap();

        let tokens = storage.load_tokens().await.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("A2"));
        assert_eq!(
            tokens.refresh_token.as_deref(),
            Some("R1"),
            "unpatched fields must not regress"
        );
    }

    #[tokio::test]
    async fn absent_token_removes_stored_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path.clone()).await.unwrap();
        storage
            .persist(SessionPatch::tokens(
                TokenState::Present("A1".into()),
                TokenState::Present("R1".into()),
            ))
            .await
            .unwrap();
        storage
            .persist(SessionPatch {
                access_token: Some(TokenState::Absent),
                ..SessionPatch::default()
            })
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(parsed.get("access_token").is_none());
        assert_eq!(parsed["refresh_token"], "R1");
    }

    #[tokio::test]
    async fn empty_token_stored_as_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path).await.unwrap();
        storage
            .persist(SessionPatch {
                access_token: Some(TokenState::Empty),
                ..SessionPatch::default()
            })
            .await
            .unwrap();

        let tokens = storage.load_tokens().await.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn remove_all_clears_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path.clone()).await.unwrap();
        let mut patch = SessionPatch::tokens(
            TokenState::Present("A1".into()),
            TokenState::Present("R1".into()),
        );
        patch
            .extra
            .insert("is_onboarding".into(), serde_json::json!(true));
        storage.persist(patch).await.unwrap();

        storage.remove_all().await.unwrap();

        let tokens = storage.load_tokens().await.unwrap();
        assert!(tokens.access_token.is_none());
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.trim(), "{}");
    }

    #[tokio::test]
    async fn extra_fields_roundtrip_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path.clone()).await.unwrap();
        let mut patch = SessionPatch::default();
        patch.extra.insert("user_id".into(), serde_json::json!(42));
        storage.persist(patch).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["user_id"], 42, "extra fields flatten to top level");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileSessionStorage::load(path.clone()).await.unwrap();
        storage
            .persist(SessionPatch::tokens(
                TokenState::Present("A1".into()),
                TokenState::Present("R1".into()),
            ))
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileSessionStorage::load(path).await;
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn concurrent_persists_do_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let storage = std::sync::Arc::new(FileSessionStorage::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                let mut patch = SessionPatch::default();
                patch
                    .extra
                    .insert(format!("key_{i}"), serde_json::json!(i));
                storage.persist(patch).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        for i in 0..10 {
            assert_eq!(parsed[format!("key_{i}")], i);
        }
    }
}
