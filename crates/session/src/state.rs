//! Session state, patches, and merge semantics
//!
//! Tokens are tri-state: a token recovered from storage as an empty string is
//! a different fact from one that was never stored at all, and downstream
//! consumers are allowed to treat them differently. `SessionPatch` expresses
//! partial updates: an unset field never regresses the current value, while
//! an explicit `TokenState::Absent` actively clears one.

use serde::{Deserialize, Serialize};

/// Tri-state auth token value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenState {
    /// Never stored / explicitly cleared
    #[default]
    Absent,
    /// Stored as an empty string
    Empty,
    /// A usable token value
    Present(String),
}

impl TokenState {
    /// From a storage read: missing key → `Absent`, `""` → `Empty`.
    pub fn from_stored(value: Option<String>) -> Self {
        match value {
            None => TokenState::Absent,
            Some(value) if value.is_empty() => TokenState::Empty,
            Some(value) => TokenState::Present(value),
        }
    }

    /// To a storage write: `Absent` → missing key, `Empty` → `""`.
    pub fn as_stored(&self) -> Option<String> {
        match self {
            TokenState::Absent => None,
            TokenState::Empty => Some(String::new()),
            TokenState::Present(value) => Some(value.clone()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, TokenState::Present(_))
    }

    /// The token value, empty string for `Absent`/`Empty`.
    pub fn value(&self) -> &str {
        match self {
            TokenState::Present(value) => value,
            _ => "",
        }
    }
}

/// Account standing as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Signed up, profile not submitted yet
    #[default]
    SignUpProgressing,
    /// Profile submitted, pending admin approval
    Review,
    Active,
    Dormant,
    /// Suspended for policy violations
    Suspended,
    /// Deletion requested, in the waiting window
    DeletePending,
    Deleted,
    Malicious,
}

/// Liveness-review progress for the profile photo flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    LivenessImageServerRequest,
    LivenessImageRejected,
    LivenessImageRequested,
    #[default]
    NotSet,
}

/// The full in-memory session.
///
/// `extra` holds caller-defined extension fields (onboarding flags,
/// service-specific ids) that ride along with the core state.
/// `initialized` is runtime-only: it flips once `init_session` finishes and
/// is never persisted or patchable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub access_token: TokenState,
    pub refresh_token: TokenState,
    pub user_state: UserState,
    pub review_state: ReviewState,
    pub initialized: bool,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionState {
    /// Merge a patch over the current state. Unset fields keep their value;
    /// `extra` merges key-wise.
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(access_token) = &patch.access_token {
            self.access_token = access_token.clone();
        }
        if let Some(refresh_token) = &patch.refresh_token {
            self.refresh_token = refresh_token.clone();
        }
        if let Some(user_state) = patch.user_state {
            self.user_state = user_state;
        }
        if let Some(review_state) = patch.review_state {
            self.review_state = review_state;
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Partial session update.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub access_token: Option<TokenState>,
    pub refresh_token: Option<TokenState>,
    pub user_state: Option<UserState>,
    pub review_state: Option<ReviewState>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionPatch {
    /// Patch carrying a fresh token pair.
    pub fn tokens(access_token: TokenState, refresh_token: TokenState) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            ..Self::default()
        }
    }

    /// Full patch mirroring a complete state (used to persist a reset).
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            access_token: Some(state.access_token.clone()),
            refresh_token: Some(state.refresh_token.clone()),
            user_state: Some(state.user_state),
            review_state: Some(state.review_state),
            extra: state.extra.clone(),
        }
    }
}
