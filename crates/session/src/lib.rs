//! Session lifecycle for the mobile API client
//!
//! Owns the authenticated session end to end:
//!
//! 1. `init_session` restores persisted tokens on app start.
//! 2. `request_refresh_token` single-flights token refresh: refresh tokens
//!    rotate on use, so a duplicate concurrent call would consume a token the
//!    in-flight call already spent. On completion it flushes the api-client
//!    retry queue (replay on success, cancel on failure).
//! 3. `revoke_session` tears the session down: best-effort remote sign-out,
//!    cache/storage cleanup, in-memory reset, then the chat / user-event /
//!    notification revoke cascade, each collaborator isolated from the
//!    others' failures.
//!
//! `SessionStore` is the single source of truth for auth state; everything
//! else reads it through snapshots and mutates it only via `store_session`.

pub mod error;
pub mod state;
pub mod storage;
pub mod store;
pub mod token;

pub use api_client::BoxFuture;
pub use error::{Error, Result};
pub use state::{ReviewState, SessionPatch, SessionState, TokenState, UserState};
pub use storage::{FileSessionStorage, SessionStorage, StoredTokens};
pub use store::{RevokeParams, SessionHooks, SessionStore};
pub use token::{TokenPair, refresh_token, sign_out};
