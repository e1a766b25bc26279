//! Session store, refresh coordinator, and revoke cascade
//!
//! `SessionStore` holds the in-memory session and coordinates the two flows
//! that must not interleave badly:
//!
//! - **Refresh** is single-flight: the refresh token rotates on use, so a
//!   second concurrent call would consume a token the in-flight call already
//!   spent. Losers of the flag race return silently; the flag is released by
//!   a drop guard no matter how the refresh path exits.
//! - **Revoke** is best-effort and runs to completion: remote sign-out, cache
//!   and storage cleanup, in-memory reset, then the three collaborator
//!   revoke hooks, each isolated so one failure never starves the rest.
//!
//! The in-memory state is reset before any collaborator hook runs, so a
//! collaborator querying the session during its own cleanup always observes
//! it revoked.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use api_client::{ApiClient, BoxFuture, FlushCommand};

use crate::error::{Error, Result};
use crate::state::{SessionPatch, SessionState, TokenState};
use crate::storage::SessionStorage;
use crate::token::TokenPair;

/// Arguments passed to every revoke collaborator.
#[derive(Debug, Clone)]
pub struct RevokeParams {
    /// Snapshot of the session being revoked, when the caller has one
    pub session: Option<SessionState>,
    /// `true` for a user-initiated logout, `false` when forced by a failed
    /// refresh. Remote sign-out only happens for intended logouts.
    pub intended: bool,
}

pub type RefreshApi = Arc<dyn Fn(String) -> BoxFuture<Result<TokenPair>> + Send + Sync>;
pub type SignOutApi = Arc<dyn Fn() -> BoxFuture<Result<()>> + Send + Sync>;
pub type RevokeHook = Arc<dyn Fn(RevokeParams) -> BoxFuture<Result<()>> + Send + Sync>;
pub type SyncHook = Arc<dyn Fn() + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;
pub type NavigateHook = Arc<dyn Fn(RevokeParams) + Send + Sync>;
pub type ExtraStateHook = Arc<dyn Fn() -> BoxFuture<SessionPatch> + Send + Sync>;
pub type AfterRefreshHook = Arc<dyn Fn() -> BoxFuture<()> + Send + Sync>;

/// Per-call completion callback for `request_refresh_token`.
pub type RefreshResultCallback = Box<dyn FnOnce(bool) + Send>;

/// Collaborators the session lifecycle drives. The endpoint calls and the
/// three revoke hooks are required; the rest are independently optional.
#[derive(Clone)]
pub struct SessionHooks {
    /// Exchange the current refresh token for a rotated pair
    pub refresh_api: RefreshApi,
    /// Remote sign-out for intended logouts
    pub sign_out_api: SignOutApi,
    pub revoke_chat: RevokeHook,
    pub revoke_user_event: RevokeHook,
    pub revoke_notification: RevokeHook,
    /// Drop any request/response cache the transport layer maintains
    pub clear_api_cache: Option<SyncHook>,
    /// Navigation after the cascade completes (e.g. back to the intro screen)
    pub navigate_after_revoke: Option<NavigateHook>,
    pub after_refresh_token: Option<AfterRefreshHook>,
    pub on_refresh_error: Option<ErrorHook>,
    /// Forced re-authentication UI after a failed refresh
    pub on_refresh_failed_ui: Option<SyncHook>,
    pub on_init_error: Option<ErrorHook>,
    /// Extra persisted state merged into the session at init
    pub extra_session_state: Option<ExtraStateHook>,
}

impl SessionHooks {
    pub fn new(
        refresh_api: impl Fn(String) -> BoxFuture<Result<TokenPair>> + Send + Sync + 'static,
        sign_out_api: impl Fn() -> BoxFuture<Result<()>> + Send + Sync + 'static,
        revoke_chat: impl Fn(RevokeParams) -> BoxFuture<Result<()>> + Send + Sync + 'static,
        revoke_user_event: impl Fn(RevokeParams) -> BoxFuture<Result<()>> + Send + Sync + 'static,
        revoke_notification: impl Fn(RevokeParams) -> BoxFuture<Result<()>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            refresh_api: Arc::new(refresh_api),
            sign_out_api: Arc::new(sign_out_api),
            revoke_chat: Arc::new(revoke_chat),
            revoke_user_event: Arc::new(revoke_user_event),
            revoke_notification: Arc::new(revoke_notification),
            clear_api_cache: None,
            navigate_after_revoke: None,
            after_refresh_token: None,
            on_refresh_error: None,
            on_refresh_failed_ui: None,
            on_init_error: None,
            extra_session_state: None,
        }
    }

    pub fn clear_api_cache(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.clear_api_cache = Some(Arc::new(hook));
        self
    }

    pub fn navigate_after_revoke(
        mut self,
        hook: impl Fn(RevokeParams) + Send + Sync + 'static,
    ) -> Self {
        self.navigate_after_revoke = Some(Arc::new(hook));
        self
    }

    pub fn after_refresh_token(
        mut self,
        hook: impl Fn() -> BoxFuture<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_refresh_token = Some(Arc::new(hook));
        self
    }

    pub fn on_refresh_error(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_refresh_error = Some(Arc::new(hook));
        self
    }

    pub fn on_refresh_failed_ui(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_refresh_failed_ui = Some(Arc::new(hook));
        self
    }

    pub fn on_init_error(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_init_error = Some(Arc::new(hook));
        self
    }

    pub fn extra_session_state(
        mut self,
        hook: impl Fn() -> BoxFuture<SessionPatch> + Send + Sync + 'static,
    ) -> Self {
        self.extra_session_state = Some(Arc::new(hook));
        self
    }
}

/// Releases the single-flight flag on every exit path of the refresh call.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Single source of truth for the authenticated session.
pub struct SessionStore {
    state: Mutex<SessionState>,
    initial_state: SessionState,
    refreshing: AtomicBool,
    storage: Arc<dyn SessionStorage>,
    hooks: SessionHooks,
    client: Arc<ApiClient>,
}

impl SessionStore {
    pub fn new(
        initial_state: SessionState,
        storage: Arc<dyn SessionStorage>,
        hooks: SessionHooks,
        client: Arc<ApiClient>,
    ) -> Self {
        Self {
            state: Mutex::new(initial_state.clone()),
            initial_state,
            refreshing: AtomicBool::new(false),
            storage,
            hooks,
            client,
        }
    }

    /// Wire the api-client's auth-error callback to the refresh coordinator.
    pub fn attach_to_client(self: Arc<Self>) {
        let client = Arc::clone(&self.client);
        client.set_on_auth_error(move || {
            let store = Arc::clone(&self);
            Box::pin(async move {
                store.request_refresh_token(None).await;
            })
        });
    }

    /// Snapshot of the current session.
    pub async fn session(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    /// Apply a partial update: persisted first, then merged into memory, so a
    /// storage failure never leaves memory ahead of disk. Keeps the
    /// api-client's auth token in sync when the patch carries an access
    /// token.
    pub async fn store_session(&self, patch: SessionPatch) -> Result<()> {
        self.storage.persist(patch.clone()).await?;
        {
            let mut state = self.state.lock().await;
            state.apply(&patch);
        }
        if let Some(access_token) = &patch.access_token {
            // Absent/Empty map to "" which disables header attachment
            self.client.set_auth_token(access_token.value().to_string());
        }
        debug!("session state updated");
        Ok(())
    }

    /// Restore the session from storage at app start.
    ///
    /// A refresh token recovered without an access token records the access
    /// token as explicitly absent (the refresh flow decides what to do with
    /// it) and the refresh token itself is not promoted into memory.
    /// `initialized` flips in every case, including restore failures.
    pub async fn init_session(&self) {
        info!("initializing session from storage");
        match self.storage.load_tokens().await {
            Ok(tokens) => {
                let access = TokenState::from_stored(tokens.access_token);
                let refresh = TokenState::from_stored(tokens.refresh_token);
                let patch = match (&access, &refresh) {
                    (TokenState::Present(_), TokenState::Present(_)) => {
                        Some(SessionPatch::tokens(access, refresh))
                    }
                    (_, TokenState::Present(_)) => Some(SessionPatch {
                        access_token: Some(TokenState::Absent),
                        ..SessionPatch::default()
                    }),
                    _ => None,
                };
                if let Some(patch) = patch {
                    if let Err(e) = self.store_session(patch).await {
                        warn!(error = %e, "failed to restore persisted tokens");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "session restore failed");
                if let Some(hook) = &self.hooks.on_init_error {
                    hook(&e);
                }
            }
        }

        if let Some(hook) = &self.hooks.extra_session_state {
            let extra = hook().await;
            if let Err(e) = self.store_session(extra).await {
                warn!(error = %e, "failed to store extra session state");
            }
        }

        self.state.lock().await.initialized = true;
        info!("session initialized");
    }

    /// Single-flight token refresh.
    ///
    /// A call arriving while a refresh is already in flight is a no-op. On
    /// success the rotated pair is persisted and the retry queue replays; on
    /// failure the session is revoked (`intended = false`) and the queue is
    /// cancelled. The in-flight flag is released unconditionally.
    pub async fn request_refresh_token(&self, on_result: Option<RefreshResultCallback>) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("token refresh already in flight, ignoring request");
            return;
        }
        let _guard = RefreshGuard(&self.refreshing);

        let refresh = self.state.lock().await.refresh_token.value().to_string();
        info!("requesting token refresh");

        match (self.hooks.refresh_api)(refresh).await {
            Ok(tokens) => {
                info!("token refresh succeeded");
                metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
                if let Err(e) = self
                    .store_session(SessionPatch::tokens(
                        TokenState::Present(tokens.access_token),
                        TokenState::Present(tokens.refresh_token),
                    ))
                    .await
                {
                    warn!(error = %e, "failed to persist refreshed tokens");
                }
                if let Some(hook) = &self.hooks.after_refresh_token {
                    hook().await;
                }
                if let Some(callback) = on_result {
                    callback(true);
                }
                self.client.flush(FlushCommand::Retry).await;
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, revoking session");
                metrics::counter!("session_refresh_total", "outcome" => "failure").increment(1);
                if let Some(hook) = &self.hooks.on_refresh_error {
                    hook(&e);
                }
                let prior = self.session().await;
                self.revoke_session(RevokeParams {
                    session: Some(prior),
                    intended: false,
                })
                .await;
                self.client.flush(FlushCommand::Cancel).await;
                if let Some(callback) = on_result {
                    callback(false);
                }
                if let Some(hook) = &self.hooks.on_refresh_failed_ui {
                    hook();
                }
            }
        }
    }

    /// Tear the session down. Best-effort: every step runs regardless of the
    /// previous steps' failures, and nothing propagates to the caller.
    pub async fn revoke_session(&self, params: RevokeParams) {
        let intended = params.intended;
        info!(intended, "revoking session");
        metrics::counter!("session_revoke_total", "intended" => if intended { "true" } else { "false" })
            .increment(1);

        let access = self.state.lock().await.access_token.clone();
        if access.is_present() && intended {
            if let Err(e) = (self.hooks.sign_out_api)().await {
                warn!(error = %e, "remote sign-out failed");
            }
        }

        if let Some(hook) = &self.hooks.clear_api_cache {
            hook();
        }

        if let Err(e) = self.storage.remove_all().await {
            warn!(error = %e, "failed to clear persisted session");
        }

        // Reset completes before any collaborator runs
        if let Err(e) = self.reset_to_initial().await {
            warn!(error = %e, "failed to reset session state");
        }

        let collaborators: [(&str, &RevokeHook); 3] = [
            ("chat", &self.hooks.revoke_chat),
            ("user_event", &self.hooks.revoke_user_event),
            ("notification", &self.hooks.revoke_notification),
        ];
        for (name, hook) in collaborators {
            if let Err(e) = hook(params.clone()).await {
                warn!(collaborator = name, error = %e, "revoke collaborator failed");
            }
        }

        if let Some(hook) = &self.hooks.navigate_after_revoke {
            hook(params.clone());
        }
        info!(intended, "session revoke cascade complete");
    }

    /// Persist the initial values, then replace the in-memory state wholesale
    /// (keeping only the `initialized` flag).
    async fn reset_to_initial(&self) -> Result<()> {
        self.storage
            .persist(SessionPatch::from_state(&self.initial_state))
            .await?;
        let mut state = self.state.lock().await;
        let initialized = state.initialized;
        *state = self.initial_state.clone();
        state.initialized = initialized;
        drop(state);
        self.client.set_auth_token(String::new());
        Ok(())
    }
}
