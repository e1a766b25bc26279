//! Request pipeline
//!
//! `ApiClient` drives every request through the same path: attach the auth
//! header, issue through the transport, and on failure dispatch on the
//! classified category. Recoverable categories suspend the caller on a retry
//! ticket; a later `flush` settles every ticket by replaying it with the
//! freshest headers or cancelling it with its original error.
//!
//! The client never refreshes tokens itself. An expired-token failure is
//! reported through the auth-error callback (spawned, so the refresh cannot
//! block the suspension) and the pipeline waits for whoever owns the refresh
//! to call `flush`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use transport::{ConfigPatch, RequestConfig, Transport, TransportError, TransportResponse};

use crate::callbacks::{BoxFuture, Callbacks};
use crate::classify::{ClassifyContext, ErrorCategory, classify};
use crate::config::ClientConfig;
use crate::error::{ApiError, Error, Result};
use crate::outage::{DEFAULT_OUTAGE_WINDOW, OutageDetector};
use crate::retry::{FlushCommand, RetryQueue, RetryTicket};

/// Construction-time options for `ApiClient`. Paths are joined onto the
/// transport's base URL to form the absolute exemption sets.
pub struct ClientOptions {
    pub not_require_retry_urls: Vec<String>,
    pub not_require_authorization_urls: Vec<String>,
    pub require_update_error_types: Vec<String>,
    pub outage_window: Duration,
    pub callbacks: Callbacks,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            not_require_retry_urls: Vec::new(),
            not_require_authorization_urls: Vec::new(),
            require_update_error_types: Vec::new(),
            outage_window: DEFAULT_OUTAGE_WINDOW,
            callbacks: Callbacks::default(),
        }
    }
}

impl ClientOptions {
    /// Options from a loaded config file; callbacks are wired separately.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            not_require_retry_urls: config.resilience.not_require_retry_urls.clone(),
            not_require_authorization_urls: config
                .resilience
                .not_require_authorization_urls
                .clone(),
            require_update_error_types: config.resilience.require_update_error_types.clone(),
            outage_window: Duration::from_millis(config.resilience.outage_debounce_ms),
            callbacks: Callbacks::default(),
        }
    }
}

/// Resilient request pipeline over a pluggable transport.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    queue: RetryQueue,
    outage: OutageDetector,
    callbacks: RwLock<Callbacks>,
    not_require_retry_urls: RwLock<HashSet<String>>,
    not_require_authorization_urls: RwLock<HashSet<String>>,
    require_update_error_types: RwLock<HashSet<String>>,
    network_connected: AtomicBool,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let base_url = transport.get_config().base_url;
        info!(
            base_url = %base_url,
            outage_window_ms = options.outage_window.as_millis() as u64,
            "api client initialized"
        );
        Self {
            queue: RetryQueue::new(),
            outage: OutageDetector::new(options.outage_window),
            callbacks: RwLock::new(options.callbacks),
            not_require_retry_urls: RwLock::new(prefixed(
                &base_url,
                options.not_require_retry_urls,
            )),
            not_require_authorization_urls: RwLock::new(prefixed(
                &base_url,
                options.not_require_authorization_urls,
            )),
            require_update_error_types: RwLock::new(
                options.require_update_error_types.into_iter().collect(),
            ),
            network_connected: AtomicBool::new(true),
            transport,
        }
    }

    /// Issue a request through the pipeline.
    ///
    /// The returned future settles exactly once: immediately for successes
    /// and terminal failures, or after the next `flush` for suspended ones.
    pub async fn request(&self, mut config: RequestConfig) -> Result<TransportResponse> {
        self.attach_authorization(&mut config);
        match self.transport.request(config).await {
            Ok(response) => {
                self.outage.resolve();
                Ok(response)
            }
            Err(error) => self.handle_failure(error).await,
        }
    }

    /// Drain the retry queue, replaying or cancelling every queued ticket in
    /// FIFO order. No-op on an empty queue. Tickets enqueued while this flush
    /// runs wait for the next one.
    pub async fn flush(&self, command: FlushCommand) {
        let tickets = self.queue.drain().await;
        if tickets.is_empty() {
            debug!(command = command.label(), "retry queue empty, flush is a no-op");
            return;
        }
        info!(
            command = command.label(),
            tickets = tickets.len(),
            "flushing retry queue"
        );
        metrics::counter!("api_retry_flush_total", "command" => command.label())
            .increment(tickets.len() as u64);

        for ticket in tickets {
            let ticket_id = ticket.id;
            let settled = match command {
                FlushCommand::Retry => {
                    let outcome = self.replay(ticket.config).await;
                    ticket.responder.send(outcome)
                }
                FlushCommand::Cancel => ticket.responder.send(Err(ticket.error)),
            };
            if settled.is_err() {
                debug!(ticket_id = %ticket_id, "ticket caller went away before settlement");
            }
        }
    }

    /// Merge a partial transport config update.
    pub fn set_config(&self, patch: ConfigPatch) {
        self.transport.set_config(patch);
    }

    /// Replace the auth token used for header attachment.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.transport.set_config(ConfigPatch::auth(token));
    }

    /// Report platform connectivity; gates the network-outage classification.
    pub fn set_is_network_connected(&self, connected: bool) {
        debug!(connected, "network connectivity reported");
        self.network_connected.store(connected, Ordering::Relaxed);
    }

    /// Replace the refresh-retry exemption set (paths joined onto the current
    /// base URL).
    pub fn set_not_require_retry_urls(&self, paths: impl IntoIterator<Item = String>) {
        let base_url = self.transport.get_config().base_url;
        *write(&self.not_require_retry_urls) = prefixed(&base_url, paths);
    }

    /// Replace the auth-header exemption set (paths joined onto the current
    /// base URL).
    pub fn set_not_require_authorization_urls(&self, paths: impl IntoIterator<Item = String>) {
        let base_url = self.transport.get_config().base_url;
        *write(&self.not_require_authorization_urls) = prefixed(&base_url, paths);
    }

    /// Replace the set of server error types that trigger the refresh flow.
    pub fn set_require_update_error_types(&self, types: impl IntoIterator<Item = String>) {
        *write(&self.require_update_error_types) = types.into_iter().collect();
    }

    pub fn set_on_system_error(&self, callback: impl Fn(Option<String>) + Send + Sync + 'static) {
        write(&self.callbacks).on_system_error = Some(Arc::new(callback));
    }

    pub fn set_on_auth_error(
        &self,
        callback: impl Fn() -> BoxFuture<()> + Send + Sync + 'static,
    ) {
        write(&self.callbacks).on_auth_error = Some(Arc::new(callback));
    }

    pub fn set_on_network_error(
        &self,
        callback: impl Fn(transport::TransportFailure) + Send + Sync + 'static,
    ) {
        write(&self.callbacks).on_network_error = Some(Arc::new(callback));
    }

    pub fn set_on_non_transport_error(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        write(&self.callbacks).on_non_transport_error = Some(Arc::new(callback));
    }

    fn attach_authorization(&self, config: &mut RequestConfig) {
        let Some(auth) = self.transport.get_config().auth else {
            return;
        };
        // An empty token means "signed out" (set on session reset)
        if auth.expose().is_empty() {
            return;
        }
        if read(&self.not_require_authorization_urls).contains(&config.url) {
            return;
        }
        config.headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", auth.expose()),
        );
    }

    async fn handle_failure(&self, error: TransportError) -> Result<TransportResponse> {
        let category = {
            let retry_urls = read(&self.not_require_retry_urls);
            let types = read(&self.require_update_error_types);
            let ctx = ClassifyContext {
                network_connected: self.network_connected.load(Ordering::Relaxed),
                not_require_retry_urls: &retry_urls,
                require_update_error_types: &types,
            };
            classify(&error, &ctx)
        };

        match (category, error) {
            (ErrorCategory::NonTransport(message), _) => {
                warn!(message = %message, "non-transport error in response path");
                if let Some(callback) = read(&self.callbacks).on_non_transport_error.clone() {
                    callback(&message);
                }
                Err(Error::NonTransport(message))
            }
            (ErrorCategory::System { description }, _) => {
                warn!(
                    description = description.as_deref().unwrap_or(""),
                    "maintenance response received"
                );
                if let Some(callback) = read(&self.callbacks).on_system_error.clone() {
                    callback(description.clone());
                }
                Err(Error::System { description })
            }
            (ErrorCategory::NetworkOutage, TransportError::Failure(failure)) => {
                let original = Error::Api(ApiError::from_failure(&failure));
                let (ticket, receiver) = RetryTicket::new(failure.config.clone(), original);
                self.queue.enqueue(ticket).await;

                let callback = read(&self.callbacks).on_network_error.clone();
                self.outage.arm(move || {
                    if let Some(callback) = callback {
                        callback(failure);
                    }
                });

                await_ticket(receiver).await
            }
            (ErrorCategory::AuthExpired, TransportError::Failure(failure)) => {
                let original = Error::Api(ApiError::from_failure(&failure));
                let (ticket, receiver) = RetryTicket::new(failure.config, original);
                self.queue.enqueue(ticket).await;

                // Fire-and-forget: the refresh owner calls flush when done
                if let Some(callback) = read(&self.callbacks).on_auth_error.clone() {
                    tokio::spawn(callback());
                }

                await_ticket(receiver).await
            }
            (ErrorCategory::Generic(api), _) => Err(Error::Api(api)),
            // Retryable categories are only produced for Failure errors; a
            // NonTransport here cannot happen, but settle it terminally
            // rather than panic.
            (
                ErrorCategory::NetworkOutage | ErrorCategory::AuthExpired,
                TransportError::NonTransport(message),
            ) => Err(Error::NonTransport(message)),
        }
    }

    /// Re-issue a suspended request with the freshest adapter headers and
    /// auth token merged over the original config. The outcome is terminal:
    /// a replay failure maps straight to an error, it is never re-suspended.
    async fn replay(&self, original: RequestConfig) -> Result<TransportResponse> {
        let fresh = self.transport.get_config();
        let mut config = original;
        for (name, value) in &fresh.headers {
            config.headers.insert(name.clone(), value.clone());
        }
        self.attach_authorization(&mut config);

        debug!(url = %config.url, "replaying suspended request");
        match self.transport.request(config).await {
            Ok(response) => {
                self.outage.resolve();
                Ok(response)
            }
            Err(TransportError::NonTransport(message)) => Err(Error::NonTransport(message)),
            Err(TransportError::Failure(failure)) => {
                Err(Error::Api(ApiError::from_failure(&failure)))
            }
        }
    }
}

fn prefixed(base_url: &str, paths: impl IntoIterator<Item = String>) -> HashSet<String> {
    paths
        .into_iter()
        .map(|path| format!("{base_url}{path}"))
        .collect()
}

async fn await_ticket(
    receiver: tokio::sync::oneshot::Receiver<Result<TransportResponse>>,
) -> Result<TransportResponse> {
    match receiver.await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::NonTransport(
            "retry ticket dropped before resolution".into(),
        )),
    }
}
