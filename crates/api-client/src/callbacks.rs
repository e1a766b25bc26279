//! Callback capability set
//!
//! The pipeline reports conditions it cannot resolve itself through named,
//! independently-optional handlers. Each handler is an `Arc<dyn Fn>` so the
//! outage timer task and the spawned auth hook can hold their own references.
//! The auth-error handler is async (it is expected to kick off a token
//! refresh) and is spawned fire-and-forget so a slow refresh never blocks
//! the failing request from suspending.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use transport::TransportFailure;

/// Boxed future for dyn-compatible async callbacks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type SystemErrorCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;
pub type AuthErrorCallback = Arc<dyn Fn() -> BoxFuture<()> + Send + Sync>;
pub type NetworkErrorCallback = Arc<dyn Fn(TransportFailure) + Send + Sync>;
pub type NonTransportErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Handlers the pipeline invokes for classified failures. All optional;
/// an unset handler means the condition is handled silently.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Maintenance-mode response, with the server's description
    pub on_system_error: Option<SystemErrorCallback>,
    /// Expired access token; expected to trigger a refresh
    pub on_auth_error: Option<AuthErrorCallback>,
    /// Sustained network outage (fires once per episode, after the debounce)
    pub on_network_error: Option<NetworkErrorCallback>,
    /// Failure outside the transport, forwarded raw
    pub on_non_transport_error: Option<NonTransportErrorCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_error(mut self, callback: impl Fn(Option<String>) + Send + Sync + 'static) -> Self {
        self.on_system_error = Some(Arc::new(callback));
        self
    }

    pub fn auth_error(
        mut self,
        callback: impl Fn() -> BoxFuture<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_auth_error = Some(Arc::new(callback));
        self
    }

    pub fn network_error(
        mut self,
        callback: impl Fn(TransportFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_network_error = Some(Arc::new(callback));
        self
    }

    pub fn non_transport_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_non_transport_error = Some(Arc::new(callback));
        self
    }
}
