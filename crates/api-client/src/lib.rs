//! Request resilience layer
//!
//! Wraps a pluggable `Transport` with the failure handling a mobile client
//! needs to survive flaky networks and rotating tokens:
//!
//! 1. Every failure is classified exactly once (`classify`) into a closed set
//!    of categories.
//! 2. Recoverable failures (sustained network outage, expired access token)
//!    suspend the caller as a ticket in the `RetryQueue` instead of failing.
//! 3. An external resolution (refresh completion, connectivity restored)
//!    flushes the queue, replaying or cancelling each ticket in FIFO order.
//! 4. Terminal failures reject the caller with full server-reported detail.
//!
//! The layer never initiates a token refresh itself; it reports the condition
//! through the auth-error callback and waits for a `flush`.

pub mod callbacks;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod outage;
pub mod retry;

pub use callbacks::{BoxFuture, Callbacks};
pub use classify::{ClassifyContext, ErrorCategory, classify};
pub use client::{ApiClient, ClientOptions};
pub use config::ClientConfig;
pub use error::{ApiError, Error, Result};
pub use outage::{DEFAULT_OUTAGE_WINDOW, OutageDetector};
pub use retry::FlushCommand;
