//! Pluggable HTTP transport contract
//!
//! Defines the `Transport` trait that decouples the resilience layer from the
//! HTTP machinery. The trait mirrors what the client layer needs from any
//! adapter: a readable/patchable config (`base_url`, default headers, auth
//! token) and a single `request` entry point usable both for fresh requests
//! and for replaying a previously failed one.
//!
//! `HttpTransport` is the default reqwest-backed adapter with a fixed
//! client-level timeout. Failures are surfaced as `TransportFailure` values
//! that carry the original `RequestConfig` back to the caller, so a suspended
//! request can be replayed without the issuer keeping its own copy.

pub mod config;
pub mod http;
pub mod types;

pub use config::{ConfigPatch, TransportConfig};
pub use http::{DEFAULT_TIMEOUT, HttpTransport};
pub use types::{
    ErrorContent, FailureResponse, RequestConfig, ServerErrorBody, Transport, TransportError,
    TransportFailure, TransportResponse,
};
