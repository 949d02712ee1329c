//! HTTP client for the Impact Leaders backend API
//!
//! [`ApiClient`] is the one place the dashboard talks to the backend. It
//! resolves endpoints against `<origin>/api/v1`, injects the bearer token
//! from [`storage::AuthStorage`] (or a custom getter), enforces per-call
//! timeouts, retries transient failures after a flat delay, and turns every
//! outcome into an [`ApiResult`].
//!
//! Accounts reported inactive by the backend are signed out: the stored
//! session is cleared, the auth cookie expired, and the [`Navigator`] sent to
//! the matching login page.

pub mod classify;
pub mod client;
pub mod config;
pub mod envelope;
pub mod metrics;
pub mod navigator;
pub mod transport;

pub use classify::{AuthFailure, RETRYABLE_STATUSES, is_retryable_status};
pub use client::{
    ApiClient, ApiClientBuilder, DEFAULT_TIMEOUT, RETRY_DELAY, RequestOptions, TokenGetter,
};
pub use config::{API_PREFIX, BackendOrigin, DEFAULT_ORIGIN};
pub use envelope::{ApiFailure, ApiResult, ApiSuccess, envelope};
pub use navigator::{LoggingNavigator, LoginRoutes, Navigator};
pub use transport::{
    MultipartForm, ReqwestTransport, RequestBody, Transport, TransportError, TransportErrorKind,
    TransportFuture, TransportRequest, TransportResponse,
};
