//! `teller-http` is a resilient async HTTP client for banking-operations
//! REST APIs.
//!
//! The crate wraps `reqwest` with the failure-handling the backend expects
//! from its clients:
//! - exponential-backoff retries for network failures, timeouts, 5xx and 429
//! - a stable idempotency key per logical state-changing request
//! - CSRF token acquisition (cookie first, `GET <base>/csrf/` fallback)
//! - single-flight session refresh on 401 with one replay of the original
//!   request, and a logout broadcast when the refresh itself fails
//! - an interceptor chain for timing, telemetry, and header injection
//! - sanitized error messages ([`BuildMode::Production`] strips backend
//!   detail; development mode redacts secret-like substrings)
//!
//! Entry points: [`ApiClient::get`], [`ApiClient::post`], [`ApiClient::put`],
//! [`ApiClient::patch`], [`ApiClient::delete`].

mod auth;
mod client;
mod csrf;
mod error;
mod idempotency;
mod interceptor;
mod options;
mod redact;
mod request;

pub use auth::Logout;
pub use client::{ApiClient, ApiResponse};
pub use error::ApiError;
pub use idempotency::{new_key, IDEMPOTENCY_HEADER};
pub use interceptor::{BoxError, Interceptor, InterceptorRegistry};
pub use options::{resolve_base_url, ClientOptions, DEFAULT_BASE_URL};
pub use redact::BuildMode;
pub use request::{Body, RequestConfig, RequestContext, RequestDescriptor, ResponseKind};

pub type Result<T> = std::result::Result<T, ApiError>;
