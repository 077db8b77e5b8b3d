use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::Value as JsonValue;

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// No body (GET/DELETE and bodyless POSTs).
    Empty,
    /// JSON payload; sent with `Content-Type: application/json`.
    Json(JsonValue),
    /// Pre-encoded bytes (file uploads). When `content_type` is `None` the
    /// header is omitted entirely so the transport can set its own.
    Raw {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

/// Expected shape of the response body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResponseKind {
    #[default]
    Json,
    Text,
    Bytes,
}

/// Everything needed to dispatch one logical request.
///
/// Built once per call and reused across every retry attempt, so headers
/// assigned at preparation time (notably the idempotency key) stay stable for
/// the whole request lifetime. Request interceptors may mutate it in place.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the client base URL, e.g. `loans/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Caller and interceptor supplied headers; merged last, so they win
    /// over anything the pipeline sets.
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub timeout_ms: u64,
    pub kind: ResponseKind,
}

impl RequestDescriptor {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Adds a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers
            .retain(|(candidate, _)| !candidate.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// Per-call overrides. `()` converts to the default config, so plain calls
/// read as `client.get("accounts/", ())`.
#[derive(Clone, Debug, Default)]
pub struct RequestConfig {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Overrides the client-level timeout for this call only.
    pub timeout_ms: Option<u64>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl From<()> for RequestConfig {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for RequestConfig {
    /// Treats a plain array of pairs as query parameters:
    /// `client.get("accounts/", [("page", "2")])`.
    fn from(pairs: [(K, V); N]) -> Self {
        Self {
            query: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
            ..Self::default()
        }
    }
}

/// Read-only view of an in-flight request handed to response and error
/// interceptors, and the surface an error-tracking hook reports from.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    /// Zero-based retry attempt of the current dispatch.
    pub attempt: usize,
    pub started: Instant,
}

impl RequestContext {
    /// Time since the logical request began, across all attempts.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Joins the base URL and a relative path with exactly one slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
