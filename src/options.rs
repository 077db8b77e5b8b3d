use crate::redact::BuildMode;

/// Configures timeout, retry behavior, and error-message sanitization.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy: the delay
    /// before retry N is `retry_backoff_ms * 2^N`).
    pub retry_backoff_ms: u64,
    /// How much backend detail error messages may carry.
    pub mode: BuildMode,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            mode: BuildMode::Production,
        }
    }
}

/// Fallback when no environment override is present: same-origin deployments
/// where the API lives under the page's own host.
pub const DEFAULT_BASE_URL: &str = "/api/";

/// Resolves the API base URL from the environment.
///
/// Reads, in order:
/// - `TELLER_API_URL` — explicit production endpoint
/// - `TELLER_DEV_API_URL` — development endpoint
///
/// Falls back to [`DEFAULT_BASE_URL`] when neither is set or both are empty.
pub fn resolve_base_url() -> String {
    for key in ["TELLER_API_URL", "TELLER_DEV_API_URL"] {
        if let Ok(value) = std::env::var(key) {
            if !value.trim().is_empty() {
                return value.trim().to_owned();
            }
        }
    }
    DEFAULT_BASE_URL.to_owned()
}
