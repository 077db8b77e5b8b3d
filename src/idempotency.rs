use reqwest::Method;
use uuid::Uuid;

/// Header carrying the deduplication key for state-changing requests.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Generates a fresh idempotency key (UUID v4).
///
/// One key is minted per logical request and reused on every physical
/// attempt, including backoff retries and the single post-refresh replay, so
/// the server can deduplicate when more than one attempt actually lands.
pub fn new_key() -> String {
    Uuid::new_v4().to_string()
}

/// Whether the method needs a deduplication key. DELETE is naturally
/// idempotent on the server and carries none.
pub(crate) fn requires_key(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
