use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, Url};
use serde::Deserialize;

use crate::request::join_url;

/// Cookie the backend issues the CSRF token under.
pub(crate) const CSRF_COOKIE: &str = "csrftoken";
/// Header the token travels back on for state-changing requests.
pub(crate) const CSRF_HEADER: &str = "X-CSRFToken";

/// Whether the method mutates server state and must carry the token.
///
/// Wider than the idempotency-key set: DELETE mutates state and needs CSRF
/// protection even though it carries no deduplication key.
pub(crate) fn requires_token(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[derive(Debug, Deserialize)]
struct CsrfIssueResponse {
    #[serde(rename = "csrfToken")]
    csrf_token: String,
}

/// Resolves the CSRF token for a state-changing request.
///
/// Reads the shared cookie jar first; on a miss, falls back to a dedicated
/// `GET <base>/csrf/` call (which also primes the jar via `Set-Cookie`).
/// Returns `None` when neither source yields a token — the request proceeds
/// without the header and the server rejects it as a normal 403.
pub(crate) async fn fetch_token(
    http: &reqwest::Client,
    jar: &Jar,
    base_url: &str,
    timeout_ms: u64,
) -> Option<String> {
    if let Some(token) = token_from_jar(jar, base_url) {
        return Some(token);
    }

    let url = join_url(base_url, "csrf/");
    let response = match http
        .get(&url)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
    {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(%error, "csrf token fetch failed");
            return None;
        }
    };
    if !response.status().is_success() {
        tracing::debug!(status = %response.status(), "csrf endpoint returned non-success");
        return None;
    }
    match response.json::<CsrfIssueResponse>().await {
        Ok(issued) => Some(issued.csrf_token),
        Err(error) => {
            tracing::debug!(%error, "invalid csrf token response body");
            None
        }
    }
}

fn token_from_jar(jar: &Jar, base_url: &str) -> Option<String> {
    let url = Url::parse(base_url).ok()?;
    let header = jar.cookies(&url)?;
    token_from_cookie_header(header.to_str().ok()?)
}

/// Finds the `csrftoken` value in a `Cookie` header string.
fn token_from_cookie_header(raw: &str) -> Option<String> {
    raw.split(';').map(str::trim).find_map(|pair| {
        pair.strip_prefix(CSRF_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_owned)
    })
}
