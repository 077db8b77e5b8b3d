use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::auth::{Logout, RefreshGate};
use crate::csrf::{self, CSRF_HEADER};
use crate::error::extract_message;
use crate::idempotency::{self, IDEMPOTENCY_HEADER};
use crate::interceptor::{Interceptor, InterceptorRegistry};
use crate::options::resolve_base_url;
use crate::redact::{sanitize, BuildMode};
use crate::request::{join_url, Body, RequestConfig, RequestContext, RequestDescriptor, ResponseKind};
use crate::{ApiError, ClientOptions, Result};

const LOGOUT_CHANNEL_CAPACITY: usize = 16;

/// Successful outcome of one logical request.
///
/// `data` is `None` for 204 and other empty-body successes.
#[derive(Clone, Debug)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: Option<T>,
}

/// Raw HTTP response before body decoding.
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    bytes: Vec<u8>,
}

/// Where the state machine goes after evaluating one attempt.
enum Disposition {
    /// 2xx — hand the response to the caller.
    Done(RawResponse),
    /// Retryable failure; subject to the backoff budget.
    Retry(ApiError),
    /// 401 — run the refresh cycle, then replay once.
    Refresh(ApiError),
    /// Terminal failure.
    Fail(ApiError),
}

/// Resilient HTTP client for a banking-operations REST API.
///
/// Wraps `reqwest` with exponential-backoff retries, per-request idempotency
/// keys, CSRF token handling, cookie-session refresh on 401, and an
/// interceptor chain. Cookies always travel: the client owns a shared jar
/// attached to every request.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
    options: ClientOptions,
    interceptors: InterceptorRegistry,
    refresh_gate: Arc<RefreshGate>,
    logout: broadcast::Sender<Logout>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client against the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|error| ApiError::Config(error.to_string()))?;
        let (logout, _) = broadcast::channel(LOGOUT_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            jar,
            base_url: base_url.into(),
            options: ClientOptions::default(),
            interceptors: InterceptorRegistry::new(),
            refresh_gate: Arc::new(RefreshGate::new()),
            logout,
        })
    }

    /// Creates a client from the environment.
    ///
    /// Base URL selection order: `TELLER_API_URL`, then `TELLER_DEV_API_URL`,
    /// then the same-origin `/api/` fallback.
    pub fn from_env() -> Result<Self> {
        Self::new(resolve_base_url())
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers an interceptor. Registration happens at construction time,
    /// before concurrent traffic begins; the chain is fixed afterwards.
    pub fn with_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.register(Arc::new(interceptor));
        self
    }

    /// Subscribes to the logout signal emitted when a session refresh fails.
    pub fn subscribe_logout(&self) -> broadcast::Receiver<Logout> {
        self.logout.subscribe()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Verb façade ─────────────────────────────────────────────────────────

    pub async fn get<T, C>(&self, path: &str, config: C) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        C: Into<RequestConfig>,
    {
        self.call(Method::GET, path, Body::Empty, config).await
    }

    pub async fn delete<T, C>(&self, path: &str, config: C) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        C: Into<RequestConfig>,
    {
        self.call(Method::DELETE, path, Body::Empty, config).await
    }

    pub async fn post<T, B, C>(&self, path: &str, body: &B, config: C) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        C: Into<RequestConfig>,
    {
        self.call(Method::POST, path, encode_body(body)?, config)
            .await
    }

    pub async fn put<T, B, C>(&self, path: &str, body: &B, config: C) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        C: Into<RequestConfig>,
    {
        self.call(Method::PUT, path, encode_body(body)?, config)
            .await
    }

    pub async fn patch<T, B, C>(&self, path: &str, body: &B, config: C) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        C: Into<RequestConfig>,
    {
        self.call(Method::PATCH, path, encode_body(body)?, config)
            .await
    }

    /// GET returning the raw body bytes (file downloads).
    pub async fn get_bytes(
        &self,
        path: &str,
        config: impl Into<RequestConfig>,
    ) -> Result<ApiResponse<Vec<u8>>> {
        let descriptor =
            self.descriptor(Method::GET, path, Body::Empty, config.into(), ResponseKind::Bytes);
        let raw = self.execute(descriptor).await?;
        Ok(ApiResponse {
            status: raw.status.as_u16(),
            data: if raw.bytes.is_empty() {
                None
            } else {
                Some(raw.bytes)
            },
        })
    }

    /// GET returning the body as text.
    pub async fn get_text(
        &self,
        path: &str,
        config: impl Into<RequestConfig>,
    ) -> Result<ApiResponse<String>> {
        let descriptor =
            self.descriptor(Method::GET, path, Body::Empty, config.into(), ResponseKind::Text);
        let raw = self.execute(descriptor).await?;
        let data = if raw.bytes.is_empty() {
            None
        } else {
            Some(String::from_utf8(raw.bytes).map_err(|error| {
                ApiError::Decode(format!("response body is not valid UTF-8: {error}"))
            })?)
        };
        Ok(ApiResponse {
            status: raw.status.as_u16(),
            data,
        })
    }

    /// Generic entry point behind the verb façade.
    pub async fn call<T, C>(
        &self,
        method: Method,
        path: &str,
        body: Body,
        config: C,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        C: Into<RequestConfig>,
    {
        let descriptor = self.descriptor(method, path, body, config.into(), ResponseKind::Json);
        let raw = self.execute(descriptor).await?;
        decode_json(raw)
    }

    // ── Executor ────────────────────────────────────────────────────────────

    fn descriptor(
        &self,
        method: Method,
        path: &str,
        body: Body,
        config: RequestConfig,
        kind: ResponseKind,
    ) -> RequestDescriptor {
        RequestDescriptor {
            method,
            path: path.to_owned(),
            query: config.query,
            headers: config.headers,
            body,
            timeout_ms: config.timeout_ms.unwrap_or(self.options.timeout_ms),
            kind,
        }
    }

    /// Runs one logical request to completion: prepare, interceptors, header
    /// assembly, dispatch, and the retry / refresh-and-replay transitions.
    async fn execute(&self, mut descriptor: RequestDescriptor) -> Result<RawResponse> {
        // Prepare: the idempotency key is minted exactly once and rides the
        // descriptor for every physical attempt of this logical request.
        if idempotency::requires_key(&descriptor.method)
            && descriptor.header(IDEMPOTENCY_HEADER).is_none()
        {
            descriptor.set_header(IDEMPOTENCY_HEADER, idempotency::new_key());
        }

        let url = join_url(&self.base_url, &descriptor.path);
        let started = Instant::now();
        let mut attempt = 0usize;
        let mut refreshed = false;

        self.interceptors.run_request(&mut descriptor);

        loop {
            let context = RequestContext {
                method: descriptor.method.clone(),
                url: url.clone(),
                attempt,
                started,
            };
            let session_generation = self.refresh_gate.generation();
            let attempt_started = Instant::now();

            let disposition = match self.dispatch(&descriptor, &url).await {
                Ok(raw) => {
                    // Response hooks see the success path only; failures are
                    // reported through the error hooks after evaluation.
                    if raw.status.is_success() {
                        self.interceptors
                            .run_response(&context, raw.status, &raw.headers);
                    }
                    evaluate_response(self.options.mode, raw)
                }
                Err(error) => evaluate_transport(error, attempt_started),
            };

            match disposition {
                Disposition::Done(raw) => return Ok(raw),
                Disposition::Fail(error) => {
                    self.interceptors.run_error(&context, &error);
                    return Err(error);
                }
                Disposition::Retry(error) => {
                    self.interceptors.run_error(&context, &error);
                    if attempt >= self.options.max_retries {
                        return Err(error);
                    }
                    self.wait_before_retry(attempt).await;
                    attempt += 1;
                }
                Disposition::Refresh(original) => {
                    self.interceptors.run_error(&context, &original);
                    if refreshed {
                        // The replay after a successful refresh came back
                        // 401 again; do not loop.
                        return Err(original);
                    }
                    refreshed = true;
                    match self
                        .refresh_gate
                        .run_refresh(session_generation, || self.refresh_session())
                        .await
                    {
                        Ok(()) => {
                            tracing::debug!(url = %url, "session refreshed; replaying request");
                            // Back to Prepare: request interceptors run again,
                            // the idempotency key does not change, and the
                            // retry budget is untouched.
                            self.interceptors.run_request(&mut descriptor);
                        }
                        Err(error) => {
                            tracing::warn!(%error, "session refresh failed; signalling logout");
                            let _ = self.logout.send(Logout);
                            return Err(original);
                        }
                    }
                }
            }
        }
    }

    /// One physical attempt: header assembly plus the transport call.
    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        url: &str,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut request = self
            .http
            .request(descriptor.method.clone(), url)
            .timeout(Duration::from_millis(descriptor.timeout_ms));

        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }

        // Content type is derived from the body kind: JSON sets it, raw
        // bodies bring their own or leave it to the transport.
        request = match &descriptor.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Raw {
                bytes,
                content_type,
            } => {
                let request = request.body(bytes.clone());
                match content_type {
                    Some(content_type) => {
                        request.header(reqwest::header::CONTENT_TYPE, content_type)
                    }
                    None => request,
                }
            }
        };

        let mut headers = HeaderMap::new();
        if csrf::requires_token(&descriptor.method) {
            if let Some(token) =
                csrf::fetch_token(&self.http, &self.jar, &self.base_url, descriptor.timeout_ms)
                    .await
            {
                if let Ok(value) = HeaderValue::try_from(token) {
                    headers.insert(CSRF_HEADER, value);
                }
            }
        }
        // Caller and interceptor headers merge last and win on conflicts.
        for (name, value) in &descriptor.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "skipping invalid header"),
            }
        }
        request = request.headers(headers);

        let response = request.send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response.bytes().await?;
        Ok(RawResponse {
            status,
            headers: response_headers,
            bytes: bytes.to_vec(),
        })
    }

    /// POST to the refresh endpoint with credentials (cookies) included.
    /// Success means the server rotated the session cookies in our jar; no
    /// token material is ever exposed to this code.
    async fn refresh_session(&self) -> Result<()> {
        let url = join_url(&self.base_url, "auth/refresh/");
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_millis(self.options.timeout_ms))
            .send()
            .await
            .map_err(|source| ApiError::Network { source })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Http {
                status: response.status().as_u16(),
                message: "session refresh rejected".to_owned(),
                body: None,
            })
        }
    }

    async fn wait_before_retry(&self, attempt: usize) {
        let delay_ms = backoff_delay_ms(self.options.retry_backoff_ms, attempt);
        tracing::debug!(attempt, delay_ms, "retrying request after backoff");
        sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// Exponential backoff: `base * 2^attempt`, capped to avoid shift overflow.
fn backoff_delay_ms(base_ms: u64, attempt: usize) -> u64 {
    let exp = attempt.min(16) as u32;
    base_ms.saturating_mul(1u64 << exp)
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Body> {
    serde_json::to_value(body)
        .map(Body::Json)
        .map_err(|error| ApiError::Decode(format!("failed to encode request body: {error}")))
}

/// Status evaluation for one attempt that produced an HTTP response.
/// Pure so every transition is testable without a transport.
fn evaluate_response(mode: BuildMode, raw: RawResponse) -> Disposition {
    if raw.status.is_success() {
        return Disposition::Done(raw);
    }

    let body: Option<JsonValue> = serde_json::from_slice(&raw.bytes).ok();
    let message = body
        .as_ref()
        .and_then(extract_message)
        .unwrap_or_else(|| format!("HTTP error! status: {}", raw.status.as_u16()));

    match raw.status {
        StatusCode::FORBIDDEN => Disposition::Fail(ApiError::PermissionDenied),
        StatusCode::UNAUTHORIZED => Disposition::Refresh(ApiError::AuthExpired {
            message: sanitize(mode, &message),
        }),
        status => {
            let error = ApiError::Http {
                status: status.as_u16(),
                message: sanitize(mode, &message),
                body,
            };
            if error.is_retryable() {
                Disposition::Retry(error)
            } else {
                Disposition::Fail(error)
            }
        }
    }
}

/// Classification for attempts that never produced an HTTP response.
/// Timeouts are distinguished from generic network failures for logging;
/// both retry under the same backoff policy.
fn evaluate_transport(error: reqwest::Error, attempt_started: Instant) -> Disposition {
    if error.is_timeout() {
        Disposition::Retry(ApiError::Timeout {
            elapsed_ms: attempt_started.elapsed().as_millis() as u64,
        })
    } else if error.is_builder() {
        // The request could not even be constructed (bad URL, bad header);
        // no number of retries will change that.
        Disposition::Fail(ApiError::Config(error.to_string()))
    } else {
        Disposition::Retry(ApiError::Network { source: error })
    }
}

fn decode_json<T: DeserializeOwned>(raw: RawResponse) -> Result<ApiResponse<T>> {
    let status = raw.status.as_u16();
    if raw.status == StatusCode::NO_CONTENT || raw.bytes.is_empty() {
        return Ok(ApiResponse { status, data: None });
    }
    let data = serde_json::from_slice(&raw.bytes)
        .map_err(|error| ApiError::Decode(format!("invalid response JSON: {error}")))?;
    Ok(ApiResponse {
        status,
        data: Some(data),
    })
}
