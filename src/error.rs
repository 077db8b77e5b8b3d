use serde_json::Value as JsonValue;

/// Error type returned by this crate.
///
/// `status()` is 0 when no HTTP response was received (network failure or
/// timeout), matching the status the caller would see from a dead transport.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network or request execution error from `reqwest`; no response arrived.
    #[error("network error: {source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },
    /// The per-attempt timeout elapsed before a response arrived.
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
    /// Non-success HTTP status with a sanitized message and the raw JSON
    /// payload (when the body parsed), kept for field-level validation UI.
    #[error("http error {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<JsonValue>,
    },
    /// A 401 whose session refresh attempt also failed.
    #[error("session expired: {message}")]
    AuthExpired { message: String },
    /// HTTP 403. Never retried, never carries backend detail.
    #[error("you do not have permission to perform this action")]
    PermissionDenied,
    /// Response body decoding failure.
    #[error("decode error: {0}")]
    Decode(String),
    /// Client construction or configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status associated with this error, 0 when none exists.
    pub fn status(&self) -> u16 {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::Decode(_) | Self::Config(_) => 0,
            Self::Http { status, .. } => *status,
            Self::AuthExpired { .. } => 401,
            Self::PermissionDenied => 403,
        }
    }

    /// Whether another attempt of the same request may succeed.
    ///
    /// Network failures and timeouts are retryable, as are 5xx responses and
    /// 429 rate limiting. Every other 4xx is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            Self::AuthExpired { .. }
            | Self::PermissionDenied
            | Self::Decode(_)
            | Self::Config(_) => false,
        }
    }

    /// Raw JSON payload of the failing response, when one parsed.
    pub fn body(&self) -> Option<&JsonValue> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Pulls the most specific human-readable message out of a backend error
/// payload. Field priority follows what the API actually emits:
/// `non_field_errors[0]`, then `detail`, then `error`, then `message`.
pub(crate) fn extract_message(body: &JsonValue) -> Option<String> {
    if let Some(first) = body
        .get("non_field_errors")
        .and_then(JsonValue::as_array)
        .and_then(|errors| errors.first())
        .and_then(JsonValue::as_str)
    {
        return Some(first.to_owned());
    }
    for key in ["detail", "error", "message"] {
        if let Some(text) = body.get(key).and_then(JsonValue::as_str) {
            return Some(text.to_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_message, ApiError};

    #[test]
    fn server_errors_and_rate_limiting_are_retryable() {
        for status in [429u16, 500, 502, 503, 504, 599] {
            let error = ApiError::Http {
                status,
                message: String::new(),
                body: None,
            };
            assert!(error.is_retryable(), "status {status} must be retryable");
        }
    }

    #[test]
    fn client_errors_are_terminal() {
        for status in [400u16, 404, 409, 422] {
            let error = ApiError::Http {
                status,
                message: String::new(),
                body: None,
            };
            assert!(!error.is_retryable(), "status {status} must be terminal");
        }
        assert!(!ApiError::PermissionDenied.is_retryable());
        assert!(!ApiError::AuthExpired {
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn timeout_reports_status_zero_and_is_retryable() {
        let error = ApiError::Timeout { elapsed_ms: 30_000 };
        assert_eq!(error.status(), 0);
        assert!(error.is_retryable());
    }

    #[test]
    fn extract_message_prefers_non_field_errors() {
        let body = json!({
            "non_field_errors": ["Duplicate entry"],
            "detail": "ignored",
            "message": "ignored too"
        });
        assert_eq!(extract_message(&body).as_deref(), Some("Duplicate entry"));
    }

    #[test]
    fn extract_message_falls_through_detail_error_message() {
        assert_eq!(
            extract_message(&json!({"detail": "Not found."})).as_deref(),
            Some("Not found.")
        );
        assert_eq!(
            extract_message(&json!({"error": "bad input"})).as_deref(),
            Some("bad input")
        );
        assert_eq!(
            extract_message(&json!({"message": "try later"})).as_deref(),
            Some("try later")
        );
        assert_eq!(extract_message(&json!({"code": 17})), None);
    }

    #[test]
    fn empty_non_field_errors_falls_back() {
        let body = json!({"non_field_errors": [], "detail": "fallback"});
        assert_eq!(extract_message(&body).as_deref(), Some("fallback"));
    }
}
