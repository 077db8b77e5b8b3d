use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::request::{RequestContext, RequestDescriptor};
use crate::ApiError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cross-cutting hooks around the request pipeline: timing, telemetry,
/// header injection for non-browser hosts, error reporting.
///
/// Hooks run in registration order. A failing `on_request` is logged and
/// skipped; it never aborts the call. Response and error hooks are
/// infallible by construction.
pub trait Interceptor: Send + Sync {
    /// May rewrite the outgoing descriptor (headers, query, body) before
    /// header assembly. Runs once per logical request and again before the
    /// post-refresh replay.
    fn on_request(&self, _descriptor: &mut RequestDescriptor) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs on successful (2xx) responses, before body decoding. Non-success
    /// outcomes are reported through [`Interceptor::on_error`] instead.
    fn on_response(&self, _context: &RequestContext, _status: StatusCode, _headers: &HeaderMap) {}

    /// Runs on every produced error, including ones that are subsequently
    /// retried. Check [`RequestContext::attempt`] and
    /// [`ApiError::is_retryable`] to report terminal failures only.
    fn on_error(&self, _context: &RequestContext, _error: &ApiError) {}
}

/// Ordered collection of interceptors, fixed at client construction.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    hooks: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.hooks.push(interceptor);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn run_request(&self, descriptor: &mut RequestDescriptor) {
        for hook in &self.hooks {
            if let Err(error) = hook.on_request(descriptor) {
                tracing::warn!(%error, "request interceptor failed; continuing");
            }
        }
    }

    pub(crate) fn run_response(
        &self,
        context: &RequestContext,
        status: StatusCode,
        headers: &HeaderMap,
    ) {
        for hook in &self.hooks {
            hook.on_response(context, status, headers);
        }
    }

    pub(crate) fn run_error(&self, context: &RequestContext, error: &ApiError) {
        for hook in &self.hooks {
            hook.on_error(context, error);
        }
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use reqwest::Method;

    use super::{BoxError, Interceptor, InterceptorRegistry};
    use crate::request::{Body, RequestDescriptor, ResponseKind};

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor {
            method: Method::POST,
            path: "loans/".to_owned(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
            timeout_ms: 1_000,
            kind: ResponseKind::Json,
        }
    }

    struct Tagger {
        order: Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    }

    impl Interceptor for Tagger {
        fn on_request(&self, descriptor: &mut RequestDescriptor) -> Result<(), BoxError> {
            self.order
                .lock()
                .expect("order mutex must not be poisoned")
                .push(self.tag);
            descriptor.set_header(format!("x-{}", self.tag), "1");
            Ok(())
        }
    }

    struct Failing {
        calls: Arc<AtomicUsize>,
    }

    impl Interceptor for Failing {
        fn on_request(&self, _descriptor: &mut RequestDescriptor) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".into())
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        registry.register(Arc::new(Tagger {
            order: Arc::clone(&order),
            tag: "first",
        }));
        registry.register(Arc::new(Tagger {
            order: Arc::clone(&order),
            tag: "second",
        }));

        let mut descriptor = descriptor();
        registry.run_request(&mut descriptor);

        assert_eq!(
            *order.lock().expect("order mutex must not be poisoned"),
            vec!["first", "second"]
        );
        assert_eq!(descriptor.header("x-first"), Some("1"));
        assert_eq!(descriptor.header("x-second"), Some("1"));
    }

    #[test]
    fn failing_hook_does_not_abort_later_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        registry.register(Arc::new(Failing {
            calls: Arc::clone(&calls),
        }));
        registry.register(Arc::new(Tagger {
            order: Arc::clone(&order),
            tag: "after",
        }));

        let mut descriptor = descriptor();
        registry.run_request(&mut descriptor);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(descriptor.header("x-after"), Some("1"));
    }
}
