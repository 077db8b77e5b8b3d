use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Broadcast payload emitted when a session refresh fails and the
/// application should return to its login screen.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Logout;

/// Single-flight gate around the session refresh call.
///
/// Concurrent requests that all hit 401 serialize here. Whoever acquires the
/// lock first performs the refresh and bumps the generation; everyone that
/// queued behind it observes the bump and skips its own refresh, replaying
/// the original request directly.
pub(crate) struct RefreshGate {
    lock: Mutex<()>,
    generation: AtomicU64,
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Generation snapshot, taken before dispatching an attempt.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Runs `refresh` unless the session was already renewed after `seen`
    /// was observed. Returns `Ok(())` when the session is (now) fresh.
    pub(crate) async fn run_refresh<F, Fut>(&self, seen: u64, refresh: F) -> crate::Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<()>>,
    {
        let _guard = self.lock.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            tracing::debug!("session already refreshed by a concurrent request");
            return Ok(());
        }
        refresh().await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl std::fmt::Debug for RefreshGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGate")
            .field("generation", &self.generation())
            .finish()
    }
}
