use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// One-shot barrier between a provider's event context and a waiting caller
///
/// Starts with zero permits. The owning session releases it exactly once, on
/// its first terminal event; the session's own mutex is what guarantees the
/// single release. A released gate stays open: waiters hand their permit back,
/// so every later wait passes immediately.
pub struct Gate {
    permits: Semaphore,
    releases: AtomicUsize,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Open the gate. Callers must invoke this at most once per lifecycle.
    pub fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.permits.add_permits(1);
    }

    /// Wait until released or `timeout` elapses. Returns `true` if released.
    pub async fn wait(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(_permit)) => true,
            // The semaphore is never closed
            Ok(Err(_)) => false,
            Err(_) => false,
        }
    }

    /// Number of times the gate has been released
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.permits.available_permits() > 0
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
