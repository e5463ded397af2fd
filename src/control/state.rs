use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

struct ControlInner {
    running: AtomicBool,
    // Mutated only under this lock, which also serializes start/stop.
    token: Mutex<CancellationToken>,
}

/// Process-wide run/stop switch shared by every loop.
///
/// `is_running` is a lock-free read. Each run gets a fresh cancellation
/// token; tasks hold a [`RunSignal`] bound to the token of the run that
/// spawned them, so a task left over from an earlier run stays cancelled
/// even after a later `start()`.
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<ControlInner>,
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            inner: Arc::new(ControlInner {
                running: AtomicBool::new(false),
                token: Mutex::new(token),
            }),
        }
    }

    /// Returns false if already running.
    pub fn start(&self) -> bool {
        let mut token = self.inner.token.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.running.load(Ordering::Acquire) {
            return false;
        }
        *token = CancellationToken::new();
        self.inner.running.store(true, Ordering::Release);
        true
    }

    /// Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let token = self.inner.token.lock().unwrap_or_else(PoisonError::into_inner);
        let was_running = self.inner.running.swap(false, Ordering::AcqRel);
        token.cancel();
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Signal bound to the current run.
    pub fn signal(&self) -> RunSignal {
        let token = self.inner.token.lock().unwrap_or_else(PoisonError::into_inner);
        RunSignal {
            token: token.clone(),
        }
    }

    /// Waits up to `duration`; true if the current run was stopped first.
    pub async fn wait_or_cancel(&self, duration: Duration) -> bool {
        self.signal().wait_or_cancel(duration).await
    }
}

/// A task's view of the run it belongs to.
#[derive(Clone)]
pub struct RunSignal {
    token: CancellationToken,
}

impl RunSignal {
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Waits up to `duration`; true if the run was stopped first.
    pub async fn wait_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
