//! Cooperative scheduling helpers used by the editor session.

use std::{
    future::Future,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;

/// Trailing-edge debouncer.
///
/// Each [`call`](Debouncer::call) cancels the pending one and schedules its
/// own after the quiescence window, so the last call of a burst always runs.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule `task`. Must be called inside a tokio runtime.
    pub fn call<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            task.await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Request counter for last-request-wins.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request and return its ticket.
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether no request was started after `ticket`.
    pub fn is_current(&self, ticket: u64) -> bool {
        self.0.load(Ordering::SeqCst) == ticket
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `attempt` up to `attempts` times, waiting `delay` before each try.
///
/// Returns whether an attempt succeeded.
pub async fn retry<F>(attempts: u32, delay: Duration, mut attempt: F) -> bool
where
    F: FnMut() -> bool,
{
    for n in 1..=attempts {
        tokio::time::sleep(delay).await;
        if attempt() {
            return true;
        }
        debug!("attempt {n}/{attempts} failed");
    }
    false
}
