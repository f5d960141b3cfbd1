//! Per-instance cancellable timer used to coalesce rapid triggers

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Default quiet period before a debounced action runs
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Holds at most one pending action. Scheduling a new action cancels the
/// pending one and restarts the quiet period.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a new debouncer
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` to run once `delay` has elapsed without another call.
    ///
    /// Outside a tokio runtime there is no timer to wait on and the action
    /// runs immediately.
    pub fn schedule<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let delay = self.delay;
                *pending = Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    action();
                }));
            }
            Err(_) => {
                tracing::debug!("No async runtime available, running debounced action immediately");
                drop(pending);
                action();
            }
        }
    }

    /// Cancel the pending action, if any
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    /// Whether an action is waiting for its quiet period to end
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_rapid_calls_run_once() {
        let debouncer = Debouncer::default();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let count = count.clone();
            debouncer.schedule(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_action_wins() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for value in 1..=3 {
            let seen = seen.clone();
            debouncer.schedule(move || seen.lock().push(value));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::default();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = count.clone();
        debouncer.schedule(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_without_runtime_runs_immediately() {
        let debouncer = Debouncer::default();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = count.clone();
        debouncer.schedule(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
