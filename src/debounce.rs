//! Debounced scheduling: collapse a burst of triggers into one deferred action.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default quiet interval before a debounced write runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A single cancellable, re-armable scheduled task.
///
/// At most one action is pending at a time. Arming again aborts the pending
/// action and restarts the quiet interval from now. Dropping the debouncer
/// aborts whatever is still pending.
pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer that schedules on `runtime`.
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// The quiet interval.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` to run once `delay` passes without another arm.
    pub fn arm<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Abort the pending action, if any. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Whether an action is armed and has not run yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let make = move || {
            let runs = runs_clone.clone();
            Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (runs, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let debouncer = Debouncer::new(DEFAULT_DEBOUNCE, Handle::current());
        let (runs, action) = counter();

        debouncer.arm(action());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_coalesces() {
        let debouncer = Debouncer::new(DEFAULT_DEBOUNCE, Handle::current());
        let (runs, action) = counter();

        for _ in 0..10 {
            debouncer.arm(action());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(DEFAULT_DEBOUNCE, Handle::current());
        let (runs, action) = counter();

        debouncer.arm(action());
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_pending() {
        let debouncer = Debouncer::new(DEFAULT_DEBOUNCE, Handle::current());
        let (runs, action) = counter();

        debouncer.arm(action());
        drop(debouncer);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
