//! Trailing-edge debounce for snapshot refreshes

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Coalesces repeated requests: a request scheduled while another is pending
/// supersedes it, and only the last one runs once `window` has elapsed
/// without a newer request.
///
/// Only the waiting period is cancellable. Once the window elapses the work
/// is spawned as its own task and runs to completion even if the debouncer
/// is cancelled afterwards.
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

    /// Schedule `work`, superseding any pending request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tokio::spawn(work);
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending request, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|p| p.into_inner()).take();
        match pending {
            Some(timer) => {
                let was_waiting = !timer.is_finished();
                timer.abort();
                was_waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
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

    fn counter_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_within_the_window_run_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let d = Debouncer::new(Duration::from_millis(250));
        for _ in 0..5 {
            d.schedule(counter_task(&runs));
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(260)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gaps_let_each_burst_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let d = Debouncer::new(Duration::from_millis(250));
        d.schedule(counter_task(&runs));
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        d.schedule(counter_task(&runs));
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_pending_request() {
        let runs = Arc::new(AtomicUsize::new(0));
        let d = Debouncer::new(Duration::from_millis(250));
        d.schedule(counter_task(&runs));
        assert!(d.is_pending());
        assert!(d.cancel());
        assert!(!d.cancel());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
