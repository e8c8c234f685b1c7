use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::telemetry::DEBOUNCE_WINDOW;

pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct DebounceState {
    callback: Option<RefreshCallback>,
    pending: Option<JoinHandle<()>>,
    /// Bumped on every notify; a timer only fires if it is still current
    generation: u64,
    closed: bool,
}

/// Coalesces bursts of notifications into one refresh trigger that fires a
/// fixed quiet window after the last notification.
pub struct RefreshDebouncer {
    state: Arc<Mutex<DebounceState>>,
    window: Duration,
}

impl Default for RefreshDebouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

impl RefreshDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(DebounceState::default())),
            window,
        }
    }

    /// Install the downstream refresh trigger
    pub fn attach(&self, callback: RefreshCallback) {
        let mut state = self.state.lock();
        if state.closed {
            warn!("Ignoring refresh callback on a shut down debouncer");
            return;
        }
        state.callback = Some(callback);
    }

    /// Arm or re-arm the timer
    pub fn notify(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, dropping refresh notification");
            return;
        };

        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        let shared = Arc::clone(&self.state);
        let window = self.window;
        state.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let callback = {
                let mut state = shared.lock();
                if state.closed || state.generation != generation {
                    return;
                }
                state.pending = None;
                state.callback.clone()
            };
            if let Some(callback) = callback {
                callback();
            }
        }));
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Detach the callback and cancel any pending timer. A timer that is
    /// already past its sleep sees the closed flag and does nothing.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.callback = None;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    fn counting(debouncer: &RefreshDebouncer) -> Arc<AtomicUsize> {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        debouncer.attach(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_trigger_after_quiet_window() {
        let debouncer = RefreshDebouncer::default();
        let fired = counting(&debouncer);

        for _ in 0..10 {
            debouncer.notify();
            sleep(Duration::from_millis(100)).await;
        }
        let last_notify = Instant::now() - Duration::from_millis(100);

        sleep(Duration::from_millis(399)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(Instant::now() - last_notify >= DEBOUNCE_WINDOW);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_trigger() {
        let debouncer = RefreshDebouncer::default();
        let fired = counting(&debouncer);

        debouncer.notify();
        sleep(Duration::from_millis(250)).await;
        debouncer.shutdown();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Late notifications after teardown are ignored
        debouncer.notify();
        debouncer.attach(Arc::new(|| panic!("must not fire")));
        sleep(Duration::from_secs(1)).await;
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn notify_without_runtime_is_a_no_op() {
        let debouncer = RefreshDebouncer::default();
        debouncer.notify();
        assert!(!debouncer.is_pending());
    }
}
