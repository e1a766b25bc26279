//! Network outage debounce
//!
//! A single transient connection drop should not surface a connectivity alert
//! to the user; a sustained outage should, exactly once. The detector arms a
//! timer at the first failure while idle. A success before the window elapses
//! aborts the timer silently; expiry with no success in between fires the
//! outage notification. A new window can only open after the previous one was
//! cleared or fired.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Debounce window between the first failure and the outage notification.
pub const DEFAULT_OUTAGE_WINDOW: Duration = Duration::from_secs(3);

struct OutageState {
    timer: Option<JoinHandle<()>>,
    /// Whether a success arrived since the window opened
    resolved: bool,
}

/// Debounced sustained-outage detector.
pub struct OutageDetector {
    window: Duration,
    state: Arc<Mutex<OutageState>>,
}

fn lock(state: &Mutex<OutageState>) -> MutexGuard<'_, OutageState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl OutageDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(OutageState {
                timer: None,
                resolved: true,
            })),
        }
    }

    /// Record a network failure. Arms the debounce timer if no window is
    /// already open; `on_outage` runs if the window elapses unresolved.
    pub fn arm(&self, on_outage: impl FnOnce() + Send + 'static) {
        let mut state = lock(&self.state);
        if state.timer.is_some() {
            // A window is already open; this failure belongs to it
            return;
        }
        state.resolved = false;

        let shared = Arc::clone(&self.state);
        let window = self.window;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let fire = {
                let mut state = lock(&shared);
                state.timer = None;
                !state.resolved
            };
            if fire {
                warn!(
                    window_ms = window.as_millis() as u64,
                    "sustained network outage detected"
                );
                metrics::counter!("api_network_outage_total").increment(1);
                on_outage();
            }
        }));
    }

    /// Record a successful response: abort any pending window so a stale
    /// outage notification cannot fire after the connection self-healed.
    pub fn resolve(&self) {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timer.take() {
            timer.abort();
            state.resolved = true;
            debug!("pending outage window cleared by successful response");
        }
    }
}
