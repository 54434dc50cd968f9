//! Inactivity Monitor: signs the user out after an idle window.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Qualifying user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    Pointer,
    Keyboard,
    Scroll,
    Touch,
}

struct Armed {
    activity: mpsc::UnboundedSender<ActivityEvent>,
    task: JoinHandle<()>,
}

/// Cancellable idle countdown.
///
/// While armed, every recorded [`ActivityEvent`] restarts the full window
/// (the last event always wins). When the window elapses without activity
/// the expiry callback is spawned as its own task, so disarming the monitor
/// from inside that callback cannot cancel it.
pub struct InactivityMonitor {
    window: Duration,
    armed: Mutex<Option<Armed>>,
}

impl core::fmt::Debug for InactivityMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InactivityMonitor")
            .field("window", &self.window)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl InactivityMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn slot(&self) -> MutexGuard<'_, Option<Armed>> {
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_armed(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|armed| !armed.task.is_finished())
    }

    /// Start the countdown. A no-op if already running; returns whether a new
    /// countdown was started. Requires a Tokio runtime.
    pub fn arm<F, Fut>(&self, on_expire: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|armed| !armed.task.is_finished()) {
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "no runtime available, inactivity monitor not armed");
                return false;
            }
        };

        let (activity, mut events) = mpsc::unbounded_channel();
        let window = self.window;
        let task = runtime.spawn(async move {
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        tracing::info!(
                            window_secs = window.as_secs(),
                            "inactivity window elapsed, signing out"
                        );
                        tokio::spawn(on_expire());
                        return;
                    }
                    event = events.recv() => match event {
                        Some(event) => {
                            tracing::trace!(?event, "activity observed");
                            deadline.as_mut().reset(Instant::now() + window);
                        }
                        None => return,
                    },
                }
            }
        });

        tracing::debug!(window_secs = window.as_secs(), "inactivity monitor armed");
        *slot = Some(Armed { activity, task });
        true
    }

    /// Restart the countdown. Ignored while disarmed.
    pub fn record(&self, event: ActivityEvent) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|armed| armed.activity.send(event).is_ok())
    }

    /// Cancel the countdown, if any.
    pub fn disarm(&self) {
        if let Some(armed) = self.slot().take() {
            armed.task.abort();
            tracing::debug!("inactivity monitor disarmed");
        }
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.disarm();
    }
}
