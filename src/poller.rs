/// Periodic refresh of a [`StateMirror`].
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::mirror::StateMirror;

/// Intervals below this are clamped; a zero period would spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running poller. Dropping it stops the timer.
pub struct PollHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Cancel without waiting for the task to wind down.
    pub fn stop(self) {
        self.token.cancel();
    }

    /// Cancel and wait until the task has exited. Nothing refreshes after this returns.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(component = "poller", event = "poller.join_failed", error = %e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Refresh once immediately, then every `period` until the handle is dropped or
/// `parent` is cancelled. A failed refresh is logged and the next tick retries;
/// there is no backoff.
pub fn activate(mirror: StateMirror, period: Duration, parent: &CancellationToken) -> PollHandle {
    let period = period.max(MIN_POLL_INTERVAL);
    let token = parent.child_token();
    let stop = token.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        debug!(component = "poller", event = "poller.started", period_ms = period.as_millis() as u64);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                result = mirror.refresh() => {
                    if let Err(e) = result {
                        debug!(component = "poller", event = "poller.tick_failed", error = %e);
                    }
                }
            }
        }
        debug!(component = "poller", event = "poller.stopped");
    });
    PollHandle { token, task: Some(task) }
}
