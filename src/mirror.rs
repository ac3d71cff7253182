/// Read-only mirror of the backend's session state.
///
/// Refreshes may overlap (poll tick plus turn completion). Ordering rule:
/// **last issued wins**. Every refresh takes a ticket when it is issued; a
/// response is applied only if its ticket is newer than the one behind the
/// snapshot currently held. A slow response to an older request can therefore
/// never overwrite a newer snapshot.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::Backend;
use crate::error::ApiError;
use crate::session::SessionIdentity;
use crate::state::ApplicationState;

#[derive(Debug, Clone, Default)]
pub struct MirrorSlot {
    /// Ticket of the request whose response produced `snapshot` (0 = none yet)
    pub ticket: u64,
    pub snapshot: Option<Arc<ApplicationState>>,
    /// Set at teardown. Nothing is applied afterwards.
    pub detached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The response replaced the snapshot.
    Applied,
    /// A newer-issued response was already applied; this one was dropped.
    Stale,
    /// The mirror was torn down before the response arrived.
    Detached,
}

struct Inner {
    backend: Arc<dyn Backend>,
    identity: SessionIdentity,
    slot: watch::Sender<MirrorSlot>,
    issued: AtomicU64,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

#[derive(Clone)]
pub struct StateMirror {
    inner: Arc<Inner>,
}

/// A refresh that has been issued (ticket taken) but not yet sent.
pub struct PendingRefresh {
    mirror: StateMirror,
    ticket: u64,
}

impl PendingRefresh {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub async fn run(self) -> Result<RefreshOutcome, ApiError> {
        self.mirror.complete(self.ticket).await
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StateMirror {
    pub fn new(backend: Arc<dyn Backend>, identity: SessionIdentity) -> Self {
        let (slot, _rx) = watch::channel(MirrorSlot::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                identity,
                slot,
                issued: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Take a ticket now; send the request when the returned value is run.
    pub fn issue(&self) -> PendingRefresh {
        let ticket = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        PendingRefresh { mirror: self.clone(), ticket }
    }

    /// Fetch authoritative state once and apply it under the last-issued-wins rule.
    /// A failure leaves the current snapshot untouched and is returned to the caller;
    /// there is no retry here.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ApiError> {
        self.issue().run().await
    }

    async fn complete(&self, ticket: u64) -> Result<RefreshOutcome, ApiError> {
        if self.is_detached() {
            return Ok(RefreshOutcome::Detached);
        }
        let result = {
            let _flight = InFlight::enter(&self.inner.in_flight);
            self.inner.backend.get_state(&self.inner.identity).await
        };
        match result {
            Ok(state) => Ok(self.apply(ticket, state)),
            Err(_) if self.is_detached() => Ok(RefreshOutcome::Detached),
            Err(err) => {
                warn!(
                    component = "mirror",
                    event = "refresh.failed",
                    session_id = %self.inner.identity.session_id(),
                    ticket,
                    error = %err,
                );
                // Only a failure newer than the held snapshot is reported.
                if ticket > self.inner.slot.borrow().ticket {
                    *self.last_error_slot() = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    fn apply(&self, ticket: u64, state: ApplicationState) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::Stale;
        self.inner.slot.send_if_modified(|slot| {
            if slot.detached {
                outcome = RefreshOutcome::Detached;
                return false;
            }
            if ticket <= slot.ticket {
                return false;
            }
            slot.ticket = ticket;
            slot.snapshot = Some(Arc::new(state));
            outcome = RefreshOutcome::Applied;
            true
        });
        match outcome {
            RefreshOutcome::Applied => {
                *self.last_error_slot() = None;
                debug!(component = "mirror", event = "refresh.applied", ticket);
            }
            RefreshOutcome::Stale => {
                debug!(component = "mirror", event = "refresh.stale", ticket);
            }
            RefreshOutcome::Detached => {}
        }
        outcome
    }

    /// Teardown: responses arriving after this are ignored.
    pub fn detach(&self) {
        self.inner.slot.send_if_modified(|slot| {
            let changed = !slot.detached;
            slot.detached = true;
            changed
        });
    }

    pub fn is_detached(&self) -> bool {
        self.inner.slot.borrow().detached
    }

    pub fn snapshot(&self) -> Option<Arc<ApplicationState>> {
        self.inner.slot.borrow().snapshot.clone()
    }

    pub fn has_snapshot(&self) -> bool {
        self.inner.slot.borrow().snapshot.is_some()
    }

    /// Number of refresh requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Message of the most recent failed refresh, cleared by the next applied one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error_slot().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MirrorSlot> {
        self.inner.slot.subscribe()
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    fn last_error_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.inner.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
