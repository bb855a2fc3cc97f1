//! Switch-output use case: make the stream behind a tally index the program
//! output.
//!
//! # Two-phase switching (for beginners)
//!
//! The switcher models output changes in two steps, like a vision mixer:
//!
//! ```text
//!   Idle ──resolve──► Registering ──set_preview──► Switching ──set_program──► Done
//!     │                    │                           │
//!     └── unknown index ───┴──── preview failed ───────┴── program failed ──► Failed
//! ```
//!
//! 1. **Preview** – the stream is staged on the preview bus.  If this fails,
//!    nothing visible to the audience has changed.
//! 2. **Program** – the staged stream is committed to the live output.  If
//!    this fails, preview already shows the new stream while program still
//!    shows the old one.  That split state is left as is; the next command
//!    for any index overwrites both buses.
//!
//! # One switch per index at a time
//!
//! Device state for the output slot is not transactional, so the two phases
//! of two switches for the *same* index must never interleave.  Each index
//! owns an async gate.  Under [`SameIndexPolicy::Queue`] a second command
//! waits for the gate, up to [`MAX_QUEUED_PER_INDEX`] waiters; past that it
//! fails with [`SwitchError::Busy`].  Under [`SameIndexPolicy::Reject`] it
//! fails at once with [`SwitchError::Busy`].  Commands for *different* indices never wait
//! on each other.
//!
//! # Expired sessions
//!
//! If the device rejects the credential during a phase, the controller logs
//! in again and retries that phase.  A switch gets one re-login in total: a
//! rejection in the program phase after the preview phase already re-logged
//! in fails the switch.  If the new login fails, the session is invalidated
//! so later calls fail fast until a login works.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tally_core::{RegistryError, StreamDescriptor, StreamRegistry, TallyIndex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::device::{DeviceClient, DeviceError, SwitchPhase};

/// Switches that may wait behind a running one for the same index under
/// [`SameIndexPolicy::Queue`].  Further commands fail with
/// [`SwitchError::Busy`].
pub const MAX_QUEUED_PER_INDEX: usize = 8;

// ── Policy, state and errors ──────────────────────────────────────────────────

/// What to do with a command for an index whose previous switch is still
/// running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameIndexPolicy {
    /// Wait, then run strictly after the running switch.
    #[default]
    Queue,
    /// Fail immediately with [`SwitchError::Busy`].
    Reject,
}

/// Progress of the most recent switch for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Idle,
    Registering,
    Switching,
    Done,
    Failed,
}

/// Observable view of one index slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub index: u16,
    /// Id of the stream bound to this index, if any.
    pub stream_id: Option<String>,
    pub state: SwitchState,
    pub last_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error(transparent)]
    UnknownIndex(#[from] RegistryError),

    #[error("tally index {index} already has a switch in flight")]
    Busy { index: TallyIndex },

    #[error("preview phase failed for tally index {index}: {source}")]
    Preview {
        index: TallyIndex,
        #[source]
        source: DeviceError,
    },

    #[error("program phase failed for tally index {index}: {source}")]
    Program {
        index: TallyIndex,
        #[source]
        source: DeviceError,
    },
}

// ── Controller ────────────────────────────────────────────────────────────────

struct SlotRecord {
    state: SwitchState,
    last_error: Option<String>,
}

struct Slot {
    gate: tokio::sync::Mutex<()>,
    /// Switches holding or waiting for `gate`.
    pending: AtomicUsize,
    record: Mutex<SlotRecord>,
}

/// Counts one switch in [`Slot::pending`] until dropped.
struct Pending<'a>(&'a AtomicUsize);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Slot {
    fn new() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            pending: AtomicUsize::new(0),
            record: Mutex::new(SlotRecord {
                state: SwitchState::Idle,
                last_error: None,
            }),
        }
    }

    /// Joins the queue for `gate`, or `None` if it is already full.
    fn reserve(&self) -> Option<Pending<'_>> {
        let ahead = self.pending.fetch_add(1, Ordering::AcqRel);
        let pending = Pending(&self.pending);
        (ahead <= MAX_QUEUED_PER_INDEX).then_some(pending)
    }

    fn record(&self) -> MutexGuard<'_, SlotRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, state: SwitchState) {
        let mut record = self.record();
        record.state = state;
        if state != SwitchState::Failed {
            record.last_error = None;
        }
    }

    fn fail(&self, err: &SwitchError) {
        let mut record = self.record();
        record.state = SwitchState::Failed;
        record.last_error = Some(err.to_string());
    }
}

/// Drives two-phase switches against the device.
pub struct SwitchController {
    registry: Arc<StreamRegistry>,
    client: DeviceClient,
    policy: SameIndexPolicy,
    /// One slot per registry index; slot `i` serves index `i + 1`.
    slots: Vec<Slot>,
    current_program: Mutex<Option<TallyIndex>>,
}

impl SwitchController {
    pub fn new(registry: Arc<StreamRegistry>, client: DeviceClient, policy: SameIndexPolicy) -> Self {
        let slots = (0..registry.capacity()).map(|_| Slot::new()).collect();
        Self {
            registry,
            client,
            policy,
            slots,
            current_program: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn policy(&self) -> SameIndexPolicy {
        self.policy
    }

    /// Index most recently committed to program output by this process.
    pub fn current_program(&self) -> Option<TallyIndex> {
        *self
            .current_program
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a complete switch to the stream bound to `index`.
    ///
    /// Returns the stream now on program output.
    ///
    /// # Errors
    ///
    /// - [`SwitchError::UnknownIndex`]: nothing bound; no device call made.
    /// - [`SwitchError::Busy`]: `Reject` policy and a switch is running.
    /// - [`SwitchError::Preview`]: program output untouched.
    /// - [`SwitchError::Program`]: preview updated, program not switched.
    pub async fn switch_to(&self, index: i64) -> Result<StreamDescriptor, SwitchError> {
        let span = info_span!("switch", index, request_id = %Uuid::new_v4());
        self.run_switch(index).instrument(span).await
    }

    /// Spawns [`switch_to`](Self::switch_to) and logs its outcome, so the
    /// caller never waits on device round-trips.
    pub fn dispatch(self: &Arc<Self>, index: i64) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            match controller.switch_to(index).await {
                Ok(_) => {}
                Err(SwitchError::UnknownIndex(e)) => debug!(index, "dropping command: {e}"),
                Err(e @ SwitchError::Busy { .. }) => warn!(index, "dropping command: {e}"),
                // Phase failures were logged with their phase in `run_switch`.
                Err(_) => {}
            }
        })
    }

    /// Current state of every index slot, in index order.
    pub fn snapshot(&self) -> Vec<SlotStatus> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(pos, slot)| {
                let index = TallyIndex::new(u32::try_from(pos + 1).ok()?)?;
                let record = slot.record();
                Some(SlotStatus {
                    index: index.get(),
                    stream_id: self.registry.get(index).map(|s| s.id.clone()),
                    state: record.state,
                    last_error: record.last_error.clone(),
                })
            })
            .collect()
    }

    async fn run_switch(&self, index: i64) -> Result<StreamDescriptor, SwitchError> {
        let (tally, stream) = self.registry.lookup(index)?;
        let stream = stream.clone();
        let Some(slot) = self.slots.get(usize::from(tally.get()) - 1) else {
            return Err(RegistryError::UnknownIndex(index).into());
        };

        let _gate = match self.policy {
            SameIndexPolicy::Queue => {
                let Some(pending) = slot.reserve() else {
                    return Err(SwitchError::Busy { index: tally });
                };
                let gate = slot.gate.lock().await;
                (gate, Some(pending))
            }
            SameIndexPolicy::Reject => match slot.gate.try_lock() {
                Ok(guard) => (guard, None),
                Err(_) => return Err(SwitchError::Busy { index: tally }),
            },
        };

        let mut reauthenticated = false;

        slot.enter(SwitchState::Registering);
        debug!(stream = %stream.id, "staging preview");
        if let Err(source) = self
            .run_phase(SwitchPhase::Preview, &stream, &mut reauthenticated)
            .await
        {
            error!(phase = %SwitchPhase::Preview, stream = %stream.id, error = %source, "switch failed; program output unchanged");
            let err = SwitchError::Preview { index: tally, source };
            slot.fail(&err);
            return Err(err);
        }

        slot.enter(SwitchState::Switching);
        if let Err(source) = self
            .run_phase(SwitchPhase::Program, &stream, &mut reauthenticated)
            .await
        {
            error!(phase = %SwitchPhase::Program, stream = %stream.id, error = %source, "switch failed; preview updated but program not switched");
            let err = SwitchError::Program { index: tally, source };
            slot.fail(&err);
            return Err(err);
        }

        slot.enter(SwitchState::Done);
        *self
            .current_program
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tally);
        info!(stream = %stream.id, name = %stream.name, "program output switched");
        Ok(stream)
    }

    /// One phase.  On credential rejection, re-authenticates and retries,
    /// unless `reauthenticated` says this switch already did.
    async fn run_phase(
        &self,
        phase: SwitchPhase,
        stream: &StreamDescriptor,
        reauthenticated: &mut bool,
    ) -> Result<(), DeviceError> {
        match self.client.apply(phase, stream).await {
            Err(e) if e.is_auth() && !*reauthenticated => {
                *reauthenticated = true;
                warn!(%phase, error = %e, "session rejected; re-authenticating once");
                let session = self.client.session();
                if let Err(auth) = session.acquire().await {
                    session.invalidate();
                    return Err(auth.into());
                }
                self.client.apply(phase, stream).await
            }
            other => other,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
