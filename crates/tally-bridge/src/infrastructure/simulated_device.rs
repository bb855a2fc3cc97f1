//! In-memory stand-in for the video switcher.
//!
//! [`SimulatedDevice`] implements [`DeviceApi`] without any network access.
//! It issues tokens, remembers which stream sits in preview and which in
//! program, and records every call it receives.  The binary uses it for
//! `--simulate` rehearsals of a control surface; tests use it to inject
//! failures, expire sessions, and observe call ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{SourceGroup, StreamDescriptor};

use crate::application::device::{AuthError, Credential, DeviceApi, DeviceError, DeviceIdentity};

/// Which device operation a [`DeviceCall`] was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Login,
    ListSourceGroups,
    SetPreview,
    SetProgram,
}

/// One recorded call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCall {
    pub kind: CallKind,
    /// Stream id for the two mutation calls.
    pub stream_id: Option<String>,
}

#[derive(Default)]
struct SimulatedState {
    issued_tokens: u32,
    valid_token: Option<String>,
    reject_logins: bool,
    preview: Option<String>,
    program: Option<String>,
    calls: Vec<DeviceCall>,
    faults: VecDeque<(CallKind, DeviceError)>,
    in_flight: usize,
    peak_in_flight: usize,
    mutating: HashMap<String, usize>,
    same_stream_overlaps: usize,
}

/// A switcher that lives entirely in memory.
pub struct SimulatedDevice {
    groups: Vec<SourceGroup>,
    latency: Duration,
    state: Mutex<SimulatedState>,
}

impl SimulatedDevice {
    pub fn new(groups: Vec<SourceGroup>) -> Self {
        Self {
            groups,
            latency: Duration::ZERO,
            state: Mutex::new(SimulatedState::default()),
        }
    }

    /// A single group of `count` enabled streams named `Input 1`..`Input N`.
    pub fn with_demo_sources(count: usize) -> Self {
        let streams = (1..=count)
            .map(|n| {
                StreamDescriptor::new(
                    format!("sim-{n}"),
                    format!("Input {n}"),
                    format!("rtsp://simulated/{n}"),
                    true,
                )
            })
            .collect();
        Self::new(vec![SourceGroup::new(streams)])
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// While set, every login answers `AuthError::Rejected { status: 401 }`.
    pub fn reject_logins(&self, reject: bool) {
        self.lock().reject_logins = reject;
    }

    /// Queues a one-shot failure for the next call of `kind`.
    pub fn fail_next(&self, kind: CallKind, error: DeviceError) {
        self.lock().faults.push_back((kind, error));
    }

    /// Forgets the issued token, as a device does when a session expires.
    pub fn expire_session(&self) {
        self.lock().valid_token = None;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of `kind` received so far.
    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind == kind).count()
    }

    /// Stream id currently in preview.
    pub fn preview(&self) -> Option<String> {
        self.lock().preview.clone()
    }

    /// Stream id currently on program output.
    pub fn program(&self) -> Option<String> {
        self.lock().program.clone()
    }

    /// Highest number of calls that were in flight at the same moment.
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak_in_flight
    }

    /// How often a mutation for a stream started while another mutation
    /// for the same stream was still in flight.
    pub fn same_stream_overlaps(&self) -> usize {
        self.lock().same_stream_overlaps
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and marks it in flight until the guard drops, so a
    /// caller that times out and abandons the future is still accounted for.
    fn begin<'a>(&'a self, kind: CallKind, stream_id: Option<&'a str>) -> InFlight<'a> {
        let mut state = self.lock();
        state.calls.push(DeviceCall {
            kind,
            stream_id: stream_id.map(str::to_string),
        });
        state.in_flight += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        if let Some(id) = stream_id {
            let active = state.mutating.entry(id.to_string()).or_insert(0);
            *active += 1;
            if *active > 1 {
                state.same_stream_overlaps += 1;
            }
        }
        InFlight {
            device: self,
            stream_id,
        }
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Pops the first queued fault for `kind`, if any.
    fn take_fault(state: &mut SimulatedState, kind: CallKind) -> Option<DeviceError> {
        let pos = state.faults.iter().position(|(k, _)| *k == kind)?;
        state.faults.remove(pos).map(|(_, e)| e)
    }

    fn authorize(state: &SimulatedState, credential: &Credential) -> Result<(), DeviceError> {
        match &state.valid_token {
            Some(token) if token == credential.expose() => Ok(()),
            _ => Err(AuthError::Rejected { status: 401 }.into()),
        }
    }

    async fn mutate(
        &self,
        kind: CallKind,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError> {
        let _call = self.begin(kind, Some(stream.id.as_str()));
        self.pause().await;

        let mut state = self.lock();
        Self::authorize(&state, credential)?;
        if let Some(err) = Self::take_fault(&mut state, kind) {
            return Err(err);
        }
        let target = match kind {
            CallKind::SetProgram => &mut state.program,
            _ => &mut state.preview,
        };
        *target = Some(stream.id.clone());
        Ok(())
    }
}

struct InFlight<'a> {
    device: &'a SimulatedDevice,
    stream_id: Option<&'a str>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.device.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if let Some(active) = self.stream_id.and_then(|id| state.mutating.get_mut(id)) {
            *active = active.saturating_sub(1);
        }
    }
}

#[async_trait]
impl DeviceApi for SimulatedDevice {
    async fn login(&self, _identity: &DeviceIdentity) -> Result<Credential, AuthError> {
        let _call = self.begin(CallKind::Login, None);
        self.pause().await;

        let mut state = self.lock();
        match Self::take_fault(&mut state, CallKind::Login) {
            Some(DeviceError::Auth(err)) => Err(err),
            Some(other) => Err(AuthError::Transport(other.to_string())),
            None if state.reject_logins => Err(AuthError::Rejected { status: 401 }),
            None => {
                state.issued_tokens += 1;
                let token = format!("sim-token-{}", state.issued_tokens);
                state.valid_token = Some(token.clone());
                Ok(Credential::new(token))
            }
        }
    }

    async fn list_source_groups(
        &self,
        credential: &Credential,
    ) -> Result<Vec<SourceGroup>, DeviceError> {
        let _call = self.begin(CallKind::ListSourceGroups, None);
        self.pause().await;

        let mut state = self.lock();
        Self::authorize(&state, credential)?;
        match Self::take_fault(&mut state, CallKind::ListSourceGroups) {
            Some(err) => Err(err),
            None => Ok(self.groups.clone()),
        }
    }

    async fn set_preview(
        &self,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError> {
        self.mutate(CallKind::SetPreview, credential, stream).await
    }

    async fn set_program(
        &self,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError> {
        self.mutate(CallKind::SetProgram, credential, stream).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
