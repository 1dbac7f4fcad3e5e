// Copyright 2022, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::params::ranging_params::{DeviceAddress, LocalRole, RangingParameters};

/// The opaque identifier of a session, assigned by the SessionRegistry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// The numeric value of the handle.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionHandle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state of a ranging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, the worker hasn't started yet.
    Idle,
    /// Agreeing on the channel with the peers, until the first successful round.
    Negotiating,
    /// Ranging.
    Active,
    /// Too many rounds failed in a row. The session recovers if a round succeeds in the grace
    /// period.
    Lost,
    /// Terminal.
    Stopped,
}

impl SessionState {
    /// Whether the state has no way out.
    pub fn is_terminal(&self) -> bool {
        *self == Self::Stopped
    }

    /// Whether |to| is reachable from this state in one step.
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Negotiating)
                | (Idle, Stopped)
                | (Negotiating, Active)
                | (Negotiating, Stopped)
                | (Active, Lost)
                | (Active, Stopped)
                | (Lost, Active)
                | (Lost, Stopped)
        )
    }
}

/// The snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The role of the local radio.
    pub local_role: LocalRole,
    /// The address of the local radio.
    pub local_address: DeviceAddress,
    /// The validated parameters.
    pub parameters: RangingParameters,
    /// The state when the snapshot was taken.
    pub state: SessionState,
    /// When the session was created.
    pub created_at: Instant,
    /// How many measurements have been discarded as malformed.
    pub discarded_measurements: u64,
}

/// The registry of the ranging sessions. It is the single owner of the Session instances; the
/// other components only hold the handles and read the snapshots.
///
/// The registry is shared by cloning it. All the clones see the same sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    last_handle: u64,
    sessions: BTreeMap<SessionHandle, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a session in the Idle state.
    ///
    /// Fails with InvalidParameters if |parameters| doesn't pass the validation, or with
    /// SessionConflict if a session with the same role that isn't stopped already ranges with one
    /// of the peers.
    pub fn create(
        &self,
        local_role: LocalRole,
        local_address: DeviceAddress,
        parameters: RangingParameters,
    ) -> Result<SessionHandle> {
        parameters.validate()?;

        // The conflict check and the insertion are done under the same lock, so two concurrent
        // creations can't both claim the same peer.
        let mut inner = self.lock_inner();
        if let Some((handle, _)) = inner.sessions.iter().find(|(_, session)| {
            session.local_role == local_role
                && !session.state.is_terminal()
                && session.parameters.shares_peer_with(&parameters)
        }) {
            warn!("The peers {:?} are already used by the session {}", parameters.peers, handle);
            return Err(Error::SessionConflict);
        }

        inner.last_handle += 1;
        let handle = SessionHandle(inner.last_handle);
        debug!("Create the session {} as {:?} with {:?}", handle, local_role, parameters);
        inner.sessions.insert(
            handle,
            Session {
                local_role,
                local_address,
                parameters,
                state: SessionState::Idle,
                created_at: Instant::now(),
                discarded_measurements: 0,
            },
        );
        Ok(handle)
    }

    /// Get the snapshot of the session.
    pub fn get(&self, handle: SessionHandle) -> Result<Session> {
        self.lock_inner().sessions.get(&handle).cloned().ok_or(Error::NotFound(handle))
    }

    /// The handles of the registered sessions, in the creation order.
    #[cfg(test)]
    pub(crate) fn handles(&self) -> Vec<SessionHandle> {
        self.lock_inner().sessions.keys().copied().collect()
    }

    /// The number of the registered sessions.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock_inner().sessions.len()
    }

    /// Whether no session is registered.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lock_inner().sessions.is_empty()
    }

    /// Move the session to |to|, and return the previous state.
    pub(crate) fn transition(
        &self,
        handle: SessionHandle,
        to: SessionState,
    ) -> Result<SessionState> {
        let mut inner = self.lock_inner();
        let session = inner.sessions.get_mut(&handle).ok_or(Error::NotFound(handle))?;
        let from = session.state;
        if !from.can_transition_to(to) {
            error!("Session {}: illegal transition from {:?} to {:?}", handle, from, to);
            return Err(Error::IllegalTransition { from, to });
        }
        debug!("Session {}: {:?} -> {:?}", handle, from, to);
        session.state = to;
        Ok(from)
    }

    /// Remove the session. Removing an absent session is a no-op.
    pub(crate) fn remove(&self, handle: SessionHandle) {
        if self.lock_inner().sessions.remove(&handle).is_some() {
            debug!("Remove the session {}", handle);
        }
    }

    /// Count one discarded measurement of the session.
    pub(crate) fn record_discarded(&self, handle: SessionHandle) {
        if let Some(session) = self.lock_inner().sessions.get_mut(&handle) {
            session.discarded_measurements += 1;
        }
    }

    // The registry never leaves the sessions half-updated, so a poisoned lock is still usable.
    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
