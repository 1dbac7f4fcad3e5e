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

//! A radio simulated on the host. It lets the library run without the vendor ranging library.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, warn};

use crate::params::ranging_params::{ComplexChannel, DeviceAddress, LocalRole, RangingParameters};
use crate::radio::error::{RadioError, RadioResult};
use crate::radio::radio_capability::{ChannelLock, RadioCapability, RawMeasurement, SessionScope};

const BASE_DISTANCE_METERS: f32 = 2.0;
const DISTANCE_SWING_METERS: f32 = 1.5;
const AZIMUTH_SWING_DEGREES: f32 = 60.0;
const ELEVATION_SWING_DEGREES: f32 = 20.0;
// The phase step of the simulated movement per round, in radians.
const PHASE_STEP: f32 = 0.1;

/// The simulated radio. The peers move back and forth in front of the local radio, and every
/// |failure_period|-th round fails if the period is set.
#[derive(Clone)]
pub struct SimulatedRadio {
    local_address: DeviceAddress,
    complex_channel: ComplexChannel,
    failure_period: Option<u32>,
    state: Arc<Mutex<SimulatedState>>,
}

#[derive(Default)]
struct SimulatedState {
    next_lock_id: u64,
    rounds: u64,
    // The peers of each negotiated channel lock.
    locks: HashMap<u64, Vec<DeviceAddress>>,
}

impl SimulatedRadio {
    /// Create a SimulatedRadio instance that reports |local_address| and |complex_channel| in its
    /// session scope.
    pub fn new(local_address: DeviceAddress, complex_channel: ComplexChannel) -> Self {
        Self {
            local_address,
            complex_channel,
            failure_period: None,
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    /// Fail every |period|-th ranging round. Zero disables the failures.
    pub fn failure_period(mut self, period: u32) -> Self {
        self.failure_period = (period > 0).then_some(period);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RadioCapability for SimulatedRadio {
    async fn open_session_scope(&mut self, role: LocalRole) -> RadioResult<SessionScope> {
        debug!("Open the simulated session scope as {:?}", role);
        Ok(SessionScope {
            local_role: role,
            local_address: self.local_address,
            complex_channel: self.complex_channel,
        })
    }

    async fn negotiate(
        &mut self,
        channel: &ComplexChannel,
        params: &RangingParameters,
    ) -> RadioResult<ChannelLock> {
        if channel != &params.complex_channel {
            warn!("The negotiated channel {:?} mismatches the parameters", channel);
            return Err(RadioError::Rejected);
        }
        if params.peers.is_empty() {
            return Err(RadioError::Rejected);
        }
        let mut state = self.lock_state();
        if state.locks.values().flatten().any(|peer| params.peers.contains(peer)) {
            warn!("The peers {:?} are already locked by another session", params.peers);
            return Err(RadioError::Busy);
        }
        state.next_lock_id += 1;
        let id = state.next_lock_id;
        state.locks.insert(id, params.peers.clone());
        debug!("Negotiated the channel lock {} with {:?}", id, params.peers);
        Ok(ChannelLock::new(id, *channel))
    }

    async fn range_once(&mut self, lock: &ChannelLock) -> RadioResult<RawMeasurement> {
        let mut state = self.lock_state();
        state.rounds += 1;
        let round = state.rounds;
        let peers = state.locks.get(&lock.id()).ok_or(RadioError::LinkFailure)?;
        if let Some(period) = self.failure_period {
            if round % u64::from(period) == 0 {
                return Err(RadioError::LinkFailure);
            }
        }
        // Empty peer lists are rejected at the negotiation.
        let peer = peers[(round % peers.len() as u64) as usize];
        let phase = round as f32 * PHASE_STEP;
        Ok(RawMeasurement {
            peer,
            distance_meters: BASE_DISTANCE_METERS + DISTANCE_SWING_METERS * phase.sin(),
            azimuth: Some(AZIMUTH_SWING_DEGREES * phase.cos()),
            elevation: Some(ELEVATION_SWING_DEGREES * phase.sin()),
        })
    }

    async fn release(&mut self, lock: ChannelLock) {
        if self.lock_state().locks.remove(&lock.id()).is_none() {
            warn!("Release the unknown channel lock {}", lock.id());
        }
    }
}
