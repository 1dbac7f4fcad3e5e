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

use crate::error::Error;
use crate::params::ranging_params::DeviceAddress;
use crate::session::session_registry::{SessionHandle, SessionState};

/// The result of the ranging with one peer.
#[derive(Debug, Clone, PartialEq)]
pub enum RangingResult {
    /// The validated measurement of a successful round.
    Position {
        /// The peer the round was performed with.
        peer: DeviceAddress,
        /// The distance in meters.
        distance_meters: f32,
        /// The azimuth angle of arrival in degrees, if the configuration reports it.
        azimuth: Option<f32>,
        /// The elevation angle of arrival in degrees, if the configuration reports it.
        elevation: Option<f32>,
    },
    /// Too many rounds with the peer failed in a row.
    PeerLost {
        /// The lost peer.
        peer: DeviceAddress,
    },
}

/// Why the session changed its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateReason {
    /// The worker of the session started the negotiation.
    Started,
    /// The first round succeeded.
    Negotiated,
    /// A round succeeded within the grace period of a lost session.
    Recovered,
    /// Too many rounds failed in a row.
    PeerLost,
    /// The owner of the session stopped it.
    StopRequested,
    /// The negotiation didn't complete in time.
    NegotiationTimeout,
    /// The radio failed the negotiation, or the session couldn't be driven anymore.
    RadioFailure,
    /// The lost session didn't recover within the grace period.
    GracePeriodExpired,
}

/// The event delivered by the EventBus.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to |state|.
    StateChanged {
        /// The session.
        handle: SessionHandle,
        /// The new state.
        state: SessionState,
        /// Why the state changed.
        reason: StateReason,
    },
    /// The session produced a ranging result.
    Ranging {
        /// The session.
        handle: SessionHandle,
        /// The result.
        result: RangingResult,
    },
    /// The session hit a runtime error. The error doesn't end the session by itself; a
    /// StateChanged event follows if it does.
    Error {
        /// The session.
        handle: SessionHandle,
        /// The error.
        error: Error,
    },
    /// The subscriber didn't keep up, and the oldest unread events were dropped.
    Overflow {
        /// The number of the dropped events.
        dropped: usize,
    },
}

impl SessionEvent {
    /// The session the event belongs to. Overflow belongs to the subscription, not a session.
    pub fn handle(&self) -> Option<SessionHandle> {
        match self {
            Self::StateChanged { handle, .. } | Self::Ranging { handle, .. } => Some(*handle),
            Self::Error { handle, .. } => Some(*handle),
            Self::Overflow { .. } => None,
        }
    }

    /// Whether the event ends the session.
    pub fn is_session_end(&self) -> bool {
        matches!(self, Self::StateChanged { state: SessionState::Stopped, .. })
    }
}
