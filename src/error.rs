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

//! This module defines the error type and the result type for this library.

use crate::radio::error::RadioError;
use crate::session::session_registry::{SessionHandle, SessionState};

/// The error type for the uwb_ranging library.
#[non_exhaustive] // Adding new enum fields doesn't break the downstream build.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The device address can't be parsed or decoded.
    #[error("Malformed device address")]
    MalformedAddress,
    /// The ranging parameters are rejected by the validation.
    #[error("Invalid ranging parameters")]
    InvalidParameters,
    /// Another session with the same role already ranges with the peer.
    #[error("A session with the same role and peer already exists")]
    SessionConflict,
    /// The requested state transition is not an edge of the session state machine.
    #[error("Illegal session transition from {from:?} to {to:?}")]
    IllegalTransition {
        /// The current state of the session.
        from: SessionState,
        /// The requested state.
        to: SessionState,
    },
    /// The session is not found in the registry.
    #[error("Session {0:?} is not found")]
    NotFound(SessionHandle),
    /// The session scope is not established yet.
    #[error("The session scope is not initialized")]
    NotInitialized,
    /// The peer didn't complete the channel negotiation in time.
    #[error("The channel negotiation timed out")]
    NegotiationTimeout,
    /// A measurement from the radio is malformed and has been dropped.
    #[error("The measurement has been discarded")]
    MeasurementDiscarded,
    /// The radio capability reported an error.
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),
    /// The internal channel between the components is closed.
    #[error("The internal task is not reachable")]
    TokioFailure,
}

/// The result type for the uwb_ranging library.
///
/// This type is broadly used by the methods in this library which may produce an error.
pub type Result<T> = std::result::Result<T, Error>;
