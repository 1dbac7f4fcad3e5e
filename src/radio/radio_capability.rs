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

//! This module defines the RadioCapability trait, the abstraction of the vendor ranging library.

use async_trait::async_trait;

use crate::params::ranging_params::{ComplexChannel, DeviceAddress, LocalRole, RangingParameters};
use crate::radio::error::RadioResult;

/// The local side of the ranging, established once before any session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionScope {
    /// The role the scope was opened for.
    pub local_role: LocalRole,
    /// The address assigned to the local radio.
    pub local_address: DeviceAddress,
    /// The channel the local radio proposes to its peers.
    pub complex_channel: ComplexChannel,
}

/// The token proving the ownership of a negotiated channel.
///
/// The token is neither Clone nor Copy. Exactly one owner holds it, and it is consumed by
/// RadioCapability::release().
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelLock {
    id: u64,
    complex_channel: ComplexChannel,
}

impl ChannelLock {
    /// Create a ChannelLock instance. Only the radio implementation should call this.
    pub fn new(id: u64, complex_channel: ComplexChannel) -> Self {
        Self { id, complex_channel }
    }

    /// The identifier assigned by the radio.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The channel the lock was negotiated for.
    pub fn complex_channel(&self) -> &ComplexChannel {
        &self.complex_channel
    }
}

/// The measurement of one ranging round, as reported by the radio. It isn't validated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurement {
    /// The peer the round was performed with.
    pub peer: DeviceAddress,
    /// The distance in meters.
    pub distance_meters: f32,
    /// The azimuth angle of arrival in degrees.
    pub azimuth: Option<f32>,
    /// The elevation angle of arrival in degrees.
    pub elevation: Option<f32>,
}

/// The trait of the radio capability. The client of this library implements this trait on top of
/// the vendor ranging library and injects it into the library.
///
/// The instance is cloned into each ranging session. A ChannelLock returned by one clone may be
/// used with any other clone.
#[async_trait]
pub trait RadioCapability: 'static + Send + Sync + Clone {
    /// Acquire the local role from the radio, and report the local address and the channel.
    async fn open_session_scope(&mut self, role: LocalRole) -> RadioResult<SessionScope>;

    /// Agree on the channel and the session keys with the peers of |params|.
    async fn negotiate(
        &mut self,
        channel: &ComplexChannel,
        params: &RangingParameters,
    ) -> RadioResult<ChannelLock>;

    /// Perform one ranging round on the negotiated channel.
    async fn range_once(&mut self, lock: &ChannelLock) -> RadioResult<RawMeasurement>;

    /// Give the channel back to the radio.
    async fn release(&mut self, lock: ChannelLock);
}
