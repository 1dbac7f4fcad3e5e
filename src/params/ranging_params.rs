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

//! This module defines the parameters of a peer ranging session.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use num_derive::FromPrimitive;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::params::utils::validate;
use crate::utils::consuming_builder_field;

/// The type of the session identifier.
pub type SessionId = u32;
/// The type of the sub-session identifier.
pub type SubSessionId = u32;

/// The valid lengths of the session key. An empty key selects the static STS.
const VALID_SESSION_KEY_LENS: [usize; 2] = [0, 8];
/// The maximum number of peers of one session.
const MAX_PEER_COUNT: usize = 8;
/// The UWB channels the radio is able to use.
const VALID_CHANNEL_NUMBERS: [u8; 8] = [5, 6, 8, 9, 10, 12, 13, 14];

const AUTOMATIC_UPDATE_INTERVAL_MS: u64 = 200;
const FREQUENT_UPDATE_INTERVAL_MS: u64 = 100;
const INFREQUENT_UPDATE_INTERVAL_MS: u64 = 1000;

/// The 16-bit short address of a radio. It is unique per radio on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress(u16);

impl DeviceAddress {
    /// Create a DeviceAddress instance.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// The numeric value of the address.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl From<u16> for DeviceAddress {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<DeviceAddress> for u16 {
    fn from(item: DeviceAddress) -> u16 {
        item.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The radio configuration both peers must share for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComplexChannel {
    /// The UWB channel number.
    pub channel_number: u8,
    /// The preamble code index.
    pub preamble_index: u8,
}

impl ComplexChannel {
    /// Create a ComplexChannel instance.
    pub fn new(channel_number: u8, preamble_index: u8) -> Self {
        Self { channel_number, preamble_index }
    }

    fn is_valid(&self) -> Option<()> {
        validate(
            VALID_CHANNEL_NUMBERS.contains(&self.channel_number),
            "channel_number should be one of 5, 6, 8, 9, 10, 12, 13, 14",
        )?;
        validate(
            (9..=12).contains(&self.preamble_index) || (25..=32).contains(&self.preamble_index),
            "preamble_index should be between 9 to 12 (BPRF) or 25 to 32 (HPRF)",
        )
    }
}

/// The role of the local radio in a ranging session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum LocalRole {
    /// Controlee
    Controlee = 0,
    /// Controller, which initiates the session and distributes the channel parameters.
    Controller = 1,
}

/// The ranging configuration, i.e. the ranging method and the node mode of the session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ConfigId {
    /// Unicast DS-TWR.
    UnicastDsTwr = 1,
    /// Multicast DS-TWR.
    MulticastDsTwr = 2,
    /// Unicast DS-TWR without angle of arrival.
    UnicastDsTwrNoAoa = 3,
    /// Unicast DS-TWR with provisioned STS.
    ProvisionedUnicastDsTwr = 4,
    /// Multicast DS-TWR with provisioned STS.
    ProvisionedMulticastDsTwr = 5,
    /// Unicast DS-TWR with provisioned STS, without angle of arrival.
    ProvisionedUnicastDsTwrNoAoa = 6,
    /// Multicast DS-TWR with provisioned individual keys.
    ProvisionedIndividualMulticastDsTwr = 7,
}

impl ConfigId {
    /// Whether the configuration ranges with exactly one peer.
    pub fn is_unicast(&self) -> bool {
        matches!(
            self,
            Self::UnicastDsTwr
                | Self::UnicastDsTwrNoAoa
                | Self::ProvisionedUnicastDsTwr
                | Self::ProvisionedUnicastDsTwrNoAoa
        )
    }

    /// Whether the radio reports the angle of arrival under this configuration.
    pub fn reports_angle(&self) -> bool {
        !matches!(self, Self::UnicastDsTwrNoAoa | Self::ProvisionedUnicastDsTwrNoAoa)
    }
}

/// How often the ranging rounds are scheduled.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum UpdateRate {
    /// Let the session pick its rate.
    Automatic = 1,
    /// Range as often as possible.
    Frequent = 2,
    /// Range rarely, to save power.
    Infrequent = 3,
}

impl UpdateRate {
    /// The interval between two ranging rounds.
    pub fn interval(&self) -> Duration {
        match self {
            Self::Automatic => Duration::from_millis(AUTOMATIC_UPDATE_INTERVAL_MS),
            Self::Frequent => Duration::from_millis(FREQUENT_UPDATE_INTERVAL_MS),
            Self::Infrequent => Duration::from_millis(INFREQUENT_UPDATE_INTERVAL_MS),
        }
    }
}

/// The parameters of a ranging session. They are validated when the session is created and
/// immutable afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct RangingParameters {
    /// The ranging configuration.
    pub config_id: ConfigId,
    /// The session identifier shared with the peers.
    pub session_id: SessionId,
    /// The sub-session identifier.
    pub sub_session_id: SubSessionId,
    /// The session key. Either empty or 8 bytes.
    pub session_key: Vec<u8>,
    /// The channel both sides range on.
    pub complex_channel: ComplexChannel,
    /// The peers, in the order given by the caller. Each address appears once.
    pub peers: Vec<DeviceAddress>,
    /// How often the rounds are scheduled.
    pub update_rate: UpdateRate,
}

/// Explicitly implement Debug trait to prevent logging the session key.
impl fmt::Debug for RangingParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        static REDACTED_STR: &str = "redacted";

        f.debug_struct("RangingParameters")
            .field("config_id", &self.config_id)
            .field("session_id", &self.session_id)
            .field("sub_session_id", &self.sub_session_id)
            .field("session_key", &REDACTED_STR) // session_key field is a secret.
            .field("complex_channel", &self.complex_channel)
            .field("peers", &self.peers)
            .field("update_rate", &self.update_rate)
            .finish()
    }
}

impl Drop for RangingParameters {
    fn drop(&mut self) {
        self.session_key.zeroize();
    }
}

impl RangingParameters {
    /// Validate the parameters, returning InvalidParameters when any check fails. The reason is
    /// logged.
    pub fn validate(&self) -> Result<()> {
        self.is_valid().ok_or(Error::InvalidParameters)
    }

    /// Whether the two parameters range with at least one common peer.
    pub fn shares_peer_with(&self, other: &Self) -> bool {
        self.peers.iter().any(|peer| other.peers.contains(peer))
    }

    fn is_valid(&self) -> Option<()> {
        validate(
            VALID_SESSION_KEY_LENS.contains(&self.session_key.len()),
            "The length of session_key should be 0 or 8",
        )?;
        validate(!self.peers.is_empty(), "peers should not be empty")?;
        validate(
            self.peers.len() <= MAX_PEER_COUNT,
            "The number of peers should be less than or equal to 8",
        )?;
        validate(
            self.peers.iter().collect::<HashSet<_>>().len() == self.peers.len(),
            "peers should not contain duplicated addresses",
        )?;
        if self.config_id.is_unicast() {
            validate(self.peers.len() == 1, "Unicast config should have exactly one peer")?;
        }
        self.complex_channel.is_valid()
    }
}

const DEFAULT_SESSION_ID: SessionId = 12345;
const DEFAULT_SUB_SESSION_ID: SubSessionId = 0;
const DEFAULT_SESSION_KEY_LEN: usize = 8;

/// The parameters used when the caller only provides the peer address. The channel comes from the
/// session scope.
#[derive(Clone, PartialEq, Eq)]
pub struct RangingDefaults {
    config_id: ConfigId,
    session_id: SessionId,
    sub_session_id: SubSessionId,
    session_key: Vec<u8>,
    update_rate: UpdateRate,
}

impl Default for RangingDefaults {
    fn default() -> Self {
        Self {
            config_id: ConfigId::MulticastDsTwr,
            session_id: DEFAULT_SESSION_ID,
            sub_session_id: DEFAULT_SUB_SESSION_ID,
            session_key: vec![0; DEFAULT_SESSION_KEY_LEN],
            update_rate: UpdateRate::Automatic,
        }
    }
}

impl fmt::Debug for RangingDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangingDefaults")
            .field("config_id", &self.config_id)
            .field("session_id", &self.session_id)
            .field("sub_session_id", &self.sub_session_id)
            .field("session_key", &"redacted")
            .field("update_rate", &self.update_rate)
            .finish()
    }
}

impl Drop for RangingDefaults {
    fn drop(&mut self) {
        self.session_key.zeroize();
    }
}

impl RangingDefaults {
    consuming_builder_field!(config_id, ConfigId);
    consuming_builder_field!(session_id, SessionId);
    consuming_builder_field!(sub_session_id, SubSessionId);
    consuming_builder_field!(session_key, Vec<u8>);
    consuming_builder_field!(update_rate, UpdateRate);

    /// Fill in the parameters of a session ranging with |peer| on |complex_channel|.
    pub fn build_params(
        &self,
        complex_channel: ComplexChannel,
        peer: DeviceAddress,
    ) -> RangingParameters {
        RangingParameters {
            config_id: self.config_id,
            session_id: self.session_id,
            sub_session_id: self.sub_session_id,
            session_key: self.session_key.clone(),
            complex_channel,
            peers: vec![peer],
            update_rate: self.update_rate,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    pub(crate) fn generate_params(peers: Vec<u16>) -> RangingParameters {
        RangingParameters {
            config_id: ConfigId::MulticastDsTwr,
            session_id: 12345,
            sub_session_id: 0,
            session_key: vec![0; 8],
            complex_channel: ComplexChannel::new(9, 10),
            peers: peers.into_iter().map(DeviceAddress::new).collect(),
            update_rate: UpdateRate::Automatic,
        }
    }
}
