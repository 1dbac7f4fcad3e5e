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

//! This module converts the device addresses and the complex channel from and to their fixed-width
//! wire representation. The byte order is little-endian, the same as the peer radio stack.

use log::error;

use crate::error::{Error, Result};
use crate::params::ranging_params::{ComplexChannel, DeviceAddress};
use crate::params::utils::{bytes_to_u16, u16_to_bytes};

/// The length of an encoded short address.
pub const SHORT_ADDRESS_LEN: usize = 2;
/// The length of an encoded complex channel.
pub const COMPLEX_CHANNEL_LEN: usize = 2;
/// The length of an encoded session descriptor.
pub const SESSION_DESCRIPTOR_LEN: usize = SHORT_ADDRESS_LEN + COMPLEX_CHANNEL_LEN;

const DESCRIPTOR_SEPARATOR: char = '/';

/// Encode the address to its 2-byte wire representation.
pub fn encode_address(address: u16) -> Vec<u8> {
    u16_to_bytes(address)
}

/// Decode the address from its 2-byte wire representation.
pub fn decode_address(bytes: &[u8]) -> Result<u16> {
    bytes_to_u16(bytes).ok_or_else(|| {
        error!("The encoded address should have 2 bytes, got {}", bytes.len());
        Error::MalformedAddress
    })
}

/// Encode the complex channel as [channel_number, preamble_index].
pub fn encode_channel(channel: &ComplexChannel) -> Vec<u8> {
    vec![channel.channel_number, channel.preamble_index]
}

/// Decode the complex channel from [channel_number, preamble_index].
pub fn decode_channel(bytes: &[u8]) -> Result<ComplexChannel> {
    match bytes {
        [channel_number, preamble_index] => {
            Ok(ComplexChannel::new(*channel_number, *preamble_index))
        }
        _ => {
            error!("The encoded channel should have 2 bytes, got {}", bytes.len());
            Err(Error::InvalidParameters)
        }
    }
}

/// Parse the decimal text of a peer address.
///
/// Both the unsigned form (0..=65535) and the signed short form (-32768..=-1) are accepted, so the
/// address printed by a peer that formats its address as a signed short can be used as-is.
pub fn parse_address_text(text: &str) -> Result<DeviceAddress> {
    let text = text.trim();
    if let Ok(value) = text.parse::<u16>() {
        return Ok(DeviceAddress::new(value));
    }
    match text.parse::<i16>() {
        Ok(value) => Ok(DeviceAddress::new(value as u16)),
        Err(e) => {
            error!("Failed to parse the address {:?}: {:?}", text, e);
            Err(Error::MalformedAddress)
        }
    }
}

/// The information the controller hands to the controlee out of band, so that the controlee can
/// join the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// The address of the controller.
    pub address: DeviceAddress,
    /// The channel the controller ranges on.
    pub complex_channel: ComplexChannel,
}

/// Format the descriptor as "<address>/<preamble_index>".
pub fn format_descriptor(descriptor: &SessionDescriptor) -> String {
    format!(
        "{}{}{}",
        descriptor.address, DESCRIPTOR_SEPARATOR, descriptor.complex_channel.preamble_index
    )
}

/// Parse the text produced by format_descriptor(). The text doesn't carry the channel number, so
/// the caller provides the one agreed with the controller.
pub fn parse_descriptor(text: &str, channel_number: u8) -> Result<SessionDescriptor> {
    let (address, preamble_index) = text.trim().split_once(DESCRIPTOR_SEPARATOR).ok_or_else(|| {
        error!("The descriptor {:?} doesn't contain the separator", text);
        Error::MalformedAddress
    })?;
    let address = parse_address_text(address)?;
    let preamble_index = preamble_index.trim().parse::<u8>().map_err(|e| {
        error!("Failed to parse the preamble index {:?}: {:?}", preamble_index, e);
        Error::InvalidParameters
    })?;
    Ok(SessionDescriptor {
        address,
        complex_channel: ComplexChannel::new(channel_number, preamble_index),
    })
}

/// Encode the descriptor as the little-endian address followed by the encoded channel.
pub fn encode_descriptor(descriptor: &SessionDescriptor) -> Vec<u8> {
    let mut bytes = encode_address(descriptor.address.value());
    bytes.extend(encode_channel(&descriptor.complex_channel));
    bytes
}

/// Decode the descriptor produced by encode_descriptor().
pub fn decode_descriptor(bytes: &[u8]) -> Result<SessionDescriptor> {
    if bytes.len() != SESSION_DESCRIPTOR_LEN {
        error!("The encoded descriptor should have 4 bytes, got {}", bytes.len());
        return Err(Error::MalformedAddress);
    }
    let (address, channel) = bytes.split_at(SHORT_ADDRESS_LEN);
    Ok(SessionDescriptor {
        address: DeviceAddress::new(decode_address(address)?),
        complex_channel: decode_channel(channel)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        for value in 0..=u16::MAX {
            assert_eq!(decode_address(&encode_address(value)), Ok(value));
        }
    }

    #[test]
    fn test_address_is_little_endian() {
        assert_eq!(encode_address(0x03E9), vec![0xE9, 0x03]);
        assert_eq!(decode_address(&[0xE9, 0x03]), Ok(1001));
    }

    #[test]
    fn test_decode_address_wrong_length() {
        assert_eq!(decode_address(&[]), Err(Error::MalformedAddress));
        assert_eq!(decode_address(&[0x01]), Err(Error::MalformedAddress));
        assert_eq!(decode_address(&[0x01, 0x02, 0x03]), Err(Error::MalformedAddress));
    }

    #[test]
    fn test_parse_address_text() {
        assert_eq!(parse_address_text("1001"), Ok(DeviceAddress::new(1001)));
        assert_eq!(parse_address_text(" 65535\n"), Ok(DeviceAddress::new(0xFFFF)));
        assert_eq!(parse_address_text("-1"), Ok(DeviceAddress::new(0xFFFF)));
        assert_eq!(parse_address_text("-32768"), Ok(DeviceAddress::new(0x8000)));

        assert_eq!(parse_address_text(""), Err(Error::MalformedAddress));
        assert_eq!(parse_address_text("abc"), Err(Error::MalformedAddress));
        assert_eq!(parse_address_text("65536"), Err(Error::MalformedAddress));
        assert_eq!(parse_address_text("-32769"), Err(Error::MalformedAddress));
        assert_eq!(parse_address_text("10.5"), Err(Error::MalformedAddress));
    }

    #[test]
    fn test_channel_codec() {
        let channel = ComplexChannel::new(9, 11);
        assert_eq!(encode_channel(&channel), vec![9, 11]);
        assert_eq!(decode_channel(&[9, 11]), Ok(channel));
        assert_eq!(decode_channel(&[9]), Err(Error::InvalidParameters));
    }

    #[test]
    fn test_descriptor_text() {
        let descriptor = SessionDescriptor {
            address: DeviceAddress::new(1001),
            complex_channel: ComplexChannel::new(9, 10),
        };
        let text = format_descriptor(&descriptor);
        assert_eq!(text, "1001/10");
        assert_eq!(parse_descriptor(&text, 9), Ok(descriptor));

        assert_eq!(parse_descriptor("1001", 9), Err(Error::MalformedAddress));
        assert_eq!(parse_descriptor("x/10", 9), Err(Error::MalformedAddress));
        assert_eq!(parse_descriptor("1001/x", 9), Err(Error::InvalidParameters));
    }

    #[test]
    fn test_descriptor_bytes() {
        let descriptor = SessionDescriptor {
            address: DeviceAddress::new(0x1234),
            complex_channel: ComplexChannel::new(5, 25),
        };
        let bytes = encode_descriptor(&descriptor);
        assert_eq!(bytes, vec![0x34, 0x12, 5, 25]);
        assert_eq!(decode_descriptor(&bytes), Ok(descriptor));
        assert_eq!(decode_descriptor(&bytes[..3]), Err(Error::MalformedAddress));
    }
}
