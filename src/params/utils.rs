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

use std::convert::TryInto;

use log::error;

pub fn u16_to_bytes(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn bytes_to_u16(value: &[u8]) -> Option<u16> {
    Some(u16::from_le_bytes(value.try_into().ok()?))
}

pub fn validate(value: bool, err_msg: &str) -> Option<()> {
    match value {
        true => Some(()),
        false => {
            error!("{}", err_msg);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_u16_bytes() {
        let value: u16 = 0x1357;
        let arr = u16_to_bytes(value);

        assert_eq!(arr, vec![0x57, 0x13]);
        assert_eq!(bytes_to_u16(&arr), Some(value));
    }

    #[test]
    fn test_bytes_to_u16_wrong_length() {
        assert_eq!(bytes_to_u16(&[0x57]), None);
        assert_eq!(bytes_to_u16(&[0x57, 0x13, 0x00]), None);
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(true, "unused"), Some(()));
        assert_eq!(validate(false, "expected failure"), None);
    }
}
