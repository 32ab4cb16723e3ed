// Copyright 2024, The Android Open Source Project
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

//! Bluetooth device address.

use std::fmt;

/// A Bluetooth address, stored little-endian as it comes off the wire.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Default)]
pub struct RawAddress {
    pub bytes: [u8; 6],
}

/// The all-zero address, used where no device is bound.
pub const EMPTY_ADDRESS: RawAddress = RawAddress { bytes: [0x00; 6] };

impl RawAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn is_empty(&self) -> bool {
        *self == EMPTY_ADDRESS
    }

    /// Address form that is safe to put in logs: only the two least
    /// significant octets are printed.
    pub fn to_loggable_string(&self) -> String {
        format!("xx:xx:xx:xx:{:02X}:{:02X}", self.bytes[1], self.bytes[0])
    }
}

impl fmt::Display for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl From<[u8; 6]> for RawAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_most_significant_first() {
        let addr = RawAddress::new([0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(addr.to_string(), "01:02:03:04:05:06");
        assert_eq!(addr.to_loggable_string(), "xx:xx:xx:xx:05:06");
        assert!(!addr.is_empty());
        assert!(EMPTY_ADDRESS.is_empty());
    }
}
