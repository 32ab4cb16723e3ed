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

//! Interfaces to collaborators living outside the LE Audio group engine.

use crate::utils::address::RawAddress;

/// Coordinated set membership, as discovered through CSIS.
pub trait CsisClient {
    /// Number of members the set is expected to have, if known.
    fn get_desired_size(&self, group_id: i32) -> Option<usize>;
}

/// Local controller capabilities.
pub trait ControllerInterface {
    fn supports_ble_2m_phy(&self) -> bool;
}

/// How a GATT connection attempt is made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BleConnectionType {
    Direct,
    BackgroundAllowList,
    TargetedAnnouncements,
}

/// GATT client connection control and autoconnect persistence.
pub trait GattConnector {
    fn open(&mut self, gatt_if: u8, address: RawAddress, connection_type: BleConnectionType);
    fn cancel_open(&mut self, gatt_if: u8, address: RawAddress);
    fn set_autoconnect(&mut self, address: RawAddress, autoconnect: bool);
}
