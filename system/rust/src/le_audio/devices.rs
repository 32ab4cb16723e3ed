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

//! Storage of all known LE Audio devices.
//!
//! Groups never own devices. They keep [`DeviceHandle`]s into this arena; a
//! handle whose device was removed (e.g. on unpairing) simply stops
//! resolving, even if the slot has been reused by another device since.

use log::{debug, info};

use crate::le_audio::device::LeAudioDevice;
use crate::utils::address::RawAddress;

/// Generation checked reference to a device in [`LeAudioDevices`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    device: Option<LeAudioDevice>,
}

#[derive(Default)]
pub struct LeAudioDevices {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl LeAudioDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `device` and returns its handle. Adding an address that is
    /// already known returns the existing handle.
    pub fn add(&mut self, device: LeAudioDevice) -> DeviceHandle {
        if let Some(handle) = self.find_by_address(&device.address) {
            debug!("{} already known", device.address.to_loggable_string());
            return handle;
        }

        info!("adding device {}", device.address.to_loggable_string());
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.device = Some(device);
                DeviceHandle { index, generation: slot.generation }
            }
            None => {
                self.slots.push(Slot { generation: 0, device: Some(device) });
                DeviceHandle { index: self.slots.len() - 1, generation: 0 }
            }
        }
    }

    /// Removes the device, invalidating every handle to it.
    pub fn remove(&mut self, handle: DeviceHandle) -> Option<LeAudioDevice> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let device = slot.device.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        info!("removed device {}", device.address.to_loggable_string());
        Some(device)
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&LeAudioDevice> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.device.as_ref())
    }

    pub fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut LeAudioDevice> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.device.as_mut())
    }

    pub fn is_alive(&self, handle: DeviceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceHandle, &LeAudioDevice)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.device
                .as_ref()
                .map(|device| (DeviceHandle { index, generation: slot.generation }, device))
        })
    }

    pub fn find_by_address(&self, address: &RawAddress) -> Option<DeviceHandle> {
        self.iter().find(|(_, device)| device.address == *address).map(|(handle, _)| handle)
    }

    pub fn find_by_conn_id(&self, conn_id: u16) -> Option<DeviceHandle> {
        self.iter().find(|(_, device)| device.conn_id == conn_id).map(|(handle, _)| handle)
    }

    pub fn size(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn device(last: u8) -> LeAudioDevice {
        LeAudioDevice::new(RawAddress::new([last, 0, 0, 0, 0, 0]))
    }

    #[test]
    fn removed_handle_does_not_resolve_after_slot_reuse() {
        let mut devices = LeAudioDevices::new();
        let first = devices.add(device(1));
        assert!(devices.remove(first).is_some());

        let second = devices.add(device(2));
        assert!(devices.get(first).is_none());
        assert!(devices.remove(first).is_none());
        assert_eq!(devices.get(second).map(|d| d.address.bytes[0]), Some(2));
        assert_eq!(devices.size(), 1);
    }

    #[test]
    fn lookup_by_address_and_conn_id() {
        let mut devices = LeAudioDevices::new();
        let handle = devices.add(device(1));
        devices.get_mut(handle).unwrap().conn_id = 0x0040;
        let _ = devices.add(device(2));

        assert_eq!(devices.find_by_conn_id(0x0040), Some(handle));
        assert_eq!(devices.find_by_address(&RawAddress::new([1, 0, 0, 0, 0, 0])), Some(handle));
        assert_eq!(devices.add(device(1)), handle);
        assert_eq!(devices.size(), 2);
    }
}
