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

//! Worst case aggregation of the QoS parameters of the active members.

use log::{debug, error, info, warn};

use super::LeAudioDeviceGroup;
use crate::le_audio::device::Ase;
use crate::le_audio::devices::LeAudioDevices;
use crate::le_audio::interfaces::ControllerInterface;
use crate::le_audio::types::{
    Direction, FRAMING_UNFRAMED_PDU_UNSUPPORTED, ISO_CIG_FRAMING_FRAMED, ISO_CIG_FRAMING_UNFRAMED,
    ISO_CIG_PACKING_SEQUENTIAL, ISO_CIG_PHY_1M, ISO_CIG_PHY_2M, ISO_SCA_0_TO_20_PPM,
    MAX_TRANSPORT_LATENCY_MAX, MAX_TRANSPORT_LATENCY_MIN, PRES_DELAY_NO_PREFERENCE, SCA_UNKNOWN,
    TARGET_PHY_1M, TARGET_PHY_2M,
};

/// Remote delay reported when no presentation delay can be agreed on.
const FALLBACK_REMOTE_DELAY_MS: u16 = 100;

impl LeAudioDeviceGroup {
    /// SDU interval of the first active ASE in `direction`, or 0.
    pub fn get_sdu_interval(&self, devices: &LeAudioDevices, direction: Direction) -> u32 {
        self.active_members(devices)
            .find_map(|(_, device)| device.active_ases(direction).next())
            .map_or(0, |ase| ase.qos_config.sdu_interval)
    }

    /// Worst sleep clock accuracy of all members. Any member with an unknown
    /// or zero SCA makes the whole group report 0.
    pub fn get_sca(&self, devices: &LeAudioDevices) -> u8 {
        let mut sca = ISO_SCA_0_TO_20_PPM;
        for (_, device) in self.members(devices) {
            if device.sca == SCA_UNKNOWN || device.sca == 0 {
                return 0;
            }
            sca = sca.min(device.sca);
        }
        sca
    }

    pub fn get_packing(&self) -> u8 {
        match &self.stream_conf.conf {
            Some(conf) => conf.packing,
            None => {
                error!("group {}: no stream configuration has been set", self.group_id);
                ISO_CIG_PACKING_SEQUENTIAL
            }
        }
    }

    /// Framed as soon as one active ASE cannot do unframed PDUs.
    pub fn get_framing(&self, devices: &LeAudioDevices) -> u8 {
        let framed = self.active_members(devices).any(|(_, device)| {
            device.ases.iter().filter(|ase| ase.active).any(|ase| {
                ase.qos_preferences.supported_framing == FRAMING_UNFRAMED_PDU_UNSUPPORTED
            })
        });
        if framed {
            ISO_CIG_FRAMING_FRAMED
        } else {
            ISO_CIG_FRAMING_UNFRAMED
        }
    }

    fn find_max_transport_latency(&self, devices: &LeAudioDevices, direction: Direction) -> u16 {
        let mut max_transport_latency = 0u16;
        for (_, device) in self.active_members(devices) {
            for ase in device.active_ases(direction) {
                let latency = ase.qos_config.max_transport_latency;
                if max_transport_latency == 0 {
                    max_transport_latency = latency;
                } else if latency < max_transport_latency {
                    if latency != 0 {
                        max_transport_latency = latency;
                    } else {
                        warn!("Trying to set latency back to 0, ASE id {}", ase.id);
                    }
                }
            }
        }
        max_transport_latency.clamp(MAX_TRANSPORT_LATENCY_MIN, MAX_TRANSPORT_LATENCY_MAX)
    }

    /// Slave to master max transport latency in ms.
    pub fn get_max_transport_latency_stom(&self, devices: &LeAudioDevices) -> u16 {
        self.find_max_transport_latency(devices, Direction::Source)
    }

    /// Master to slave max transport latency in ms.
    pub fn get_max_transport_latency_mtos(&self, devices: &LeAudioDevices) -> u16 {
        self.find_max_transport_latency(devices, Direction::Sink)
    }

    pub fn get_transport_latency_us(&self, direction: Direction) -> u32 {
        *self.transport_latency_us.get(direction)
    }

    /// Records the transport latency the controller reported. The first
    /// value sticks until the group is torn down.
    pub fn set_transport_latency(&mut self, direction: Direction, new_transport_latency_us: u32) {
        let transport_latency_us = self.transport_latency_us.get_mut(direction);
        if *transport_latency_us == new_transport_latency_us {
            return;
        }

        if *transport_latency_us != 0 {
            warn!(
                "Different transport latency for group: old: {} [us], new: {} [us]",
                *transport_latency_us, new_transport_latency_us
            );
            return;
        }

        info!(
            "updated group {} transport latency: {} [us]",
            self.group_id, new_transport_latency_us
        );
        *transport_latency_us = new_transport_latency_us;
    }

    fn find_ase_by_cis_id<'a>(
        &self,
        devices: &'a LeAudioDevices,
        direction: Direction,
        cis_id: u8,
    ) -> Option<&'a Ase> {
        self.devices.iter().filter_map(|&handle| devices.get(handle)).find_map(|device| {
            if !device.have_active_ase() {
                return None;
            }
            let idx = (*device.get_ases_by_cis_id(cis_id).get(direction))?;
            device.ases.get(idx)
        })
    }

    /// Retransmission number of the ASE in `direction` using CIS `cis_id`.
    pub fn get_rtn(&self, devices: &LeAudioDevices, direction: Direction, cis_id: u8) -> u8 {
        self.find_ase_by_cis_id(devices, direction, cis_id)
            .map_or(0, |ase| ase.qos_config.retrans_nb)
    }

    pub fn get_max_sdu_size(
        &self,
        devices: &LeAudioDevices,
        direction: Direction,
        cis_id: u8,
    ) -> u16 {
        self.find_ase_by_cis_id(devices, direction, cis_id)
            .map_or(0, |ase| ase.qos_config.max_sdu_size)
    }

    /// PHYs usable in `direction`: the local ones, narrowed by each active
    /// member and by each active ASE preference that still leaves a common
    /// PHY.
    pub fn get_phy_bitmask(
        &self,
        devices: &LeAudioDevices,
        controller: &dyn ControllerInterface,
        direction: Direction,
    ) -> u8 {
        let mut phy_bitfield = ISO_CIG_PHY_1M;
        if controller.supports_ble_2m_phy() {
            phy_bitfield |= ISO_CIG_PHY_2M;
        }

        if self.get_first_active_device(devices).is_none() {
            error!("group {}: no active device for {direction}", self.group_id);
            return phy_bitfield;
        }

        for (_, device) in self.active_members(devices) {
            for ase in device.active_ases(direction) {
                phy_bitfield &= device.get_phy_bitmask();

                // 0x00 means no preference
                let preferred = ase.qos_preferences.preferred_phy;
                if preferred != 0 && phy_bitfield & preferred != 0 {
                    phy_bitfield &= preferred;
                    debug!("Using ASE preferred phy {phy_bitfield:#04x}");
                } else {
                    warn!(
                        "ASE preferred {preferred:#04x} has nothing common with phy_bitfield \
                         {phy_bitfield:#04x}"
                    );
                }
            }
        }
        phy_bitfield
    }

    /// 2M when possible, then 1M, else 0.
    pub fn get_target_phy(
        &self,
        devices: &LeAudioDevices,
        controller: &dyn ControllerInterface,
        direction: Direction,
    ) -> u8 {
        let phy_bitfield = self.get_phy_bitmask(devices, controller, direction);
        if phy_bitfield & ISO_CIG_PHY_2M != 0 {
            TARGET_PHY_2M
        } else if phy_bitfield & ISO_CIG_PHY_1M != 0 {
            TARGET_PHY_1M
        } else {
            0
        }
    }

    /// Presentation delay in us every active ASE in `direction` accepts.
    ///
    /// The windows of all ASEs are intersected. The highest preferred
    /// minimum is used when it lies strictly inside the intersection,
    /// otherwise the intersection minimum. `None` without an active device
    /// or when the windows do not overlap.
    pub fn get_presentation_delay(
        &self,
        devices: &LeAudioDevices,
        direction: Direction,
    ) -> Option<u32> {
        if self.get_first_active_device(devices).is_none() {
            error!("group {}: no active device", self.group_id);
            return None;
        }

        let mut delay_min = 0u32;
        let mut delay_max = u32::MAX;
        let mut preferred_delay_min = delay_min;
        let mut preferred_delay_max = delay_max;

        for (_, device) in self.active_members(devices) {
            for ase in device.active_ases(direction) {
                let prefs = &ase.qos_preferences;
                if prefs.pres_delay_min > delay_max || prefs.pres_delay_max < delay_min {
                    warn!(
                        "group {}: ase id {} presentation delay [{}, {}] out of [{}, {}]",
                        self.group_id,
                        ase.id,
                        prefs.pres_delay_min,
                        prefs.pres_delay_max,
                        delay_min,
                        delay_max
                    );
                    return None;
                }

                delay_min = delay_min.max(prefs.pres_delay_min);
                delay_max = delay_max.min(prefs.pres_delay_max);
                preferred_delay_min = preferred_delay_min.max(prefs.preferred_pres_delay_min);
                if prefs.preferred_pres_delay_max != PRES_DELAY_NO_PREFERENCE {
                    preferred_delay_max = preferred_delay_max.min(prefs.preferred_pres_delay_max);
                }
            }
        }

        if preferred_delay_min <= preferred_delay_max
            && preferred_delay_min > delay_min
            && preferred_delay_min < delay_max
        {
            Some(preferred_delay_min)
        } else {
            Some(delay_min)
        }
    }

    /// Presentation delay plus transport latency, in ms.
    pub fn get_remote_delay(&self, devices: &LeAudioDevices, direction: Direction) -> u16 {
        let Some(presentation_delay) = self.get_presentation_delay(devices, direction) else {
            return FALLBACK_REMOTE_DELAY_MS;
        };
        let delay_ms = presentation_delay / 1000 + self.get_transport_latency_us(direction) / 1000;
        u16::try_from(delay_ms).unwrap_or(u16::MAX)
    }
}
