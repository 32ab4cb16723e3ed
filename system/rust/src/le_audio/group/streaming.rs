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

//! CIS allocation for the group and bookkeeping of what is streaming.

use log::{debug, error, info, warn};

use super::LeAudioDeviceGroup;
use crate::le_audio::codec_manager::CodecManager;
use crate::le_audio::devices::{DeviceHandle, LeAudioDevices};
use crate::le_audio::error::LeAudioError;
use crate::le_audio::interfaces::CsisClient;
use crate::le_audio::set_configurations::get_cis_count;
use crate::le_audio::types::{
    AseState, CisState, DataPathState, Direction, LeAudioContextType, GROUP_UNKNOWN,
};

impl LeAudioDeviceGroup {
    /// Allocates the CIS slots `context_type` needs, sized for the whole
    /// coordinated set. Does nothing if slots already exist.
    pub fn generate_cis_ids(
        &mut self,
        devices: &LeAudioDevices,
        csis: Option<&dyn CsisClient>,
        context_type: LeAudioContextType,
    ) {
        info!("group_id: {}, context_type: {}", self.group_id, context_type);
        if !self.cig.cises.is_empty() {
            info!("CIS IDs already generated");
            return;
        }

        // Not a coordinated set, or the set size is not known yet.
        let group_size = csis
            .and_then(|csis| csis.get_desired_size(self.group_id))
            .filter(|&size| size > 0)
            .unwrap_or(1);

        let count = get_cis_count(
            context_type,
            u8::try_from(group_size).unwrap_or(u8::MAX),
            self.get_group_sink_strategy(devices),
            self.get_ase_count(devices, Direction::Sink),
            self.get_ase_count(devices, Direction::Source),
            &self.available_contexts,
        );
        self.cig.generate_cis_ids(count);
    }

    /// Binds CIS slots to the active ASEs of the member `handle`.
    pub fn assign_cis_ids(&mut self, devices: &mut LeAudioDevices, handle: DeviceHandle) -> bool {
        match devices.get_mut(handle) {
            Some(device) => self.cig.assign_cis_ids(device),
            None => false,
        }
    }

    /// Binds CIS slots for every active member. When the slots run out,
    /// every binding made so far is released and all ASEs are deactivated.
    pub fn assign_cis_ids_to_active_devices(&mut self, devices: &mut LeAudioDevices) -> bool {
        for handle in self.devices.clone() {
            let Some(device) = devices.get_mut(handle) else { continue };
            if !device.have_active_ase() {
                continue;
            }
            if !self.cig.assign_cis_ids(device) {
                error!("group {}: unable to assign CIS ids", self.group_id);
                self.rollback_activation(devices);
                return false;
            }
        }
        true
    }

    pub fn unassign_cis(&mut self, devices: &LeAudioDevices, handle: DeviceHandle) {
        if let Some(device) = devices.get(handle) {
            info!("group_id {}, device: {}", self.group_id, device.address.to_loggable_string());
            self.cig.unassign_cis(&device.address);
        }
    }

    /// Stores the handles the controller returned on CIG creation.
    pub fn assign_cis_conn_handles(&mut self, conn_handles: &[u16]) -> Result<(), LeAudioError> {
        self.cig.assign_cis_conn_handles(conn_handles)
    }

    /// Copies the slot handles into the member's active ASEs that have no
    /// CIS yet, marking them assigned.
    pub fn assign_cis_conn_handles_to_device_ases(
        &self,
        devices: &mut LeAudioDevices,
        handle: DeviceHandle,
    ) {
        let Some(device) = devices.get_mut(handle) else {
            warn!("group {}: invalid device", self.group_id);
            return;
        };
        info!("group_id {}, device: {}", self.group_id, device.address.to_loggable_string());

        let pending: Vec<usize> = device
            .ases
            .iter()
            .enumerate()
            .filter(|(_, ase)| {
                ase.active
                    && ase.cis_state == CisState::Idle
                    && ase.data_path_state == DataPathState::Idle
            })
            .map(|(idx, _)| idx)
            .collect();
        if pending.is_empty() {
            warn!("No active ASE with Cis and Data path state set to IDLE");
            return;
        }

        for idx in pending {
            let ase = &device.ases[idx];
            if ase.cis_state != CisState::Idle {
                // Already handled as the mate of a bidirectional CIS.
                continue;
            }
            let Some(cis) = self.cig.get_cis(ase.cis_id) else {
                warn!("ase id {} has no CIS slot (cis id {})", ase.id, ase.cis_id);
                continue;
            };
            let conn_handle = cis.conn_handle;
            let pair = device.get_ases_by_cis_id(ase.cis_id);
            for mate in [pair.sink, pair.source].into_iter().flatten() {
                let mate = &mut device.ases[mate];
                if mate.active {
                    mate.cis_conn_hdl = conn_handle;
                    mate.cis_state = CisState::Assigned;
                }
            }
        }
    }

    /// [`Self::assign_cis_conn_handles_to_device_ases`] for every active member.
    pub fn assign_cis_conn_handles_to_ases(&self, devices: &mut LeAudioDevices) {
        info!("group_id {}", self.group_id);
        let active: Vec<DeviceHandle> =
            self.active_members(devices).map(|(handle, _)| handle).collect();
        if active.is_empty() {
            error!("group {}: no active device", self.group_id);
            return;
        }
        for handle in active {
            self.assign_cis_conn_handles_to_device_ases(devices, handle);
        }
    }

    /// Records the ASEs of member `handle` carried by the established CIS
    /// `cis_conn_hdl` in the stream parameters.
    pub fn add_cis_to_stream_configuration(
        &mut self,
        devices: &LeAudioDevices,
        codec_manager: &mut CodecManager,
        handle: DeviceHandle,
        cis_conn_hdl: u16,
    ) {
        let Some(device) = devices.get(handle) else { return };
        let pair = device.get_ases_by_cis_conn_hdl(cis_conn_hdl);

        for direction in Direction::BOTH {
            let Some(ase) = (*pair.get(direction)).map(|idx| &device.ases[idx]) else { continue };
            if !ase.active {
                continue;
            }

            let params = self.stream_conf.stream_params.get_mut(direction);
            if params.has_handle(cis_conn_hdl) {
                debug!("cis {cis_conn_hdl:#x} already in the {direction} stream");
                continue;
            }

            let allocation = ase.audio_channel_allocation();
            params.num_of_devices += 1;
            params.num_of_channels += ase.codec_config.channel_count_per_iso_stream;
            params.audio_channel_allocation |= allocation;
            params.stream_locations.push((cis_conn_hdl, allocation));

            let core = &ase.codec_config.params;
            if params.sample_frequency_hz == 0 {
                params.sample_frequency_hz = core.sampling_frequency_hz;
                params.frame_duration_us = core.frame_duration_us;
                params.octets_per_codec_frame = core.octets_per_codec_frame;
                params.codec_frames_blocks_per_sdu = core.codec_frames_blocks_per_sdu;
            }
            self.stream_conf.codec_id = ase.codec_config.id;

            info!(
                "Added {direction} cis {cis_conn_hdl:#x}: devices {}, channels {}, alloc {:#x}",
                params.num_of_devices, params.num_of_channels, params.audio_channel_allocation
            );
            codec_manager.update_cis_configuration(&self.cig.cises, params, direction);
        }
    }

    pub fn is_cis_part_of_current_stream(&self, cis_conn_hdl: u16) -> bool {
        Direction::BOTH.iter().any(|&direction| {
            self.stream_conf.stream_params.get(direction).has_handle(cis_conn_hdl)
        })
    }

    /// Drops the contribution of CIS `cis_conn_hdl` of member `handle` from
    /// the stream parameters and releases the member's CIS slots.
    ///
    /// Nothing happens unless `cis_conn_hdl` is recorded in the current
    /// stream. Handle 0 is never recorded, so a member whose CIS was not yet
    /// established keeps its slots.
    pub fn remove_cis_from_stream_if_needed(
        &mut self,
        devices: &LeAudioDevices,
        codec_manager: &mut CodecManager,
        handle: DeviceHandle,
        cis_conn_hdl: u16,
    ) {
        info!("CIS Connection Handle: {cis_conn_hdl:#x}");
        let Some(device) = devices.get(handle) else { return };
        if !self.is_cis_part_of_current_stream(cis_conn_hdl) {
            return;
        }

        let old_sink_channels = self.stream_conf.stream_params.sink.num_of_channels;
        let old_source_channels = self.stream_conf.stream_params.source.num_of_channels;

        let pair = device.get_ases_by_cis_conn_hdl(cis_conn_hdl);
        for direction in Direction::BOTH {
            let Some(ase) = (*pair.get(direction)).map(|idx| &device.ases[idx]) else { continue };
            let params = self.stream_conf.stream_params.get_mut(direction);
            let removed: Vec<u32> = params
                .stream_locations
                .iter()
                .filter(|(handle, _)| *handle == cis_conn_hdl)
                .map(|&(_, allocation)| allocation)
                .collect();
            params.stream_locations.retain(|(handle, _)| *handle != cis_conn_hdl);
            for allocation in removed {
                params.num_of_devices = params.num_of_devices.saturating_sub(1);
                params.num_of_channels = params
                    .num_of_channels
                    .saturating_sub(ase.codec_config.channel_count_per_iso_stream);
                params.audio_channel_allocation &= !allocation;
            }
        }

        info!(
            "Sink Number Of Devices: {}, Sink Number Of Channels: {}, \
             Source Number Of Devices: {}, Source Number Of Channels: {}",
            self.stream_conf.stream_params.sink.num_of_devices,
            self.stream_conf.stream_params.sink.num_of_channels,
            self.stream_conf.stream_params.source.num_of_devices,
            self.stream_conf.stream_params.source.num_of_channels
        );

        if self.stream_conf.stream_params.sink.num_of_channels == 0 {
            self.clear_sinks_from_configuration(codec_manager);
        }
        if self.stream_conf.stream_params.source.num_of_channels == 0 {
            self.clear_sources_from_configuration(codec_manager);
        }

        if old_sink_channels > self.stream_conf.stream_params.sink.num_of_channels {
            self.update_cis_configuration(codec_manager, Direction::Sink);
        }
        if old_source_channels > self.stream_conf.stream_params.source.num_of_channels {
            self.update_cis_configuration(codec_manager, Direction::Source);
        }

        self.cig.unassign_cis(&device.address);
    }

    pub fn update_cis_configuration(&self, codec_manager: &mut CodecManager, direction: Direction) {
        codec_manager.update_cis_configuration(
            &self.cig.cises,
            self.stream_conf.stream_params.get(direction),
            direction,
        );
    }

    pub fn clear_sinks_from_configuration(&mut self, codec_manager: &mut CodecManager) {
        info!("group_id {}", self.group_id);
        self.stream_conf.stream_params.sink.clear();
        codec_manager.clear_cis_configuration(Direction::Sink);
    }

    pub fn clear_sources_from_configuration(&mut self, codec_manager: &mut CodecManager) {
        info!("group_id {}", self.group_id);
        self.stream_conf.stream_params.source.clear();
        codec_manager.clear_cis_configuration(Direction::Source);
    }

    pub fn clear_all_cises(&mut self, codec_manager: &mut CodecManager) {
        info!("group_id: {}", self.group_id);
        self.cig.clear();
        self.clear_sinks_from_configuration(codec_manager);
        self.clear_sources_from_configuration(codec_manager);
    }

    /// Tears the group down. When streaming, returns the handles of the CISes
    /// the caller has to disconnect, each one once. The CIG itself is left to
    /// the controller reset.
    pub fn cleanup(
        &mut self,
        devices: &mut LeAudioDevices,
        codec_manager: &mut CodecManager,
    ) -> Vec<u16> {
        let mut to_disconnect = vec![];
        if self.get_state() == AseState::Streaming {
            let params = &self.stream_conf.stream_params;
            to_disconnect.extend(params.sink.stream_locations.iter().map(|&(handle, _)| handle));
            // Bidirectional CISes are already listed with the sinks.
            let source_only: Vec<u16> = params
                .source
                .stream_locations
                .iter()
                .map(|&(handle, _)| handle)
                .filter(|handle| !to_disconnect.contains(handle))
                .collect();
            to_disconnect.extend(source_only);
        }

        for handle in std::mem::take(&mut self.devices) {
            if let Some(device) = devices.get_mut(handle) {
                device.group_id = GROUP_UNKNOWN;
            }
        }
        self.clear_all_cises(codec_manager);
        to_disconnect
    }
}
