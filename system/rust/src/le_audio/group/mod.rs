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

//! A group of LE Audio devices forming one coordinated set.
//!
//! The group holds handles into [`LeAudioDevices`] rather than the devices
//! themselves, so almost every operation takes the device arena as an
//! argument. A handle whose device is gone is skipped everywhere.

use std::cell::Cell;
use std::fmt::Write;

use log::{debug, info, warn};

use crate::le_audio::cig::CigConfiguration;
use crate::le_audio::device::LeAudioDevice;
use crate::le_audio::devices::{DeviceHandle, LeAudioDevices};
use crate::le_audio::interfaces::{BleConnectionType, ControllerInterface, GattConnector};
use crate::le_audio::stream::StreamConfiguration;
use crate::le_audio::types::{
    AseState, AudioContexts, AudioLocations, BidirectionalPair, CisState, DataPathState,
    DeviceConnectState, Direction, LeAudioConfigurationStrategy, LeAudioContextType,
    GROUP_UNKNOWN,
};

mod configuration;
mod qos;
mod streaming;

pub use configuration::ConfigurationCache;

pub struct LeAudioDeviceGroup {
    group_id: i32,
    is_enabled: bool,
    current_state: AseState,
    target_state: AseState,
    in_transition: bool,
    devices: Vec<DeviceHandle>,
    strategy: Cell<Option<LeAudioConfigurationStrategy>>,
    audio_locations: BidirectionalPair<AudioLocations>,
    audio_directions: u8,
    /// Sink is master to slave, source is slave to master.
    transport_latency_us: BidirectionalPair<u32>,
    available_contexts: BidirectionalPair<AudioContexts>,
    configuration_context_type: LeAudioContextType,
    metadata_context_type: BidirectionalPair<AudioContexts>,
    configuration_cache: ConfigurationCache,
    pub cig: CigConfiguration,
    pub stream_conf: StreamConfiguration,
}

impl LeAudioDeviceGroup {
    pub fn new(group_id: i32) -> Self {
        LeAudioDeviceGroup {
            group_id,
            is_enabled: true,
            current_state: AseState::Idle,
            target_state: AseState::Idle,
            in_transition: false,
            devices: vec![],
            strategy: Cell::new(None),
            audio_locations: BidirectionalPair::default(),
            audio_directions: 0,
            transport_latency_us: BidirectionalPair::default(),
            available_contexts: BidirectionalPair::default(),
            configuration_context_type: LeAudioContextType::Uninitialized,
            metadata_context_type: BidirectionalPair::default(),
            configuration_cache: ConfigurationCache::default(),
            cig: CigConfiguration::new(group_id),
            stream_conf: StreamConfiguration::default(),
        }
    }

    pub fn group_id(&self) -> i32 {
        self.group_id
    }

    pub fn add_node(&mut self, devices: &mut LeAudioDevices, handle: DeviceHandle) {
        let Some(device) = devices.get_mut(handle) else {
            warn!("group {}: adding an unknown device", self.group_id);
            return;
        };
        device.group_id = self.group_id;
        if !self.devices.contains(&handle) {
            self.devices.push(handle);
        }
        info!("group {}: added {}", self.group_id, device.address.to_loggable_string());
    }

    pub fn remove_node(&mut self, devices: &mut LeAudioDevices, handle: DeviceHandle) {
        if let Some(device) = devices.get_mut(handle) {
            device.group_id = GROUP_UNKNOWN;
            for ase in &mut device.ases {
                ase.active = false;
                ase.cis_conn_hdl = 0;
            }
            info!("group {}: removed {}", self.group_id, device.address.to_loggable_string());
        }
        self.devices.retain(|&h| h != handle);
    }

    /// Members whose device still exists, in insertion order.
    pub fn members<'a>(
        &'a self,
        devices: &'a LeAudioDevices,
    ) -> impl Iterator<Item = (DeviceHandle, &'a LeAudioDevice)> + 'a {
        self.devices.iter().filter_map(move |&handle| devices.get(handle).map(|d| (handle, d)))
    }

    /// Member handles, including expired ones.
    pub fn member_handles(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn is_empty(&self, devices: &LeAudioDevices) -> bool {
        self.members(devices).next().is_none()
    }

    pub fn size(&self, devices: &LeAudioDevices) -> usize {
        self.members(devices).count()
    }

    pub fn is_any_device_connected(&self, devices: &LeAudioDevices) -> bool {
        self.num_of_connected(devices, None) != 0
    }

    /// Connected members supporting `context_type`. `None` or
    /// [`LeAudioContextType::Rfu`] counts every connected member.
    pub fn num_of_connected(
        &self,
        devices: &LeAudioDevices,
        context_type: Option<LeAudioContextType>,
    ) -> usize {
        let context_type = context_type.filter(|&c| c != LeAudioContextType::Rfu);
        self.members(devices)
            .filter(|(_, device)| device.is_connected())
            .filter(|(_, device)| match context_type {
                Some(context_type) => {
                    device.get_supported_contexts(None).test_any(context_type.into())
                }
                None => true,
            })
            .count()
    }

    /// First member after `after` (or the first member when `None`)
    /// matching `predicate`. Returns `None` if `after` is not a member.
    pub fn find_device<P>(
        &self,
        devices: &LeAudioDevices,
        after: Option<DeviceHandle>,
        predicate: P,
    ) -> Option<DeviceHandle>
    where
        P: Fn(&LeAudioDevice) -> bool,
    {
        let start = match after {
            None => 0,
            Some(reference) => self.devices.iter().position(|&h| h == reference)? + 1,
        };
        self.devices[start..]
            .iter()
            .copied()
            .find(|&handle| devices.get(handle).is_some_and(&predicate))
    }

    pub fn get_first_device(&self, devices: &LeAudioDevices) -> Option<DeviceHandle> {
        self.find_device(devices, None, |_| true)
    }

    pub fn get_next_device(
        &self,
        devices: &LeAudioDevices,
        after: DeviceHandle,
    ) -> Option<DeviceHandle> {
        self.find_device(devices, Some(after), |_| true)
    }

    pub fn get_first_device_with_available_context(
        &self,
        devices: &LeAudioDevices,
        context_type: LeAudioContextType,
    ) -> Option<DeviceHandle> {
        self.find_device(devices, None, |d| d.get_available_contexts(None).test(context_type))
    }

    pub fn get_next_device_with_available_context(
        &self,
        devices: &LeAudioDevices,
        after: DeviceHandle,
        context_type: LeAudioContextType,
    ) -> Option<DeviceHandle> {
        self.find_device(devices, Some(after), |d| {
            d.get_available_contexts(None).test(context_type)
        })
    }

    pub fn get_first_active_device(&self, devices: &LeAudioDevices) -> Option<DeviceHandle> {
        self.find_device(devices, None, LeAudioDevice::have_active_ase)
    }

    pub fn get_next_active_device(
        &self,
        devices: &LeAudioDevices,
        after: DeviceHandle,
    ) -> Option<DeviceHandle> {
        self.find_device(devices, Some(after), LeAudioDevice::have_active_ase)
    }

    pub fn get_first_active_device_by_cis_and_data_path_state(
        &self,
        devices: &LeAudioDevices,
        cis_state: CisState,
        data_path_state: DataPathState,
    ) -> Option<DeviceHandle> {
        self.find_device(devices, None, |d| {
            d.get_first_active_ase_by_cis_and_data_path_state(cis_state, data_path_state).is_some()
        })
    }

    pub fn get_next_active_device_by_cis_and_data_path_state(
        &self,
        devices: &LeAudioDevices,
        after: DeviceHandle,
        cis_state: CisState,
        data_path_state: DataPathState,
    ) -> Option<DeviceHandle> {
        self.find_device(devices, Some(after), |d| {
            d.get_first_active_ase_by_cis_and_data_path_state(cis_state, data_path_state).is_some()
        })
    }

    pub fn is_device_in_the_group(&self, devices: &LeAudioDevices, handle: DeviceHandle) -> bool {
        self.devices.contains(&handle) && devices.is_alive(handle)
    }

    fn active_members<'a>(
        &'a self,
        devices: &'a LeAudioDevices,
    ) -> impl Iterator<Item = (DeviceHandle, &'a LeAudioDevice)> + 'a {
        self.members(devices).filter(|(_, device)| device.have_active_ase())
    }

    pub fn is_group_ready_to_create_stream(&self, devices: &LeAudioDevices) -> bool {
        self.active_members(devices).all(|(_, device)| device.is_ready_to_create_stream())
    }

    pub fn is_group_ready_to_suspend_stream(&self, devices: &LeAudioDevices) -> bool {
        self.active_members(devices).all(|(_, device)| device.is_ready_to_suspend_stream())
    }

    pub fn have_any_active_device_in_unconfigured_state(&self, devices: &LeAudioDevices) -> bool {
        self.active_members(devices).any(|(_, device)| device.have_any_unconfigured_ases())
    }

    pub fn have_all_active_devices_ases_the_same_state(
        &self,
        devices: &LeAudioDevices,
        state: AseState,
    ) -> bool {
        self.active_members(devices)
            .all(|(_, device)| device.have_all_active_ases_same_state(state))
    }

    /// At least one connected, configured member and all of those have
    /// their CISes and data paths up.
    pub fn is_group_stream_ready(&self, devices: &LeAudioDevices) -> bool {
        let mut is_device_ready = false;
        for (_, device) in self.members(devices) {
            if device.get_connection_state() == DeviceConnectState::Connected
                && device.have_active_ase()
            {
                if !device.is_ready_to_stream() {
                    return false;
                }
                is_device_ready = true;
            }
        }
        is_device_ready
    }

    pub fn have_all_cises_disconnected(&self, devices: &LeAudioDevices) -> bool {
        !self.members(devices).any(|(_, device)| device.have_any_cis_connected())
    }

    pub fn get_ase_count(&self, devices: &LeAudioDevices, direction: Direction) -> usize {
        self.members(devices).map(|(_, device)| device.get_ase_count(direction)).sum()
    }

    /// Union of the members' supported contexts in `direction`, or in both.
    pub fn get_supported_contexts(
        &self,
        devices: &LeAudioDevices,
        direction: Option<Direction>,
    ) -> AudioContexts {
        self.members(devices).fold(AudioContexts::empty(), |acc, (_, device)| {
            acc | device.get_supported_contexts(direction)
        })
    }

    pub fn get_available_contexts(&self, direction: Option<Direction>) -> AudioContexts {
        match direction {
            Some(direction) => *self.available_contexts.get(direction),
            None => self.available_contexts.sink | self.available_contexts.source,
        }
    }

    pub fn set_available_contexts(&mut self, contexts: BidirectionalPair<AudioContexts>) {
        debug!(
            "group {}: available contexts sink {}, source {}",
            self.group_id, contexts.sink, contexts.source
        );
        self.available_contexts = contexts;
    }

    /// Available contexts computed from the connected members right now.
    pub fn get_latest_available_contexts(
        &self,
        devices: &LeAudioDevices,
    ) -> BidirectionalPair<AudioContexts> {
        let mut contexts = BidirectionalPair::<AudioContexts>::default();
        for (_, device) in self.members(devices).filter(|(_, device)| device.is_connected()) {
            contexts.sink |= device.available_contexts.sink;
            contexts.source |= device.available_contexts.source;
        }
        contexts
    }

    /// Refreshes the group available contexts, returning true on change.
    pub fn update_audio_context_availability(&mut self, devices: &LeAudioDevices) -> bool {
        let old_contexts = self.available_contexts.clone();
        self.set_available_contexts(self.get_latest_available_contexts(devices));
        old_contexts != self.available_contexts
    }

    pub fn get_audio_locations(&self, direction: Direction) -> AudioLocations {
        *self.audio_locations.get(direction)
    }

    /// Recomputes the group audio locations from connected members,
    /// returning true on change.
    pub fn reload_audio_locations(&mut self, devices: &LeAudioDevices) -> bool {
        let mut updated = BidirectionalPair::<AudioLocations>::default();
        for (_, device) in self.members(devices) {
            if device.get_connection_state() != DeviceConnectState::Connected {
                continue;
            }
            updated.sink |= device.audio_locations.sink;
            updated.source |= device.audio_locations.source;
        }

        if updated == self.audio_locations {
            return false;
        }
        self.audio_locations = updated;
        true
    }

    pub fn get_audio_directions(&self) -> u8 {
        self.audio_directions
    }

    pub fn reload_audio_directions(&mut self, devices: &LeAudioDevices) -> bool {
        let updated = self
            .members(devices)
            .filter(|(_, device)| device.get_connection_state() == DeviceConnectState::Connected)
            .fold(0u8, |acc, (_, device)| acc | device.audio_directions);

        if updated == self.audio_directions {
            return false;
        }
        self.audio_directions = updated;
        true
    }

    pub fn get_state(&self) -> AseState {
        self.current_state
    }

    pub fn set_state(&mut self, state: AseState) {
        info!("group {}: current state {:?} -> {:?}", self.group_id, self.current_state, state);
        self.current_state = state;
    }

    pub fn get_target_state(&self) -> AseState {
        self.target_state
    }

    pub fn set_target_state(&mut self, state: AseState) {
        info!("group {}: target state {:?} -> {:?}", self.group_id, self.target_state, state);
        self.target_state = state;
    }

    pub fn is_in_transition(&self) -> bool {
        self.in_transition
    }

    pub fn set_in_transition(&mut self, in_transition: bool) {
        self.in_transition = in_transition;
    }

    pub fn is_streaming(&self) -> bool {
        self.current_state == AseState::Streaming
    }

    pub fn is_releasing_or_idle(&self) -> bool {
        self.target_state == AseState::Idle || self.current_state == AseState::Idle
    }

    pub fn is_pending_configuration(&self) -> bool {
        self.stream_conf.pending_configuration
    }

    pub fn set_pending_configuration(&mut self) {
        self.stream_conf.pending_configuration = true;
    }

    pub fn clear_pending_configuration(&mut self) {
        self.stream_conf.pending_configuration = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Stops autoconnecting to the members.
    pub fn disable(
        &mut self,
        devices: &mut LeAudioDevices,
        connector: &mut dyn GattConnector,
        gatt_if: u8,
    ) {
        self.is_enabled = false;
        for &handle in &self.devices {
            let Some(device) = devices.get_mut(handle) else { continue };
            if !device.autoconnect_flag {
                continue;
            }

            connector.set_autoconnect(device.address, false);
            device.autoconnect_flag = false;

            info!(
                "Group {} in state {:?}. Removing {} from background connect",
                self.group_id, self.current_state, device.address.to_loggable_string()
            );

            connector.cancel_open(gatt_if, device.address);
            if device.get_connection_state() == DeviceConnectState::ConnectingAutoconnect {
                device.set_connection_state(DeviceConnectState::Disconnected);
            }
        }
    }

    /// Starts autoconnecting to the members with `reconnection_mode`.
    pub fn enable(
        &mut self,
        devices: &mut LeAudioDevices,
        connector: &mut dyn GattConnector,
        gatt_if: u8,
        reconnection_mode: BleConnectionType,
    ) {
        self.is_enabled = true;
        for &handle in &self.devices {
            let Some(device) = devices.get_mut(handle) else { continue };
            if device.autoconnect_flag {
                continue;
            }

            connector.set_autoconnect(device.address, true);
            device.autoconnect_flag = true;

            info!(
                "Group {} in state {:?}. Adding {} to background connect",
                self.group_id, self.current_state, device.address.to_loggable_string()
            );

            if device.get_connection_state() == DeviceConnectState::Disconnected {
                connector.open(gatt_if, device.address, reconnection_mode);
                device.set_connection_state(DeviceConnectState::ConnectingAutoconnect);
            }
        }
    }

    /// Tries a direct connection to every member not connected or being
    /// connected already.
    pub fn add_to_allow_list_not_connected_group_members(
        &self,
        devices: &mut LeAudioDevices,
        connector: &mut dyn GattConnector,
        gatt_if: u8,
    ) {
        for &handle in &self.devices {
            let Some(device) = devices.get_mut(handle) else { continue };
            if matches!(
                device.get_connection_state(),
                DeviceConnectState::Connected
                    | DeviceConnectState::ConnectingByUser
                    | DeviceConnectState::ConnectedByUserGettingReady
                    | DeviceConnectState::ConnectedAutoconnectGettingReady
            ) {
                continue;
            }

            info!(
                "Group {} in state {:?}. Adding {} to allow list",
                self.group_id, self.current_state, device.address.to_loggable_string()
            );

            // Direct connect first, the stack falls back to background
            // connect when the device is not advertising.
            connector.cancel_open(gatt_if, device.address);
            connector.open(gatt_if, device.address, BleConnectionType::Direct);
            device.set_connection_state(DeviceConnectState::ConnectingAutoconnect);
        }
    }

    pub fn apply_reconnection_mode(
        &self,
        devices: &mut LeAudioDevices,
        connector: &mut dyn GattConnector,
        gatt_if: u8,
        reconnection_mode: BleConnectionType,
    ) {
        for &handle in &self.devices {
            let Some(device) = devices.get_mut(handle) else { continue };
            connector.cancel_open(gatt_if, device.address);
            connector.open(gatt_if, device.address, reconnection_mode);
            info!(
                "Group {} in state {:?}. Adding {} to default reconnection mode",
                self.group_id, self.current_state, device.address.to_loggable_string()
            );
            device.set_connection_state(DeviceConnectState::ConnectingAutoconnect);
        }
    }

    /// Human readable state of the group and its members.
    pub fn dump(
        &self,
        devices: &LeAudioDevices,
        controller: &dyn ControllerInterface,
        active_group_id: i32,
    ) -> String {
        let mut out = String::new();
        let is_active = self.group_id == active_group_id;
        let active_conf = self.get_active_configuration();
        let _ = write!(
            out,
            "\n    == Group id: {} {} == {}\
             \n      state: {:?},\ttarget state: {:?},\tcig state: {:?}\
             \n      group supported contexts: {}\
             \n      group available contexts: {}\
             \n      configuration context type: {}\
             \n      active configuration name: {}\
             \n      stream configuration: {}\
             \n      codec id: {:#x},\tpending_configuration: {}\
             \n      num of devices(connected): {}({})\
             \n      num of sinks(connected): {}({})\
             \n      num of sources(connected): {}({})\
             \n      allocated CISes: {}",
            self.group_id,
            if self.is_enabled { "enabled" } else { "disabled" },
            if is_active { "Active" } else { "Inactive" },
            self.current_state,
            self.target_state,
            self.cig.get_state(),
            self.get_supported_contexts(devices, None),
            self.get_available_contexts(None),
            self.configuration_context_type,
            active_conf.as_ref().map_or("not set", |c| c.name.as_str()),
            self.stream_conf.conf.as_ref().map_or("unknown", |c| c.name.as_str()),
            self.stream_conf.codec_id.coding_format,
            self.stream_conf.pending_configuration,
            self.size(devices),
            self.num_of_connected(devices, None),
            self.stream_conf.stream_params.sink.num_of_devices,
            self.stream_conf.stream_params.sink.stream_locations.len(),
            self.stream_conf.stream_params.source.num_of_devices,
            self.stream_conf.stream_params.source.stream_locations.len(),
            self.cig.cises.len(),
        );

        for cis in &self.cig.cises {
            let _ = write!(
                out,
                "\n\t cis id: {},\ttype: {:?},\tconn_handle: {:#x},\taddr: {}",
                cis.id,
                cis.cis_type,
                cis.conn_handle,
                cis.addr.map_or("none".to_string(), |a| a.to_loggable_string()),
            );
        }

        if self.get_first_active_device(devices).is_some() {
            for direction in Direction::BOTH {
                if let Some(delay) = self.get_presentation_delay(devices, direction) {
                    let _ = write!(out, "\n      presentation_delay for {direction}: {delay} us");
                }
                let _ = write!(
                    out,
                    "\n      {direction} phy: {:#x}, sdu interval: {}",
                    self.get_phy_bitmask(devices, controller, direction),
                    self.get_sdu_interval(devices, direction),
                );
            }
            let _ = write!(
                out,
                "\n      MtoS transport latency: {}, StoM transport latency: {}",
                self.get_max_transport_latency_mtos(devices),
                self.get_max_transport_latency_stom(devices),
            );
        }

        let _ = write!(out, "\n      == devices: ==");
        for (_, device) in self.members(devices) {
            device.dump(&mut out);
        }
        out
    }

    pub fn print_debug_state(
        &self,
        devices: &LeAudioDevices,
        controller: &dyn ControllerInterface,
    ) {
        info!("{}", self.dump(devices, controller, GROUP_UNKNOWN));
    }
}
