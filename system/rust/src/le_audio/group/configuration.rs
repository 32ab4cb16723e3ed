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

//! Picking an audio set configuration for a group and activating the
//! member ASEs for it.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::LeAudioDeviceGroup;
use crate::le_audio::codec::LeAudioCodecConfiguration;
use crate::le_audio::codec_manager::CodecManager;
use crate::le_audio::device::{AseActivationRequest, LeAudioDevice};
use crate::le_audio::devices::{DeviceHandle, LeAudioDevices};
use crate::le_audio::set_configurations::{
    check_if_may_cover_scenario, check_if_may_cover_scenario_list, AseConfiguration,
    AudioSetConfiguration,
};
use crate::le_audio::types::{
    AseState, AudioContexts, AudioLocations, BidirectionalPair, Direction,
    LeAudioConfigurationStrategy, LeAudioContextType,
};

/// Configuration chosen per context type, with a validity flag cleared when
/// the group or its contexts change.
#[derive(Debug, Default)]
pub struct ConfigurationCache {
    entries: HashMap<LeAudioContextType, (bool, Arc<AudioSetConfiguration>)>,
}

impl ConfigurationCache {
    /// Cached entry for `context_type`. Entries marked invalid are not
    /// returned until refreshed through [`Self::update`].
    pub fn get(&self, context_type: LeAudioContextType) -> Option<&Arc<AudioSetConfiguration>> {
        self.entries.get(&context_type).filter(|(valid, _)| *valid).map(|(_, conf)| conf)
    }

    pub fn is_valid(&self, context_type: LeAudioContextType) -> bool {
        self.entries.get(&context_type).is_some_and(|(valid, _)| *valid)
    }

    /// Stores `conf` for `context_type`, or drops the entry when `None`.
    /// Returns true if the stored configuration changed.
    pub fn update(
        &mut self,
        context_type: LeAudioContextType,
        conf: Option<Arc<AudioSetConfiguration>>,
    ) -> bool {
        if let Some((valid, existing)) = self.entries.get_mut(&context_type) {
            if conf.as_ref().is_some_and(|conf| Arc::ptr_eq(conf, existing)) {
                *valid = true;
                return false;
            }
        }

        info!(
            "config: {} -> {}",
            context_type, conf.as_ref().map_or("(none)", |conf| conf.name.as_str())
        );
        match conf {
            Some(conf) => {
                self.entries.insert(context_type, (true, conf));
            }
            None => {
                self.entries.remove(&context_type);
            }
        }
        true
    }

    pub fn invalidate_all(&mut self) {
        for (valid, _) in self.entries.values_mut() {
            *valid = false;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `device` can host an ASE of `conf` in `direction` under
/// `strategy`, judging by its audio locations and channel counts.
pub fn check_if_strategy_supported(
    strategy: LeAudioConfigurationStrategy,
    conf: &AseConfiguration,
    direction: Direction,
    device: &LeAudioDevice,
) -> bool {
    let audio_locations = *device.audio_locations.get(direction);
    debug!("strategy: {strategy:?}, locations: {:#x}", audio_locations.bits());

    match strategy {
        LeAudioConfigurationStrategy::MonoOneCisPerDevice => !audio_locations.is_empty(),
        LeAudioConfigurationStrategy::StereoTwoCisesPerDevice => {
            audio_locations.has_left() && audio_locations.has_right()
        }
        LeAudioConfigurationStrategy::StereoOneCisPerDevice => {
            if !audio_locations.has_left() || !audio_locations.has_right() {
                return false;
            }
            let channel_count_mask = device.get_supported_audio_channel_counts(direction);
            let requested = conf.codec.channel_count_per_iso_stream;
            debug!("Requested channel count: {requested}, supported: {channel_count_mask:#x}");
            // Bit 0 of the mask stands for one channel.
            (1..=8).contains(&requested) && (1u8 << (requested - 1)) & channel_count_mask != 0
        }
    }
}

impl LeAudioDeviceGroup {
    fn compute_sink_strategy(&self, devices: &LeAudioDevices) -> LeAudioConfigurationStrategy {
        let expected_group_size = self.size(devices);
        debug!("Group {} size {}", self.group_id, expected_group_size);
        if expected_group_size > 1 {
            return LeAudioConfigurationStrategy::MonoOneCisPerDevice;
        }

        let locations = self.audio_locations.sink;
        debug!("audio location {:#06x}", locations.bits());
        if !locations.intersects(AudioLocations::ANY_LEFT)
            || !locations.intersects(AudioLocations::ANY_RIGHT)
        {
            return LeAudioConfigurationStrategy::MonoOneCisPerDevice;
        }

        let Some((_, device)) = self.members(devices).next() else {
            return LeAudioConfigurationStrategy::MonoOneCisPerDevice;
        };
        let channel_count_bitmap = device.get_supported_audio_channel_counts(Direction::Sink);
        debug!(
            "Supported channel counts for group {} (device {}) is {}",
            self.group_id, device.address.to_loggable_string(), channel_count_bitmap
        );
        if channel_count_bitmap == 1 {
            LeAudioConfigurationStrategy::StereoTwoCisesPerDevice
        } else {
            LeAudioConfigurationStrategy::StereoOneCisPerDevice
        }
    }

    /// Sink strategy of the group, computed on first use and kept until
    /// [`Self::invalidate_group_strategy`].
    pub fn get_group_sink_strategy(
        &self,
        devices: &LeAudioDevices,
    ) -> LeAudioConfigurationStrategy {
        if let Some(strategy) = self.strategy.get() {
            return strategy;
        }
        let strategy = self.compute_sink_strategy(devices);
        info!("Group {} strategy set to: {strategy:?}", self.group_id);
        self.strategy.set(Some(strategy));
        strategy
    }

    pub fn invalidate_group_strategy(&self) {
        self.strategy.set(None);
    }

    /// Whether the members can cover `conf` for `context_type`, counting
    /// every ASE of the members no matter its state.
    pub fn is_audio_set_configuration_supported(
        &self,
        devices: &LeAudioDevices,
        codec_manager: &CodecManager,
        conf: &AudioSetConfiguration,
        context_type: LeAudioContextType,
        required_snk_strategy: LeAudioConfigurationStrategy,
    ) -> bool {
        let mut num_of_connected = self.num_of_connected(devices, Some(context_type));
        if num_of_connected == 0 {
            num_of_connected = self.num_of_connected(devices, None);
        }
        if !check_if_may_cover_scenario(conf, num_of_connected) {
            debug!("cannot cover scenario {context_type}, num. of connected: {num_of_connected}");
            return false;
        }

        for direction in Direction::BOTH {
            debug!("Looking for configuration: {} - {}", conf.name, direction);
            let ase_confs = conf.confs.get(direction);
            let strategy = *conf.topology_info.strategy.get(direction);
            let device_cnt = usize::from(*conf.topology_info.device_count.get(direction));
            let ase_cnt = ase_confs.len();

            if ase_cnt == 0 {
                debug!("{direction}: ASE count is 0");
                continue;
            }
            if device_cnt == 0 {
                error!("{direction}: device count is 0");
                continue;
            }

            if direction == Direction::Sink && strategy != required_snk_strategy {
                debug!("Sink strategy mismatch ({required_snk_strategy:?} != {strategy:?})");
                return false;
            }

            let max_required_ase_per_dev = ase_cnt.div_ceil(device_cnt);
            let mut required_device_cnt = device_cnt;
            let mut active_ase_cnt = 0usize;

            debug!(
                "Number of devices: {device_cnt}, number of ASEs: {ase_cnt}, Max ASE per device: \
                 {max_required_ase_per_dev}, Strategy: {strategy:?}"
            );

            for (_, device) in self.members(devices) {
                if required_device_cnt == 0 {
                    break;
                }
                if device.ases.is_empty() {
                    error!("{} has no ASEs", device.address.to_loggable_string());
                    continue;
                }

                let mut needed_ase_per_dev =
                    max_required_ase_per_dev.min(ase_cnt.saturating_sub(active_ase_cnt));
                let mut free_ases = device.get_ase_count(direction);

                for ent in ase_confs {
                    if needed_ase_per_dev == 0 || free_ases == 0 {
                        break;
                    }
                    if device
                        .get_codec_configuration_supported_pac(direction, &ent.codec)
                        .is_none()
                    {
                        debug!("Insufficient PAC");
                        continue;
                    }
                    if !check_if_strategy_supported(strategy, ent, direction, device) {
                        debug!("Strategy not supported");
                        continue;
                    }
                    free_ases -= 1;
                    active_ase_cnt += 1;
                    needed_ase_per_dev -= 1;
                }

                if needed_ase_per_dev > 0 {
                    debug!("Not enough ASEs on the device (needs {needed_ase_per_dev} more).");
                    return false;
                }

                required_device_cnt -= 1;
            }

            if required_device_cnt > 0 {
                debug!("Could not configure all the devices for direction: {direction}");
                return false;
            }
        }

        // Groups of more than one member need dual bidirectional SWB support
        // for such configurations.
        if self.size(devices) > 1
            && codec_manager.check_codec_config_is_bidir_swb(conf)
            && !codec_manager.is_dual_bidir_swb_supported()
        {
            debug!("{}: dual bidirectional SWB not supported", conf.name);
            return false;
        }

        debug!(
            "Chosen ASE Configuration for group: {}, configuration: {}",
            self.group_id, conf.name
        );
        true
    }

    /// Whether `device` alone has PACs for every requirement of `conf`.
    pub fn is_audio_set_configuration_supported_by_device(
        &self,
        device: &LeAudioDevice,
        conf: &AudioSetConfiguration,
    ) -> bool {
        let supported = device.is_audio_set_configuration_supported(conf);
        info!(
            "Configuration {} is {}supported by device {}",
            conf.name, if supported { "" } else { "NOT " }, device.address.to_loggable_string()
        );
        supported
    }

    /// First entry of `confs`, in catalog order, the group can use.
    pub fn find_first_supported_configuration(
        &self,
        devices: &LeAudioDevices,
        codec_manager: &CodecManager,
        context_type: LeAudioContextType,
        confs: &[Arc<AudioSetConfiguration>],
    ) -> Option<Arc<AudioSetConfiguration>> {
        debug!(
            "context type: {context_type}, number of connected devices: {}",
            self.num_of_connected(devices, None)
        );

        let mut num_of_connected = self.num_of_connected(devices, Some(context_type));
        if num_of_connected == 0 {
            num_of_connected = self.num_of_connected(devices, None);
        }
        if !check_if_may_cover_scenario_list(confs, num_of_connected) {
            debug!("group {} is unable to cover scenario", self.group_id);
            return None;
        }

        let required_snk_strategy = self.get_group_sink_strategy(devices);
        let found = confs.iter().find(|conf| {
            self.is_audio_set_configuration_supported(
                devices,
                codec_manager,
                conf,
                context_type,
                required_snk_strategy,
            )
        });
        if let Some(conf) = found {
            debug!("found: {}", conf.name);
        }
        found.cloned()
    }

    fn configure_device(
        devices: &mut LeAudioDevices,
        handle: DeviceHandle,
        request: &AseActivationRequest,
        active_ase_cnt: &mut usize,
        group_audio_locations_memo: &mut BidirectionalPair<AudioLocations>,
    ) -> bool {
        let Some(device) = devices.get_mut(handle) else {
            return false;
        };
        if !device.is_connected() {
            warn!(
                "Device {}, in the state {:?}",
                device.address.to_loggable_string(), device.get_connection_state()
            );
            return false;
        }
        device.configure_ases(request, active_ase_cnt, group_audio_locations_memo)
    }

    /// Activates member ASEs for `conf`.
    ///
    /// Members supporting `context_type` are used first, then any other
    /// member while the scenario still needs devices. On failure every ASE
    /// of the group is deactivated.
    pub fn configure_ases(
        &mut self,
        devices: &mut LeAudioDevices,
        conf: &AudioSetConfiguration,
        context_type: LeAudioContextType,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> bool {
        let mut num_of_connected = self.num_of_connected(devices, Some(context_type));
        if num_of_connected == 0 {
            num_of_connected = self.num_of_connected(devices, None);
        }
        if !check_if_may_cover_scenario(conf, num_of_connected) {
            return false;
        }

        let reuse_cis_id = self.get_state() == AseState::CodecConfigured;

        // Shared by every member and both directions so that no two ASEs
        // claim the same channel.
        let mut group_audio_locations_memo = BidirectionalPair::<AudioLocations>::default();

        for direction in Direction::BOTH {
            debug!("{}: Looking for requirements: {}", direction, conf.name);
            if conf.confs.get(direction).is_empty() {
                warn!("No {direction} configuration available.");
                continue;
            }

            let request = AseActivationRequest {
                configuration: conf,
                direction,
                context_type,
                metadata_context_types,
                ccid_lists,
                reuse_cis_id,
            };
            let mut required_device_cnt = self.num_of_connected(devices, None);
            let mut active_ase_cnt = 0usize;
            let mut configured: Vec<DeviceHandle> = vec![];

            for &handle in &self.devices {
                if required_device_cnt == 0 {
                    break;
                }
                let supports_context = devices
                    .get(handle)
                    .is_some_and(|d| d.get_supported_contexts(None).test(context_type));
                if !supports_context {
                    continue;
                }
                if Self::configure_device(
                    devices,
                    handle,
                    &request,
                    &mut active_ase_cnt,
                    &mut group_audio_locations_memo,
                ) {
                    configured.push(handle);
                    required_device_cnt -= 1;
                }
            }

            // Members not advertising the context are still needed to cover
            // the scenario. The context stays out of their metadata.
            for &handle in &self.devices {
                if required_device_cnt == 0 {
                    break;
                }
                if configured.contains(&handle) {
                    continue;
                }
                if Self::configure_device(
                    devices,
                    handle,
                    &request,
                    &mut active_ase_cnt,
                    &mut group_audio_locations_memo,
                ) {
                    configured.push(handle);
                    required_device_cnt -= 1;
                }
            }

            if required_device_cnt > 0 {
                error!("group {}: could not configure all the devices", self.group_id);
                self.deactivate(devices);
                return false;
            }
        }

        info!(
            "Chosen ASE Configuration for group: {}, configuration: {}",
            self.group_id, conf.name
        );

        self.configuration_context_type = context_type;
        self.metadata_context_type = metadata_context_types.clone();
        true
    }

    /// Selects the configuration for `context_type` and activates the
    /// member ASEs for it.
    pub fn configure(
        &mut self,
        devices: &mut LeAudioDevices,
        codec_manager: &CodecManager,
        context_type: LeAudioContextType,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> bool {
        let Some(conf) = self.get_configuration(devices, codec_manager, context_type) else {
            error!("requested context type: {context_type}, has no available configuration");
            return false;
        };

        debug!("setting context type: {context_type}");

        if !self.configure_ases(devices, &conf, context_type, metadata_context_types, ccid_lists) {
            error!("requested context type: {context_type}, could not be configured");
            return false;
        }

        // Kept even if the configuration becomes unavailable later on.
        self.stream_conf.conf = Some(conf);
        true
    }

    /// Reactivates the ASEs left codec configured for `context_type` and
    /// assigns them CIS ids. Rolls back if the CIS ids run out.
    pub fn activate(
        &mut self,
        devices: &mut LeAudioDevices,
        context_type: LeAudioContextType,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> bool {
        let mut is_activate = false;
        for handle in self.devices.clone() {
            let Some(device) = devices.get_mut(handle) else { continue };

            let activated =
                device.activate_configured_ases(context_type, metadata_context_types, ccid_lists);
            info!(
                "Device {} is {}",
                device.address.to_loggable_string(),
                if activated { "activated" } else { "not activated" }
            );
            if activated {
                if !self.cig.assign_cis_ids(device) {
                    self.rollback_activation(devices);
                    return false;
                }
                is_activate = true;
            }
        }
        is_activate
    }

    /// Clears the CIS bindings and active flags of every member.
    pub(super) fn rollback_activation(&mut self, devices: &mut LeAudioDevices) {
        for &handle in &self.devices {
            if let Some(device) = devices.get(handle) {
                self.cig.unassign_cis(&device.address);
            }
        }
        self.deactivate(devices);
    }

    pub fn deactivate(&self, devices: &mut LeAudioDevices) {
        for &handle in &self.devices {
            let Some(device) = devices.get_mut(handle) else { continue };
            for ase in device.ases.iter_mut().filter(|ase| ase.active) {
                ase.active = false;
                ase.reconfigure = false;
            }
        }
    }

    pub fn is_metadata_changed(
        &self,
        devices: &LeAudioDevices,
        context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> bool {
        self.active_members(devices)
            .any(|(_, device)| device.is_metadata_changed(context_types, ccid_lists))
    }

    pub fn get_configuration_context_type(&self) -> LeAudioContextType {
        self.configuration_context_type
    }

    pub fn get_metadata_contexts(&self) -> &BidirectionalPair<AudioContexts> {
        &self.metadata_context_type
    }

    /// Reruns the selection for `context_type`, returning true if the cached
    /// configuration changed.
    pub fn update_audio_set_configuration_cache(
        &mut self,
        devices: &LeAudioDevices,
        codec_manager: &CodecManager,
        context_type: LeAudioContextType,
    ) -> bool {
        let new_conf = codec_manager.get_codec_config(context_type, |context_type, confs| {
            self.find_first_supported_configuration(devices, codec_manager, context_type, confs)
        });
        self.configuration_cache.update(context_type, new_conf)
    }

    pub fn invalidate_cached_configurations(&mut self) {
        info!("Group id: {}", self.group_id);
        self.configuration_cache.invalidate_all();
    }

    pub fn get_cached_configuration(
        &self,
        context_type: LeAudioContextType,
    ) -> Option<Arc<AudioSetConfiguration>> {
        self.configuration_cache.get(context_type).cloned()
    }

    pub fn get_active_configuration(&self) -> Option<Arc<AudioSetConfiguration>> {
        self.get_cached_configuration(self.configuration_context_type)
    }

    /// Configuration for `context_type`, refreshing the cache entry first if
    /// it is missing or invalid.
    pub fn get_configuration(
        &mut self,
        devices: &LeAudioDevices,
        codec_manager: &CodecManager,
        context_type: LeAudioContextType,
    ) -> Option<Arc<AudioSetConfiguration>> {
        if context_type == LeAudioContextType::Uninitialized {
            return None;
        }
        if !self.configuration_cache.is_valid(context_type) {
            self.update_audio_set_configuration_cache(devices, codec_manager, context_type);
        }
        self.get_cached_configuration(context_type)
    }

    pub fn is_audio_set_configuration_available(
        &mut self,
        devices: &LeAudioDevices,
        codec_manager: &CodecManager,
        context_type: LeAudioContextType,
    ) -> bool {
        self.get_configuration(devices, codec_manager, context_type).is_some()
    }

    /// Configured for `context_type` with the configuration currently cached
    /// for it.
    pub fn is_configured_for_context(&self, context_type: LeAudioContextType) -> bool {
        if self.configuration_context_type != context_type {
            return false;
        }
        self.stream_conf.is_conf(self.get_active_configuration().as_ref())
    }

    /// PCM level parameters of the cached configuration for `context_type`
    /// in `direction`. `None` if the entries disagree.
    pub fn get_cached_codec_configuration_by_direction(
        &self,
        context_type: LeAudioContextType,
        direction: Direction,
    ) -> Option<LeAudioCodecConfiguration> {
        let audio_set_conf = self.get_cached_configuration(context_type)?;

        let mut group_config = LeAudioCodecConfiguration::default();
        for conf in audio_set_conf.confs.get(direction) {
            let codec = &conf.codec;
            if group_config.sample_rate != 0
                && codec.sampling_frequency_hz() != group_config.sample_rate
            {
                warn!("{direction}: no common stream configuration, sampling frequency differs");
                return None;
            }
            group_config.sample_rate = codec.sampling_frequency_hz();

            if group_config.data_interval_us != 0
                && codec.data_interval_us() != group_config.data_interval_us
            {
                warn!("{direction}: no common stream configuration, data interval differs");
                return None;
            }
            group_config.data_interval_us = codec.data_interval_us();

            if group_config.bits_per_sample != 0
                && codec.bits_per_sample() != group_config.bits_per_sample
            {
                warn!("{direction}: no common stream configuration, bits per sample differs");
                return None;
            }

            if group_config.octets_per_codec_frame != 0
                && codec.octets_per_frame() != group_config.octets_per_codec_frame
            {
                warn!("{direction}: no common stream configuration, octets per frame differs");
                return None;
            }
            group_config.octets_per_codec_frame = codec.octets_per_frame();
            group_config.bits_per_sample = codec.bits_per_sample();

            // Each entry is one ASE somewhere in the set.
            group_config.num_channels =
                group_config.num_channels.saturating_add(codec.channel_count_per_iso_stream);
            group_config.codec = codec.id;
        }

        if group_config.is_invalid() {
            warn!(
                "Sample Rate {}, Channels {}, Data Interval {}, Bits Per Sample {}",
                group_config.sample_rate,
                group_config.num_channels,
                group_config.data_interval_us,
                group_config.bits_per_sample
            );
            return None;
        }
        Some(group_config)
    }

    pub fn get_codec_configuration_by_direction(
        &mut self,
        devices: &LeAudioDevices,
        codec_manager: &CodecManager,
        context_type: LeAudioContextType,
        direction: Direction,
    ) -> Option<LeAudioCodecConfiguration> {
        if !self.configuration_cache.is_valid(context_type) {
            self.update_audio_set_configuration_cache(devices, codec_manager, context_type);
        }
        self.get_cached_codec_configuration_by_direction(context_type, direction)
    }
}
