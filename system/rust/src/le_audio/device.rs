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

//! Model of a single LE Audio peripheral: its ASEs, its published
//! capabilities and the per-device part of ASE configuration.

use std::fmt::Write;

use log::{debug, error, info, warn};

use crate::le_audio::codec::{CodecConfigSetting, PacRecord};
use crate::le_audio::set_configurations::AudioSetConfiguration;
use crate::le_audio::types::{
    AseState, AudioContexts, AudioLocations, BidirectionalPair, CisState, DataPathState,
    DeviceConnectState, Direction, LeAudioConfigurationStrategy, LeAudioContextType,
    GATT_INVALID_CONN_ID, GROUP_UNKNOWN, INVALID_CIS_ID, ISO_CIG_PHY_1M, ISO_CIG_PHY_2M,
    SCA_UNKNOWN,
};
use crate::utils::address::RawAddress;

/// QoS parameters the ASE is configured with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AseQosConfiguration {
    pub sdu_interval: u32,
    pub max_sdu_size: u16,
    pub retrans_nb: u8,
    pub max_transport_latency: u16,
    pub presentation_delay: u32,
    pub phy: u8,
    pub framing: u8,
}

/// QoS preferences the remote reported in its Codec Configured notification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AseQosPreferences {
    pub supported_framing: u8,
    pub preferred_phy: u8,
    pub preferred_retrans_nb: u8,
    pub max_transport_latency: u16,
    pub pres_delay_min: u32,
    pub pres_delay_max: u32,
    pub preferred_pres_delay_min: u32,
    pub preferred_pres_delay_max: u32,
}

/// Audio Stream Endpoint.
#[derive(Clone, Debug)]
pub struct Ase {
    pub id: u8,
    pub direction: Direction,
    pub state: AseState,
    pub cis_state: CisState,
    pub data_path_state: DataPathState,
    pub active: bool,
    pub reconfigure: bool,
    pub cis_id: u8,
    pub cis_conn_hdl: u16,
    pub target_latency: u8,
    pub configured_for_context_type: LeAudioContextType,
    pub codec_config: CodecConfigSetting,
    pub qos_config: AseQosConfiguration,
    pub qos_preferences: AseQosPreferences,
    pub metadata_context_types: AudioContexts,
    pub ccid_list: Vec<u8>,
}

impl Ase {
    pub fn new(id: u8, direction: Direction) -> Self {
        Ase {
            id,
            direction,
            state: AseState::Idle,
            cis_state: CisState::Idle,
            data_path_state: DataPathState::Idle,
            active: false,
            reconfigure: false,
            cis_id: INVALID_CIS_ID,
            cis_conn_hdl: 0,
            target_latency: 0,
            configured_for_context_type: LeAudioContextType::Uninitialized,
            codec_config: CodecConfigSetting::default(),
            qos_config: AseQosConfiguration::default(),
            qos_preferences: AseQosPreferences::default(),
            metadata_context_types: AudioContexts::empty(),
            ccid_list: vec![],
        }
    }

    /// Channel allocation picked for this ASE, or 0.
    pub fn audio_channel_allocation(&self) -> u32 {
        self.codec_config.params.audio_channel_allocation.unwrap_or(0)
    }
}

/// Everything a device needs to activate its ASEs for one direction of an
/// audio set configuration.
pub struct AseActivationRequest<'a> {
    pub configuration: &'a AudioSetConfiguration,
    pub direction: Direction,
    pub context_type: LeAudioContextType,
    pub metadata_context_types: &'a BidirectionalPair<AudioContexts>,
    pub ccid_lists: &'a BidirectionalPair<Vec<u8>>,
    pub reuse_cis_id: bool,
}

/// Picks the channel allocation for a new ASE of a device, claiming it in
/// `group_locations` so other members pick a different one.
pub fn pick_audio_location(
    strategy: LeAudioConfigurationStrategy,
    device_locations: AudioLocations,
    group_locations: &mut AudioLocations,
) -> u32 {
    debug!(
        "strategy: {strategy:?}, locations: {:#x}, input group locations: {:#x}",
        device_locations.bits(), group_locations.bits()
    );

    let is_left_not_yet_assigned = !group_locations.has_left();
    let is_right_not_yet_assigned = !group_locations.has_right();
    let left_device_loc = device_locations.first_left();
    let right_device_loc = device_locations.first_right();

    if left_device_loc.is_empty() && right_device_loc.is_empty() {
        warn!("Can't find device able to render left and right audio channel");
    }

    match strategy {
        LeAudioConfigurationStrategy::MonoOneCisPerDevice
        | LeAudioConfigurationStrategy::StereoTwoCisesPerDevice => {
            if !left_device_loc.is_empty() && is_left_not_yet_assigned {
                *group_locations |= left_device_loc;
                return left_device_loc.bits();
            }
            if !right_device_loc.is_empty() && is_right_not_yet_assigned {
                *group_locations |= right_device_loc;
                return right_device_loc.bits();
            }
        }
        LeAudioConfigurationStrategy::StereoOneCisPerDevice => {
            if !left_device_loc.is_empty() && !right_device_loc.is_empty() {
                *group_locations |= left_device_loc | right_device_loc;
                return (left_device_loc | right_device_loc).bits();
            }
        }
    }

    error!(
        "Can't find device for left/right channel. Strategy: {strategy:?}, device_locations: \
         {:#x}, output group_locations: {:#x}",
        device_locations.bits(),
        group_locations.bits()
    );

    // Either side will do, even if it duplicates a channel already in use.
    (left_device_loc | right_device_loc).bits()
}

#[derive(Clone, Debug)]
pub struct LeAudioDevice {
    pub address: RawAddress,
    pub group_id: i32,
    pub conn_id: u16,
    pub autoconnect_flag: bool,
    connection_state: DeviceConnectState,
    pub ases: Vec<Ase>,
    pub pacs: BidirectionalPair<Vec<PacRecord>>,
    pub audio_locations: BidirectionalPair<AudioLocations>,
    pub supported_contexts: BidirectionalPair<AudioContexts>,
    pub available_contexts: BidirectionalPair<AudioContexts>,
    /// Bitmap of [`Direction`] values the device has PACs for.
    pub audio_directions: u8,
    /// Sleep clock accuracy of the peer, [`SCA_UNKNOWN`] if never read.
    pub sca: u8,
    pub le_2m_phy_supported: bool,
}

impl LeAudioDevice {
    pub fn new(address: RawAddress) -> Self {
        LeAudioDevice {
            address,
            group_id: GROUP_UNKNOWN,
            conn_id: GATT_INVALID_CONN_ID,
            autoconnect_flag: false,
            connection_state: DeviceConnectState::Disconnected,
            ases: vec![],
            pacs: BidirectionalPair::default(),
            audio_locations: BidirectionalPair::default(),
            supported_contexts: BidirectionalPair::default(),
            available_contexts: BidirectionalPair::default(),
            audio_directions: 0,
            sca: SCA_UNKNOWN,
            le_2m_phy_supported: false,
        }
    }

    pub fn get_connection_state(&self) -> DeviceConnectState {
        self.connection_state
    }

    pub fn set_connection_state(&mut self, state: DeviceConnectState) {
        debug!(
            "{}: {:?} -> {:?}",
            self.address.to_loggable_string(), self.connection_state, state
        );
        self.connection_state = state;
    }

    /// Connected on the profile level.
    pub fn is_connected(&self) -> bool {
        self.conn_id != GATT_INVALID_CONN_ID
            && self.connection_state == DeviceConnectState::Connected
    }

    /// Supported contexts in `direction`, or in both when `None`.
    pub fn get_supported_contexts(&self, direction: Option<Direction>) -> AudioContexts {
        match direction {
            Some(direction) => *self.supported_contexts.get(direction),
            None => self.supported_contexts.sink | self.supported_contexts.source,
        }
    }

    /// Available contexts in `direction`, or in both when `None`.
    pub fn get_available_contexts(&self, direction: Option<Direction>) -> AudioContexts {
        match direction {
            Some(direction) => *self.available_contexts.get(direction),
            None => self.available_contexts.sink | self.available_contexts.source,
        }
    }

    pub fn get_phy_bitmask(&self) -> u8 {
        ISO_CIG_PHY_1M | if self.le_2m_phy_supported { ISO_CIG_PHY_2M } else { 0 }
    }

    pub fn get_ase_count(&self, direction: Direction) -> usize {
        self.ases.iter().filter(|ase| ase.direction == direction).count()
    }

    pub fn have_active_ase(&self) -> bool {
        self.ases.iter().any(|ase| ase.active)
    }

    pub fn active_ases(&self, direction: Direction) -> impl Iterator<Item = &Ase> + '_ {
        self.ases.iter().filter(move |ase| ase.active && ase.direction == direction)
    }

    pub fn get_first_active_ase(&self) -> Option<usize> {
        self.ases.iter().position(|ase| ase.active)
    }

    pub fn get_first_active_ase_by_direction(&self, direction: Direction) -> Option<usize> {
        self.ases.iter().position(|ase| ase.active && ase.direction == direction)
    }

    /// First inactive ASE of `direction`. With `reuse_cis_id`, ASEs still
    /// carrying a CIS id from a previous configuration are preferred.
    pub fn get_first_inactive_ase(
        &self,
        direction: Direction,
        reuse_cis_id: bool,
    ) -> Option<usize> {
        let inactive = |ase: &&Ase| !ase.active && ase.direction == direction;
        if reuse_cis_id {
            if let Some(idx) =
                self.ases.iter().position(|ase| inactive(&ase) && ase.cis_id != INVALID_CIS_ID)
            {
                return Some(idx);
            }
        }
        self.ases.iter().position(|ase| inactive(&ase))
    }

    fn next_active_ase_after(&self, base: usize, same_direction: bool) -> Option<usize> {
        let base_direction = self.ases.get(base)?.direction;
        self.ases
            .iter()
            .enumerate()
            .skip(base + 1)
            .find(|(_, ase)| ase.active && (ase.direction == base_direction) == same_direction)
            .map(|(idx, _)| idx)
    }

    pub fn get_next_active_ase_with_same_direction(&self, base: usize) -> Option<usize> {
        self.next_active_ase_after(base, true)
    }

    pub fn get_next_active_ase_with_different_direction(&self, base: usize) -> Option<usize> {
        self.next_active_ase_after(base, false)
    }

    /// Sink and source ASE using CIS `cis_id`.
    pub fn get_ases_by_cis_id(&self, cis_id: u8) -> BidirectionalPair<Option<usize>> {
        let mut pair = BidirectionalPair::default();
        for (idx, ase) in self.ases.iter().enumerate() {
            if ase.cis_id == cis_id {
                *pair.get_mut(ase.direction) = Some(idx);
            }
        }
        pair
    }

    /// Sink and source ASE bound to connection handle `cis_conn_hdl`.
    pub fn get_ases_by_cis_conn_hdl(&self, cis_conn_hdl: u16) -> BidirectionalPair<Option<usize>> {
        let mut pair = BidirectionalPair::default();
        for (idx, ase) in self.ases.iter().enumerate() {
            if ase.cis_conn_hdl == cis_conn_hdl {
                *pair.get_mut(ase.direction) = Some(idx);
            }
        }
        pair
    }

    pub fn get_first_active_ase_by_cis_and_data_path_state(
        &self,
        cis_state: CisState,
        data_path_state: DataPathState,
    ) -> Option<usize> {
        self.ases.iter().position(|ase| {
            ase.active && ase.cis_state == cis_state && ase.data_path_state == data_path_state
        })
    }

    pub fn have_any_unconfigured_ases(&self) -> bool {
        self.ases.iter().any(|ase| {
            ase.active
                && (ase.state == AseState::Idle
                    || (ase.state == AseState::CodecConfigured && ase.reconfigure))
        })
    }

    pub fn have_all_active_ases_same_state(&self, state: AseState) -> bool {
        self.ases.iter().filter(|ase| ase.active).all(|ase| ase.state == state)
    }

    pub fn have_any_cis_connected(&self) -> bool {
        self.ases
            .iter()
            .any(|ase| matches!(ase.cis_state, CisState::Connecting | CisState::Connected))
    }

    pub fn is_ready_to_create_stream(&self) -> bool {
        self.ases.iter().filter(|ase| ase.active).all(|ase| match ase.direction {
            Direction::Sink => matches!(ase.state, AseState::Streaming | AseState::Enabling),
            Direction::Source => ase.state == AseState::Enabling,
        })
    }

    pub fn is_ready_to_suspend_stream(&self) -> bool {
        self.ases.iter().filter(|ase| ase.active).all(|ase| ase.state == AseState::QosConfigured)
    }

    pub fn is_ready_to_stream(&self) -> bool {
        self.ases.iter().filter(|ase| ase.active).all(|ase| {
            ase.cis_state == CisState::Connected && ase.data_path_state == DataPathState::Configured
        })
    }

    /// Channel count bitmap of the first PAC in `direction`, 0 without PACs.
    pub fn get_supported_audio_channel_counts(&self, direction: Direction) -> u8 {
        let pacs = self.pacs.get(direction);
        if pacs.is_empty() {
            error!("{}: missing PAC for direction {direction}", self.address.to_loggable_string());
            return 0;
        }
        for pac in pacs {
            if !pac.codec_id.uses_ltv_format() {
                warn!("Unknown codec PAC record, coding format {:#x}", pac.codec_id.coding_format);
                continue;
            }
            return pac.channel_counts();
        }
        0
    }

    pub fn get_codec_configuration_supported_pac(
        &self,
        direction: Direction,
        setting: &CodecConfigSetting,
    ) -> Option<&PacRecord> {
        self.pacs.get(direction).iter().find(|pac| pac.supports(setting))
    }

    fn filtered_metadata(
        &self,
        direction: Direction,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> (AudioContexts, Vec<u8>) {
        let directional_contexts =
            *metadata_context_types.get(direction) & *self.available_contexts.get(direction);
        if directional_contexts.is_empty() {
            (AudioContexts::UNSPECIFIED, vec![])
        } else {
            (directional_contexts, ccid_lists.get(direction).clone())
        }
    }

    fn set_metadata_to_ase(
        &mut self,
        idx: usize,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) {
        let Some(direction) = self.ases.get(idx).map(|ase| ase.direction) else {
            return;
        };
        let (contexts, ccids) =
            self.filtered_metadata(direction, metadata_context_types, ccid_lists);
        let ase = &mut self.ases[idx];
        ase.metadata_context_types = contexts;
        ase.ccid_list = ccids;
    }

    /// True if any active ASE would get different metadata for the given
    /// contexts and CCIDs.
    pub fn is_metadata_changed(
        &self,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> bool {
        self.ases.iter().filter(|ase| ase.active).any(|ase| {
            let (contexts, ccids) =
                self.filtered_metadata(ase.direction, metadata_context_types, ccid_lists);
            ase.metadata_context_types != contexts || ase.ccid_list != ccids
        })
    }

    /// Activates this device's ASEs for one direction of a configuration.
    ///
    /// `number_of_already_active_group_ase` counts the ASEs of the direction
    /// already activated across the group and is advanced by the ASEs
    /// activated here. `group_audio_locations_memo` collects the channel
    /// allocations claimed so far.
    pub fn configure_ases(
        &mut self,
        request: &AseActivationRequest,
        number_of_already_active_group_ase: &mut usize,
        group_audio_locations_memo: &mut BidirectionalPair<AudioLocations>,
    ) -> bool {
        let direction = request.direction;
        let mut current = match self.get_first_active_ase_by_direction(direction) {
            Some(idx) => {
                info!("Using an already active ASE id={}", self.ases[idx].id);
                Some(idx)
            }
            None => self.get_first_inactive_ase(direction, request.reuse_cis_id),
        };

        if current.is_none() {
            error!("{}: unable to find an ASE to configure", self.address.to_loggable_string());
            return false;
        }

        let configuration = request.configuration;
        let ase_confs = configuration.confs.get(direction);
        let strategy = *configuration.topology_info.strategy.get(direction);
        let device_count =
            usize::from(*configuration.topology_info.device_count.get(direction)).max(1);
        let audio_locations = *self.audio_locations.get(direction);

        let max_required_ase_per_dev = ase_confs.len().div_ceil(device_count);
        let mut active_ases = *number_of_already_active_group_ase;
        let mut needed_ase =
            max_required_ase_per_dev.min(ase_confs.len().saturating_sub(active_ases));

        while needed_ase > 0 {
            let (Some(idx), Some(requirement)) = (current, ase_confs.get(active_ases)) else {
                break;
            };

            if self.get_codec_configuration_supported_pac(direction, &requirement.codec).is_none() {
                warn!(
                    "{}: no PAC for {} requirement of {}",
                    self.address.to_loggable_string(), direction, configuration.name
                );
                return false;
            }

            let ase = &mut self.ases[idx];
            ase.active = true;
            ase.configured_for_context_type = request.context_type;
            active_ases += 1;

            // A late joiner may already be streaming; it only needs to be
            // counted as active.
            if ase.state != AseState::Streaming {
                if ase.state == AseState::CodecConfigured {
                    ase.reconfigure = true;
                }

                ase.target_latency = requirement.qos.target_latency;
                ase.codec_config = requirement.codec.clone();
                ase.codec_config.params.audio_channel_allocation = Some(pick_audio_location(
                    strategy,
                    audio_locations,
                    group_audio_locations_memo.get_mut(direction),
                ));

                ase.qos_config.sdu_interval = requirement.qos.sdu_interval_us;
                ase.qos_config.max_sdu_size = requirement.qos.max_sdu;
                ase.qos_config.retrans_nb = requirement.qos.retransmission_number;
                ase.qos_config.max_transport_latency = requirement.qos.max_transport_latency;
            }

            info!(
                "{}: ase id {} activated for {}, allocation {:#x}",
                self.address.to_loggable_string(),
                ase.id,
                request.context_type,
                ase.audio_channel_allocation()
            );

            self.set_metadata_to_ase(idx, request.metadata_context_types, request.ccid_lists);
            needed_ase -= 1;
            current = self.get_first_inactive_ase(direction, request.reuse_cis_id);
        }

        *number_of_already_active_group_ase = active_ases;
        true
    }

    /// Reactivates ASEs left codec configured for `context_type`.
    pub fn activate_configured_ases(
        &mut self,
        context_type: LeAudioContextType,
        metadata_context_types: &BidirectionalPair<AudioContexts>,
        ccid_lists: &BidirectionalPair<Vec<u8>>,
    ) -> bool {
        if self.conn_id == GATT_INVALID_CONN_ID {
            warn!("{}: device not connected", self.address.to_loggable_string());
            return false;
        }

        let mut activated = false;
        for idx in 0..self.ases.len() {
            let ase = &mut self.ases[idx];
            if ase.state != AseState::CodecConfigured
                || ase.configured_for_context_type != context_type
            {
                continue;
            }
            info!(
                "conn_id: {:#x}, ase id {}, cis id {}, cis_handle {:#06x} is activated",
                self.conn_id, ase.id, ase.cis_id, ase.cis_conn_hdl
            );
            ase.active = true;
            activated = true;
            self.set_metadata_to_ase(idx, metadata_context_types, ccid_lists);
        }
        activated
    }

    /// Returns every ASE to the idle, unbound state.
    pub fn deactivate_all_ases(&mut self) {
        for ase in &mut self.ases {
            if !ase.active
                && ase.cis_state != CisState::Idle
                && ase.data_path_state != DataPathState::Idle
            {
                warn!(
                    "ase id {} inactive but cis state {:?}, data path state {:?}",
                    ase.id, ase.cis_state, ase.data_path_state
                );
            }
            ase.state = AseState::Idle;
            ase.cis_state = CisState::Idle;
            ase.data_path_state = DataPathState::Idle;
            ase.active = false;
            ase.reconfigure = false;
            ase.cis_id = INVALID_CIS_ID;
            ase.cis_conn_hdl = 0;
        }
    }

    /// Whether this device alone can take its share of `configuration`.
    pub fn is_audio_set_configuration_supported(
        &self,
        configuration: &AudioSetConfiguration,
    ) -> bool {
        Direction::BOTH.iter().all(|&direction| {
            configuration
                .confs
                .get(direction)
                .iter()
                .all(|ase| {
                    self.get_codec_configuration_supported_pac(direction, &ase.codec).is_some()
                })
        })
    }

    pub fn dump(&self, out: &mut String) {
        let _ = write!(
            out,
            "\n      address: {}, state: {:?}, conn_id: {:#x}, autoconnect: {}, sca: {}\
             \n        snk locations: {:#x}, src locations: {:#x}\
             \n        supported contexts: {}, available contexts: {}",
            self.address.to_loggable_string(),
            self.connection_state,
            self.conn_id,
            self.autoconnect_flag,
            self.sca,
            self.audio_locations.sink.bits(),
            self.audio_locations.source.bits(),
            self.get_supported_contexts(None),
            self.get_available_contexts(None),
        );
        for ase in &self.ases {
            let _ = write!(
                out,
                "\n        ase id: {}, {}, active: {}, state: {:?}, cis id: {}, cis handle: {:#x}, \
                 cis state: {:?}, data path: {:?}, allocation: {:#x}",
                ase.id,
                ase.direction,
                ase.active,
                ase.state,
                ase.cis_id,
                ase.cis_conn_hdl,
                ase.cis_state,
                ase.data_path_state,
                ase.audio_channel_allocation(),
            );
        }
    }
}
