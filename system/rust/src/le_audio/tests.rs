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

use std::sync::Arc;

use crate::le_audio::codec::{CodecId, FrameDurations, PacRecord, SamplingFrequencies};
use crate::le_audio::codec_manager::{CodecLocation, CodecManager};
use crate::le_audio::device::{Ase, LeAudioDevice};
use crate::le_audio::devices::{DeviceHandle, LeAudioDevices};
use crate::le_audio::error::LeAudioError;
use crate::le_audio::group::{ConfigurationCache, LeAudioDeviceGroup};
use crate::le_audio::groups::LeAudioDeviceGroups;
use crate::le_audio::interfaces::{
    BleConnectionType, ControllerInterface, CsisClient, GattConnector,
};
use crate::le_audio::set_configurations::{CisCount, StaticConfigurationProvider};
use crate::le_audio::types::*;
use crate::utils::address::RawAddress;

struct FixedSetSize(usize);

impl CsisClient for FixedSetSize {
    fn get_desired_size(&self, _group_id: i32) -> Option<usize> {
        Some(self.0)
    }
}

struct Controller {
    le_2m_phy: bool,
}

impl ControllerInterface for Controller {
    fn supports_ble_2m_phy(&self) -> bool {
        self.le_2m_phy
    }
}

#[derive(Debug, PartialEq)]
enum GattCall {
    Open(RawAddress, BleConnectionType),
    CancelOpen(RawAddress),
    SetAutoconnect(RawAddress, bool),
}

#[derive(Default)]
struct RecordingConnector {
    calls: Vec<GattCall>,
}

impl GattConnector for RecordingConnector {
    fn open(&mut self, _gatt_if: u8, address: RawAddress, connection_type: BleConnectionType) {
        self.calls.push(GattCall::Open(address, connection_type));
    }
    fn cancel_open(&mut self, _gatt_if: u8, address: RawAddress) {
        self.calls.push(GattCall::CancelOpen(address));
    }
    fn set_autoconnect(&mut self, address: RawAddress, autoconnect: bool) {
        self.calls.push(GattCall::SetAutoconnect(address, autoconnect));
    }
}

const GROUP_ID: i32 = 1;
const LEFT: AudioLocations = AudioLocations::FRONT_LEFT;
const RIGHT: AudioLocations = AudioLocations::FRONT_RIGHT;

fn lc3_pac(channel_counts: u8) -> PacRecord {
    PacRecord {
        codec_id: CodecId::LC3,
        sampling_frequencies: SamplingFrequencies::HZ_16000
            | SamplingFrequencies::HZ_32000
            | SamplingFrequencies::HZ_48000,
        frame_durations: FrameDurations::US_10000,
        supported_channel_counts: Some(channel_counts),
        octets_per_frame_min: 20,
        octets_per_frame_max: 155,
        max_codec_frames_per_sdu: 1,
    }
}

/// A connected device with mono channel support on both directions.
fn connected_device(
    last_octet: u8,
    locations: AudioLocations,
    sink_ases: u8,
    source_ases: u8,
) -> LeAudioDevice {
    let address = RawAddress::new([last_octet, 0x11, 0x22, 0x33, 0x44, 0x55]);
    let mut device = LeAudioDevice::new(address);
    device.conn_id = u16::from(last_octet);
    device.set_connection_state(DeviceConnectState::Connected);
    device.le_2m_phy_supported = true;
    device.sca = ISO_SCA_0_TO_20_PPM;

    for id in 0..sink_ases {
        device.ases.push(Ase::new(id + 1, Direction::Sink));
    }
    for id in 0..source_ases {
        device.ases.push(Ase::new(sink_ases + id + 1, Direction::Source));
    }

    let sink_contexts = AudioContexts::MEDIA | AudioContexts::CONVERSATIONAL | AudioContexts::GAME;
    let source_contexts = AudioContexts::CONVERSATIONAL | AudioContexts::GAME;
    if sink_ases > 0 {
        device.pacs.sink.push(lc3_pac(0b01));
        device.audio_locations.sink = locations;
        device.supported_contexts.sink = sink_contexts;
        device.available_contexts.sink = sink_contexts;
        device.audio_directions |= Direction::Sink as u8;
    }
    if source_ases > 0 {
        device.pacs.source.push(lc3_pac(0b01));
        device.audio_locations.source = locations;
        device.supported_contexts.source = source_contexts;
        device.available_contexts.source = source_contexts;
        device.audio_directions |= Direction::Source as u8;
    }
    device
}

fn default_codec_manager() -> CodecManager {
    CodecManager::new(Box::new(StaticConfigurationProvider::with_default_catalog()))
}

struct Fixture {
    devices: LeAudioDevices,
    group: LeAudioDeviceGroup,
    codec_manager: CodecManager,
    handles: Vec<DeviceHandle>,
}

impl Fixture {
    fn new(members: Vec<LeAudioDevice>) -> Self {
        let mut devices = LeAudioDevices::new();
        let mut group = LeAudioDeviceGroup::new(GROUP_ID);
        let mut handles = vec![];
        for device in members {
            let handle = devices.add(device);
            group.add_node(&mut devices, handle);
            handles.push(handle);
        }
        group.reload_audio_locations(&devices);
        group.reload_audio_directions(&devices);
        group.update_audio_context_availability(&devices);

        let codec_manager = default_codec_manager()
            .with_codec_location(CodecLocation::Host)
            .with_dual_bidir_swb_supported(false);
        Fixture { devices, group, codec_manager, handles }
    }

    fn earbuds() -> Self {
        Self::new(vec![connected_device(1, LEFT, 2, 1), connected_device(2, RIGHT, 2, 1)])
    }

    fn device(&self, idx: usize) -> &LeAudioDevice {
        self.devices.get(self.handles[idx]).unwrap()
    }

    fn device_mut(&mut self, idx: usize) -> &mut LeAudioDevice {
        self.devices.get_mut(self.handles[idx]).unwrap()
    }

    fn configure(&mut self, context_type: LeAudioContextType) -> bool {
        let metadata = BidirectionalPair::new(context_type.into(), context_type.into());
        let ccids = BidirectionalPair::default();
        self.group.configure(
            &mut self.devices,
            &self.codec_manager,
            context_type,
            &metadata,
            &ccids,
        )
    }

    fn active_sink_allocations(&self, idx: usize) -> Vec<u32> {
        self.device(idx).active_ases(Direction::Sink).map(Ase::audio_channel_allocation).collect()
    }

    fn configure_and_bind_cises(&mut self, context_type: LeAudioContextType, handles: &[u16]) {
        assert!(self.configure(context_type));
        let csis = FixedSetSize(self.handles.len());
        self.group.generate_cis_ids(&self.devices, Some(&csis), context_type);
        assert!(self.group.assign_cis_ids_to_active_devices(&mut self.devices));
        assert_eq!(self.group.assign_cis_conn_handles(handles), Ok(()));
        self.group.assign_cis_conn_handles_to_ases(&mut self.devices);
    }
}

#[test]
fn test_sink_strategy_follows_group_layout() {
    let fixture = Fixture::earbuds();
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::MonoOneCisPerDevice
    );

    let fixture = Fixture::new(vec![connected_device(1, LEFT, 2, 0)]);
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::MonoOneCisPerDevice
    );

    let fixture = Fixture::new(vec![connected_device(1, LEFT | RIGHT, 2, 0)]);
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::StereoTwoCisesPerDevice
    );

    let mut headset = connected_device(1, LEFT | RIGHT, 2, 0);
    headset.pacs.sink = vec![lc3_pac(0b11)];
    let fixture = Fixture::new(vec![headset]);
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::StereoOneCisPerDevice
    );
}

#[test]
fn test_sink_strategy_is_memoized_until_invalidated() {
    let mut fixture = Fixture::new(vec![connected_device(1, LEFT | RIGHT, 2, 0)]);
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::StereoTwoCisesPerDevice
    );

    fixture.device_mut(0).pacs.sink = vec![lc3_pac(0b11)];
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::StereoTwoCisesPerDevice
    );

    fixture.group.invalidate_group_strategy();
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::StereoOneCisPerDevice
    );
}

#[test]
fn test_selected_configuration_matches_group_strategy() {
    let scenarios = [
        (vec![connected_device(1, LEFT | RIGHT, 2, 0)], vec![LeAudioContextType::Media]),
        (
            vec![connected_device(1, LEFT, 2, 1), connected_device(2, RIGHT, 2, 1)],
            vec![LeAudioContextType::Media, LeAudioContextType::Conversational],
        ),
        (
            vec![connected_device(1, LEFT, 1, 1)],
            vec![LeAudioContextType::Media, LeAudioContextType::Conversational],
        ),
    ];
    for (members, context_types) in scenarios {
        let fixture = Fixture::new(members);
        let strategy = fixture.group.get_group_sink_strategy(&fixture.devices);
        for context_type in context_types {
            let conf = fixture
                .codec_manager
                .get_codec_config(context_type, |context_type, confs| {
                    fixture.group.find_first_supported_configuration(
                        &fixture.devices,
                        &fixture.codec_manager,
                        context_type,
                        confs,
                    )
                })
                .unwrap();
            assert_eq!(conf.topology_info.strategy.sink, strategy, "{}", conf.name);
        }
    }
}

#[test]
fn test_sink_only_device_has_no_conversational_configuration() {
    let mut fixture = Fixture::new(vec![connected_device(1, LEFT | RIGHT, 2, 0)]);
    assert!(!fixture.group.is_audio_set_configuration_available(
        &fixture.devices,
        &fixture.codec_manager,
        LeAudioContextType::Conversational
    ));
    assert!(!fixture.configure(LeAudioContextType::Conversational));
    assert!(!fixture.device(0).have_active_ase());
}

#[test]
fn test_single_stereo_device_gets_two_cises() {
    let mut fixture = Fixture::new(vec![connected_device(1, LEFT | RIGHT, 2, 0)]);
    assert!(fixture.configure(LeAudioContextType::Media));
    assert_eq!(
        fixture.group.stream_conf.conf.as_ref().unwrap().name,
        "SingleDev_OneChanStereoSnk_48_4"
    );
    assert_eq!(fixture.active_sink_allocations(0), vec![LEFT.bits(), RIGHT.bits()]);

    fixture.group.generate_cis_ids(&fixture.devices, None, LeAudioContextType::Media);
    let types: Vec<_> = fixture.group.cig.cises.iter().map(|cis| cis.cis_type).collect();
    assert_eq!(types, vec![CisType::UnidirectionalSink, CisType::UnidirectionalSink]);

    assert!(fixture.group.assign_cis_ids_to_active_devices(&mut fixture.devices));
    let cis_ids: Vec<_> =
        fixture.device(0).active_ases(Direction::Sink).map(|ase| ase.cis_id).collect();
    assert_eq!(cis_ids, vec![0, 1]);
}

#[test]
fn test_earbuds_get_one_sink_cis_each() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    assert_eq!(
        fixture.group.stream_conf.conf.as_ref().unwrap().name,
        "DualDev_OneChanStereoSnk_48_4"
    );
    assert_eq!(fixture.active_sink_allocations(0), vec![LEFT.bits()]);
    assert_eq!(fixture.active_sink_allocations(1), vec![RIGHT.bits()]);

    fixture.group.generate_cis_ids(
        &fixture.devices,
        Some(&FixedSetSize(2)),
        LeAudioContextType::Media,
    );
    let types: Vec<_> = fixture.group.cig.cises.iter().map(|cis| (cis.id, cis.cis_type)).collect();
    assert_eq!(types, vec![(0, CisType::UnidirectionalSink), (1, CisType::UnidirectionalSink)]);

    assert!(fixture.group.assign_cis_ids_to_active_devices(&mut fixture.devices));
    assert_eq!(fixture.group.cig.cises[0].addr, Some(fixture.device(0).address));
    assert_eq!(fixture.group.cig.cises[1].addr, Some(fixture.device(1).address));
    assert_eq!(fixture.device(0).active_ases(Direction::Sink).next().unwrap().cis_id, 0);
    assert_eq!(fixture.device(1).active_ases(Direction::Sink).next().unwrap().cis_id, 1);
}

#[test]
fn test_stereo_capable_pair_gets_one_sink_cis_per_member() {
    let mut fixture = Fixture::new(vec![
        connected_device(1, LEFT | RIGHT, 2, 0),
        connected_device(2, LEFT | RIGHT, 2, 0),
    ]);
    // More than one member always means one mono CIS per device.
    assert_eq!(
        fixture.group.get_group_sink_strategy(&fixture.devices),
        LeAudioConfigurationStrategy::MonoOneCisPerDevice
    );

    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x40, 0x41]);
    assert_eq!(fixture.active_sink_allocations(0), vec![LEFT.bits()]);
    assert_eq!(fixture.active_sink_allocations(1), vec![RIGHT.bits()]);
    assert!(fixture.group.cig.cises.iter().all(|cis| cis.cis_type == CisType::UnidirectionalSink));
    assert_eq!(fixture.group.cig.cises[0].addr, Some(fixture.device(0).address));
    assert_eq!(fixture.group.cig.cises[1].addr, Some(fixture.device(1).address));
}

#[test]
fn test_generate_cis_ids_is_idempotent() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    fixture.group.generate_cis_ids(
        &fixture.devices,
        Some(&FixedSetSize(2)),
        LeAudioContextType::Media,
    );
    let before = fixture.group.cig.cises.clone();

    fixture.group.generate_cis_ids(
        &fixture.devices,
        Some(&FixedSetSize(2)),
        LeAudioContextType::Conversational,
    );
    assert_eq!(fixture.group.cig.cises, before);

    fixture.group.clear_all_cises(&mut fixture.codec_manager);
    assert!(fixture.group.cig.cises.is_empty());
}

#[test]
fn test_conversational_single_device_shares_bidirectional_cis() {
    let mut fixture = Fixture::new(vec![connected_device(1, LEFT, 1, 1)]);
    assert!(fixture.configure(LeAudioContextType::Conversational));
    assert_eq!(
        fixture.group.stream_conf.conf.as_ref().unwrap().name,
        "SingleDev_OneChanMonoSnk_OneChanMonoSrc_16_2"
    );

    fixture.group.generate_cis_ids(&fixture.devices, None, LeAudioContextType::Conversational);
    assert_eq!(fixture.group.cig.cises.len(), 1);
    assert_eq!(fixture.group.cig.cises[0].cis_type, CisType::Bidirectional);

    assert!(fixture.group.assign_cis_ids_to_active_devices(&mut fixture.devices));
    let device = fixture.device(0);
    assert!(device.ases.iter().all(|ase| ase.active && ase.cis_id == 0));
}

#[test]
fn test_conn_handles_propagate_to_active_ases() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);

    for (idx, handle) in [(0, 0x60), (1, 0x61)] {
        let device = fixture.device(idx);
        for ase in device.ases.iter().filter(|ase| ase.active) {
            assert_eq!(ase.cis_conn_hdl, handle);
            assert_eq!(ase.cis_state, CisState::Assigned);
            assert_eq!(fixture.group.cig.cises[usize::from(ase.cis_id)].conn_handle, handle);
        }
        assert!(device
            .ases
            .iter()
            .filter(|ase| !ase.active)
            .all(|ase| ase.cis_state == CisState::Idle));
    }
}

#[test]
fn test_wrong_handle_count_is_rejected() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    fixture.group.generate_cis_ids(
        &fixture.devices,
        Some(&FixedSetSize(2)),
        LeAudioContextType::Media,
    );

    assert_eq!(
        fixture.group.assign_cis_conn_handles(&[0x60, 0x61, 0x62]),
        Err(LeAudioError::CisHandleCountMismatch { expected: 2, actual: 3 })
    );
    assert!(fixture.group.cig.cises.iter().all(|cis| cis.conn_handle == 0));
}

#[test]
fn test_members_without_the_context_still_cover_the_scenario() {
    let mut left = connected_device(1, LEFT, 2, 0);
    let mut right = connected_device(2, RIGHT, 2, 0);
    for device in [&mut left, &mut right] {
        device.supported_contexts.sink = AudioContexts::CONVERSATIONAL;
        device.available_contexts.sink = AudioContexts::CONVERSATIONAL;
    }
    let mut fixture = Fixture::new(vec![left, right]);
    assert_eq!(
        fixture.group.num_of_connected(&fixture.devices, Some(LeAudioContextType::Media)),
        0
    );

    assert!(fixture.configure(LeAudioContextType::Media));
    for idx in 0..2 {
        let ase = fixture.device(idx).active_ases(Direction::Sink).next().unwrap();
        assert_eq!(ase.configured_for_context_type, LeAudioContextType::Media);
        assert_eq!(ase.metadata_context_types, AudioContexts::UNSPECIFIED);
    }
}

#[test]
fn test_failed_member_rolls_back_whole_group() {
    // The right earbud only handles 16 kHz, so it cannot take its share.
    let mut right = connected_device(2, RIGHT, 2, 1);
    right.pacs.sink[0].sampling_frequencies = SamplingFrequencies::HZ_16000;
    let mut fixture = Fixture::new(vec![connected_device(1, LEFT, 2, 1), right]);

    let conf = fixture
        .codec_manager
        .get_codec_config(LeAudioContextType::Media, |_, confs| confs.first().cloned())
        .unwrap();
    assert_eq!(conf.name, "DualDev_OneChanStereoSnk_48_4");

    let metadata = BidirectionalPair::new(AudioContexts::MEDIA, AudioContexts::empty());
    assert!(!fixture.group.configure_ases(
        &mut fixture.devices,
        &conf,
        LeAudioContextType::Media,
        &metadata,
        &BidirectionalPair::default()
    ));
    assert!(!fixture.device(0).have_active_ase());
    assert!(!fixture.device(1).have_active_ase());
    assert_eq!(fixture.group.get_configuration_context_type(), LeAudioContextType::Uninitialized);
}

#[test]
fn test_cis_exhaustion_releases_all_bindings() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    fixture.group.cig.generate_cis_ids(CisCount {
        bidirectional: 0,
        unidirectional_sink: 1,
        unidirectional_source: 0,
    });

    assert!(!fixture.group.assign_cis_ids_to_active_devices(&mut fixture.devices));
    assert!(fixture.group.cig.cises.iter().all(|cis| cis.addr.is_none()));
    assert!(!fixture.device(0).have_active_ase());
    assert!(!fixture.device(1).have_active_ase());
}

#[test]
fn test_activate_reuses_codec_configured_ases() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    for idx in 0..2 {
        for ase in fixture.device_mut(idx).ases.iter_mut().filter(|ase| ase.active) {
            ase.state = AseState::CodecConfigured;
        }
    }
    fixture.group.deactivate(&mut fixture.devices);
    assert!(fixture.group.get_first_active_device(&fixture.devices).is_none());

    let metadata = BidirectionalPair::new(AudioContexts::MEDIA, AudioContexts::empty());
    let ccids = BidirectionalPair::new(vec![7], vec![]);
    assert!(!fixture.group.activate(
        &mut fixture.devices,
        LeAudioContextType::Game,
        &metadata,
        &ccids
    ));
    assert!(fixture.group.activate(
        &mut fixture.devices,
        LeAudioContextType::Media,
        &metadata,
        &ccids
    ));

    let ase = fixture.device(0).active_ases(Direction::Sink).next().unwrap();
    assert_eq!(ase.cis_id, 0);
    assert_eq!(ase.ccid_list, vec![7]);
    assert!(!fixture.group.is_metadata_changed(&fixture.devices, &metadata, &ccids));
    let other =
        BidirectionalPair::new(AudioContexts::MEDIA | AudioContexts::GAME, AudioContexts::empty());
    assert!(fixture.group.is_metadata_changed(&fixture.devices, &other, &ccids));
}

#[test]
fn test_activate_without_cis_slots_rolls_back() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    for idx in 0..2 {
        for ase in fixture.device_mut(idx).ases.iter_mut().filter(|ase| ase.active) {
            ase.state = AseState::CodecConfigured;
        }
    }
    fixture.group.deactivate(&mut fixture.devices);

    let metadata = BidirectionalPair::new(AudioContexts::MEDIA, AudioContexts::empty());
    assert!(!fixture.group.activate(
        &mut fixture.devices,
        LeAudioContextType::Media,
        &metadata,
        &BidirectionalPair::default()
    ));
    assert!(fixture.group.get_first_active_device(&fixture.devices).is_none());
}

#[test]
fn test_codec_configured_group_reuses_ases_with_cis_ids() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    let cis_ids: Vec<u8> = (0..2).map(|idx| fixture.device(idx).ases[0].cis_id).collect();
    assert!(cis_ids.iter().all(|&cis_id| cis_id != INVALID_CIS_ID));

    // Leave the ids on the second sink ASE of each member, as if the last
    // configuration had used that one.
    fixture.group.deactivate(&mut fixture.devices);
    for (idx, &cis_id) in cis_ids.iter().enumerate() {
        let device = fixture.device_mut(idx);
        device.ases[0].cis_id = INVALID_CIS_ID;
        device.ases[1].cis_id = cis_id;
    }

    fixture.group.set_state(AseState::CodecConfigured);
    assert!(fixture.configure(LeAudioContextType::Media));
    for (idx, &cis_id) in cis_ids.iter().enumerate() {
        let device = fixture.device(idx);
        assert_eq!(device.get_first_active_ase_by_direction(Direction::Sink), Some(1));
        assert!(!device.ases[0].active);
        assert_eq!(device.ases[1].cis_id, cis_id);
    }

    // Without a codec configured group the first inactive ASE is taken.
    fixture.group.deactivate(&mut fixture.devices);
    fixture.group.set_state(AseState::Idle);
    assert!(fixture.configure(LeAudioContextType::Media));
    for idx in 0..2 {
        let device = fixture.device(idx);
        assert_eq!(device.get_first_active_ase_by_direction(Direction::Sink), Some(0));
    }
}

#[test]
fn test_disconnecting_member_leaves_remaining_stream() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    let (left, right) = (fixture.handles[0], fixture.handles[1]);
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        left,
        0x60,
    );
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        right,
        0x61,
    );
    // Adding the same CIS again changes nothing.
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        right,
        0x61,
    );

    let sink = &fixture.group.stream_conf.stream_params.sink;
    assert_eq!(sink.num_of_devices, 2);
    assert_eq!(sink.num_of_channels, 2);
    assert_eq!(sink.audio_channel_allocation, (LEFT | RIGHT).bits());
    assert_eq!(sink.sample_frequency_hz, 48000);

    fixture.group.remove_cis_from_stream_if_needed(
        &fixture.devices,
        &mut fixture.codec_manager,
        right,
        0x61,
    );
    let sink = &fixture.group.stream_conf.stream_params.sink;
    assert_eq!(sink.num_of_devices, 1);
    assert_eq!(sink.num_of_channels, 1);
    assert_eq!(sink.audio_channel_allocation, LEFT.bits());
    assert!(!fixture.group.is_cis_part_of_current_stream(0x61));
    assert!(fixture.group.is_cis_part_of_current_stream(0x60));
    assert_eq!(fixture.group.cig.cises[1].addr, None);
    assert_eq!(fixture.group.cig.cises[0].addr, Some(fixture.device(0).address));

    fixture.group.remove_cis_from_stream_if_needed(
        &fixture.devices,
        &mut fixture.codec_manager,
        left,
        0x60,
    );
    assert_eq!(fixture.group.stream_conf.stream_params.sink, Default::default());
}

#[test]
fn test_removing_unbound_cis_handle_keeps_stream() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    let left = fixture.handles[0];
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        left,
        0x60,
    );

    fixture.group.remove_cis_from_stream_if_needed(
        &fixture.devices,
        &mut fixture.codec_manager,
        left,
        0,
    );
    let sink = &fixture.group.stream_conf.stream_params.sink;
    assert_eq!(sink.num_of_devices, 1);
    assert_eq!(sink.audio_channel_allocation, LEFT.bits());
    assert_eq!(fixture.group.cig.cises[0].addr, Some(fixture.device(0).address));
}

#[test]
fn test_offloaded_cis_configuration_tracks_stream() {
    let mut fixture = Fixture::earbuds();
    fixture.codec_manager = default_codec_manager().with_codec_location(CodecLocation::Adsp);
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    let (left, right) = (fixture.handles[0], fixture.handles[1]);
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        left,
        0x60,
    );

    let cis_configs = fixture.codec_manager.get_cis_configuration(Direction::Sink);
    assert_eq!(cis_configs.len(), 2);
    assert!(cis_configs[0].is_active);
    assert_eq!(cis_configs[0].audio_channel_allocation, LEFT.bits());
    assert!(!cis_configs[1].is_active);

    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        right,
        0x61,
    );
    fixture.group.remove_cis_from_stream_if_needed(
        &fixture.devices,
        &mut fixture.codec_manager,
        left,
        0x60,
    );
    fixture.group.remove_cis_from_stream_if_needed(
        &fixture.devices,
        &mut fixture.codec_manager,
        right,
        0x61,
    );
    let cis_configs = fixture.codec_manager.get_cis_configuration(Direction::Sink);
    assert_eq!(cis_configs.len(), 2);
    assert!(cis_configs.iter().all(|cis| !cis.is_active && cis.audio_channel_allocation == 0));
}

#[test]
fn test_cleanup_while_streaming_disconnects_each_cis_once() {
    let mut fixture = Fixture::new(vec![connected_device(1, LEFT, 1, 1)]);
    fixture.configure_and_bind_cises(LeAudioContextType::Conversational, &[0x70]);
    let handle = fixture.handles[0];
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        handle,
        0x70,
    );
    assert!(fixture.group.stream_conf.stream_params.source.has_handle(0x70));
    fixture.group.set_state(AseState::Streaming);

    let to_disconnect = fixture.group.cleanup(&mut fixture.devices, &mut fixture.codec_manager);
    assert_eq!(to_disconnect, vec![0x70]);
    assert!(fixture.group.cig.cises.is_empty());
    assert!(fixture.group.is_empty(&fixture.devices));
    assert_eq!(fixture.device(0).group_id, GROUP_UNKNOWN);
}

#[test]
fn test_cleanup_when_idle_has_nothing_to_disconnect() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    let handle = fixture.handles[0];
    fixture.group.add_cis_to_stream_configuration(
        &fixture.devices,
        &mut fixture.codec_manager,
        handle,
        0x60,
    );
    assert!(fixture.group.cleanup(&mut fixture.devices, &mut fixture.codec_manager).is_empty());
}

#[test]
fn test_configuration_round_trips_through_cache() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    let applied = fixture.group.stream_conf.conf.clone().unwrap();

    let cached = fixture
        .group
        .get_configuration(&fixture.devices, &fixture.codec_manager, LeAudioContextType::Media)
        .unwrap();
    assert!(Arc::ptr_eq(&applied, &cached));
    assert!(fixture.group.is_configured_for_context(LeAudioContextType::Media));
    assert!(!fixture.group.is_configured_for_context(LeAudioContextType::Game));

    fixture.group.invalidate_cached_configurations();
    let refreshed = fixture
        .group
        .get_configuration(&fixture.devices, &fixture.codec_manager, LeAudioContextType::Media)
        .unwrap();
    assert!(Arc::ptr_eq(&applied, &refreshed));
    assert!(fixture
        .group
        .get_configuration(
            &fixture.devices,
            &fixture.codec_manager,
            LeAudioContextType::Uninitialized
        )
        .is_none());
}

#[test]
fn test_cache_refresh_follows_membership() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.group.is_audio_set_configuration_available(
        &fixture.devices,
        &fixture.codec_manager,
        LeAudioContextType::Media
    ));
    assert_eq!(
        fixture.group.get_cached_configuration(LeAudioContextType::Media).unwrap().name,
        "DualDev_OneChanStereoSnk_48_4"
    );

    let right = fixture.handles[1];
    fixture.group.remove_node(&mut fixture.devices, right);
    fixture.group.reload_audio_locations(&fixture.devices);
    fixture.group.invalidate_group_strategy();

    // Still served from the cache until invalidated.
    assert_eq!(
        fixture
            .group
            .get_configuration(&fixture.devices, &fixture.codec_manager, LeAudioContextType::Media)
            .unwrap()
            .name,
        "DualDev_OneChanStereoSnk_48_4"
    );

    fixture.group.invalidate_cached_configurations();
    assert_eq!(
        fixture
            .group
            .get_configuration(&fixture.devices, &fixture.codec_manager, LeAudioContextType::Media)
            .unwrap()
            .name,
        "SingleDev_OneChanMonoSnk_48_4"
    );
    assert_eq!(fixture.device(1).group_id, GROUP_UNKNOWN);
}

#[test]
fn test_invalidated_configuration_is_not_reported_as_configured() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.configure(LeAudioContextType::Media));
    assert!(fixture.group.is_configured_for_context(LeAudioContextType::Media));

    let right = fixture.handles[1];
    fixture.group.remove_node(&mut fixture.devices, right);
    fixture.group.reload_audio_locations(&fixture.devices);
    fixture.group.invalidate_group_strategy();
    fixture.group.invalidate_cached_configurations();

    assert!(!fixture.group.is_configured_for_context(LeAudioContextType::Media));
    assert!(fixture.group.get_active_configuration().is_none());
    assert!(fixture.group.get_cached_configuration(LeAudioContextType::Media).is_none());
    assert!(fixture
        .group
        .get_cached_codec_configuration_by_direction(LeAudioContextType::Media, Direction::Sink)
        .is_none());

    // The next lookup refreshes the entry for the remaining member.
    let refreshed = fixture
        .group
        .get_codec_configuration_by_direction(
            &fixture.devices,
            &fixture.codec_manager,
            LeAudioContextType::Media,
            Direction::Sink,
        )
        .unwrap();
    assert_eq!(refreshed.num_channels, 1);
    assert_eq!(
        fixture.group.get_active_configuration().unwrap().name,
        "SingleDev_OneChanMonoSnk_48_4"
    );
}

#[test]
fn test_configuration_cache_entries() {
    let codec_manager = default_codec_manager();
    let media = codec_manager
        .get_codec_config(LeAudioContextType::Media, |_, confs| confs.first().cloned());
    let other =
        codec_manager.get_codec_config(LeAudioContextType::Media, |_, confs| confs.get(1).cloned());

    let mut cache = ConfigurationCache::default();
    assert!(cache.update(LeAudioContextType::Media, media.clone()));
    assert!(!cache.update(LeAudioContextType::Media, media.clone()));
    assert!(cache.is_valid(LeAudioContextType::Media));

    cache.invalidate_all();
    assert!(!cache.is_valid(LeAudioContextType::Media));
    assert!(cache.get(LeAudioContextType::Media).is_none());
    assert_eq!(cache.len(), 1);
    assert!(!cache.update(LeAudioContextType::Media, media));
    assert!(cache.is_valid(LeAudioContextType::Media));

    assert!(cache.update(LeAudioContextType::Media, other));
    assert_eq!(cache.len(), 1);
    assert!(cache.update(LeAudioContextType::Media, None));
    assert!(cache.is_empty());
}

#[test]
fn test_dual_bidirectional_swb_needs_support() {
    let mut fixture = Fixture::earbuds();
    assert_eq!(
        fixture
            .group
            .get_configuration(
                &fixture.devices,
                &fixture.codec_manager,
                LeAudioContextType::Conversational,
            )
            .unwrap()
            .name,
        "DualDev_OneChanStereoSnk_OneChanStereoSrc_16_2"
    );

    fixture.codec_manager = default_codec_manager().with_dual_bidir_swb_supported(true);
    fixture.group.invalidate_cached_configurations();
    assert_eq!(
        fixture
            .group
            .get_configuration(
                &fixture.devices,
                &fixture.codec_manager,
                LeAudioContextType::Conversational,
            )
            .unwrap()
            .name,
        "DualDev_OneChanStereoSnk_OneChanStereoSrc_32_2"
    );
}

#[test]
fn test_codec_configuration_by_direction() {
    let mut fixture = Fixture::earbuds();
    let sink = fixture
        .group
        .get_codec_configuration_by_direction(
            &fixture.devices,
            &fixture.codec_manager,
            LeAudioContextType::Media,
            Direction::Sink,
        )
        .unwrap();
    assert_eq!(sink.sample_rate, 48000);
    assert_eq!(sink.num_channels, 2);
    assert_eq!(sink.data_interval_us, 10000);
    assert_eq!(sink.octets_per_codec_frame, 120);
    assert_eq!(sink.bits_per_sample, 16);
    assert_eq!(sink.codec, CodecId::LC3);

    assert!(fixture
        .group
        .get_cached_codec_configuration_by_direction(LeAudioContextType::Media, Direction::Source)
        .is_none());
    assert!(fixture
        .group
        .get_cached_codec_configuration_by_direction(LeAudioContextType::Game, Direction::Sink)
        .is_none());
}

fn activate_sink_ase(fixture: &mut Fixture, idx: usize, ase_idx: usize) -> &mut Ase {
    let ase = &mut fixture.device_mut(idx).ases[ase_idx];
    assert_eq!(ase.direction, Direction::Sink);
    ase.active = true;
    ase
}

#[test]
fn test_presentation_delay_prefers_highest_preferred_minimum() {
    let mut fixture = Fixture::earbuds();
    assert_eq!(fixture.group.get_presentation_delay(&fixture.devices, Direction::Sink), None);

    let ase = activate_sink_ase(&mut fixture, 0, 0);
    ase.qos_preferences.pres_delay_min = 10000;
    ase.qos_preferences.pres_delay_max = 40000;
    ase.qos_preferences.preferred_pres_delay_min = 20000;
    let ase = activate_sink_ase(&mut fixture, 1, 0);
    ase.qos_preferences.pres_delay_min = 15000;
    ase.qos_preferences.pres_delay_max = 35000;
    ase.qos_preferences.preferred_pres_delay_min = 25000;
    ase.qos_preferences.preferred_pres_delay_max = 30000;

    assert_eq!(
        fixture.group.get_presentation_delay(&fixture.devices, Direction::Sink),
        Some(25000)
    );

    fixture.group.set_transport_latency(Direction::Sink, 5000);
    assert_eq!(fixture.group.get_remote_delay(&fixture.devices, Direction::Sink), 30);
}

#[test]
fn test_presentation_delay_falls_back_to_window_minimum() {
    let mut fixture = Fixture::earbuds();
    let ase = activate_sink_ase(&mut fixture, 0, 0);
    ase.qos_preferences.pres_delay_min = 10000;
    ase.qos_preferences.pres_delay_max = 40000;
    // Preferred minimum outside of the common window.
    ase.qos_preferences.preferred_pres_delay_min = 45000;

    assert_eq!(
        fixture.group.get_presentation_delay(&fixture.devices, Direction::Sink),
        Some(10000)
    );
}

#[test]
fn test_presentation_delay_without_overlap_fails() {
    let mut fixture = Fixture::earbuds();
    let ase = activate_sink_ase(&mut fixture, 0, 0);
    ase.qos_preferences.pres_delay_min = 10000;
    ase.qos_preferences.pres_delay_max = 20000;
    let ase = activate_sink_ase(&mut fixture, 1, 0);
    ase.qos_preferences.pres_delay_min = 30000;
    ase.qos_preferences.pres_delay_max = 40000;

    assert_eq!(fixture.group.get_presentation_delay(&fixture.devices, Direction::Sink), None);
    assert_eq!(fixture.group.get_remote_delay(&fixture.devices, Direction::Sink), 100);
}

#[test]
fn test_transport_latency_takes_smallest_non_zero_and_clamps() {
    let mut fixture = Fixture::earbuds();
    activate_sink_ase(&mut fixture, 0, 0).qos_config.max_transport_latency = 100;
    activate_sink_ase(&mut fixture, 1, 0).qos_config.max_transport_latency = 40;
    assert_eq!(fixture.group.get_max_transport_latency_mtos(&fixture.devices), 40);

    activate_sink_ase(&mut fixture, 1, 1).qos_config.max_transport_latency = 0;
    assert_eq!(fixture.group.get_max_transport_latency_mtos(&fixture.devices), 40);

    activate_sink_ase(&mut fixture, 0, 1).qos_config.max_transport_latency = 2;
    assert_eq!(
        fixture.group.get_max_transport_latency_mtos(&fixture.devices),
        MAX_TRANSPORT_LATENCY_MIN
    );

    // Nothing active in the source direction.
    assert_eq!(
        fixture.group.get_max_transport_latency_stom(&fixture.devices),
        MAX_TRANSPORT_LATENCY_MIN
    );

    let mut fixture = Fixture::earbuds();
    activate_sink_ase(&mut fixture, 0, 0).qos_config.max_transport_latency = 0x1000;
    assert_eq!(
        fixture.group.get_max_transport_latency_mtos(&fixture.devices),
        MAX_TRANSPORT_LATENCY_MAX
    );
}

#[test]
fn test_first_transport_latency_sticks() {
    let mut fixture = Fixture::earbuds();
    fixture.group.set_transport_latency(Direction::Source, 12000);
    fixture.group.set_transport_latency(Direction::Source, 15000);
    assert_eq!(fixture.group.get_transport_latency_us(Direction::Source), 12000);
    assert_eq!(fixture.group.get_transport_latency_us(Direction::Sink), 0);
}

#[test]
fn test_sca_is_worst_of_members() {
    let mut fixture = Fixture::earbuds();
    fixture.device_mut(0).sca = 5;
    fixture.device_mut(1).sca = 3;
    assert_eq!(fixture.group.get_sca(&fixture.devices), 3);

    fixture.device_mut(1).sca = SCA_UNKNOWN;
    assert_eq!(fixture.group.get_sca(&fixture.devices), 0);

    fixture.device_mut(1).sca = 0;
    assert_eq!(fixture.group.get_sca(&fixture.devices), 0);
}

#[test]
fn test_phy_is_intersection_with_2m_preferred() {
    let mut fixture = Fixture::earbuds();
    let with_2m = Controller { le_2m_phy: true };
    let without_2m = Controller { le_2m_phy: false };

    activate_sink_ase(&mut fixture, 0, 0).qos_preferences.preferred_phy = ISO_CIG_PHY_2M;
    assert_eq!(
        fixture.group.get_phy_bitmask(&fixture.devices, &with_2m, Direction::Sink),
        ISO_CIG_PHY_2M
    );
    assert_eq!(
        fixture.group.get_target_phy(&fixture.devices, &with_2m, Direction::Sink),
        TARGET_PHY_2M
    );
    assert_eq!(
        fixture.group.get_target_phy(&fixture.devices, &without_2m, Direction::Sink),
        TARGET_PHY_1M
    );

    fixture.device_mut(1).le_2m_phy_supported = false;
    activate_sink_ase(&mut fixture, 1, 0).qos_preferences.preferred_phy = ISO_CIG_PHY_2M;
    assert_eq!(fixture.group.get_phy_bitmask(&fixture.devices, &with_2m, Direction::Sink), 0);
    assert_eq!(fixture.group.get_target_phy(&fixture.devices, &with_2m, Direction::Sink), 0);
}

#[test]
fn test_framing_and_qos_lookups() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    assert_eq!(fixture.group.get_framing(&fixture.devices), ISO_CIG_FRAMING_UNFRAMED);
    assert_eq!(fixture.group.get_packing(), ISO_CIG_PACKING_SEQUENTIAL);
    assert_eq!(fixture.group.get_sdu_interval(&fixture.devices, Direction::Sink), 10000);
    assert_eq!(fixture.group.get_sdu_interval(&fixture.devices, Direction::Source), 0);
    assert_eq!(fixture.group.get_max_sdu_size(&fixture.devices, Direction::Sink, 1), 120);
    assert_eq!(fixture.group.get_rtn(&fixture.devices, Direction::Sink, 1), 13);
    assert_eq!(fixture.group.get_max_sdu_size(&fixture.devices, Direction::Source, 1), 0);

    let ase = fixture.device_mut(1).ases.iter_mut().find(|ase| ase.active).unwrap();
    ase.qos_preferences.supported_framing = FRAMING_UNFRAMED_PDU_UNSUPPORTED;
    assert_eq!(fixture.group.get_framing(&fixture.devices), ISO_CIG_FRAMING_FRAMED);
}

#[test]
fn test_expired_members_are_skipped() {
    let mut fixture = Fixture::earbuds();
    let (left, right) = (fixture.handles[0], fixture.handles[1]);
    assert_eq!(fixture.group.size(&fixture.devices), 2);
    assert_eq!(fixture.group.get_next_device(&fixture.devices, left), Some(right));

    fixture.devices.remove(right);
    assert_eq!(fixture.group.size(&fixture.devices), 1);
    assert_eq!(fixture.group.num_of_connected(&fixture.devices, None), 1);
    assert_eq!(fixture.group.get_next_device(&fixture.devices, left), None);
    assert!(!fixture.group.is_device_in_the_group(&fixture.devices, right));
    assert!(fixture.group.is_device_in_the_group(&fixture.devices, left));
    assert_eq!(fixture.group.get_ase_count(&fixture.devices, Direction::Sink), 2);
}

#[test]
fn test_traversal_predicates() {
    let mut fixture = Fixture::earbuds();
    let (left, right) = (fixture.handles[0], fixture.handles[1]);
    fixture.device_mut(0).available_contexts.sink = AudioContexts::CONVERSATIONAL;
    assert_eq!(
        fixture.group.get_first_device_with_available_context(
            &fixture.devices,
            LeAudioContextType::Media,
        ),
        Some(right)
    );
    assert_eq!(
        fixture.group.get_next_device_with_available_context(
            &fixture.devices,
            right,
            LeAudioContextType::Media,
        ),
        None
    );

    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    assert_eq!(fixture.group.get_first_active_device(&fixture.devices), Some(left));
    assert_eq!(fixture.group.get_next_active_device(&fixture.devices, left), Some(right));
    assert_eq!(
        fixture.group.get_first_active_device_by_cis_and_data_path_state(
            &fixture.devices,
            CisState::Assigned,
            DataPathState::Idle
        ),
        Some(left)
    );

    let ase = fixture.device_mut(0).ases.iter_mut().find(|ase| ase.active).unwrap();
    ase.cis_state = CisState::Connected;
    ase.data_path_state = DataPathState::Configured;
    assert_eq!(
        fixture.group.get_first_active_device_by_cis_and_data_path_state(
            &fixture.devices,
            CisState::Assigned,
            DataPathState::Idle
        ),
        Some(right)
    );
    assert_eq!(
        fixture.group.get_next_active_device_by_cis_and_data_path_state(
            &fixture.devices,
            right,
            CisState::Assigned,
            DataPathState::Idle
        ),
        None
    );
    assert!(!fixture.group.have_all_cises_disconnected(&fixture.devices));
    assert!(!fixture.group.is_group_stream_ready(&fixture.devices));
}

#[test]
fn test_connected_count_and_contexts() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.group.is_any_device_connected(&fixture.devices));
    assert_eq!(fixture.group.num_of_connected(&fixture.devices, Some(LeAudioContextType::Rfu)), 2);
    assert_eq!(
        fixture.group.num_of_connected(&fixture.devices, Some(LeAudioContextType::Alerts)),
        0
    );
    assert_eq!(
        fixture.group.get_supported_contexts(&fixture.devices, Some(Direction::Source)),
        AudioContexts::CONVERSATIONAL | AudioContexts::GAME
    );
    assert_eq!(fixture.group.get_audio_locations(Direction::Sink), LEFT | RIGHT);
    assert_eq!(
        fixture.group.get_audio_directions(),
        (Direction::Sink as u8) | (Direction::Source as u8)
    );

    fixture.device_mut(1).available_contexts.sink = AudioContexts::empty();
    fixture.device_mut(0).available_contexts.sink = AudioContexts::MEDIA;
    assert!(fixture.group.update_audio_context_availability(&fixture.devices));
    assert!(!fixture.group.update_audio_context_availability(&fixture.devices));
    assert_eq!(fixture.group.get_available_contexts(Some(Direction::Sink)), AudioContexts::MEDIA);

    fixture.device_mut(1).set_connection_state(DeviceConnectState::Disconnected);
    assert_eq!(fixture.group.num_of_connected(&fixture.devices, None), 1);
    assert!(fixture.group.reload_audio_locations(&fixture.devices));
    assert_eq!(fixture.group.get_audio_locations(Direction::Sink), LEFT);
}

#[test]
fn test_group_states() {
    let mut fixture = Fixture::earbuds();
    assert!(fixture.group.is_releasing_or_idle());
    fixture.group.set_target_state(AseState::Streaming);
    fixture.group.set_state(AseState::Streaming);
    assert!(fixture.group.is_streaming());
    assert!(!fixture.group.is_releasing_or_idle());

    fixture.group.set_pending_configuration();
    assert!(fixture.group.is_pending_configuration());
    fixture.group.clear_pending_configuration();
    assert!(!fixture.group.is_pending_configuration());

    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    assert!(fixture.group.have_any_active_device_in_unconfigured_state(&fixture.devices));
    for idx in 0..2 {
        for ase in fixture.device_mut(idx).ases.iter_mut().filter(|ase| ase.active) {
            ase.state = AseState::Enabling;
        }
    }
    assert!(fixture.group.have_all_active_devices_ases_the_same_state(
        &fixture.devices,
        AseState::Enabling
    ));
    assert!(fixture.group.is_group_ready_to_create_stream(&fixture.devices));
    assert!(!fixture.group.is_group_ready_to_suspend_stream(&fixture.devices));
}

#[test]
fn test_enable_and_disable_drive_autoconnect() {
    let mut fixture = Fixture::earbuds();
    fixture.device_mut(1).set_connection_state(DeviceConnectState::Disconnected);
    let left = fixture.device(0).address;
    let right = fixture.device(1).address;
    let mut connector = RecordingConnector::default();

    fixture.group.enable(
        &mut fixture.devices,
        &mut connector,
        3,
        BleConnectionType::TargetedAnnouncements,
    );
    assert!(fixture.group.is_enabled());
    assert_eq!(
        connector.calls,
        vec![
            GattCall::SetAutoconnect(left, true),
            GattCall::SetAutoconnect(right, true),
            GattCall::Open(right, BleConnectionType::TargetedAnnouncements),
        ]
    );
    assert_eq!(fixture.device(1).get_connection_state(), DeviceConnectState::ConnectingAutoconnect);

    connector.calls.clear();
    fixture.group.disable(&mut fixture.devices, &mut connector, 3);
    assert!(!fixture.group.is_enabled());
    assert_eq!(
        connector.calls,
        vec![
            GattCall::SetAutoconnect(left, false),
            GattCall::CancelOpen(left),
            GattCall::SetAutoconnect(right, false),
            GattCall::CancelOpen(right),
        ]
    );
    assert_eq!(fixture.device(1).get_connection_state(), DeviceConnectState::Disconnected);
    assert_eq!(fixture.device(0).get_connection_state(), DeviceConnectState::Connected);
}

#[test]
fn test_allow_list_and_reconnection_mode() {
    let mut fixture = Fixture::earbuds();
    fixture.device_mut(1).set_connection_state(DeviceConnectState::Disconnected);
    let left = fixture.device(0).address;
    let right = fixture.device(1).address;
    let mut connector = RecordingConnector::default();

    fixture.group.add_to_allow_list_not_connected_group_members(
        &mut fixture.devices,
        &mut connector,
        3,
    );
    assert_eq!(
        connector.calls,
        vec![GattCall::CancelOpen(right), GattCall::Open(right, BleConnectionType::Direct)]
    );

    connector.calls.clear();
    fixture.group.apply_reconnection_mode(
        &mut fixture.devices,
        &mut connector,
        3,
        BleConnectionType::BackgroundAllowList,
    );
    assert_eq!(
        connector.calls,
        vec![
            GattCall::CancelOpen(left),
            GattCall::Open(left, BleConnectionType::BackgroundAllowList),
            GattCall::CancelOpen(right),
            GattCall::Open(right, BleConnectionType::BackgroundAllowList),
        ]
    );
}

#[test]
fn test_dump_mentions_group_and_members() {
    let mut fixture = Fixture::earbuds();
    fixture.configure_and_bind_cises(LeAudioContextType::Media, &[0x60, 0x61]);
    let dump = fixture.group.dump(&fixture.devices, &Controller { le_2m_phy: true }, GROUP_ID);
    assert!(dump.contains("Group id: 1"));
    assert!(dump.contains("Active"));
    assert!(dump.contains("DualDev_OneChanStereoSnk_48_4"));
    assert!(dump.contains(&fixture.device(1).address.to_loggable_string()));
    fixture.group.print_debug_state(&fixture.devices, &Controller { le_2m_phy: false });
}

#[test]
fn test_registry_lifecycle() {
    let mut devices = LeAudioDevices::new();
    let mut codec_manager = default_codec_manager();
    let mut groups = LeAudioDeviceGroups::new();

    let handle = devices.add(connected_device(1, LEFT, 1, 0));
    groups.add(1).unwrap().add_node(&mut devices, handle);
    groups.add(2).unwrap();
    assert_eq!(groups.add(1).err(), Some(LeAudioError::GroupAlreadyExists(1)));
    assert_eq!(groups.size(), 2);
    assert_eq!(groups.get_groups_ids(), vec![1, 2]);
    assert_eq!(devices.get(handle).unwrap().group_id, 1);

    assert!(!groups.is_any_in_transition());
    groups.find_by_id_mut(2).unwrap().set_in_transition(true);
    assert!(groups.is_any_in_transition());

    let dump = groups.dump(&devices, &Controller { le_2m_phy: true }, 2);
    let first = dump.find("Group id: 2").unwrap();
    let second = dump.find("Group id: 1").unwrap();
    assert!(first < second);

    assert_eq!(groups.remove(1, &mut devices, &mut codec_manager), Ok(vec![]));
    assert_eq!(devices.get(handle).unwrap().group_id, GROUP_UNKNOWN);
    assert_eq!(
        groups.remove(1, &mut devices, &mut codec_manager),
        Err(LeAudioError::NoSuchGroup(1))
    );
    assert!(groups.find_by_id(1).is_none());

    assert!(groups.cleanup(&mut devices, &mut codec_manager).is_empty());
    assert_eq!(groups.size(), 0);
}
