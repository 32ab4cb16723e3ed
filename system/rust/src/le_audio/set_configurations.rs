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

//! Audio set configurations: the catalog of codec, QoS and topology
//! combinations a group can be configured with, and the helpers deciding
//! which of them could fit a group.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::le_audio::codec::{CodecConfigSetting, CodecId, LeAudioCoreCodecConfig};
use crate::le_audio::types::{
    AudioContexts, BidirectionalPair, Direction, LeAudioConfigurationStrategy,
    LeAudioContextType, CONTEXT_ALL_BIDIR, CONTEXT_ALL_REMOTE_SOURCE, ISO_CIG_PACKING_SEQUENTIAL,
};

/// Sampling rates at or above this count as super wideband.
pub const SWB_MIN_SAMPLING_FREQUENCY_HZ: u32 = 32000;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QosConfigSetting {
    pub target_latency: u8,
    pub retransmission_number: u8,
    pub max_transport_latency: u16,
    pub sdu_interval_us: u32,
    pub max_sdu: u16,
}

/// Requirement for a single ASE.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AseConfiguration {
    pub codec: CodecConfigSetting,
    pub qos: QosConfigSetting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyInfo {
    pub strategy: BidirectionalPair<LeAudioConfigurationStrategy>,
    pub device_count: BidirectionalPair<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioSetConfiguration {
    pub name: String,
    pub packing: u8,
    pub confs: BidirectionalPair<Vec<AseConfiguration>>,
    pub topology_info: TopologyInfo,
}

impl AudioSetConfiguration {
    /// Largest device count over both directions.
    pub fn max_device_count(&self) -> u8 {
        self.topology_info.device_count.sink.max(self.topology_info.device_count.source)
    }
}

pub type AudioSetConfigurations = Vec<Arc<AudioSetConfiguration>>;

/// Source of the ordered configuration list for a context. Earlier entries
/// have priority.
pub trait AudioSetConfigurationProvider {
    fn get_configurations(
        &self,
        context_type: LeAudioContextType,
    ) -> Option<&[Arc<AudioSetConfiguration>]>;
}

/// Provider backed by an in-memory table.
#[derive(Default)]
pub struct StaticConfigurationProvider {
    configurations: HashMap<LeAudioContextType, AudioSetConfigurations>,
}

impl StaticConfigurationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list used for `context_type`.
    pub fn with_configurations(
        mut self,
        context_type: LeAudioContextType,
        configurations: Vec<AudioSetConfiguration>,
    ) -> Self {
        self.configurations
            .insert(context_type, configurations.into_iter().map(Arc::new).collect());
        self
    }

    /// LC3 catalog covering the common headset and earbud topologies.
    pub fn with_default_catalog() -> Self {
        let media = vec![
            single_direction(
                "DualDev_OneChanStereoSnk_48_4",
                LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                2,
                vec![lc3_ase(48000, 120, 1, 13, 100), lc3_ase(48000, 120, 1, 13, 100)],
            ),
            single_direction(
                "SingleDev_OneChanStereoSnk_48_4",
                LeAudioConfigurationStrategy::StereoTwoCisesPerDevice,
                1,
                vec![lc3_ase(48000, 120, 1, 13, 100), lc3_ase(48000, 120, 1, 13, 100)],
            ),
            single_direction(
                "SingleDev_TwoChanStereoSnk_48_4",
                LeAudioConfigurationStrategy::StereoOneCisPerDevice,
                1,
                vec![lc3_ase(48000, 120, 2, 13, 100)],
            ),
            single_direction(
                "SingleDev_OneChanMonoSnk_48_4",
                LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                1,
                vec![lc3_ase(48000, 120, 1, 13, 100)],
            ),
            single_direction(
                "SingleDev_OneChanMonoSnk_16_2",
                LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                1,
                vec![lc3_ase(16000, 40, 1, 2, 10)],
            ),
        ];

        let conversational = vec![
            both_directions(
                "DualDev_OneChanStereoSnk_OneChanStereoSrc_32_2",
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    2,
                    vec![lc3_ase(32000, 80, 1, 2, 10); 2],
                ),
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    2,
                    vec![lc3_ase(32000, 80, 1, 2, 10); 2],
                ),
            ),
            both_directions(
                "DualDev_OneChanStereoSnk_OneChanStereoSrc_16_2",
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    2,
                    vec![lc3_ase(16000, 40, 1, 2, 10); 2],
                ),
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    2,
                    vec![lc3_ase(16000, 40, 1, 2, 10); 2],
                ),
            ),
            both_directions(
                "SingleDev_OneChanStereoSnk_OneChanMonoSrc_16_2",
                (
                    LeAudioConfigurationStrategy::StereoTwoCisesPerDevice,
                    1,
                    vec![lc3_ase(16000, 40, 1, 2, 10); 2],
                ),
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    1,
                    vec![lc3_ase(16000, 40, 1, 2, 10)],
                ),
            ),
            both_directions(
                "SingleDev_OneChanMonoSnk_OneChanMonoSrc_16_2",
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    1,
                    vec![lc3_ase(16000, 40, 1, 2, 10)],
                ),
                (
                    LeAudioConfigurationStrategy::MonoOneCisPerDevice,
                    1,
                    vec![lc3_ase(16000, 40, 1, 2, 10)],
                ),
            ),
        ];

        let mut provider = Self::new()
            .with_configurations(LeAudioContextType::Media, media.clone())
            .with_configurations(LeAudioContextType::Conversational, conversational.clone());
        for context_type in [LeAudioContextType::Game, LeAudioContextType::VoiceAssistants] {
            provider = provider.with_configurations(context_type, conversational.clone());
        }
        for context_type in [
            LeAudioContextType::Unspecified,
            LeAudioContextType::SoundEffects,
            LeAudioContextType::Notifications,
            LeAudioContextType::Ringtone,
            LeAudioContextType::Alerts,
            LeAudioContextType::Instructional,
        ] {
            provider = provider.with_configurations(context_type, media.clone());
        }
        provider
    }
}

impl AudioSetConfigurationProvider for StaticConfigurationProvider {
    fn get_configurations(
        &self,
        context_type: LeAudioContextType,
    ) -> Option<&[Arc<AudioSetConfiguration>]> {
        self.configurations.get(&context_type).map(|v| v.as_slice())
    }
}

fn lc3_ase(
    sampling_frequency_hz: u32,
    octets_per_codec_frame: u16,
    channel_count_per_iso_stream: u8,
    retransmission_number: u8,
    max_transport_latency: u16,
) -> AseConfiguration {
    let channels = u16::from(channel_count_per_iso_stream);
    AseConfiguration {
        codec: CodecConfigSetting {
            id: CodecId::LC3,
            params: LeAudioCoreCodecConfig {
                sampling_frequency_hz,
                frame_duration_us: 10000,
                octets_per_codec_frame,
                codec_frames_blocks_per_sdu: 1,
                audio_channel_allocation: None,
            },
            channel_count_per_iso_stream,
        },
        qos: QosConfigSetting {
            target_latency: if max_transport_latency > 20 { 0x02 } else { 0x01 },
            retransmission_number,
            max_transport_latency,
            sdu_interval_us: 10000,
            max_sdu: octets_per_codec_frame * channels,
        },
    }
}

fn single_direction(
    name: &str,
    strategy: LeAudioConfigurationStrategy,
    device_count: u8,
    sink: Vec<AseConfiguration>,
) -> AudioSetConfiguration {
    AudioSetConfiguration {
        name: name.to_string(),
        packing: ISO_CIG_PACKING_SEQUENTIAL,
        confs: BidirectionalPair::new(sink, vec![]),
        topology_info: TopologyInfo {
            strategy: BidirectionalPair::new(
                strategy,
                LeAudioConfigurationStrategy::MonoOneCisPerDevice,
            ),
            device_count: BidirectionalPair::new(device_count, 0),
        },
    }
}

fn both_directions(
    name: &str,
    sink: (LeAudioConfigurationStrategy, u8, Vec<AseConfiguration>),
    source: (LeAudioConfigurationStrategy, u8, Vec<AseConfiguration>),
) -> AudioSetConfiguration {
    AudioSetConfiguration {
        name: name.to_string(),
        packing: ISO_CIG_PACKING_SEQUENTIAL,
        confs: BidirectionalPair::new(sink.2, source.2),
        topology_info: TopologyInfo {
            strategy: BidirectionalPair::new(sink.0, source.0),
            device_count: BidirectionalPair::new(sink.1, source.1),
        },
    }
}

/// Whether a group with `group_size` connected members could use
/// `configuration` at all.
pub fn check_if_may_cover_scenario(
    configuration: &AudioSetConfiguration,
    group_size: usize,
) -> bool {
    let may_cover = group_size <= usize::from(configuration.max_device_count());
    if !may_cover {
        debug!(
            "{} needs at most {} devices, group has {group_size}",
            configuration.name, configuration.max_device_count()
        );
    }
    may_cover
}

/// Catalog level coverage check. All entries of a context list are built
/// for the same set size, so the first one is representative.
pub fn check_if_may_cover_scenario_list(
    configurations: &[Arc<AudioSetConfiguration>],
    group_size: usize,
) -> bool {
    match configurations.first() {
        Some(first) => check_if_may_cover_scenario(first, group_size),
        None => {
            debug!("empty configuration list");
            false
        }
    }
}

/// Whether `configuration` needs a super wideband codec in both directions.
pub fn check_configuration_is_bidir_swb(configuration: &AudioSetConfiguration) -> bool {
    Direction::BOTH.iter().all(|&direction| {
        configuration
            .confs
            .get(direction)
            .iter()
            .any(|ase| ase.codec.sampling_frequency_hz() >= SWB_MIN_SAMPLING_FREQUENCY_HZ)
    })
}

/// Number of CIS slots of each type a scenario needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CisCount {
    pub bidirectional: u8,
    pub unidirectional_sink: u8,
    pub unidirectional_source: u8,
}

impl CisCount {
    pub fn total(&self) -> usize {
        usize::from(self.bidirectional)
            + usize::from(self.unidirectional_sink)
            + usize::from(self.unidirectional_source)
    }
}

/// Estimates how many CISes of each type a group of `expected_device_cnt`
/// devices needs for `context_type`.
pub fn get_cis_count(
    context_type: LeAudioContextType,
    expected_device_cnt: u8,
    strategy: LeAudioConfigurationStrategy,
    group_ase_snk_cnt: usize,
    group_ase_src_cnt: usize,
    available_contexts: &BidirectionalPair<AudioContexts>,
) -> CisCount {
    let is_bidirectional = CONTEXT_ALL_BIDIR.test(context_type)
        && available_contexts.source.test(context_type);
    let is_source_only = CONTEXT_ALL_REMOTE_SOURCE.test(context_type) && !is_bidirectional;

    info!(
        "context_type {context_type}, strategy {strategy:?}, devices {expected_device_cnt}, \
         sink ases {group_ase_snk_cnt}, source ases {group_ase_src_cnt}, bidir {is_bidirectional}"
    );

    let mut count = CisCount::default();
    match strategy {
        LeAudioConfigurationStrategy::MonoOneCisPerDevice
        | LeAudioConfigurationStrategy::StereoOneCisPerDevice => {
            if is_bidirectional {
                if group_ase_snk_cnt > 0 && group_ase_src_cnt > 0 {
                    count.bidirectional = expected_device_cnt;
                } else if group_ase_snk_cnt > 0 {
                    count.unidirectional_sink = expected_device_cnt;
                } else if group_ase_src_cnt > 0 {
                    count.unidirectional_source = expected_device_cnt;
                }
            } else if is_source_only {
                count.unidirectional_source = expected_device_cnt;
            } else {
                count.unidirectional_sink = expected_device_cnt;
            }
        }
        LeAudioConfigurationStrategy::StereoTwoCisesPerDevice => {
            if is_bidirectional {
                if group_ase_snk_cnt > 0 && group_ase_src_cnt > 0 {
                    count.bidirectional = expected_device_cnt;
                    if group_ase_src_cnt > 1 {
                        count.bidirectional =
                            count.bidirectional.saturating_add(expected_device_cnt);
                    } else {
                        count.unidirectional_sink = expected_device_cnt;
                    }
                } else if group_ase_snk_cnt > 0 {
                    count.unidirectional_sink = expected_device_cnt.saturating_mul(2);
                } else if group_ase_src_cnt > 0 {
                    count.unidirectional_source = expected_device_cnt.saturating_mul(2);
                }
            } else if is_source_only {
                count.unidirectional_source = expected_device_cnt.saturating_mul(2);
            } else {
                count.unidirectional_sink = expected_device_cnt.saturating_mul(2);
            }
        }
    }
    count
}

#[cfg(test)]
mod test {
    use super::*;

    fn sink_and_source_available(context: LeAudioContextType) -> BidirectionalPair<AudioContexts> {
        BidirectionalPair::new(context.into(), context.into())
    }

    #[test]
    fn mono_media_uses_one_sink_cis_per_device() {
        let count = get_cis_count(
            LeAudioContextType::Media,
            2,
            LeAudioConfigurationStrategy::MonoOneCisPerDevice,
            2,
            2,
            &sink_and_source_available(LeAudioContextType::Media),
        );
        assert_eq!(
            count,
            CisCount { bidirectional: 0, unidirectional_sink: 2, unidirectional_source: 0 }
        );
    }

    #[test]
    fn conversational_pairs_directions_when_source_available() {
        let available = sink_and_source_available(LeAudioContextType::Conversational);
        let count = get_cis_count(
            LeAudioContextType::Conversational,
            1,
            LeAudioConfigurationStrategy::MonoOneCisPerDevice,
            1,
            1,
            &available,
        );
        assert_eq!(
            count,
            CisCount { bidirectional: 1, unidirectional_sink: 0, unidirectional_source: 0 }
        );

        let count = get_cis_count(
            LeAudioContextType::Conversational,
            1,
            LeAudioConfigurationStrategy::StereoTwoCisesPerDevice,
            2,
            1,
            &available,
        );
        assert_eq!(
            count,
            CisCount { bidirectional: 1, unidirectional_sink: 1, unidirectional_source: 0 }
        );

        let count = get_cis_count(
            LeAudioContextType::Conversational,
            1,
            LeAudioConfigurationStrategy::StereoTwoCisesPerDevice,
            2,
            2,
            &available,
        );
        assert_eq!(
            count,
            CisCount { bidirectional: 2, unidirectional_sink: 0, unidirectional_source: 0 }
        );
    }

    #[test]
    fn conversational_without_source_context_is_sink_only() {
        let available =
            BidirectionalPair::new(AudioContexts::CONVERSATIONAL, AudioContexts::empty());
        let count = get_cis_count(
            LeAudioContextType::Conversational,
            1,
            LeAudioConfigurationStrategy::StereoTwoCisesPerDevice,
            2,
            1,
            &available,
        );
        assert_eq!(
            count,
            CisCount { bidirectional: 0, unidirectional_sink: 2, unidirectional_source: 0 }
        );
    }

    #[test]
    fn coverage_depends_on_device_count() {
        let provider = StaticConfigurationProvider::with_default_catalog();
        let media = provider.get_configurations(LeAudioContextType::Media).unwrap();
        assert!(check_if_may_cover_scenario_list(media, 2));
        assert!(!check_if_may_cover_scenario_list(media, 3));
        assert!(!check_if_may_cover_scenario_list(&[], 1));
        assert!(check_if_may_cover_scenario(&media[3], 1));
        assert!(!check_if_may_cover_scenario(&media[3], 2));
    }

    #[test]
    fn swb_detection_needs_both_directions() {
        let provider = StaticConfigurationProvider::with_default_catalog();
        let conversational =
            provider.get_configurations(LeAudioContextType::Conversational).unwrap();
        assert!(check_configuration_is_bidir_swb(&conversational[0]));
        assert!(!check_configuration_is_bidir_swb(&conversational[1]));

        let media = provider.get_configurations(LeAudioContextType::Media).unwrap();
        assert!(!check_configuration_is_bidir_swb(&media[0]));
    }
}
