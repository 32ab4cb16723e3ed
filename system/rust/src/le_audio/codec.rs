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

//! Codec identifiers, codec configurations and the capability records
//! (PACs) a device publishes for them.

use bitflags::bitflags;
use log::debug;

/// LC3 coding format as assigned by the Bluetooth SIG.
pub const CODING_FORMAT_LC3: u8 = 0x06;
/// Coding format used for vendor specific codecs.
pub const CODING_FORMAT_VENDOR_SPECIFIC: u8 = 0xFF;

/// LC3 always works on 16-bit PCM.
pub const LC3_BITS_PER_SAMPLE: u8 = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CodecId {
    pub coding_format: u8,
    pub vendor_company_id: u16,
    pub vendor_codec_id: u16,
}

impl CodecId {
    pub const LC3: CodecId =
        CodecId { coding_format: CODING_FORMAT_LC3, vendor_company_id: 0, vendor_codec_id: 0 };

    /// Whether codec parameters of this codec are carried as LTVs which we
    /// know how to check against capabilities.
    pub fn uses_ltv_format(&self) -> bool {
        self.coding_format == CODING_FORMAT_LC3
    }
}

bitflags! {
    /// Supported sampling frequencies capability field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct SamplingFrequencies: u16 {
        const HZ_8000 = 0x0001;
        const HZ_11025 = 0x0002;
        const HZ_16000 = 0x0004;
        const HZ_22050 = 0x0008;
        const HZ_24000 = 0x0010;
        const HZ_32000 = 0x0020;
        const HZ_44100 = 0x0040;
        const HZ_48000 = 0x0080;
        const HZ_88200 = 0x0100;
        const HZ_96000 = 0x0200;
        const HZ_176400 = 0x0400;
        const HZ_192000 = 0x0800;
        const HZ_384000 = 0x1000;
    }
}

impl SamplingFrequencies {
    /// Capability bit for a sampling rate, empty for unknown rates.
    pub fn from_hz(hz: u32) -> Self {
        match hz {
            8000 => Self::HZ_8000,
            11025 => Self::HZ_11025,
            16000 => Self::HZ_16000,
            22050 => Self::HZ_22050,
            24000 => Self::HZ_24000,
            32000 => Self::HZ_32000,
            44100 => Self::HZ_44100,
            48000 => Self::HZ_48000,
            88200 => Self::HZ_88200,
            96000 => Self::HZ_96000,
            176400 => Self::HZ_176400,
            192000 => Self::HZ_192000,
            384000 => Self::HZ_384000,
            _ => Self::empty(),
        }
    }
}

bitflags! {
    /// Supported frame durations capability field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct FrameDurations: u8 {
        const US_7500 = 0x01;
        const US_10000 = 0x02;
    }
}

impl FrameDurations {
    pub fn from_us(us: u32) -> Self {
        match us {
            7500 => Self::US_7500,
            10000 => Self::US_10000,
            _ => Self::empty(),
        }
    }
}

/// Codec specific configuration of a single ASE.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeAudioCoreCodecConfig {
    pub sampling_frequency_hz: u32,
    pub frame_duration_us: u32,
    pub octets_per_codec_frame: u16,
    pub codec_frames_blocks_per_sdu: u8,
    /// Picked when the ASE is configured; `None` in catalog entries.
    pub audio_channel_allocation: Option<u32>,
}

impl LeAudioCoreCodecConfig {
    pub fn data_interval_us(&self) -> u32 {
        self.frame_duration_us * u32::from(self.codec_frames_blocks_per_sdu.max(1))
    }
}

/// A codec configuration requirement: codec, its parameters and the number
/// of audio channels carried by one isochronous stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodecConfigSetting {
    pub id: CodecId,
    pub params: LeAudioCoreCodecConfig,
    pub channel_count_per_iso_stream: u8,
}

impl CodecConfigSetting {
    pub fn sampling_frequency_hz(&self) -> u32 {
        self.params.sampling_frequency_hz
    }

    pub fn data_interval_us(&self) -> u32 {
        self.params.data_interval_us()
    }

    pub fn octets_per_frame(&self) -> u16 {
        self.params.octets_per_codec_frame
    }

    pub fn bits_per_sample(&self) -> u8 {
        LC3_BITS_PER_SAMPLE
    }
}

/// Published Audio Capability record of a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacRecord {
    pub codec_id: CodecId,
    pub sampling_frequencies: SamplingFrequencies,
    pub frame_durations: FrameDurations,
    /// Bitmap where bit `n` means `n + 1` channels. Absent means one channel.
    pub supported_channel_counts: Option<u8>,
    pub octets_per_frame_min: u16,
    pub octets_per_frame_max: u16,
    pub max_codec_frames_per_sdu: u8,
}

impl PacRecord {
    pub fn channel_counts(&self) -> u8 {
        self.supported_channel_counts.unwrap_or(0b1)
    }

    /// Whether a device with this record can accept `setting`.
    pub fn supports(&self, setting: &CodecConfigSetting) -> bool {
        if self.codec_id != setting.id {
            return false;
        }

        // Parameters of codecs we cannot parse are accepted as long as the
        // codec itself matches.
        if !self.codec_id.uses_ltv_format() {
            return true;
        }

        let params = &setting.params;
        let sampling = SamplingFrequencies::from_hz(params.sampling_frequency_hz);
        if sampling.is_empty() || !self.sampling_frequencies.contains(sampling) {
            debug!("sampling frequency {} not supported", params.sampling_frequency_hz);
            return false;
        }

        let duration = FrameDurations::from_us(params.frame_duration_us);
        if duration.is_empty() || !self.frame_durations.contains(duration) {
            debug!("frame duration {} not supported", params.frame_duration_us);
            return false;
        }

        if params.octets_per_codec_frame < self.octets_per_frame_min
            || params.octets_per_codec_frame > self.octets_per_frame_max
        {
            debug!("octets per frame {} out of range", params.octets_per_codec_frame);
            return false;
        }

        let channels = setting.channel_count_per_iso_stream;
        if channels == 0 || channels > 8 || (1u8 << (channels - 1)) & self.channel_counts() == 0 {
            debug!("channel count {channels} not supported");
            return false;
        }

        params.codec_frames_blocks_per_sdu.max(1) <= self.max_codec_frames_per_sdu.max(1)
    }
}

/// Aggregated PCM level view of a group configuration in one direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeAudioCodecConfiguration {
    pub codec: CodecId,
    pub num_channels: u8,
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub data_interval_us: u32,
    pub octets_per_codec_frame: u16,
}

impl LeAudioCodecConfiguration {
    pub fn is_invalid(&self) -> bool {
        self.num_channels == 0
            || self.sample_rate == 0
            || self.bits_per_sample == 0
            || self.data_interval_us == 0
    }
}
