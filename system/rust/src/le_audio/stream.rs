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

//! Stream configuration bookkeeping of a group.

use std::sync::Arc;

use crate::le_audio::codec::CodecId;
use crate::le_audio::set_configurations::AudioSetConfiguration;
use crate::le_audio::types::BidirectionalPair;

/// What is currently streaming in one direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamParameters {
    pub num_of_devices: u8,
    pub num_of_channels: u8,
    pub audio_channel_allocation: u32,
    /// `(cis connection handle, channel allocation)` of every established CIS.
    pub stream_locations: Vec<(u16, u32)>,
    pub sample_frequency_hz: u32,
    pub frame_duration_us: u32,
    pub octets_per_codec_frame: u16,
    pub codec_frames_blocks_per_sdu: u8,
}

impl StreamParameters {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn has_handle(&self, cis_conn_hdl: u16) -> bool {
        self.stream_locations.iter().any(|(handle, _)| *handle == cis_conn_hdl)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StreamConfiguration {
    /// Configuration the group ASEs were last configured with.
    pub conf: Option<Arc<AudioSetConfiguration>>,
    pub stream_params: BidirectionalPair<StreamParameters>,
    pub codec_id: CodecId,
    /// A reconfiguration is waiting for the current stream to stop.
    pub pending_configuration: bool,
}

impl StreamConfiguration {
    /// True if `conf` is the very same catalog entry as the one in use.
    pub fn is_conf(&self, conf: Option<&Arc<AudioSetConfiguration>>) -> bool {
        match (&self.conf, conf) {
            (Some(current), Some(other)) => Arc::ptr_eq(current, other),
            (None, None) => true,
            _ => false,
        }
    }
}
