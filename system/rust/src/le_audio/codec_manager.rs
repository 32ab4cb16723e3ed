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

//! Codec manager: picks configurations out of the catalog and tracks the CIS
//! layout an offloaded encoder must be told about.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::get_sysprop;
use crate::le_audio::cig::{Cis, CigConfiguration};
use crate::le_audio::set_configurations::{
    check_configuration_is_bidir_swb, AudioSetConfiguration, AudioSetConfigurationProvider,
};
use crate::le_audio::stream::StreamParameters;
use crate::le_audio::types::{BidirectionalPair, Direction, LeAudioContextType};

/// Where the audio is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecLocation {
    Host,
    Adsp,
}

impl std::str::FromStr for CodecLocation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(CodecLocation::Host),
            "adsp" | "offload" => Ok(CodecLocation::Adsp),
            _ => Err(()),
        }
    }
}

/// Per-CIS channel mapping handed to an offloaded encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CisConfiguration {
    pub conn_handle: u16,
    pub audio_channel_allocation: u32,
    pub is_active: bool,
}

pub struct CodecManager {
    provider: Box<dyn AudioSetConfigurationProvider + Send>,
    codec_location: CodecLocation,
    dual_bidir_swb_supported: bool,
    offload_cis_configuration: BidirectionalPair<Vec<CisConfiguration>>,
}

impl CodecManager {
    /// Creates a manager whose capabilities come from system properties.
    pub fn new(provider: Box<dyn AudioSetConfigurationProvider + Send>) -> Self {
        let dual_bidir_swb_supported =
            get_sysprop!(bta, le_audio_dual_bidir_swb_supported, false);
        let codec_location = get_sysprop!(bta, le_audio_codec_location, CodecLocation::Host);
        info!("codec location {codec_location:?}, dual bidir swb {dual_bidir_swb_supported}");
        Self {
            provider,
            codec_location,
            dual_bidir_swb_supported,
            offload_cis_configuration: BidirectionalPair::default(),
        }
    }

    pub fn with_dual_bidir_swb_supported(mut self, supported: bool) -> Self {
        self.dual_bidir_swb_supported = supported;
        self
    }

    pub fn with_codec_location(mut self, location: CodecLocation) -> Self {
        self.codec_location = location;
        self
    }

    pub fn codec_location(&self) -> CodecLocation {
        self.codec_location
    }

    pub fn is_dual_bidir_swb_supported(&self) -> bool {
        self.dual_bidir_swb_supported
    }

    pub fn check_codec_config_is_bidir_swb(&self, configuration: &AudioSetConfiguration) -> bool {
        check_configuration_is_bidir_swb(configuration)
    }

    /// Runs `selector` over the catalog list of `context_type`.
    pub fn get_codec_config<F>(
        &self,
        context_type: LeAudioContextType,
        selector: F,
    ) -> Option<Arc<AudioSetConfiguration>>
    where
        F: FnOnce(
            LeAudioContextType,
            &[Arc<AudioSetConfiguration>],
        ) -> Option<Arc<AudioSetConfiguration>>,
    {
        match self.provider.get_configurations(context_type) {
            Some(configurations) => selector(context_type, configurations),
            None => {
                warn!("no configurations for {context_type}");
                None
            }
        }
    }

    /// Rebuilds the offload CIS table of `direction` from the streams
    /// currently established.
    pub fn update_cis_configuration(
        &mut self,
        cises: &[Cis],
        stream_params: &StreamParameters,
        direction: Direction,
    ) {
        if self.codec_location != CodecLocation::Adsp {
            return;
        }

        let cis_configs = self.offload_cis_configuration.get_mut(direction);
        cis_configs.clear();
        for cis in cises {
            if !CigConfiguration::is_cis_for_direction(cis, direction) || cis.conn_handle == 0 {
                continue;
            }
            let location = stream_params
                .stream_locations
                .iter()
                .find(|(handle, _)| *handle == cis.conn_handle);
            cis_configs.push(CisConfiguration {
                conn_handle: cis.conn_handle,
                audio_channel_allocation: location.map(|(_, allocation)| *allocation).unwrap_or(0),
                is_active: location.is_some(),
            });
        }
        debug!("{direction} offload cis configuration: {cis_configs:?}");
    }

    /// Empties the offload table of `direction`. It is filled again by the
    /// next [`Self::update_cis_configuration`].
    pub fn clear_cis_configuration(&mut self, direction: Direction) {
        if self.codec_location != CodecLocation::Adsp {
            return;
        }
        self.offload_cis_configuration.get_mut(direction).clear();
    }

    pub fn get_cis_configuration(&self, direction: Direction) -> &[CisConfiguration] {
        self.offload_cis_configuration.get(direction)
    }
}
