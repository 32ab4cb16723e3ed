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

//! LE Audio device group configuration engine.
//!
//! Devices live in [`devices::LeAudioDevices`] and are grouped into
//! [`group::LeAudioDeviceGroup`]s kept by the [`groups::LeAudioDeviceGroups`]
//! registry. A group picks an audio set configuration from the catalog held
//! by the [`codec_manager::CodecManager`], activates its members' ASEs for it
//! and manages the CIS slots needed to stream it.

pub mod cig;
pub mod codec;
pub mod codec_manager;
pub mod device;
pub mod devices;
pub mod error;
pub mod group;
pub mod groups;
pub mod interfaces;
pub mod set_configurations;
pub mod stream;
pub mod types;

#[cfg(test)]
mod tests;
