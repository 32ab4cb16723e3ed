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

//! Registry of all LE Audio device groups.

use log::{debug, error, info};

use crate::le_audio::codec_manager::CodecManager;
use crate::le_audio::devices::LeAudioDevices;
use crate::le_audio::error::LeAudioError;
use crate::le_audio::group::LeAudioDeviceGroup;
use crate::le_audio::interfaces::ControllerInterface;

#[derive(Default)]
pub struct LeAudioDeviceGroups {
    groups: Vec<LeAudioDeviceGroup>,
}

impl LeAudioDeviceGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty group with `group_id`.
    pub fn add(&mut self, group_id: i32) -> Result<&mut LeAudioDeviceGroup, LeAudioError> {
        if self.find_by_id(group_id).is_some() {
            error!("group already exists, id: {group_id:#x}");
            return Err(LeAudioError::GroupAlreadyExists(group_id));
        }

        info!("adding group {group_id}");
        self.groups.push(LeAudioDeviceGroup::new(group_id));
        let last = self.groups.len() - 1;
        Ok(&mut self.groups[last])
    }

    /// Destroys the group, detaching its members. Returns the CIS handles
    /// still to be disconnected.
    pub fn remove(
        &mut self,
        group_id: i32,
        devices: &mut LeAudioDevices,
        codec_manager: &mut CodecManager,
    ) -> Result<Vec<u16>, LeAudioError> {
        let Some(position) = self.groups.iter().position(|group| group.group_id() == group_id)
        else {
            error!("no such group_id: {group_id}");
            return Err(LeAudioError::NoSuchGroup(group_id));
        };

        let mut group = self.groups.remove(position);
        Ok(group.cleanup(devices, codec_manager))
    }

    pub fn find_by_id(&self, group_id: i32) -> Option<&LeAudioDeviceGroup> {
        self.groups.iter().find(|group| group.group_id() == group_id)
    }

    pub fn find_by_id_mut(&mut self, group_id: i32) -> Option<&mut LeAudioDeviceGroup> {
        self.groups.iter_mut().find(|group| group.group_id() == group_id)
    }

    /// Destroys every group. Returns the CIS handles still to be
    /// disconnected.
    pub fn cleanup(
        &mut self,
        devices: &mut LeAudioDevices,
        codec_manager: &mut CodecManager,
    ) -> Vec<u16> {
        let mut to_disconnect = vec![];
        for mut group in self.groups.drain(..) {
            to_disconnect.extend(group.cleanup(devices, codec_manager));
        }
        to_disconnect
    }

    pub fn size(&self) -> usize {
        self.groups.len()
    }

    pub fn get_groups_ids(&self) -> Vec<i32> {
        self.groups.iter().map(LeAudioDeviceGroup::group_id).collect()
    }

    pub fn is_any_in_transition(&self) -> bool {
        match self.groups.iter().find(|group| group.is_in_transition()) {
            Some(group) => {
                debug!("group: {} is in transition", group.group_id());
                true
            }
            None => false,
        }
    }

    /// Dump of every group, the active one first.
    pub fn dump(
        &self,
        devices: &LeAudioDevices,
        controller: &dyn ControllerInterface,
        active_group_id: i32,
    ) -> String {
        let (active, inactive): (Vec<_>, Vec<_>) =
            self.groups.iter().partition(|group| group.group_id() == active_group_id);
        active
            .into_iter()
            .chain(inactive)
            .map(|group| group.dump(devices, controller, active_group_id))
            .collect()
    }
}
