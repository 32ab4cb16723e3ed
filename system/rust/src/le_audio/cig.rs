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

//! Connected Isochronous Group bookkeeping: the table of CIS slots a group
//! needs and their binding to devices and controller handles.
//!
//! A slot goes through these stages:
//!
//! ```text
//!   generate_cis_ids       assign_cis_ids        assign_cis_conn_handles
//! ------------------> id --------------> bound --------------------------> handle bound
//!                      ^                                                       |
//!                      +------------------------ unassign_cis -----------------+
//! ```
//!
//! `clear` drops the whole table.

use log::{debug, error, info, warn};

use crate::le_audio::device::LeAudioDevice;
use crate::le_audio::error::LeAudioError;
use crate::le_audio::set_configurations::CisCount;
use crate::le_audio::types::{CigState, CisType, Direction, INVALID_CIS_ID};
use crate::utils::address::RawAddress;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cis {
    pub id: u8,
    pub cis_type: CisType,
    /// Zero until the controller created the CIG.
    pub conn_handle: u16,
    pub addr: Option<RawAddress>,
}

#[derive(Debug)]
pub struct CigConfiguration {
    group_id: i32,
    state: CigState,
    pub cises: Vec<Cis>,
}

impl CigConfiguration {
    pub fn new(group_id: i32) -> Self {
        CigConfiguration { group_id, state: CigState::None, cises: vec![] }
    }

    pub fn get_state(&self) -> CigState {
        self.state
    }

    pub fn set_state(&mut self, state: CigState) {
        debug!("group {}: cig state {:?} -> {:?}", self.group_id, self.state, state);
        self.state = state;
    }

    /// Lowest unbound slot of `cis_type`.
    pub fn get_first_free_cis_id(&self, cis_type: CisType) -> Option<u8> {
        let id = self
            .cises
            .iter()
            .find(|cis| cis.addr.is_none() && cis.cis_type == cis_type)
            .map(|cis| cis.id);
        debug!("group {}: first free {:?} cis: {:?}", self.group_id, cis_type, id);
        id
    }

    /// Allocates the slot table. Does nothing if it already exists.
    pub fn generate_cis_ids(&mut self, count: CisCount) {
        if !self.cises.is_empty() {
            info!("group {}: CIS IDs already generated", self.group_id);
            return;
        }

        let types = std::iter::repeat(CisType::Bidirectional)
            .take(usize::from(count.bidirectional))
            .chain(
                std::iter::repeat(CisType::UnidirectionalSink)
                    .take(usize::from(count.unidirectional_sink)),
            )
            .chain(
                std::iter::repeat(CisType::UnidirectionalSource)
                    .take(usize::from(count.unidirectional_source)),
            );

        for (id, cis_type) in types.enumerate() {
            let Ok(id) = u8::try_from(id) else {
                error!("group {}: too many CISes requested: {}", self.group_id, count.total());
                break;
            };
            self.cises.push(Cis { id, cis_type, conn_handle: 0, addr: None });
        }

        info!("group {}: generated {:?}", self.group_id, count);
    }

    fn bind(&mut self, cis_id: u8, address: RawAddress) {
        if let Some(cis) = self.cises.get_mut(usize::from(cis_id)) {
            cis.addr = Some(address);
        }
    }

    /// Gives every active ASE of `device` a CIS slot.
    ///
    /// A sink and a source ASE are put on one bidirectional CIS when
    /// possible. Otherwise an ASE takes a unidirectional slot of its own
    /// direction, and a free bidirectional one if those are exhausted.
    /// Returns false only if no usable slot is left.
    pub fn assign_cis_ids(&mut self, device: &mut LeAudioDevice) -> bool {
        let address = device.address;
        info!("group {}: device {}", self.group_id, address.to_loggable_string());

        if device.get_first_active_ase().is_none() {
            error!("{}: no active ASE", address.to_loggable_string());
            return false;
        }

        for idx in 0..device.ases.len() {
            if !device.ases[idx].active {
                continue;
            }

            let mut cis_id = None;
            let ase_cis_id = device.ases[idx].cis_id;
            if ase_cis_id != INVALID_CIS_ID {
                match self.cises.get(usize::from(ase_cis_id)) {
                    Some(cis) if cis.addr.is_some() => {
                        info!(
                            "ASE ID: {} is already assigned CIS ID: {}",
                            device.ases[idx].id, ase_cis_id
                        );
                        continue;
                    }
                    Some(_) => cis_id = Some(ase_cis_id),
                    None => {
                        warn!(
                            "ASE ID: {} has out of range CIS ID: {}",
                            device.ases[idx].id, ase_cis_id
                        );
                        device.ases[idx].cis_id = INVALID_CIS_ID;
                    }
                }
            }

            // Look for a mate in the other direction that can share the CIS.
            let mut matching = device.get_next_active_ase_with_different_direction(idx);
            while let Some(mate) = matching {
                let mate_cis_id = device.ases[mate].cis_id;
                if mate_cis_id == INVALID_CIS_ID || Some(mate_cis_id) == cis_id {
                    break;
                }
                matching = device.get_next_active_ase_with_same_direction(mate);
            }

            if let Some(mate) = matching {
                if cis_id.is_none() {
                    cis_id = self.get_first_free_cis_id(CisType::Bidirectional);
                }

                if let Some(id) = cis_id {
                    device.ases[idx].cis_id = id;
                    device.ases[mate].cis_id = id;
                    self.bind(id, address);
                    info!(
                        "ASE ID: {} and ASE ID: {} assigned to bidirectional CIS ID: {}",
                        device.ases[idx].id, device.ases[mate].id, id
                    );
                    continue;
                }

                warn!(
                    "ASE ID: {}, no free bidirectional CIS, using a unidirectional one",
                    device.ases[idx].id
                );
            }

            let direction = device.ases[idx].direction;
            if cis_id.is_none() {
                cis_id = self
                    .get_first_free_cis_id(CisType::unidirectional(direction))
                    .or_else(|| self.get_first_free_cis_id(CisType::Bidirectional));
            }

            let Some(id) = cis_id else {
                error!(
                    "Unable to get free {} CIS ID for ASE ID: {}",
                    direction, device.ases[idx].id
                );
                return false;
            };

            device.ases[idx].cis_id = id;
            self.bind(id, address);
            info!("ASE ID: {} assigned to {} CIS ID: {}", device.ases[idx].id, direction, id);
        }

        true
    }

    /// Stores the handles the controller returned for the CIG, in slot order.
    pub fn assign_cis_conn_handles(&mut self, conn_handles: &[u16]) -> Result<(), LeAudioError> {
        if conn_handles.len() != self.cises.len() {
            error!(
                "group {}: {} handles for {} CISes",
                self.group_id, conn_handles.len(), self.cises.len()
            );
            return Err(LeAudioError::CisHandleCountMismatch {
                expected: self.cises.len(),
                actual: conn_handles.len(),
            });
        }

        for (cis, &handle) in self.cises.iter_mut().zip(conn_handles) {
            cis.conn_handle = handle;
        }
        info!("group {}: assigned {} CIS handles", self.group_id, conn_handles.len());
        Ok(())
    }

    /// Releases every slot bound to `address`, keeping ids for reuse.
    pub fn unassign_cis(&mut self, address: &RawAddress) {
        for cis in self.cises.iter_mut().filter(|cis| cis.addr.as_ref() == Some(address)) {
            debug!("group {}: unassigning cis {}", self.group_id, cis.id);
            cis.addr = None;
        }
    }

    pub fn get_cis(&self, cis_id: u8) -> Option<&Cis> {
        self.cises.get(usize::from(cis_id))
    }

    /// Whether slot `cis` carries audio in `direction`.
    pub fn is_cis_for_direction(cis: &Cis, direction: Direction) -> bool {
        cis.cis_type == CisType::Bidirectional || cis.cis_type == CisType::unidirectional(direction)
    }

    pub fn clear(&mut self) {
        self.cises.clear();
    }
}
