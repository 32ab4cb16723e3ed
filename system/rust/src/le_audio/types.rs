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

//! Core LE Audio types shared by the device and group models.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use std::fmt;

/// Group id of a device that does not belong to any group.
pub const GROUP_UNKNOWN: i32 = -2;
/// Connection id of a device without a GATT connection.
pub const GATT_INVALID_CONN_ID: u16 = 0xFFFF;
/// `cis_id` of an ASE that has not been given a CIS yet.
pub const INVALID_CIS_ID: u8 = 0xFF;

pub const MAX_TRANSPORT_LATENCY_MIN: u16 = 0x0005;
pub const MAX_TRANSPORT_LATENCY_MAX: u16 = 0x0FA0;

/// Presentation delay value meaning "no preference" in QoS preferences.
pub const PRES_DELAY_NO_PREFERENCE: u32 = 0x0000_0000;

pub const TARGET_PHY_1M: u8 = 0x01;
pub const TARGET_PHY_2M: u8 = 0x02;
pub const TARGET_PHY_CODED: u8 = 0x03;

pub const ISO_CIG_PHY_1M: u8 = 0x01;
pub const ISO_CIG_PHY_2M: u8 = 0x02;
pub const ISO_CIG_PHY_CODED: u8 = 0x04;

pub const ISO_CIG_FRAMING_UNFRAMED: u8 = 0x00;
pub const ISO_CIG_FRAMING_FRAMED: u8 = 0x01;
pub const FRAMING_UNFRAMED_PDU_SUPPORTED: u8 = 0x00;
pub const FRAMING_UNFRAMED_PDU_UNSUPPORTED: u8 = 0x01;

pub const ISO_CIG_PACKING_SEQUENTIAL: u8 = 0x00;
pub const ISO_CIG_PACKING_INTERLEAVED: u8 = 0x01;

/// Best sleep clock accuracy class (0 to 20 ppm).
pub const ISO_SCA_0_TO_20_PPM: u8 = 0x07;
/// Sleep clock accuracy reading reported for peers that never sent one.
pub const SCA_UNKNOWN: u8 = 0xFF;

/// Audio direction from the point of view of the remote device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Sink = 0x01,
    Source = 0x02,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Sink, Direction::Source];

    pub fn opposite(self) -> Self {
        match self {
            Direction::Sink => Direction::Source,
            Direction::Source => Direction::Sink,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sink => write!(f, "sink"),
            Direction::Source => write!(f, "source"),
        }
    }
}

/// A value kept once per audio direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BidirectionalPair<T> {
    pub sink: T,
    pub source: T,
}

impl<T> BidirectionalPair<T> {
    pub fn new(sink: T, source: T) -> Self {
        Self { sink, source }
    }

    pub fn get(&self, direction: Direction) -> &T {
        match direction {
            Direction::Sink => &self.sink,
            Direction::Source => &self.source,
        }
    }

    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        match direction {
            Direction::Sink => &mut self.sink,
            Direction::Source => &mut self.source,
        }
    }
}

/// Single usage context, as carried in the metadata of an ASE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum LeAudioContextType {
    Uninitialized = 0x0000,
    Unspecified = 0x0001,
    Conversational = 0x0002,
    Media = 0x0004,
    Game = 0x0008,
    Instructional = 0x0010,
    VoiceAssistants = 0x0020,
    Live = 0x0040,
    SoundEffects = 0x0080,
    Notifications = 0x0100,
    Ringtone = 0x0200,
    Alerts = 0x0400,
    EmergencyAlarm = 0x0800,
    Rfu = 0x1000,
}

impl fmt::Display for LeAudioContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeAudioContextType::Uninitialized => "UNINITIALIZED",
            LeAudioContextType::Unspecified => "UNSPECIFIED",
            LeAudioContextType::Conversational => "CONVERSATIONAL",
            LeAudioContextType::Media => "MEDIA",
            LeAudioContextType::Game => "GAME",
            LeAudioContextType::Instructional => "INSTRUCTIONAL",
            LeAudioContextType::VoiceAssistants => "VOICEASSISTANTS",
            LeAudioContextType::Live => "LIVE",
            LeAudioContextType::SoundEffects => "SOUNDEFFECTS",
            LeAudioContextType::Notifications => "NOTIFICATIONS",
            LeAudioContextType::Ringtone => "RINGTONE",
            LeAudioContextType::Alerts => "ALERTS",
            LeAudioContextType::EmergencyAlarm => "EMERGENCYALARM",
            LeAudioContextType::Rfu => "RFU",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Set of usage contexts.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct AudioContexts: u16 {
        const UNSPECIFIED = LeAudioContextType::Unspecified as u16;
        const CONVERSATIONAL = LeAudioContextType::Conversational as u16;
        const MEDIA = LeAudioContextType::Media as u16;
        const GAME = LeAudioContextType::Game as u16;
        const INSTRUCTIONAL = LeAudioContextType::Instructional as u16;
        const VOICEASSISTANTS = LeAudioContextType::VoiceAssistants as u16;
        const LIVE = LeAudioContextType::Live as u16;
        const SOUNDEFFECTS = LeAudioContextType::SoundEffects as u16;
        const NOTIFICATIONS = LeAudioContextType::Notifications as u16;
        const RINGTONE = LeAudioContextType::Ringtone as u16;
        const ALERTS = LeAudioContextType::Alerts as u16;
        const EMERGENCYALARM = LeAudioContextType::EmergencyAlarm as u16;
    }
}

/// Contexts that need audio flowing in both directions.
pub const CONTEXT_ALL_BIDIR: AudioContexts = AudioContexts::CONVERSATIONAL
    .union(AudioContexts::GAME)
    .union(AudioContexts::LIVE)
    .union(AudioContexts::VOICEASSISTANTS);

/// Contexts where only the remote device produces audio.
pub const CONTEXT_ALL_REMOTE_SOURCE: AudioContexts =
    AudioContexts::LIVE.union(AudioContexts::VOICEASSISTANTS);

impl From<LeAudioContextType> for AudioContexts {
    fn from(context_type: LeAudioContextType) -> Self {
        AudioContexts::from_bits_retain(context_type as u16)
    }
}

impl AudioContexts {
    /// True if the single context `context_type` is in the set.
    pub fn test(&self, context_type: LeAudioContextType) -> bool {
        let bits = context_type as u16;
        bits != 0 && (self.bits() & bits) == bits
    }

    /// True if any context of `other` is in the set.
    pub fn test_any(&self, other: AudioContexts) -> bool {
        self.intersects(other)
    }

    /// Individual context types contained in the set, lowest bit first.
    pub fn context_types(&self) -> impl Iterator<Item = LeAudioContextType> + '_ {
        (0..16)
            .map(|shift| 1u16 << shift)
            .filter(move |bit| self.bits() & bit != 0)
            .filter_map(LeAudioContextType::from_u16)
    }
}

impl fmt::Display for AudioContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<String> = self.context_types().map(|c| c.to_string()).collect();
        write!(f, "{}", names.join(" | "))
    }
}

bitflags! {
    /// Audio channel locations.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct AudioLocations: u32 {
        const FRONT_LEFT = 0x0000_0001;
        const FRONT_RIGHT = 0x0000_0002;
        const FRONT_CENTER = 0x0000_0004;
        const LOW_FREQ_EFFECTS_1 = 0x0000_0008;
        const BACK_LEFT = 0x0000_0010;
        const BACK_RIGHT = 0x0000_0020;
        const FRONT_LEFT_OF_CENTER = 0x0000_0040;
        const FRONT_RIGHT_OF_CENTER = 0x0000_0080;
        const BACK_CENTER = 0x0000_0100;
        const LOW_FREQ_EFFECTS_2 = 0x0000_0200;
        const SIDE_LEFT = 0x0000_0400;
        const SIDE_RIGHT = 0x0000_0800;
        const TOP_FRONT_LEFT = 0x0000_1000;
        const TOP_FRONT_RIGHT = 0x0000_2000;
        const TOP_FRONT_CENTER = 0x0000_4000;
        const TOP_CENTER = 0x0000_8000;
        const TOP_BACK_LEFT = 0x0001_0000;
        const TOP_BACK_RIGHT = 0x0002_0000;
        const TOP_SIDE_LEFT = 0x0004_0000;
        const TOP_SIDE_RIGHT = 0x0008_0000;
        const TOP_BACK_CENTER = 0x0010_0000;
        const BOTTOM_FRONT_CENTER = 0x0020_0000;
        const BOTTOM_FRONT_LEFT = 0x0040_0000;
        const BOTTOM_FRONT_RIGHT = 0x0080_0000;
        const FRONT_LEFT_WIDE = 0x0100_0000;
        const FRONT_RIGHT_WIDE = 0x0200_0000;
        const LEFT_SURROUND = 0x0400_0000;
        const RIGHT_SURROUND = 0x0800_0000;

        const ANY_LEFT = Self::FRONT_LEFT.bits()
            | Self::BACK_LEFT.bits()
            | Self::FRONT_LEFT_OF_CENTER.bits()
            | Self::SIDE_LEFT.bits()
            | Self::TOP_FRONT_LEFT.bits()
            | Self::TOP_BACK_LEFT.bits()
            | Self::TOP_SIDE_LEFT.bits()
            | Self::BOTTOM_FRONT_LEFT.bits()
            | Self::FRONT_LEFT_WIDE.bits()
            | Self::LEFT_SURROUND.bits();

        const ANY_RIGHT = Self::FRONT_RIGHT.bits()
            | Self::BACK_RIGHT.bits()
            | Self::FRONT_RIGHT_OF_CENTER.bits()
            | Self::SIDE_RIGHT.bits()
            | Self::TOP_FRONT_RIGHT.bits()
            | Self::TOP_BACK_RIGHT.bits()
            | Self::TOP_SIDE_RIGHT.bits()
            | Self::BOTTOM_FRONT_RIGHT.bits()
            | Self::FRONT_RIGHT_WIDE.bits()
            | Self::RIGHT_SURROUND.bits();
    }
}

impl AudioLocations {
    fn lowest(bits: u32) -> AudioLocations {
        AudioLocations::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// Lowest left location in the set, or empty.
    pub fn first_left(&self) -> AudioLocations {
        Self::lowest(self.bits() & AudioLocations::ANY_LEFT.bits())
    }

    /// Lowest right location in the set, or empty.
    pub fn first_right(&self) -> AudioLocations {
        Self::lowest(self.bits() & AudioLocations::ANY_RIGHT.bits())
    }

    pub fn has_left(&self) -> bool {
        self.intersects(AudioLocations::ANY_LEFT)
    }

    pub fn has_right(&self) -> bool {
        self.intersects(AudioLocations::ANY_RIGHT)
    }
}

/// ASE state machine states, also used as the aggregate group state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AseState {
    #[default]
    Idle,
    CodecConfigured,
    QosConfigured,
    Enabling,
    Streaming,
    Disabling,
    Releasing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CisState {
    #[default]
    Idle,
    Assigned,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DataPathState {
    #[default]
    Idle,
    Configuring,
    Configured,
    Removing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CigState {
    #[default]
    None,
    Creating,
    Created,
    Removing,
    Recovering,
}

/// Direction(s) a CIS slot carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CisType {
    Bidirectional,
    UnidirectionalSink,
    UnidirectionalSource,
}

impl CisType {
    /// The unidirectional slot type serving `direction`.
    pub fn unidirectional(direction: Direction) -> Self {
        match direction {
            Direction::Sink => CisType::UnidirectionalSink,
            Direction::Source => CisType::UnidirectionalSource,
        }
    }
}

/// How audio channels map onto devices and CISes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum LeAudioConfigurationStrategy {
    /// One channel per device, one CIS per device.
    MonoOneCisPerDevice = 0x00,
    /// Two channels per device, one CIS per channel.
    StereoTwoCisesPerDevice = 0x01,
    /// Two channels per device, both on a single CIS.
    StereoOneCisPerDevice = 0x02,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeviceConnectState {
    #[default]
    Disconnected,
    ConnectingByUser,
    ConnectedByUserGettingReady,
    ConnectingAutoconnect,
    ConnectedAutoconnectGettingReady,
    Connected,
    Disconnecting,
    DisconnectingAndRecover,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn context_set_membership() {
        let contexts = AudioContexts::MEDIA | AudioContexts::CONVERSATIONAL;
        assert!(contexts.test(LeAudioContextType::Media));
        assert!(!contexts.test(LeAudioContextType::Game));
        assert!(!contexts.test(LeAudioContextType::Uninitialized));
        assert!(CONTEXT_ALL_BIDIR.test(LeAudioContextType::Conversational));
        assert!(!CONTEXT_ALL_BIDIR.test(LeAudioContextType::Media));
        assert_eq!(contexts.to_string(), "CONVERSATIONAL | MEDIA");
        assert_eq!(AudioContexts::empty().to_string(), "NONE");
    }

    #[test]
    fn first_left_and_right() {
        let locations = AudioLocations::SIDE_LEFT
            | AudioLocations::FRONT_LEFT
            | AudioLocations::BACK_RIGHT
            | AudioLocations::FRONT_CENTER;
        assert_eq!(locations.first_left(), AudioLocations::FRONT_LEFT);
        assert_eq!(locations.first_right(), AudioLocations::BACK_RIGHT);
        assert!(locations.has_left() && locations.has_right());
        assert!(AudioLocations::FRONT_CENTER.first_left().is_empty());
        assert!(!AudioLocations::FRONT_CENTER.has_right());
    }

    #[test]
    fn pair_is_indexed_by_direction() {
        let mut pair = BidirectionalPair::new(1, 2);
        *pair.get_mut(Direction::Source) += 10;
        assert_eq!(*pair.get(Direction::Sink), 1);
        assert_eq!(*pair.get(Direction::Source), 12);
        assert_eq!(Direction::Sink.opposite(), Direction::Source);
    }
}
