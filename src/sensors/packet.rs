//! Packet schema registry.
//!
//! Static table of every Roomba 500 sensor packet with its wire width and
//! signedness, plus the group packets that expand to ordered member lists:
//!
//! ```text
//! ┌───────┬─────────┬───────┐
//! │ Group │ Members │ Bytes │
//! ├───────┼─────────┼───────┤
//! │   0   │  7-26   │  26   │
//! │   1   │  7-16   │  10   │
//! │   2   │ 17-20   │   6   │
//! │   3   │ 21-26   │  10   │
//! │   4   │ 27-34   │  14   │
//! │   5   │ 35-42   │  12   │
//! │   6   │  7-42   │  52   │
//! │  100  │  7-58   │  80   │
//! │  101  │ 43-58   │  28   │
//! │  106  │ 46-51   │  12   │
//! │  107  │ 54-58   │   9   │
//! └───────┴─────────┴───────┘
//! ```

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Sensor packet identifier (individual packet or group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(pub u8);

impl PacketId {
    pub const PACKETS_7_THRU_26: PacketId = PacketId(0);
    pub const PACKETS_7_THRU_16: PacketId = PacketId(1);
    pub const PACKETS_17_THRU_20: PacketId = PacketId(2);
    pub const PACKETS_21_THRU_26: PacketId = PacketId(3);
    pub const PACKETS_27_THRU_34: PacketId = PacketId(4);
    pub const PACKETS_35_THRU_42: PacketId = PacketId(5);
    pub const PACKETS_7_THRU_42: PacketId = PacketId(6);
    pub const BUMPS_AND_WHEEL_DROPS: PacketId = PacketId(7);
    pub const WALL: PacketId = PacketId(8);
    pub const CLIFF_LEFT: PacketId = PacketId(9);
    pub const CLIFF_FRONT_LEFT: PacketId = PacketId(10);
    pub const CLIFF_FRONT_RIGHT: PacketId = PacketId(11);
    pub const CLIFF_RIGHT: PacketId = PacketId(12);
    pub const VIRTUAL_WALL: PacketId = PacketId(13);
    pub const MOTOR_OVERCURRENTS: PacketId = PacketId(14);
    pub const DIRT_DETECT: PacketId = PacketId(15);
    pub const INFRARED_CHARACTER_OMNI: PacketId = PacketId(17);
    pub const BUTTONS: PacketId = PacketId(18);
    pub const DISTANCE: PacketId = PacketId(19);
    pub const ANGLE: PacketId = PacketId(20);
    pub const CHARGING_STATE: PacketId = PacketId(21);
    pub const VOLTAGE: PacketId = PacketId(22);
    pub const CURRENT: PacketId = PacketId(23);
    pub const TEMPERATURE: PacketId = PacketId(24);
    pub const BATTERY_CHARGE: PacketId = PacketId(25);
    pub const BATTERY_CAPACITY: PacketId = PacketId(26);
    pub const WALL_SIGNAL: PacketId = PacketId(27);
    pub const CLIFF_LEFT_SIGNAL: PacketId = PacketId(28);
    pub const CLIFF_FRONT_LEFT_SIGNAL: PacketId = PacketId(29);
    pub const CLIFF_FRONT_RIGHT_SIGNAL: PacketId = PacketId(30);
    pub const CLIFF_RIGHT_SIGNAL: PacketId = PacketId(31);
    pub const CHARGING_SOURCES_AVAILABLE: PacketId = PacketId(34);
    pub const OI_MODE: PacketId = PacketId(35);
    pub const SONG_NUMBER: PacketId = PacketId(36);
    pub const SONG_PLAYING: PacketId = PacketId(37);
    pub const NUMBER_OF_STREAM_PACKETS: PacketId = PacketId(38);
    pub const REQUESTED_VELOCITY: PacketId = PacketId(39);
    pub const REQUESTED_RADIUS: PacketId = PacketId(40);
    pub const REQUESTED_RIGHT_VELOCITY: PacketId = PacketId(41);
    pub const REQUESTED_LEFT_VELOCITY: PacketId = PacketId(42);
    pub const RIGHT_ENCODER_COUNTS: PacketId = PacketId(43);
    pub const LEFT_ENCODER_COUNTS: PacketId = PacketId(44);
    pub const LIGHT_BUMPER: PacketId = PacketId(45);
    pub const LIGHT_BUMP_LEFT_SIGNAL: PacketId = PacketId(46);
    pub const LIGHT_BUMP_FRONT_LEFT_SIGNAL: PacketId = PacketId(47);
    pub const LIGHT_BUMP_CENTER_LEFT_SIGNAL: PacketId = PacketId(48);
    pub const LIGHT_BUMP_CENTER_RIGHT_SIGNAL: PacketId = PacketId(49);
    pub const LIGHT_BUMP_FRONT_RIGHT_SIGNAL: PacketId = PacketId(50);
    pub const LIGHT_BUMP_RIGHT_SIGNAL: PacketId = PacketId(51);
    pub const INFRARED_CHARACTER_LEFT: PacketId = PacketId(52);
    pub const INFRARED_CHARACTER_RIGHT: PacketId = PacketId(53);
    pub const LEFT_MOTOR_CURRENT: PacketId = PacketId(54);
    pub const RIGHT_MOTOR_CURRENT: PacketId = PacketId(55);
    pub const MAIN_BRUSH_MOTOR_CURRENT: PacketId = PacketId(56);
    pub const SIDE_BRUSH_MOTOR_CURRENT: PacketId = PacketId(57);
    pub const STASIS: PacketId = PacketId(58);
    pub const ALL_SENSOR_DATA: PacketId = PacketId(100);
    pub const PACKETS_7_THRU_58: PacketId = PacketId(100);
    pub const PACKETS_43_THRU_58: PacketId = PacketId(101);
    pub const PACKETS_46_THRU_51: PacketId = PacketId(106);
    pub const PACKETS_54_THRU_58: PacketId = PacketId(107);

    /// Raw id byte.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// True for ids with a descriptor in the registry.
    #[inline]
    pub fn is_individual(self) -> bool {
        FIRST_INDIVIDUAL <= self.0 && self.0 <= LAST_INDIVIDUAL
    }

    /// True for group ids (0-6, 100, 101, 106, 107).
    #[inline]
    pub fn is_group(self) -> bool {
        group_members(self).is_some()
    }

    /// True for any id the robot understands.
    #[inline]
    pub fn is_known(self) -> bool {
        self.is_individual() || self.is_group()
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for PacketId {
    fn from(id: u8) -> Self {
        PacketId(id)
    }
}

/// Wire width of an individual packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Width {
    One,
    Two,
}

impl Width {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            Width::One => 1,
            Width::Two => 2,
        }
    }
}

/// Immutable description of an individual sensor packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketDescriptor {
    pub id: PacketId,
    pub width: Width,
    pub signed: bool,
}

impl PacketDescriptor {
    const fn new(id: u8, width: Width, signed: bool) -> Self {
        Self {
            id: PacketId(id),
            width,
            signed,
        }
    }

    /// Number of bytes this packet occupies on the wire.
    #[inline]
    pub fn len(&self) -> usize {
        self.width.bytes()
    }
}

const FIRST_INDIVIDUAL: u8 = 7;
const LAST_INDIVIDUAL: u8 = 58;

use Width::{One, Two};

/// Descriptors for packets 7..=58, indexed by `id - 7`.
///
/// Packets 16, 32 and 33 are unused by the robot but still occupy bytes inside
/// group packets, so they stay in the table.
static DESCRIPTORS: [PacketDescriptor; 52] = [
    PacketDescriptor::new(7, One, false),
    PacketDescriptor::new(8, One, false),
    PacketDescriptor::new(9, One, false),
    PacketDescriptor::new(10, One, false),
    PacketDescriptor::new(11, One, false),
    PacketDescriptor::new(12, One, false),
    PacketDescriptor::new(13, One, false),
    PacketDescriptor::new(14, One, false),
    PacketDescriptor::new(15, One, false),
    PacketDescriptor::new(16, One, false),
    PacketDescriptor::new(17, One, false),
    PacketDescriptor::new(18, One, false),
    PacketDescriptor::new(19, Two, true),
    PacketDescriptor::new(20, Two, true),
    PacketDescriptor::new(21, One, false),
    PacketDescriptor::new(22, Two, false),
    PacketDescriptor::new(23, Two, true),
    PacketDescriptor::new(24, One, true),
    PacketDescriptor::new(25, Two, false),
    PacketDescriptor::new(26, Two, false),
    PacketDescriptor::new(27, Two, false),
    PacketDescriptor::new(28, Two, false),
    PacketDescriptor::new(29, Two, false),
    PacketDescriptor::new(30, Two, false),
    PacketDescriptor::new(31, Two, false),
    PacketDescriptor::new(32, One, false),
    PacketDescriptor::new(33, Two, false),
    PacketDescriptor::new(34, One, false),
    PacketDescriptor::new(35, One, false),
    PacketDescriptor::new(36, One, false),
    PacketDescriptor::new(37, One, false),
    PacketDescriptor::new(38, One, false),
    PacketDescriptor::new(39, Two, true),
    PacketDescriptor::new(40, Two, true),
    PacketDescriptor::new(41, Two, true),
    PacketDescriptor::new(42, Two, true),
    PacketDescriptor::new(43, Two, false),
    PacketDescriptor::new(44, Two, false),
    PacketDescriptor::new(45, One, false),
    PacketDescriptor::new(46, Two, false),
    PacketDescriptor::new(47, Two, false),
    PacketDescriptor::new(48, Two, false),
    PacketDescriptor::new(49, Two, false),
    PacketDescriptor::new(50, Two, false),
    PacketDescriptor::new(51, Two, false),
    PacketDescriptor::new(52, One, false),
    PacketDescriptor::new(53, One, false),
    PacketDescriptor::new(54, Two, true),
    PacketDescriptor::new(55, Two, true),
    PacketDescriptor::new(56, Two, true),
    PacketDescriptor::new(57, Two, true),
    PacketDescriptor::new(58, One, false),
];

/// Look up the descriptor of an individual packet.
///
/// Returns `None` for group ids and unknown ids.
pub fn descriptor(id: PacketId) -> Option<&'static PacketDescriptor> {
    if !id.is_individual() {
        return None;
    }
    DESCRIPTORS.get((id.0 - FIRST_INDIVIDUAL) as usize)
}

/// Member range of a group packet.
fn group_members(id: PacketId) -> Option<RangeInclusive<u8>> {
    let range = match id.0 {
        0 => 7..=26,
        1 => 7..=16,
        2 => 17..=20,
        3 => 21..=26,
        4 => 27..=34,
        5 => 35..=42,
        6 => 7..=42,
        100 => 7..=58,
        101 => 43..=58,
        106 => 46..=51,
        107 => 54..=58,
        _ => return None,
    };
    Some(range)
}

/// Expand an id into its ordered individual descriptors.
///
/// Individual ids expand to themselves, groups to their members in ascending
/// order. Unknown ids return `None`.
pub fn expand(id: PacketId) -> Option<&'static [PacketDescriptor]> {
    if let Some(members) = group_members(id) {
        let start = (*members.start() - FIRST_INDIVIDUAL) as usize;
        let end = (*members.end() - FIRST_INDIVIDUAL) as usize;
        return DESCRIPTORS.get(start..=end);
    }
    if !id.is_individual() {
        return None;
    }
    let index = (id.0 - FIRST_INDIVIDUAL) as usize;
    DESCRIPTORS.get(index..=index)
}

/// Total wire width of an id (individual or group).
pub fn wire_len(id: PacketId) -> Option<usize> {
    expand(id).map(|d| d.iter().map(PacketDescriptor::len).sum())
}
