//! Command parameter types and bit masks.

use serde::{Deserialize, Serialize};

use crate::error::{OiError, Result};

/// Drive velocity limit in mm/s.
pub const MAX_VELOCITY: i16 = 500;
/// Drive radius limit in mm.
pub const MAX_RADIUS: i16 = 2000;
/// Wheel PWM limit.
pub const MAX_WHEEL_PWM: i16 = 255;
/// Brush / vacuum duty cycle limit.
pub const MAX_MOTOR_PWM: i8 = 127;
/// Highest song slot.
pub const MAX_SONG_NUMBER: u8 = 4;
/// Notes per song.
pub const MAX_SONG_NOTES: usize = 16;

/// Special drive radius values.
pub mod radius {
    /// Drive straight (0x7FFF).
    pub const STRAIGHT: i16 = 0x7FFF;
    /// Drive straight (0x8000, i.e. 32768 on the wire).
    pub const STRAIGHT_ALT: i16 = i16::MIN;
    /// Turn in place clockwise.
    pub const TURN_CLOCKWISE: i16 = -1;
    /// Turn in place counter-clockwise.
    pub const TURN_COUNTER_CLOCKWISE: i16 = 1;

    /// Whether a radius is a sentinel rather than a distance.
    #[inline]
    pub fn is_special(radius: i16) -> bool {
        matches!(
            radius,
            STRAIGHT | STRAIGHT_ALT | TURN_CLOCKWISE | TURN_COUNTER_CLOCKWISE
        )
    }
}

/// Cleaning motor bits for [`motors`](crate::OpenInterface::motors).
pub mod motors {
    pub const SIDE_BRUSH: u8 = 0b0000_0001;
    pub const VACUUM: u8 = 0b0000_0010;
    pub const MAIN_BRUSH: u8 = 0b0000_0100;
    /// Side brush turns clockwise instead of counter-clockwise.
    pub const SIDE_BRUSH_CLOCKWISE: u8 = 0b0000_1000;
    /// Main brush turns outward instead of inward.
    pub const MAIN_BRUSH_OUTWARD: u8 = 0b0001_0000;

    pub const MASK: u8 = 0b0001_1111;
}

/// LED bits for [`leds`](crate::OpenInterface::leds).
pub mod leds {
    pub const DEBRIS: u8 = 0b0000_0001;
    pub const SPOT: u8 = 0b0000_0010;
    pub const DOCK: u8 = 0b0000_0100;
    pub const CHECK_ROBOT: u8 = 0b0000_1000;

    pub const MASK: u8 = 0b0000_1111;
}

/// Scheduling LED bits (Roomba 560/570).
pub mod scheduling_leds {
    pub const COLON: u8 = 0b0000_0001;
    pub const PM: u8 = 0b0000_0010;
    pub const AM: u8 = 0b0000_0100;
    pub const CLOCK: u8 = 0b0000_1000;
    pub const SCHEDULE: u8 = 0b0001_0000;

    pub const MASK: u8 = 0b0001_1111;
}

/// Day-of-week bits, used by `schedule` and `scheduling_leds`.
pub mod days {
    pub const SUNDAY: u8 = 0b0000_0001;
    pub const MONDAY: u8 = 0b0000_0010;
    pub const TUESDAY: u8 = 0b0000_0100;
    pub const WEDNESDAY: u8 = 0b0000_1000;
    pub const THURSDAY: u8 = 0b0001_0000;
    pub const FRIDAY: u8 = 0b0010_0000;
    pub const SATURDAY: u8 = 0b0100_0000;

    pub const MASK: u8 = 0b0111_1111;
}

/// Button bits for [`buttons`](crate::OpenInterface::buttons).
pub mod buttons {
    pub const CLEAN: u8 = 0b0000_0001;
    pub const SPOT: u8 = 0b0000_0010;
    pub const DOCK: u8 = 0b0000_0100;
    pub const MINUTE: u8 = 0b0000_1000;
    pub const HOUR: u8 = 0b0001_0000;
    pub const DAY: u8 = 0b0010_0000;
    pub const SCHEDULE: u8 = 0b0100_0000;
    pub const CLOCK: u8 = 0b1000_0000;
}

/// Seven-segment bits for raw digit LEDs.
pub mod segments {
    pub const A: u8 = 0b0000_0001;
    pub const B: u8 = 0b0000_0010;
    pub const C: u8 = 0b0000_0100;
    pub const D: u8 = 0b0000_1000;
    pub const E: u8 = 0b0001_0000;
    pub const F: u8 = 0b0010_0000;
    pub const G: u8 = 0b0100_0000;

    pub const MASK: u8 = 0b0111_1111;
}

/// Blank glyph sent for characters the digit display cannot show.
pub const BLANK_GLYPH: u8 = b' ';

/// Map a character onto the digit display's ASCII range (32-126).
pub fn ascii_glyph(c: char) -> u8 {
    match u8::try_from(c) {
        Ok(b @ 32..=126) => b,
        _ => BLANK_GLYPH,
    }
}

/// Baud rate codes for the `baud` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BaudCode {
    B300 = 0,
    B600 = 1,
    B1200 = 2,
    B2400 = 3,
    B4800 = 4,
    B9600 = 5,
    B14400 = 6,
    B19200 = 7,
    B28800 = 8,
    B38400 = 9,
    B57600 = 10,
    B115200 = 11,
}

impl BaudCode {
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudCode::B300 => 300,
            BaudCode::B600 => 600,
            BaudCode::B1200 => 1200,
            BaudCode::B2400 => 2400,
            BaudCode::B4800 => 4800,
            BaudCode::B9600 => 9600,
            BaudCode::B14400 => 14400,
            BaudCode::B19200 => 19200,
            BaudCode::B28800 => 28800,
            BaudCode::B38400 => 38400,
            BaudCode::B57600 => 57600,
            BaudCode::B115200 => 115200,
        }
    }
}

impl TryFrom<u8> for BaudCode {
    type Error = OiError;

    fn try_from(code: u8) -> Result<Self> {
        use BaudCode::*;
        const CODES: [BaudCode; 12] = [
            B300, B600, B1200, B2400, B4800, B9600, B14400, B19200, B28800, B38400, B57600,
            B115200,
        ];
        CODES
            .get(code as usize)
            .copied()
            .ok_or_else(|| OiError::invalid(format!("baud code {} out of range 0-11", code)))
    }
}

/// Day of the week for `set_day_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Day {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

/// Time of day, 24-hour clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// Hour 0-23, minute 0-59.
    pub fn validate(&self) -> Result<()> {
        if self.hour > 23 {
            return Err(OiError::invalid(format!("hour {} out of range 0-23", self.hour)));
        }
        if self.minute > 59 {
            return Err(OiError::invalid(format!(
                "minute {} out of range 0-59",
                self.minute
            )));
        }
        Ok(())
    }
}

/// One note of a song: MIDI pitch and duration in 1/64 s.
///
/// Pitches outside 31-127 are played as rests by the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub duration: u8,
}

impl Note {
    pub fn new(pitch: u8, duration: u8) -> Self {
        Self { pitch, duration }
    }

    /// A silent note.
    pub fn rest(duration: u8) -> Self {
        Self { pitch: 0, duration }
    }
}
