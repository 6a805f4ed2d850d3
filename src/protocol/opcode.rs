//! Open Interface opcodes.
//!
//! Every command on the wire is `[opcode][parameter bytes...]`, with 16-bit
//! parameters big-endian two's complement.

use std::fmt;

use super::mode::{ModeAccess, OiMode};

/// Command opcodes of the Roomba 500 Open Interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Start = 128,
    Baud = 129,
    Control = 130,
    Safe = 131,
    Full = 132,
    Power = 133,
    Spot = 134,
    Clean = 135,
    Max = 136,
    Drive = 137,
    Motors = 138,
    Leds = 139,
    Song = 140,
    Play = 141,
    Sensors = 142,
    SeekDock = 143,
    PwmMotors = 144,
    DriveDirect = 145,
    DrivePwm = 146,
    Stream = 148,
    QueryList = 149,
    PauseResumeStream = 150,
    SchedulingLeds = 162,
    DigitLedsRaw = 163,
    DigitLedsAscii = 164,
    Buttons = 165,
    Schedule = 167,
    SetDayTime = 168,
}

impl Opcode {
    /// Opcode byte.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Modes in which the robot accepts this command.
    pub fn access(self) -> ModeAccess {
        use Opcode::*;
        match self {
            Start => ModeAccess::Always,
            Drive | DriveDirect | DrivePwm | Motors | PwmMotors | Leds | SchedulingLeds
            | DigitLedsRaw | DigitLedsAscii | Play => ModeAccess::SafeOrFull,
            _ => ModeAccess::Started,
        }
    }

    /// Mode the robot is in after accepting this command, if it changes.
    pub fn mode_after(self) -> Option<OiMode> {
        use Opcode::*;
        match self {
            Start | Power | Spot | Clean | Max | SeekDock => Some(OiMode::Passive),
            Control | Safe => Some(OiMode::Safe),
            Full => Some(OiMode::Full),
            _ => None,
        }
    }

    /// Operation name used in errors and logs.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Start => "start",
            Baud => "baud",
            Control => "control",
            Safe => "safe",
            Full => "full",
            Power => "power",
            Spot => "spot",
            Clean => "clean",
            Max => "max",
            Drive => "drive",
            Motors => "motors",
            Leds => "leds",
            Song => "song",
            Play => "play",
            Sensors => "sensors",
            SeekDock => "seek_dock",
            PwmMotors => "pwm_motors",
            DriveDirect => "drive_direct",
            DrivePwm => "drive_pwm",
            Stream => "stream",
            QueryList => "query_list",
            PauseResumeStream => "pause_resume_stream",
            SchedulingLeds => "scheduling_leds",
            DigitLedsRaw => "digit_leds_raw",
            DigitLedsAscii => "digit_leds_ascii",
            Buttons => "buttons",
            Schedule => "schedule",
            SetDayTime => "set_day_time",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        let op = match value {
            128 => Start,
            129 => Baud,
            130 => Control,
            131 => Safe,
            132 => Full,
            133 => Power,
            134 => Spot,
            135 => Clean,
            136 => Max,
            137 => Drive,
            138 => Motors,
            139 => Leds,
            140 => Song,
            141 => Play,
            142 => Sensors,
            143 => SeekDock,
            144 => PwmMotors,
            145 => DriveDirect,
            146 => DrivePwm,
            148 => Stream,
            149 => QueryList,
            150 => PauseResumeStream,
            162 => SchedulingLeds,
            163 => DigitLedsRaw,
            164 => DigitLedsAscii,
            165 => Buttons,
            167 => Schedule,
            168 => SetDayTime,
            other => return Err(other),
        };
        Ok(op)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_matches_discriminant() {
        for byte in 0..=u8::MAX {
            if let Ok(op) = Opcode::try_from(byte) {
                assert_eq!(op.as_u8(), byte);
            }
        }
        assert_eq!(Opcode::try_from(147), Err(147));
    }

    #[test]
    fn test_mode_transitions() {
        assert_eq!(Opcode::Start.mode_after(), Some(OiMode::Passive));
        assert_eq!(Opcode::Control.mode_after(), Some(OiMode::Safe));
        assert_eq!(Opcode::Full.mode_after(), Some(OiMode::Full));
        assert_eq!(Opcode::SeekDock.mode_after(), Some(OiMode::Passive));
        assert_eq!(Opcode::Drive.mode_after(), None);
    }

    #[test]
    fn test_access() {
        assert_eq!(Opcode::Start.access(), ModeAccess::Always);
        assert_eq!(Opcode::Drive.access(), ModeAccess::SafeOrFull);
        assert_eq!(Opcode::Play.access(), ModeAccess::SafeOrFull);
        assert_eq!(Opcode::Song.access(), ModeAccess::Started);
        assert_eq!(Opcode::Buttons.access(), ModeAccess::Started);
    }
}
