//! Command encoding.
//!
//! Each constructor validates its parameters and produces the exact wire
//! bytes for one opcode. Nothing here performs I/O; a `Command` that exists
//! is always valid to send.
//!
//! # Example
//!
//! ```
//! use roomba_oi::protocol::Command;
//!
//! let cmd = Command::drive(-200, 500).unwrap();
//! assert_eq!(&cmd.encode()[..], &[137, 0xFF, 0x38, 0x01, 0xF4]);
//!
//! assert!(Command::drive(501, 0).is_err());
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::params::{
    self, ascii_glyph, BaudCode, ClockTime, Day, Note, BLANK_GLYPH, MAX_MOTOR_PWM, MAX_RADIUS,
    MAX_SONG_NOTES, MAX_SONG_NUMBER, MAX_VELOCITY, MAX_WHEEL_PWM,
};
use super::Opcode;
use crate::error::{OiError, Result};
use crate::sensors::PacketId;

/// An encoded command: opcode plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Command {
    fn bare(opcode: Opcode) -> Self {
        Self {
            opcode,
            payload: Bytes::new(),
        }
    }

    fn with_payload(opcode: Opcode, payload: BytesMut) -> Self {
        Self {
            opcode,
            payload: payload.freeze(),
        }
    }

    /// Unvalidated command for direct access.
    pub fn raw(opcode: Opcode, data: &[u8]) -> Self {
        Self {
            opcode,
            payload: Bytes::copy_from_slice(data),
        }
    }

    /// Total wire length (opcode + payload).
    #[inline]
    pub fn wire_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// Wire bytes: `[opcode][payload...]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(self.opcode.as_u8());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    // Mode commands

    pub fn start() -> Self {
        Self::bare(Opcode::Start)
    }

    pub fn baud(code: BaudCode) -> Self {
        Self::raw(Opcode::Baud, &[code as u8])
    }

    pub fn control() -> Self {
        Self::bare(Opcode::Control)
    }

    pub fn safe() -> Self {
        Self::bare(Opcode::Safe)
    }

    pub fn full() -> Self {
        Self::bare(Opcode::Full)
    }

    // Cleaning commands

    pub fn clean() -> Self {
        Self::bare(Opcode::Clean)
    }

    pub fn max() -> Self {
        Self::bare(Opcode::Max)
    }

    pub fn spot() -> Self {
        Self::bare(Opcode::Spot)
    }

    pub fn seek_dock() -> Self {
        Self::bare(Opcode::SeekDock)
    }

    pub fn power() -> Self {
        Self::bare(Opcode::Power)
    }

    /// New cleaning schedule.
    ///
    /// `times` is indexed Sunday..Saturday. Days absent from `day_mask` are
    /// sent as 00:00 whatever `times` holds; enabled days must carry a valid
    /// time.
    pub fn schedule(day_mask: u8, times: &[ClockTime; 7]) -> Result<Self> {
        check_mask("day mask", day_mask, params::days::MASK)?;

        let mut buf = BytesMut::with_capacity(15);
        buf.put_u8(day_mask);
        for (day, time) in times.iter().enumerate() {
            if day_mask & (1 << day) == 0 {
                buf.put_u8(0);
                buf.put_u8(0);
                continue;
            }
            time.validate()?;
            buf.put_u8(time.hour);
            buf.put_u8(time.minute);
        }
        Ok(Self::with_payload(Opcode::Schedule, buf))
    }

    pub fn set_day_time(day: Day, time: ClockTime) -> Result<Self> {
        time.validate()?;
        Ok(Self::raw(
            Opcode::SetDayTime,
            &[day as u8, time.hour, time.minute],
        ))
    }

    // Actuator commands

    /// Drive at `velocity` mm/s along an arc of `radius` mm.
    ///
    /// `radius` also accepts the sentinels in [`params::radius`].
    pub fn drive(velocity: i16, radius: i16) -> Result<Self> {
        check_range("velocity", velocity, -MAX_VELOCITY, MAX_VELOCITY)?;
        if !params::radius::is_special(radius) {
            check_range("radius", radius, -MAX_RADIUS, MAX_RADIUS)?;
        }
        Ok(Self::with_payload(Opcode::Drive, pair(velocity, radius)))
    }

    /// Wheel velocities in mm/s. Sent right wheel first.
    pub fn drive_direct(left: i16, right: i16) -> Result<Self> {
        check_range("left velocity", left, -MAX_VELOCITY, MAX_VELOCITY)?;
        check_range("right velocity", right, -MAX_VELOCITY, MAX_VELOCITY)?;
        Ok(Self::with_payload(Opcode::DriveDirect, pair(right, left)))
    }

    /// Raw wheel PWM. Sent right wheel first.
    pub fn drive_pwm(left: i16, right: i16) -> Result<Self> {
        check_range("left PWM", left, -MAX_WHEEL_PWM, MAX_WHEEL_PWM)?;
        check_range("right PWM", right, -MAX_WHEEL_PWM, MAX_WHEEL_PWM)?;
        Ok(Self::with_payload(Opcode::DrivePwm, pair(right, left)))
    }

    pub fn motors(mask: u8) -> Result<Self> {
        check_mask("motor mask", mask, params::motors::MASK)?;
        Ok(Self::raw(Opcode::Motors, &[mask]))
    }

    /// Brush and vacuum duty cycles.
    pub fn pwm_motors(main_brush: i8, side_brush: i8, vacuum: i8) -> Result<Self> {
        check_range("main brush PWM", main_brush, -MAX_MOTOR_PWM, MAX_MOTOR_PWM)?;
        check_range("side brush PWM", side_brush, -MAX_MOTOR_PWM, MAX_MOTOR_PWM)?;
        check_range("vacuum PWM", vacuum, 0, MAX_MOTOR_PWM)?;
        Ok(Self::raw(
            Opcode::PwmMotors,
            &[main_brush as u8, side_brush as u8, vacuum as u8],
        ))
    }

    pub fn leds(mask: u8, color: u8, intensity: u8) -> Result<Self> {
        check_mask("LED mask", mask, params::leds::MASK)?;
        Ok(Self::raw(Opcode::Leds, &[mask, color, intensity]))
    }

    pub fn scheduling_leds(day_mask: u8, led_mask: u8) -> Result<Self> {
        check_mask("day mask", day_mask, params::days::MASK)?;
        check_mask("scheduling LED mask", led_mask, params::scheduling_leds::MASK)?;
        Ok(Self::raw(Opcode::SchedulingLeds, &[day_mask, led_mask]))
    }

    /// Raw segment bits, leftmost digit first.
    pub fn digit_leds_raw(digits: [u8; 4]) -> Result<Self> {
        for digit in digits {
            check_mask("digit segments", digit, params::segments::MASK)?;
        }
        Ok(Self::raw(Opcode::DigitLedsRaw, &digits))
    }

    /// Up to four characters, leftmost first.
    ///
    /// Missing positions and characters outside printable ASCII are sent as
    /// blanks.
    pub fn digit_leds_ascii(text: &str) -> Result<Self> {
        let count = text.chars().count();
        if count > 4 {
            return Err(OiError::invalid(format!(
                "digit display shows 4 characters, got {}",
                count
            )));
        }
        let mut glyphs = [BLANK_GLYPH; 4];
        for (slot, c) in glyphs.iter_mut().zip(text.chars()) {
            *slot = ascii_glyph(c);
        }
        Ok(Self::raw(Opcode::DigitLedsAscii, &glyphs))
    }

    pub fn buttons(mask: u8) -> Self {
        Self::raw(Opcode::Buttons, &[mask])
    }

    // Song commands

    /// Store a song of 1-16 notes in slot 0-4.
    pub fn song(song_number: u8, notes: &[Note]) -> Result<Self> {
        check_song_number(song_number)?;
        if notes.is_empty() || notes.len() > MAX_SONG_NOTES {
            return Err(OiError::invalid(format!(
                "song holds 1-{} notes, got {}",
                MAX_SONG_NOTES,
                notes.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(2 + 2 * notes.len());
        buf.put_u8(song_number);
        buf.put_u8(notes.len() as u8);
        for note in notes {
            buf.put_u8(note.pitch);
            buf.put_u8(note.duration);
        }
        Ok(Self::with_payload(Opcode::Song, buf))
    }

    pub fn play(song_number: u8) -> Result<Self> {
        check_song_number(song_number)?;
        Ok(Self::raw(Opcode::Play, &[song_number]))
    }

    // Sensor requests

    pub fn sensors(id: PacketId) -> Result<Self> {
        if !id.is_known() {
            return Err(OiError::invalid(format!("unknown packet id {}", id)));
        }
        Ok(Self::raw(Opcode::Sensors, &[id.as_u8()]))
    }

    pub fn query_list(ids: &[PacketId]) -> Result<Self> {
        Self::id_list(Opcode::QueryList, ids)
    }

    pub fn stream(ids: &[PacketId]) -> Result<Self> {
        Self::id_list(Opcode::Stream, ids)
    }

    pub fn pause_resume_stream(resume: bool) -> Self {
        Self::raw(Opcode::PauseResumeStream, &[u8::from(resume)])
    }

    fn id_list(opcode: Opcode, ids: &[PacketId]) -> Result<Self> {
        if ids.is_empty() || ids.len() > u8::MAX as usize {
            return Err(OiError::invalid(format!(
                "{} takes 1-255 packet ids, got {}",
                opcode.name(),
                ids.len()
            )));
        }
        if let Some(bad) = ids.iter().find(|id| !id.is_known()) {
            return Err(OiError::invalid(format!("unknown packet id {}", bad)));
        }

        let mut buf = BytesMut::with_capacity(1 + ids.len());
        buf.put_u8(ids.len() as u8);
        for id in ids {
            buf.put_u8(id.as_u8());
        }
        Ok(Self::with_payload(opcode, buf))
    }
}

fn pair(first: i16, second: i16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_i16(first);
    buf.put_i16(second);
    buf
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(OiError::invalid(format!(
            "{} {} out of range {}..={}",
            name, value, min, max
        )));
    }
    Ok(())
}

fn check_mask(name: &str, value: u8, mask: u8) -> Result<()> {
    if value & !mask != 0 {
        return Err(OiError::invalid(format!(
            "{} {:#04x} has bits outside {:#04x}",
            name, value, mask
        )));
    }
    Ok(())
}

fn check_song_number(song_number: u8) -> Result<()> {
    if song_number > MAX_SONG_NUMBER {
        return Err(OiError::invalid(format!(
            "song number {} out of range 0-{}",
            song_number, MAX_SONG_NUMBER
        )));
    }
    Ok(())
}
