//! Session builder and command dispatcher.
//!
//! The [`OpenInterfaceBuilder`] collects writer and decoder configuration.
//! [`OpenInterface`] owns the session:
//! 1. Split the transport into read and write halves
//! 2. Spawn the writer task on the write half
//! 3. Spawn the decoder task on the read half
//! 4. Gate every command on the tracked mode, then write it
//!
//! # Example
//!
//! ```ignore
//! use roomba_oi::sensors::PacketId;
//! use roomba_oi::OpenInterface;
//!
//! #[tokio::main]
//! async fn main() -> roomba_oi::Result<()> {
//!     let port = open_serial_port("/dev/ttyUSB0", 115_200)?;
//!     let oi = OpenInterface::builder()
//!         .query_checksum(false)
//!         .connect_stream(port);
//!
//!     oi.start().await?;
//!     oi.safe().await?;
//!     oi.drive(200, 500).await?;
//!
//!     oi.stream(&[PacketId::BATTERY_CHARGE, PacketId::BATTERY_CAPACITY]).await?;
//!     let charge = oi.sensor_value(PacketId::BATTERY_CHARGE)?;
//!     println!("battery charge {} mAh", charge.value());
//!
//!     oi.end().await
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::error::{OiError, ProtocolError, Result};
use crate::protocol::{BaudCode, ClockTime, Command, Day, ModeTracker, Note, OiMode, Opcode};
use crate::sensors::{
    spawn_decoder, DecodeStats, DecoderConfig, DecoderHandle, PacketId, ParseKey, RequestKind,
    SensorReading, MAX_STREAM_PAYLOAD,
};
use crate::transport::{split_transport, TransportRead, TransportWrite};
use crate::writer::{spawn_writer_task, WritePermit, WriterConfig, WriterHandle};

/// Builder for configuring and connecting a session.
#[derive(Debug, Clone, Default)]
pub struct OpenInterfaceBuilder {
    writer_config: WriterConfig,
    decoder_config: DecoderConfig,
}

impl OpenInterfaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long `sensors` / `query_list` wait for a reply.
    ///
    /// Default: 500 ms
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.decoder_config.query_timeout = timeout;
        self
    }

    /// Bytes requested from the transport per read.
    ///
    /// Default: 1024
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.decoder_config.read_buffer_size = size;
        self
    }

    /// Whether one-shot query replies carry a trailing checksum byte.
    ///
    /// Default: true
    pub fn query_checksum(mut self, enabled: bool) -> Self {
        self.decoder_config.query_checksum = enabled;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 4
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Time allowed for one command write.
    ///
    /// Default: 1 second
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.writer_config.write_timeout = timeout;
        self
    }

    /// Replace the whole writer configuration.
    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.writer_config = config;
        self
    }

    /// Replace the whole decoder configuration.
    pub fn decoder_config(mut self, config: DecoderConfig) -> Self {
        self.decoder_config = config;
        self
    }

    /// Start a session over separate read and write halves.
    ///
    /// Spawns the writer and decoder tasks, so it must be called from
    /// within a Tokio runtime.
    pub fn connect<R, W>(self, reader: R, writer: W) -> OpenInterface
    where
        R: TransportRead,
        W: TransportWrite,
    {
        OpenInterface::connect(reader, writer, self.writer_config, self.decoder_config)
    }

    /// Start a session over one bidirectional stream.
    pub fn connect_stream<T>(self, stream: T) -> OpenInterface
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = split_transport(stream);
        self.connect(reader, writer)
    }
}

/// A session with one robot.
///
/// Every command method checks, in order, that the interface has been
/// started, that the current mode accepts the command and that the
/// parameters are in range. Nothing is written when a check fails. The
/// tracked mode changes only after the command has been written in full.
///
/// Dropping the session stops the decoder task and closes the writer
/// channel.
pub struct OpenInterface {
    mode: ModeTracker,
    writer: WriterHandle,
    decoder: DecoderHandle,
    /// Set while a sensor request owns the parse key.
    request_busy: AtomicBool,
    config: DecoderConfig,
    _writer_task: JoinHandle<()>,
}

impl OpenInterface {
    /// Create a new session builder.
    pub fn builder() -> OpenInterfaceBuilder {
        OpenInterfaceBuilder::new()
    }

    fn connect<R, W>(
        reader: R,
        writer: W,
        writer_config: WriterConfig,
        decoder_config: DecoderConfig,
    ) -> Self
    where
        R: TransportRead,
        W: TransportWrite,
    {
        let (writer, writer_task) = spawn_writer_task(writer, writer_config);
        let decoder = spawn_decoder(reader, &decoder_config);

        OpenInterface {
            mode: ModeTracker::new(),
            writer,
            decoder,
            request_busy: AtomicBool::new(false),
            config: decoder_config,
            _writer_task: writer_task,
        }
    }

    /// Mode as tracked from the commands sent so far.
    pub fn mode(&self) -> OiMode {
        self.mode.get()
    }

    // Dispatch helpers

    async fn dispatch<F>(&self, opcode: Opcode, build: F) -> Result<()>
    where
        F: FnOnce() -> Result<Command>,
    {
        self.mode.authorize(opcode)?;
        let command = build()?;
        self.transmit(command).await
    }

    async fn transmit(&self, command: Command) -> Result<()> {
        let permit = self.writer.reserve()?;
        self.transmit_reserved(permit, command).await
    }

    /// Claim the parse key for a query, stream or end.
    ///
    /// Held by a query until its reply arrives or times out, so a second
    /// request cannot take over the reply in flight.
    fn claim_request(&self) -> Result<RequestGuard<'_>> {
        self.request_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| OiError::TransportBusy)?;
        Ok(RequestGuard {
            busy: &self.request_busy,
        })
    }

    async fn transmit_reserved(&self, permit: WritePermit<'_>, command: Command) -> Result<()> {
        let opcode = command.opcode;
        permit.send(command).await?;
        self.mode.record(opcode);
        Ok(())
    }

    // Mode commands

    /// Start the Open Interface. Accepted in any mode; enters Passive.
    pub async fn start(&self) -> Result<()> {
        self.dispatch(Opcode::Start, || Ok(Command::start())).await
    }

    /// Change the robot's baud rate (code 0-11).
    pub async fn baud(&self, code: u8) -> Result<()> {
        self.dispatch(Opcode::Baud, || Ok(Command::baud(BaudCode::try_from(code)?)))
            .await
    }

    /// Take control of the robot; enters Safe. Same effect as [`safe`](Self::safe).
    pub async fn control(&self) -> Result<()> {
        self.dispatch(Opcode::Control, || Ok(Command::control())).await
    }

    /// Enter Safe mode. Any started mode.
    pub async fn safe(&self) -> Result<()> {
        self.dispatch(Opcode::Safe, || Ok(Command::safe())).await
    }

    /// Enter Full mode, with the safety features off. Any started mode.
    pub async fn full(&self) -> Result<()> {
        self.dispatch(Opcode::Full, || Ok(Command::full())).await
    }

    // Cleaning commands

    /// Power the robot down; returns to Passive.
    pub async fn power(&self) -> Result<()> {
        self.dispatch(Opcode::Power, || Ok(Command::power())).await
    }

    /// Start a spot clean; returns to Passive.
    pub async fn spot(&self) -> Result<()> {
        self.dispatch(Opcode::Spot, || Ok(Command::spot())).await
    }

    /// Start a default clean; returns to Passive.
    pub async fn clean(&self) -> Result<()> {
        self.dispatch(Opcode::Clean, || Ok(Command::clean())).await
    }

    /// Clean until the battery is drained; returns to Passive.
    pub async fn max(&self) -> Result<()> {
        self.dispatch(Opcode::Max, || Ok(Command::max())).await
    }

    /// Drive to the dock; returns to Passive.
    pub async fn seek_dock(&self) -> Result<()> {
        self.dispatch(Opcode::SeekDock, || Ok(Command::seek_dock()))
            .await
    }

    /// Store a weekly cleaning schedule. `times` is indexed Sunday..Saturday.
    pub async fn schedule(&self, day_mask: u8, times: &[ClockTime; 7]) -> Result<()> {
        self.dispatch(Opcode::Schedule, || Command::schedule(day_mask, times))
            .await
    }

    /// Set the robot's clock (hour 0-23, minute 0-59). Any started mode.
    pub async fn set_day_time(&self, day: Day, hour: u8, minute: u8) -> Result<()> {
        self.dispatch(Opcode::SetDayTime, || {
            Command::set_day_time(day, ClockTime::new(hour, minute))
        })
        .await
    }

    // Actuator commands

    /// Drive at `velocity` mm/s (±500) along `radius` mm (±2000 or a
    /// [`radius`](crate::protocol::params::radius) sentinel).
    pub async fn drive(&self, velocity: i16, radius: i16) -> Result<()> {
        self.dispatch(Opcode::Drive, || Command::drive(velocity, radius))
            .await
    }

    /// Independent wheel velocities in mm/s (±500).
    pub async fn drive_direct(&self, left: i16, right: i16) -> Result<()> {
        self.dispatch(Opcode::DriveDirect, || Command::drive_direct(left, right))
            .await
    }

    /// Independent wheel PWM (±255).
    pub async fn drive_pwm(&self, left: i16, right: i16) -> Result<()> {
        self.dispatch(Opcode::DrivePwm, || Command::drive_pwm(left, right))
            .await
    }

    /// Cleaning motors on/off, see [`params::motors`](crate::protocol::params::motors).
    pub async fn motors(&self, mask: u8) -> Result<()> {
        self.dispatch(Opcode::Motors, || Command::motors(mask)).await
    }

    /// Cleaning motor duty cycles (±127). Safe or Full.
    pub async fn pwm_motors(&self, main_brush: i8, side_brush: i8, vacuum: i8) -> Result<()> {
        self.dispatch(Opcode::PwmMotors, || {
            Command::pwm_motors(main_brush, side_brush, vacuum)
        })
        .await
    }

    /// LEDs, see [`params::leds`](crate::protocol::params::leds).
    pub async fn leds(&self, mask: u8, power_color: u8, power_intensity: u8) -> Result<()> {
        self.dispatch(Opcode::Leds, || {
            Command::leds(mask, power_color, power_intensity)
        })
        .await
    }

    /// Weekday and scheduling LEDs, see
    /// [`params::scheduling_leds`](crate::protocol::params::scheduling_leds). Safe or Full.
    pub async fn scheduling_leds(&self, day_mask: u8, led_mask: u8) -> Result<()> {
        self.dispatch(Opcode::SchedulingLeds, || {
            Command::scheduling_leds(day_mask, led_mask)
        })
        .await
    }

    /// Raw 7-segment patterns for the four digits, left to right. Safe or Full.
    pub async fn digit_leds_raw(&self, digits: [u8; 4]) -> Result<()> {
        self.dispatch(Opcode::DigitLedsRaw, || Command::digit_leds_raw(digits))
            .await
    }

    /// Up to four printable ASCII characters on the digit display. Safe or Full.
    pub async fn digit_leds_ascii(&self, text: &str) -> Result<()> {
        self.dispatch(Opcode::DigitLedsAscii, || Command::digit_leds_ascii(text))
            .await
    }

    /// Push buttons, see [`params::buttons`](crate::protocol::params::buttons).
    pub async fn buttons(&self, mask: u8) -> Result<()> {
        self.dispatch(Opcode::Buttons, || Ok(Command::buttons(mask)))
            .await
    }

    // Song commands

    /// Store a song in slot 0-4 with 1-16 notes. Any started mode.
    pub async fn song(&self, song_number: u8, notes: &[Note]) -> Result<()> {
        self.dispatch(Opcode::Song, || Command::song(song_number, notes))
            .await
    }

    /// Play a stored song (slot 0-4). Safe or Full.
    pub async fn play(&self, song_number: u8) -> Result<()> {
        self.dispatch(Opcode::Play, || Command::play(song_number)).await
    }

    // Sensor requests

    /// Request one packet (or group) and wait for the reply.
    ///
    /// Returns the decoded individual packets in wire order. A reply that
    /// does not arrive, or only arrives corrupted, within the query timeout
    /// yields `NoData`.
    pub async fn sensors(&self, id: PacketId) -> Result<Vec<SensorReading>> {
        self.mode.authorize(Opcode::Sensors)?;
        let command = Command::sensors(id)?;
        let key = ParseKey::new(&[id])?;
        self.query(command, key).await
    }

    /// Request several packets at once and wait for the reply.
    pub async fn query_list(&self, ids: &[PacketId]) -> Result<Vec<SensorReading>> {
        self.mode.authorize(Opcode::QueryList)?;
        let command = Command::query_list(ids)?;
        let key = ParseKey::new(ids)?;
        self.query(command, key).await
    }

    async fn query(&self, command: Command, key: ParseKey) -> Result<Vec<SensorReading>> {
        let _request = self.claim_request()?;
        let permit = self.writer.reserve()?;
        let key = Arc::new(key);
        let request_id = self.decoder.install(key.clone(), RequestKind::Query);

        if let Err(e) = self.transmit_reserved(permit, command).await {
            self.decoder.clear();
            return Err(e);
        }

        self.decoder
            .wait_for_query(request_id, self.config.query_timeout)
            .await?;
        self.decoder.readings(request_id, &key)
    }

    /// Start streaming packets. Values are read with
    /// [`sensor_value`](Self::sensor_value) as frames arrive.
    ///
    /// Replaces any request in effect.
    pub async fn stream(&self, ids: &[PacketId]) -> Result<()> {
        self.mode.authorize(Opcode::Stream)?;
        let command = Command::stream(ids)?;
        let key = ParseKey::new(ids)?;
        if key.tagged_width() > MAX_STREAM_PAYLOAD {
            return Err(OiError::invalid(format!(
                "stream frame of {} bytes exceeds {}",
                key.tagged_width(),
                MAX_STREAM_PAYLOAD
            )));
        }

        let _request = self.claim_request()?;
        let permit = self.writer.reserve()?;
        self.decoder.install(Arc::new(key), RequestKind::Stream);
        if let Err(e) = self.transmit_reserved(permit, command).await {
            self.decoder.clear();
            return Err(e);
        }
        Ok(())
    }

    /// Pause (`false`) or resume (`true`) the stream without changing the
    /// requested packets.
    pub async fn pause_resume_stream(&self, resume: bool) -> Result<()> {
        self.dispatch(Opcode::PauseResumeStream, || {
            Ok(Command::pause_resume_stream(resume))
        })
        .await?;
        self.decoder.set_paused(!resume);
        Ok(())
    }

    /// Stop sending stream frames, keeping the request.
    pub async fn pause_stream(&self) -> Result<()> {
        self.pause_resume_stream(false).await
    }

    /// Resume the stream paused by [`pause_stream`](Self::pause_stream).
    pub async fn resume_stream(&self) -> Result<()> {
        self.pause_resume_stream(true).await
    }

    /// Latest decoded value of `id`.
    ///
    /// `NotRequested` if `id` is not covered by the request in effect,
    /// `NoData` if no valid frame carrying it has been decoded yet.
    pub fn sensor_value(&self, id: PacketId) -> Result<SensorReading> {
        self.decoder.value(id)
    }

    /// Most recent frame-level decode failure, left in place.
    pub fn decode_error(&self) -> Option<ProtocolError> {
        self.decoder.shared().error()
    }

    /// Most recent frame-level decode failure, cleared on read.
    pub fn take_decode_error(&self) -> Option<ProtocolError> {
        self.decoder.shared().take_error()
    }

    /// Decoder counters since the session was connected.
    pub fn decode_stats(&self) -> DecodeStats {
        self.decoder.shared().stats()
    }

    /// Write an opcode with unvalidated data bytes.
    ///
    /// Still requires a started interface (except for `start` itself) and
    /// still applies the opcode's mode transition.
    pub async fn send_raw(&self, opcode: Opcode, data: &[u8]) -> Result<()> {
        if opcode != Opcode::Start && !self.mode.get().is_started() {
            return Err(OiError::NotStarted);
        }
        self.transmit(Command::raw(opcode, data)).await
    }

    /// Finish the session: pause an active stream, send the robot to its
    /// dock and drop the parse key. Leaves the interface in Passive mode.
    pub async fn end(&self) -> Result<()> {
        if !self.mode.get().is_started() {
            return Err(OiError::NotStarted);
        }
        let _request = self.claim_request()?;

        let control = self.decoder.control();
        if control.kind == RequestKind::Stream && !control.paused {
            self.pause_stream().await?;
        }

        self.transmit(Command::seek_dock()).await?;
        self.decoder.clear();
        self.mode.set(OiMode::Passive);
        tracing::debug!("Session ended");
        Ok(())
    }
}

/// Releases the request slot on drop, including when a query is cancelled.
struct RequestGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
