//! Background sensor decoder.
//!
//! One task owns the read half of the transport and is the only writer of
//! the [`SensorSnapshot`]. The session talks to it through two `watch`
//! channels:
//!
//! ```text
//!                   DecoderControl (key, kind, paused, request id)
//! OpenInterface ──────────────────────────────────────────► decoder task ◄── reader
//!               ◄──────────────────────────────────────────
//!                   last completed query request id
//! ```
//!
//! Installing a new request clears the snapshot before any byte of the new
//! reply is framed, so a reader never mixes values from two parse keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::frame_buffer::{FrameEvent, QueryFrameBuffer, StreamFrameBuffer};
use super::packet::PacketId;
use super::parse_key::ParseKey;
use super::snapshot::{SensorReading, SensorSnapshot};
use crate::error::{OiError, ProtocolError, Result};

/// Default time a one-shot query waits for its reply.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Default size of the transport read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Configuration for the decoder task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// How long `sensors` / `query_list` wait before reporting `NoData`.
    pub query_timeout: Duration,
    /// Bytes requested from the transport per read.
    pub read_buffer_size: usize,
    /// Whether one-shot replies end with a checksum byte.
    ///
    /// Physical 500-series robots answer opcodes 142 and 149 with bare
    /// payload bytes; set this to `false` for them.
    pub query_checksum: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            query_checksum: true,
        }
    }
}

/// What the decoder is currently framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    /// Nothing requested; input is discarded.
    Idle,
    /// Single reply to sensors / query list.
    Query,
    /// Continuous stream frames.
    Stream,
}

/// Request state published by the session.
#[derive(Debug, Clone)]
pub(crate) struct DecoderControl {
    pub key: Arc<ParseKey>,
    pub kind: RequestKind,
    pub paused: bool,
    /// Bumped for every installed request, never for pause / resume.
    pub request_id: u64,
}

impl DecoderControl {
    fn idle() -> Self {
        Self {
            key: Arc::new(ParseKey::empty()),
            kind: RequestKind::Idle,
            paused: false,
            request_id: 0,
        }
    }
}

/// Decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    /// Checksum-valid frames published to the snapshot.
    pub frames: u64,
    /// Frames dropped on a checksum mismatch.
    pub checksum_failures: u64,
    /// Bytes skipped while searching for a stream header.
    pub discarded_bytes: u64,
    /// Frames dropped because they did not fit the parse key.
    pub layout_errors: u64,
}

/// State shared between the decoder task and the session.
#[derive(Debug)]
pub(crate) struct DecoderShared {
    pub snapshot: SensorSnapshot,
    /// Request whose key the snapshot currently reflects.
    active_request: AtomicU64,
    /// Most recent frame-level failure, until taken.
    status: Mutex<Option<ProtocolError>>,
    frames: AtomicU64,
    checksum_failures: AtomicU64,
    discarded_bytes: AtomicU64,
    layout_errors: AtomicU64,
}

impl DecoderShared {
    fn new() -> Self {
        Self {
            snapshot: SensorSnapshot::new(),
            active_request: AtomicU64::new(0),
            status: Mutex::new(None),
            frames: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
            discarded_bytes: AtomicU64::new(0),
            layout_errors: AtomicU64::new(0),
        }
    }

    pub fn active_request(&self) -> u64 {
        self.active_request.load(Ordering::Acquire)
    }

    pub fn error(&self) -> Option<ProtocolError> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_error(&self) -> Option<ProtocolError> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            frames: self.frames.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            discarded_bytes: self.discarded_bytes.load(Ordering::Relaxed),
            layout_errors: self.layout_errors.load(Ordering::Relaxed),
        }
    }

    fn record_error(&self, error: ProtocolError) {
        match &error {
            ProtocolError::ChecksumMismatch { .. } => {
                self.checksum_failures.fetch_add(1, Ordering::Relaxed);
            }
            ProtocolError::LengthMismatch { .. } | ProtocolError::UnexpectedPacketId { .. } => {
                self.layout_errors.fetch_add(1, Ordering::Relaxed);
            }
            ProtocolError::Resync { .. } => {}
        }
        tracing::warn!("Telemetry frame dropped: {}", error);
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }
}

/// Framing state of the decoder, independent of any I/O.
pub(crate) struct DecodeSession {
    control: DecoderControl,
    stream: StreamFrameBuffer,
    query: Option<QueryFrameBuffer>,
    query_checksum: bool,
    generation: u32,
}

impl DecodeSession {
    pub fn new(query_checksum: bool) -> Self {
        Self {
            control: DecoderControl::idle(),
            stream: StreamFrameBuffer::new(),
            query: None,
            query_checksum,
            generation: 0,
        }
    }

    /// Adopt a new control state from the session.
    pub fn apply(&mut self, control: DecoderControl, shared: &DecoderShared) {
        if control.request_id != self.control.request_id {
            shared.snapshot.clear();
            shared
                .active_request
                .store(control.request_id, Ordering::Release);

            self.stream.clear();
            self.query = match control.kind {
                RequestKind::Query => Some(QueryFrameBuffer::new(
                    control.key.width(),
                    self.query_checksum,
                )),
                _ => None,
            };
            tracing::debug!(
                "Decoder installed request {} ({:?}, {} payload bytes)",
                control.request_id,
                control.kind,
                control.key.width()
            );
        } else if control.paused != self.control.paused {
            // Framing restarts from the header on resume.
            self.stream.clear();
            tracing::debug!("Stream {}", if control.paused { "paused" } else { "resumed" });
        }
        self.control = control;
    }

    /// Feed transport bytes. Returns the request id of a query that just
    /// completed.
    pub fn feed(&mut self, data: &[u8], shared: &DecoderShared) -> Option<u64> {
        match self.control.kind {
            RequestKind::Idle => {
                tracing::trace!("Discarding {} bytes with no request active", data.len());
                None
            }
            RequestKind::Query => self.feed_query(data, shared),
            RequestKind::Stream => {
                if !self.control.paused {
                    self.feed_stream(data, shared);
                }
                None
            }
        }
    }

    fn feed_query(&mut self, data: &[u8], shared: &DecoderShared) -> Option<u64> {
        let query = self.query.as_mut()?;
        match query.push(data)? {
            FrameEvent::Frame(payload) => {
                self.publish(&payload, shared);
                Some(self.control.request_id)
            }
            FrameEvent::Error(error) => {
                shared.record_error(error);
                None
            }
        }
    }

    fn feed_stream(&mut self, data: &[u8], shared: &DecoderShared) {
        let before = self.stream.discarded_bytes();
        let events = self.stream.push(data);
        let skipped = self.stream.discarded_bytes() - before;
        if skipped > 0 {
            shared.discarded_bytes.fetch_add(skipped, Ordering::Relaxed);
        }

        for event in events {
            match event {
                FrameEvent::Frame(payload) => {
                    self.publish(&payload, shared);
                }
                FrameEvent::Error(error) => shared.record_error(error),
            }
        }
    }

    fn publish(&mut self, payload: &Bytes, shared: &DecoderShared) {
        let values = match self.control.key.extract(payload) {
            Ok(values) => values,
            Err(error) => {
                shared.record_error(error);
                return;
            }
        };

        self.generation = self.generation.wrapping_add(1);
        for value in &values {
            shared
                .snapshot
                .store(&value.descriptor, value.raw, self.generation);
        }
        shared.frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Session side of the decoder task.
pub(crate) struct DecoderHandle {
    control_tx: watch::Sender<DecoderControl>,
    completed_rx: watch::Receiver<u64>,
    shared: Arc<DecoderShared>,
    task: JoinHandle<Result<()>>,
}

impl DecoderHandle {
    pub fn shared(&self) -> &DecoderShared {
        &self.shared
    }

    /// Current control state.
    pub fn control(&self) -> DecoderControl {
        self.control_tx.borrow().clone()
    }

    /// Install a new request and return its id.
    pub fn install(&self, key: Arc<ParseKey>, kind: RequestKind) -> u64 {
        let request_id = self.control_tx.borrow().request_id + 1;
        self.control_tx.send_replace(DecoderControl {
            key,
            kind,
            paused: false,
            request_id,
        });
        request_id
    }

    /// Drop the parse key; incoming bytes are discarded until the next request.
    pub fn clear(&self) -> u64 {
        self.install(Arc::new(ParseKey::empty()), RequestKind::Idle)
    }

    pub fn set_paused(&self, paused: bool) {
        self.control_tx.send_if_modified(|control| {
            let changed = control.paused != paused;
            control.paused = paused;
            changed
        });
    }

    /// Wait until the query `request_id` has been answered.
    pub async fn wait_for_query(&self, request_id: u64, timeout: Duration) -> Result<()> {
        let mut completed = self.completed_rx.clone();
        let outcome = tokio::time::timeout(timeout, completed.wait_for(|&done| done >= request_id))
            .await
            .map(|waited| waited.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(OiError::ConnectionClosed),
            Err(_) => {
                tracing::debug!("Query {} timed out after {:?}", request_id, timeout);
                Err(OiError::NoData)
            }
        }
    }

    /// Latest value of `id` under the parse key in effect.
    pub fn value(&self, id: PacketId) -> Result<SensorReading> {
        let request_id = {
            let control = self.control_tx.borrow();
            if !control.key.contains(id) {
                return Err(OiError::NotRequested(id));
            }
            control.request_id
        };
        if self.shared.active_request() != request_id {
            return Err(OiError::NoData);
        }
        self.shared.snapshot.get(id).ok_or(OiError::NoData)
    }

    /// Every field of `key` as decoded for `request_id`.
    pub fn readings(&self, request_id: u64, key: &ParseKey) -> Result<Vec<SensorReading>> {
        if self.shared.active_request() != request_id {
            return Err(OiError::NoData);
        }
        key.fields()
            .iter()
            .map(|d| self.shared.snapshot.get(d.id).ok_or(OiError::NoData))
            .collect()
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the decoder task over the read half of the transport.
pub(crate) fn spawn_decoder<R>(reader: R, config: &DecoderConfig) -> DecoderHandle
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (control_tx, control_rx) = watch::channel(DecoderControl::idle());
    let (completed_tx, completed_rx) = watch::channel(0u64);
    let shared = Arc::new(DecoderShared::new());

    let session = DecodeSession::new(config.query_checksum);
    let task = tokio::spawn(decoder_loop(
        reader,
        control_rx,
        completed_tx,
        shared.clone(),
        session,
        config.read_buffer_size.max(1),
    ));

    DecoderHandle {
        control_tx,
        completed_rx,
        shared,
        task,
    }
}

async fn decoder_loop<R>(
    mut reader: R,
    mut control_rx: watch::Receiver<DecoderControl>,
    completed_tx: watch::Sender<u64>,
    shared: Arc<DecoderShared>,
    mut session: DecodeSession,
    buffer_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        tokio::select! {
            // Control first: a request is installed before its reply is read.
            biased;

            changed = control_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let control = control_rx.borrow_and_update().clone();
                session.apply(control, &shared);
            }

            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => {
                        tracing::debug!("Transport closed, decoder stopping");
                        return Ok(());
                    }
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!("Decoder read error: {}", e);
                        return Err(OiError::Io(e));
                    }
                };
                if let Some(done) = session.feed(&buf[..n], &shared) {
                    completed_tx.send_replace(done);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{build_query_frame, build_stream_frame};

    fn control(ids: &[PacketId], kind: RequestKind, request_id: u64) -> DecoderControl {
        DecoderControl {
            key: Arc::new(ParseKey::new(ids).unwrap()),
            kind,
            paused: false,
            request_id,
        }
    }

    fn battery() -> [PacketId; 2] {
        [PacketId::BATTERY_CHARGE, PacketId::BATTERY_CAPACITY]
    }

    #[test]
    fn test_config_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.query_timeout, Duration::from_millis(500));
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert!(config.query_checksum);
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: DecoderConfig = serde_json::from_str(r#"{"query_checksum": false}"#).unwrap();
        assert!(!config.query_checksum);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT);
    }

    #[test]
    fn test_idle_discards_input() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        assert_eq!(session.feed(&build_stream_frame(&[1]), &shared), None);
        assert_eq!(shared.stats(), DecodeStats::default());
    }

    #[test]
    fn test_query_completes_once() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        session.apply(control(&battery(), RequestKind::Query, 1), &shared);
        assert_eq!(shared.active_request(), 1);

        let frame = build_query_frame(&[0x0B, 0xB8, 0x0F, 0xA0]);
        assert_eq!(session.feed(&frame[..3], &shared), None);
        assert_eq!(session.feed(&frame[3..], &shared), Some(1));

        assert_eq!(shared.snapshot.get(PacketId::BATTERY_CHARGE).unwrap().raw, 3000);
        assert_eq!(shared.snapshot.get(PacketId::BATTERY_CAPACITY).unwrap().raw, 4000);

        // Trailing bytes are ignored until the next request.
        assert_eq!(session.feed(&frame, &shared), None);
        assert_eq!(shared.stats().frames, 1);
    }

    #[test]
    fn test_query_bad_checksum_keeps_waiting() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        session.apply(control(&[PacketId::WALL], RequestKind::Query, 1), &shared);

        assert_eq!(session.feed(&[1, 0], &shared), None);
        assert!(matches!(
            shared.error(),
            Some(ProtocolError::ChecksumMismatch { .. })
        ));
        assert!(shared.snapshot.get(PacketId::WALL).is_none());

        assert_eq!(session.feed(&build_query_frame(&[1]), &shared), Some(1));
        assert_eq!(shared.snapshot.get(PacketId::WALL).unwrap().raw, 1);
    }

    #[test]
    fn test_query_without_checksum() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(false);
        session.apply(control(&[PacketId::DISTANCE], RequestKind::Query, 3), &shared);

        assert_eq!(session.feed(&[0xFF, 0xF6], &shared), Some(3));
        assert_eq!(shared.snapshot.get(PacketId::DISTANCE).unwrap().value(), -10);
    }

    #[test]
    fn test_stream_untagged_and_tagged() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        session.apply(control(&battery(), RequestKind::Stream, 1), &shared);

        session.feed(&build_stream_frame(&[0x0B, 0xB8, 0x0F, 0xA0]), &shared);
        assert_eq!(shared.snapshot.get(PacketId::BATTERY_CHARGE).unwrap().raw, 3000);

        session.feed(&build_stream_frame(&[25, 0x0B, 0xB9, 26, 0x0F, 0xA0]), &shared);
        let reading = shared.snapshot.get(PacketId::BATTERY_CHARGE).unwrap();
        assert_eq!(reading.raw, 3001);
        assert_eq!(reading.generation, 2);
        assert_eq!(shared.stats().frames, 2);
    }

    #[test]
    fn test_stream_corruption_then_recovery() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        session.apply(control(&battery(), RequestKind::Stream, 1), &shared);

        let mut bad = build_stream_frame(&[0x0B, 0xB8, 0x0F, 0xA0]);
        bad[3] ^= 0x01;
        session.feed(&bad, &shared);
        assert!(shared.snapshot.get(PacketId::BATTERY_CHARGE).is_none());
        assert!(matches!(
            shared.take_error(),
            Some(ProtocolError::ChecksumMismatch { .. })
        ));

        session.feed(&build_stream_frame(&[0x0B, 0xB8, 0x0F, 0xA0]), &shared);
        assert_eq!(shared.snapshot.get(PacketId::BATTERY_CHARGE).unwrap().raw, 3000);

        let stats = shared.stats();
        assert_eq!(stats.checksum_failures, 1);
        assert_eq!(stats.frames, 1);
        assert!(stats.discarded_bytes > 0);
    }

    #[test]
    fn test_stream_length_mismatch_is_sticky() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        session.apply(control(&battery(), RequestKind::Stream, 1), &shared);

        session.feed(&build_stream_frame(&[1, 2, 3]), &shared);
        assert_eq!(
            shared.error(),
            Some(ProtocolError::LengthMismatch {
                expected: 4,
                actual: 3
            })
        );
        // Peeking does not clear it.
        assert!(shared.error().is_some());
        assert!(shared.take_error().is_some());
        assert!(shared.error().is_none());
        assert_eq!(shared.stats().layout_errors, 1);
    }

    #[test]
    fn test_paused_stream_drops_frames() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        let mut ctl = control(&[PacketId::WALL], RequestKind::Stream, 1);
        session.apply(ctl.clone(), &shared);

        ctl.paused = true;
        session.apply(ctl.clone(), &shared);
        session.feed(&build_stream_frame(&[1]), &shared);
        assert!(shared.snapshot.get(PacketId::WALL).is_none());

        ctl.paused = false;
        session.apply(ctl, &shared);
        session.feed(&build_stream_frame(&[1]), &shared);
        assert_eq!(shared.snapshot.get(PacketId::WALL).unwrap().raw, 1);
        // Same request: pause / resume does not bump it.
        assert_eq!(shared.active_request(), 1);
    }

    #[test]
    fn test_new_request_clears_snapshot() {
        let shared = DecoderShared::new();
        let mut session = DecodeSession::new(true);
        session.apply(control(&[PacketId::WALL], RequestKind::Stream, 1), &shared);
        session.feed(&build_stream_frame(&[1]), &shared);
        assert!(shared.snapshot.get(PacketId::WALL).is_some());

        session.apply(control(&[PacketId::WALL], RequestKind::Query, 2), &shared);
        assert!(shared.snapshot.get(PacketId::WALL).is_none());
        assert_eq!(shared.active_request(), 2);
    }

    #[tokio::test]
    async fn test_decoder_task_answers_query() {
        let (mut robot, host) = tokio::io::duplex(256);
        let handle = spawn_decoder(host, &DecoderConfig::default());

        let key = Arc::new(ParseKey::new(&battery()).unwrap());
        let request_id = handle.install(key.clone(), RequestKind::Query);

        tokio::io::AsyncWriteExt::write_all(
            &mut robot,
            &build_query_frame(&[0x0B, 0xB8, 0x0F, 0xA0]),
        )
        .await
        .unwrap();

        handle
            .wait_for_query(request_id, Duration::from_secs(1))
            .await
            .unwrap();
        let readings = handle.readings(request_id, &key).unwrap();
        assert_eq!(readings[0].raw, 3000);
        assert_eq!(handle.value(PacketId::BATTERY_CAPACITY).unwrap().raw, 4000);
        assert!(matches!(
            handle.value(PacketId::VOLTAGE),
            Err(OiError::NotRequested(_))
        ));
    }

    #[tokio::test]
    async fn test_decoder_task_times_out() {
        let (_robot, host) = tokio::io::duplex(256);
        let handle = spawn_decoder(host, &DecoderConfig::default());

        let key = Arc::new(ParseKey::new(&[PacketId::WALL]).unwrap());
        let request_id = handle.install(key, RequestKind::Query);

        let result = handle
            .wait_for_query(request_id, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(OiError::NoData)));
    }

    #[tokio::test]
    async fn test_decoder_task_reports_closed_transport() {
        let (robot, host) = tokio::io::duplex(256);
        let handle = spawn_decoder(host, &DecoderConfig::default());
        let request_id = handle.install(
            Arc::new(ParseKey::new(&[PacketId::WALL]).unwrap()),
            RequestKind::Query,
        );
        drop(robot);

        let result = handle
            .wait_for_query(request_id, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(OiError::ConnectionClosed)));
    }
}
