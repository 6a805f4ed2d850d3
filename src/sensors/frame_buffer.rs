//! Frame buffers for accumulating partial telemetry reads.
//!
//! Uses `bytes::BytesMut` the same way for both request kinds:
//!
//! - [`StreamFrameBuffer`]: self-delimited stream frames
//!   `[0x13][n][payload n][checksum]`, rescanning for the header after
//!   corruption.
//! - [`QueryFrameBuffer`]: the single reply to a sensors / query list request,
//!   `width` payload bytes followed by a checksum byte.
//!
//! In both cases a frame is accepted only if all of its bytes, checksum
//! included, sum to zero modulo 256.
//!
//! # Example
//!
//! ```
//! use roomba_oi::sensors::{build_stream_frame, FrameEvent, StreamFrameBuffer};
//!
//! let mut buffer = StreamFrameBuffer::new();
//! let bytes = build_stream_frame(&[0x0B, 0xB8]);
//!
//! let events = buffer.push(&bytes);
//! assert!(matches!(&events[0], FrameEvent::Frame(p) if p[..] == [0x0B, 0xB8]));
//! ```

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Header byte of every stream frame.
pub const STREAM_HEADER: u8 = 0x13;

/// Header + length + checksum.
pub const STREAM_OVERHEAD: usize = 3;

/// Largest payload a stream frame can declare.
pub const MAX_STREAM_PAYLOAD: usize = u8::MAX as usize;

/// Output of a frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Checksum-valid payload.
    Frame(Bytes),
    /// Frame-level failure; framing continues.
    Error(ProtocolError),
}

/// Checksum byte that makes `bytes` sum to zero.
pub fn checksum(bytes: &[u8]) -> u8 {
    0u8.wrapping_sub(byte_sum(bytes))
}

fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Build a complete stream frame around a payload.
///
/// # Panics
///
/// Panics if the payload is longer than 255 bytes.
pub fn build_stream_frame(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_STREAM_PAYLOAD);
    let mut buf = Vec::with_capacity(STREAM_OVERHEAD + payload.len());
    buf.push(STREAM_HEADER);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    buf
}

/// Build a query reply: payload followed by its checksum.
pub fn build_query_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 1);
    buf.extend_from_slice(payload);
    buf.push(checksum(payload));
    buf
}

/// Stream framing state.
#[derive(Debug, Clone, Copy)]
enum StreamState {
    /// Scanning for `0x13`.
    AwaitingHeader,
    /// Header at buffer[0], need the length byte.
    ReadingLength,
    /// Need `length` payload bytes plus the checksum.
    ReadingPayload { length: usize },
}

/// Buffer for continuous stream frames.
pub struct StreamFrameBuffer {
    buffer: BytesMut,
    state: StreamState,
    /// Bytes skipped since the last header was found.
    discarded: usize,
    /// Set after a checksum mismatch until the next header.
    recovering: bool,
    /// Bytes skipped over the buffer's lifetime.
    total_discarded: u64,
}

impl StreamFrameBuffer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * (MAX_STREAM_PAYLOAD + STREAM_OVERHEAD)),
            state: StreamState::AwaitingHeader,
            discarded: 0,
            recovering: false,
            total_discarded: 0,
        }
    }

    /// Push bytes and extract every complete frame.
    ///
    /// Garbage ahead of a header is reported once as
    /// [`ProtocolError::Resync`]. A checksum mismatch is reported as
    /// [`ProtocolError::ChecksumMismatch`]; the header byte of the bad frame is
    /// dropped and scanning restarts on the bytes after it.
    pub fn push(&mut self, data: &[u8]) -> Vec<FrameEvent> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();
        while let Some(event) = self.try_extract_one() {
            events.push(event);
        }
        events
    }

    fn try_extract_one(&mut self) -> Option<FrameEvent> {
        loop {
            match self.state {
                StreamState::AwaitingHeader => {
                    let Some(pos) = self.buffer.iter().position(|&b| b == STREAM_HEADER) else {
                        self.skip(self.buffer.len());
                        return None;
                    };
                    self.skip(pos);
                    self.state = StreamState::ReadingLength;

                    let discarded = std::mem::take(&mut self.discarded);
                    let recovering = std::mem::take(&mut self.recovering);
                    if discarded > 0 && !recovering {
                        return Some(FrameEvent::Error(ProtocolError::Resync { discarded }));
                    }
                }

                StreamState::ReadingLength => {
                    if self.buffer.len() < 2 {
                        return None;
                    }
                    self.state = StreamState::ReadingPayload {
                        length: self.buffer[1] as usize,
                    };
                }

                StreamState::ReadingPayload { length } => {
                    let total = length + STREAM_OVERHEAD;
                    if self.buffer.len() < total {
                        return None;
                    }
                    self.state = StreamState::AwaitingHeader;

                    let sum = byte_sum(&self.buffer[..total]);
                    if sum != 0 {
                        // Drop the header only; the real frame may start inside.
                        self.skip(1);
                        self.discarded = 0;
                        self.recovering = true;
                        return Some(FrameEvent::Error(ProtocolError::ChecksumMismatch { sum }));
                    }

                    self.buffer.advance(2);
                    let payload = self.buffer.split_to(length).freeze();
                    self.buffer.advance(1);
                    return Some(FrameEvent::Frame(payload));
                }
            }
        }
    }

    fn skip(&mut self, n: usize) {
        self.buffer.advance(n);
        self.discarded += n;
        self.total_discarded += n as u64;
    }

    /// Bytes dropped while searching for frame boundaries.
    pub fn discarded_bytes(&self) -> u64 {
        self.total_discarded
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and return to header scanning.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = StreamState::AwaitingHeader;
        self.discarded = 0;
        self.recovering = false;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            StreamState::AwaitingHeader => "AwaitingHeader",
            StreamState::ReadingLength => "ReadingLength",
            StreamState::ReadingPayload { .. } => "ReadingPayload",
        }
    }
}

impl Default for StreamFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer for the single reply to a one-shot query.
pub struct QueryFrameBuffer {
    buffer: BytesMut,
    payload_len: usize,
    checksummed: bool,
    done: bool,
}

impl QueryFrameBuffer {
    /// Expect `payload_len` bytes, followed by a checksum byte when
    /// `checksummed` is set.
    pub fn new(payload_len: usize, checksummed: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(payload_len + 1),
            payload_len,
            checksummed,
            done: false,
        }
    }

    fn frame_len(&self) -> usize {
        self.payload_len + usize::from(self.checksummed)
    }

    /// Push bytes. Returns an event once a full frame is buffered.
    ///
    /// After a valid frame the buffer is done and ignores further input. A
    /// frame with a bad checksum is dropped whole and the buffer waits for
    /// another.
    pub fn push(&mut self, data: &[u8]) -> Option<FrameEvent> {
        if self.done {
            return None;
        }
        self.buffer.extend_from_slice(data);

        let total = self.frame_len();
        if self.buffer.len() < total {
            return None;
        }

        let frame = self.buffer.split_to(total);
        let sum = byte_sum(&frame);
        if self.checksummed && sum != 0 {
            return Some(FrameEvent::Error(ProtocolError::ChecksumMismatch { sum }));
        }

        self.done = true;
        self.buffer.clear();
        let mut frame = frame.freeze();
        frame.truncate(self.payload_len);
        Some(FrameEvent::Frame(frame))
    }

    #[cfg(test)]
    fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(events: &[FrameEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::Frame(p) => Some(p.to_vec()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_checksum_makes_sum_zero() {
        let bytes = [0x13, 4, 0x0B, 0xB8, 0x0F, 0xA0];
        let c = checksum(&bytes);
        assert_eq!(byte_sum(&bytes).wrapping_add(c), 0);
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = StreamFrameBuffer::new();
        let events = buffer.push(&build_stream_frame(&[1, 2, 3, 4]));

        assert_eq!(events.len(), 1);
        assert_eq!(frames(&events), vec![vec![1, 2, 3, 4]]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "AwaitingHeader");
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = StreamFrameBuffer::new();
        let mut data = build_stream_frame(&[1]);
        data.extend(build_stream_frame(&[2, 2]));
        data.extend(build_stream_frame(&[3, 3, 3]));

        let events = buffer.push(&data);
        assert_eq!(frames(&events), vec![vec![1], vec![2, 2], vec![3, 3, 3]]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = StreamFrameBuffer::new();
        let mut all = Vec::new();
        for byte in build_stream_frame(&[9, 8, 7]) {
            all.extend(buffer.push(&[byte]));
        }
        assert_eq!(frames(&all), vec![vec![9, 8, 7]]);
    }

    #[test]
    fn test_partial_frame_states() {
        let mut buffer = StreamFrameBuffer::new();
        let bytes = build_stream_frame(&[5, 6]);

        assert!(buffer.push(&bytes[..1]).is_empty());
        assert_eq!(buffer.state_name(), "ReadingLength");

        assert!(buffer.push(&bytes[1..3]).is_empty());
        assert_eq!(buffer.state_name(), "ReadingPayload");

        let events = buffer.push(&bytes[3..]);
        assert_eq!(frames(&events), vec![vec![5, 6]]);
    }

    #[test]
    fn test_leading_garbage_reports_resync() {
        let mut buffer = StreamFrameBuffer::new();
        let mut data = vec![0xAA, 0xBB];
        data.extend(build_stream_frame(&[1]));

        let events = buffer.push(&data);
        assert_eq!(
            events[0],
            FrameEvent::Error(ProtocolError::Resync { discarded: 2 })
        );
        assert_eq!(frames(&events), vec![vec![1]]);
        assert_eq!(buffer.discarded_bytes(), 2);
    }

    #[test]
    fn test_corrupt_frame_then_recovery() {
        let mut buffer = StreamFrameBuffer::new();
        let mut bad = build_stream_frame(&[0x10, 0x20, 0x30, 0x40]);
        bad[3] ^= 0x01;
        let good = build_stream_frame(&[0x01, 0x02, 0x03, 0x04]);

        let mut data = bad.clone();
        data.extend_from_slice(&good);
        let events = buffer.push(&data);

        assert!(matches!(
            events[0],
            FrameEvent::Error(ProtocolError::ChecksumMismatch { .. })
        ));
        assert_eq!(frames(&events), vec![vec![1, 2, 3, 4]]);
        // The bytes skipped while recovering are not a separate resync event.
        assert_eq!(events.len(), 2);
        assert_eq!(buffer.discarded_bytes(), bad.len() as u64);
    }

    #[test]
    fn test_header_byte_inside_payload() {
        let mut buffer = StreamFrameBuffer::new();
        let events = buffer.push(&build_stream_frame(&[STREAM_HEADER, 0x02, STREAM_HEADER]));
        assert_eq!(frames(&events), vec![vec![STREAM_HEADER, 0x02, STREAM_HEADER]]);
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut buffer = StreamFrameBuffer::new();
        let events = buffer.push(&build_stream_frame(&[]));
        assert_eq!(frames(&events), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = StreamFrameBuffer::new();
        buffer.push(&[STREAM_HEADER, 4, 1]);
        assert_eq!(buffer.state_name(), "ReadingPayload");

        buffer.clear();
        assert_eq!(buffer.state_name(), "AwaitingHeader");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_query_frame_checksummed() {
        let mut buffer = QueryFrameBuffer::new(2, true);
        let reply = build_query_frame(&[0x01, 0x02]);

        assert!(buffer.push(&reply[..1]).is_none());
        let event = buffer.push(&reply[1..]).unwrap();
        assert_eq!(event, FrameEvent::Frame(Bytes::from_static(&[1, 2])));
        assert!(buffer.is_done());

        // Trailing bytes after completion are ignored.
        assert!(buffer.push(&reply).is_none());
    }

    #[test]
    fn test_query_frame_bad_checksum_keeps_waiting() {
        let mut buffer = QueryFrameBuffer::new(2, true);
        let event = buffer.push(&[0x01, 0x02, 0x00]).unwrap();
        assert!(matches!(
            event,
            FrameEvent::Error(ProtocolError::ChecksumMismatch { sum: 3 })
        ));
        assert!(!buffer.is_done());

        let event = buffer.push(&build_query_frame(&[7, 7])).unwrap();
        assert!(matches!(event, FrameEvent::Frame(_)));
    }

    #[test]
    fn test_query_frame_unchecked() {
        let mut buffer = QueryFrameBuffer::new(1, false);
        let event = buffer.push(&[0x42]).unwrap();
        assert_eq!(event, FrameEvent::Frame(Bytes::from_static(&[0x42])));
    }
}
