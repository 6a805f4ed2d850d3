//! Error types for roomba-oi.

use thiserror::Error;

use crate::protocol::OiMode;
use crate::sensors::PacketId;

/// Main error type for all Open Interface operations.
#[derive(Debug, Error)]
pub enum OiError {
    /// A command other than start was issued before the OI was started.
    #[error("Open Interface not started")]
    NotStarted,

    /// The command is not accepted in the current operating mode.
    #[error("{operation} is not available in {mode} mode")]
    InvalidMode {
        operation: &'static str,
        mode: OiMode,
    },

    /// A parameter is outside its documented range or count.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error reported by the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport accepted fewer bytes than the encoded command.
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Another command is still being written.
    #[error("Transport busy")]
    TransportBusy,

    /// Writer or decoder task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Frame-level telemetry failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Value requested for a packet that is not part of the current parse key.
    #[error("Packet {0} was not requested")]
    NotRequested(PacketId),

    /// No checksum-valid telemetry is available.
    #[error("No sensor data available")]
    NoData,
}

impl OiError {
    /// Detected from local state before any I/O.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            OiError::NotStarted | OiError::InvalidMode { .. } | OiError::InvalidParameter(_)
        )
    }

    /// Failure reported by (or about) the transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OiError::Io(_)
                | OiError::ShortWrite { .. }
                | OiError::TransportBusy
                | OiError::ConnectionClosed
        )
    }

    /// Failure of a sensor value lookup.
    pub fn is_query(&self) -> bool {
        matches!(self, OiError::NotRequested(_) | OiError::NoData)
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        OiError::InvalidParameter(msg.into())
    }
}

/// Telemetry framing failures.
///
/// These never abort a decode session. The decoder records the most recent
/// one in its sticky status and continues at the next frame boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame bytes did not sum to zero.
    #[error("checksum mismatch (frame sum {sum:#04x})")]
    ChecksumMismatch { sum: u8 },

    /// Bytes were skipped while searching for a frame header.
    #[error("lost frame sync, discarded {discarded} bytes")]
    Resync { discarded: usize },

    /// Frame length does not match the negotiated parse key.
    #[error("frame carries {actual} payload bytes, parse key expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A tagged stream frame carried an id out of the requested order.
    #[error("expected packet id {expected} in stream frame, found {found}")]
    UnexpectedPacketId { expected: u8, found: u8 },
}

/// Result type alias using OiError.
pub type Result<T> = std::result::Result<T, OiError>;
