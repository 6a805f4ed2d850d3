//! Transport module - byte stream halves used by the session.
//!
//! The session never opens a device itself. Any pair of tokio byte streams
//! works: a serial port crate's stream, a TCP bridge, or an in-memory
//! `tokio::io::duplex` in tests.

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

/// Read half accepted by the decoder task.
pub trait TransportRead: AsyncRead + Unpin + Send + 'static {}

impl<T> TransportRead for T where T: AsyncRead + Unpin + Send + 'static {}

/// Write half accepted by the writer task.
pub trait TransportWrite: AsyncWrite + Unpin + Send + 'static {}

impl<T> TransportWrite for T where T: AsyncWrite + Unpin + Send + 'static {}

/// Split one bidirectional stream into independently owned halves.
pub fn split_transport<T>(stream: T) -> (ReadHalf<T>, WriteHalf<T>)
where
    T: AsyncRead + AsyncWrite,
{
    tokio::io::split(stream)
}
