//! Dedicated writer task for command transmission.
//!
//! Commands reach the transport through a single task fed by an mpsc
//! channel, so the session never holds a lock across a write.
//!
//! # Architecture
//!
//! ```text
//! OpenInterface ─► WritePermit ─► mpsc::Sender<OutboundCommand> ─► Writer Task ─► transport
//!               ◄──────────────── oneshot::Sender<Result<()>> ◄───────┘
//! ```
//!
//! At most one command is in flight. A second command offered while the
//! first is still being written is refused with `TransportBusy` rather than
//! queued, so commands are never reordered or interleaved.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{OiError, Result};
use crate::protocol::Command;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Default limit on a single command write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A command waiting for the writer task.
#[derive(Debug)]
pub struct OutboundCommand {
    pub command: Command,
    /// Completion of the write.
    pub reply: oneshot::Sender<Result<()>>,
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Channel capacity for the command queue.
    pub channel_capacity: usize,
    /// Time allowed for one command write before it fails.
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Handle for sending commands to the writer task.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundCommand>,
    /// Set while a command is reserved or being written.
    busy: Arc<AtomicBool>,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundCommand>, busy: Arc<AtomicBool>) -> Self {
        Self { tx, busy }
    }

    /// Claim the single write slot.
    ///
    /// Returns `TransportBusy` if another command holds it.
    pub fn reserve(&self) -> Result<WritePermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| OiError::TransportBusy)?;
        Ok(WritePermit {
            handle: self,
            armed: true,
        })
    }

    /// Write one command and wait for the outcome.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.reserve()?.send(command).await
    }

    /// Whether a command is currently in flight.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Exclusive right to write the next command.
///
/// Dropping an unused permit releases the slot.
#[derive(Debug)]
pub struct WritePermit<'a> {
    handle: &'a WriterHandle,
    armed: bool,
}

impl WritePermit<'_> {
    /// Hand the command to the writer task and wait for the write.
    pub async fn send(mut self, command: Command) -> Result<()> {
        let (reply, done) = oneshot::channel();

        // The slot was free, so the queue is empty and this never waits.
        self.handle
            .tx
            .try_send(OutboundCommand { command, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => OiError::TransportBusy,
                mpsc::error::TrySendError::Closed(_) => OiError::ConnectionClosed,
            })?;

        // The writer task releases the slot from here on.
        self.armed = false;
        done.await.map_err(|_| OiError::ConnectionClosed)?
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.handle.busy.store(false, Ordering::Release);
        }
    }
}

/// Spawn the writer task and return a handle for sending commands.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)`. The task ends once every handle
/// has been dropped.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let busy = Arc::new(AtomicBool::new(false));

    let handle = WriterHandle::new(tx, busy.clone());
    let task = tokio::spawn(writer_loop(rx, writer, busy, config.write_timeout));

    (handle, task)
}

/// Main writer loop - one command per write, in arrival order.
///
/// Write failures are reported to the caller only; the loop keeps serving.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundCommand>,
    mut writer: W,
    busy: Arc<AtomicBool>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(OutboundCommand { command, reply }) = rx.recv().await {
        let result = match tokio::time::timeout(write_timeout, write_command(&mut writer, &command))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(OiError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "command write timed out",
            ))),
        };

        match &result {
            Ok(()) => tracing::debug!(
                "Wrote {} ({} bytes)",
                command.opcode,
                command.wire_len()
            ),
            Err(e) => tracing::error!("Failed to write {}: {}", command.opcode, e),
        }

        busy.store(false, Ordering::Release);
        let _ = reply.send(result);
    }
    tracing::debug!("Writer channel closed, writer task stopping");
}

/// Write one encoded command with a single `write` call.
///
/// A transport that accepts fewer bytes than the command's length fails the
/// command with `ShortWrite`; the remainder is not retried.
pub async fn write_command<W>(writer: &mut W, command: &Command) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = command.encode();
    let written = writer.write(&bytes).await?;
    if written != bytes.len() {
        return Err(OiError::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }
    writer.flush().await?;
    Ok(())
}
