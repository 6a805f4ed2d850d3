//! # roomba-oi
//!
//! Async driver for the iRobot Roomba 500 Open Interface.
//!
//! The crate speaks the OI byte protocol over any tokio byte stream
//! (serial port, TCP bridge, in-memory pipe) and keeps two independent
//! directions:
//!
//! - **Commands**: validated against the tracked operating mode, encoded
//!   and written by a dedicated writer task, one at a time
//! - **Telemetry**: a background decoder frames sensor replies and stream
//!   frames, verifies checksums and publishes the latest value per packet
//!
//! ## Example
//!
//! ```ignore
//! use roomba_oi::sensors::PacketId;
//! use roomba_oi::OpenInterface;
//!
//! #[tokio::main]
//! async fn main() -> roomba_oi::Result<()> {
//!     let oi = OpenInterface::builder().connect_stream(serial_port);
//!
//!     oi.start().await?;
//!     oi.full().await?;
//!     oi.drive_direct(-100, 100).await?;
//!
//!     let distance = oi.sensors(PacketId::DISTANCE).await?;
//!     println!("moved {} mm", distance[0].value());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod sensors;
pub mod transport;
pub mod writer;

mod client;

pub use client::{OpenInterface, OpenInterfaceBuilder};
pub use error::{OiError, ProtocolError, Result};
pub use protocol::{Command, OiMode, Opcode};
pub use sensors::{DecodeStats, DecoderConfig, PacketId, SensorReading};
pub use writer::WriterConfig;
