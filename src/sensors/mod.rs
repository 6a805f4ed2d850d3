//! Sensors module - packet schema, framing and the decoder task.
//!
//! Provides:
//! - [`PacketId`] and the static packet table
//! - [`ParseKey`] - field layout of the request in effect
//! - [`StreamFrameBuffer`] / [`QueryFrameBuffer`] - telemetry framing
//! - [`SensorSnapshot`] - latest value per packet
//! - the background decoder that ties them together

mod decoder;
mod frame_buffer;
mod packet;
mod parse_key;
mod snapshot;

pub use decoder::{DecodeStats, DecoderConfig};
pub(crate) use decoder::{spawn_decoder, DecoderHandle, RequestKind};
pub use frame_buffer::{
    build_query_frame, build_stream_frame, checksum, FrameEvent, QueryFrameBuffer,
    StreamFrameBuffer, MAX_STREAM_PAYLOAD, STREAM_HEADER, STREAM_OVERHEAD,
};
pub use packet::{descriptor, expand, wire_len, PacketDescriptor, PacketId, Width};
pub use parse_key::{FieldValue, ParseKey, MAX_REQUESTED_IDS};
pub use snapshot::{SensorReading, SensorSnapshot};
