//! Latest decoded value per sensor packet.
//!
//! Every packet owns one `AtomicU64` slot packing the raw value, the
//! signedness, a presence bit and the generation of the frame it came from:
//!
//! ```text
//! ┌─────────┬────────┬──────────┬──────────────┬───────────┐
//! │ bit 63  │ bit 62 │  bit 61  │   16..=47    │  0..=15   │
//! │ present │ signed │ 2 bytes  │  generation  │ raw value │
//! └─────────┴────────┴──────────┴──────────────┴───────────┘
//! ```
//!
//! The decoder is the only writer; a store replaces the whole word, so a
//! reader never sees bytes from two different frames in one value. There is
//! no guarantee across fields: two reads may straddle a frame.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::packet::{PacketDescriptor, PacketId, Width};

const PRESENT: u64 = 1 << 63;
const SIGNED: u64 = 1 << 62;
const WIDE: u64 = 1 << 61;
const GENERATION_SHIFT: u32 = 16;
const SLOTS: usize = 59;

/// One snapshot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub packet: PacketId,
    /// Wire value as received (big-endian assembled, not sign-extended).
    pub raw: u16,
    pub signed: bool,
    pub width: Width,
    /// Decoder frame counter at the time of the update.
    pub generation: u32,
}

impl SensorReading {
    /// Value with the packet's signedness applied.
    ///
    /// One-byte signed packets (temperature) are sign-extended from 8 bits.
    pub fn value(&self) -> i32 {
        match (self.signed, self.width) {
            (false, _) => self.raw as i32,
            (true, Width::One) => self.raw as u8 as i8 as i32,
            (true, Width::Two) => self.raw as i16 as i32,
        }
    }
}

/// Lock-free table of the most recent reading of every individual packet.
#[derive(Debug)]
pub struct SensorSnapshot {
    slots: [AtomicU64; SLOTS],
}

impl SensorSnapshot {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Current reading of a packet, if one has been decoded.
    pub fn get(&self, id: PacketId) -> Option<SensorReading> {
        let word = self.slots.get(id.as_u8() as usize)?.load(Ordering::Acquire);
        if word & PRESENT == 0 {
            return None;
        }
        Some(SensorReading {
            packet: id,
            raw: word as u16,
            signed: word & SIGNED != 0,
            width: if word & WIDE != 0 { Width::Two } else { Width::One },
            generation: (word >> GENERATION_SHIFT) as u32,
        })
    }

    /// Publish one field. Decoder only.
    pub(crate) fn store(&self, descriptor: &PacketDescriptor, raw: u16, generation: u32) {
        let Some(slot) = self.slots.get(descriptor.id.as_u8() as usize) else {
            return;
        };
        let mut word = PRESENT | ((generation as u64) << GENERATION_SHIFT) | raw as u64;
        if descriptor.signed {
            word |= SIGNED;
        }
        if descriptor.width == Width::Two {
            word |= WIDE;
        }
        slot.store(word, Ordering::Release);
    }

    /// Forget every reading. Decoder only.
    pub(crate) fn clear(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Release);
        }
    }
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
