//! Parse key: the negotiated field layout of a sensor request.
//!
//! Built from the ids passed to `sensors`, `query_list` or `stream`. The same
//! expansion feeds the request bytes sent to the robot and the field walk
//! performed by the decoder.

use bytes::Buf;

use super::packet::{self, PacketDescriptor, PacketId};
use crate::error::{OiError, ProtocolError, Result};

/// Maximum number of ids in one query list or stream request.
pub const MAX_REQUESTED_IDS: usize = u8::MAX as usize;

/// Ordered list of individual packets the decoder expects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseKey {
    /// Ids as requested (groups not expanded).
    requested: Vec<PacketId>,
    /// Individual descriptors in wire order.
    fields: Vec<PacketDescriptor>,
    /// Sum of field widths.
    width: usize,
}

/// One decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldValue {
    pub descriptor: PacketDescriptor,
    pub raw: u16,
}

impl ParseKey {
    /// Build a key from requested ids.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the list is empty, longer than 255 entries or
    /// contains an id the robot does not know.
    pub fn new(ids: &[PacketId]) -> Result<Self> {
        if ids.is_empty() {
            return Err(OiError::invalid("packet id list is empty"));
        }
        if ids.len() > MAX_REQUESTED_IDS {
            return Err(OiError::invalid(format!(
                "{} packet ids requested, at most {} allowed",
                ids.len(),
                MAX_REQUESTED_IDS
            )));
        }

        let mut fields = Vec::new();
        for &id in ids {
            let expanded = packet::expand(id)
                .ok_or_else(|| OiError::invalid(format!("unknown packet id {}", id)))?;
            fields.extend_from_slice(expanded);
        }
        let width = fields.iter().map(PacketDescriptor::len).sum();

        Ok(Self {
            requested: ids.to_vec(),
            fields,
            width,
        })
    }

    /// Key that expects nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn requested(&self) -> &[PacketId] {
        &self.requested
    }

    pub fn fields(&self) -> &[PacketDescriptor] {
        &self.fields
    }

    /// Payload bytes of an untagged frame (field data only).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Payload bytes of a tagged stream frame (an id byte before each requested packet).
    pub fn tagged_width(&self) -> usize {
        self.width + self.requested.len()
    }

    /// Whether an individual packet is extractable under this key.
    pub fn contains(&self, id: PacketId) -> bool {
        self.fields.iter().any(|d| d.id == id)
    }

    /// Walk the key over a frame payload.
    ///
    /// A payload of exactly [`width`](Self::width) bytes is read as bare field
    /// values. A payload of [`tagged_width`](Self::tagged_width) bytes is read
    /// as `[id][data]` groups in request order, which is how the robot
    /// formats stream frames.
    pub fn extract(&self, payload: &[u8]) -> std::result::Result<Vec<FieldValue>, ProtocolError> {
        if payload.len() == self.width {
            let mut buf = payload;
            return Ok(self.fields.iter().map(|d| read_field(&mut buf, d)).collect());
        }

        if payload.len() != self.tagged_width() {
            return Err(ProtocolError::LengthMismatch {
                expected: self.width,
                actual: payload.len(),
            });
        }

        let mut buf = payload;
        let mut values = Vec::with_capacity(self.fields.len());
        for &id in &self.requested {
            let found = buf.get_u8();
            if found != id.as_u8() {
                return Err(ProtocolError::UnexpectedPacketId {
                    expected: id.as_u8(),
                    found,
                });
            }
            // Ids were validated when the key was built.
            for d in packet::expand(id).unwrap_or_default() {
                values.push(read_field(&mut buf, d));
            }
        }
        Ok(values)
    }
}

fn read_field(buf: &mut &[u8], descriptor: &PacketDescriptor) -> FieldValue {
    let raw = match descriptor.len() {
        1 => buf.get_u8() as u16,
        _ => buf.get_u16(),
    };
    FieldValue {
        descriptor: *descriptor,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_individual_ids() {
        let key = ParseKey::new(&[PacketId::BATTERY_CHARGE, PacketId::BATTERY_CAPACITY]).unwrap();
        assert_eq!(key.fields().len(), 2);
        assert_eq!(key.width(), 4);
        assert_eq!(key.tagged_width(), 6);
        assert!(key.contains(PacketId::BATTERY_CHARGE));
        assert!(!key.contains(PacketId::VOLTAGE));
    }

    #[test]
    fn test_key_expands_groups_in_order() {
        let key = ParseKey::new(&[PacketId::PACKETS_17_THRU_20, PacketId::WALL]).unwrap();
        let ids: Vec<u8> = key.fields().iter().map(|d| d.id.as_u8()).collect();
        assert_eq!(ids, vec![17, 18, 19, 20, 8]);
        assert_eq!(key.width(), 7);
        assert_eq!(key.requested().len(), 2);
    }

    #[test]
    fn test_key_rejects_bad_lists() {
        assert!(matches!(
            ParseKey::new(&[]),
            Err(OiError::InvalidParameter(_))
        ));
        assert!(matches!(
            ParseKey::new(&[PacketId(59)]),
            Err(OiError::InvalidParameter(_))
        ));
        let too_many = vec![PacketId::WALL; 256];
        assert!(matches!(
            ParseKey::new(&too_many),
            Err(OiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_extract_untagged() {
        let key = ParseKey::new(&[PacketId::BATTERY_CHARGE, PacketId::BATTERY_CAPACITY]).unwrap();
        let values = key.extract(&[0x0B, 0xB8, 0x0F, 0xA0]).unwrap();
        assert_eq!(values[0].raw, 3000);
        assert_eq!(values[1].raw, 4000);
    }

    #[test]
    fn test_extract_tagged() {
        let key = ParseKey::new(&[PacketId::WALL, PacketId::DISTANCE]).unwrap();
        let values = key.extract(&[8, 1, 19, 0xFF, 0xF6]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].raw, 1);
        assert_eq!(values[1].raw, 0xFFF6);
        assert!(values[1].descriptor.signed);
    }

    #[test]
    fn test_extract_tagged_group() {
        let key = ParseKey::new(&[PacketId::PACKETS_17_THRU_20]).unwrap();
        let values = key.extract(&[2, 0xA1, 0x04, 0x00, 0x10, 0x00, 0x05]).unwrap();
        let raws: Vec<u16> = values.iter().map(|v| v.raw).collect();
        assert_eq!(raws, vec![0xA1, 0x04, 0x10, 0x05]);
    }

    #[test]
    fn test_extract_tagged_wrong_id() {
        let key = ParseKey::new(&[PacketId::WALL, PacketId::DISTANCE]).unwrap();
        let err = key.extract(&[8, 1, 20, 0x00, 0x01]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedPacketId {
                expected: 19,
                found: 20
            }
        );
    }

    #[test]
    fn test_extract_length_mismatch() {
        let key = ParseKey::new(&[PacketId::WALL]).unwrap();
        let err = key.extract(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::LengthMismatch {
                expected: 1,
                actual: 3
            }
        );
    }
}
