//! # Decoded Packets
//!
//! Application packet bodies carry a 2-byte reserved sub-header followed by a
//! 4-byte type identifier - the CRC32 of the packet's type name - at offset 2.
//! The [`GamePacket`] trait is the common surface for everything the registry
//! can produce; concrete packet types live next to the subsystems that
//! consume them.
//!
//! One identifier value is reserved: [`CONTROLLER_CRC`] marks controller
//! packets, which share a single envelope (controller id + addressed object)
//! instead of one decoder per type.

use bytes::Buf;
use std::any::Any;
use std::fmt::Debug;

/// Reserved type identifier routing to the controller-packet decoder.
pub const CONTROLLER_CRC: u32 = 0x80CE_5E46;

/// Byte offset of the type identifier inside an application body.
pub const CRC_OFFSET: usize = 2;

/// Minimum application body: sub-header plus type identifier.
pub const MIN_BODY_LEN: usize = 6;

/// Compute the wire type identifier for a packet type name.
pub fn packet_crc(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

/// A decoded application packet.
///
/// Decoders return boxed trait objects; consumers downcast through
/// [`GamePacket::as_any`] when they need the concrete type.
pub trait GamePacket: Any + Send + Sync + Debug {
    /// The wire type identifier this packet decodes from.
    fn crc(&self) -> u32;

    /// Downcasting hook for typed consumers.
    fn as_any(&self) -> &dyn Any;
}

/// Build an application body: reserved sub-header, type identifier, payload.
pub fn application_body(crc: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(MIN_BODY_LEN + payload.len());
    body.extend_from_slice(&[0u8; CRC_OFFSET]);
    body.extend_from_slice(&crc.to_le_bytes());
    body.extend_from_slice(payload);
    body
}

/// Controller packet envelope.
///
/// Controller packets multiplex many sub-operations behind one reserved type
/// identifier; the envelope names the sub-operation and the addressed object
/// and leaves the rest opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPacket {
    /// Sub-operation identifier.
    pub controller_id: u32,
    /// Object the sub-operation addresses.
    pub receiver_id: u64,
    /// Remaining, operation-specific bytes.
    pub body: Vec<u8>,
}

impl ControllerPacket {
    /// Envelope size: sub-header, type identifier, controller id, receiver id.
    const ENVELOPE_LEN: usize = MIN_BODY_LEN + 4 + 8;

    /// Decode a controller packet from a full application body.
    ///
    /// Returns `None` for bodies too short to hold the envelope.
    pub fn decode(body: &[u8]) -> Option<ControllerPacket> {
        if body.len() < Self::ENVELOPE_LEN {
            return None;
        }
        let mut rest = &body[MIN_BODY_LEN..];
        let controller_id = rest.get_u32_le();
        let receiver_id = rest.get_u64_le();
        Some(ControllerPacket {
            controller_id,
            receiver_id,
            body: rest.to_vec(),
        })
    }

    /// Encode this packet into a full application body.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(12 + self.body.len());
        payload.extend_from_slice(&self.controller_id.to_le_bytes());
        payload.extend_from_slice(&self.receiver_id.to_le_bytes());
        payload.extend_from_slice(&self.body);
        application_body(CONTROLLER_CRC, &payload)
    }
}

impl GamePacket for ControllerPacket {
    fn crc(&self) -> u32 {
        CONTROLLER_CRC
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_is_stable_per_name() {
        assert_eq!(packet_crc("MapLocationsRequest"), packet_crc("MapLocationsRequest"));
        assert_ne!(packet_crc("MapLocationsRequest"), packet_crc("MapLocationsResponse"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn controller_envelope_roundtrip() {
        let packet = ControllerPacket {
            controller_id: 0x0116,
            receiver_id: 42,
            body: vec![1, 2, 3, 4],
        };
        let encoded = packet.encode();
        let decoded = ControllerPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn short_controller_body_yields_none() {
        assert!(ControllerPacket::decode(&[0u8; 10]).is_none());
    }
}
