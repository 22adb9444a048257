//! # Packet Registry
//!
//! Static lookup table from wire type identifier to decoder function, built
//! once at startup. Routing inspects the 4-byte CRC embedded at a fixed
//! offset inside each application body: the reserved controller identifier
//! goes down its own path, everything else consults the table, and identifiers
//! with no registered decoder yield no packet - the stream continues.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Buf;
use tracing::debug;

use crate::core::packet::{
    ControllerPacket, GamePacket, CONTROLLER_CRC, CRC_OFFSET, MIN_BODY_LEN,
};
use crate::error::{ProtocolError, Result};

type DecoderFn = dyn Fn(&[u8]) -> Option<Box<dyn GamePacket>> + Send + Sync + 'static;

/// Type-identifier to decoder table.
///
/// Registration happens during startup; decoding is read-only and concurrent.
pub struct PacketRegistry {
    decoders: RwLock<HashMap<u32, Box<DecoderFn>>>,
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self {
            decoders: RwLock::new(HashMap::new()),
        }
    }

    /// Register a decoder under the CRC of `name`.
    ///
    /// Exactly one decoder is associated with a type identifier; registering
    /// the same name twice replaces the earlier decoder.
    pub fn register<F>(&self, name: &str, decoder: F) -> Result<u32>
    where
        F: Fn(&[u8]) -> Option<Box<dyn GamePacket>> + Send + Sync + 'static,
    {
        let crc = crate::core::packet::packet_crc(name);
        self.register_crc(crc, decoder)?;
        Ok(crc)
    }

    /// Register a decoder under an explicit type identifier.
    pub fn register_crc<F>(&self, crc: u32, decoder: F) -> Result<()>
    where
        F: Fn(&[u8]) -> Option<Box<dyn GamePacket>> + Send + Sync + 'static,
    {
        let mut decoders = self
            .decoders
            .write()
            .map_err(|_| ProtocolError::InvalidState("packet registry lock poisoned".to_string()))?;
        decoders.insert(crc, Box::new(decoder));
        Ok(())
    }

    /// Decode one application body into a packet.
    ///
    /// Returns `None` - never an error that would abort the stream - for
    /// bodies too short to carry a type identifier, for unknown identifiers,
    /// and for decoders that reject their input.
    pub fn decode(&self, body: &[u8]) -> Option<Box<dyn GamePacket>> {
        if body.len() < MIN_BODY_LEN {
            debug!(len = body.len(), "application body too short for type id");
            return None;
        }
        let crc = (&body[CRC_OFFSET..]).get_u32_le();

        if crc == CONTROLLER_CRC {
            return ControllerPacket::decode(body).map(|p| Box::new(p) as Box<dyn GamePacket>);
        }

        let decoders = self.decoders.read().ok()?;
        match decoders.get(&crc) {
            Some(decoder) => decoder(body),
            None => {
                debug!(crc = format_args!("{crc:#010x}"), "unknown packet type, dropped");
                None
            }
        }
    }
}
