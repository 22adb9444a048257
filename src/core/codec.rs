//! Tokio codec adapter for the wire frame format.
//!
//! Wraps [`crate::core::frame`] for use with `tokio_util::codec::Framed`,
//! which is how clients and tooling talk to a server without managing a
//! session buffer by hand. The server side feeds raw chunks through
//! [`crate::session::Session`] instead, which owns its own window management.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{self, Frame, COMPRESSION_FLOOR};
use crate::error::ProtocolError;
use crate::utils::compression::CompressionKind;

/// Frame codec for `Framed` streams.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    kind: CompressionKind,
    floor: usize,
}

impl FrameCodec {
    pub fn new(kind: CompressionKind) -> Self {
        Self {
            kind,
            floor: COMPRESSION_FLOOR,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(CompressionKind::default())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        match frame::decode(src, self.kind) {
            Ok((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let wire = frame::encode(&payload, self.kind, self.floor)?;
        dst.extend_from_slice(&wire);
        Ok(())
    }
}
