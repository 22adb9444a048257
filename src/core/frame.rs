//! # Wire Frame Codec
//!
//! Stateless encode/decode for the transport-level frame format.
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [EncodedLen(2, LE)] [RawLen(2, LE)] [Body(EncodedLen)]
//! ```
//!
//! Flags: bit0 = body is compressed, bit1 = application packet (as opposed to
//! a transport-control packet). `RawLen` is the pre-compression body length
//! and equals `EncodedLen` when the compressed bit is unset.
//!
//! Compression is attempted for bodies of [`COMPRESSION_FLOOR`] bytes or more
//! and adopted only when the result is strictly smaller, so incompressible
//! payloads never expand on the wire.

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::utils::compression::{self, CompressionKind};

/// Fixed header size in bytes: flags + encoded length + raw length.
pub const HEADER_LEN: usize = 5;

/// Minimum body size before compression is attempted.
pub const COMPRESSION_FLOOR: usize = 16;

/// Maximum payload carried by one frame; the length fields are u16.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

const FLAG_COMPRESSED: u8 = 1 << 0;
const FLAG_APPLICATION: u8 = 1 << 1;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub compressed: bool,
    pub application: bool,
    pub encoded_len: u16,
    pub raw_len: u16,
}

impl FrameHeader {
    /// Parse a header from the front of `input` without consuming body bytes.
    ///
    /// # Errors
    /// `IncompleteFrame` when fewer than [`HEADER_LEN`] bytes are available.
    pub fn parse(mut input: &[u8]) -> Result<FrameHeader> {
        if input.len() < HEADER_LEN {
            return Err(ProtocolError::IncompleteFrame {
                needed: HEADER_LEN,
                available: input.len(),
            });
        }
        let flags = input.get_u8();
        let encoded_len = input.get_u16_le();
        let raw_len = input.get_u16_le();
        Ok(FrameHeader {
            compressed: flags & FLAG_COMPRESSED != 0,
            application: flags & FLAG_APPLICATION != 0,
            encoded_len,
            raw_len,
        })
    }

    /// Total frame size on the wire, header included.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.encoded_len as usize
    }
}

/// One decoded frame: the reassembled body plus its routing bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// True for application packets, false for transport-control packets.
    pub application: bool,
    /// Decompressed body bytes.
    pub payload: Vec<u8>,
}

/// Encode one application payload into wire bytes.
///
/// Bodies of `floor` bytes or more attempt compression; the compressed form
/// is adopted only if strictly smaller than the original.
///
/// # Errors
/// - `OversizedFrame` when the payload does not fit a u16 length field
/// - `CompressionFailure` when the compressor itself fails
pub fn encode(payload: &[u8], kind: CompressionKind, floor: usize) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::OversizedFrame(payload.len()));
    }

    let compressed_body = compression::compress_if_smaller(payload, kind, floor)?;
    let (body, compressed): (&[u8], bool) = match &compressed_body {
        Some(c) => (c, true),
        None => (payload, false),
    };

    let mut flags = FLAG_APPLICATION;
    if compressed {
        flags |= FLAG_COMPRESSED;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.put_u8(flags);
    out.put_u16_le(body.len() as u16);
    out.put_u16_le(payload.len() as u16);
    out.put_slice(body);
    trace!(
        raw = payload.len(),
        encoded = body.len(),
        compressed,
        "frame encoded"
    );
    Ok(out)
}

/// Decode the body of an already-parsed frame, decompressing if flagged.
///
/// `body` must be exactly `header.encoded_len` bytes.
pub fn decode_body(header: &FrameHeader, body: &[u8], kind: CompressionKind) -> Result<Frame> {
    debug_assert_eq!(body.len(), header.encoded_len as usize);
    let payload = if header.compressed {
        compression::decompress(body, header.raw_len as usize, kind)?
    } else {
        if header.raw_len != header.encoded_len {
            // An uncompressed body whose lengths disagree is corrupt.
            return Err(ProtocolError::DecompressionFailure);
        }
        body.to_vec()
    };
    Ok(Frame {
        application: header.application,
        payload,
    })
}

/// Decode one frame from the front of `input`.
///
/// Returns the frame and the number of bytes consumed. `IncompleteFrame` is
/// raised (with nothing consumed) when the header or declared body is not
/// fully available yet - the caller waits for more input and retries.
pub fn decode(input: &[u8], kind: CompressionKind) -> Result<(Frame, usize)> {
    let header = FrameHeader::parse(input)?;
    let total = header.frame_len();
    if input.len() < total {
        return Err(ProtocolError::IncompleteFrame {
            needed: total,
            available: input.len(),
        });
    }
    let frame = decode_body(&header, &input[HEADER_LEN..total], kind)?;
    Ok((frame, total))
}
