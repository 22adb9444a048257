//! # Core Protocol Components
//!
//! Low-level frame handling, codecs, and packet routing.
//!
//! This module provides the foundation for the protocol: wire framing with
//! optional compression, and CRC-keyed routing of application bodies to
//! packet decoders.
//!
//! ## Components
//! - **Frame**: length-prefixed, optionally compressed wire frames
//! - **Codec**: tokio codec for framing over byte streams
//! - **Packet / Registry**: decoded packet model and the type-id lookup table
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [EncodedLen(2, LE)] [RawLen(2, LE)] [Body(N)]
//! ```

pub mod codec;
pub mod frame;
pub mod packet;
pub mod registry;
