//! # Error Types
//!
//! Comprehensive error handling for the protocol core.
//!
//! This module defines all error variants that can occur during framing,
//! dispatch, and replication, from low-level I/O errors to entity state-machine
//! violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Transport and socket failures
//! - **Framing Errors**: Incomplete frames, oversized payloads, compression failures
//! - **Replication Errors**: Illegal entity state transitions, capacity limits
//! - **Configuration Errors**: Invalid or unreadable configuration
//!
//! `IncompleteFrame` is special: it is flow control, not failure. The framer
//! raises it when the buffered bytes do not yet contain a whole frame, the
//! caller rewinds and waits for more input, and it is never logged as an error.
//!
//! State-machine violations (`InvalidState`, `CapacityExceeded`) are surfaced
//! to the caller immediately rather than silently ignored - continuing past
//! one would desynchronize replicated state between server and observers.
//! Nothing in this crate retries automatically.

use std::io;
use thiserror::Error;

/// Primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("incomplete frame: need {needed} bytes, have {available}")]
    IncompleteFrame { needed: usize, available: usize },

    #[error("frame payload too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("compression failed")]
    CompressionFailure,

    #[error("decompression failed")]
    DecompressionFailure,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("capacity exceeded: limit is {limit}")]
    CapacityExceeded { limit: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error only means "wait for more input".
    ///
    /// Framing-level short reads never abort a connection; the buffer retries
    /// the frame once more bytes arrive.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::IncompleteFrame { .. })
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_frame_is_flow_control() {
        let err = ProtocolError::IncompleteFrame {
            needed: 5,
            available: 2,
        };
        assert!(err.is_incomplete());
        assert!(!ProtocolError::ConnectionClosed.is_incomplete());
    }

    #[test]
    fn display_formatting() {
        let errors = vec![
            ProtocolError::IncompleteFrame {
                needed: 10,
                available: 3,
            },
            ProtocolError::OversizedFrame(70_000),
            ProtocolError::CompressionFailure,
            ProtocolError::DecompressionFailure,
            ProtocolError::InvalidState("group already formed".to_string()),
            ProtocolError::CapacityExceeded { limit: 8 },
            ProtocolError::ConnectionClosed,
            ProtocolError::Io(io::Error::other("test error")),
        ];

        for err in errors {
            assert!(!format!("{err}").is_empty());
        }
    }
}
