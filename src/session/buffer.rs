//! # Session Buffer
//!
//! Per-connection byte accumulator between the transport and the frame codec.
//!
//! The transport hands over arbitrarily-sized chunks; the buffer absorbs them
//! into a growable window and yields the maximal set of fully available
//! frames per drain, keeping any trailing partial frame for the next intake.
//!
//! Capacity management amortizes allocation for bursty connections: growth
//! doubles until the chunk fits, and an opportunistic shrink walks capacity
//! back toward the default once occupancy has stayed under a quarter of the
//! window for the cooldown period. Shrink only runs after an append that did
//! not itself grow the buffer.

use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::core::frame::{self, Frame, FrameHeader, HEADER_LEN};
use crate::utils::compression::CompressionKind;

/// Default window size for a fresh connection.
pub const DEFAULT_CAPACITY: usize = 128;

/// How long occupancy must stay low before the window shrinks.
pub const SHRINK_COOLDOWN: Duration = Duration::from_secs(1);

/// Growable/shrinkable frame-reassembly window for one connection.
///
/// Not internally synchronized; the owning session wraps it in its own mutex
/// so resize and compaction are atomic with respect to concurrent access.
pub struct SessionBuffer {
    storage: Vec<u8>,
    used: usize,
    default_capacity: usize,
    shrink_cooldown: Duration,
    last_resize: Instant,
    kind: CompressionKind,
}

impl SessionBuffer {
    pub fn new(kind: CompressionKind) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, SHRINK_COOLDOWN, kind)
    }

    pub fn with_capacity(
        default_capacity: usize,
        shrink_cooldown: Duration,
        kind: CompressionKind,
    ) -> Self {
        Self {
            storage: vec![0; default_capacity],
            used: 0,
            default_capacity,
            shrink_cooldown,
            last_resize: Instant::now(),
            kind,
        }
    }

    /// Bytes currently buffered and not yet drained.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Current window capacity.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Absorb one inbound chunk.
    ///
    /// Grows the window by doubling until the chunk fits; otherwise copies in
    /// place and considers an opportunistic shrink.
    pub fn append(&mut self, chunk: &[u8]) {
        if chunk.len() > self.capacity() - self.used {
            self.grow(chunk);
        } else {
            self.storage[self.used..self.used + chunk.len()].copy_from_slice(chunk);
            self.used += chunk.len();
            if self.used < self.capacity() / 4
                && self.last_resize.elapsed() >= self.shrink_cooldown
            {
                self.shrink();
            }
        }
    }

    /// Decode every fully available frame, preserving a trailing partial.
    ///
    /// Stops without error when fewer than the header size remains or when a
    /// declared body exceeds what is buffered - the read cursor stays before
    /// that header so the frame is retried after more data arrives. Frames
    /// that are fully available but fail to decode (corrupt compressed body)
    /// are dropped; the stream continues. Unread bytes are compacted to
    /// offset 0 afterwards.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut read = 0;

        while read < self.used {
            let window = &self.storage[read..self.used];
            let header = match FrameHeader::parse(window) {
                Ok(header) => header,
                Err(_) => break,
            };
            let total = header.frame_len();
            if window.len() < total {
                // Partial body: leave the cursor before the header.
                break;
            }
            match frame::decode_body(&header, &window[HEADER_LEN..total], self.kind) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    warn!(error = %e, len = total, "dropping undecodable frame");
                    crate::utils::metrics::global_metrics().frame_dropped();
                }
            }
            read += total;
        }

        self.storage.copy_within(read..self.used, 0);
        self.used -= read;
        trace!(
            frames = frames.len(),
            carried = self.used,
            "session buffer drained"
        );
        frames
    }

    fn grow(&mut self, chunk: &[u8]) {
        let mut capacity = self.capacity() * 2;
        while capacity < self.used + chunk.len() {
            capacity *= 2;
        }
        let mut storage = vec![0; capacity];
        storage[..self.used].copy_from_slice(&self.storage[..self.used]);
        storage[self.used..self.used + chunk.len()].copy_from_slice(chunk);
        self.storage = storage;
        self.used += chunk.len();
        self.last_resize = Instant::now();
        trace!(capacity, used = self.used, "session buffer grown");
    }

    fn shrink(&mut self) {
        let mut capacity = self.default_capacity;
        while capacity < self.used {
            capacity *= 2;
        }
        if capacity >= self.capacity() {
            return;
        }
        let mut storage = vec![0; capacity];
        storage[..self.used].copy_from_slice(&self.storage[..self.used]);
        self.storage = storage;
        self.last_resize = Instant::now();
        trace!(capacity, used = self.used, "session buffer shrunk");
    }
}
