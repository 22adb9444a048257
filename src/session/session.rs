//! # Session
//!
//! One session per accepted connection: identity (remote address + numeric
//! id), one buffer, one dispatch-chain cursor, and the outbound sink. The
//! session is the seam between the transport (raw chunks in, wire bytes out)
//! and the ordered dispatch of decoded packets.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::config::ProtocolConfig;
use crate::core::frame;
use crate::core::registry::PacketRegistry;
use crate::dispatch::Dispatcher;
use crate::error::{ProtocolError, Result};
use crate::session::buffer::SessionBuffer;
use crate::utils::compression::CompressionKind;
use crate::utils::metrics::global_metrics;

/// Per-connection protocol state.
///
/// Lifetime matches the transport connection: created on accept, destroyed on
/// disconnect; the buffer and the dispatch chain die with it.
pub struct Session {
    address: SocketAddr,
    id: u64,
    buffer: Mutex<SessionBuffer>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<PacketRegistry>,
    outbound: mpsc::UnboundedSender<Bytes>,
    compression: CompressionKind,
    compression_floor: usize,
}

impl Session {
    pub fn new(
        address: SocketAddr,
        id: u64,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<PacketRegistry>,
        outbound: mpsc::UnboundedSender<Bytes>,
        config: &ProtocolConfig,
    ) -> Session {
        Session {
            address,
            id,
            buffer: Mutex::new(SessionBuffer::with_capacity(
                config.session.initial_buffer_bytes,
                config.session.shrink_cooldown,
                config.codec.compression,
            )),
            dispatcher,
            registry,
            outbound,
            compression: config.codec.compression,
            compression_floor: config.codec.compression_floor_bytes,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Seed this session's dispatch chain; must run before any `process`.
    pub fn on_connected(&self) -> Result<()> {
        self.dispatcher.open_session(self.id)
    }

    /// Publish the terminal event and drop the chain.
    pub fn on_disconnected(&self) -> Result<()> {
        self.dispatcher.close_session(self.id)
    }

    /// Absorb one raw chunk from the transport.
    pub fn receive(&self, chunk: &[u8]) -> Result<()> {
        self.lock_buffer()?.append(chunk);
        Ok(())
    }

    /// Drain buffered frames, decode packets, publish them in arrival order.
    ///
    /// Returns whether any packet was published. Frames that decode to no
    /// packet (transport-control frames, unknown or undersized bodies) are
    /// skipped without breaking the chain.
    pub fn process(&self) -> Result<bool> {
        let frames = self.lock_buffer()?.drain();
        let metrics = global_metrics();
        metrics.frames_received(frames.len() as u64);

        let mut published = false;
        for frame in frames {
            if !frame.application {
                // Transport-control frames carry no application payload.
                trace!(session_id = self.id, "transport-control frame skipped");
                continue;
            }
            match self.registry.decode(&frame.payload) {
                Some(packet) => {
                    self.dispatcher.publish_packet(self.id, Arc::from(packet))?;
                    metrics.packet_published();
                    published = true;
                }
                None => metrics.packet_unknown(),
            }
        }
        Ok(published)
    }

    /// Encode one application payload and queue it for the transport.
    pub fn send_packet(&self, payload: &[u8]) -> Result<()> {
        let wire = frame::encode(payload, self.compression, self.compression_floor)?;
        global_metrics().frame_sent(wire.len() as u64);
        self.outbound
            .send(Bytes::from(wire))
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    fn lock_buffer(&self) -> Result<std::sync::MutexGuard<'_, SessionBuffer>> {
        self.buffer
            .lock()
            .map_err(|_| ProtocolError::InvalidState("session buffer lock poisoned".to_string()))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session[{} #{}]", self.address, self.id)
    }
}
