//! Dispatch events and their ordering gates.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::core::packet::GamePacket;

/// One event published for a session.
#[derive(Clone)]
pub enum DispatchEvent {
    /// Chain root: the session's transport-level accept completed.
    SessionOpened { session_id: u64 },
    /// A decoded inbound packet.
    InboundPacket {
        session_id: u64,
        packet: Arc<dyn GamePacket>,
    },
    /// The session disconnected; its chain dies with it.
    SessionClosed { session_id: u64 },
}

impl DispatchEvent {
    pub fn session_id(&self) -> u64 {
        match self {
            DispatchEvent::SessionOpened { session_id }
            | DispatchEvent::InboundPacket { session_id, .. }
            | DispatchEvent::SessionClosed { session_id } => *session_id,
        }
    }
}

impl fmt::Debug for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEvent::SessionOpened { session_id } => {
                write!(f, "SessionOpened({session_id})")
            }
            DispatchEvent::InboundPacket { session_id, packet } => {
                write!(f, "InboundPacket({session_id}, crc={:#010x})", packet.crc())
            }
            DispatchEvent::SessionClosed { session_id } => {
                write!(f, "SessionClosed({session_id})")
            }
        }
    }
}

/// An event plus its place in the per-session chain.
///
/// The predecessor gate is a happens-after marker, not an ownership relation:
/// it is consumed exactly once, by whichever task processes this event.
/// Completion fires when processing ends, releasing the successor.
pub struct SequencedEvent {
    pub event: DispatchEvent,
    predecessor: Option<oneshot::Receiver<()>>,
    completion: Option<oneshot::Sender<()>>,
}

impl SequencedEvent {
    pub(crate) fn new(
        event: DispatchEvent,
        predecessor: Option<oneshot::Receiver<()>>,
        completion: oneshot::Sender<()>,
    ) -> Self {
        Self {
            event,
            predecessor,
            completion: Some(completion),
        }
    }

    /// Wait until the predecessor event has finished processing.
    ///
    /// The chain root has no predecessor and returns immediately. A dropped
    /// gate (the predecessor was skipped) counts as completed so the chain
    /// never stalls.
    pub async fn wait_turn(&mut self) {
        if let Some(gate) = self.predecessor.take() {
            let _ = gate.await;
        }
    }

    /// Mark this event processed, releasing its successor.
    pub fn complete(mut self) {
        if let Some(done) = self.completion.take() {
            let _ = done.send(());
        }
    }
}

impl fmt::Debug for SequencedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencedEvent")
            .field("event", &self.event)
            .field("gated", &self.predecessor.is_some())
            .finish()
    }
}
