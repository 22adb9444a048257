//! # Ordered Event Dispatch
//!
//! Publishes decoded packets as events such that consumers processing
//! asynchronously still observe each session's events in arrival order,
//! without serializing the publishing threads.
//!
//! ## Mechanism
//! The dispatcher keeps one "last published event" gate per session. Every
//! new event records the current gate as its predecessor and installs a fresh
//! gate as the new tail - an atomic read-modify-publish step under the chain
//! mutex - before being handed to the delivery queue. A consumer task calls
//! [`SequencedEvent::wait_turn`] before processing and
//! [`SequencedEvent::complete`] after, so event N+1 is observably processed
//! only after event N completes, whatever thread either lands on.
//!
//! Chains are independent: cross-session ordering is unspecified. The chain
//! root is the session-opened event; an intake cycle that decodes zero
//! packets publishes nothing and leaves the chain unchanged.

pub mod event;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::core::packet::GamePacket;
use crate::error::{ProtocolError, Result};

pub use event::{DispatchEvent, SequencedEvent};

/// Per-session ordered event publisher.
pub struct Dispatcher {
    chains: Mutex<HashMap<u64, oneshot::Receiver<()>>>,
    queue: mpsc::UnboundedSender<SequencedEvent>,
}

/// Receiving half of the dispatch queue.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SequencedEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<SequencedEvent> {
        self.rx.recv().await
    }
}

impl Dispatcher {
    pub fn new() -> (Arc<Dispatcher>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Dispatcher {
                chains: Mutex::new(HashMap::new()),
                queue: tx,
            }),
            EventStream { rx },
        )
    }

    /// Seed a session's chain with its root event.
    pub fn open_session(&self, session_id: u64) -> Result<()> {
        debug!(session_id, "dispatch chain opened");
        self.publish(DispatchEvent::SessionOpened { session_id })
    }

    /// Publish one decoded packet, ordered after everything already
    /// published for this session.
    pub fn publish_packet(&self, session_id: u64, packet: Arc<dyn GamePacket>) -> Result<()> {
        self.publish(DispatchEvent::InboundPacket { session_id, packet })
    }

    /// Publish the session's terminal event and drop its chain state.
    pub fn close_session(&self, session_id: u64) -> Result<()> {
        self.publish(DispatchEvent::SessionClosed { session_id })?;
        self.chains
            .lock()
            .map_err(|_| ProtocolError::InvalidState("dispatch chain lock poisoned".to_string()))?
            .remove(&session_id);
        debug!(session_id, "dispatch chain closed");
        Ok(())
    }

    /// Atomic read-modify-publish: record the current tail as predecessor,
    /// install a fresh gate as the new tail, enqueue.
    ///
    /// The chain lock is held across the enqueue so two packets from the same
    /// session can never race to record the same predecessor, and queue order
    /// matches chain order.
    fn publish(&self, event: DispatchEvent) -> Result<()> {
        let session_id = event.session_id();
        let (done_tx, done_rx) = oneshot::channel();

        let mut chains = self
            .chains
            .lock()
            .map_err(|_| ProtocolError::InvalidState("dispatch chain lock poisoned".to_string()))?;
        let predecessor = chains.insert(session_id, done_rx);
        let sequenced = SequencedEvent::new(event, predecessor, done_tx);
        trace!(session_id, event = ?sequenced.event, "event published");
        if self.queue.send(sequenced).is_err() {
            debug!(session_id, "event stream dropped, publish discarded");
        }
        Ok(())
    }
}

/// Drive an event stream with one spawned task per event.
///
/// Tasks run on whatever worker thread the runtime picks; the predecessor
/// gates alone enforce per-session ordering. Returns when the dispatcher
/// side has been dropped and the queue is exhausted.
pub async fn run_ordered<F>(mut stream: EventStream, handler: F)
where
    F: Fn(&DispatchEvent) + Send + Sync + Clone + 'static,
{
    while let Some(mut sequenced) = stream.recv().await {
        let handler = handler.clone();
        tokio::spawn(async move {
            sequenced.wait_turn().await;
            handler(&sequenced.event);
            sequenced.complete();
        });
    }
}
