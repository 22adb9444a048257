//! Observer bookkeeping for replicated entities.
//!
//! Observers subscribe to an entity, receive its baseline once, and from then
//! on see only deltas. Delivery is push-based over unbounded channels; an
//! observer that went away is pruned on the next broadcast rather than
//! failing the mutation that noticed it.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

/// One replication notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationEvent {
    /// Full-state snapshot, sent once per observer.
    Baseline { object_id: u64, payload: Bytes },
    /// Incremental update to one named slot.
    Delta {
        object_id: u64,
        slot: u16,
        payload: Bytes,
    },
}

/// The set of observers currently aware of one entity.
pub struct ObserverSet {
    observers: RwLock<HashMap<u64, mpsc::UnboundedSender<ReplicationEvent>>>,
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an observer and return its delivery channel.
    ///
    /// Re-subscribing under the same id replaces the previous channel.
    pub fn subscribe(&self, observer_id: u64) -> mpsc::UnboundedReceiver<ReplicationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut observers) = self.observers.write() {
            observers.insert(observer_id, tx);
        }
        rx
    }

    /// Remove an observer; it stops seeing deltas immediately.
    pub fn unsubscribe(&self, observer_id: u64) {
        if let Ok(mut observers) = self.observers.write() {
            observers.remove(&observer_id);
        }
    }

    /// Deliver an event to one observer.
    pub fn send_to(&self, observer_id: u64, event: ReplicationEvent) {
        if let Ok(observers) = self.observers.read() {
            if let Some(tx) = observers.get(&observer_id) {
                let _ = tx.send(event);
            }
        }
    }

    /// Deliver an event to every current observer, pruning dead channels.
    pub fn broadcast(&self, event: &ReplicationEvent) {
        let mut dead = Vec::new();
        if let Ok(observers) = self.observers.read() {
            for (&id, tx) in observers.iter() {
                if tx.send(event.clone()).is_err() {
                    dead.push(id);
                }
            }
        }
        if !dead.is_empty() {
            trace!(count = dead.len(), "pruning dropped observers");
            if let Ok(mut observers) = self.observers.write() {
                for id in dead {
                    observers.remove(&id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
