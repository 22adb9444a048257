//! Session directory.
//!
//! Maps live session ids to their [`Session`] handles so event consumers can
//! address outbound packets to a connection. The transport registers a
//! session on accept and removes it on disconnect; a send to an id that
//! already disconnected simply finds no session.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::session::Session;

/// Live sessions by id.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(session.id(), session);
        }
    }

    pub fn unregister(&self, session_id: u64) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&session_id);
        }
    }

    pub fn get(&self, session_id: u64) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(&session_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
