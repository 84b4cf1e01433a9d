//! Roster of every registered session, bounded by the server's player cap.

use std::collections::HashMap;

use cubecast_proto::packets::Packet;
use cubecast_world::MemberId;
use parking_lot::RwLock;

use crate::session::SessionHandle;

pub struct SessionRegistry {
    capacity: usize,
    sessions: RwLock<HashMap<MemberId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a session. Fails when the server is full; the returned count is
    /// the current number of sessions.
    pub fn register(&self, session: SessionHandle) -> Result<(), usize> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.capacity && !sessions.contains_key(&session.id()) {
            return Err(sessions.len());
        }
        sessions.insert(session.id(), session);
        Ok(())
    }

    pub fn unregister(&self, id: MemberId) -> Option<SessionHandle> {
        self.sessions.write().remove(&id)
    }

    pub fn get(&self, id: MemberId) -> Option<SessionHandle> {
        self.sessions.read().get(&id).cloned()
    }

    /// Case-insensitive exact name lookup.
    pub fn find_exact(&self, name: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .values()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn all(&self) -> Vec<SessionHandle> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Queue `packet` for every session.
    pub fn broadcast(&self, packet: &Packet) {
        for session in self.sessions.read().values() {
            session.send(packet.clone());
        }
    }

    /// Chat line for every session.
    pub fn message_all(&self, text: &str) {
        for session in self.all() {
            session.message(text);
        }
    }
}
