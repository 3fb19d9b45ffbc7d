use super::{ConnectionId, Identity, Outbox, Profile, Session, SessionState};
use crate::error::SessionError;
use chrono::Utc;
use std::collections::HashMap;

/// Live sessions keyed by connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session in the `Connecting` state under a fresh id.
    pub fn register(
        &mut self,
        identity: Option<Identity>,
        profile: Profile,
        outbox: Outbox,
    ) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);

        self.sessions.insert(
            id,
            Session {
                id,
                identity,
                profile,
                state: SessionState::Connecting,
                connected_at: Utc::now(),
                strikes: 0,
                outbox,
            },
        );

        id
    }

    pub fn lookup(&self, id: ConnectionId) -> Result<&Session, SessionError> {
        self.sessions.get(&id).ok_or(SessionError::NotFound(id))
    }

    pub fn lookup_mut(&mut self, id: ConnectionId) -> Result<&mut Session, SessionError> {
        self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))
    }

    pub fn set_state(&mut self, id: ConnectionId, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = state;
        }
    }

    /// Drop the session. The returned value is marked `Terminated`; its outbox
    /// is released when it goes out of scope, which ends the socket writer.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id).map(|mut session| {
            session.state = SessionState::Terminated;
            session
        })
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn count_in(&self, state: SessionState) -> usize {
        self.sessions.values().filter(|s| s.state == state).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
