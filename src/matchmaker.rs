//! Matchmaking state machine.
//!
//! Per session: `Connecting -> Waiting -> Paired -> (Waiting | Terminated)`.
//!
//! `Lobby` owns the session registry, the waiting queue and the pairing
//! table. Each public method is one atomic transition; the engine calls them
//! with its lobby mutex held and never awaits inside. Sends go through the
//! unbounded outboxes, so delivering a notice never blocks the transition,
//! and a send to a connection whose socket task is gone is dropped.

use crate::protocol::{self, ServerFrame};
use crate::session::{
    ConnectionId, Identity, Outbox, PairingTable, Profile, QueueEntry, SessionRegistry,
    SessionState, WaitingQueue,
};
use tracing::{debug, info};

/// Result of placing a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id: ConnectionId,
    /// The waiting session this connection was paired with, if any
    pub partner: Option<ConnectionId>,
}

/// Result of tearing a connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// State the session was in before it was removed
    pub previous: SessionState,
    /// Partner that was sent back to the waiting queue
    pub requeued: Option<ConnectionId>,
}

/// Everything the relay needs to know about a paired sender, copied out so
/// the lock can be released before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub sender: ConnectionId,
    pub partner: ConnectionId,
    pub identity: Option<Identity>,
    pub label: String,
    pub avatar: Option<String>,
    pub sender_language: String,
    pub partner_language: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LobbyStats {
    pub sessions: usize,
    pub waiting: usize,
    pub pairs: usize,
    pub swallowed_sends: u64,
}

#[derive(Debug, Default)]
pub struct Lobby {
    registry: SessionRegistry,
    queue: WaitingQueue,
    pairs: PairingTable,
    swallowed_sends: u64,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and either pair it with the oldest waiter or
    /// park it in the waiting queue.
    pub fn connect(
        &mut self,
        identity: Option<Identity>,
        profile: Profile,
        outbox: Outbox,
    ) -> Placement {
        let id = self.registry.register(identity, profile, outbox);

        // Skip queue entries whose session has already been removed
        let candidate = loop {
            match self.queue.dequeue_other_than(id) {
                Some(entry) if self.registry.contains(entry.id) => break Some(entry),
                Some(stale) => debug!("Dropping stale queue entry {}", stale.id),
                None => break None,
            }
        };

        match candidate {
            Some(candidate) => {
                self.pair_with(id, &candidate);
                Placement {
                    id,
                    partner: Some(candidate.id),
                }
            }
            None => {
                self.park(id);
                Placement { id, partner: None }
            }
        }
    }

    fn pair_with(&mut self, id: ConnectionId, candidate: &QueueEntry) {
        self.pairs.pair(id, candidate.id);
        self.registry.set_state(id, SessionState::Paired);
        self.registry.set_state(candidate.id, SessionState::Paired);

        let my_label = self.label_of(id);

        self.deliver(id, ServerFrame::paired());
        self.deliver(candidate.id, ServerFrame::paired());
        self.deliver(
            candidate.id,
            ServerFrame::system(protocol::entered_notice(&my_label)),
        );
        self.deliver(
            id,
            ServerFrame::system(protocol::chatting_with_notice(&candidate.label)),
        );

        info!("Paired {} with {}", id, candidate.id);
    }

    /// Move a registered session into the waiting queue.
    fn park(&mut self, id: ConnectionId) {
        let Ok(session) = self.registry.lookup(id) else {
            return;
        };
        if self.queue.enqueue(session.queue_entry()) {
            self.registry.set_state(id, SessionState::Waiting);
            self.deliver(id, ServerFrame::waiting());
            debug!("{} is waiting ({} in queue)", id, self.queue.len());
        }
    }

    /// Tear a connection down. Calling this for an unknown or already
    /// removed connection is a no-op and returns `None`.
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<Departure> {
        let previous = self.registry.lookup(id).ok()?.state;
        let mut requeued = None;

        match previous {
            SessionState::Paired => {
                if let Some(partner) = self.pairs.unpair(id) {
                    let my_label = self.label_of(id);
                    self.deliver(partner, ServerFrame::system(protocol::left_notice(&my_label)));
                    if self.registry.contains(partner) {
                        self.park(partner);
                        requeued = Some(partner);
                        info!("{} left; {} returned to the waiting queue", id, partner);
                    }
                }
            }
            SessionState::Waiting => {
                self.queue.remove(id);
            }
            SessionState::Connecting | SessionState::Terminated => {}
        }

        // No membership may outlive the registry entry
        self.queue.remove(id);
        self.pairs.unpair(id);
        self.registry.remove(id);

        Some(Departure { previous, requeued })
    }

    /// Snapshot for relaying a message from `sender`, or `None` when the
    /// sender is not currently paired.
    pub fn route(&self, sender: ConnectionId) -> Option<Route> {
        let partner = self.pairs.get(sender)?;
        let from = self.registry.lookup(sender).ok()?;
        let to = self.registry.lookup(partner).ok()?;

        Some(Route {
            sender,
            partner,
            identity: from.identity.clone(),
            label: from.label().to_string(),
            avatar: from.profile.avatar.clone(),
            sender_language: from.profile.language.clone(),
            partner_language: to.profile.language.clone(),
        })
    }

    pub fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.pairs.get(id)
    }

    pub fn state_of(&self, id: ConnectionId) -> Option<SessionState> {
        self.registry.lookup(id).ok().map(|s| s.state)
    }

    /// Best-effort send. Returns `false` if the connection is gone.
    pub fn deliver(&mut self, id: ConnectionId, frame: ServerFrame) -> bool {
        let delivered = self
            .registry
            .lookup(id)
            .map(|session| session.send(frame))
            .unwrap_or(false);

        if !delivered {
            self.swallowed_sends += 1;
            debug!("Dropped frame for vanished connection {}", id);
        }
        delivered
    }

    /// Count a moderation strike against the session itself. Used for
    /// anonymous senders, who have no account to flag.
    pub fn record_strike(&mut self, id: ConnectionId) -> Option<u32> {
        let session = self.registry.lookup_mut(id).ok()?;
        session.strikes += 1;
        Some(session.strikes)
    }

    pub fn waiting(&self) -> Vec<ConnectionId> {
        self.queue.ids()
    }

    pub fn stats(&self) -> LobbyStats {
        LobbyStats {
            sessions: self.registry.len(),
            waiting: self.queue.len(),
            pairs: self.pairs.len(),
            swallowed_sends: self.swallowed_sends,
        }
    }

    /// Check the cross-container invariants: the pairing table is symmetric,
    /// no connection is both waiting and paired, every queued or paired
    /// connection is registered, and session states agree with membership.
    pub fn is_consistent(&self) -> bool {
        if !self.pairs.is_symmetric() {
            return false;
        }

        let waiting = self.queue.ids();
        let mut seen = std::collections::HashSet::new();
        for id in &waiting {
            if !seen.insert(*id) || self.pairs.is_paired(*id) || !self.registry.contains(*id) {
                return false;
            }
        }

        if self.pairs.connections().any(|id| !self.registry.contains(id)) {
            return false;
        }

        self.registry.iter().all(|session| match session.state {
            SessionState::Waiting => self.queue.contains(session.id),
            SessionState::Paired => self.pairs.is_paired(session.id),
            SessionState::Connecting | SessionState::Terminated => {
                !self.queue.contains(session.id) && !self.pairs.is_paired(session.id)
            }
        })
    }

    fn label_of(&self, id: ConnectionId) -> String {
        self.registry
            .lookup(id)
            .map(|s| s.label().to_string())
            .unwrap_or_else(|_| crate::session::ANONYMOUS_LABEL.to_string())
    }
}
