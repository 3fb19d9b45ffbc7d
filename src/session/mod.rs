//! Per-connection session state and the three containers the matchmaker
//! mutates: the session registry, the waiting queue, and the pairing table.
//!
//! None of these types lock anything. They are owned by the `Lobby`, which
//! lives behind a single mutex in the engine, so every read-then-write
//! sequence across them runs as one critical section.

mod pairing;
mod queue;
mod registry;

pub use pairing::PairingTable;
pub use queue::{QueueEntry, WaitingQueue};
pub use registry::SessionRegistry;

use crate::protocol::ServerFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Label shown for sessions that connected without a credential.
pub const ANONYMOUS_LABEL: &str = "Unknown";

/// Sender half of a connection's outbound channel.
pub type Outbox = mpsc::UnboundedSender<ServerFrame>;

/// Handle addressing one live connection.
///
/// Allocated by the registry from a monotonic counter, so a value is never
/// handed out twice during the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Authenticated account, as returned by the account directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    /// Display label (the account email)
    pub email: String,
}

/// Display metadata resolved from the profile store at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Preferred language code as stored; may be outside the supported set
    pub language: String,
    pub avatar: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            language: crate::i18n::Language::default_language().code().to_string(),
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Waiting,
    Paired,
    Terminated,
}

#[derive(Debug)]
pub struct Session {
    pub id: ConnectionId,
    pub identity: Option<Identity>,
    pub profile: Profile,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    /// Moderation strikes kept on the session for anonymous senders
    pub strikes: u32,
    outbox: Outbox,
}

impl Session {
    pub fn label(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.email.as_str())
            .unwrap_or(ANONYMOUS_LABEL)
    }

    /// Queue a frame for this connection. Returns `false` when the socket
    /// task has already gone away.
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.outbox.send(frame).is_ok()
    }

    pub fn queue_entry(&self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            label: self.label().to_string(),
            avatar: self.profile.avatar.clone(),
            language: self.profile.language.clone(),
        }
    }
}
