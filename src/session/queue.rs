use super::ConnectionId;
use std::collections::VecDeque;

/// Snapshot of the addressable fields of a waiting session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: ConnectionId,
    pub label: String,
    pub avatar: Option<String>,
    pub language: String,
}

/// FIFO of sessions awaiting a partner.
///
/// A connection appears at most once; `enqueue` refuses duplicates.
#[derive(Debug, Default)]
pub struct WaitingQueue {
    entries: VecDeque<QueueEntry>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns `false` (and leaves the queue untouched)
    /// if the connection is already waiting.
    pub fn enqueue(&mut self, entry: QueueEntry) -> bool {
        if self.contains(entry.id) {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    /// Take the oldest entry that is not `caller`. Every other entry keeps
    /// its relative position.
    pub fn dequeue_other_than(&mut self, caller: ConnectionId) -> Option<QueueEntry> {
        let position = self.entries.iter().position(|entry| entry.id != caller)?;
        self.entries.remove(position)
    }

    /// Idempotent.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waiting connections, head first.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }
}
