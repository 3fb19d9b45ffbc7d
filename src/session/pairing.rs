use super::ConnectionId;
use std::collections::HashMap;

/// Symmetric partner map: `get(a) == Some(b)` iff `get(b) == Some(a)`.
#[derive(Debug, Default)]
pub struct PairingTable {
    partners: HashMap<ConnectionId, ConnectionId>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `a` and `b` in both directions.
    ///
    /// Refused (returns `false`) when `a == b` or either side already has a
    /// partner, so the table never holds a self edge or a dangling half edge.
    pub fn pair(&mut self, a: ConnectionId, b: ConnectionId) -> bool {
        if a == b || self.partners.contains_key(&a) || self.partners.contains_key(&b) {
            return false;
        }
        self.partners.insert(a, b);
        self.partners.insert(b, a);
        true
    }

    /// Remove both directions of `a`'s edge, returning the former partner.
    pub fn unpair(&mut self, a: ConnectionId) -> Option<ConnectionId> {
        let partner = self.partners.remove(&a)?;
        self.partners.remove(&partner);
        Some(partner)
    }

    pub fn get(&self, a: ConnectionId) -> Option<ConnectionId> {
        self.partners.get(&a).copied()
    }

    pub fn is_paired(&self, a: ConnectionId) -> bool {
        self.partners.contains_key(&a)
    }

    /// Number of pairs (edges), not paired connections.
    pub fn len(&self) -> usize {
        self.partners.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    pub fn is_symmetric(&self) -> bool {
        self.partners
            .iter()
            .all(|(a, b)| a != b && self.partners.get(b) == Some(a))
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.partners.keys().copied()
    }
}
