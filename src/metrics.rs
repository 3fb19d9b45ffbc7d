//! Relay counters.
//!
//! One `RelayMetrics` is created per engine and shared by `Arc` with the
//! moderation gate and the translation adapter. Counters are relaxed atomics;
//! the report is a point-in-time read, not a consistent snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct RelayMetrics {
    connections_accepted: AtomicUsize,
    connections_refused: AtomicUsize,
    pairings: AtomicUsize,
    requeues: AtomicUsize,

    messages_relayed: AtomicUsize,
    messages_dropped_unpaired: AtomicUsize,
    messages_flagged: AtomicUsize,
    bans: AtomicUsize,

    moderation_calls: AtomicUsize,
    moderation_failures: AtomicUsize,
    translation_calls: AtomicUsize,
    translation_failures: AtomicUsize,
}

macro_rules! counter {
    ($record:ident, $read:ident) => {
        pub fn $record(&self) {
            self.$read.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $read(&self) -> usize {
            self.$read.load(Ordering::Relaxed)
        }
    };
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_connection_accepted, connections_accepted);
    counter!(record_connection_refused, connections_refused);
    counter!(record_pairing, pairings);
    counter!(record_requeue, requeues);
    counter!(record_message_relayed, messages_relayed);
    counter!(record_message_dropped_unpaired, messages_dropped_unpaired);
    counter!(record_message_flagged, messages_flagged);
    counter!(record_ban, bans);
    counter!(record_moderation_call, moderation_calls);
    counter!(record_moderation_failure, moderation_failures);
    counter!(record_translation_call, translation_calls);
    counter!(record_translation_failure, translation_failures);

    pub fn report(&self) -> MetricsReport {
        let calls = self.translation_calls();
        let failures = self.translation_failures();
        let translation_success_rate = if calls > 0 {
            (calls.saturating_sub(failures) as f64 / calls as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            connections_accepted: self.connections_accepted(),
            connections_refused: self.connections_refused(),
            pairings: self.pairings(),
            requeues: self.requeues(),
            messages_relayed: self.messages_relayed(),
            messages_dropped_unpaired: self.messages_dropped_unpaired(),
            messages_flagged: self.messages_flagged(),
            bans: self.bans(),
            moderation_calls: self.moderation_calls(),
            moderation_failures: self.moderation_failures(),
            translation_calls: calls,
            translation_failures: failures,
            translation_success_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub connections_accepted: usize,
    pub connections_refused: usize,
    pub pairings: usize,
    pub requeues: usize,
    pub messages_relayed: usize,
    pub messages_dropped_unpaired: usize,
    pub messages_flagged: usize,
    pub bans: usize,
    /// Classifier calls, including ones that failed open
    pub moderation_calls: usize,
    pub moderation_failures: usize,
    /// Translation service calls; passthroughs for unsupported codes are not counted
    pub translation_calls: usize,
    pub translation_failures: usize,
    /// Percentage of translation calls that returned text (0-100)
    pub translation_success_rate: f64,
}
