//! Assigns sequence numbers and ingestion timestamps.

use chrono::Utc;
use serde_json::Value;

use bmo_core::{Envelope, Sequence};

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wraps decoded values into envelopes numbered 0, 1, 2, ...
///
/// Owned by the producer alone; `assign` takes `&mut self`, so the counter
/// cannot be advanced from two places at once.
pub struct Sequencer {
    next: Sequence,
    clock: fn() -> i64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::with_clock(now_millis)
    }

    /// Use `clock` (epoch millis) instead of the system clock.
    pub fn with_clock(clock: fn() -> i64) -> Self {
        Self { next: 0, clock }
    }

    pub fn assign(&mut self, payload: Value) -> Envelope {
        let envelope = Envelope {
            sequence: self.next,
            ingested_at: (self.clock)(),
            payload,
        };
        self.next += 1;
        envelope
    }

    /// Number of envelopes produced so far (also the next sequence number).
    pub fn assigned(&self) -> u64 {
        self.next
    }
}
