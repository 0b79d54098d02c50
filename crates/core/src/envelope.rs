//! The units moved through the ingestion pipeline.
//!
//! An [`Envelope`] wraps one decoded JSON value with its sequence number and
//! arrival time. A [`Batch`] is a sealed, non-empty run of envelopes that is
//! handed to exactly one insert worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number assigned to each decoded value, starting at 0.
pub type Sequence = u64;

/// One ingested value plus the metadata the pipeline attaches to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Position of the value in the input stream (0-indexed).
    pub sequence: Sequence,
    /// Milliseconds since the Unix epoch, captured when the value was decoded.
    pub ingested_at: i64,
    /// The value exactly as decoded. Opaque to the pipeline.
    pub payload: Value,
}

/// An immutable, ordered, non-empty group of envelopes.
///
/// The only way to build one is [`Batch::seal`], which rejects empty input,
/// so every batch holds at least one envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    envelopes: Vec<Envelope>,
}

impl Batch {
    /// Seal a run of envelopes into a batch. Returns `None` when `envelopes` is empty.
    pub fn seal(envelopes: Vec<Envelope>) -> Option<Self> {
        if envelopes.is_empty() {
            None
        } else {
            Some(Self { envelopes })
        }
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    pub fn into_envelopes(self) -> Vec<Envelope> {
        self.envelopes
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Whether the batch holds no envelopes. A sealed batch never does.
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Sequence number of the first envelope in the batch.
    pub fn first_sequence(&self) -> Sequence {
        self.envelopes[0].sequence
    }

    /// Sequence number of the last envelope in the batch.
    pub fn last_sequence(&self) -> Sequence {
        self.envelopes[self.envelopes.len() - 1].sequence
    }
}
