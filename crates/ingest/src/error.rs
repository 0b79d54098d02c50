//! Ingestion error types.

use thiserror::Error;

use bmo_core::Sequence;
use bmo_store::StoreError;

/// Failure to decode the next value from the input stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON in object #{index} at byte {offset}: {source}; input: `{context}`")]
    Malformed {
        index: Sequence,
        offset: u64,
        context: String,
        source: serde_json::Error,
    },

    #[error("input ended inside object #{index} at byte {offset}: {source}; input: `{context}`")]
    Truncated {
        index: Sequence,
        offset: u64,
        context: String,
        source: serde_json::Error,
    },

    #[error("failed reading input at object #{index}: {source}")]
    Io {
        index: Sequence,
        source: std::io::Error,
    },
}

impl DecodeError {
    /// Index of the value that failed, i.e. the sequence it would have received.
    pub fn index(&self) -> Sequence {
        match self {
            Self::Malformed { index, .. } | Self::Truncated { index, .. } | Self::Io { index, .. } => {
                *index
            }
        }
    }
}

/// Failure observed by the worker pool.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("insert of batch starting at sequence {first_sequence} ({len} documents) failed: {source}")]
    Insert {
        first_sequence: Sequence,
        len: usize,
        source: StoreError,
    },

    #[error("insert worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("worker pool closed")]
    PoolClosed,
}

/// Fatal pipeline failure.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to prepare table '{table}': {source}")]
    TableSetup { table: String, source: StoreError },

    #[error("can't parse json input after {processed} objects: {source}")]
    Decode { processed: u64, source: DecodeError },

    #[error("store write failed after {processed} objects: {source}")]
    Dispatch { processed: u64, source: DispatchError },

    #[error("producer task failed: {0}")]
    Producer(String),
}

impl IngestError {
    /// Short failure kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TableSetup { .. } => "table_setup",
            Self::Decode { .. } => "parse",
            Self::Dispatch { .. } => "store",
            Self::Producer(_) => "producer",
        }
    }
}
