//! Streaming ingestion pipeline.
//!
//! Decodes a stream of JSON values, wraps each in an [`Envelope`], groups
//! envelopes into batches, and inserts the batches through a bounded pool
//! of concurrent workers.
//!
//! Pipeline flow: decoder → sequencer → batcher → dispatcher → store
//!
//! [`Envelope`]: bmo_core::Envelope

pub mod batcher;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod sequencer;

pub use batcher::Batcher;
pub use decoder::StreamDecoder;
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use error::{DecodeError, DispatchError, IngestError};
pub use pipeline::{IngestReport, Pipeline};
pub use sequencer::Sequencer;
