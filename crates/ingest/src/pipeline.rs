//! Wires decoder, sequencer, batcher and dispatcher into one run.
//!
//! The producer (decode → sequence → batch) runs on a single blocking
//! thread and only suspends on input reads and on submitting to a full
//! worker pool. Inserts run as tasks on the async runtime.

use std::io::Read;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use bmo_core::config::PipelineConfig;
use bmo_store::{StoreConnector, TableStatus};

use crate::batcher::Batcher;
use crate::decoder::StreamDecoder;
use crate::dispatcher::Dispatcher;
use crate::error::IngestError;
use crate::sequencer::Sequencer;

/// Outcome of a run that drained cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub table: TableStatus,
    /// Values decoded and wrapped in envelopes.
    pub envelopes: u64,
    /// Batches handed to the worker pool.
    pub batches: u64,
    /// Documents the store reported as written.
    pub documents: u64,
}

pub struct Pipeline {
    connector: Arc<StoreConnector>,
    pool_size: usize,
    batch_size: usize,
}

impl Pipeline {
    pub fn new(connector: Arc<StoreConnector>, config: &PipelineConfig) -> Self {
        Self {
            connector,
            pool_size: config.pool_size.max(1),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Ensure the target table exists, then ingest `input` until it is
    /// exhausted or the first fatal error.
    ///
    /// On a parse error the envelopes decoded before it are still flushed
    /// and drained before the error is returned.
    pub async fn run<R>(&self, input: R) -> Result<IngestReport, IngestError>
    where
        R: Read + Send + 'static,
    {
        let table = self
            .connector
            .ensure_table()
            .await
            .map_err(|source| IngestError::TableSetup {
                table: self.connector.table().to_string(),
                source,
            })?;

        debug!(
            table = %self.connector.table(),
            insert_mode = %self.connector.insert_mode(),
            pool_size = self.pool_size,
            batch_size = self.batch_size,
            "starting ingestion"
        );
        let dispatcher = Dispatcher::new(self.connector.clone(), self.pool_size);
        let batch_size = self.batch_size;
        let handle = Handle::current();

        let report = tokio::task::spawn_blocking(move || {
            produce(input, batch_size, dispatcher, &handle, table)
        })
        .await
        .map_err(|e| IngestError::Producer(e.to_string()))??;

        info!(
            table = %self.connector.table(),
            envelopes = report.envelopes,
            batches = report.batches,
            documents = report.documents,
            "ingestion complete"
        );
        Ok(report)
    }
}

/// The producer loop. Must run on a blocking thread: it blocks on `input`
/// and on `handle`.
fn produce<R: Read>(
    input: R,
    batch_size: usize,
    mut dispatcher: Dispatcher,
    handle: &Handle,
    table: TableStatus,
) -> Result<IngestReport, IngestError> {
    let mut decoder = StreamDecoder::new(input);
    let mut sequencer = Sequencer::new();
    let mut batcher = Batcher::new(batch_size);

    let decode_failure = loop {
        match decoder.next() {
            Ok(Some(value)) => {
                let envelope = sequencer.assign(value);
                let Some(batch) = batcher.append(envelope) else {
                    continue;
                };
                if let Err(source) = handle.block_on(dispatcher.submit(batch)) {
                    // Already dispatched inserts finish before we report.
                    let _ = handle.block_on(dispatcher.close());
                    return Err(IngestError::Dispatch {
                        processed: sequencer.assigned(),
                        source,
                    });
                }
            }
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };

    let processed = sequencer.assigned();
    if decode_failure.is_some() && batcher.pending() > 0 {
        warn!(
            pending = batcher.pending(),
            "flushing decoded objects before reporting parse failure"
        );
    }

    let tail = match batcher.flush_partial() {
        Some(batch) => handle.block_on(dispatcher.submit(batch)),
        None => Ok(()),
    };
    let submitted = dispatcher.submitted();
    let drained = tail.and(handle.block_on(dispatcher.close()));

    match (decode_failure, drained) {
        (Some(source), drained) => {
            if let Err(e) = drained {
                error!(error = %e, "store write also failed");
            }
            Err(IngestError::Decode { processed, source })
        }
        (None, Err(source)) => Err(IngestError::Dispatch { processed, source }),
        (None, Ok(summary)) => Ok(IngestReport {
            table,
            envelopes: processed,
            batches: submitted,
            documents: summary.documents,
        }),
    }
}
