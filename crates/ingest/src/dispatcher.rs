//! Bounded pool of concurrent insert workers.
//!
//! Each submitted batch runs as its own task holding one of `pool_size`
//! semaphore permits, so at most `pool_size` inserts are in flight.
//! [`Dispatcher::submit`] waits for a free permit, which is what holds the
//! producer back when the store is slower than the input.
//!
//! A failing worker records its error in a shared slot before releasing its
//! permit. The producer checks the slot on every submit and again at drain
//! time, so no failure is dropped and no new batch is dispatched after one
//! has been observed.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use bmo_core::{Batch, Sequence};
use bmo_store::StoreConnector;

use crate::error::DispatchError;

/// First failure wins; later ones are only logged.
type FailureSlot = Arc<Mutex<Option<DispatchError>>>;

fn record_failure(slot: &Mutex<Option<DispatchError>>, failure: DispatchError) {
    error!(error = %failure, "insert worker failed");
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_none() {
        *guard = Some(failure);
    }
}

#[derive(Debug)]
struct BatchReceipt {
    written: u64,
}

/// Totals for the batches that completed successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub batches: u64,
    pub documents: u64,
}

pub struct Dispatcher {
    connector: Arc<StoreConnector>,
    permits: Arc<Semaphore>,
    pool_size: usize,
    workers: JoinSet<Result<BatchReceipt, DispatchError>>,
    failure: FailureSlot,
    submitted: u64,
    summary: DispatchSummary,
}

impl Dispatcher {
    /// Create a pool of `pool_size` workers (minimum 1) writing through `connector`.
    pub fn new(connector: Arc<StoreConnector>, pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            connector,
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            workers: JoinSet::new(),
            failure: Arc::new(Mutex::new(None)),
            submitted: 0,
            summary: DispatchSummary::default(),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Inserts currently holding a worker slot.
    pub fn in_flight(&self) -> usize {
        self.pool_size - self.permits.available_permits()
    }

    /// Batches accepted by `submit` so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Hand `batch` to a free worker, waiting while all workers are busy.
    ///
    /// Fails without dispatching if any earlier insert has failed.
    pub async fn submit(&mut self, batch: Batch) -> Result<(), DispatchError> {
        self.check_failure()?;

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::PoolClosed)?;

        // A worker that failed while we waited released its permit after
        // recording the failure.
        self.check_failure()?;
        self.reap_finished();

        let connector = self.connector.clone();
        let failure = self.failure.clone();
        let first_sequence: Sequence = batch.first_sequence();
        let len = batch.len();
        debug!(first_sequence, len, in_flight = self.in_flight(), "batch dispatched");

        self.workers.spawn(async move {
            let _permit = permit;
            match connector.insert_batch(&batch).await {
                Ok(written) => {
                    debug!(first_sequence, len, written, "batch inserted");
                    Ok(BatchReceipt { written })
                }
                Err(source) => {
                    let err = DispatchError::Insert {
                        first_sequence,
                        len,
                        source,
                    };
                    record_failure(&failure, err.clone());
                    Err(err)
                }
            }
        });
        self.submitted += 1;
        Ok(())
    }

    /// Wait for every dispatched insert to finish, then report.
    ///
    /// Returns the first recorded failure, if any, only after all in-flight
    /// work has completed or failed.
    pub async fn close(mut self) -> Result<DispatchSummary, DispatchError> {
        while let Some(joined) = self.workers.join_next().await {
            self.absorb(joined);
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match failure {
            Some(err) => Err(err),
            None => Ok(self.summary),
        }
    }

    fn check_failure(&self) -> Result<(), DispatchError> {
        let guard = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Collect results of workers that already finished, keeping the set small.
    fn reap_finished(&mut self) {
        while let Some(joined) = self.workers.try_join_next() {
            self.absorb(joined);
        }
    }

    fn absorb(&mut self, joined: Result<Result<BatchReceipt, DispatchError>, JoinError>) {
        match joined {
            Ok(Ok(receipt)) => {
                self.summary.batches += 1;
                self.summary.documents += receipt.written;
            }
            // Already recorded by the worker.
            Ok(Err(_)) => {}
            Err(e) => record_failure(&self.failure, DispatchError::WorkerPanicked(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmo_core::Envelope;
    use bmo_store::MemoryTableStore;
    use serde_json::json;

    fn batch(range: std::ops::Range<u64>) -> Batch {
        let envelopes = range
            .map(|sequence| Envelope {
                sequence,
                ingested_at: 0,
                payload: json!({ "a": sequence }),
            })
            .collect();
        Batch::seal(envelopes).unwrap()
    }

    #[tokio::test]
    async fn drains_all_batches() {
        let store = Arc::new(MemoryTableStore::with_tables(["docs"]));
        let connector = Arc::new(StoreConnector::new(store.clone(), "docs"));
        let mut dispatcher = Dispatcher::new(connector, 3);

        for start in (0..50).step_by(5) {
            dispatcher.submit(batch(start..start + 5)).await.unwrap();
        }
        assert_eq!(dispatcher.submitted(), 10);

        let summary = dispatcher.close().await.unwrap();
        assert_eq!(summary, DispatchSummary { batches: 10, documents: 50 });

        let mut seqs: Vec<_> = store.rows("docs").iter().map(|e| e.sequence).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn close_without_submissions() {
        let store = Arc::new(MemoryTableStore::with_tables(["docs"]));
        let dispatcher = Dispatcher::new(Arc::new(StoreConnector::new(store.clone(), "docs")), 2);
        assert_eq!(dispatcher.close().await.unwrap(), DispatchSummary::default());
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn failure_surfaces_at_close() {
        // No table, so every insert is rejected.
        let store = Arc::new(MemoryTableStore::new());
        let mut dispatcher = Dispatcher::new(Arc::new(StoreConnector::new(store, "docs")), 1);

        dispatcher.submit(batch(0..2)).await.unwrap();
        let err = dispatcher.close().await.unwrap_err();
        assert!(matches!(err, DispatchError::Insert { first_sequence: 0, len: 2, .. }));
    }

    #[tokio::test]
    async fn no_submission_after_failure() {
        let store = Arc::new(MemoryTableStore::new());
        let mut dispatcher =
            Dispatcher::new(Arc::new(StoreConnector::new(store.clone(), "docs")), 1);

        dispatcher.submit(batch(0..1)).await.unwrap();
        // With one worker the next submit waits for the failed insert to
        // release its slot, then sees the recorded failure.
        let err = dispatcher.submit(batch(1..2)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Insert { first_sequence: 0, .. }));
        assert_eq!(dispatcher.submitted(), 1);
        assert_eq!(store.insert_calls(), 1);

        assert!(dispatcher.close().await.is_err());
    }

    #[test]
    fn zero_pool_is_clamped() {
        let store = Arc::new(MemoryTableStore::new());
        let dispatcher = Dispatcher::new(Arc::new(StoreConnector::new(store, "docs")), 0);
        assert_eq!(dispatcher.pool_size(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
