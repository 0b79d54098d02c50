//! Store connector: owns the shared session and the target table.
//!
//! Every insert worker holds an `Arc<StoreConnector>`; the connector itself
//! carries no mutable state, so it is shared without locking.

use std::sync::Arc;

use tracing::{debug, info};

use bmo_core::{Batch, InsertMode};

use crate::error::StoreError;
use crate::traits::{Durability, TableStore};

/// Outcome of [`StoreConnector::ensure_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Existing,
    Created,
}

pub struct StoreConnector {
    store: Arc<dyn TableStore>,
    table: String,
    durability: Durability,
    insert_mode: InsertMode,
}

impl StoreConnector {
    /// Connector writing to `table` with soft durability, one request per batch.
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            durability: Durability::Soft,
            insert_mode: InsertMode::Batch,
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_insert_mode(mut self, insert_mode: InsertMode) -> Self {
        self.insert_mode = insert_mode;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn insert_mode(&self) -> InsertMode {
        self.insert_mode
    }

    /// Create the target table unless the store already lists it.
    ///
    /// A concurrent creation by another process is left to the store to
    /// resolve; the result is not re-checked.
    pub async fn ensure_table(&self) -> Result<TableStatus, StoreError> {
        let existing = self.store.list_tables().await?;
        if existing.contains(&self.table) {
            debug!(table = %self.table, "table already present");
            return Ok(TableStatus::Existing);
        }

        info!(table = %self.table, provider = self.store.provider(), "Creating table");
        self.store.create_table(&self.table).await?;
        Ok(TableStatus::Created)
    }

    /// Write one sealed batch. Returns the number of documents written.
    ///
    /// In per-document mode the envelopes are written one request at a
    /// time, in order, stopping at the first rejection.
    pub async fn insert_batch(&self, batch: &Batch) -> Result<u64, StoreError> {
        match self.insert_mode {
            InsertMode::Batch => {
                self.store
                    .insert(&self.table, batch.envelopes(), self.durability)
                    .await
            }
            InsertMode::PerDocument => {
                let mut written = 0;
                for envelope in batch.envelopes() {
                    written += self
                        .store
                        .insert(&self.table, std::slice::from_ref(envelope), self.durability)
                        .await?;
                }
                Ok(written)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTableStore;
    use bmo_core::Envelope;
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
    async fn ensure_table_creates_missing() {
        let store = Arc::new(MemoryTableStore::new());
        let connector = StoreConnector::new(store.clone(), "docs");

        assert_eq!(connector.ensure_table().await.unwrap(), TableStatus::Created);
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn ensure_table_never_recreates() {
        let store = Arc::new(MemoryTableStore::with_tables(["docs"]));
        let connector = StoreConnector::new(store.clone(), "docs");

        assert_eq!(connector.ensure_table().await.unwrap(), TableStatus::Existing);
        assert_eq!(connector.ensure_table().await.unwrap(), TableStatus::Existing);
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn batch_mode_is_one_request() {
        let store = Arc::new(MemoryTableStore::with_tables(["docs"]));
        let connector = StoreConnector::new(store.clone(), "docs");

        let written = connector.insert_batch(&batch(0..5)).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(store.insert_calls(), 1);
    }

    #[tokio::test]
    async fn per_document_mode_is_one_request_each() {
        let store = Arc::new(MemoryTableStore::with_tables(["docs"]));
        let connector =
            StoreConnector::new(store.clone(), "docs").with_insert_mode(InsertMode::PerDocument);

        let written = connector.insert_batch(&batch(10..13)).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(store.insert_calls(), 3);
        let seqs: Vec<_> = store.rows("docs").iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
    }

    /// Remembers the durability of every insert.
    #[derive(Default)]
    struct DurabilityLog {
        seen: std::sync::Mutex<Vec<Durability>>,
    }

    #[async_trait::async_trait]
    impl TableStore for DurabilityLog {
        async fn list_tables(&self) -> Result<std::collections::BTreeSet<String>, StoreError> {
            Ok(["docs".to_string()].into())
        }

        async fn create_table(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert(
            &self,
            _: &str,
            envelopes: &[Envelope],
            durability: Durability,
        ) -> Result<u64, StoreError> {
            self.seen.lock().unwrap().push(durability);
            Ok(envelopes.len() as u64)
        }

        fn provider(&self) -> &str {
            "durability-log"
        }
    }

    #[tokio::test]
    async fn durability_reaches_the_store() {
        let store = Arc::new(DurabilityLog::default());
        let soft = StoreConnector::new(store.clone(), "docs");
        let hard = StoreConnector::new(store.clone(), "docs")
            .with_durability(Durability::Hard)
            .with_insert_mode(InsertMode::PerDocument);
        assert_eq!(hard.insert_mode(), InsertMode::PerDocument);

        soft.insert_batch(&batch(0..2)).await.unwrap();
        hard.insert_batch(&batch(2..4)).await.unwrap();

        let seen = store.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![Durability::Soft, Durability::Hard, Durability::Hard]
        );
    }

    #[tokio::test]
    async fn insert_surfaces_store_error() {
        let store = Arc::new(MemoryTableStore::new());
        let connector = StoreConnector::new(store, "missing");
        let err = connector.insert_batch(&batch(0..1)).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
