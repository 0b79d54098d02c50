//! In-process table store.
//!
//! Keeps every table as a `Vec<Envelope>` in insertion order. Useful for
//! tests and for running the pipeline without a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use bmo_core::Envelope;

use crate::error::StoreError;
use crate::traits::{Durability, TableStore};

#[derive(Default)]
pub struct MemoryTableStore {
    tables: RwLock<HashMap<String, Vec<Envelope>>>,
    create_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given (empty) tables already present.
    pub fn with_tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables = names
            .into_iter()
            .map(|name| (name.into(), Vec::new()))
            .collect();
        Self {
            tables: RwLock::new(tables),
            ..Self::default()
        }
    }

    /// Snapshot of the rows in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Envelope> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of times `create_table` has been called.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of times `insert` has been called.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn list_tables(&self) -> Result<BTreeSet<String>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.keys().cloned().collect())
    }

    async fn create_table(&self, table: &str) -> Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn insert(
        &self,
        table: &str,
        envelopes: &[Envelope],
        _durability: Durability,
    ) -> Result<u64, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let rows = tables.get_mut(table).ok_or_else(|| StoreError::Insert {
            table: table.to_string(),
            reason: "table does not exist".into(),
        })?;
        rows.extend_from_slice(envelopes);
        Ok(envelopes.len() as u64)
    }

    fn provider(&self) -> &str {
        "memory"
    }
}
