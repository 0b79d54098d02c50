//! Table store trait and write options.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

use bmo_core::Envelope;

use crate::error::StoreError;

/// Write acknowledgment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Acknowledge once the write is accepted, before it is flushed to disk.
    #[default]
    Soft,
    /// Acknowledge only after the write is durable.
    Hard,
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft => f.write_str("soft"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

/// Trait for networked table-store backends.
///
/// An implementation is a session already bound to one database. It is
/// shared by every insert worker, so all methods take `&self`.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Names of the tables that exist in the session's database.
    async fn list_tables(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Create `table`. Creating a table that already exists is not an error.
    async fn create_table(&self, table: &str) -> Result<(), StoreError>;

    /// Write `envelopes` to `table` as one request. Returns the number of
    /// documents the store reports as written.
    async fn insert(
        &self,
        table: &str,
        envelopes: &[Envelope],
        durability: Durability,
    ) -> Result<u64, StoreError>;

    /// Backend name for logs (e.g., "postgres", "memory").
    fn provider(&self) -> &str;
}
