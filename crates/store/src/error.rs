//! Store error types.

use thiserror::Error;

use bmo_core::BmoError;

/// Failures at the store boundary.
///
/// Carries rendered messages rather than driver errors so a failure can be
/// recorded once by an insert worker and reported again at drain time.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("table creation failed for '{table}': {reason}")]
    CreateTable { table: String, reason: String },

    #[error("insert into '{table}' rejected: {reason}")]
    Insert { table: String, reason: String },

    #[error(transparent)]
    Config(#[from] BmoError),
}
