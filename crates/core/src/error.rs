use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BmoError {
    #[error("unknown insert mode '{0}' (expected 'batch' or 'per-document')")]
    InsertMode(String),

    #[error("invalid node address '{0}'")]
    NodeAddress(String),
}
