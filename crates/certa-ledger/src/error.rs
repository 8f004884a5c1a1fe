//! Error types for the ledger module.

use thiserror::Error;

use certa_core::CoreError;

/// Errors that can occur talking to the ledger or blob store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An index no longer points where the caller believes. Resync first.
    #[error("stale index: {0}")]
    StaleIndex(String),

    /// The ledger or blob store has no such entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote rejected or failed the call.
    #[error("transport error: {0}")]
    Transport(String),

    /// Core error (e.g., illegal status transition).
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
