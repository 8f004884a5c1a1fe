//! Error types for the Certa client.

use thiserror::Error;

use certa_core::{Address, CoreError, PolicyError};
use certa_ledger::LedgerError;
use certa_perms::PermsError;
use certa_store::StoreError;

/// Errors that can occur in client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Key, scheme or recording error.
    #[error("permissions error: {0}")]
    Perms(#[from] PermsError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Ledger or blob store error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Identity or attribute ingestion error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Policy did not parse.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// The authority inbox has no such pending request.
    #[error("no pending request {request_index} from {requester}")]
    RequestNotFound {
        requester: Address,
        request_index: u64,
    },

    /// Issuance was attempted by an address that never ran authority setup.
    #[error("{0} has no authority keys")]
    AuthorityNotSetUp(Address),

    /// No local record for the named file.
    #[error("unknown recording: {0}")]
    RecordingNotFound(String),

    /// The plaintext no longer matches the digest its ciphertext was made from.
    #[error("plaintext of {0} changed since it was encrypted")]
    PlaintextChanged(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
