//! Error types for the permissions module.

use certa_core::PolicyError;
use thiserror::Error;

use crate::recording::RecordingState;

/// Errors that can occur during key and content operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The key set does not satisfy the ciphertext's policy.
    #[error("personal keys do not satisfy the access policy")]
    PolicyNotSatisfied,

    /// A policy references an authority or attribute with no cached public key.
    #[error("missing authority public key: {0}")]
    MissingAuthorityPublicKey(String),

    /// Two listed authorities publish the attribute a policy names.
    #[error("attribute {attribute} is published by both {first} and {second}")]
    AmbiguousAttribute {
        attribute: String,
        first: String,
        second: String,
    },

    /// A personal key bound to another identity was mixed into a key ring.
    #[error("key bound to {found} cannot join a ring bound to {expected}")]
    KeyBindingMismatch { expected: String, found: String },

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Malformed ciphertext or ciphertext file.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// A recording operation was attempted from the wrong state.
    #[error("cannot {action} a recording in state {state:?}")]
    InvalidState {
        state: RecordingState,
        action: &'static str,
    },

    /// I/O error while streaming content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Policy error.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
