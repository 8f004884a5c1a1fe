//! The per-file recording record and its state machine.
//!
//! ```text
//! Plain -> Encrypted -> Staged -> Distributed
//!              ^          |          |
//!              +----------+----------+   (re-encrypt)
//! Distributed | Encrypted -> Decrypted
//! ```
//!
//! The record only tracks state. File I/O and ledger calls happen in the
//! client's lifecycle, which calls the transition methods below once the
//! side effect has succeeded.

use serde::{Deserialize, Serialize};
use std::path::Path;

use certa_core::{now_millis, Address, ContentDigest, Record};

use crate::error::{PermsError, Result};
use crate::keys::ContentKey;
use crate::scheme::Ciphertext;

/// Where a recording's state currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    /// Plaintext only.
    Plain,
    /// Ciphertext written locally, not yet uploaded.
    Encrypted,
    /// Ciphertext uploaded, not yet on the ledger.
    Staged,
    /// Published on the ledger.
    Distributed,
    /// Plaintext restored from ciphertext.
    Decrypted,
}

/// Remote blob location reserved for a recording's ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub domain: String,
    pub path: String,
    pub port: u16,
    pub access_key: String,
}

/// One file under encryption, as tracked by its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub owner: Address,
    pub file_name: String,
    pub recording_name: String,
    /// Canonical policy text the content key is wrapped under.
    pub policy: Option<String>,
    /// Digest of the plaintext at the last encrypt or decrypt.
    pub plaintext_hash: Option<ContentDigest>,
    pub wrapped_key: Option<Ciphertext>,
    #[serde(skip)]
    content_key: Option<ContentKey>,
    pub location: Option<StorageLocation>,
    pub ledger_index: Option<u64>,
    pub state: RecordingState,
    pub file_changed: bool,
    pub ciphertext_changed: bool,
    pub timestamp: i64,
}

impl Record for Recording {
    const KIND: &'static str = "recording";
}

impl Recording {
    /// A fresh, never-encrypted recording for `file_name`.
    pub fn new(owner: Address, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let recording_name = Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file_name)
            .to_string();

        Self {
            owner,
            file_name,
            recording_name,
            policy: None,
            plaintext_hash: None,
            wrapped_key: None,
            content_key: None,
            location: None,
            ledger_index: None,
            state: RecordingState::Plain,
            file_changed: true,
            ciphertext_changed: false,
            timestamp: now_millis(),
        }
    }

    /// Name of the ciphertext file for this recording.
    pub fn ciphertext_file_name(&self, suffix: &str) -> String {
        format!("{}{}", self.file_name, suffix)
    }

    /// Compare `current` against the digest taken at the last encrypt or
    /// decrypt, update `file_changed` and return it.
    pub fn observe_digest(&mut self, current: ContentDigest) -> bool {
        self.file_changed = self.plaintext_hash != Some(current);
        self.file_changed
    }

    /// Record a successful encryption.
    ///
    /// Sets `ciphertext_changed` when a wrapped key already existed. The
    /// content key stays attached until [`Recording::forget_content_key`].
    pub fn apply_encryption(
        &mut self,
        policy: String,
        wrapped_key: Ciphertext,
        content_key: ContentKey,
        digest: ContentDigest,
    ) {
        if self.wrapped_key.is_some() {
            self.ciphertext_changed = true;
        }
        self.policy = Some(policy);
        self.wrapped_key = Some(wrapped_key);
        self.content_key = Some(content_key);
        self.plaintext_hash = Some(digest);
        self.file_changed = false;
        self.state = RecordingState::Encrypted;
    }

    /// Record a successful decryption to plaintext with digest `digest`.
    pub fn apply_decryption(&mut self, content_key: ContentKey, digest: ContentDigest) -> Result<()> {
        if self.wrapped_key.is_none() {
            return Err(PermsError::InvalidState {
                state: self.state,
                action: "decrypt",
            });
        }
        self.content_key = Some(content_key);
        if self.plaintext_hash.is_none() {
            self.plaintext_hash = Some(digest);
        }
        self.file_changed = self.plaintext_hash != Some(digest);
        self.state = RecordingState::Decrypted;
        Ok(())
    }

    /// The transient content key, while an operation holds it.
    pub fn content_key(&self) -> Option<&ContentKey> {
        self.content_key.as_ref()
    }

    /// Drop the transient content key.
    pub fn forget_content_key(&mut self) {
        self.content_key = None;
    }

    /// Whether staging must reserve new blob space first.
    pub fn needs_reservation(&self) -> bool {
        self.location.is_none() || self.ciphertext_changed
    }

    /// Record that the ciphertext was uploaded to `location`.
    pub fn mark_staged(&mut self, location: StorageLocation) -> Result<()> {
        match self.state {
            RecordingState::Encrypted | RecordingState::Staged | RecordingState::Distributed
                if self.wrapped_key.is_some() =>
            {
                self.location = Some(location);
                self.state = RecordingState::Staged;
                Ok(())
            }
            state => Err(PermsError::InvalidState {
                state,
                action: "stage",
            }),
        }
    }

    /// Record that the ledger accepted the recording at `ledger_index`.
    pub fn mark_distributed(&mut self, ledger_index: u64, timestamp: i64) -> Result<()> {
        if self.state != RecordingState::Staged {
            return Err(PermsError::InvalidState {
                state: self.state,
                action: "publish",
            });
        }
        self.ledger_index = Some(ledger_index);
        self.timestamp = timestamp;
        self.reset_change_flags();
        self.state = RecordingState::Distributed;
        Ok(())
    }

    /// Clear both change flags after a successful distribution.
    pub fn reset_change_flags(&mut self) {
        self.file_changed = false;
        self.ciphertext_changed = false;
    }
}
