//! Encrypted recording lifecycle.
//!
//! ```text
//! Plain ──encrypt──► Encrypted ──stage──► Staged ──publish──► Distributed
//!                        ▲                                        │
//!                        └─────────────── encrypt ◄───────────────┘
//!                                                     (file changed)
//! ```
//!
//! Files live in the owner's working directory. The ciphertext sits next to
//! the plaintext under the configured suffix. Content keys are attached to a
//! [`Recording`] only for the duration of one operation and are never stored.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use certa_core::{now_millis, AccessStructure, Address, ContentDigest};
use certa_ledger::{BlobStore, LedgerClient};
use certa_perms::{
    decrypt_file, encrypt_file, write_atomically, AbeScheme, GlobalParameters, PermsError,
    PersonalKeyRing, Recording, RecordingState,
};
use certa_store::Store;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::keystore::KeyStore;

/// Which requested recordings a fetch could deliver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: Vec<String>,
    /// Names the ledger has no recording for.
    pub missing: Vec<String>,
}

/// Drives recordings through encryption and distribution.
pub struct RecordingLifecycle<S: Store, L: LedgerClient, B: BlobStore> {
    config: Arc<ClientConfig>,
    keystore: KeyStore<S>,
    ledger: Arc<L>,
    blobs: Arc<B>,
    scheme: Arc<dyn AbeScheme>,
    gp: GlobalParameters,
}

impl<S: Store, L: LedgerClient, B: BlobStore> RecordingLifecycle<S, L, B> {
    pub fn new(
        config: Arc<ClientConfig>,
        keystore: KeyStore<S>,
        ledger: Arc<L>,
        blobs: Arc<B>,
        scheme: Arc<dyn AbeScheme>,
        gp: GlobalParameters,
    ) -> Self {
        Self {
            config,
            keystore,
            ledger,
            blobs,
            scheme,
            gp,
        }
    }

    /// Path of `recording`'s plaintext.
    pub fn plaintext_path(&self, recording: &Recording) -> PathBuf {
        self.config
            .working_dir(&recording.owner)
            .join(&recording.file_name)
    }

    /// Path of `recording`'s ciphertext.
    pub fn ciphertext_path(&self, recording: &Recording) -> PathBuf {
        self.config
            .working_dir(&recording.owner)
            .join(recording.ciphertext_file_name(&self.config.ciphertext_suffix))
    }

    /// The stored recording for `file_name`, or a fresh one.
    pub async fn open(&self, owner: &Address, file_name: &str) -> Result<Recording> {
        Ok(self
            .keystore
            .load_recording(owner, file_name)
            .await?
            .unwrap_or_else(|| Recording::new(*owner, file_name)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encryption
    // ─────────────────────────────────────────────────────────────────────────

    /// Recompute the plaintext digest and compare it with the one taken at
    /// the last encrypt or decrypt.
    pub async fn has_file_changed(&self, recording: &mut Recording) -> Result<bool> {
        let digest = ContentDigest::digest_file(self.plaintext_path(recording))?;
        let changed = recording.observe_digest(digest);
        self.keystore.save_recording(recording).await?;
        debug!(file = %recording.file_name, changed, digest = %digest, "checked plaintext");
        Ok(changed)
    }

    /// Encrypt the plaintext under a fresh content key wrapped for `policy`.
    ///
    /// `authorities` lists whose cached public keys may serve the policy's
    /// attributes, in order of preference. Fails before touching any file if
    /// a key is missing.
    pub async fn encrypt(
        &self,
        recording: &mut Recording,
        policy: &AccessStructure,
        authorities: &[Address],
    ) -> Result<()> {
        let plaintext = self.plaintext_path(recording);
        let digest = ContentDigest::digest_file(&plaintext)?;

        let directory = self.keystore.public_key_directory(authorities).await?;
        let public_keys = directory.assemble(authorities, policy)?;

        let key = self.scheme.generate_content_key(&self.gp);
        let wrapped = self.scheme.encrypt(&key, policy, &self.gp, &public_keys)?;
        encrypt_file(&key, &plaintext, &self.ciphertext_path(recording))?;

        recording.apply_encryption(policy.to_string(), wrapped, key, digest);
        recording.forget_content_key();
        self.keystore.save_recording(recording).await?;
        info!(
            file = %recording.file_name,
            policy = %policy,
            replaced = recording.ciphertext_changed,
            "encrypted recording"
        );
        Ok(())
    }

    /// Recover the content key with `keys` and restore the plaintext.
    ///
    /// Fails with `PolicyNotSatisfied` when `keys` cannot satisfy the policy.
    /// On any failure the plaintext file is left as it was.
    pub async fn decrypt(&self, recording: &mut Recording, keys: &PersonalKeyRing) -> Result<()> {
        let wrapped = recording
            .wrapped_key
            .as_ref()
            .ok_or(PermsError::InvalidState {
                state: recording.state,
                action: "decrypt",
            })?;
        let key = self.scheme.decrypt(wrapped, keys, &self.gp)?;

        let plaintext = self.plaintext_path(recording);
        decrypt_file(&key, &self.ciphertext_path(recording), &plaintext)?;
        let digest = ContentDigest::digest_file(&plaintext)?;

        recording.apply_decryption(key, digest)?;
        recording.forget_content_key();
        self.keystore.save_recording(recording).await?;
        info!(file = %recording.file_name, owner = %recording.owner, "decrypted recording");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Distribution
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload the ciphertext, reserving blob space first when needed.
    ///
    /// Refuses with `PlaintextChanged` if the plaintext was edited after the
    /// ciphertext was produced.
    pub async fn stage(&self, recording: &mut Recording) -> Result<()> {
        if self.plaintext_path(recording).exists() && self.has_file_changed(recording).await? {
            return Err(ClientError::PlaintextChanged(recording.file_name.clone()));
        }

        let location = match (&recording.location, recording.needs_reservation()) {
            (Some(location), false) => location.clone(),
            _ => {
                let location = self
                    .blobs
                    .reserve_space(
                        &recording.owner,
                        &self.config.blob_owner_label,
                        &recording.ciphertext_file_name(&self.config.ciphertext_suffix),
                    )
                    .await?;
                debug!(file = %recording.file_name, path = %location.path, "reserved blob space");
                location
            }
        };

        let bytes = std::fs::read(self.ciphertext_path(recording))?;
        self.blobs
            .send_file(
                &location,
                &recording.ciphertext_file_name(&self.config.ciphertext_suffix),
                bytes,
            )
            .await?;

        recording.mark_staged(location)?;
        self.keystore.save_recording(recording).await?;
        info!(file = %recording.file_name, "staged ciphertext");
        Ok(())
    }

    /// Publish the staged recording on the ledger.
    pub async fn publish(&self, recording: &mut Recording) -> Result<u64> {
        if recording.state != RecordingState::Staged {
            return Err(PermsError::InvalidState {
                state: recording.state,
                action: "publish",
            }
            .into());
        }

        let timestamp = now_millis();
        recording.timestamp = timestamp;
        let index = self.ledger.publish_recording(recording).await?;
        recording.mark_distributed(index, timestamp)?;
        self.keystore.save_recording(recording).await?;
        info!(file = %recording.file_name, ledger_index = index, "published recording");
        Ok(index)
    }

    /// Download `owner`'s recordings named in `file_names`.
    ///
    /// Each fetched ciphertext is written into `owner`'s working directory and
    /// its metadata stored locally. Names the ledger does not know are
    /// reported as missing.
    pub async fn fetch(&self, owner: &Address, file_names: &[String]) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let dir = self.config.working_dir(owner);
        std::fs::create_dir_all(&dir)?;

        for file_name in file_names {
            let Some(mut recording) = self.ledger.get_recording(owner, file_name).await? else {
                debug!(owner = %owner, file = %file_name, "no recording on ledger");
                report.missing.push(file_name.clone());
                continue;
            };
            let Some(location) = recording.location.clone() else {
                debug!(owner = %owner, file = %file_name, "recording has no storage location");
                report.missing.push(file_name.clone());
                continue;
            };

            let name = recording.ciphertext_file_name(&self.config.ciphertext_suffix);
            let bytes = self.blobs.get_file(&location, &name).await?;
            write_atomically(&dir.join(&name), |w| {
                w.write_all(&bytes)?;
                Ok(())
            })?;

            recording.state = RecordingState::Distributed;
            self.keystore.save_recording(&recording).await?;
            report.fetched.push(file_name.clone());
        }

        info!(
            owner = %owner,
            fetched = report.fetched.len(),
            missing = report.missing.len(),
            "fetched recordings"
        );
        Ok(report)
    }
}
