//! Ports to the shared ledger and the remote blob store.
//!
//! Implementations may talk to a smart contract, an HTTP gateway or anything
//! else. Every call may fail transiently; callers decide whether to retry.

use async_trait::async_trait;

use certa_core::{Address, Attribute, RequestStatus};
use certa_perms::{AuthorityPublicKeys, GlobalParameters, PersonalKey, Recording, StorageLocation};

use crate::error::Result;
use crate::types::{ChangeDescriptor, HistoryEntry, PendingRequester, RequestReceipt};

/// The shared ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Attribute Requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a pending request for `attributes` to `authority`'s inbox.
    async fn publish_attribute_request(
        &self,
        authority: &Address,
        requester: &Address,
        attributes: &[Attribute],
    ) -> Result<RequestReceipt>;

    /// `requester`'s full history with `authority`, in ledger order.
    async fn sync_attribute_request_cache(
        &self,
        requester: &Address,
        authority: &Address,
    ) -> Result<Vec<HistoryEntry>>;

    /// `authority`'s pending inbox, in ledger order.
    async fn sync_pending_attribute_requests(
        &self,
        authority: &Address,
    ) -> Result<Vec<PendingRequester>>;

    /// Resolve a pending request and remove it from the inbox.
    ///
    /// Fails with `StaleIndex` when the indices do not name a pending request
    /// of `requester`.
    async fn publish_attribute_request_update(
        &self,
        authority: &Address,
        requester: &Address,
        requester_index: u64,
        request_index: u64,
        status: RequestStatus,
    ) -> Result<ChangeDescriptor>;

    // ─────────────────────────────────────────────────────────────────────────
    // Authority Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish the scheme-wide parameters. The first publication wins; later
    /// calls return the parameters already on the ledger.
    async fn publish_global_parameters(&self, gp: &GlobalParameters) -> Result<GlobalParameters>;

    /// The published scheme-wide parameters, if any.
    async fn get_global_parameters(&self) -> Result<Option<GlobalParameters>>;

    /// Publish (or replace) an authority's attribute public keys.
    async fn publish_authority_keys(&self, keys: &AuthorityPublicKeys) -> Result<()>;

    /// Public keys of `authority` for `attributes`; all of them when empty.
    async fn get_public_keys(
        &self,
        authority: &Address,
        attributes: &[Attribute],
    ) -> Result<AuthorityPublicKeys>;

    // ─────────────────────────────────────────────────────────────────────────
    // Recordings
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish recording metadata; returns its ledger index.
    async fn publish_recording(&self, recording: &Recording) -> Result<u64>;

    /// Latest published metadata for `owner`'s `file_name`.
    async fn get_recording(&self, owner: &Address, file_name: &str) -> Result<Option<Recording>>;
}

/// Remote storage for ciphertext files and personal key bundles.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reserve space for `owner`'s file and return where to upload it.
    async fn reserve_space(&self, owner: &Address, label: &str, file_name: &str)
        -> Result<StorageLocation>;

    /// Upload file bytes to a reserved location.
    async fn send_file(&self, location: &StorageLocation, file_name: &str, bytes: Vec<u8>)
        -> Result<()>;

    /// Download file bytes.
    async fn get_file(&self, location: &StorageLocation, file_name: &str) -> Result<Vec<u8>>;

    /// Deliver `authority`'s key bundle for `recipient`, replacing the previous one.
    async fn send_keys(
        &self,
        authority: &Address,
        recipient: &Address,
        keys: Vec<PersonalKey>,
    ) -> Result<()>;

    /// Every key bundle delivered to `recipient`.
    async fn get_personal_keys(&self, recipient: &Address) -> Result<Vec<PersonalKey>>;
}
