//! The Client: one participant's view of Certa.
//!
//! A participant is a [`UserIdentity`]. The same client acts as a requester
//! (asking for attributes, receiving personal keys, decrypting) and, once it
//! has run authority setup, as an authority (granting requests, dispatching
//! keys).

use std::sync::Arc;

use tracing::{debug, info, warn};

use certa_core::{AccessStructure, Address, Attribute, RequestStatus, UserIdentity};
use certa_ledger::{BlobStore, HistoryEntry, LedgerClient, PendingRequest, RequestHistory};
use certa_perms::{
    AbeScheme, AuthorityKeys, AuthorityPublicKeys, GlobalParameters, PersonalKeyRing, Recording,
    TreeSharingScheme,
};
use certa_store::Store;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::keystore::KeyStore;
use crate::lifecycle::{FetchReport, RecordingLifecycle};
use crate::requests::{AttributeRequestProtocol, GrantOutcome, RequestedSet};

/// The main Client struct.
pub struct Client<S: Store, L: LedgerClient, B: BlobStore> {
    identity: UserIdentity,
    config: Arc<ClientConfig>,
    keystore: KeyStore<S>,
    ledger: Arc<L>,
    blobs: Arc<B>,
    scheme: Arc<dyn AbeScheme>,
    gp: GlobalParameters,
    requests: AttributeRequestProtocol<S, L>,
    recordings: RecordingLifecycle<S, L, B>,
}

impl<S: Store, L: LedgerClient, B: BlobStore> Client<S, L, B> {
    /// Open a client with the reference scheme.
    pub async fn open(
        identity: UserIdentity,
        config: ClientConfig,
        store: S,
        ledger: Arc<L>,
        blobs: Arc<B>,
    ) -> Result<Self> {
        Self::open_with_scheme(
            identity,
            config,
            store,
            ledger,
            blobs,
            Arc::new(TreeSharingScheme::new()),
        )
        .await
    }

    /// Open a client with a specific scheme.
    ///
    /// Global parameters come from the local store, else from the ledger.
    /// If nobody has published any yet, they are created and published.
    pub async fn open_with_scheme(
        identity: UserIdentity,
        config: ClientConfig,
        store: S,
        ledger: Arc<L>,
        blobs: Arc<B>,
        scheme: Arc<dyn AbeScheme>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(config.working_dir(&identity.address()))?;

        let config = Arc::new(config);
        let keystore = KeyStore::new(Arc::new(store));
        let gp = match keystore.load_global_parameters().await? {
            Some(gp) => gp,
            None => {
                let gp = match ledger.get_global_parameters().await? {
                    Some(gp) => gp,
                    None => {
                        info!(security_level = config.security_level, "running global setup");
                        let fresh = scheme.global_setup(config.security_level);
                        ledger.publish_global_parameters(&fresh).await?
                    }
                };
                keystore.save_global_parameters(&gp).await?;
                gp
            }
        };

        let requests = AttributeRequestProtocol::new(
            keystore.clone(),
            Arc::clone(&ledger),
            Arc::clone(&scheme),
            gp.clone(),
        );
        let recordings = RecordingLifecycle::new(
            Arc::clone(&config),
            keystore.clone(),
            Arc::clone(&ledger),
            Arc::clone(&blobs),
            Arc::clone(&scheme),
            gp.clone(),
        );

        debug!(identity = %identity, "client opened");
        Ok(Self {
            identity,
            config,
            keystore,
            ledger,
            blobs,
            scheme,
            gp,
            requests,
            recordings,
        })
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn address(&self) -> Address {
        self.identity.address()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn global_parameters(&self) -> &GlobalParameters {
        &self.gp
    }

    pub fn keystore(&self) -> &KeyStore<S> {
        &self.keystore
    }

    /// The request protocol, for callers that act on other identities.
    pub fn requests(&self) -> &AttributeRequestProtocol<S, L> {
        &self.requests
    }

    /// The recording lifecycle, for step-by-step control.
    pub fn recordings(&self) -> &RecordingLifecycle<S, L, B> {
        &self.recordings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authority Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Become an authority over `universe`, or extend the existing universe.
    pub async fn setup_authority(&self, universe: &[Attribute]) -> Result<AuthorityKeys> {
        self.keystore
            .authority_setup(self.scheme.as_ref(), &self.gp, self.address(), universe)
            .await
    }

    /// Publish this authority's attribute public keys to the ledger.
    pub async fn publish_authority_keys(&self) -> Result<AuthorityPublicKeys> {
        let keys = self
            .keystore
            .load_authority_keys(&self.address())
            .await?
            .ok_or(ClientError::AuthorityNotSetUp(self.address()))?;
        let public = keys.public_keys();
        self.ledger.publish_authority_keys(&public).await?;
        self.keystore.save_public_keys(&public).await?;
        info!(authority = %self.address(), attributes = public.keys.len(), "published public keys");
        Ok(public)
    }

    /// Fetch `authority`'s public keys and cache them, replacing the previous
    /// entry. An empty `attributes` fetches all of them.
    pub async fn fetch_public_keys(
        &self,
        authority: &Address,
        attributes: &[Attribute],
    ) -> Result<AuthorityPublicKeys> {
        let keys = self.ledger.get_public_keys(authority, attributes).await?;
        self.keystore.save_public_keys(&keys).await?;
        debug!(authority = %authority, attributes = keys.keys.len(), "cached public keys");
        Ok(keys)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requester Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask `authority` for `attributes`.
    pub async fn request_attributes(
        &self,
        authority: &Address,
        attributes: &[Attribute],
    ) -> Result<RequestedSet> {
        self.requests
            .request_attributes(authority, &self.identity, attributes)
            .await
    }

    /// Refresh the cached history with `authority`.
    pub async fn sync_request_cache(&self, authority: &Address) -> Result<RequestHistory> {
        self.requests
            .sync_request_cache(authority, &self.address())
            .await
    }

    /// This client's requests with `status`, across all authorities.
    pub async fn request_history(&self, status: RequestStatus) -> Result<Vec<HistoryEntry>> {
        self.requests.list_history(&self.address(), status).await
    }

    /// Download key bundles addressed to this client and add the new keys to
    /// its ring. Returns how many keys were new.
    ///
    /// Keys bound to another identity are ignored.
    pub async fn receive_personal_keys(&self) -> Result<usize> {
        let delivered = self.blobs.get_personal_keys(&self.address()).await?;
        let binding = self.identity.binding();
        let mut ring = self.keystore.load_personal_keys(&self.address()).await?;

        let (mine, foreign): (Vec<_>, Vec<_>) =
            delivered.into_iter().partition(|k| k.binding() == binding);
        if !foreign.is_empty() {
            warn!(
                identity = %self.identity,
                ignored = foreign.len(),
                "ignoring keys bound to another identity"
            );
        }

        let added = ring.merge(mine)?;
        self.keystore.save_personal_keys(&self.address(), &ring).await?;
        info!(identity = %self.identity, added, held = ring.len(), "received personal keys");
        Ok(added)
    }

    /// This client's personal key ring.
    pub async fn personal_keys(&self) -> Result<PersonalKeyRing> {
        self.keystore.load_personal_keys(&self.address()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authority Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Pending requests addressed to this authority with `status`.
    pub async fn pending_requests(&self, status: RequestStatus) -> Result<Vec<PendingRequest>> {
        self.requests.list_pending_inbox(&self.address(), status).await
    }

    /// Resolve `requester`'s pending request `request_index`.
    pub async fn grant_or_reject(
        &self,
        requester: &UserIdentity,
        request_index: u64,
    ) -> Result<GrantOutcome> {
        self.requests
            .grant_or_reject(&self.address(), requester, request_index)
            .await
    }

    /// Send `requester` every key this authority has issued to it.
    /// Returns the bundle size.
    pub async fn send_attributes(&self, requester: &Address) -> Result<usize> {
        let bundle = self.keystore.load_dispatch(&self.address(), requester).await?;
        let keys: Vec<_> = bundle.iter().cloned().collect();
        let count = keys.len();
        self.blobs.send_keys(&self.address(), requester, keys).await?;
        info!(authority = %self.address(), requester = %requester, keys = count, "dispatched keys");
        Ok(count)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recordings
    // ─────────────────────────────────────────────────────────────────────────

    /// This client's recording for `file_name`, or a fresh one.
    pub async fn recording(&self, file_name: &str) -> Result<Recording> {
        self.recordings.open(&self.address(), file_name).await
    }

    /// Encrypt one of this client's files for `policy`.
    pub async fn encrypt(
        &self,
        file_name: &str,
        policy: &str,
        authorities: &[Address],
    ) -> Result<Recording> {
        let policy = AccessStructure::parse(policy)?;
        let mut recording = self.recording(file_name).await?;
        self.recordings
            .encrypt(&mut recording, &policy, authorities)
            .await?;
        Ok(recording)
    }

    /// Whether the plaintext of `file_name` differs from its last digest.
    pub async fn has_file_changed(&self, file_name: &str) -> Result<bool> {
        let mut recording = self.stored_recording(&self.address(), file_name).await?;
        self.recordings.has_file_changed(&mut recording).await
    }

    /// Encrypt if needed, upload and publish one of this client's files.
    ///
    /// The file is (re-)encrypted when it was never encrypted, when its
    /// plaintext changed, or when `policy` differs from the current one.
    pub async fn publish(
        &self,
        file_name: &str,
        policy: &str,
        authorities: &[Address],
    ) -> Result<Recording> {
        let policy = AccessStructure::parse(policy)?;
        let mut recording = self.recording(file_name).await?;

        let policy_text = policy.to_string();
        let reencrypt = recording.wrapped_key.is_none()
            || recording.policy.as_deref() != Some(policy_text.as_str())
            || self.recordings.has_file_changed(&mut recording).await?;
        if reencrypt {
            self.recordings
                .encrypt(&mut recording, &policy, authorities)
                .await?;
        }

        self.recordings.stage(&mut recording).await?;
        self.recordings.publish(&mut recording).await?;
        Ok(recording)
    }

    /// Download `owner`'s recordings named in `file_names`.
    pub async fn fetch(&self, owner: &Address, file_names: &[String]) -> Result<FetchReport> {
        self.recordings.fetch(owner, file_names).await
    }

    /// Decrypt `owner`'s `file_name` with this client's personal keys.
    pub async fn decrypt(&self, owner: &Address, file_name: &str) -> Result<Recording> {
        let mut recording = self.stored_recording(owner, file_name).await?;
        let keys = self.personal_keys().await?;
        self.recordings.decrypt(&mut recording, &keys).await?;
        Ok(recording)
    }

    async fn stored_recording(&self, owner: &Address, file_name: &str) -> Result<Recording> {
        self.keystore
            .load_recording(owner, file_name)
            .await?
            .ok_or_else(|| ClientError::RecordingNotFound(file_name.to_string()))
    }
}
