//! The attribute request and grant protocol.
//!
//! A requester asks an authority for attributes by appending a pending
//! request to the authority's ledger inbox. The authority later resolves it:
//! it stages a personal key for every attribute, marks the request `Granted`,
//! and only then persists the keys as a dispatch bundle for the requester. If
//! any attribute has no secret key the whole request is marked `Rejected` and
//! nothing is issued.
//!
//! Resolving a request removes it from the ledger inbox by swap-remove. The
//! ledger reports the swap as a [`ChangeDescriptor`], and the cached inbox
//! replays it so that cached indices keep naming the same requests.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use certa_core::{Address, Attribute, RequestStatus, UserIdentity};
use certa_ledger::{
    ChangeDescriptor, HistoryEntry, LedgerClient, PendingInbox, PendingRequest, RequestHistory,
    RequestReceipt,
};
use certa_perms::{stage_issuance, AbeScheme, GlobalParameters, Issuance};
use certa_store::Store;

use crate::error::{ClientError, Result};
use crate::keystore::KeyStore;

/// How a request for a set of attributes was split up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedSet {
    /// Attributes sent to the ledger in a new request.
    pub submitted: Vec<Attribute>,
    /// Attributes skipped because a personal key is already held.
    pub already_owned: Vec<Attribute>,
    /// Attributes skipped because a pending request already covers them.
    pub already_asked: Vec<Attribute>,
    /// Ledger indices of the new request, if one was published.
    pub receipt: Option<RequestReceipt>,
}

impl RequestedSet {
    /// Whether a ledger request was published.
    pub fn was_submitted(&self) -> bool {
        self.receipt.is_some()
    }
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The authority holds no secret key for this attribute.
    MissingAuthorityKey(Attribute),
}

/// Result of resolving one pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Keys for `issued` were added to the requester's dispatch bundle.
    /// `skipped` were already in it.
    Granted {
        issued: Vec<Attribute>,
        skipped: Vec<Attribute>,
        change: ChangeDescriptor,
    },
    /// Nothing was issued.
    Rejected {
        reason: RejectReason,
        change: ChangeDescriptor,
    },
}

impl GrantOutcome {
    /// The status written to the ledger.
    pub fn status(&self) -> RequestStatus {
        match self {
            GrantOutcome::Granted { .. } => RequestStatus::Granted,
            GrantOutcome::Rejected { .. } => RequestStatus::Rejected,
        }
    }

    /// The swap the ledger performed when removing the request.
    pub fn change(&self) -> ChangeDescriptor {
        match self {
            GrantOutcome::Granted { change, .. } | GrantOutcome::Rejected { change, .. } => *change,
        }
    }
}

/// Requester and authority sides of the request protocol.
pub struct AttributeRequestProtocol<S: Store, L: LedgerClient> {
    keystore: KeyStore<S>,
    ledger: Arc<L>,
    scheme: Arc<dyn AbeScheme>,
    gp: GlobalParameters,
}

impl<S: Store, L: LedgerClient> AttributeRequestProtocol<S, L> {
    pub fn new(
        keystore: KeyStore<S>,
        ledger: Arc<L>,
        scheme: Arc<dyn AbeScheme>,
        gp: GlobalParameters,
    ) -> Self {
        Self {
            keystore,
            ledger,
            scheme,
            gp,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requester Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask `authority` for `attributes` on behalf of `requester`.
    ///
    /// Syncs the request history first. Attributes already held from
    /// `authority` or already covered by a pending request are dropped. If nothing is left, no
    /// ledger write happens.
    pub async fn request_attributes(
        &self,
        authority: &Address,
        requester: &UserIdentity,
        attributes: &[Attribute],
    ) -> Result<RequestedSet> {
        let address = requester.address();
        let owned = self.keystore.load_personal_keys(&address).await?;
        let mut history = self.sync_request_cache(authority, &address).await?;

        let mut result = RequestedSet::default();
        {
            let pending = history.pending_attributes(authority);
            let mut seen = BTreeSet::new();
            for attribute in attributes {
                if !seen.insert(attribute) {
                    continue;
                }
                if owned.contains(authority, attribute) {
                    result.already_owned.push(attribute.clone());
                } else if pending.contains(attribute) {
                    result.already_asked.push(attribute.clone());
                } else {
                    result.submitted.push(attribute.clone());
                }
            }
        }

        if !result.already_owned.is_empty() || !result.already_asked.is_empty() {
            info!(
                authority = %authority,
                requester = %address,
                owned = ?result.already_owned,
                asked = ?result.already_asked,
                "skipping attributes"
            );
        }
        if result.submitted.is_empty() {
            return Ok(result);
        }

        let receipt = self
            .ledger
            .publish_attribute_request(authority, &address, &result.submitted)
            .await?;
        info!(
            authority = %authority,
            requester = %address,
            history_index = receipt.history_index,
            attributes = ?result.submitted,
            "published attribute request"
        );

        history.record(HistoryEntry {
            authority: *authority,
            history_index: receipt.history_index,
            attributes: result.submitted.clone(),
            status: RequestStatus::Pending,
            timestamp: receipt.timestamp,
        });
        self.keystore.save_request_history(&history).await?;

        result.receipt = Some(receipt);
        Ok(result)
    }

    /// Refresh `requester`'s cached history with `authority` from the ledger.
    pub async fn sync_request_cache(
        &self,
        authority: &Address,
        requester: &Address,
    ) -> Result<RequestHistory> {
        let entries = self
            .ledger
            .sync_attribute_request_cache(requester, authority)
            .await?;
        let mut history = self.keystore.load_request_history(requester).await?;
        history.replace(*authority, entries);
        self.keystore.save_request_history(&history).await?;
        Ok(history)
    }

    /// Refresh `requester`'s history with every authority it has asked.
    pub async fn sync_request_history(&self, requester: &Address) -> Result<RequestHistory> {
        let mut history = self.keystore.load_request_history(requester).await?;
        let authorities: Vec<Address> = history.authorities().copied().collect();
        for authority in authorities {
            let entries = self
                .ledger
                .sync_attribute_request_cache(requester, &authority)
                .await?;
            history.replace(authority, entries);
        }
        self.keystore.save_request_history(&history).await?;
        Ok(history)
    }

    /// `requester`'s requests with `status`, across all authorities.
    pub async fn list_history(
        &self,
        requester: &Address,
        status: RequestStatus,
    ) -> Result<Vec<HistoryEntry>> {
        let history = self.sync_request_history(requester).await?;
        Ok(history.with_status(status).into_iter().cloned().collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authority Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the cached inbox of `authority` with the ledger's.
    pub async fn sync_pending_inbox(&self, authority: &Address) -> Result<PendingInbox> {
        let snapshot = self.ledger.sync_pending_attribute_requests(authority).await?;
        let inbox = PendingInbox::from_snapshot(*authority, snapshot);
        self.keystore.save_pending_inbox(&inbox).await?;
        debug!(authority = %authority, pending = inbox.len(), "synced pending inbox");
        Ok(inbox)
    }

    /// Pending requests addressed to `authority` with `status`.
    pub async fn list_pending_inbox(
        &self,
        authority: &Address,
        status: RequestStatus,
    ) -> Result<Vec<PendingRequest>> {
        let inbox = self.sync_pending_inbox(authority).await?;
        Ok(inbox.with_status(status).into_iter().cloned().collect())
    }

    /// Resolve `requester`'s pending request `request_index`.
    ///
    /// Issues every requested attribute or none. Keys already in the
    /// requester's dispatch bundle are not regenerated. Staged keys reach the
    /// bundle only after the ledger accepts the status, so a failed write
    /// leaves the bundle as it was. In both outcomes the request is removed
    /// from the ledger inbox and the swap is replayed on the cached inbox.
    pub async fn grant_or_reject(
        &self,
        authority: &Address,
        requester: &UserIdentity,
        request_index: u64,
    ) -> Result<GrantOutcome> {
        let address = requester.address();
        let mut inbox = self.sync_pending_inbox(authority).await?;
        let request = inbox
            .find(&address, request_index)
            .cloned()
            .ok_or(ClientError::RequestNotFound {
                requester: address,
                request_index,
            })?;

        let authority_keys = self
            .keystore
            .load_authority_keys(authority)
            .await?
            .ok_or(ClientError::AuthorityNotSetUp(*authority))?;
        let bundle = self.keystore.load_dispatch(authority, &address).await?;

        let issuance = stage_issuance(
            self.scheme.as_ref(),
            &self.gp,
            &authority_keys,
            requester,
            &request.attributes,
            &bundle,
        )?;

        let outcome = match issuance {
            Issuance::Complete { staged, skipped } => {
                let issued: Vec<Attribute> = staged.iter().map(|k| k.attribute().clone()).collect();
                let mut next = bundle;
                next.merge(staged)?;

                let change = self
                    .publish_status(authority, &request, RequestStatus::Granted)
                    .await?;
                self.keystore.save_dispatch(authority, &address, &next).await?;
                info!(
                    authority = %authority,
                    requester = %address,
                    request_index,
                    issued = ?issued,
                    skipped = ?skipped,
                    "granted attribute request"
                );
                GrantOutcome::Granted {
                    issued,
                    skipped,
                    change,
                }
            }
            Issuance::Rejected { missing } => {
                let change = self
                    .publish_status(authority, &request, RequestStatus::Rejected)
                    .await?;
                warn!(
                    authority = %authority,
                    requester = %address,
                    request_index,
                    missing = %missing,
                    "rejected attribute request"
                );
                GrantOutcome::Rejected {
                    reason: RejectReason::MissingAuthorityKey(missing),
                    change,
                }
            }
        };

        inbox.apply_removal(
            request.requester,
            request.requester_index,
            request.request_index,
            &outcome.change(),
        )?;
        self.keystore.save_pending_inbox(&inbox).await?;
        Ok(outcome)
    }

    async fn publish_status(
        &self,
        authority: &Address,
        request: &PendingRequest,
        status: RequestStatus,
    ) -> Result<ChangeDescriptor> {
        let change = self
            .ledger
            .publish_attribute_request_update(
                authority,
                &request.requester,
                request.requester_index,
                request.request_index,
                status,
            )
            .await?;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use certa_ledger::{LedgerError, MemoryLedger, PendingRequester};
    use certa_perms::{AuthorityPublicKeys, Recording, TreeSharingScheme};
    use certa_store::MemoryStore;

    fn attrs(names: &[&str]) -> Vec<Attribute> {
        names.iter().map(|n| Attribute::new(*n).unwrap()).collect()
    }

    enum Fault {
        Unavailable,
        Descriptor(ChangeDescriptor),
    }

    /// A memory ledger whose next status update can be made to misbehave.
    #[derive(Default)]
    struct FaultyLedger {
        inner: MemoryLedger,
        next_update: Mutex<Option<Fault>>,
    }

    impl FaultyLedger {
        fn arm(&self, fault: Fault) {
            *self.next_update.lock().unwrap() = Some(fault);
        }
    }

    #[async_trait]
    impl LedgerClient for FaultyLedger {
        async fn publish_attribute_request(
            &self,
            authority: &Address,
            requester: &Address,
            attributes: &[Attribute],
        ) -> certa_ledger::Result<RequestReceipt> {
            self.inner
                .publish_attribute_request(authority, requester, attributes)
                .await
        }

        async fn sync_attribute_request_cache(
            &self,
            requester: &Address,
            authority: &Address,
        ) -> certa_ledger::Result<Vec<HistoryEntry>> {
            self.inner
                .sync_attribute_request_cache(requester, authority)
                .await
        }

        async fn sync_pending_attribute_requests(
            &self,
            authority: &Address,
        ) -> certa_ledger::Result<Vec<PendingRequester>> {
            self.inner.sync_pending_attribute_requests(authority).await
        }

        async fn publish_attribute_request_update(
            &self,
            authority: &Address,
            requester: &Address,
            requester_index: u64,
            request_index: u64,
            status: RequestStatus,
        ) -> certa_ledger::Result<ChangeDescriptor> {
            let fault = self.next_update.lock().unwrap().take();
            if let Some(Fault::Unavailable) = fault {
                return Err(LedgerError::Transport("ledger unavailable".into()));
            }
            let change = self
                .inner
                .publish_attribute_request_update(
                    authority,
                    requester,
                    requester_index,
                    request_index,
                    status,
                )
                .await?;
            match fault {
                Some(Fault::Descriptor(forged)) => Ok(forged),
                _ => Ok(change),
            }
        }

        async fn publish_global_parameters(
            &self,
            gp: &GlobalParameters,
        ) -> certa_ledger::Result<GlobalParameters> {
            self.inner.publish_global_parameters(gp).await
        }

        async fn get_global_parameters(&self) -> certa_ledger::Result<Option<GlobalParameters>> {
            self.inner.get_global_parameters().await
        }

        async fn publish_authority_keys(
            &self,
            keys: &AuthorityPublicKeys,
        ) -> certa_ledger::Result<()> {
            self.inner.publish_authority_keys(keys).await
        }

        async fn get_public_keys(
            &self,
            authority: &Address,
            attributes: &[Attribute],
        ) -> certa_ledger::Result<AuthorityPublicKeys> {
            self.inner.get_public_keys(authority, attributes).await
        }

        async fn publish_recording(&self, recording: &Recording) -> certa_ledger::Result<u64> {
            self.inner.publish_recording(recording).await
        }

        async fn get_recording(
            &self,
            owner: &Address,
            file_name: &str,
        ) -> certa_ledger::Result<Option<Recording>> {
            self.inner.get_recording(owner, file_name).await
        }
    }

    struct Setup<L: LedgerClient = MemoryLedger> {
        protocol: AttributeRequestProtocol<MemoryStore, L>,
        keystore: KeyStore<MemoryStore>,
        ledger: Arc<L>,
        authority: Address,
        alice: UserIdentity,
    }

    async fn setup(universe: &[&str]) -> Setup {
        setup_with(universe, Arc::new(MemoryLedger::new())).await
    }

    async fn setup_with<L: LedgerClient>(universe: &[&str], ledger: Arc<L>) -> Setup<L> {
        let scheme: Arc<dyn AbeScheme> = Arc::new(TreeSharingScheme::new());
        let gp = scheme.global_setup(128);
        let keystore = KeyStore::new(Arc::new(MemoryStore::new()));
        let authority = Address::from_bytes([0xaa; 20]);
        keystore
            .authority_setup(scheme.as_ref(), &gp, authority, &attrs(universe))
            .await
            .unwrap();

        Setup {
            protocol: AttributeRequestProtocol::new(
                keystore.clone(),
                Arc::clone(&ledger),
                scheme,
                gp,
            ),
            keystore,
            ledger,
            authority,
            alice: UserIdentity::new("alice", Address::from_bytes([1; 20])).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_attributes_collapse() {
        let s = setup(&["doctor"]).await;
        let set = s
            .protocol
            .request_attributes(&s.authority, &s.alice, &attrs(&["doctor", "doctor"]))
            .await
            .unwrap();
        assert_eq!(set.submitted, attrs(&["doctor"]));
        assert!(set.was_submitted());
    }

    #[tokio::test]
    async fn test_pending_attributes_not_asked_twice() {
        let s = setup(&["doctor"]).await;
        s.protocol
            .request_attributes(&s.authority, &s.alice, &attrs(&["doctor"]))
            .await
            .unwrap();

        let again = s
            .protocol
            .request_attributes(&s.authority, &s.alice, &attrs(&["doctor", "nurse"]))
            .await
            .unwrap();
        assert_eq!(again.already_asked, attrs(&["doctor"]));
        assert_eq!(again.submitted, attrs(&["nurse"]));

        let inbox = s.protocol.sync_pending_inbox(&s.authority).await.unwrap();
        assert_eq!(inbox.len(), 2);
    }

    #[tokio::test]
    async fn test_grant_persists_bundle_and_removes_request() {
        let s = setup(&["doctor", "nurse"]).await;
        s.protocol
            .request_attributes(&s.authority, &s.alice, &attrs(&["doctor", "nurse"]))
            .await
            .unwrap();

        let outcome = s
            .protocol
            .grant_or_reject(&s.authority, &s.alice, 0)
            .await
            .unwrap();
        assert_eq!(outcome.status(), RequestStatus::Granted);
        assert_eq!(outcome.change(), ChangeDescriptor::NoSwap);

        let bundle = s
            .keystore
            .load_dispatch(&s.authority, &s.alice.address())
            .await
            .unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.binding(), Some(s.alice.binding().as_str()));
        assert!(s.keystore.load_pending_inbox(&s.authority).await.unwrap().is_empty());

        let granted = s
            .protocol
            .list_history(&s.alice.address(), RequestStatus::Granted)
            .await
            .unwrap();
        assert_eq!(granted.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_issues_nothing() {
        let s = setup(&["age>18"]).await;
        s.protocol
            .request_attributes(&s.authority, &s.alice, &attrs(&["age>18", "citizen=US"]))
            .await
            .unwrap();

        let outcome = s
            .protocol
            .grant_or_reject(&s.authority, &s.alice, 0)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            GrantOutcome::Rejected {
                reason: RejectReason::MissingAuthorityKey(attrs(&["citizen=US"])[0].clone()),
                change: ChangeDescriptor::NoSwap,
            }
        );
        assert!(s
            .keystore
            .load_dispatch(&s.authority, &s.alice.address())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(s.ledger.status_updates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_request_not_found() {
        let s = setup(&["doctor"]).await;
        let err = s
            .protocol
            .grant_or_reject(&s.authority, &s.alice, 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::RequestNotFound {
                request_index: 3,
                ..
            }
        ));
        assert!(s.ledger.status_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_grant_by_non_authority_fails_before_ledger_write() {
        let s = setup(&["doctor"]).await;
        let stranger = Address::from_bytes([0xbb; 20]);
        s.protocol
            .request_attributes(&stranger, &s.alice, &attrs(&["doctor"]))
            .await
            .unwrap();

        let err = s
            .protocol
            .grant_or_reject(&stranger, &s.alice, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthorityNotSetUp(a) if a == stranger));
        assert!(s.ledger.status_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_write_issues_nothing() {
        let s = setup_with(&["doctor"], Arc::new(FaultyLedger::default())).await;
        s.protocol
            .request_attributes(&s.authority, &s.alice, &attrs(&["doctor"]))
            .await
            .unwrap();

        s.ledger.arm(Fault::Unavailable);
        let err = s
            .protocol
            .grant_or_reject(&s.authority, &s.alice, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Ledger(LedgerError::Transport(_))));
        assert!(s
            .keystore
            .load_dispatch(&s.authority, &s.alice.address())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(s.protocol.sync_pending_inbox(&s.authority).await.unwrap().len(), 1);

        // Once the ledger is back the same request resolves normally.
        let outcome = s
            .protocol
            .grant_or_reject(&s.authority, &s.alice, 0)
            .await
            .unwrap();
        assert_eq!(outcome.status(), RequestStatus::Granted);
        assert_eq!(
            s.keystore
                .load_dispatch(&s.authority, &s.alice.address())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_contradicting_descriptor_leaves_cached_inbox() {
        let s = setup_with(&["doctor", "nurse"], Arc::new(FaultyLedger::default())).await;
        for name in ["doctor", "nurse"] {
            s.protocol
                .request_attributes(&s.authority, &s.alice, &attrs(&[name]))
                .await
                .unwrap();
        }

        // Removing the last request needs no swap; claim one anyway.
        s.ledger.arm(Fault::Descriptor(ChangeDescriptor::RequestSwap {
            requester: s.alice.address(),
            from: 1,
            to: 0,
        }));
        let err = s
            .protocol
            .grant_or_reject(&s.authority, &s.alice, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Ledger(LedgerError::StaleIndex(_))));

        let cached = s.keystore.load_pending_inbox(&s.authority).await.unwrap();
        assert_eq!(cached.len(), 2);

        // The ledger committed the grant, so its keys are kept.
        let bundle = s
            .keystore
            .load_dispatch(&s.authority, &s.alice.address())
            .await
            .unwrap();
        assert!(bundle.contains(&s.authority, &attrs(&["nurse"])[0]));

        let resynced = s.protocol.sync_pending_inbox(&s.authority).await.unwrap();
        assert_eq!(resynced.len(), 1);
        assert!(resynced.find(&s.alice.address(), 0).is_some());
    }
}
