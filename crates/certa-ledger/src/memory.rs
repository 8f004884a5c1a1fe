//! In-memory ledger and blob store.
//!
//! [`MemoryLedger`] keeps real arrays and removes resolved requests with
//! `swap_remove`, reporting the swap exactly like the deployed contract.
//! Both fakes are cheap to clone: clones share state, so an authority and a
//! requester in one test can talk through the same ledger.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use certa_core::{now_millis, Address, Attribute, RequestStatus};
use certa_perms::{AuthorityPublicKeys, GlobalParameters, PersonalKey, Recording, StorageLocation};

use crate::client::{BlobStore, LedgerClient};
use crate::error::{LedgerError, Result};
use crate::types::{
    ChangeDescriptor, HistoryEntry, PendingRequest, PendingRequester, RequestReceipt,
};

#[derive(Default)]
struct LedgerState {
    global_parameters: Option<GlobalParameters>,
    inboxes: HashMap<Address, Vec<PendingRequester>>,
    histories: HashMap<(Address, Address), Vec<HistoryEntry>>,
    public_keys: HashMap<Address, AuthorityPublicKeys>,
    recordings: HashMap<Address, Vec<Recording>>,
    status_updates: Vec<(Address, Address, RequestStatus)>,
}

/// In-memory ledger implementation.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status write so far as `(authority, requester, status)`.
    pub async fn status_updates(&self) -> Vec<(Address, Address, RequestStatus)> {
        self.state.read().await.status_updates.clone()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn publish_attribute_request(
        &self,
        authority: &Address,
        requester: &Address,
        attributes: &[Attribute],
    ) -> Result<RequestReceipt> {
        if attributes.is_empty() {
            return Err(LedgerError::Transport("empty attribute request".into()));
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let timestamp = now_millis();

        let history = state.histories.entry((*requester, *authority)).or_default();
        let history_index = history.len() as u64;
        history.push(HistoryEntry {
            authority: *authority,
            history_index,
            attributes: attributes.to_vec(),
            status: RequestStatus::Pending,
            timestamp,
        });

        let inbox = state.inboxes.entry(*authority).or_default();
        let requester_index = match inbox.iter().position(|slot| &slot.requester == requester) {
            Some(i) => i,
            None => {
                inbox.push(PendingRequester {
                    requester: *requester,
                    requests: Vec::new(),
                });
                inbox.len() - 1
            }
        };
        let requests = &mut inbox[requester_index].requests;
        let request_index = requests.len() as u64;
        requests.push(PendingRequest {
            requester: *requester,
            requester_index: requester_index as u64,
            request_index,
            history_index,
            attributes: attributes.to_vec(),
            status: RequestStatus::Pending,
            timestamp,
        });

        Ok(RequestReceipt {
            requester_index: requester_index as u64,
            request_index,
            history_index,
            timestamp,
        })
    }

    async fn sync_attribute_request_cache(
        &self,
        requester: &Address,
        authority: &Address,
    ) -> Result<Vec<HistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .histories
            .get(&(*requester, *authority))
            .cloned()
            .unwrap_or_default())
    }

    async fn sync_pending_attribute_requests(
        &self,
        authority: &Address,
    ) -> Result<Vec<PendingRequester>> {
        let state = self.state.read().await;
        Ok(state.inboxes.get(authority).cloned().unwrap_or_default())
    }

    async fn publish_attribute_request_update(
        &self,
        authority: &Address,
        requester: &Address,
        requester_index: u64,
        request_index: u64,
        status: RequestStatus,
    ) -> Result<ChangeDescriptor> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let ri = requester_index as usize;
        let qi = request_index as usize;

        let inbox = state
            .inboxes
            .get_mut(authority)
            .ok_or_else(|| LedgerError::StaleIndex(format!("authority {} has no inbox", authority)))?;
        let request = inbox
            .get(ri)
            .filter(|slot| &slot.requester == requester)
            .and_then(|slot| slot.requests.get(qi))
            .ok_or_else(|| {
                LedgerError::StaleIndex(format!(
                    "no pending request of {} at ({}, {})",
                    requester, requester_index, request_index
                ))
            })?;
        request.status.transition(status)?;
        let history_index = request.history_index as usize;

        let last_request = inbox[ri].requests.len() - 1;
        inbox[ri].requests.swap_remove(qi);

        let change = if inbox[ri].requests.is_empty() {
            let last_requester = inbox.len() - 1;
            inbox.swap_remove(ri);
            if ri != last_requester {
                let moved = &mut inbox[ri];
                for r in &mut moved.requests {
                    r.requester_index = requester_index;
                }
                ChangeDescriptor::RequesterSwap {
                    requester: moved.requester,
                    from: last_requester as u64,
                    to: requester_index,
                }
            } else {
                ChangeDescriptor::NoSwap
            }
        } else if qi != last_request {
            inbox[ri].requests[qi].request_index = request_index;
            ChangeDescriptor::RequestSwap {
                requester: *requester,
                from: last_request as u64,
                to: request_index,
            }
        } else {
            ChangeDescriptor::NoSwap
        };

        if let Some(entry) = state
            .histories
            .get_mut(&(*requester, *authority))
            .and_then(|h| h.get_mut(history_index))
        {
            entry.status = status;
        }
        state.status_updates.push((*authority, *requester, status));

        Ok(change)
    }

    async fn publish_global_parameters(&self, gp: &GlobalParameters) -> Result<GlobalParameters> {
        let mut state = self.state.write().await;
        Ok(state.global_parameters.get_or_insert_with(|| gp.clone()).clone())
    }

    async fn get_global_parameters(&self) -> Result<Option<GlobalParameters>> {
        Ok(self.state.read().await.global_parameters.clone())
    }

    async fn publish_authority_keys(&self, keys: &AuthorityPublicKeys) -> Result<()> {
        let mut state = self.state.write().await;
        state.public_keys.insert(keys.authority, keys.clone());
        Ok(())
    }

    async fn get_public_keys(
        &self,
        authority: &Address,
        attributes: &[Attribute],
    ) -> Result<AuthorityPublicKeys> {
        let state = self.state.read().await;
        let published = state
            .public_keys
            .get(authority)
            .ok_or_else(|| LedgerError::NotFound(format!("public keys of {}", authority)))?;

        if attributes.is_empty() {
            return Ok(published.clone());
        }
        let wanted: HashSet<&Attribute> = attributes.iter().collect();
        Ok(AuthorityPublicKeys {
            authority: *authority,
            keys: published
                .keys
                .iter()
                .filter(|(a, _)| wanted.contains(a))
                .map(|(a, pk)| (a.clone(), *pk))
                .collect(),
        })
    }

    async fn publish_recording(&self, recording: &Recording) -> Result<u64> {
        let mut published = recording.clone();
        published.forget_content_key();

        let mut state = self.state.write().await;
        let list = state.recordings.entry(recording.owner).or_default();
        let index = match list.iter().position(|r| r.file_name == recording.file_name) {
            Some(i) => {
                list[i] = published;
                i
            }
            None => {
                list.push(published);
                list.len() - 1
            }
        };
        Ok(index as u64)
    }

    async fn get_recording(&self, owner: &Address, file_name: &str) -> Result<Option<Recording>> {
        let state = self.state.read().await;
        Ok(state
            .recordings
            .get(owner)
            .and_then(|list| list.iter().find(|r| r.file_name == file_name))
            .cloned())
    }
}

#[derive(Default)]
struct BlobState {
    files: HashMap<(String, String), Vec<u8>>,
    reserved: HashSet<String>,
    keys: HashMap<Address, BTreeMap<Address, Vec<PersonalKey>>>,
    reservations: u64,
}

/// In-memory blob store implementation.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    state: Arc<RwLock<BlobState>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times space was reserved.
    pub async fn reservations(&self) -> u64 {
        self.state.read().await.reservations
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn reserve_space(
        &self,
        owner: &Address,
        label: &str,
        file_name: &str,
    ) -> Result<StorageLocation> {
        let mut state = self.state.write().await;
        state.reservations += 1;
        let access_key = format!("{}-{}-{}", label, owner.short(), state.reservations);
        state.reserved.insert(access_key.clone());

        Ok(StorageLocation {
            domain: "memory".into(),
            path: format!("/{}/{}/{}", owner, state.reservations, file_name),
            port: 0,
            access_key,
        })
    }

    async fn send_file(
        &self,
        location: &StorageLocation,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.reserved.contains(&location.access_key) {
            return Err(LedgerError::Transport(format!(
                "access key {} was never issued",
                location.access_key
            )));
        }
        state
            .files
            .insert((location.path.clone(), file_name.to_string()), bytes);
        Ok(())
    }

    async fn get_file(&self, location: &StorageLocation, file_name: &str) -> Result<Vec<u8>> {
        let state = self.state.read().await;
        state
            .files
            .get(&(location.path.clone(), file_name.to_string()))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("{}/{}", location.path, file_name)))
    }

    async fn send_keys(
        &self,
        authority: &Address,
        recipient: &Address,
        keys: Vec<PersonalKey>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .keys
            .entry(*recipient)
            .or_default()
            .insert(*authority, keys);
        Ok(())
    }

    async fn get_personal_keys(&self, recipient: &Address) -> Result<Vec<PersonalKey>> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(recipient)
            .map(|bundles| bundles.values().flatten().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn attrs(names: &[&str]) -> Vec<Attribute> {
        names.iter().map(|n| Attribute::new(*n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_publish_assigns_indices() {
        let ledger = MemoryLedger::new();
        let authority = addr(0xaa);

        let a = ledger
            .publish_attribute_request(&authority, &addr(1), &attrs(&["x"]))
            .await
            .unwrap();
        let b = ledger
            .publish_attribute_request(&authority, &addr(2), &attrs(&["y"]))
            .await
            .unwrap();
        let c = ledger
            .publish_attribute_request(&authority, &addr(1), &attrs(&["z"]))
            .await
            .unwrap();

        assert_eq!((a.requester_index, a.request_index, a.history_index), (0, 0, 0));
        assert_eq!((b.requester_index, b.request_index, b.history_index), (1, 0, 0));
        assert_eq!((c.requester_index, c.request_index, c.history_index), (0, 1, 1));
    }

    #[tokio::test]
    async fn test_update_reports_each_swap_kind() {
        let ledger = MemoryLedger::new();
        let authority = addr(0xaa);
        for (who, name) in [(1, "a"), (1, "b"), (1, "c"), (2, "d")] {
            ledger
                .publish_attribute_request(&authority, &addr(who), &attrs(&[name]))
                .await
                .unwrap();
        }

        let change = ledger
            .publish_attribute_request_update(&authority, &addr(1), 0, 0, RequestStatus::Granted)
            .await
            .unwrap();
        assert_eq!(
            change,
            ChangeDescriptor::RequestSwap {
                requester: addr(1),
                from: 2,
                to: 0
            }
        );

        let change = ledger
            .publish_attribute_request_update(&authority, &addr(1), 0, 1, RequestStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(change, ChangeDescriptor::NoSwap);

        let change = ledger
            .publish_attribute_request_update(&authority, &addr(1), 0, 0, RequestStatus::Granted)
            .await
            .unwrap();
        assert_eq!(
            change,
            ChangeDescriptor::RequesterSwap {
                requester: addr(2),
                from: 1,
                to: 0
            }
        );

        let history = ledger
            .sync_attribute_request_cache(&addr(1), &authority)
            .await
            .unwrap();
        let statuses: Vec<_> = history.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                RequestStatus::Granted,
                RequestStatus::Rejected,
                RequestStatus::Granted
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let ledger = MemoryLedger::new();
        let authority = addr(0xaa);
        ledger
            .publish_attribute_request(&authority, &addr(1), &attrs(&["a"]))
            .await
            .unwrap();
        ledger
            .publish_attribute_request_update(&authority, &addr(1), 0, 0, RequestStatus::Granted)
            .await
            .unwrap();

        let err = ledger
            .publish_attribute_request_update(&authority, &addr(1), 0, 0, RequestStatus::Granted)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StaleIndex(_)));
        assert_eq!(ledger.status_updates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_first_global_parameters_win() {
        let ledger = MemoryLedger::new();
        assert!(ledger.get_global_parameters().await.unwrap().is_none());

        let first = GlobalParameters {
            security_level: 128,
            domain: [1; 32],
        };
        let second = GlobalParameters {
            security_level: 128,
            domain: [2; 32],
        };
        assert_eq!(ledger.publish_global_parameters(&first).await.unwrap(), first);
        assert_eq!(ledger.publish_global_parameters(&second).await.unwrap(), first);
        assert_eq!(ledger.get_global_parameters().await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_blob_requires_reservation() {
        let blobs = MemoryBlobStore::new();
        let forged = StorageLocation {
            domain: "memory".into(),
            path: "/x".into(),
            port: 0,
            access_key: "forged".into(),
        };
        assert!(blobs.send_file(&forged, "f", vec![1]).await.is_err());

        let location = blobs.reserve_space(&addr(1), "owner", "f").await.unwrap();
        blobs.send_file(&location, "f", vec![1, 2]).await.unwrap();
        assert_eq!(blobs.get_file(&location, "f").await.unwrap(), vec![1, 2]);
        assert_eq!(blobs.reservations().await, 1);
    }
}
