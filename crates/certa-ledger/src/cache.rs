//! Local mirrors of ledger request arrays.
//!
//! [`PendingInbox`] mirrors an authority's pending inbox and [`RequestHistory`]
//! mirrors a requester's history. The inbox is only ever shrunk by replaying
//! the [`ChangeDescriptor`] the ledger returned for a removal. The cache
//! never recomputes positions on its own, and a descriptor that contradicts
//! the cache is reported as [`LedgerError::StaleIndex`] so the caller resyncs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use certa_core::{Address, Attribute, Record, RequestStatus};

use crate::error::{LedgerError, Result};
use crate::types::{ChangeDescriptor, HistoryEntry, PendingRequest, PendingRequester};

/// An authority's mirror of its pending inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInbox {
    authority: Address,
    requesters: Vec<PendingRequester>,
}

impl Record for PendingInbox {
    const KIND: &'static str = "pending-inbox";
}

impl PendingInbox {
    /// An empty inbox.
    pub fn new(authority: Address) -> Self {
        Self {
            authority,
            requesters: Vec::new(),
        }
    }

    /// Replace the mirror with a fresh ledger snapshot.
    pub fn from_snapshot(authority: Address, requesters: Vec<PendingRequester>) -> Self {
        Self {
            authority,
            requesters,
        }
    }

    pub fn authority(&self) -> Address {
        self.authority
    }

    /// Requester slots in ledger order.
    pub fn requesters(&self) -> &[PendingRequester] {
        &self.requesters
    }

    /// Every request, requester by requester.
    pub fn requests(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requesters.iter().flat_map(|slot| slot.requests.iter())
    }

    /// Requests with the given status.
    pub fn with_status(&self, status: RequestStatus) -> Vec<&PendingRequest> {
        self.requests().filter(|r| r.status == status).collect()
    }

    /// Look up `requester`'s request at `request_index`.
    pub fn find(&self, requester: &Address, request_index: u64) -> Option<&PendingRequest> {
        self.requesters
            .iter()
            .find(|slot| &slot.requester == requester)
            .and_then(|slot| slot.requests.get(request_index as usize))
    }

    pub fn len(&self) -> usize {
        self.requests().count()
    }

    pub fn is_empty(&self) -> bool {
        self.requesters.is_empty()
    }

    /// Remove the processed request by replaying the ledger's swap.
    pub fn apply_removal(
        &mut self,
        requester: Address,
        requester_index: u64,
        request_index: u64,
        change: &ChangeDescriptor,
    ) -> Result<PendingRequest> {
        let ri = requester_index as usize;
        let qi = request_index as usize;

        let slot = self
            .requesters
            .get(ri)
            .filter(|slot| slot.requester == requester)
            .ok_or_else(|| {
                LedgerError::StaleIndex(format!(
                    "requester {} is not at slot {}",
                    requester, requester_index
                ))
            })?;
        if qi >= slot.requests.len() {
            return Err(LedgerError::StaleIndex(format!(
                "requester {} has no request at {}",
                requester, request_index
            )));
        }
        let last_request = slot.requests.len() - 1;
        let last_requester = self.requesters.len() - 1;

        let contradiction = |what: &str| {
            LedgerError::StaleIndex(format!(
                "{} contradicts cache for {} at ({}, {})",
                what, requester, requester_index, request_index
            ))
        };

        let removed = match *change {
            ChangeDescriptor::NoSwap => {
                if qi != last_request || (last_request == 0 && ri != last_requester) {
                    return Err(contradiction("no-swap"));
                }
                let removed = self.requesters[ri].requests.pop();
                if self.requesters[ri].requests.is_empty() {
                    self.requesters.pop();
                }
                removed
            }
            ChangeDescriptor::RequestSwap {
                requester: owner,
                from,
                to,
            } => {
                if owner != requester
                    || to != request_index
                    || from as usize != last_request
                    || qi == last_request
                {
                    return Err(contradiction("request swap"));
                }
                let requests = &mut self.requesters[ri].requests;
                let removed = requests.swap_remove(qi);
                requests[qi].request_index = to;
                Some(removed)
            }
            ChangeDescriptor::RequesterSwap {
                requester: moved,
                from,
                to,
            } => {
                if last_request != 0
                    || to != requester_index
                    || from as usize != last_requester
                    || ri == last_requester
                    || self.requesters[last_requester].requester != moved
                {
                    return Err(contradiction("requester swap"));
                }
                let mut slot = self.requesters.swap_remove(ri);
                for request in &mut self.requesters[ri].requests {
                    request.requester_index = to;
                }
                slot.requests.pop()
            }
        };

        tracing::debug!(
            authority = %self.authority,
            requester = %requester,
            requester_index,
            request_index,
            change = ?change,
            "applied inbox removal"
        );

        removed.ok_or_else(|| contradiction("removal"))
    }
}

/// A requester's mirror of its request history, per authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHistory {
    requester: Address,
    by_authority: BTreeMap<Address, Vec<HistoryEntry>>,
}

impl Record for RequestHistory {
    const KIND: &'static str = "request-history";
}

impl RequestHistory {
    pub fn new(requester: Address) -> Self {
        Self {
            requester,
            by_authority: BTreeMap::new(),
        }
    }

    pub fn requester(&self) -> Address {
        self.requester
    }

    /// Replace one authority's entries with a ledger snapshot.
    pub fn replace(&mut self, authority: Address, entries: Vec<HistoryEntry>) {
        self.by_authority.insert(authority, entries);
    }

    /// Cache a just-submitted request at its ledger history slot.
    pub fn record(&mut self, entry: HistoryEntry) {
        let entries = self.by_authority.entry(entry.authority).or_default();
        let slot = entry.history_index as usize;
        if slot < entries.len() {
            entries[slot] = entry;
        } else {
            entries.push(entry);
        }
    }

    /// Authorities this requester has asked.
    pub fn authorities(&self) -> impl Iterator<Item = &Address> {
        self.by_authority.keys()
    }

    /// Entries for `authority` in ledger order.
    pub fn entries(&self, authority: &Address) -> &[HistoryEntry] {
        self.by_authority
            .get(authority)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Attributes with a pending request at `authority`.
    pub fn pending_attributes(&self, authority: &Address) -> BTreeSet<&Attribute> {
        self.entries(authority)
            .iter()
            .filter(|e| e.status == RequestStatus::Pending)
            .flat_map(|e| e.attributes.iter())
            .collect()
    }

    /// Every entry with the given status, across authorities.
    pub fn with_status(&self, status: RequestStatus) -> Vec<&HistoryEntry> {
        self.by_authority
            .values()
            .flatten()
            .filter(|e| e.status == status)
            .collect()
    }
}
