//! Wire types exchanged with the ledger.
//!
//! Index fields are positions in ledger arrays. Pending arrays shrink by
//! swap-remove, so `requester_index` and `request_index` can move; a
//! `history_index` never does.

use serde::{Deserialize, Serialize};

use certa_core::{Address, Attribute, RequestStatus};

/// Indices the ledger assigned to a newly published request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReceipt {
    pub requester_index: u64,
    pub request_index: u64,
    pub history_index: u64,
    pub timestamp: i64,
}

/// One request in an authority's pending inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub requester: Address,
    pub requester_index: u64,
    pub request_index: u64,
    pub history_index: u64,
    pub attributes: Vec<Attribute>,
    pub status: RequestStatus,
    pub timestamp: i64,
}

/// One requester's slot in an authority's pending inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequester {
    pub requester: Address,
    /// Requests in ledger order: position == `request_index`.
    pub requests: Vec<PendingRequest>,
}

/// One request in a requester's history with an authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub authority: Address,
    pub history_index: u64,
    pub attributes: Vec<Attribute>,
    pub status: RequestStatus,
    pub timestamp: i64,
}

/// The swap the ledger performed when it removed a processed request.
///
/// Exactly one variant describes each removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeDescriptor {
    /// The processed requester had no requests left and its slot was refilled
    /// by `requester`, which moved from slot `from` to slot `to`.
    RequesterSwap { requester: Address, from: u64, to: u64 },
    /// Within the processed requester's list, the request at `from` moved to
    /// `to` to fill the removed slot.
    RequestSwap { requester: Address, from: u64, to: u64 },
    /// The removed entry was last in its array.
    NoSwap,
}
