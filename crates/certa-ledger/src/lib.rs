//! # Certa Ledger
//!
//! Ports to the shared ledger and remote blob store, plus the local request
//! caches that mirror ledger arrays.
//!
//! ## Swap-remove
//!
//! The ledger deletes a resolved request by moving the last element of the
//! array into the freed slot. Every update therefore returns a
//! [`ChangeDescriptor`] naming the one swap it performed:
//!
//! ```text
//! requests of R:  [q0, q1, q2]   resolve q0   ->  [q2, q1]     RequestSwap { from: 2, to: 0 }
//! requests of R:  [q0, q1]       resolve q1   ->  [q0]         NoSwap
//! requesters:     [R, S]         resolve R's  ->  [S]          RequesterSwap { S, from: 1, to: 0 }
//!                                last request
//! ```
//!
//! [`PendingInbox::apply_removal`] replays the descriptor on the local mirror.
//!
//! ## Key Types
//!
//! - [`LedgerClient`] - The shared ledger
//! - [`BlobStore`] - Remote storage for ciphertext and key bundles
//! - [`PendingInbox`] - Authority-side mirror of pending requests
//! - [`RequestHistory`] - Requester-side mirror of its requests
//! - [`MemoryLedger`], [`MemoryBlobStore`] - In-memory implementations

pub mod cache;
pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use cache::{PendingInbox, RequestHistory};
pub use client::{BlobStore, LedgerClient};
pub use error::{LedgerError, Result};
pub use memory::{MemoryBlobStore, MemoryLedger};
pub use types::{ChangeDescriptor, HistoryEntry, PendingRequest, PendingRequester, RequestReceipt};
