//! # Certa Core
//!
//! Pure primitives for Certa: identities, attributes, access policies and
//! content digests.
//!
//! This crate contains no storage and no networking. The only I/O it performs
//! is streaming a reader through the content digest.
//!
//! ## Key Types
//!
//! - [`Address`] - Canonical account address (the single casing boundary)
//! - [`UserIdentity`] - A user-chosen name bound to an address
//! - [`Attribute`] - A named attribute issued by one authority
//! - [`AccessStructure`] - Boolean policy over attributes (AND/OR/threshold)
//! - [`RequestStatus`] - Lifecycle of an attribute request on the ledger
//! - [`ContentDigest`] - Blake3 digest of a plaintext byte stream
//! - [`Record`] - Marker for entities persisted through the storage port

pub mod crypto;
pub mod error;
pub mod policy;
pub mod record;
pub mod types;

pub use crypto::{ContentDigest, DIGEST_BUFFER_SIZE};
pub use error::{CoreError, PolicyError};
pub use policy::AccessStructure;
pub use record::Record;
pub use types::{now_millis, Address, Attribute, RequestStatus, UserIdentity};
