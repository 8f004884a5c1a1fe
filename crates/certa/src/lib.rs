//! # Certa
//!
//! Decentralized attribute-based access control: users request attributes
//! from authorities over a shared ledger, authorities issue personal
//! decryption keys, and owners publish recordings encrypted so that only
//! holders of a satisfying attribute set can read them.
//!
//! ## Overview
//!
//! - **Requests**: an append-only history per requester and a swap-remove
//!   inbox per authority, both mirrored locally
//! - **Issuance**: all-or-nothing; a request is granted in full or rejected
//! - **Recordings**: a file encrypted under a fresh content key, the key
//!   wrapped for an access policy, the ciphertext uploaded to blob storage
//!   and the metadata published on the ledger
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use certa::{Client, ClientConfig};
//! use certa::core::{Attribute, UserIdentity};
//! use certa::ledger::{MemoryBlobStore, MemoryLedger};
//! use certa::store::SqliteStore;
//!
//! async fn example() -> certa::Result<()> {
//!     let ledger = Arc::new(MemoryLedger::new());
//!     let blobs = Arc::new(MemoryBlobStore::new());
//!     let config = ClientConfig::with_data_dir("certa-data");
//!
//!     let identity = UserIdentity::parse("clinic-0x00000000000000000000000000000000000000aa")?;
//!     let store = SqliteStore::open(config.database_path())?;
//!     let clinic = Client::open(identity, config, store, ledger, blobs).await?;
//!
//!     clinic.setup_authority(&[Attribute::new("doctor")?]).await?;
//!     clinic.publish_authority_keys().await?;
//!     clinic.publish("visit.txt", "doctor", &[clinic.address()]).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `certa::core` - Identities, attributes, policies and digests
//! - `certa::perms` - Keys, the attribute-based scheme and file encryption
//! - `certa::store` - Storage port with memory and SQLite backends
//! - `certa::ledger` - Ledger and blob store ports, request caches

pub mod client;
pub mod config;
pub mod error;
pub mod keystore;
pub mod lifecycle;
pub mod requests;

pub use certa_core as core;
pub use certa_ledger as ledger;
pub use certa_perms as perms;
pub use certa_store as store;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use keystore::KeyStore;
pub use lifecycle::{FetchReport, RecordingLifecycle};
pub use requests::{AttributeRequestProtocol, GrantOutcome, RejectReason, RequestedSet};

pub use certa_core::{AccessStructure, Address, Attribute, RequestStatus, UserIdentity};
pub use certa_perms::{PersonalKeyRing, Recording, RecordingState};
