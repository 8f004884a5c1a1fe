//! # Certa Store
//!
//! Storage port for Certa. Provides a trait-based interface for entity
//! persistence with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for raw entity operations
//! - [`StoreExt`] - Typed load/save of [`certa_core::Record`] entities
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`EntityKey`] - Logical path plus name
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certa_store::{EntityKey, SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("certa.db").unwrap();
//!     let key = EntityKey::new("client", "global-parameters");
//!     let bytes = store.load_raw(&key).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Kind tags**: every typed entity is stored inside a CBOR envelope that
//!   names its kind, so loading under the wrong type fails with `InvalidData`
//! - **Last write wins**: saving to an existing key replaces it

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{decode_record, encode_record, EntityKey, Store, StoreExt};
