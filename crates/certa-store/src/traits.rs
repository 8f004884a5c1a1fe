//! Store trait: the storage port for persisted entities.
//!
//! Entities are addressed by a logical path plus a name, e.g.
//! `authority/0xab../` + `secret-keys`. Backends only ever see opaque bytes;
//! [`StoreExt`] adds the typed layer on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use certa_core::Record;

use crate::error::{Result, StoreError};

/// Location of one persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub path: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path, self.name)
    }
}

/// The Store trait: async interface for entity persistence.
///
/// All methods are async to support both blocking (SQLite) and in-memory
/// backends. SQLite runs each call under `spawn_blocking`.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Raw Entity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the bytes stored at `key`.
    async fn load_raw(&self, key: &EntityKey) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` at `key`, replacing any previous value.
    async fn save_raw(&self, key: &EntityKey, bytes: Vec<u8>) -> Result<()>;

    /// Remove the entity at `key`. Returns whether it existed.
    async fn delete(&self, key: &EntityKey) -> Result<bool>;

    /// Names stored under `path`, sorted.
    async fn list(&self, path: &str) -> Result<Vec<String>>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    version: u16,
    body: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    kind: String,
    version: u16,
    body: ciborium::Value,
}

/// Encode a record with its kind tag.
pub fn encode_record<T: Record>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(
        &EnvelopeRef {
            kind: T::KIND,
            version: T::VERSION,
            body: value,
        },
        &mut buf,
    )
    .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Decode bytes written by [`encode_record`], checking the kind tag.
pub fn decode_record<T: Record>(bytes: &[u8]) -> Result<T> {
    let envelope: Envelope =
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;

    if envelope.kind != T::KIND {
        return Err(StoreError::InvalidData(format!(
            "expected {}, found {}",
            T::KIND,
            envelope.kind
        )));
    }
    if envelope.version > T::VERSION {
        return Err(StoreError::InvalidData(format!(
            "{} schema version {} is newer than supported {}",
            T::KIND,
            envelope.version,
            T::VERSION
        )));
    }

    envelope
        .body
        .deserialized()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Typed access on top of [`Store`].
pub trait StoreExt: Store {
    /// Load and decode the record at `key`.
    fn load<T: Record>(
        &self,
        key: &EntityKey,
    ) -> impl std::future::Future<Output = Result<Option<T>>> + Send;

    /// Encode and save `value` at `key`.
    fn save<T: Record>(
        &self,
        key: &EntityKey,
        value: &T,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn load<T: Record>(&self, key: &EntityKey) -> Result<Option<T>> {
        match self.load_raw(key).await? {
            Some(bytes) => decode_record(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn save<T: Record>(&self, key: &EntityKey, value: &T) -> Result<()> {
        let bytes = encode_record(value)?;
        self.save_raw(key, bytes).await
    }
}
