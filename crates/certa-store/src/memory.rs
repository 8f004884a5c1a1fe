//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{EntityKey, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<EntityKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_raw(&self, key: &EntityKey) -> Result<Option<Vec<u8>>> {
        let entities = self.entities.read().unwrap();
        Ok(entities.get(key).cloned())
    }

    async fn save_raw(&self, key: &EntityKey, bytes: Vec<u8>) -> Result<()> {
        let mut entities = self.entities.write().unwrap();
        entities.insert(key.clone(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &EntityKey) -> Result<bool> {
        let mut entities = self.entities.write().unwrap();
        Ok(entities.remove(key).is_some())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let entities = self.entities.read().unwrap();
        Ok(entities
            .keys()
            .filter(|k| k.path == path)
            .map(|k| k.name.clone())
            .collect())
    }
}
