//! Test fixtures and helpers.
//!
//! Every client of a [`TestNetwork`] shares one in-memory ledger and blob
//! store but has its own store and working directory, like separate machines.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use certa::{Client, ClientConfig};
use certa_core::{Address, Attribute, UserIdentity};
use certa_ledger::{MemoryBlobStore, MemoryLedger};
use certa_store::{MemoryStore, SqliteStore, Store};

/// An identity named `name` at an address filled with `seed`.
pub fn identity(name: &str, seed: u8) -> UserIdentity {
    UserIdentity::new(name, Address::from_bytes([seed; 20])).unwrap()
}

/// Parse a list of attribute names.
pub fn attrs(names: &[&str]) -> Vec<Attribute> {
    names.iter().map(|n| Attribute::new(*n).unwrap()).collect()
}

/// A shared ledger and blob store.
#[derive(Clone, Default)]
pub struct TestNetwork {
    pub ledger: Arc<MemoryLedger>,
    pub blobs: Arc<MemoryBlobStore>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client backed by an in-memory store.
    pub async fn client(&self, name: &str, seed: u8) -> TestClient<MemoryStore> {
        self.client_with(identity(name, seed), |_| MemoryStore::new()).await
    }

    /// A client backed by a SQLite file in its working directory.
    pub async fn sqlite_client(&self, name: &str, seed: u8) -> TestClient<SqliteStore> {
        self.client_with(identity(name, seed), |config| {
            SqliteStore::open(config.database_path()).unwrap()
        })
        .await
    }

    /// Reopen a SQLite-backed client over the same directory, as after a restart.
    pub async fn reopen_sqlite(&self, previous: TestClient<SqliteStore>) -> TestClient<SqliteStore> {
        let TestClient { client, dir } = previous;
        let identity = client.identity().clone();
        let config = client.config().clone();
        drop(client);

        let store = SqliteStore::open(config.database_path()).unwrap();
        let client = Client::open(
            identity,
            config,
            store,
            Arc::clone(&self.ledger),
            Arc::clone(&self.blobs),
        )
        .await
        .unwrap();
        TestClient { client, dir }
    }

    async fn client_with<S, F>(&self, identity: UserIdentity, make_store: F) -> TestClient<S>
    where
        S: Store,
        F: FnOnce(&ClientConfig) -> S,
    {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::with_data_dir(dir.path());
        std::fs::create_dir_all(&config.data_dir).unwrap();
        let store = make_store(&config);

        let client = Client::open(
            identity,
            config,
            store,
            Arc::clone(&self.ledger),
            Arc::clone(&self.blobs),
        )
        .await
        .unwrap();
        TestClient { client, dir }
    }
}

/// A client plus the temporary directory holding its files.
pub struct TestClient<S: Store = MemoryStore> {
    pub client: Client<S, MemoryLedger, MemoryBlobStore>,
    pub dir: tempfile::TempDir,
}

impl<S: Store> TestClient<S> {
    /// Path of `file_name` in `owner`'s working directory.
    pub fn path_of(&self, owner: &Address, file_name: &str) -> PathBuf {
        self.client.config().working_dir(owner).join(file_name)
    }

    /// Write one of this client's own files.
    pub fn write_file(&self, file_name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path_of(&self.client.address(), file_name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Read a file from `owner`'s working directory.
    pub fn read_file(&self, owner: &Address, file_name: &str) -> Vec<u8> {
        std::fs::read(self.path_of(owner, file_name)).unwrap()
    }
}

impl<S: Store> Deref for TestClient<S> {
    type Target = Client<S, MemoryLedger, MemoryBlobStore>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
