//! SQLite implementation of the Store trait.
//!
//! The primary storage backend. Uses rusqlite with bundled SQLite, wrapped
//! in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use certa_core::now_millis;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{EntityKey, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_raw(&self, key: &EntityKey) -> Result<Option<Vec<u8>>> {
        let key = key.clone();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT body FROM entities WHERE path = ?1 AND name = ?2",
                params![key.path, key.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn save_raw(&self, key: &EntityKey, bytes: Vec<u8>) -> Result<()> {
        let key = key.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO entities (path, name, body, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(path, name) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![key.path, key.name, bytes, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &EntityKey) -> Result<bool> {
        let key = key.clone();
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM entities WHERE path = ?1 AND name = ?2",
                params![key.path, key.name],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let path = path.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT name FROM entities WHERE path = ?1 ORDER BY name")?;
            let names = stmt
                .query_map(params![path], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
        .await
    }
}
