//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use certa_core::Address;

use crate::error::{ClientError, Result};

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the local working area.
    pub data_dir: PathBuf,
    /// Security level passed to global setup when no parameters exist yet.
    pub security_level: u32,
    /// Appended to a recording's file name to name its ciphertext.
    pub ciphertext_suffix: String,
    /// Label sent with blob space reservations.
    pub blob_owner_label: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("certa-data"),
            security_level: 128,
            ciphertext_suffix: ".enc".to_string(),
            blob_owner_label: "certa".to_string(),
        }
    }
}

impl ClientConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check invariants the rest of the client relies on.
    pub fn validate(&self) -> Result<()> {
        if self.ciphertext_suffix.is_empty() {
            return Err(ClientError::Config(
                "ciphertext_suffix must not be empty".into(),
            ));
        }
        if self.security_level == 0 {
            return Err(ClientError::Config("security_level must be positive".into()));
        }
        Ok(())
    }

    /// Directory holding `owner`'s plaintext and ciphertext files.
    pub fn working_dir(&self, owner: &Address) -> PathBuf {
        self.data_dir.join("files").join(owner.to_canonical())
    }

    /// Default location of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("certa.db")
    }
}
