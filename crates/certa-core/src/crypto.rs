//! Content digests.
//!
//! A [`ContentDigest`] is derived from the bytes on disk at the moment it is
//! computed. It is never a source of truth across time: callers recompute it
//! before deciding whether content changed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Buffer size used when streaming content through the digest.
pub const DIGEST_BUFFER_SIZE: usize = 4096;

/// A 32-byte Blake3 digest of a plaintext byte stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Digest an in-memory buffer.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest a reader in fixed-size chunks.
    pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; DIGEST_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
        }
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Digest a file on disk.
    pub fn digest_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::digest_reader(File::open(path)?)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_streamed_digest_matches_one_shot() {
        let data: Vec<u8> = (0..(DIGEST_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();

        let streamed = ContentDigest::digest_reader(&data[..]).unwrap();
        assert_eq!(streamed, ContentDigest::hash(&data));
    }

    #[test]
    fn test_file_digest_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        std::fs::write(&path, b"first version").unwrap();
        let first = ContentDigest::digest_file(&path).unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b" plus edits").unwrap();
        drop(f);

        let second = ContentDigest::digest_file(&path).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, ContentDigest::hash(b"first version plus edits"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContentDigest::digest_file(dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
