//! # Certa Permissions
//!
//! Key material, policy encryption and the encrypted content lifecycle's
//! pure parts.
//!
//! ## Encryption Model
//!
//! Content uses a two-layer key model:
//!
//! 1. **Content Key**: a random symmetric key that seals the file bytes with
//!    streamed ChaCha20-Poly1305 ([`content`])
//! 2. **Wrapped Key**: the content key, encrypted under an access policy by an
//!    [`AbeScheme`] so that only holders of satisfying personal keys recover it
//!
//! Authorities own per-attribute [`SecretKey`]s and publish the matching
//! public keys. Users hold a [`PersonalKeyRing`] bound to one identity.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certa_core::{AccessStructure, Address, Attribute};
//! use certa_perms::{AbeScheme, PublicKeyDirectory, TreeSharingScheme};
//!
//! let scheme = TreeSharingScheme::new();
//! let gp = scheme.global_setup(128);
//! let hospital = Address::from_bytes([1; 20]);
//! let keys = scheme.authority_setup(hospital, &gp, &[Attribute::new("doctor").unwrap()]);
//!
//! let mut directory = PublicKeyDirectory::new();
//! directory.insert(keys.public_keys());
//!
//! let policy = AccessStructure::parse("doctor").unwrap();
//! let pks = directory.assemble(&[hospital], &policy).unwrap();
//! let content_key = scheme.generate_content_key(&gp);
//! let wrapped = scheme.encrypt(&content_key, &policy, &gp, &pks).unwrap();
//! ```

pub mod content;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod issuance;
pub mod keys;
pub mod recording;
pub mod scheme;
pub mod shamir;

pub use content::{decrypt_file, encrypt_file, write_atomically, CHUNK_SIZE};
pub use crypto::{EncryptionKey, EncryptionNonce, X25519PublicKey};
pub use directory::{PublicKeyDirectory, PublicKeySet};
pub use error::{PermsError, Result};
pub use issuance::{stage_issuance, Issuance};
pub use keys::{
    AuthorityKeys, AuthorityPublicKeys, ContentKey, GlobalParameters, PersonalKey,
    PersonalKeyRing, PublicKey, SecretKey,
};
pub use recording::{Recording, RecordingState, StorageLocation};
pub use scheme::{AbeScheme, Ciphertext, SealedShare, TreeSharingScheme};
