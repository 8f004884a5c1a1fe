//! The attribute-based encryption capability.
//!
//! [`AbeScheme`] is the seam between the request and content lifecycles and
//! the key mathematics. The lifecycles only ever hold its outputs as opaque
//! values. [`TreeSharingScheme`] is the bundled implementation.
//!
//! # Construction
//!
//! `TreeSharingScheme` shares the content key down the policy tree. A gate
//! with threshold `k` over `n` children splits its secret into `n` Shamir
//! shares of which any `k` recover it. Each leaf share is sealed to the
//! attribute's public key with an ephemeral X25519 agreement and
//! ChaCha20-Poly1305. A Blake3 commitment to the content key lets decryption
//! detect a wrong reconstruction.

use serde::{Deserialize, Serialize};

use certa_core::{AccessStructure, Address, Attribute, UserIdentity};

use crate::crypto::{random_bytes, EncryptionNonce, EphemeralKeyPair, SharedKey, X25519PublicKey};
use crate::directory::PublicKeySet;
use crate::error::{PermsError, Result};
use crate::keys::{
    AuthorityKeys, ContentKey, GlobalParameters, PersonalKey, PersonalKeyRing, SecretKey,
};
use crate::shamir;

const CIPHERTEXT_VERSION: u8 = 1;
const COMMITMENT_CONTEXT: &str = "certa-perms-v1 content-key commitment";

/// A content key wrapped under an access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub version: u8,
    /// Canonical policy text.
    pub policy: String,
    /// One sealed share per policy leaf, in depth-first order.
    pub shares: Vec<SealedShare>,
    pub commitment: [u8; 32],
}

/// A leaf share sealed to one attribute public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedShare {
    pub authority: Address,
    pub attribute: Attribute,
    pub ephemeral_public: X25519PublicKey,
    pub nonce: EncryptionNonce,
    pub sealed: Vec<u8>,
}

/// Multi-authority attribute-based encryption.
pub trait AbeScheme: Send + Sync {
    /// Create the parameters every participant shares.
    fn global_setup(&self, security_level: u32) -> GlobalParameters;

    /// Create key material for every attribute in `universe`.
    fn authority_setup(
        &self,
        authority: Address,
        gp: &GlobalParameters,
        universe: &[Attribute],
    ) -> AuthorityKeys;

    /// Derive the personal key for `attribute`, bound to `identity`.
    fn key_gen(
        &self,
        identity: &UserIdentity,
        attribute: &Attribute,
        secret_key: &SecretKey,
        gp: &GlobalParameters,
    ) -> Result<PersonalKey>;

    /// A fresh random content key.
    fn generate_content_key(&self, _gp: &GlobalParameters) -> ContentKey {
        ContentKey::generate()
    }

    /// Wrap `key` so only key rings satisfying `policy` can recover it.
    fn encrypt(
        &self,
        key: &ContentKey,
        policy: &AccessStructure,
        gp: &GlobalParameters,
        public_keys: &PublicKeySet,
    ) -> Result<Ciphertext>;

    /// Recover the content key, or fail with
    /// [`PermsError::PolicyNotSatisfied`].
    fn decrypt(
        &self,
        ciphertext: &Ciphertext,
        keys: &PersonalKeyRing,
        gp: &GlobalParameters,
    ) -> Result<ContentKey>;
}

/// Policy-tree secret sharing with sealed leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSharingScheme;

impl TreeSharingScheme {
    pub fn new() -> Self {
        Self
    }
}

fn leaf_context(gp: &GlobalParameters, leaf: usize, attribute: &Attribute) -> Vec<u8> {
    let mut context = Vec::with_capacity(32 + 4 + attribute.as_str().len());
    context.extend_from_slice(&gp.domain);
    context.extend_from_slice(&(leaf as u32).to_be_bytes());
    context.extend_from_slice(attribute.as_str().as_bytes());
    context
}

fn commit(gp: &GlobalParameters, key: &ContentKey) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(COMMITMENT_CONTEXT);
    hasher.update(&gp.domain);
    hasher.update(key.as_bytes());
    *hasher.finalize().as_bytes()
}

fn split_node<'a>(
    node: &'a AccessStructure,
    secret: [u8; 32],
    out: &mut Vec<(&'a Attribute, [u8; 32])>,
) -> Result<()> {
    match node {
        AccessStructure::Leaf(attribute) => out.push((attribute, secret)),
        AccessStructure::Gate {
            threshold,
            children,
        } => {
            let shares =
                shamir::split(&secret, *threshold, children.len(), &mut rand::thread_rng())?;
            for (child, share) in children.iter().zip(shares) {
                split_node(child, share, out)?;
            }
        }
    }
    Ok(())
}

struct Recovery<'a> {
    shares: &'a [SealedShare],
    keys: &'a PersonalKeyRing,
    gp: &'a GlobalParameters,
    cursor: usize,
}

impl Recovery<'_> {
    fn recover(&mut self, node: &AccessStructure) -> Result<Option<[u8; 32]>> {
        match node {
            AccessStructure::Leaf(attribute) => {
                let index = self.cursor;
                self.cursor += 1;
                let share = self.shares.get(index).ok_or_else(|| {
                    PermsError::InvalidCiphertext("fewer shares than policy leaves".into())
                })?;
                if &share.attribute != attribute {
                    return Err(PermsError::InvalidCiphertext(format!(
                        "share {} is for {}, policy expects {}",
                        index, share.attribute, attribute
                    )));
                }
                Ok(self.open(index, share))
            }
            AccessStructure::Gate {
                threshold,
                children,
            } => {
                let mut points = Vec::with_capacity(*threshold);
                for (i, child) in children.iter().enumerate() {
                    if let Some(secret) = self.recover(child)? {
                        points.push(((i + 1) as u8, secret));
                    }
                }
                if points.len() < *threshold {
                    return Ok(None);
                }
                Ok(Some(shamir::combine(&points[..*threshold])))
            }
        }
    }

    fn open(&self, index: usize, share: &SealedShare) -> Option<[u8; 32]> {
        let key = self.keys.get(&share.authority, &share.attribute)?;

        let shared: SharedKey = key.static_secret().diffie_hellman(&share.ephemeral_public);
        let wrap_key = shared.derive_encryption_key(&leaf_context(self.gp, index, &share.attribute));
        match wrap_key.decrypt(&share.sealed, &share.nonce) {
            Ok(bytes) => <[u8; 32]>::try_from(bytes.as_slice()).ok(),
            Err(e) => {
                tracing::debug!(
                    attribute = %share.attribute,
                    error = %e,
                    "personal key does not open share"
                );
                None
            }
        }
    }
}

impl AbeScheme for TreeSharingScheme {
    fn global_setup(&self, security_level: u32) -> GlobalParameters {
        GlobalParameters {
            security_level,
            domain: random_bytes(),
        }
    }

    fn authority_setup(
        &self,
        authority: Address,
        _gp: &GlobalParameters,
        universe: &[Attribute],
    ) -> AuthorityKeys {
        let secret_keys = universe
            .iter()
            .map(|attribute| (attribute.clone(), SecretKey::generate(authority)))
            .collect();
        AuthorityKeys::from_secret_keys(authority, secret_keys)
    }

    fn key_gen(
        &self,
        identity: &UserIdentity,
        attribute: &Attribute,
        secret_key: &SecretKey,
        _gp: &GlobalParameters,
    ) -> Result<PersonalKey> {
        Ok(PersonalKey::new(
            identity.binding(),
            secret_key.authority(),
            attribute.clone(),
            secret_key.material(),
        ))
    }

    fn encrypt(
        &self,
        key: &ContentKey,
        policy: &AccessStructure,
        gp: &GlobalParameters,
        public_keys: &PublicKeySet,
    ) -> Result<Ciphertext> {
        let mut leaves = Vec::new();
        split_node(policy, *key.as_bytes(), &mut leaves)?;

        let mut shares = Vec::with_capacity(leaves.len());
        for (index, (attribute, secret)) in leaves.into_iter().enumerate() {
            let (authority, pk) = public_keys.resolve(attribute).ok_or_else(|| {
                PermsError::MissingAuthorityPublicKey(format!("no public key for {}", attribute))
            })?;

            let ephemeral = EphemeralKeyPair::generate();
            let ephemeral_public = ephemeral.public_key();
            let wrap_key = ephemeral
                .diffie_hellman(&pk.0)
                .derive_encryption_key(&leaf_context(gp, index, attribute));
            let nonce = EncryptionNonce::generate();
            let sealed = wrap_key.encrypt(&secret, &nonce)?;

            shares.push(SealedShare {
                authority,
                attribute: attribute.clone(),
                ephemeral_public,
                nonce,
                sealed,
            });
        }

        Ok(Ciphertext {
            version: CIPHERTEXT_VERSION,
            policy: policy.to_string(),
            shares,
            commitment: commit(gp, key),
        })
    }

    fn decrypt(
        &self,
        ciphertext: &Ciphertext,
        keys: &PersonalKeyRing,
        gp: &GlobalParameters,
    ) -> Result<ContentKey> {
        if ciphertext.version != CIPHERTEXT_VERSION {
            return Err(PermsError::InvalidCiphertext(format!(
                "unsupported version {}",
                ciphertext.version
            )));
        }
        let policy = AccessStructure::parse(&ciphertext.policy)?;
        if policy.attributes().len() != ciphertext.shares.len() {
            return Err(PermsError::InvalidCiphertext(format!(
                "{} shares for {} policy leaves",
                ciphertext.shares.len(),
                policy.attributes().len()
            )));
        }

        let held = |attribute: &Attribute| {
            ciphertext
                .shares
                .iter()
                .filter(|share| &share.attribute == attribute)
                .any(|share| keys.contains(&share.authority, attribute))
        };
        if !policy.is_satisfied_by(&held) {
            return Err(PermsError::PolicyNotSatisfied);
        }

        let mut recovery = Recovery {
            shares: &ciphertext.shares,
            keys,
            gp,
            cursor: 0,
        };
        let secret = recovery
            .recover(&policy)?
            .ok_or(PermsError::PolicyNotSatisfied)?;

        let key = ContentKey::from_bytes(secret);
        if commit(gp, &key) != ciphertext.commitment {
            return Err(PermsError::DecryptionError(
                "content key commitment mismatch".into(),
            ));
        }
        Ok(key)
    }
}
