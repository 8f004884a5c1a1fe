//! Key material held by authorities and users.
//!
//! An authority owns one [`SecretKey`] per attribute in its universe and
//! publishes the matching [`PublicKey`]s. A user owns a [`PersonalKeyRing`]:
//! the personal keys issued to one identity binding, at most one per
//! authority and attribute.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use certa_core::{Address, Attribute, Record};

use crate::crypto::{random_bytes, X25519PublicKey, X25519StaticSecret};
use crate::error::{PermsError, Result};

/// Scheme-wide parameters shared by every participant.
///
/// Created once by global setup and persisted so that later runs reuse them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParameters {
    /// Requested security level in bits.
    pub security_level: u32,
    /// Random domain tag mixed into every derived key.
    pub domain: [u8; 32],
}

impl Record for GlobalParameters {
    const KIND: &'static str = "global-parameters";
}

/// The symmetric key that encrypts one recording's bytes.
///
/// Never serialized. Only the policy-wrapped form leaves memory.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// An attribute public key published by an authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub X25519PublicKey);

/// An authority's secret key for one attribute.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    authority: Address,
    material: [u8; 32],
}

impl SecretKey {
    /// Generate a fresh secret key owned by `authority`.
    pub fn generate(authority: Address) -> Self {
        Self {
            authority,
            material: random_bytes(),
        }
    }

    /// The issuing authority.
    pub fn authority(&self) -> Address {
        self.authority
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519StaticSecret::from_bytes(self.material).public_key())
    }

    pub(crate) fn material(&self) -> [u8; 32] {
        self.material
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(authority={}, ..)", self.authority.short())
    }
}

/// Both halves of an authority's key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityKeys {
    authority: Address,
    public_keys: BTreeMap<Attribute, PublicKey>,
    secret_keys: BTreeMap<Attribute, SecretKey>,
}

impl AuthorityKeys {
    /// Assemble key material from secret keys, deriving the public halves.
    pub fn from_secret_keys(
        authority: Address,
        secret_keys: BTreeMap<Attribute, SecretKey>,
    ) -> Self {
        let public_keys = secret_keys
            .iter()
            .map(|(attribute, sk)| (attribute.clone(), sk.public_key()))
            .collect();
        Self {
            authority,
            public_keys,
            secret_keys,
        }
    }

    /// The owning authority.
    pub fn authority(&self) -> Address {
        self.authority
    }

    /// Take over keys for attributes this set does not cover yet.
    ///
    /// Existing keys are never replaced, so personal keys already issued stay
    /// valid. Returns the number of attributes added.
    pub fn absorb_missing(&mut self, other: AuthorityKeys) -> usize {
        let mut added = 0;
        for (attribute, sk) in other.secret_keys {
            if !self.secret_keys.contains_key(&attribute) {
                self.public_keys.insert(attribute.clone(), sk.public_key());
                self.secret_keys.insert(attribute, sk);
                added += 1;
            }
        }
        added
    }

    /// Secret key for `attribute`, if it is in the universe.
    pub fn secret_key(&self, attribute: &Attribute) -> Option<&SecretKey> {
        self.secret_keys.get(attribute)
    }

    /// The publishable half.
    pub fn public_keys(&self) -> AuthorityPublicKeys {
        AuthorityPublicKeys {
            authority: self.authority,
            keys: self.public_keys.clone(),
        }
    }

    /// The attribute universe, in sorted order.
    pub fn universe(&self) -> impl Iterator<Item = &Attribute> {
        self.secret_keys.keys()
    }
}

impl Record for AuthorityKeys {
    const KIND: &'static str = "authority-keys";
}

/// An authority's published attribute public keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityPublicKeys {
    pub authority: Address,
    pub keys: BTreeMap<Attribute, PublicKey>,
}

impl Record for AuthorityPublicKeys {
    const KIND: &'static str = "authority-public-keys";
}

/// A decryption key for one attribute, bound to one identity.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersonalKey {
    binding: String,
    authority: Address,
    attribute: Attribute,
    material: [u8; 32],
}

impl PersonalKey {
    pub(crate) fn new(
        binding: String,
        authority: Address,
        attribute: Attribute,
        material: [u8; 32],
    ) -> Self {
        Self {
            binding,
            authority,
            attribute,
            material,
        }
    }

    /// The identity binding this key was generated for.
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// The issuing authority.
    pub fn authority(&self) -> Address {
        self.authority
    }

    /// The attribute this key proves.
    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub(crate) fn static_secret(&self) -> X25519StaticSecret {
        X25519StaticSecret::from_bytes(self.material)
    }
}

impl fmt::Debug for PersonalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonalKey")
            .field("binding", &self.binding)
            .field("authority", &self.authority)
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

/// All personal keys held for one identity binding.
///
/// Every key in a ring carries the same binding. Keys issued to different
/// identities cannot be pooled to satisfy a policy. Attribute names are
/// scoped to their authority, so two authorities' `doctor` keys are distinct
/// entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalKeyRing {
    binding: Option<String>,
    keys: BTreeMap<Address, BTreeMap<Attribute, PersonalKey>>,
}

impl PersonalKeyRing {
    /// An empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding shared by every key, once the first key is added.
    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    /// Add a key. Returns `false` if the same authority's attribute was
    /// already held.
    pub fn insert(&mut self, key: PersonalKey) -> Result<bool> {
        match &self.binding {
            Some(expected) if expected != key.binding() => {
                return Err(PermsError::KeyBindingMismatch {
                    expected: expected.clone(),
                    found: key.binding.clone(),
                });
            }
            Some(_) => {}
            None => self.binding = Some(key.binding.clone()),
        }

        let held = self.keys.entry(key.authority).or_default();
        if held.contains_key(key.attribute()) {
            return Ok(false);
        }
        held.insert(key.attribute.clone(), key);
        Ok(true)
    }

    /// Add every key, returning how many were new.
    pub fn merge(&mut self, keys: impl IntoIterator<Item = PersonalKey>) -> Result<usize> {
        let mut added = 0;
        for key in keys {
            if self.insert(key)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Key for `authority`'s `attribute`.
    pub fn get(&self, authority: &Address, attribute: &Attribute) -> Option<&PersonalKey> {
        self.keys.get(authority)?.get(attribute)
    }

    /// Whether a key for `authority`'s `attribute` is held.
    pub fn contains(&self, authority: &Address, attribute: &Attribute) -> bool {
        self.get(authority, attribute).is_some()
    }

    /// Attributes held from `authority`, in sorted order.
    pub fn attributes_from<'a>(
        &'a self,
        authority: &Address,
    ) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.keys
            .get(authority)
            .into_iter()
            .flat_map(|held| held.keys())
    }

    /// Iterate over held keys, grouped by authority.
    pub fn iter(&self) -> impl Iterator<Item = &PersonalKey> {
        self.keys.values().flat_map(|held| held.values())
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Record for PersonalKeyRing {
    const KIND: &'static str = "personal-key-ring";
}
