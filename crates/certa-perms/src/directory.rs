//! Cached authority public keys and per-encryption key selection.

use std::collections::BTreeMap;

use certa_core::{AccessStructure, Address, Attribute};

use crate::error::{PermsError, Result};
use crate::keys::{AuthorityPublicKeys, PublicKey};

/// Public keys of every authority a client has fetched.
#[derive(Debug, Clone, Default)]
pub struct PublicKeyDirectory {
    authorities: BTreeMap<Address, BTreeMap<Attribute, PublicKey>>,
}

impl PublicKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one authority's keys.
    pub fn insert(&mut self, keys: AuthorityPublicKeys) {
        self.authorities.insert(keys.authority, keys.keys);
    }

    /// Whether any keys are cached for `authority`.
    pub fn contains(&self, authority: &Address) -> bool {
        self.authorities.contains_key(authority)
    }

    /// Select the public key for every attribute `policy` names, searching
    /// only `authorities`.
    ///
    /// Each listed authority must be cached and each attribute must be
    /// published by exactly one listed authority. An attribute name published
    /// by two listed authorities is reported as ambiguous.
    pub fn assemble(&self, authorities: &[Address], policy: &AccessStructure) -> Result<PublicKeySet> {
        let mut sources = Vec::with_capacity(authorities.len());
        for authority in authorities {
            let keys = self.authorities.get(authority).ok_or_else(|| {
                PermsError::MissingAuthorityPublicKey(format!(
                    "no public keys cached for authority {}",
                    authority
                ))
            })?;
            sources.push((*authority, keys));
        }

        let mut set = PublicKeySet::default();
        for attribute in policy.distinct_attributes() {
            let mut publishers = sources
                .iter()
                .filter_map(|(authority, keys)| keys.get(attribute).map(|pk| (*authority, *pk)));
            let (authority, pk) = publishers.next().ok_or_else(|| {
                PermsError::MissingAuthorityPublicKey(format!(
                    "no listed authority publishes {}",
                    attribute
                ))
            })?;
            if let Some((other, _)) = publishers.next() {
                return Err(PermsError::AmbiguousAttribute {
                    attribute: attribute.to_string(),
                    first: authority.to_string(),
                    second: other.to_string(),
                });
            }
            set.insert(authority, attribute.clone(), pk);
        }

        Ok(set)
    }
}

/// The public keys one encryption needs, keyed by `(authority, attribute)`.
#[derive(Debug, Clone, Default)]
pub struct PublicKeySet {
    keys: BTreeMap<(Address, Attribute), PublicKey>,
    issuers: BTreeMap<Attribute, Address>,
}

impl PublicKeySet {
    fn insert(&mut self, authority: Address, attribute: Attribute, pk: PublicKey) {
        self.issuers.insert(attribute.clone(), authority);
        self.keys.insert((authority, attribute), pk);
    }

    /// `authority`'s public key for `attribute`.
    pub fn get(&self, authority: &Address, attribute: &Attribute) -> Option<&PublicKey> {
        self.keys.get(&(*authority, attribute.clone()))
    }

    /// The authority selected to issue `attribute` for this encryption.
    pub fn issuer(&self, attribute: &Attribute) -> Option<Address> {
        self.issuers.get(attribute).copied()
    }

    /// Issuing authority and public key for a policy leaf.
    pub fn resolve(&self, attribute: &Attribute) -> Option<(Address, &PublicKey)> {
        let authority = self.issuer(attribute)?;
        self.get(&authority, attribute).map(|pk| (authority, pk))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
