//! Typed persistence for keys, request caches and recordings.
//!
//! Every entity lives under a path derived from the address that owns it:
//!
//! ```text
//! client/global-parameters
//! authority/<addr>/secret-keys
//! authority/<addr>/pending-inbox
//! authority/<addr>/dispatch/<requester>
//! user/<addr>/personal-keys
//! user/<addr>/request-history
//! public-keys/<authority>
//! recordings/<owner>/<file name>
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use certa_core::{Address, Attribute};
use certa_ledger::{PendingInbox, RequestHistory};
use certa_perms::{
    AbeScheme, AuthorityKeys, AuthorityPublicKeys, GlobalParameters, PersonalKeyRing,
    PublicKeyDirectory, Recording,
};
use certa_store::{EntityKey, Store, StoreExt};

use crate::error::Result;

const CLIENT: &str = "client";
const PUBLIC_KEYS: &str = "public-keys";

fn authority_path(authority: &Address) -> String {
    format!("authority/{}", authority)
}

fn dispatch_path(authority: &Address) -> String {
    format!("authority/{}/dispatch", authority)
}

fn user_path(user: &Address) -> String {
    format!("user/{}", user)
}

fn recordings_path(owner: &Address) -> String {
    format!("recordings/{}", owner)
}

/// Typed view over a [`Store`].
pub struct KeyStore<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for KeyStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> KeyStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Global Parameters
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn load_global_parameters(&self) -> Result<Option<GlobalParameters>> {
        Ok(self
            .store
            .load(&EntityKey::new(CLIENT, "global-parameters"))
            .await?)
    }

    pub async fn save_global_parameters(&self, gp: &GlobalParameters) -> Result<()> {
        Ok(self
            .store
            .save(&EntityKey::new(CLIENT, "global-parameters"), gp)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authority Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Create key material for `universe` and persist it.
    ///
    /// Setup is additive: if `authority` already holds keys, only attributes
    /// new to its universe get fresh keys.
    pub async fn authority_setup(
        &self,
        scheme: &dyn AbeScheme,
        gp: &GlobalParameters,
        authority: Address,
        universe: &[Attribute],
    ) -> Result<AuthorityKeys> {
        let generated = scheme.authority_setup(authority, gp, universe);
        let keys = match self.load_authority_keys(&authority).await? {
            Some(mut existing) => {
                let added = existing.absorb_missing(generated);
                info!(authority = %authority, added, "extended authority universe");
                existing
            }
            None => {
                info!(authority = %authority, attributes = universe.len(), "authority setup");
                generated
            }
        };
        self.save_authority_keys(&keys).await?;
        Ok(keys)
    }

    pub async fn load_authority_keys(&self, authority: &Address) -> Result<Option<AuthorityKeys>> {
        Ok(self
            .store
            .load(&EntityKey::new(authority_path(authority), "secret-keys"))
            .await?)
    }

    pub async fn save_authority_keys(&self, keys: &AuthorityKeys) -> Result<()> {
        Ok(self
            .store
            .save(
                &EntityKey::new(authority_path(&keys.authority()), "secret-keys"),
                keys,
            )
            .await?)
    }

    /// The cached pending inbox, empty if never synced.
    pub async fn load_pending_inbox(&self, authority: &Address) -> Result<PendingInbox> {
        Ok(self
            .store
            .load(&EntityKey::new(authority_path(authority), "pending-inbox"))
            .await?
            .unwrap_or_else(|| PendingInbox::new(*authority)))
    }

    pub async fn save_pending_inbox(&self, inbox: &PendingInbox) -> Result<()> {
        Ok(self
            .store
            .save(
                &EntityKey::new(authority_path(&inbox.authority()), "pending-inbox"),
                inbox,
            )
            .await?)
    }

    /// Every key `authority` has issued to `requester`.
    pub async fn load_dispatch(
        &self,
        authority: &Address,
        requester: &Address,
    ) -> Result<PersonalKeyRing> {
        Ok(self
            .store
            .load(&EntityKey::new(dispatch_path(authority), requester.to_canonical()))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_dispatch(
        &self,
        authority: &Address,
        requester: &Address,
        bundle: &PersonalKeyRing,
    ) -> Result<()> {
        Ok(self
            .store
            .save(
                &EntityKey::new(dispatch_path(authority), requester.to_canonical()),
                bundle,
            )
            .await?)
    }

    /// Requesters `authority` holds a dispatch bundle for.
    pub async fn dispatch_recipients(&self, authority: &Address) -> Result<Vec<Address>> {
        let names = self.store.list(&dispatch_path(authority)).await?;
        let mut recipients = Vec::with_capacity(names.len());
        for name in names {
            recipients.push(Address::parse(&name)?);
        }
        Ok(recipients)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User Side
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn load_personal_keys(&self, user: &Address) -> Result<PersonalKeyRing> {
        Ok(self
            .store
            .load(&EntityKey::new(user_path(user), "personal-keys"))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_personal_keys(&self, user: &Address, ring: &PersonalKeyRing) -> Result<()> {
        Ok(self
            .store
            .save(&EntityKey::new(user_path(user), "personal-keys"), ring)
            .await?)
    }

    /// The cached request history, empty if never synced.
    pub async fn load_request_history(&self, user: &Address) -> Result<RequestHistory> {
        Ok(self
            .store
            .load(&EntityKey::new(user_path(user), "request-history"))
            .await?
            .unwrap_or_else(|| RequestHistory::new(*user)))
    }

    pub async fn save_request_history(&self, history: &RequestHistory) -> Result<()> {
        Ok(self
            .store
            .save(
                &EntityKey::new(user_path(&history.requester()), "request-history"),
                history,
            )
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Public Keys
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn load_public_keys(&self, authority: &Address) -> Result<Option<AuthorityPublicKeys>> {
        Ok(self
            .store
            .load(&EntityKey::new(PUBLIC_KEYS, authority.to_canonical()))
            .await?)
    }

    /// Cache `keys`, replacing what was held for that authority.
    pub async fn save_public_keys(&self, keys: &AuthorityPublicKeys) -> Result<()> {
        Ok(self
            .store
            .save(&EntityKey::new(PUBLIC_KEYS, keys.authority.to_canonical()), keys)
            .await?)
    }

    /// A directory over the cached keys of `authorities`.
    ///
    /// Authorities with nothing cached are left out; assembling a key set for
    /// a policy then reports which one is missing.
    pub async fn public_key_directory(&self, authorities: &[Address]) -> Result<PublicKeyDirectory> {
        let mut directory = PublicKeyDirectory::new();
        let unique: BTreeSet<&Address> = authorities.iter().collect();
        for authority in unique {
            if let Some(keys) = self.load_public_keys(authority).await? {
                directory.insert(keys);
            }
        }
        Ok(directory)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recordings
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn load_recording(&self, owner: &Address, file_name: &str) -> Result<Option<Recording>> {
        Ok(self
            .store
            .load(&EntityKey::new(recordings_path(owner), file_name))
            .await?)
    }

    pub async fn save_recording(&self, recording: &Recording) -> Result<()> {
        Ok(self
            .store
            .save(
                &EntityKey::new(recordings_path(&recording.owner), recording.file_name.as_str()),
                recording,
            )
            .await?)
    }

    /// File names of every recording held for `owner`.
    pub async fn list_recordings(&self, owner: &Address) -> Result<Vec<String>> {
        Ok(self.store.list(&recordings_path(owner)).await?)
    }
}
