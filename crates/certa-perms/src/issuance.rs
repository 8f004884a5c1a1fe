//! All-or-nothing personal key issuance.
//!
//! Keys for a request are generated into a staging list first. Nothing is
//! returned for dispatch unless every requested attribute could be served,
//! so a request is never half granted.

use certa_core::{Attribute, UserIdentity};

use crate::error::Result;
use crate::keys::{AuthorityKeys, GlobalParameters, PersonalKey, PersonalKeyRing};
use crate::scheme::AbeScheme;

/// Outcome of staging keys for one request.
#[derive(Debug)]
pub enum Issuance {
    /// Every attribute is served. `staged` holds the newly generated keys;
    /// `skipped` lists attributes the requester already held.
    Complete {
        staged: Vec<PersonalKey>,
        skipped: Vec<Attribute>,
    },
    /// The authority has no secret key for `missing`. Nothing was issued.
    Rejected { missing: Attribute },
}

/// Stage personal keys for `requester` over `attributes`.
///
/// `already_issued` is the set previously dispatched to this requester; those
/// attributes are skipped rather than regenerated.
pub fn stage_issuance<S>(
    scheme: &S,
    gp: &GlobalParameters,
    authority_keys: &AuthorityKeys,
    requester: &UserIdentity,
    attributes: &[Attribute],
    already_issued: &PersonalKeyRing,
) -> Result<Issuance>
where
    S: AbeScheme + ?Sized,
{
    let mut staged: Vec<PersonalKey> = Vec::with_capacity(attributes.len());
    let mut skipped = Vec::new();

    for attribute in attributes {
        if already_issued.contains(&authority_keys.authority(), attribute) {
            skipped.push(attribute.clone());
            continue;
        }
        if staged.iter().any(|k| k.attribute() == attribute) {
            continue;
        }
        let Some(secret_key) = authority_keys.secret_key(attribute) else {
            return Ok(Issuance::Rejected {
                missing: attribute.clone(),
            });
        };
        staged.push(scheme.key_gen(requester, attribute, secret_key, gp)?);
    }

    Ok(Issuance::Complete { staged, skipped })
}
