//! Marker trait for entities persisted through the storage port.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// An entity the storage port can load and save.
///
/// `KIND` is written alongside the encoded body so that a load under the wrong
/// type is rejected at the storage boundary instead of being re-parsed at the
/// call site.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Stable tag identifying the entity type.
    const KIND: &'static str;

    /// Schema version of the encoded body.
    const VERSION: u16 = 1;
}
