//! Strong type definitions for Certa.
//!
//! Addresses are normalized exactly once, when they enter the system through
//! [`Address::parse`]. Every other type stores the canonical form, so two
//! spellings of the same account can never produce two cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A 20-byte account address.
///
/// Canonical text form is `0x` followed by 40 lowercase hex digits. Any casing
/// is accepted on input (checksummed or not); the raw bytes are what is kept.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse an address in any casing, with or without the `0x` prefix.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 40 {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }

        let bytes = hex::decode(digits).map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Canonical text form.
    pub fn to_canonical(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// First six hex digits, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..3])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_canonical())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_canonical()
    }
}

/// A user-chosen name bound to an address.
///
/// The text form is `name-0xaddress`, the user id format exchanged between
/// authorities and requesters. Personal keys are derived from
/// [`UserIdentity::binding`], which always uses the canonical address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserIdentity {
    name: String,
    address: Address,
}

impl UserIdentity {
    /// Create a new identity.
    pub fn new(name: impl Into<String>, address: Address) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidIdentity(name));
        }
        Ok(Self { name, address })
    }

    /// Parse a `name-address` user id. The name may itself contain dashes.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (name, address) = s
            .trim()
            .rsplit_once('-')
            .ok_or_else(|| CoreError::InvalidIdentity(s.to_string()))?;
        Self::new(name, Address::parse(address)?)
    }

    /// The user-chosen name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The account address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The string personal keys are bound to.
    pub fn binding(&self) -> String {
        format!("{}-{}", self.name, self.address)
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.address)
    }
}

impl FromStr for UserIdentity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Name of an attribute in one authority's universe.
///
/// Any run of characters other than whitespace, parentheses and commas is a
/// valid name, so `age>18` and `citizen=US` are attributes. The policy
/// keywords `and`, `or` and `of` are reserved.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Attribute(String);

impl Attribute {
    /// Validate and wrap an attribute name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let reserved = ["and", "or", "of"]
            .iter()
            .any(|kw| name.eq_ignore_ascii_case(kw));
        let bad_char = name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ','));

        if name.is_empty() || reserved || bad_char {
            return Err(CoreError::InvalidAttribute(name));
        }
        Ok(Self(name))
    }

    /// The attribute name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({})", self.0)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Attribute {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Attribute {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Attribute> for String {
    fn from(attribute: Attribute) -> Self {
        attribute.0
    }
}

/// Status of an attribute request, with the ledger's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestStatus {
    Pending = 0,
    Granted = 1,
    Rejected = 2,
}

impl RequestStatus {
    /// Ledger code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a ledger code.
    pub fn from_code(code: u8) -> Result<Self, CoreError> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Granted),
            2 => Ok(Self::Rejected),
            other => Err(CoreError::UnknownStatus(other)),
        }
    }

    /// Whether the status can no longer change.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Move to `next`. Only `Pending -> Granted | Rejected` is legal.
    pub fn transition(self, next: RequestStatus) -> Result<RequestStatus, CoreError> {
        match (self, next) {
            (Self::Pending, Self::Granted | Self::Rejected) => Ok(next),
            (from, to) => Err(CoreError::IllegalTransition { from, to }),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Granted => "GRANTED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(label)
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn test_address_casing_normalized() {
        let upper = Address::parse(MIXED).unwrap();
        let lower = Address::parse(&MIXED.to_lowercase()).unwrap();
        let bare = Address::parse(&MIXED[2..]).unwrap();

        assert_eq!(upper, lower);
        assert_eq!(upper, bare);
        assert_eq!(
            upper.to_string(),
            "0x52908400098527886e0f7030069857d2e4169ee7"
        );
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("zz908400098527886E0F7030069857D2E4169EE7").is_err());
    }

    #[test]
    fn test_address_serde_normalizes() {
        let json = format!("\"{}\"", MIXED);
        let address: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(address, Address::parse(MIXED).unwrap());
    }

    #[test]
    fn test_identity_parse_and_binding() {
        let id = UserIdentity::parse(&format!("alice-{}", MIXED)).unwrap();
        assert_eq!(id.name(), "alice");
        assert_eq!(
            id.binding(),
            "alice-0x52908400098527886e0f7030069857d2e4169ee7"
        );

        let dashed = UserIdentity::parse(&format!("mary-jane-{}", MIXED)).unwrap();
        assert_eq!(dashed.name(), "mary-jane");
    }

    #[test]
    fn test_attribute_validation() {
        assert!(Attribute::new("age>18").is_ok());
        assert!(Attribute::new("citizen=US").is_ok());
        assert!(Attribute::new("").is_err());
        assert!(Attribute::new("two words").is_err());
        assert!(Attribute::new("AND").is_err());
        assert!(Attribute::new("a,b").is_err());
    }

    #[test]
    fn test_status_transitions() {
        let pending = RequestStatus::Pending;
        assert_eq!(
            pending.transition(RequestStatus::Granted),
            Ok(RequestStatus::Granted)
        );
        assert!(RequestStatus::Granted
            .transition(RequestStatus::Rejected)
            .is_err());
        assert!(RequestStatus::Rejected
            .transition(RequestStatus::Pending)
            .is_err());
        assert!(pending.transition(RequestStatus::Pending).is_err());
    }

    #[test]
    fn test_status_codes() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Granted,
            RequestStatus::Rejected,
        ] {
            assert_eq!(RequestStatus::from_code(status.code()), Ok(status));
        }
        assert_eq!(RequestStatus::from_code(7), Err(CoreError::UnknownStatus(7)));
    }
}
