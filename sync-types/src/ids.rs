//! Identity types for bucket-sync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical storage account a region's client authenticates as.
///
/// Regions without override credentials share the base account. Two regions
/// with the same override access key are the same account, whatever their
/// region ids are.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountId {
    /// The process-wide base credentials.
    Base,
    /// An account identified by its override access key.
    AccessKey(String),
}

impl AccountId {
    /// Derive the account identity from an optional override access key.
    pub fn from_override(access_key: Option<&str>) -> Self {
        match access_key {
            Some(key) if !key.is_empty() => Self::AccessKey(key.to_string()),
            _ => Self::Base,
        }
    }

    /// Check whether this is the base account.
    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "BASE"),
            Self::AccessKey(key) => write!(f, "{}", key),
        }
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

/// Opaque content-equality token reported by the storage API (an ETag).
///
/// Only compared for equality. It is not a cryptographic digest: multipart
/// uploads produce ETags that are not content hashes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a raw ETag value as returned by the API (quotes included).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_without_override_is_base() {
        assert_eq!(AccountId::from_override(None), AccountId::Base);
        assert_eq!(AccountId::from_override(Some("")), AccountId::Base);
        assert_eq!(AccountId::Base.to_string(), "BASE");
    }

    #[test]
    fn account_with_override_uses_access_key() {
        let account = AccountId::from_override(Some("AKIACHINA"));
        assert_eq!(account, AccountId::AccessKey("AKIACHINA".into()));
        assert_eq!(account.to_string(), "AKIACHINA");
        assert!(!account.is_base());
    }

    #[test]
    fn regions_sharing_a_key_share_an_account() {
        let a = AccountId::from_override(Some("AKIASHARED"));
        let b = AccountId::from_override(Some("AKIASHARED"));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_equality_is_exact() {
        assert_eq!(Fingerprint::from("\"abc\""), Fingerprint::from("\"abc\""));
        assert_ne!(Fingerprint::from("\"abc\""), Fingerprint::from("abc"));
    }
}
