//! Key identifiers and key records.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;

/// Length of a short key ID in hex characters.
const KEY_ID_LEN: usize = 16;

/// Length of a full key fingerprint in hex characters.
const FINGERPRINT_LEN: usize = 40;

/// A normalized 16-hex-character key identifier.
///
/// Parsing accepts either a key ID or a 40-character fingerprint (whose last
/// 16 characters are the key ID), in any case, and normalizes to uppercase.
///
/// # Example
///
/// ```
/// use gitops_state_trust::KeyId;
///
/// let short: KeyId = "4aee18f83afdeb23".parse().unwrap();
/// let long: KeyId = "5DE3E0509C47EA3CF04A42D34AEE18F83AFDEB23".parse().unwrap();
///
/// assert_eq!(short, long);
/// assert_eq!(short.as_str(), "4AEE18F83AFDEB23");
/// assert!("not-a-key".parse::<KeyId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Parses and normalizes a key ID or fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidKeyId`] if `value` is neither a 16- nor a
    /// 40-character hex string.
    pub fn parse(value: &str) -> Result<Self, TrustError> {
        let trimmed = value.trim();
        let is_hex = trimmed.chars().all(|c| c.is_ascii_hexdigit());
        match trimmed.len() {
            KEY_ID_LEN if is_hex => Ok(Self(trimmed.to_ascii_uppercase())),
            FINGERPRINT_LEN if is_hex => {
                Ok(Self(trimmed[FINGERPRINT_LEN - KEY_ID_LEN..].to_ascii_uppercase()))
            },
            _ => Err(TrustError::InvalidKeyId { value: value.to_owned() }),
        }
    }

    /// Returns the normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for KeyId {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KeyId {
    type Error = TrustError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.0
    }
}

/// A declared key that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRecord {
    /// Identifier, equal to the one parsed from `material`.
    pub key_id: KeyId,
    /// ASCII-armored public key material.
    pub material: Bytes,
}

/// A key present in the keyring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledKey {
    /// Key identifier.
    pub key_id: KeyId,
    /// Whether the keyring holds the private half. Secret keys are never
    /// reconciled.
    pub is_secret: bool,
}

impl InstalledKey {
    /// A public-only key.
    #[must_use]
    pub fn public(key_id: KeyId) -> Self {
        Self { key_id, is_secret: false }
    }

    /// A key with a private half.
    #[must_use]
    pub fn secret(key_id: KeyId) -> Self {
        Self { key_id, is_secret: true }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::short_upper("4AEE18F83AFDEB23", "4AEE18F83AFDEB23")]
    #[case::short_lower("4aee18f83afdeb23", "4AEE18F83AFDEB23")]
    #[case::padded("  4AEE18F83AFDEB23\n", "4AEE18F83AFDEB23")]
    #[case::fingerprint("5DE3E0509C47EA3CF04A42D34AEE18F83AFDEB23", "4AEE18F83AFDEB23")]
    fn test_parse_valid(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(KeyId::parse(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::too_short("4AEE18F8")]
    #[case::non_hex("4AEE18F83AFDEB2Z")]
    #[case::seventeen("4AEE18F83AFDEB231")]
    #[case::uid("Alice <alice@example.com>")]
    fn test_parse_invalid(#[case] input: &str) {
        let err = KeyId::parse(input).unwrap_err();
        assert!(matches!(err, TrustError::InvalidKeyId { value } if value == input));
    }

    #[test]
    fn test_serde_round_trip_normalizes() {
        let id: KeyId = serde_json::from_str("\"4aee18f83afdeb23\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"4AEE18F83AFDEB23\"");
        assert!(serde_json::from_str::<KeyId>("\"nope\"").is_err());
    }
}
