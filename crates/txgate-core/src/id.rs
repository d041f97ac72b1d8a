//! Identifier newtypes shared by cache addressing and event decoding.
//!
//! Every identifier is validated on construction, so a value of one of these
//! types is always well-formed. Hex identifiers are normalized to lowercase:
//! upstream services send checksummed addresses, clients may not, and cache
//! keys must agree either way.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Numeric chain identifier, kept in its decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidChainId(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// 20-byte account address (`0x` + 40 hex digits), lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        match normalize_hex(&value, 40) {
            Some(normalized) => Ok(Self(normalized)),
            None => Err(CoreError::InvalidAddress(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 32-byte hash (`0x` + 64 hex digits), lowercased.
///
/// Used for transaction hashes, safe transaction hashes and message hashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        match normalize_hex(&value, 64) {
            Some(normalized) => Ok(Self(normalized)),
            None => Err(CoreError::InvalidHash(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_hex(value: &str, digits: usize) -> Option<String> {
    let body = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    if body.len() != digits || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", body.to_ascii_lowercase()))
}

macro_rules! string_newtype_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype_impls!(ChainId);
string_newtype_impls!(Address);
string_newtype_impls!(TxHash);
