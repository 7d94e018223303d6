//! Identifiers used throughout the custody ledger.
//!
//! Products are keyed by caller-supplied strings. Accounts and the ledger
//! endpoint use 20-byte identifiers written as `0x`-prefixed lowercase hex;
//! an account is derived from the ed25519 key that signs for it.

use std::{fmt, str::FromStr};

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CustodyError, constants};

fn parse_hex20(s: &str, what: &'static str) -> Result<[u8; 20], CustodyError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != 40 {
        return Err(CustodyError::InvalidInput {
            field: what,
            reason: format!("expected 40 hex digits, got {}", digits.len()),
        });
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(digits, &mut out).map_err(|e| CustodyError::InvalidInput {
        field: what,
        reason: e.to_string(),
    })?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// ProductId
// ---------------------------------------------------------------------------

/// Caller-supplied product key. Unique across the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Validate and wrap a product key.
    ///
    /// The key must be non-empty after trimming and at most
    /// [`constants::MAX_PRODUCT_ID_BYTES`] long. The stored key is not trimmed.
    pub fn new(id: impl Into<String>) -> Result<Self, CustodyError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CustodyError::InvalidInput {
                field: "product_id",
                reason: "required".to_string(),
            });
        }
        if id.len() > constants::MAX_PRODUCT_ID_BYTES {
            return Err(CustodyError::InvalidInput {
                field: "product_id",
                reason: format!(
                    "{} bytes exceeds limit of {}",
                    id.len(),
                    constants::MAX_PRODUCT_ID_BYTES
                ),
            });
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProductId {
    type Error = CustodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl FromStr for ProductId {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A participant account: the last 20 bytes of `SHA-256(ed25519 pubkey)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId([u8; 20]);

impl AccountId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive the account controlled by `key`.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// `0x1234…abcd` form for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        format!("0x{}…{}", hex::encode(&self.0[..2]), hex::encode(&self.0[18..]))
    }
}

impl FromStr for AccountId {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex20(s, "account").map(Self)
    }
}

impl TryFrom<String> for AccountId {
    type Error = CustodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// LedgerAddress
// ---------------------------------------------------------------------------

/// Address of the one ledger endpoint a client binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerAddress([u8; 20]);

impl LedgerAddress {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for LedgerAddress {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex20(s, "ledger_address").map(Self)
    }
}

impl TryFrom<String> for LedgerAddress {
    type Error = CustodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LedgerAddress> for String {
    fn from(addr: LedgerAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// Hash identifying a committed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(pub [u8; 32]);

impl TryFrom<String> for TxHash {
    type Error = CustodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.strip_prefix("0x").unwrap_or(&value);
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out).map_err(|e| CustodyError::InvalidInput {
            field: "tx_hash",
            reason: e.to_string(),
        })?;
        Ok(Self(out))
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.to_string()
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Random identifiers for unit tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl AccountId {
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random::<[u8; 20]>())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl LedgerAddress {
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random::<[u8; 20]>())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
