//! Prefixed on-chain identifiers.
//!
//! æternity object identifiers are base58 payloads carrying a
//! two-letter type prefix (`ak_` accounts, `ct_` contracts). The client
//! never decodes payloads beyond prefix validation; the transaction
//! codec owns full decoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::ChannelError;

/// Account address (`ak_...`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

/// Contract address (`ct_...`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

fn check_prefix(value: &str, prefix: &str) -> Result<(), ChannelError> {
    if value.len() > prefix.len() && value.starts_with(prefix) {
        Ok(())
    } else {
        Err(ChannelError::IllegalArgument(format!(
            "expected `{prefix}` identifier, got `{value}`"
        )))
    }
}

impl AccountId {
    /// Parse and validate an `ak_` account address.
    pub fn new(value: impl Into<String>) -> Result<Self, ChannelError> {
        let value = value.into();
        check_prefix(&value, "ak_")?;
        Ok(Self(value))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base58 payload with the `ak_` prefix stripped.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.0[3..]
    }
}

impl ContractId {
    /// Parse and validate a `ct_` contract address.
    pub fn new(value: impl Into<String>) -> Result<Self, ChannelError> {
        let value = value.into();
        check_prefix(&value, "ct_")?;
        Ok(Self(value))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the address of a contract created off-chain by `owner` at
    /// off-chain `round`.
    ///
    /// The address is a deterministic function of both inputs: the
    /// digest of the owner's payload concatenated with the round in
    /// big-endian, base58-encoded under the `ct_` prefix. Both parties
    /// compute the same address without a node round-trip.
    #[must_use]
    pub fn compute(owner: &AccountId, round: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(owner.payload().as_bytes());
        hasher.update(round.to_be_bytes());
        let digest = hasher.finalize();
        Self(format!("ct_{}", bs58::encode(digest).into_string()))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContractId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
