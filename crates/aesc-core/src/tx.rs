//! Opaque encoded transaction blobs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An encoded transaction (`tx_...`), signed or unsigned.
///
/// The channel client treats transactions as opaque: building and
/// unpacking them is the transaction codec's job. The blob is only ever
/// compared, stored and forwarded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxBlob(String);

impl TxBlob {
    /// Wrap an encoded transaction string.
    #[must_use]
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Return the encoded form as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the encoded `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the blob is empty (never valid on the wire).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TxBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TxBlob {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TxBlob {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_exposes() {
        let tx = TxBlob::new("tx_abc");
        assert_eq!(tx.as_str(), "tx_abc");
        assert_eq!(tx.to_string(), "tx_abc");
        assert!(!tx.is_empty());
    }

    #[test]
    fn serde_is_transparent() {
        let tx = TxBlob::from("tx_xyz");
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(json, "\"tx_xyz\"");
        let back: TxBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn into_inner_returns_encoded() {
        assert_eq!(TxBlob::from("tx_1").into_inner(), "tx_1");
    }
}
