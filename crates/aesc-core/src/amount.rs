//! Arbitrary-precision token amounts.
//!
//! Channel balances routinely exceed `u64` (1 AE = 10^18 aettos), so
//! amounts are `BigUint`s. On the wire they are decimal strings.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ChannelError;

/// A non-negative token amount in aettos.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigUint);

impl Amount {
    /// Zero aettos.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    /// Whether this amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// Parse a decimal string.
    pub fn from_decimal(s: &str) -> Result<Self, ChannelError> {
        BigUint::from_str(s)
            .map(Self)
            .map_err(|_| ChannelError::IllegalArgument(format!("invalid amount `{s}`")))
    }

    /// Whole AE expressed in aettos (`n * 10^18`).
    #[must_use]
    pub fn ae(n: u64) -> Self {
        Self(BigUint::from(n) * BigUint::from(10u8).pow(18))
    }

    /// Checked addition.
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    /// Checked subtraction; `None` when the result would be negative.
    #[must_use]
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(&self.0 - &other.0))
        } else {
            None
        }
    }

    /// The wire representation (decimal string).
    #[must_use]
    pub fn to_decimal(&self) -> String {
        self.0.to_str_radix(10)
    }
}

impl From<u64> for Amount {
    fn from(n: u64) -> Self {
        Self(BigUint::from(n))
    }
}

impl From<u128> for Amount {
    fn from(n: u128) -> Self {
        Self(BigUint::from(n))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The node emits small amounts as JSON numbers in a few replies.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self::from_decimal(&s).map_err(D::Error::custom),
            Raw::Number(n) => Ok(Self::from(n)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_zero() {
        assert!(Amount::zero().is_zero());
        assert!(!Amount::from(1u64).is_zero());
    }

    #[test]
    fn ae_scales_to_aettos() {
        let ten = Amount::ae(10);
        assert_eq!(ten.to_decimal(), "10000000000000000000");
    }

    #[test]
    fn from_decimal_roundtrip() {
        let a = Amount::from_decimal("340282366920938463463374607431768211456").unwrap();
        assert_eq!(a.to_decimal(), "340282366920938463463374607431768211456");
    }

    #[test]
    fn from_decimal_rejects_garbage() {
        assert!(Amount::from_decimal("ten").is_err());
        assert!(Amount::from_decimal("-5").is_err());
        assert!(Amount::from_decimal("").is_err());
    }

    #[test]
    fn checked_sub_underflow_is_none() {
        let one = Amount::from(1u64);
        let two = Amount::from(2u64);
        assert!(one.checked_sub(&two).is_none());
        assert_eq!(two.checked_sub(&one).unwrap(), one);
    }

    #[test]
    fn checked_add_accumulates() {
        let sum = Amount::ae(1).checked_add(&Amount::from(5u64));
        assert_eq!(sum.to_decimal(), "1000000000000000005");
    }

    #[test]
    fn serializes_as_decimal_string() {
        let json = serde_json::to_string(&Amount::ae(100)).unwrap();
        assert_eq!(json, "\"100000000000000000000\"");
    }

    #[test]
    fn deserializes_from_string() {
        let a: Amount = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, Amount::from(42u64));
    }

    #[test]
    fn deserializes_from_number() {
        let a: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(a, Amount::from(42u64));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Amount::from(9u64) < Amount::from(10u64));
        assert!(Amount::ae(1) > Amount::from(u64::MAX));
    }
}
