//! Validated newtype wrappers for the identifiers that flow through the core.
//!
//! Hashes are fixed-width 32-byte values (the common case for the chains this
//! crate was built against); block numbers are a thin wrapper over `u64` so
//! arithmetic on them reads as domain arithmetic rather than raw integer math.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 32-byte chain identifier: a block hash or transaction hash.
///
/// Serializes as a `0x`-prefixed lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    /// Build a hash from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash, used as the `previousBlockHash` sentinel for a
    /// genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({self})")
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Error returned when a string does not decode into a [`Hash32`].
#[derive(Debug, thiserror::Error)]
#[error("invalid hash: {0}")]
pub struct HashParseError(String);

impl FromStr for Hash32 {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(stripped).map_err(|_| HashParseError(s.to_string()))?;
        let bytes: [u8; 32] =
            decoded.try_into().map_err(|_| HashParseError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash32 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A block height on the canonical chain. Strictly monotonic in the blocks
/// the core accepts; never decreases except via an explicit rollback.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The block number one below this one, or `None` at block 0.
    #[must_use]
    pub const fn checked_prev(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod hash32_tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        let h = Hash32::new([0xab; 32]);
        let s = h.to_string();
        assert_eq!(s.parse::<Hash32>().expect("valid hash"), h);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("0xabcd".parse::<Hash32>().is_err());
    }

    #[test]
    fn zero_is_all_zero_bytes() {
        assert_eq!(Hash32::ZERO.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn serde_round_trip() {
        let h = Hash32::new([0x11; 32]);
        let json = serde_json::to_string(&h).expect("serialize");
        let back: Hash32 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(h, back);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod block_number_tests {
    use super::*;

    #[test]
    fn next_increments() {
        assert_eq!(BlockNumber(10).next(), BlockNumber(11));
    }

    #[test]
    fn checked_prev_at_zero_is_none() {
        assert_eq!(BlockNumber(0).checked_prev(), None);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(BlockNumber(5) < BlockNumber(6));
    }
}
