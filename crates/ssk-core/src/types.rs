//! Identifiers shared by the engine and the store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Public key identifying a group or a sender.
///
/// Treated as an opaque string. In practice it is the hex encoding of a
/// Curve25519 public key with a `05` type prefix, but the engine never parses
/// it: it only keys storage and locks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    /// Wrap a public key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PublicKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for PublicKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Which of the two stored ratchet slots of a (group, sender) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// The live chain, stepped by encryption and normal decryption.
    Current,
    /// The chain as of the last rotation, consulted once on decrypt retry.
    Old,
}

impl Generation {
    /// Stable one-byte tag used in storage keys.
    pub fn tag(self) -> u8 {
        match self {
            Self::Current => 0,
            Self::Old => 1,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::Old => f.write_str("old"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_display_is_raw_text() {
        let key = PublicKey::from("05abcdef");
        assert_eq!(key.to_string(), "05abcdef");
        assert_eq!(key.as_str(), "05abcdef");
    }

    #[test]
    fn generation_tags_are_distinct() {
        assert_ne!(Generation::Current.tag(), Generation::Old.tag());
    }
}
