//! Sender key distribution records.
//!
//! A record carries one sender's chain to the other members of a group. The
//! receiver stores it as a fresh Current ratchet with no message keys, so it
//! can only derive keys from `key_index` onward.
//!
//! # Wire Format
//!
//! CBOR map with the chain key as hex text:
//!
//! ```text
//! {
//!   "chain_key":         text (64 hex chars),
//!   "key_index":         u32,
//!   "group_public_key":  text,
//!   "sender_public_key": text,
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use ssk_crypto::{CHAIN_KEY_SIZE, Ratchet};
use zeroize::Zeroize;

use crate::{error::RatchetError, types::PublicKey};

/// A sender's chain key and position, addressed to one group.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderKeyDistribution {
    chain_key: [u8; CHAIN_KEY_SIZE],
    key_index: u32,
    group_public_key: PublicKey,
    sender_public_key: PublicKey,
}

#[derive(Serialize, Deserialize)]
struct WireRecord {
    chain_key: String,
    key_index: u32,
    group_public_key: PublicKey,
    sender_public_key: PublicKey,
}

impl SenderKeyDistribution {
    /// Record describing `ratchet` as the chain of `sender` in `group`.
    pub fn from_ratchet(group: PublicKey, sender: PublicKey, ratchet: &Ratchet) -> Self {
        Self {
            chain_key: *ratchet.chain_key(),
            key_index: ratchet.key_index(),
            group_public_key: group,
            sender_public_key: sender,
        }
    }

    /// Build a record from its fields.
    pub fn new(
        chain_key: [u8; CHAIN_KEY_SIZE],
        key_index: u32,
        group_public_key: PublicKey,
        sender_public_key: PublicKey,
    ) -> Self {
        Self { chain_key, key_index, group_public_key, sender_public_key }
    }

    /// Ratchet a receiver stores for this record: the carried chain at the
    /// carried index, with no message keys.
    pub fn to_ratchet(&self) -> Ratchet {
        Ratchet::from_parts(self.chain_key, self.key_index, Vec::new())
    }

    /// Chain key.
    pub fn chain_key(&self) -> &[u8; CHAIN_KEY_SIZE] {
        &self.chain_key
    }

    /// Key index of the next key the chain will derive.
    pub fn key_index(&self) -> u32 {
        self.key_index
    }

    /// Group the chain belongs to.
    pub fn group_public_key(&self) -> &PublicKey {
        &self.group_public_key
    }

    /// Sender owning the chain.
    pub fn sender_public_key(&self) -> &PublicKey {
        &self.sender_public_key
    }

    /// Serialize to CBOR.
    ///
    /// # Errors
    ///
    /// - `RatchetError::InvalidSenderKey` if CBOR encoding fails
    pub fn encode(&self) -> Result<Vec<u8>, RatchetError> {
        let record = WireRecord {
            chain_key: hex::encode(self.chain_key),
            key_index: self.key_index,
            group_public_key: self.group_public_key.clone(),
            sender_public_key: self.sender_public_key.clone(),
        };

        let mut encoded = Vec::new();
        let result = ciborium::ser::into_writer(&record, &mut encoded)
            .map_err(|e| RatchetError::InvalidSenderKey(format!("CBOR encode failed: {e}")));
        let mut chain_key = record.chain_key;
        chain_key.zeroize();
        result?;
        Ok(encoded)
    }

    /// Deserialize from CBOR.
    ///
    /// # Errors
    ///
    /// - `RatchetError::InvalidSenderKey` if the bytes are not a record or the
    ///   chain key is not 32 bytes of hex
    pub fn decode(bytes: &[u8]) -> Result<Self, RatchetError> {
        let mut record: WireRecord = ciborium::de::from_reader(bytes)
            .map_err(|e| RatchetError::InvalidSenderKey(format!("CBOR decode failed: {e}")))?;

        let decoded = hex::decode(&record.chain_key);
        record.chain_key.zeroize();
        let mut decoded =
            decoded.map_err(|e| RatchetError::InvalidSenderKey(format!("chain key: {e}")))?;

        let chain_key: Result<[u8; CHAIN_KEY_SIZE], _> = decoded.as_slice().try_into();
        let len = decoded.len();
        decoded.zeroize();
        let chain_key = chain_key.map_err(|_| {
            RatchetError::InvalidSenderKey(format!(
                "chain key is {len} bytes, expected {CHAIN_KEY_SIZE}"
            ))
        })?;

        Ok(Self {
            chain_key,
            key_index: record.key_index,
            group_public_key: record.group_public_key,
            sender_public_key: record.sender_public_key,
        })
    }
}

impl fmt::Debug for SenderKeyDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderKeyDistribution")
            .field("key_index", &self.key_index)
            .field("group_public_key", &self.group_public_key)
            .field("sender_public_key", &self.sender_public_key)
            .finish_non_exhaustive()
    }
}

impl Drop for SenderKeyDistribution {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SenderKeyDistribution {
        SenderKeyDistribution::new([9u8; 32], 7, PublicKey::from("G1"), PublicKey::from("S1"))
    }

    #[test]
    fn cbor_round_trip() {
        let original = record();
        let decoded = SenderKeyDistribution::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn to_ratchet_has_no_message_keys() {
        let ratchet = record().to_ratchet();
        assert_eq!(ratchet.chain_key(), &[9u8; 32]);
        assert_eq!(ratchet.key_index(), 7);
        assert!(ratchet.message_keys().is_empty());
    }

    #[test]
    fn from_ratchet_captures_position() {
        let mut ratchet = Ratchet::new([1u8; 32]);
        ratchet.advance_to(1).unwrap();
        let dist =
            SenderKeyDistribution::from_ratchet(PublicKey::from("G1"), PublicKey::from("S1"), &ratchet);

        assert_eq!(dist.key_index(), 2);
        assert_eq!(dist.chain_key(), ratchet.chain_key());
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = SenderKeyDistribution::decode(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(RatchetError::InvalidSenderKey(_))));
    }

    #[test]
    fn decode_rejects_short_chain_key() {
        let wire = WireRecord {
            chain_key: hex::encode([1u8; 16]),
            key_index: 0,
            group_public_key: PublicKey::from("G1"),
            sender_public_key: PublicKey::from("S1"),
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&wire, &mut bytes).unwrap();

        let result = SenderKeyDistribution::decode(&bytes);
        assert!(matches!(result, Err(RatchetError::InvalidSenderKey(_))));
    }

    #[test]
    fn debug_hides_chain_key() {
        let debug = format!("{:?}", record());
        assert!(!debug.contains("chain_key"));
        assert!(debug.contains("key_index: 7"));
    }
}
