//! Hash ratchet for forward-secure message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: a chain key cannot be wound backward
//! - Key Uniqueness: each step produces a unique message key
//! - Determinism: the same chain key always produces the same key sequence

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Size of a chain key and of a message key in bytes
pub const CHAIN_KEY_SIZE: usize = 32;

/// HMAC input for deriving a message key
const MESSAGE_KEY_SEED: &[u8] = &[0x01];

/// HMAC input for deriving the next chain key
const CHAIN_KEY_SEED: &[u8] = &[0x02];

/// Maximum number of steps a single catch-up may take.
///
/// Bounds the work a receiver does for a message claiming a far-future key
/// index.
pub const MAX_SKIP: u32 = 1000;

/// A message key derived from the ratchet.
///
/// Used for exactly one seal by the sender, and opened by receivers.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageKey {
    key: [u8; CHAIN_KEY_SIZE],
}

impl MessageKey {
    /// Wrap raw key bytes (used when restoring a stored ratchet).
    pub fn from_bytes(key: [u8; CHAIN_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// 32-byte symmetric key for AES-256-GCM.
    pub fn as_bytes(&self) -> &[u8; CHAIN_KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey(..)")
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// One sender's hash-ratchet chain within one group.
///
/// Callers advance a loaded copy and persist it before anything uses the new
/// key.
///
/// # Invariants
///
/// - `key_index` only increases
/// - `message_keys` is append-only; the last entry is the key for
///   `key_index - 1`, and a ratchet holding `n` keys holds the keys for
///   indices `key_index - n .. key_index`
#[derive(Clone, PartialEq, Eq)]
pub struct Ratchet {
    chain_key: [u8; CHAIN_KEY_SIZE],
    key_index: u32,
    message_keys: Vec<MessageKey>,
}

impl Ratchet {
    /// Create a root ratchet at key index 0 with no derived keys.
    pub fn new(chain_key: [u8; CHAIN_KEY_SIZE]) -> Self {
        Self { chain_key, key_index: 0, message_keys: Vec::new() }
    }

    /// Rebuild a ratchet from its stored or distributed parts.
    ///
    /// A ratchet received from a peer has the peer's `key_index` and no
    /// message keys; a restored ratchet carries its full key history.
    pub fn from_parts(
        chain_key: [u8; CHAIN_KEY_SIZE],
        key_index: u32,
        message_keys: Vec<MessageKey>,
    ) -> Self {
        debug_assert!(message_keys.len() <= key_index as usize);
        Self { chain_key, key_index, message_keys }
    }

    /// Current chain key.
    pub fn chain_key(&self) -> &[u8; CHAIN_KEY_SIZE] {
        &self.chain_key
    }

    /// Number of steps taken along the chain.
    pub fn key_index(&self) -> u32 {
        self.key_index
    }

    /// Every message key this instance derived, oldest first.
    pub fn message_keys(&self) -> &[MessageKey] {
        &self.message_keys
    }

    /// Advance the chain by one step.
    ///
    /// Derives `HMAC-SHA256(chain_key, 0x01)` as the next message key and
    /// `HMAC-SHA256(chain_key, 0x02)` as the next chain key, appending the
    /// message key to the history.
    pub fn advance(&mut self) -> Result<(), CryptoError> {
        let key_index = self
            .key_index
            .checked_add(1)
            .ok_or(CryptoError::KeyIndexOverflow { current: self.key_index })?;

        self.message_keys.push(MessageKey { key: hmac(&self.chain_key, MESSAGE_KEY_SEED) });

        let mut next_chain_key = hmac(&self.chain_key, CHAIN_KEY_SEED);
        self.chain_key.zeroize();
        self.chain_key = next_chain_key;
        next_chain_key.zeroize();

        self.key_index = key_index;
        Ok(())
    }

    /// Advance until the key for `target` is derived.
    ///
    /// Does nothing if it already is. The distance is checked before any step,
    /// so a rejected target leaves the ratchet untouched.
    ///
    /// # Errors
    ///
    /// - `TooFarAhead` if reaching `target` takes more than [`MAX_SKIP`] steps
    /// - `KeyIndexOverflow` if the chain is exhausted on the way
    pub fn advance_to(&mut self, target: u32) -> Result<(), CryptoError> {
        if target < self.key_index {
            return Ok(());
        }
        if target - self.key_index >= MAX_SKIP {
            return Err(CryptoError::TooFarAhead { current: self.key_index, requested: target });
        }

        while self.key_index <= target {
            self.advance()?;
        }
        Ok(())
    }

    /// Most recently derived message key, if any step was taken.
    pub fn latest_message_key(&self) -> Option<&MessageKey> {
        self.message_keys.last()
    }

    /// Message key derived at `key_index`, if this instance retained it.
    pub fn message_key(&self, key_index: u32) -> Option<&MessageKey> {
        if key_index >= self.key_index {
            return None;
        }
        let distance = (self.key_index - key_index) as usize;
        let len = self.message_keys.len();
        if distance > len {
            return None;
        }
        self.message_keys.get(len - distance)
    }

    /// Up to `window` message keys, most recent first.
    pub fn recent_message_keys(&self, window: usize) -> impl Iterator<Item = &MessageKey> {
        self.message_keys.iter().rev().take(window)
    }
}

impl fmt::Debug for Ratchet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ratchet")
            .field("key_index", &self.key_index)
            .field("message_keys", &self.message_keys.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Ratchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

fn hmac(chain_key: &[u8; CHAIN_KEY_SIZE], seed: &[u8]) -> [u8; CHAIN_KEY_SIZE] {
    let Ok(mut mac) = HmacSha256::new_from_slice(chain_key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(seed);
    let result = mac.finalize().into_bytes();

    let mut key = [0u8; CHAIN_KEY_SIZE];
    key.copy_from_slice(&result);
    key
}
