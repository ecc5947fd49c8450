//! Closed-group identity key pair.

use std::fmt;

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::{env::Environment, error::RatchetError, types::PublicKey};

/// Type prefix of a Curve25519 public key in its text form.
const KEY_TYPE_PREFIX: &str = "05";

/// Size of a group private key in bytes.
pub const GROUP_PRIVATE_KEY_SIZE: usize = 32;

/// X25519 key pair identifying a closed group.
///
/// The public key doubles as the group's address; the private key is stored
/// so that any member can hand the identity to members added later.
pub struct GroupKeyPair {
    public_key: PublicKey,
    secret: StaticSecret,
}

impl GroupKeyPair {
    /// Generate a fresh group identity.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let secret = StaticSecret::from(env.random_key());
        let public_key = encode_public_key(&X25519PublicKey::from(&secret));
        Self { public_key, secret }
    }

    /// Rebuild a key pair from the group's known public key and its stored
    /// private key.
    ///
    /// # Errors
    ///
    /// - `RatchetError::InvalidGroupKey` if the private key is not 32 bytes
    pub fn from_parts(public_key: PublicKey, private_key: &[u8]) -> Result<Self, RatchetError> {
        let bytes: [u8; GROUP_PRIVATE_KEY_SIZE] =
            private_key.try_into().map_err(|_| RatchetError::InvalidGroupKey {
                group: public_key.clone(),
                reason: format!(
                    "expected {GROUP_PRIVATE_KEY_SIZE} bytes, got {}",
                    private_key.len()
                ),
            })?;
        Ok(Self { public_key, secret: StaticSecret::from(bytes) })
    }

    /// Group public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Raw private key bytes, as persisted in the store.
    pub fn private_key_bytes(&self) -> [u8; GROUP_PRIVATE_KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// X25519 public key derived from the private key.
    pub fn derived_public_key(&self) -> PublicKey {
        encode_public_key(&X25519PublicKey::from(&self.secret))
    }
}

impl fmt::Debug for GroupKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

fn encode_public_key(key: &X25519PublicKey) -> PublicKey {
    PublicKey::new(format!("{KEY_TYPE_PREFIX}{}", hex::encode(key.as_bytes())))
}
