//! Message sealing using AES-256-GCM
//!
//! All functions are pure: the nonce must be provided by the caller. The
//! sealed body is self-contained apart from the key index, which travels in
//! the enclosing envelope.
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use super::{error::CryptoError, ratchet::MessageKey};

/// AES-GCM nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Seal `plaintext` under `message_key`.
///
/// Returns `nonce || ciphertext || tag`.
///
/// # Security
///
/// - Caller MUST provide a fresh nonce from a CSPRNG in production
/// - A message key must seal at most one message
pub fn seal(message_key: &MessageKey, nonce: [u8; NONCE_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(message_key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
        unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
    };

    let mut body = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);
    body
}

/// Open a body produced by [`seal`].
///
/// # Errors
///
/// - `Truncated`: body shorter than nonce plus tag
/// - `AuthenticationFailed`: wrong key or tampered body
pub fn open(message_key: &MessageKey, body: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let min = NONCE_SIZE + TAG_SIZE;
    if body.len() < min {
        return Err(CryptoError::Truncated { len: body.len(), min });
    }

    let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(message_key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
