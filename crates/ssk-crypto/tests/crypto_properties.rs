//! Property-based tests for ratchet stepping and sealing
//!
//! 1. **Known answer**: stepping the all-zero chain matches HMAC-SHA256 vectors
//! 2. **Round-trip**: open(seal(m)) == m for any key, nonce, and message
//! 3. **Integrity**: any single-bit flip in a body fails authentication
//! 4. **Lookup**: every retained key is found at the index it was derived at

use proptest::prelude::*;
use ssk_crypto::{CryptoError, MessageKey, NONCE_SIZE, Ratchet, TAG_SIZE, open, seal};

#[test]
fn zero_chain_known_answer() {
    let mut ratchet = Ratchet::new([0u8; 32]);
    ratchet.advance().unwrap();

    assert_eq!(
        hex::encode(ratchet.message_keys()[0].as_bytes()),
        "3d7afb663124ecbf2c953f863d4fc8796eeb2d372b64aad58697ec5264649cdb"
    );
    assert_eq!(
        hex::encode(ratchet.chain_key()),
        "4ee7be0c7872360ca67414608081e9bd60fd580a7bbd209701d2a5a0b4316d0d"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_seal_open_roundtrip(
        key in any::<[u8; 32]>(),
        nonce in any::<[u8; NONCE_SIZE]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..1024),
    ) {
        let key = MessageKey::from_bytes(key);
        let body = seal(&key, nonce, &plaintext);

        prop_assert_eq!(body.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
        prop_assert_eq!(open(&key, &body).unwrap(), plaintext);
    }

    #[test]
    fn prop_bit_flip_fails(
        key in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        flip in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let key = MessageKey::from_bytes(key);
        let mut body = seal(&key, [7u8; NONCE_SIZE], &plaintext);
        let at = flip.index(body.len());
        body[at] ^= 1 << bit;

        prop_assert_eq!(open(&key, &body), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn prop_short_bodies_are_truncated(
        key in any::<[u8; 32]>(),
        body in prop::collection::vec(any::<u8>(), 0..NONCE_SIZE + TAG_SIZE),
    ) {
        let key = MessageKey::from_bytes(key);
        let result = open(&key, &body);

        prop_assert!(
            matches!(result, Err(CryptoError::Truncated { .. })),
            "expected Truncated, got {result:?}"
        );
    }

    #[test]
    fn prop_retained_keys_found_by_index(
        chain_key in any::<[u8; 32]>(),
        skip in 0u32..10,
        steps in 1u32..30,
    ) {
        // A chain received mid-stream at `skip` holds keys from `skip` onward
        let mut ratchet = Ratchet::from_parts(chain_key, skip, Vec::new());
        for _ in 0..steps {
            ratchet.advance().unwrap();
        }

        for (offset, key) in ratchet.message_keys().iter().enumerate() {
            prop_assert_eq!(ratchet.message_key(skip + offset as u32), Some(key));
        }
        if skip > 0 {
            prop_assert_eq!(ratchet.message_key(skip - 1), None);
        }
        prop_assert_eq!(ratchet.message_key(skip + steps), None);
    }
}
