//! Shared Sender Keys Cryptographic Primitives
//!
//! Pure building blocks for the SSK engine: the hash ratchet and the AEAD
//! codec. Nothing here performs I/O or draws randomness; callers supply the
//! root chain key and the nonce, which keeps every function deterministic
//! under test.
//!
//! # Key Lifecycle
//!
//! Each (group, sender) pair owns one chain. The chain starts from 32 random
//! bytes chosen by the sender and is handed to the other members through a
//! sender key distribution record. Every step derives one message key and
//! one successor chain key.
//!
//! ```text
//! Root Chain Key (random, per group and sender)
//!        │
//!        ▼
//! HMAC-SHA256(ck, 0x02) → next Chain Key
//! HMAC-SHA256(ck, 0x01) → Message Key[key_index]
//!        │
//!        ▼
//! AES-256-GCM → nonce || ciphertext || tag
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain keys only move forward; a chain key at step N reveals nothing
//!   about keys derived before step N
//! - Group rekey replaces the root chain key with fresh randomness
//!
//! Authenticity:
//! - AES-256-GCM with a 128-bit tag
//! - Failed authentication tag -> reject message, never return plaintext
//!
//! Nonce Safety:
//! - Senders consume a fresh ratchet step per message, so a message key is
//!   never used to seal twice and the random nonce is not load-bearing

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod error;
pub mod ratchet;

pub use aead::{NONCE_SIZE, TAG_SIZE, open, seal};
pub use error::CryptoError;
pub use ratchet::{CHAIN_KEY_SIZE, MAX_SKIP, MessageKey, Ratchet};
