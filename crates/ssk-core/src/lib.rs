//! Shared Sender Keys Engine
//!
//! Per-(group, sender) symmetric ratchets for closed-group messaging without
//! pairwise sessions. A sender steps its own chain once per message and seals
//! with the fresh key; receivers hold copies of every member's chain and catch
//! them up to the key index carried with each message.
//!
//! # Architecture
//!
//! ```text
//!   encrypt(plaintext)               decrypt(body, key_index)
//!          │                                  │
//!          ▼                                  ▼
//!   lock (group, sender, Current)    for generation in [Current, Old]:
//!   load → step → persist              lock (group, sender, generation)
//!          │                            load → catch up → persist
//!          ▼                                  │
//!   seal(latest key, nonce)          open against last 16 keys
//! ```
//!
//! The engine owns no ratchet state. Every operation reads from the
//! [`RatchetStore`], and every step is persisted before the derived key is
//! used. Concurrent read-modify-write cycles on the same triple are
//! serialized by [`RatchetLocks`].
//!
//! # Components
//!
//! - [`RatchetEngine`]: Orchestrates generation, encryption, decryption, and
//!   group lifecycle
//! - [`RatchetStore`]: Storage trait, with [`MemoryStore`], [`RedbStore`], and
//!   the fault-injecting [`ChaoticStore`]
//! - [`ResyncDelegate`]: Notified when local state cannot decrypt
//! - [`SenderKeyDistribution`]: Record carrying a chain to other members
//! - [`Environment`]: Randomness source, [`SystemEnv`] in production

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod engine;
pub mod env;
pub mod error;
pub mod group;
pub mod locks;
pub mod resync;
pub mod sender_key;
pub mod store;
mod system_env;
pub mod types;

pub use engine::{DECRYPTION_WINDOW, RatchetEngine};
pub use env::Environment;
pub use error::RatchetError;
pub use group::GroupKeyPair;
pub use locks::RatchetLocks;
pub use resync::ResyncDelegate;
pub use sender_key::SenderKeyDistribution;
pub use ssk_crypto::{MAX_SKIP, MessageKey, Ratchet};
pub use store::{ChaoticStore, MemoryStore, RatchetStore, RedbStore, StorageError};
pub use system_env::SystemEnv;
pub use types::{Generation, PublicKey};
