//! Storage abstraction for ratchet state
//!
//! Trait-based abstraction for persisting ratchets and group identities. The
//! trait is synchronous: the engine performs blocking calls on the caller's
//! thread.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::collections::BTreeSet;

pub use chaotic::{ChaoticStore, StoreOperation};
pub use error::StorageError;
pub use memory::MemoryStore;
use ssk_crypto::Ratchet;

pub use self::redb::RedbStore;
use crate::types::{Generation, PublicKey};

/// Storage for ratchets, group private keys, and the set of known groups.
///
/// Must be Clone (the engine and the application may hold handles to the same
/// store), Send + Sync (thread-safe), and synchronous. Implementations share
/// internal state via Arc, so clones access the same underlying storage.
///
/// The store performs no locking across calls. Serializing the
/// read-step-persist cycle of one (group, sender, generation) triple is the
/// engine's job.
pub trait RatchetStore: Clone + Send + Sync + 'static {
    /// Load the ratchet of `sender` in `group` for `generation`.
    ///
    /// Returns `None` if no ratchet exists for this triple.
    fn ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<Option<Ratchet>, StorageError>;

    /// Store a ratchet, overwriting any existing one for the triple.
    fn set_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        ratchet: &Ratchet,
        generation: Generation,
    ) -> Result<(), StorageError>;

    /// Remove the ratchet of `sender` in `group` for `generation`.
    ///
    /// No-op if no ratchet exists for this triple.
    fn remove_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError>;

    /// Remove every sender's ratchet in `group` for `generation`.
    fn remove_all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError>;

    /// All (sender, ratchet) pairs in `group` for `generation`.
    ///
    /// Order is not guaranteed.
    fn all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<Vec<(PublicKey, Ratchet)>, StorageError>;

    /// Stored private key of a group. `None` if the group is unknown.
    fn group_private_key(&self, group: &PublicKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a group's private key, making the group known.
    fn set_group_private_key(
        &self,
        group: &PublicKey,
        private_key: &[u8],
    ) -> Result<(), StorageError>;

    /// Remove a group's private key. No-op if the group is unknown.
    fn remove_group_private_key(&self, group: &PublicKey) -> Result<(), StorageError>;

    /// Public keys of every group with a stored private key.
    fn all_group_public_keys(&self) -> Result<BTreeSet<PublicKey>, StorageError>;
}
