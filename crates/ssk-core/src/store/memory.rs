#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use ssk_crypto::Ratchet;

use super::{RatchetStore, StorageError};
use crate::types::{Generation, PublicKey};

/// In-memory store for tests, simulation, and embedding.
///
/// Ratchets are grouped per (group, generation) so that whole-group removal
/// and enumeration are single map operations. All state is wrapped in
/// Arc<Mutex<>> to allow Clone and concurrent access. A poisoned mutex is
/// recovered rather than propagated: every mutation is a single map insert or
/// removal, so a panicking holder cannot leave a half-written record.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// (group, generation) -> sender -> ratchet
    ratchets: HashMap<(PublicKey, Generation), HashMap<PublicKey, Ratchet>>,

    /// group -> private key bytes
    group_private_keys: HashMap<PublicKey, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStoreInner::default())) }
    }

    /// Number of ratchets stored across all groups and generations.
    ///
    /// Useful for debugging and testing.
    pub fn ratchet_count(&self) -> usize {
        self.lock().ratchets.values().map(HashMap::len).sum()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RatchetStore for MemoryStore {
    fn ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<Option<Ratchet>, StorageError> {
        let inner = self.lock();

        Ok(inner
            .ratchets
            .get(&(group.clone(), generation))
            .and_then(|senders| senders.get(sender))
            .cloned())
    }

    fn set_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        ratchet: &Ratchet,
        generation: Generation,
    ) -> Result<(), StorageError> {
        self.lock()
            .ratchets
            .entry((group.clone(), generation))
            .or_default()
            .insert(sender.clone(), ratchet.clone());

        Ok(())
    }

    fn remove_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let key = (group.clone(), generation);
        if let Some(senders) = inner.ratchets.get_mut(&key) {
            senders.remove(sender);
            if senders.is_empty() {
                inner.ratchets.remove(&key);
            }
        }

        Ok(())
    }

    fn remove_all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError> {
        self.lock().ratchets.remove(&(group.clone(), generation));

        Ok(())
    }

    fn all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<Vec<(PublicKey, Ratchet)>, StorageError> {
        let inner = self.lock();

        Ok(inner
            .ratchets
            .get(&(group.clone(), generation))
            .map(|senders| {
                senders.iter().map(|(sender, ratchet)| (sender.clone(), ratchet.clone())).collect()
            })
            .unwrap_or_default())
    }

    fn group_private_key(&self, group: &PublicKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock().group_private_keys.get(group).cloned())
    }

    fn set_group_private_key(
        &self,
        group: &PublicKey,
        private_key: &[u8],
    ) -> Result<(), StorageError> {
        self.lock().group_private_keys.insert(group.clone(), private_key.to_vec());

        Ok(())
    }

    fn remove_group_private_key(&self, group: &PublicKey) -> Result<(), StorageError> {
        self.lock().group_private_keys.remove(group);

        Ok(())
    }

    fn all_group_public_keys(&self) -> Result<BTreeSet<PublicKey>, StorageError> {
        Ok(self.lock().group_private_keys.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> PublicKey {
        PublicKey::from("G1")
    }

    #[test]
    fn missing_ratchet_is_none() {
        let store = MemoryStore::new();
        let loaded = store.ratchet(&group(), &PublicKey::from("S1"), Generation::Current).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        let sender = PublicKey::from("S1");
        let mut ratchet = Ratchet::new([7u8; 32]);
        ratchet.advance().unwrap();

        store.set_ratchet(&group(), &sender, &ratchet, Generation::Current).unwrap();

        let loaded = store.ratchet(&group(), &sender, Generation::Current).unwrap();
        assert_eq!(loaded, Some(ratchet));
    }

    #[test]
    fn generations_are_independent() {
        let store = MemoryStore::new();
        let sender = PublicKey::from("S1");

        store.set_ratchet(&group(), &sender, &Ratchet::new([1u8; 32]), Generation::Old).unwrap();

        assert!(store.ratchet(&group(), &sender, Generation::Current).unwrap().is_none());
        assert!(store.ratchet(&group(), &sender, Generation::Old).unwrap().is_some());
    }

    #[test]
    fn remove_all_only_touches_one_generation() {
        let store = MemoryStore::new();
        for name in ["S1", "S2"] {
            let sender = PublicKey::from(name);
            let ratchet = Ratchet::new([1u8; 32]);
            store.set_ratchet(&group(), &sender, &ratchet, Generation::Current).unwrap();
            store.set_ratchet(&group(), &sender, &ratchet, Generation::Old).unwrap();
        }

        store.remove_all_ratchets(&group(), Generation::Current).unwrap();

        assert!(store.all_ratchets(&group(), Generation::Current).unwrap().is_empty());
        assert_eq!(store.all_ratchets(&group(), Generation::Old).unwrap().len(), 2);
        assert_eq!(store.ratchet_count(), 2);
    }

    #[test]
    fn remove_ratchet_touches_one_triple() {
        let store = MemoryStore::new();
        let s1 = PublicKey::from("S1");
        let s2 = PublicKey::from("S2");
        let ratchet = Ratchet::new([1u8; 32]);
        store.set_ratchet(&group(), &s1, &ratchet, Generation::Current).unwrap();
        store.set_ratchet(&group(), &s1, &ratchet, Generation::Old).unwrap();
        store.set_ratchet(&group(), &s2, &ratchet, Generation::Current).unwrap();

        store.remove_ratchet(&group(), &s1, Generation::Current).unwrap();

        assert!(store.ratchet(&group(), &s1, Generation::Current).unwrap().is_none());
        assert!(store.ratchet(&group(), &s1, Generation::Old).unwrap().is_some());
        assert!(store.ratchet(&group(), &s2, Generation::Current).unwrap().is_some());

        store.remove_ratchet(&group(), &s2, Generation::Current).unwrap();
        assert_eq!(store.ratchet_count(), 1);
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();

        clone.set_group_private_key(&group(), &[9u8; 32]).unwrap();

        assert_eq!(store.group_private_key(&group()).unwrap(), Some(vec![9u8; 32]));
    }

    #[test]
    fn group_public_keys_follow_private_keys() {
        let store = MemoryStore::new();
        store.set_group_private_key(&group(), &[1u8; 32]).unwrap();
        store.set_group_private_key(&PublicKey::from("G2"), &[2u8; 32]).unwrap();

        assert_eq!(store.all_group_public_keys().unwrap().len(), 2);

        store.remove_group_private_key(&group()).unwrap();

        let known = store.all_group_public_keys().unwrap();
        assert!(!known.contains(&group()));
        assert!(known.contains(&PublicKey::from("G2")));
    }
}
