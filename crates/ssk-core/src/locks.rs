//! Per-ratchet mutual exclusion.
//!
//! Two callers stepping the same ratchet from the same stored state would
//! derive the same "next" key independently and persist conflicting chains.
//! Every read-step-persist cycle therefore runs under the lock of its
//! (group, sender, generation) triple. Distinct triples never contend.

#![allow(clippy::disallowed_types, reason = "Synchronous critical sections only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::types::{Generation, PublicKey};

type LockKey = (PublicKey, PublicKey, Generation);

/// Registry of per-triple mutexes.
///
/// The registry mutex is held only long enough to find or create a slot; the
/// slot mutex is held for the caller's critical section. Slots are never
/// handed out as guards, so a critical section cannot outlive its closure.
///
/// # Invariants
///
/// - At most one critical section per triple runs at a time
/// - Callers never nest two critical sections except Current then Old for the
///   same (group, sender), which keeps the lock order acyclic
#[derive(Default)]
pub struct RatchetLocks {
    slots: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl RatchetLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `critical` while holding the lock of one triple.
    pub fn with_lock<R>(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
        critical: impl FnOnce() -> R,
    ) -> R {
        let slot = self.slot(group, sender, generation);
        // The guarded value is (), so a poisoned slot carries no broken state.
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        critical()
    }

    /// Drop idle slots belonging to `group`.
    ///
    /// Slots currently held by another caller are kept.
    pub fn forget_group(&self, group: &PublicKey) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(slot_group, _, _), slot| slot_group != group || Arc::strong_count(slot) > 1);
    }

    /// Number of slots in the registry.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no slot has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, group: &PublicKey, sender: &PublicKey, generation: Generation) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots.entry((group.clone(), sender.clone(), generation)).or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    #[test]
    fn same_triple_is_serialized() {
        let locks = RatchetLocks::new();
        let group = PublicKey::from("G1");
        let sender = PublicKey::from("S1");
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        locks.with_lock(&group, &sender, Generation::Current, || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_triples_get_distinct_slots() {
        let locks = RatchetLocks::new();
        let group = PublicKey::from("G1");

        locks.with_lock(&group, &PublicKey::from("S1"), Generation::Current, || {
            // Holding S1 must not block S2 or S1/Old
            locks.with_lock(&group, &PublicKey::from("S2"), Generation::Current, || {});
            locks.with_lock(&group, &PublicKey::from("S1"), Generation::Old, || {});
        });

        assert_eq!(locks.len(), 3);
    }

    #[test]
    fn with_lock_returns_closure_value() {
        let locks = RatchetLocks::new();
        let value = locks.with_lock(
            &PublicKey::from("G1"),
            &PublicKey::from("S1"),
            Generation::Current,
            || 42,
        );
        assert_eq!(value, 42);
    }

    #[test]
    fn forget_group_drops_only_that_group() {
        let locks = RatchetLocks::new();
        let sender = PublicKey::from("S1");

        locks.with_lock(&PublicKey::from("G1"), &sender, Generation::Current, || {});
        locks.with_lock(&PublicKey::from("G2"), &sender, Generation::Current, || {});

        locks.forget_group(&PublicKey::from("G1"));

        assert_eq!(locks.len(), 1);
        assert!(!locks.is_empty());
    }
}
