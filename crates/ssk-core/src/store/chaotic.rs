//! Chaotic store wrapper for fault injection testing
//!
//! Store wrapper that randomly fails operations to test error handling, and
//! counts every call by kind. With a failure rate of zero it is a plain call
//! counter, which is how the decrypt retry bound is verified.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use ssk_crypto::Ratchet;

use super::{RatchetStore, StorageError};
use crate::types::{Generation, PublicKey};

/// Kinds of store calls tracked by [`ChaoticStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `ratchet`
    ReadRatchet,
    /// `set_ratchet`
    WriteRatchet,
    /// `remove_ratchet`
    RemoveRatchet,
    /// `remove_all_ratchets`
    RemoveRatchets,
    /// `all_ratchets`
    ListRatchets,
    /// `group_private_key`
    ReadGroupKey,
    /// `set_group_private_key`
    WriteGroupKey,
    /// `remove_group_private_key`
    RemoveGroupKey,
    /// `all_group_public_keys`
    ListGroups,
}

/// Chaotic store wrapper that randomly injects failures
///
/// Delegates to an underlying store but randomly fails operations based on a
/// configured failure rate. Uses Arc<Mutex<>> for the RNG state and the
/// counters, making it Clone and thread-safe; clones share both.
#[derive(Clone)]
pub struct ChaoticStore<S: RatchetStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Calls per operation kind
    operation_counts: Arc<Mutex<HashMap<StoreOperation, usize>>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
/// This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: RatchetStore> ChaoticStore<S> {
    /// Create a chaotic wrapper with the default seed.
    ///
    /// `failure_rate` is clamped to [0.0, 1.0].
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wrapper that never fails and only counts calls.
    pub fn counting(inner: S) -> Self {
        Self::new(inner, 0.0)
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of calls made for one operation kind.
    pub fn count(&self, operation: StoreOperation) -> usize {
        self.operation_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of store calls attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_counts.lock().unwrap_or_else(PoisonError::into_inner).values().sum()
    }

    /// Reset all counters to zero.
    pub fn reset_counts(&self) {
        self.operation_counts.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Count the call and decide whether it fails.
    fn enter(&self, operation: StoreOperation) -> Result<(), StorageError> {
        *self
            .operation_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;

        let fail = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_fail(self.failure_rate);
        if fail {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: RatchetStore> RatchetStore for ChaoticStore<S> {
    fn ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<Option<Ratchet>, StorageError> {
        self.enter(StoreOperation::ReadRatchet)?;
        self.inner.ratchet(group, sender, generation)
    }

    fn set_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        ratchet: &Ratchet,
        generation: Generation,
    ) -> Result<(), StorageError> {
        self.enter(StoreOperation::WriteRatchet)?;
        self.inner.set_ratchet(group, sender, ratchet, generation)
    }

    fn remove_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError> {
        self.enter(StoreOperation::RemoveRatchet)?;
        self.inner.remove_ratchet(group, sender, generation)
    }

    fn remove_all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError> {
        self.enter(StoreOperation::RemoveRatchets)?;
        self.inner.remove_all_ratchets(group, generation)
    }

    fn all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<Vec<(PublicKey, Ratchet)>, StorageError> {
        self.enter(StoreOperation::ListRatchets)?;
        self.inner.all_ratchets(group, generation)
    }

    fn group_private_key(&self, group: &PublicKey) -> Result<Option<Vec<u8>>, StorageError> {
        self.enter(StoreOperation::ReadGroupKey)?;
        self.inner.group_private_key(group)
    }

    fn set_group_private_key(
        &self,
        group: &PublicKey,
        private_key: &[u8],
    ) -> Result<(), StorageError> {
        self.enter(StoreOperation::WriteGroupKey)?;
        self.inner.set_group_private_key(group, private_key)
    }

    fn remove_group_private_key(&self, group: &PublicKey) -> Result<(), StorageError> {
        self.enter(StoreOperation::RemoveGroupKey)?;
        self.inner.remove_group_private_key(group)
    }

    fn all_group_public_keys(&self) -> Result<BTreeSet<PublicKey>, StorageError> {
        self.enter(StoreOperation::ListGroups)?;
        self.inner.all_group_public_keys()
    }
}
