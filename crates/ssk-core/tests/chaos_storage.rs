//! Chaos property tests for the engine over failing storage
//!
//! These tests verify that the engine keeps its guarantees when the receiver's
//! store is wrapped in `ChaoticStore`:
//! - Storage failures surface as `RatchetError::Storage`, never as a ratcheting
//!   error
//! - Storage failures never trigger a resync request
//! - A failed decrypt leaves the chain valid for later messages
//! - Every plaintext that is returned is the one that was sent
//! - A rotation interrupted by a failure loses no chain

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use proptest::prelude::*;
use ssk_core::{
    ChaoticStore, Generation, MemoryStore, PublicKey, RatchetEngine, RatchetError, RatchetStore,
    SenderKeyDistribution, env::test_utils::MockEnv,
};

fn ignore(_: &PublicKey, _: &PublicKey) {}

#[test]
fn prop_chaotic_receiver_only_fails_with_storage_errors() {
    proptest!(|(
        failure_rate in 0.0..0.6,
        seed in any::<u64>(),
        message_count in 5u32..40,
    )| {
        let group = PublicKey::from("G1");
        let sender_key = PublicKey::from("S1");

        let sender = RatchetEngine::new(
            MemoryStore::new(),
            ignore as fn(&PublicKey, &PublicKey),
            MockEnv::with_seed(seed),
        );
        let root = sender.generate_ratchet(&group, &sender_key).unwrap();

        let store = ChaoticStore::with_seed(MemoryStore::new(), failure_rate, seed);
        let record = SenderKeyDistribution::from_ratchet(group.clone(), sender_key.clone(), &root);
        store.inner().set_ratchet(&group, &sender_key, &record.to_ratchet(), Generation::Current).unwrap();

        let resyncs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resyncs);
        let receiver = RatchetEngine::new(
            store.clone(),
            move |_: &PublicKey, _: &PublicKey| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            MockEnv::with_seed(seed),
        );

        let mut delivered = 0u32;
        for i in 0..message_count {
            let (body, idx) = sender.encrypt(&i.to_be_bytes(), &group, &sender_key).unwrap();
            match receiver.decrypt(&body, &group, &sender_key, idx) {
                Ok(plaintext) => {
                    prop_assert_eq!(plaintext, i.to_be_bytes().to_vec());
                    delivered += 1;
                }
                Err(RatchetError::Storage(_)) => {}
                Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
            }
        }

        prop_assert_eq!(resyncs.load(Ordering::SeqCst), 0);

        // ORACLE: the persisted chain never ran ahead of the sender
        let stored = store.inner().ratchet(&group, &sender_key, Generation::Current).unwrap().unwrap();
        prop_assert!(stored.key_index() <= message_count);
        prop_assert!(delivered <= message_count);
    });
}

#[test]
fn prop_chaotic_sender_never_reuses_an_index() {
    proptest!(|(
        failure_rate in 0.0..0.6,
        seed in any::<u64>(),
        attempts in 5usize..60,
    )| {
        let group = PublicKey::from("G1");
        let sender_key = PublicKey::from("S1");
        let store = ChaoticStore::with_seed(MemoryStore::new(), failure_rate, seed);
        store
            .inner()
            .set_ratchet(&group, &sender_key, &ssk_core::Ratchet::new([seed as u8; 32]), Generation::Current)
            .unwrap();

        let sender = RatchetEngine::new(
            store.clone(),
            ignore as fn(&PublicKey, &PublicKey),
            MockEnv::with_seed(seed),
        );

        let mut indices = Vec::new();
        for _ in 0..attempts {
            match sender.encrypt(b"chaos", &group, &sender_key) {
                Ok((_, idx)) => indices.push(idx),
                Err(RatchetError::Storage(_)) => {}
                Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
            }
        }

        // ORACLE: successful encrypts use consecutive indices with no reuse
        let expected: Vec<u32> = (0..indices.len() as u32).collect();
        prop_assert_eq!(indices, expected);
    });
}

#[test]
fn prop_interrupted_rotation_loses_no_chain() {
    proptest!(|(
        failure_rate in 0.0..0.5,
        seed in any::<u64>(),
        member_count in 1usize..6,
    )| {
        let group = PublicKey::from("G1");
        let departed = PublicKey::from("departed");
        let members: Vec<PublicKey> =
            (0..member_count).map(|i| PublicKey::new(format!("S{i}"))).collect();

        let store = ChaoticStore::with_seed(MemoryStore::new(), failure_rate, seed);
        for (i, member) in members.iter().enumerate() {
            let ratchet = ssk_core::Ratchet::new([i as u8; 32]);
            store.inner().set_ratchet(&group, member, &ratchet, Generation::Current).unwrap();
        }
        let stale = ssk_core::Ratchet::new([0xEE; 32]);
        store.inner().set_ratchet(&group, &departed, &stale, Generation::Old).unwrap();

        let engine = RatchetEngine::new(
            store.clone(),
            ignore as fn(&PublicKey, &PublicKey),
            MockEnv::with_seed(seed),
        );
        let result = engine.rotate_group(&group);

        let inner = store.inner();
        for member in &members {
            let current = inner.ratchet(&group, member, Generation::Current).unwrap();
            let old = inner.ratchet(&group, member, Generation::Old).unwrap();
            // ORACLE: every chain survives in at least one generation
            prop_assert!(current.is_some() || old.is_some(), "{member} lost");
        }

        let stale_kept = inner.ratchet(&group, &departed, Generation::Old).unwrap().is_some();
        match result {
            Ok(archived) => {
                prop_assert_eq!(archived, member_count);
                prop_assert!(inner.all_ratchets(&group, Generation::Current).unwrap().is_empty());
                prop_assert!(!stale_kept);
            }
            Err(RatchetError::Storage(_)) => prop_assert!(stale_kept),
            Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
        }
    });
}
