//! Fuzz target for the ratchet engine
//!
//! Drives a sender and a receiver through arbitrary operation sequences over
//! in-memory stores.
//!
//! # Strategy
//!
//! - Encrypts interleaved with decrypts delivered in any order
//! - Decrypts with wrong key indices (past, future, anywhere in `u32`)
//! - Corrupted and truncated bodies
//! - Rotations and regenerations mid-stream
//!
//! # Invariants
//!
//! - The engine never panics
//! - A successful decrypt returns exactly the plaintext that was sealed
//! - Sender key indices are consecutive within a chain
//! - A rejected body never produces plaintext
//! - A key index beyond the skip bound never moves the stored chain

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ssk_core::{
    env::test_utils::MockEnv, Generation, MemoryStore, PublicKey, RatchetEngine, RatchetError,
    RatchetStore, SenderKeyDistribution,
};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    /// Sender seals a message
    Encrypt { message: Vec<u8> },
    /// Receiver opens a previously sealed message (index into history)
    Deliver { which: u16 },
    /// Receiver opens a message claiming a shifted key index
    DeliverWrongIndex { which: u16, shift: i32 },
    /// Receiver opens a message with one byte flipped
    DeliverCorrupted { which: u16, at: u16, mask: u8 },
    /// Receiver opens arbitrary bytes
    DeliverGarbage { body: Vec<u8>, key_index: u32 },
    /// Receiver archives its chains and takes the sender's new chain
    Rotate,
}

fn ignore(_: &PublicKey, _: &PublicKey) {}

fuzz_target!(|scenario: Scenario| {
    let group = PublicKey::from("G1");
    let sender_key = PublicKey::from("S1");

    let sender = RatchetEngine::new(
        MemoryStore::new(),
        ignore as fn(&PublicKey, &PublicKey),
        MockEnv::with_seed(scenario.seed),
    );
    let receiver = RatchetEngine::new(
        MemoryStore::new(),
        ignore as fn(&PublicKey, &PublicKey),
        MockEnv::with_seed(scenario.seed.wrapping_add(1)),
    );

    let Ok(root) = sender.generate_ratchet(&group, &sender_key) else {
        return;
    };
    if receiver.set_group_private_key(&group, &[1u8; 32]).is_err() {
        return;
    }
    let record = SenderKeyDistribution::from_ratchet(group.clone(), sender_key.clone(), &root);
    if receiver.apply_sender_key(&record).is_err() {
        return;
    }

    // (body, key index, plaintext) of every sealed message
    let mut history: Vec<(Vec<u8>, u32, Vec<u8>)> = Vec::new();
    let mut next_index = 0u32;

    for op in scenario.operations.into_iter().take(256) {
        match op {
            Operation::Encrypt { message } => {
                let (body, idx) = sender.encrypt(&message, &group, &sender_key).unwrap();
                assert_eq!(idx, next_index, "sender skipped or reused an index");
                next_index += 1;
                history.push((body, idx, message));
            },
            Operation::Deliver { which } => {
                let Some((body, idx, message)) = pick(&history, which) else { continue };
                if let Ok(plaintext) = receiver.decrypt(body, &group, &sender_key, *idx) {
                    assert_eq!(&plaintext, message, "decrypt returned wrong plaintext");
                }
            },
            Operation::DeliverWrongIndex { which, shift } => {
                let Some((body, idx, message)) = pick(&history, which) else { continue };
                let shifted = idx.saturating_add_signed(shift);
                if let Ok(plaintext) = receiver.decrypt(body, &group, &sender_key, shifted) {
                    // The window may still hold the right key
                    assert_eq!(&plaintext, message);
                }
            },
            Operation::DeliverCorrupted { which, at, mask } => {
                let Some((body, idx, _)) = pick(&history, which) else { continue };
                if mask == 0 {
                    continue;
                }
                let mut corrupted = body.clone();
                let at = usize::from(at) % corrupted.len();
                corrupted[at] ^= mask;
                assert!(
                    receiver.decrypt(&corrupted, &group, &sender_key, *idx).is_err(),
                    "corrupted body decrypted"
                );
            },
            Operation::DeliverGarbage { body, key_index } => {
                let before = receiver.store().ratchet(&group, &sender_key, Generation::Current);
                match receiver.decrypt(&body, &group, &sender_key, key_index) {
                    Ok(_) | Err(RatchetError::Storage(_)) => {},
                    Err(RatchetError::KeyIndexTooFar { .. }) => {
                        let after = receiver.store().ratchet(&group, &sender_key, Generation::Current);
                        assert_eq!(before.ok(), after.ok(), "rejected index moved the chain");
                    },
                    Err(e) => assert!(!matches!(e, RatchetError::InvalidSenderKey(_))),
                }
            },
            Operation::Rotate => {
                receiver.rotate_group(&group).unwrap();
                let new_record = sender.rekey(&group, &sender_key).unwrap();
                receiver.apply_sender_key(&new_record).unwrap();
                // Old messages are only decryptable through the Old generation now
                history.clear();
                next_index = 0;
            },
        }
    }
});

fn pick(history: &[(Vec<u8>, u32, Vec<u8>)], which: u16) -> Option<&(Vec<u8>, u32, Vec<u8>)> {
    if history.is_empty() {
        return None;
    }
    history.get(usize::from(which) % history.len())
}
