//! Fuzz target for sender key distribution decoding
//!
//! Distribution records arrive from other group members and are decoded
//! before anything checks who sent them.
//!
//! # Strategy
//!
//! - Random bytes: completely arbitrary CBOR data
//! - Near-valid records: well-formed maps with hostile field values (short or
//!   non-hex chain keys, huge strings)
//! - Re-encoding of everything that decodes
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - Anything that decodes re-encodes and decodes to the same record
//! - A decoded chain key is always 32 bytes

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ssk_core::SenderKeyDistribution;

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    RandomBytes(Vec<u8>),
    NearValid { chain_key: String, key_index: u32, group: String, sender: String },
    MissingField { chain_key: String, key_index: u32 },
}

fuzz_target!(|input: Input| {
    let bytes = match input {
        Input::RandomBytes(bytes) => bytes,
        Input::NearValid { chain_key, key_index, group, sender } => {
            let mut map = BTreeMap::new();
            map.insert("chain_key", ciborium::Value::Text(chain_key));
            map.insert("key_index", ciborium::Value::Integer(key_index.into()));
            map.insert("group_public_key", ciborium::Value::Text(group));
            map.insert("sender_public_key", ciborium::Value::Text(sender));
            encode(&map)
        },
        Input::MissingField { chain_key, key_index } => {
            let mut map = BTreeMap::new();
            map.insert("chain_key", ciborium::Value::Text(chain_key));
            map.insert("key_index", ciborium::Value::Integer(key_index.into()));
            encode(&map)
        },
    };

    if let Ok(record) = SenderKeyDistribution::decode(&bytes) {
        assert_eq!(record.chain_key().len(), 32);
        let reencoded = record.encode().unwrap();
        let again = SenderKeyDistribution::decode(&reencoded).unwrap();
        assert_eq!(again, record);
    }
});

fn encode(map: &BTreeMap<&str, ciborium::Value>) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(map, &mut out).unwrap();
    out
}
