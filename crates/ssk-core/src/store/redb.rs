//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. A
//! ratchet write is a single transaction, so a crash mid-step leaves either
//! the previous ratchet or the stepped one, never a mix.

use std::{collections::BTreeSet, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use ssk_crypto::{CHAIN_KEY_SIZE, MessageKey, Ratchet};
use zeroize::Zeroize;

use super::{RatchetStore, StorageError};
use crate::types::{Generation, PublicKey};

/// Table: ratchets
/// Key: [generation: 1][group_len: 4 BE][group bytes][sender bytes]
/// Value: CBOR-encoded `StoredRatchet`
const RATCHETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ratchets");

/// Table: group_private_keys
/// Key: group public key bytes
/// Value: raw private key bytes
const GROUP_PRIVATE_KEYS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("group_private_keys");

/// On-disk form of a ratchet. Keys are hex text so records stay readable with
/// generic CBOR tooling.
#[derive(Serialize, Deserialize)]
struct StoredRatchet {
    chain_key: String,
    key_index: u32,
    message_keys: Vec<String>,
}

impl StoredRatchet {
    fn from_ratchet(ratchet: &Ratchet) -> Self {
        Self {
            chain_key: hex::encode(ratchet.chain_key()),
            key_index: ratchet.key_index(),
            message_keys: ratchet.message_keys().iter().map(|k| hex::encode(k.as_bytes())).collect(),
        }
    }

    fn into_ratchet(self) -> Result<Ratchet, StorageError> {
        if self.message_keys.len() > self.key_index as usize {
            return Err(StorageError::Serialization(format!(
                "ratchet at key index {} holds {} message keys",
                self.key_index,
                self.message_keys.len()
            )));
        }

        let chain_key = decode_key(&self.chain_key)?;
        let message_keys = self
            .message_keys
            .iter()
            .map(|k| decode_key(k).map(MessageKey::from_bytes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Ratchet::from_parts(chain_key, self.key_index, message_keys))
    }
}

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (RATCHETS, `GROUP_PRIVATE_KEYS`).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(RATCHETS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ =
                txn.open_table(GROUP_PRIVATE_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl RatchetStore for RedbStore {
    fn ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<Option<Ratchet>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table = txn.open_table(RATCHETS).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_ratchet_key(group, sender, generation);

        match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => decode_ratchet(value.value()).map(Some),
            None => Ok(None),
        }
    }

    fn set_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        ratchet: &Ratchet,
        generation: Generation,
    ) -> Result<(), StorageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&StoredRatchet::from_ratchet(ratchet), &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(RATCHETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_ratchet_key(group, sender, generation);
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        bytes.zeroize();

        Ok(())
    }

    fn remove_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(RATCHETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_ratchet_key(group, sender, generation);
            table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(RATCHETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let prefix = encode_group_prefix(group, generation);
            let mut keys = Vec::new();
            for result in
                table.range(prefix.as_slice()..).map_err(|e| StorageError::Io(e.to_string()))?
            {
                let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
                if !key.value().starts_with(&prefix) {
                    break;
                }
                keys.push(key.value().to_vec());
            }

            for key in keys {
                table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn all_ratchets(
        &self,
        group: &PublicKey,
        generation: Generation,
    ) -> Result<Vec<(PublicKey, Ratchet)>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table = txn.open_table(RATCHETS).map_err(|e| StorageError::Io(e.to_string()))?;

        let prefix = encode_group_prefix(group, generation);
        let mut ratchets = Vec::new();
        for result in
            table.range(prefix.as_slice()..).map_err(|e| StorageError::Io(e.to_string()))?
        {
            let (key, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let Some(sender) = key.value().strip_prefix(prefix.as_slice()) else {
                break;
            };

            let sender = String::from_utf8(sender.to_vec())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            ratchets.push((PublicKey::from(sender), decode_ratchet(value.value())?));
        }

        Ok(ratchets)
    }

    fn group_private_key(&self, group: &PublicKey) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table =
            txn.open_table(GROUP_PRIVATE_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(table
            .get(group.as_str().as_bytes())
            .map_err(|e| StorageError::Io(e.to_string()))?
            .map(|value| value.value().to_vec()))
    }

    fn set_group_private_key(
        &self,
        group: &PublicKey,
        private_key: &[u8],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(GROUP_PRIVATE_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            table
                .insert(group.as_str().as_bytes(), private_key)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_group_private_key(&self, group: &PublicKey) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(GROUP_PRIVATE_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            table.remove(group.as_str().as_bytes()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn all_group_public_keys(&self) -> Result<BTreeSet<PublicKey>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table =
            txn.open_table(GROUP_PRIVATE_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut groups = BTreeSet::new();

        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let group = String::from_utf8(key.value().to_vec())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            groups.insert(PublicKey::from(group));
        }

        Ok(groups)
    }
}

/// Encode the (group, generation) prefix shared by all ratchets of a group.
///
/// Layout: [generation: 1][group_len: 4 BE][group bytes]. The length makes
/// the prefix unambiguous, so "G1" never matches ratchets of "G10".
fn encode_group_prefix(group: &PublicKey, generation: Generation) -> Vec<u8> {
    let group = group.as_str().as_bytes();
    let mut key = Vec::with_capacity(1 + 4 + group.len());
    key.push(generation.tag());
    key.extend_from_slice(&(group.len() as u32).to_be_bytes());
    key.extend_from_slice(group);
    key
}

/// Encode a full ratchet key: group prefix followed by the sender bytes.
fn encode_ratchet_key(group: &PublicKey, sender: &PublicKey, generation: Generation) -> Vec<u8> {
    let mut key = encode_group_prefix(group, generation);
    key.extend_from_slice(sender.as_str().as_bytes());
    key
}

fn decode_ratchet(bytes: &[u8]) -> Result<Ratchet, StorageError> {
    let stored: StoredRatchet =
        ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    stored.into_ratchet()
}

fn decode_key(text: &str) -> Result<[u8; CHAIN_KEY_SIZE], StorageError> {
    let mut bytes = hex::decode(text).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let key = <[u8; CHAIN_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
        StorageError::Serialization(format!(
            "stored key is {} bytes, expected {CHAIN_KEY_SIZE}",
            bytes.len()
        ))
    });
    bytes.zeroize();
    key
}
