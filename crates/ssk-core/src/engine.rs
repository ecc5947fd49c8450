//! Ratchet engine
//!
//! Orchestrates ratchet generation, encryption, two-generation decryption, and
//! closed-group lifecycle on top of a [`RatchetStore`].
//!
//! # Decryption
//!
//! ```text
//! for generation in [Current, Old]:
//!     load ratchet                      (absent → LoadingFailed)
//!     target already derived?
//!         retained and within window?   (no → MessageKeyMissing)
//!     else within MAX_SKIP?             (no → KeyIndexTooFar)
//!         step to target and persist
//!     open with the last 16 keys        (none → RatchetingExhausted)
//! both failed → resync request + most specific error
//! ```
//!
//! Every generation is tried at most once, so a failing decrypt reads the
//! store exactly twice.

use std::collections::BTreeSet;

use ssk_crypto::{CryptoError, NONCE_SIZE, Ratchet, TAG_SIZE, aead};
use zeroize::Zeroize;

use crate::{
    env::Environment,
    error::RatchetError,
    group::GroupKeyPair,
    locks::RatchetLocks,
    resync::ResyncDelegate,
    sender_key::SenderKeyDistribution,
    store::{RatchetStore, StorageError},
    types::{Generation, PublicKey},
};

/// Number of most recent message keys tried when opening a body.
pub const DECRYPTION_WINDOW: usize = 16;

/// Generations consulted by decrypt, in order.
const DECRYPT_GENERATIONS: [Generation; 2] = [Generation::Current, Generation::Old];

/// Shared Sender Keys engine.
///
/// Holds no ratchet state of its own: the store is the single source of truth
/// and every step is persisted before its key is used. Read-step-persist
/// cycles on one (group, sender, generation) triple are serialized through
/// [`RatchetLocks`]; different triples proceed in parallel.
pub struct RatchetEngine<S, D, E>
where
    S: RatchetStore,
    D: ResyncDelegate,
    E: Environment,
{
    store: S,
    delegate: D,
    env: E,
    locks: RatchetLocks,
}

impl<S, D, E> RatchetEngine<S, D, E>
where
    S: RatchetStore,
    D: ResyncDelegate,
    E: Environment,
{
    /// Create an engine over `store`, reporting resync requests to `delegate`.
    pub fn new(store: S, delegate: D, env: E) -> Self {
        Self { store, delegate, env, locks: RatchetLocks::new() }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Generate a fresh chain for `sender` in `group` and store it as Current.
    ///
    /// Any existing Current ratchet of the pair is overwritten.
    pub fn generate_ratchet(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
    ) -> Result<Ratchet, RatchetError> {
        let mut root = self.env.random_key();
        let ratchet = Ratchet::new(root);
        root.zeroize();

        self.locks.with_lock(group, sender, Generation::Current, || {
            self.store.set_ratchet(group, sender, &ratchet, Generation::Current)
        })?;

        tracing::debug!(%group, %sender, "Generated ratchet");
        Ok(ratchet)
    }

    /// Seal `plaintext` with the next key of `sender`'s Current chain.
    ///
    /// Returns the sealed body and the key index it was sealed at. The chain
    /// is stepped and persisted before the key is used.
    ///
    /// # Errors
    ///
    /// - `LoadingFailed` if the sender has no Current ratchet (a resync
    ///   request is issued)
    /// - `KeyIndexOverflow` if the chain is exhausted
    /// - `Storage` on store failure
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        group: &PublicKey,
        sender: &PublicKey,
    ) -> Result<(Vec<u8>, u32), RatchetError> {
        let stepped = self.locks.with_lock(group, sender, Generation::Current, || {
            self.step_current(group, sender)
        });

        let stepped = match stepped {
            Ok(stepped) => stepped,
            Err(err) => {
                if matches!(err, RatchetError::LoadingFailed { .. }) {
                    self.request_resync(group, sender);
                }
                Self::log_failure(&err, group, sender, "Encrypt failed");
                return Err(err);
            },
        };

        let Some(message_key) = stepped.latest_message_key() else {
            unreachable!("a stepped ratchet holds at least one message key");
        };
        let key_index = stepped.key_index() - 1;

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);
        let body = aead::seal(message_key, nonce, plaintext);

        tracing::debug!(%group, %sender, key_index, "Encrypted message");
        Ok((body, key_index))
    }

    /// Open a body sealed by `sender` at `key_index`.
    ///
    /// Tries the Current generation, then Old exactly once. If both fail a
    /// resync request is issued and the most specific failure is returned:
    /// `MessageKeyMissing`, then `RatchetingExhausted`, then `LoadingFailed`.
    ///
    /// # Errors
    ///
    /// - `Crypto` if the body is shorter than a nonce plus a tag (no store
    ///   access, no resync)
    /// - `Storage` or `KeyIndexOverflow` immediately, without retry or resync
    /// - One of the ratcheting errors above, or `KeyIndexTooFar` if the
    ///   target lies more than [`ssk_crypto::MAX_SKIP`] keys ahead, after both
    ///   generations failed
    pub fn decrypt(
        &self,
        body: &[u8],
        group: &PublicKey,
        sender: &PublicKey,
        key_index: u32,
    ) -> Result<Vec<u8>, RatchetError> {
        let min = NONCE_SIZE + TAG_SIZE;
        if body.len() < min {
            return Err(RatchetError::from(CryptoError::Truncated {
                len: body.len(),
                min,
            }));
        }

        let mut failure: Option<RatchetError> = None;
        for generation in DECRYPT_GENERATIONS {
            match self.decrypt_with_generation(body, group, sender, key_index, generation) {
                Ok(plaintext) => {
                    tracing::debug!(%group, %sender, key_index, %generation, "Decrypted message");
                    return Ok(plaintext);
                },
                Err(err) if err.requests_resync() => {
                    tracing::debug!(
                        %group,
                        %sender,
                        key_index,
                        %generation,
                        error = %err,
                        "Decrypt attempt failed"
                    );
                    failure = Some(match failure {
                        Some(previous) if previous.specificity() >= err.specificity() => previous,
                        _ => err,
                    });
                },
                Err(err) => {
                    Self::log_failure(&err, group, sender, "Decrypt failed");
                    return Err(err);
                },
            }
        }

        let Some(err) = failure else {
            unreachable!("every generation failed with a resync error");
        };
        self.request_resync(group, sender);
        Err(err)
    }

    /// Returns true if `public_key` is a known closed group.
    pub fn is_closed_group(&self, public_key: &PublicKey) -> Result<bool, RatchetError> {
        Ok(self.store.all_group_public_keys()?.contains(public_key))
    }

    /// Identity key pair of `group`, if its private key is stored.
    pub fn group_key_pair(&self, group: &PublicKey) -> Result<Option<GroupKeyPair>, RatchetError> {
        let Some(mut private_key) = self.store.group_private_key(group)? else {
            return Ok(None);
        };
        let pair = GroupKeyPair::from_parts(group.clone(), &private_key);
        private_key.zeroize();
        pair.map(Some)
    }

    /// Import a group identity received from another member.
    ///
    /// # Errors
    ///
    /// - `InvalidGroupKey` if the key is not a 32-byte X25519 secret
    pub fn set_group_private_key(
        &self,
        group: &PublicKey,
        private_key: &[u8],
    ) -> Result<(), RatchetError> {
        GroupKeyPair::from_parts(group.clone(), private_key)?;
        self.store.set_group_private_key(group, private_key)?;
        tracing::info!(%group, "Stored group identity");
        Ok(())
    }

    /// Create a closed group with a fresh identity and a chain per member.
    ///
    /// Returns the group key pair and one distribution record per member.
    pub fn create_group(
        &self,
        members: &[PublicKey],
    ) -> Result<(GroupKeyPair, Vec<SenderKeyDistribution>), RatchetError> {
        let pair = GroupKeyPair::generate(&self.env);
        let group = pair.public_key().clone();

        let mut private_key = pair.private_key_bytes();
        let stored = self.store.set_group_private_key(&group, &private_key);
        private_key.zeroize();
        stored?;

        let distributions = members
            .iter()
            .map(|member| {
                let ratchet = self.generate_ratchet(&group, member)?;
                Ok(SenderKeyDistribution::from_ratchet(group.clone(), member.clone(), &ratchet))
            })
            .collect::<Result<Vec<_>, RatchetError>>()?;

        tracing::info!(%group, members = members.len(), "Created closed group");
        Ok((pair, distributions))
    }

    /// Distribution record of `sender`'s Current chain in `group`.
    pub fn sender_key(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
    ) -> Result<Option<SenderKeyDistribution>, RatchetError> {
        let ratchet = self.store.ratchet(group, sender, Generation::Current)?;
        Ok(ratchet.map(|r| SenderKeyDistribution::from_ratchet(group.clone(), sender.clone(), &r)))
    }

    /// Distribution records of every Current chain in `group`.
    pub fn sender_keys(&self, group: &PublicKey) -> Result<Vec<SenderKeyDistribution>, RatchetError> {
        Ok(self
            .store
            .all_ratchets(group, Generation::Current)?
            .into_iter()
            .map(|(sender, ratchet)| {
                SenderKeyDistribution::from_ratchet(group.clone(), sender, &ratchet)
            })
            .collect())
    }

    /// Store a received chain as the sender's Current ratchet.
    ///
    /// # Errors
    ///
    /// - `UnknownGroup` if the record's group is not a known closed group
    pub fn apply_sender_key(&self, record: &SenderKeyDistribution) -> Result<(), RatchetError> {
        let group = record.group_public_key();
        let sender = record.sender_public_key();

        if !self.is_closed_group(group)? {
            tracing::warn!(%group, %sender, "Sender key for unknown group");
            return Err(RatchetError::UnknownGroup { group: group.clone() });
        }

        let ratchet = record.to_ratchet();
        self.locks.with_lock(group, sender, Generation::Current, || {
            self.store.set_ratchet(group, sender, &ratchet, Generation::Current)
        })?;

        tracing::debug!(%group, %sender, key_index = record.key_index(), "Applied sender key");
        Ok(())
    }

    /// Move every Current chain of `group` into Old.
    ///
    /// Run on membership change. Each chain is moved under its Current and
    /// Old locks, then chains left in Old by earlier rotations are discarded,
    /// so Old only ever holds the chains of the last rotation. Each remaining
    /// member then generates a new chain. Returns the number of chains
    /// archived.
    ///
    /// Chains left by earlier rotations are only discarded once every chain
    /// is moved. A rotation that fails while moving discards nothing: chains
    /// not yet moved stay readable in Current.
    pub fn rotate_group(&self, group: &PublicKey) -> Result<usize, RatchetError> {
        let listed = self.store.all_ratchets(group, Generation::Current)?;

        let mut archived = BTreeSet::new();
        for (sender, _) in &listed {
            let moved = self.locks.with_lock(group, sender, Generation::Current, || {
                self.locks.with_lock(group, sender, Generation::Old, || self.archive(group, sender))
            })?;
            if moved {
                archived.insert(sender.clone());
            }
        }

        for (sender, _) in self.store.all_ratchets(group, Generation::Old)? {
            if archived.contains(&sender) {
                continue;
            }
            self.locks.with_lock(group, &sender, Generation::Old, || {
                self.store.remove_ratchet(group, &sender, Generation::Old)
            })?;
        }

        tracing::info!(%group, archived = archived.len(), "Rotated group ratchets");
        Ok(archived.len())
    }

    /// Rotate `group` and generate a new chain for `user`.
    ///
    /// Returns the record to distribute for the new chain.
    pub fn rekey(
        &self,
        group: &PublicKey,
        user: &PublicKey,
    ) -> Result<SenderKeyDistribution, RatchetError> {
        self.rotate_group(group)?;
        let ratchet = self.generate_ratchet(group, user)?;
        Ok(SenderKeyDistribution::from_ratchet(group.clone(), user.clone(), &ratchet))
    }

    /// Forget `group`: both generations of every chain and its identity.
    pub fn leave_group(&self, group: &PublicKey) -> Result<(), RatchetError> {
        self.store.remove_all_ratchets(group, Generation::Current)?;
        self.store.remove_all_ratchets(group, Generation::Old)?;
        self.store.remove_group_private_key(group)?;
        self.locks.forget_group(group);

        tracing::info!(%group, "Left closed group");
        Ok(())
    }

    fn decrypt_with_generation(
        &self,
        body: &[u8],
        group: &PublicKey,
        sender: &PublicKey,
        key_index: u32,
        generation: Generation,
    ) -> Result<Vec<u8>, RatchetError> {
        let ratchet = self.locks.with_lock(group, sender, generation, || {
            self.load_for_key(group, sender, key_index, generation)
        })?;

        for key in ratchet.recent_message_keys(DECRYPTION_WINDOW) {
            match aead::open(key, body) {
                Ok(plaintext) => return Ok(plaintext),
                Err(err) if err.is_open_failure() => {},
                Err(err) => return Err(err.into()),
            }
        }
        Err(RatchetError::RatchetingExhausted { group: group.clone(), sender: sender.clone() })
    }

    /// Load a ratchet holding the key for `key_index`, stepping and persisting
    /// it if the key is not yet derived. Caller holds the triple's lock.
    fn load_for_key(
        &self,
        group: &PublicKey,
        sender: &PublicKey,
        key_index: u32,
        generation: Generation,
    ) -> Result<Ratchet, RatchetError> {
        let Some(mut ratchet) = self.store.ratchet(group, sender, generation)? else {
            return Err(RatchetError::LoadingFailed { group: group.clone(), sender: sender.clone() });
        };

        if key_index < ratchet.key_index() {
            let distance = (ratchet.key_index() - key_index) as usize;
            if distance > DECRYPTION_WINDOW || ratchet.message_key(key_index).is_none() {
                return Err(RatchetError::MessageKeyMissing {
                    key_index,
                    group: group.clone(),
                    sender: sender.clone(),
                });
            }
            return Ok(ratchet);
        }

        let from = ratchet.key_index();
        match ratchet.advance_to(key_index) {
            Ok(()) => {},
            Err(CryptoError::TooFarAhead { current, requested }) => {
                return Err(RatchetError::KeyIndexTooFar {
                    key_index: requested,
                    current,
                    group: group.clone(),
                    sender: sender.clone(),
                });
            },
            Err(err) => return Err(err.into()),
        }
        self.store.set_ratchet(group, sender, &ratchet, generation)?;

        tracing::debug!(
            %group,
            %sender,
            %generation,
            from,
            to = ratchet.key_index(),
            "Advanced ratchet"
        );
        Ok(ratchet)
    }

    /// Step the Current chain of `sender` once and persist it. Caller holds
    /// the Current lock.
    fn step_current(&self, group: &PublicKey, sender: &PublicKey) -> Result<Ratchet, RatchetError> {
        let Some(mut ratchet) = self.store.ratchet(group, sender, Generation::Current)? else {
            return Err(RatchetError::LoadingFailed { group: group.clone(), sender: sender.clone() });
        };
        ratchet.advance()?;
        self.store.set_ratchet(group, sender, &ratchet, Generation::Current)?;
        Ok(ratchet)
    }

    /// Move the Current chain of `sender` into Old. Caller holds both locks.
    ///
    /// Returns false if the sender has no Current chain.
    fn archive(&self, group: &PublicKey, sender: &PublicKey) -> Result<bool, StorageError> {
        // Re-read so steps taken since the listing are archived too
        let Some(current) = self.store.ratchet(group, sender, Generation::Current)? else {
            return Ok(false);
        };
        self.store.set_ratchet(group, sender, &current, Generation::Old)?;
        self.store.remove_ratchet(group, sender, Generation::Current)?;
        Ok(true)
    }

    fn request_resync(&self, group: &PublicKey, sender: &PublicKey) {
        tracing::warn!(%group, %sender, "Requesting sender key");
        self.delegate.request_sender_key(group, sender);
    }

    fn log_failure(err: &RatchetError, group: &PublicKey, sender: &PublicKey, message: &str) {
        match err {
            RatchetError::Storage(_) => {
                tracing::error!(%group, %sender, error = %err, "{message}");
            },
            _ => tracing::debug!(%group, %sender, error = %err, "{message}"),
        }
    }
}
