//! Error types for engine operations

use ssk_crypto::CryptoError;
use thiserror::Error;

use crate::{store::StorageError, types::PublicKey};

/// Errors from [`crate::RatchetEngine`] operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatchetError {
    /// No ratchet exists for this (group, sender) in the required generation
    #[error("no ratchet for sender {sender} in group {group}")]
    LoadingFailed {
        /// Group public key
        group: PublicKey,
        /// Sender public key
        sender: PublicKey,
    },

    /// The target key is in the past but was never retained, or lies outside
    /// the decryption window
    #[error("message key {key_index} missing for sender {sender} in group {group}")]
    MessageKeyMissing {
        /// Requested key index
        key_index: u32,
        /// Group public key
        group: PublicKey,
        /// Sender public key
        sender: PublicKey,
    },

    /// The target key lies more than the skip bound ahead of the ratchet
    #[error("key index {key_index} too far ahead of {current} for sender {sender} in group {group}")]
    KeyIndexTooFar {
        /// Requested key index
        key_index: u32,
        /// Key index of the stored ratchet
        current: u32,
        /// Group public key
        group: PublicKey,
        /// Sender public key
        sender: PublicKey,
    },

    /// Every candidate key failed authentication in both generations
    #[error("ratcheting exhausted for sender {sender} in group {group}")]
    RatchetingExhausted {
        /// Group public key
        group: PublicKey,
        /// Sender public key
        sender: PublicKey,
    },

    /// Ratchet key index would overflow
    #[error("ratchet key index overflow at {current}")]
    KeyIndexOverflow {
        /// Key index when overflow was detected
        current: u32,
    },

    /// Public key is not a known closed group
    #[error("unknown closed group: {group}")]
    UnknownGroup {
        /// Group public key
        group: PublicKey,
    },

    /// Stored group private key is malformed
    #[error("invalid private key for group {group}: {reason}")]
    InvalidGroupKey {
        /// Group public key
        group: PublicKey,
        /// What was wrong with the key
        reason: String,
    },

    /// Sender key distribution record could not be encoded or decoded
    #[error("invalid sender key record: {0}")]
    InvalidSenderKey(String),

    /// Sealed body rejected before any key was tried
    #[error("malformed message body: {0}")]
    Crypto(CryptoError),

    /// Underlying storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RatchetError {
    /// Returns true if the engine issues a resync request alongside this error.
    ///
    /// These are the state problems a fresh copy of the sender's chain can
    /// fix. Storage failures and malformed data are surfaced without a
    /// request.
    pub fn requests_resync(&self) -> bool {
        matches!(
            self,
            Self::LoadingFailed { .. }
                | Self::MessageKeyMissing { .. }
                | Self::KeyIndexTooFar { .. }
                | Self::RatchetingExhausted { .. }
        )
    }

    /// Rank used to pick the reported error when both generations fail.
    ///
    /// The more specific outcome wins: a known missing key says more than a
    /// window that did not authenticate, which says more than an absent
    /// ratchet.
    pub(crate) fn specificity(&self) -> u8 {
        match self {
            Self::MessageKeyMissing { .. } | Self::KeyIndexTooFar { .. } => 2,
            Self::RatchetingExhausted { .. } => 1,
            _ => 0,
        }
    }
}

impl From<CryptoError> for RatchetError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyIndexOverflow { current } => Self::KeyIndexOverflow { current },
            other => Self::Crypto(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g() -> PublicKey {
        PublicKey::from("G1")
    }

    fn s() -> PublicKey {
        PublicKey::from("S1")
    }

    #[test]
    fn ratcheting_errors_request_resync() {
        assert!(RatchetError::LoadingFailed { group: g(), sender: s() }.requests_resync());
        assert!(
            RatchetError::MessageKeyMissing { key_index: 0, group: g(), sender: s() }
                .requests_resync()
        );
        assert!(RatchetError::RatchetingExhausted { group: g(), sender: s() }.requests_resync());
        assert!(
            RatchetError::KeyIndexTooFar { key_index: 5000, current: 0, group: g(), sender: s() }
                .requests_resync()
        );
    }

    #[test]
    fn storage_errors_do_not_request_resync() {
        let err = RatchetError::from(StorageError::Io("disk".to_string()));
        assert!(!err.requests_resync());
    }

    #[test]
    fn specificity_order() {
        let missing = RatchetError::MessageKeyMissing { key_index: 0, group: g(), sender: s() };
        let exhausted = RatchetError::RatchetingExhausted { group: g(), sender: s() };
        let loading = RatchetError::LoadingFailed { group: g(), sender: s() };

        assert!(missing.specificity() > exhausted.specificity());
        assert!(exhausted.specificity() > loading.specificity());

        let too_far =
            RatchetError::KeyIndexTooFar { key_index: 5000, current: 0, group: g(), sender: s() };
        assert_eq!(too_far.specificity(), missing.specificity());
    }

    #[test]
    fn overflow_maps_from_crypto() {
        let err = RatchetError::from(CryptoError::KeyIndexOverflow { current: u32::MAX });
        assert_eq!(err, RatchetError::KeyIndexOverflow { current: u32::MAX });
    }

    #[test]
    fn truncation_is_not_a_resync_error() {
        let err = RatchetError::from(CryptoError::Truncated { len: 3, min: 28 });
        assert!(matches!(err, RatchetError::Crypto(CryptoError::Truncated { .. })));
        assert!(!err.requests_resync());
    }

    #[test]
    fn error_display() {
        let err = RatchetError::MessageKeyMissing { key_index: 3, group: g(), sender: s() };
        assert_eq!(err.to_string(), "message key 3 missing for sender S1 in group G1");
    }
}
