//! Error types for ratchet and AEAD operations

use thiserror::Error;

/// Errors from the cryptographic primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Stepping would move the key index past `u32::MAX`
    #[error("ratchet key index overflow at {current}")]
    KeyIndexOverflow {
        /// Key index when overflow was detected
        current: u32,
    },

    /// Authentication tag did not verify (wrong key or tampered body)
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Sealed body is too short to contain a nonce and a tag
    #[error("sealed body truncated: {len} bytes, need at least {min}")]
    Truncated {
        /// Actual body length
        len: usize,
        /// Minimum valid body length
        min: usize,
    },

    /// Target key index is more than the skip bound ahead of the chain
    #[error("key index {requested} too far ahead of {current}")]
    TooFarAhead {
        /// Key index of the chain
        current: u32,
        /// Requested key index
        requested: u32,
    },
}

impl CryptoError {
    /// Returns true if this error came from opening a body with a key.
    ///
    /// These are the failures the engine absorbs by trying the next
    /// candidate key. Everything else is a caller or state problem.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::Truncated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_is_open_failure() {
        assert!(CryptoError::AuthenticationFailed.is_open_failure());
        assert!(CryptoError::Truncated { len: 3, min: 28 }.is_open_failure());
    }

    #[test]
    fn chain_errors_are_not_open_failures() {
        assert!(!CryptoError::KeyIndexOverflow { current: u32::MAX }.is_open_failure());
        assert!(!CryptoError::TooFarAhead { current: 0, requested: 5000 }.is_open_failure());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::Truncated { len: 3, min: 28 };
        assert_eq!(err.to_string(), "sealed body truncated: 3 bytes, need at least 28");
    }
}
