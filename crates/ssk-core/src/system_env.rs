//! Production Environment implementation using the OS RNG.

use crate::env::Environment;

/// Production environment using cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Suitable for
/// root chain keys, nonces, and group private keys.
///
/// # Panics
///
/// Panics if the OS RNG fails. Continuing without functioning randomness
/// would produce predictable chain keys and nonces.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - keys cannot be generated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();
        assert_ne!(env.random_key(), env.random_key(), "Random bytes should differ");
    }

    #[test]
    fn system_env_random_bytes_fills_buffer() {
        let env = SystemEnv::new();

        let mut bytes = [0u8; 64];
        env.random_bytes(&mut bytes);

        let non_zero_count = bytes.iter().filter(|&&b| b != 0).count();
        assert!(non_zero_count > 32, "Most bytes should be non-zero");
    }
}
