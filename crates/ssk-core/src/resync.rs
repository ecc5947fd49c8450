//! Resynchronization requests.
//!
//! When local ratchet state cannot serve a message, the engine asks the
//! application to fetch a fresh copy of the sender's chain. How that request
//! travels (a control message to the sender, a job queue) is outside the
//! engine.

use crate::types::PublicKey;

/// Receives requests to redistribute a sender's ratchet.
///
/// Fire-and-forget: the engine ignores whatever the delegate does and never
/// waits for the redistributed chain. A request is issued when
///
/// - `encrypt` finds no Current ratchet for the local sender, or
/// - `decrypt` fails against both generations.
pub trait ResyncDelegate: Send + Sync {
    /// Ask `sender` to send its current chain for `group` again.
    fn request_sender_key(&self, group: &PublicKey, sender: &PublicKey);
}

impl<F> ResyncDelegate for F
where
    F: Fn(&PublicKey, &PublicKey) + Send + Sync,
{
    fn request_sender_key(&self, group: &PublicKey, sender: &PublicKey) {
        self(group, sender);
    }
}
