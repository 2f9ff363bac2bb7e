//! Persisted coder state.

use serde::{Deserialize, Serialize};

use crate::crypto::{EphemeralSecret, Role, SessionKeys};

/// Format version of the persisted blob.
pub const STATE_VERSION: u8 = 0;

/// Negotiation phase. `Failed` is never stored: a failure resets straight
/// back to `Negotiating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Uninitialized,
    Negotiating,
    Ready,
}

/// Handshake material of the current (or last completed) negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub role: Role,
    pub local_secret: EphemeralSecret,
    pub local_ephemeral: [u8; 32],
    /// Known once the remote's Hello or Reply arrived.
    pub remote_ephemeral: Option<[u8; 32]>,
    /// Known once both ephemerals are known.
    pub keys: Option<SessionKeys>,
    pub transcript: Option<[u8; 32]>,
    /// Last negotiation frame sent, retransmitted on demand.
    pub last_sent: Vec<u8>,
}

/// Everything a coder needs to resume after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoderState {
    pub version: u8,
    pub phase: Phase,
    pub handshake: Option<Handshake>,
    /// Next data-frame counter to send.
    pub send_counter: u64,
    /// Lowest data-frame counter still accepted.
    pub recv_counter: u64,
    pub stream_send_position: u64,
    pub stream_recv_position: u64,
    /// Final byte of the last non-final streaming chunk, not yet decrypted.
    pub carry: Option<u8>,
    /// A wrap was refused because the session was not ready.
    pub pending_retry: bool,
}

impl CoderState {
    /// A coder that has never talked to the remote.
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            phase: Phase::Uninitialized,
            handshake: None,
            send_counter: 0,
            recv_counter: 0,
            stream_send_position: 0,
            stream_recv_position: 0,
            carry: None,
            pending_retry: false,
        }
    }

    /// Begin a fresh negotiation, discarding any previous session.
    pub fn start(&mut self, handshake: Handshake) {
        let pending_retry = self.pending_retry;
        *self = Self::new();
        self.phase = Phase::Negotiating;
        self.handshake = Some(handshake);
        self.pending_retry = pending_retry;
    }

    /// Session keys, only once the session is usable.
    pub fn ready_keys(&self) -> Option<&SessionKeys> {
        if self.phase != Phase::Ready {
            return None;
        }
        self.handshake.as_ref().and_then(|h| h.keys.as_ref())
    }
}

impl Default for CoderState {
    fn default() -> Self {
        Self::new()
    }
}
