//! Session key agreement and the two ciphers a negotiated session uses.
//!
//! X25519 ephemeral agreement, Blake3 key derivation, ChaCha20-Poly1305 for
//! framed messages and a raw ChaCha20 keystream for the streaming channel.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{CoderError, Result};

const KDF_INITIATOR_TO_RESPONDER: &str = "trustcircle-coder-v0 message initiator->responder";
const KDF_RESPONDER_TO_INITIATOR: &str = "trustcircle-coder-v0 message responder->initiator";
const KDF_STREAM_INITIATOR_TO_RESPONDER: &str = "trustcircle-coder-v0 stream initiator->responder";
const KDF_STREAM_RESPONDER_TO_INITIATOR: &str = "trustcircle-coder-v0 stream responder->initiator";
const KDF_CONFIRM: &str = "trustcircle-coder-v0 key confirmation";

/// An ephemeral X25519 secret.
///
/// Kept as a static secret so a half-finished negotiation survives a restart.
#[derive(Clone, Serialize, Deserialize)]
pub struct EphemeralSecret([u8; 32]);

impl EphemeralSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the public key.
    pub fn public_key(&self) -> [u8; 32] {
        *PublicKey::from(&StaticSecret::from(self.0)).as_bytes()
    }

    /// Agree on a shared secret with the remote ephemeral public key.
    pub fn diffie_hellman(&self, remote_public: &[u8; 32]) -> [u8; 32] {
        let shared = StaticSecret::from(self.0).diffie_hellman(&PublicKey::from(*remote_public));
        *shared.as_bytes()
    }
}

impl std::fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EphemeralSecret(..)")
    }
}

/// Which side of the handshake a peer played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
}

/// Directional keys of one negotiated session.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionKeys {
    pub send: [u8; 32],
    pub recv: [u8; 32],
    pub stream_send: [u8; 32],
    pub stream_recv: [u8; 32],
    pub confirm: [u8; 32],
}

impl SessionKeys {
    /// Derive both directions from the shared secret and handshake transcript.
    pub fn derive(role: Role, shared: &[u8; 32], transcript: &[u8; 32]) -> Self {
        let kdf = |context: &str| {
            let mut material = [0u8; 64];
            material[..32].copy_from_slice(shared);
            material[32..].copy_from_slice(transcript);
            blake3::derive_key(context, &material)
        };

        let i2r = kdf(KDF_INITIATOR_TO_RESPONDER);
        let r2i = kdf(KDF_RESPONDER_TO_INITIATOR);
        let stream_i2r = kdf(KDF_STREAM_INITIATOR_TO_RESPONDER);
        let stream_r2i = kdf(KDF_STREAM_RESPONDER_TO_INITIATOR);
        let confirm = kdf(KDF_CONFIRM);

        match role {
            Role::Initiator => Self {
                send: i2r,
                recv: r2i,
                stream_send: stream_i2r,
                stream_recv: stream_r2i,
                confirm,
            },
            Role::Responder => Self {
                send: r2i,
                recv: i2r,
                stream_send: stream_r2i,
                stream_recv: stream_i2r,
                confirm,
            },
        }
    }

    /// Key-confirmation tag over the transcript.
    pub fn confirmation(&self, transcript: &[u8; 32]) -> [u8; 32] {
        *blake3::keyed_hash(&self.confirm, transcript).as_bytes()
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Nonce layout: [ 0 0 0 0 | counter_be(8 bytes) ]. Keys are per session,
/// so a counter never repeats under one key.
fn nonce_from_counter(counter: u64) -> Nonce {
    let mut n = [0u8; 12];
    n[4..].copy_from_slice(&counter.to_be_bytes());
    n.into()
}

/// Seal one framed message.
pub fn seal(key: &[u8; 32], counter: u64, plaintext: &[u8]) -> Result<Vec<u8>> {
    let key: Key = (*key).into();
    let cipher = ChaCha20Poly1305::new(&key);
    cipher
        .encrypt(&nonce_from_counter(counter), plaintext)
        .map_err(|e| CoderError::Encryption(e.to_string()))
}

/// Open one framed message. `None` when authentication fails.
pub fn open(key: &[u8; 32], counter: u64, ciphertext: &[u8]) -> Option<Vec<u8>> {
    let key: Key = (*key).into();
    let cipher = ChaCha20Poly1305::new(&key);
    cipher.decrypt(&nonce_from_counter(counter), ciphertext).ok()
}

/// XOR `buf` with the ChaCha20 keystream starting at byte `position`.
pub fn apply_keystream(key: &[u8; 32], position: u64, buf: &mut [u8]) -> Result<()> {
    let mut cipher = ChaCha20::new(key.into(), &[0u8; 12].into());
    cipher
        .try_seek(position)
        .map_err(|e| CoderError::Encryption(e.to_string()))?;
    cipher
        .try_apply_keystream(buf)
        .map_err(|e| CoderError::Encryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_key_agreement() {
        let alice = EphemeralSecret::generate();
        let bob = EphemeralSecret::generate();

        assert_eq!(
            alice.diffie_hellman(&bob.public_key()),
            bob.diffie_hellman(&alice.public_key())
        );
    }

    #[test]
    fn test_session_keys_mirror() {
        let shared = [0x42; 32];
        let transcript = [0x17; 32];
        let initiator = SessionKeys::derive(Role::Initiator, &shared, &transcript);
        let responder = SessionKeys::derive(Role::Responder, &shared, &transcript);

        assert_eq!(initiator.send, responder.recv);
        assert_eq!(initiator.recv, responder.send);
        assert_eq!(initiator.stream_send, responder.stream_recv);
        assert_ne!(initiator.send, initiator.recv);
        assert_ne!(initiator.send, initiator.stream_send);
        assert_eq!(
            initiator.confirmation(&transcript),
            responder.confirmation(&transcript)
        );
    }

    #[test]
    fn test_seal_open() {
        let key = [7u8; 32];
        let sealed = seal(&key, 3, b"hello, world!").unwrap();

        assert_eq!(open(&key, 3, &sealed).unwrap(), b"hello, world!");
        assert!(open(&key, 4, &sealed).is_none());
        assert!(open(&[8u8; 32], 3, &sealed).is_none());
    }

    #[test]
    fn test_keystream_seek_matches_contiguous() {
        let key = [9u8; 32];
        let mut whole = vec![0u8; 200];
        apply_keystream(&key, 0, &mut whole).unwrap();

        let mut tail = vec![0u8; 137];
        apply_keystream(&key, 63, &mut tail).unwrap();
        assert_eq!(&whole[63..], &tail[..]);
    }
}
