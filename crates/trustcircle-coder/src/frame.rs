//! Wire frames exchanged between two coders.
//!
//! Every value a coder publishes is one CBOR-encoded [`Frame`]: three
//! handshake messages and the data frame.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use trustcircle_core::{from_cbor, to_cbor, Ed25519Signature, PeerId};

use crate::error::Result;

/// Current frame format version, carried in `Hello`.
pub const PROTOCOL_VERSION: u8 = 0;

const HELLO_DOMAIN: &[u8] = b"trustcircle-coder-v0:hello";
const REPLY_DOMAIN: &[u8] = b"trustcircle-coder-v0:reply";
const TRANSCRIPT_DOMAIN: &[u8] = b"trustcircle-coder-v0:transcript";

/// A coder wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Initiator's signed ephemeral key.
    Hello {
        version: u8,
        ephemeral: [u8; 32],
        signature: Ed25519Signature,
    },

    /// Responder's signed ephemeral key, echoing the initiator's.
    Reply {
        ephemeral: [u8; 32],
        echo: [u8; 32],
        signature: Ed25519Signature,
    },

    /// Initiator's proof that it derived the same keys.
    Confirm { mac: [u8; 32] },

    /// An AEAD-sealed application message.
    Data { counter: u64, ciphertext: Bytes },
}

impl Frame {
    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(from_cbor(bytes)?)
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Reply { .. } => "reply",
            Frame::Confirm { .. } => "confirm",
            Frame::Data { .. } => "data",
        }
    }
}

fn push_id(buf: &mut Vec<u8>, id: &PeerId) {
    let bytes = id.as_str().as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Bytes the initiator signs in `Hello`.
pub fn hello_message(sender: &PeerId, receiver: &PeerId, ephemeral: &[u8; 32]) -> Vec<u8> {
    let mut buf = HELLO_DOMAIN.to_vec();
    push_id(&mut buf, sender);
    push_id(&mut buf, receiver);
    buf.extend_from_slice(ephemeral);
    buf
}

/// Bytes the responder signs in `Reply`.
pub fn reply_message(
    sender: &PeerId,
    receiver: &PeerId,
    ephemeral: &[u8; 32],
    echo: &[u8; 32],
) -> Vec<u8> {
    let mut buf = REPLY_DOMAIN.to_vec();
    push_id(&mut buf, sender);
    push_id(&mut buf, receiver);
    buf.extend_from_slice(ephemeral);
    buf.extend_from_slice(echo);
    buf
}

/// Hash binding both identities and both ephemeral keys.
pub fn transcript(
    initiator: &PeerId,
    responder: &PeerId,
    initiator_ephemeral: &[u8; 32],
    responder_ephemeral: &[u8; 32],
) -> [u8; 32] {
    let mut buf = TRANSCRIPT_DOMAIN.to_vec();
    push_id(&mut buf, initiator);
    push_id(&mut buf, responder);
    buf.extend_from_slice(initiator_ephemeral);
    buf.extend_from_slice(responder_ephemeral);
    *blake3::hash(&buf).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frame_round_trip() {
        let frame = Frame::Data {
            counter: 42,
            ciphertext: Bytes::from_static(b"sealed"),
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.kind(), "data");
    }

    #[test]
    fn test_garbage_does_not_decode() {
        assert!(Frame::decode(b"\xff\x00not cbor").is_err());
    }

    #[test]
    fn test_signed_messages_bind_direction() {
        let a = PeerId::from("a");
        let b = PeerId::from("b");
        let eph = [1u8; 32];

        assert_ne!(hello_message(&a, &b, &eph), hello_message(&b, &a, &eph));
        assert_ne!(
            transcript(&a, &b, &eph, &[2u8; 32]),
            transcript(&b, &a, &eph, &[2u8; 32])
        );
    }

    #[test]
    fn test_id_length_prefix_prevents_ambiguity() {
        let eph = [0u8; 32];
        assert_ne!(
            hello_message(&PeerId::from("ab"), &PeerId::from("c"), &eph),
            hello_message(&PeerId::from("a"), &PeerId::from("bc"), &eph)
        );
    }
}
