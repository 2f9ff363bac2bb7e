//! Cryptographic primitives for the trust circle engine.
//!
//! Wraps Ed25519 signing and Blake3 hashing with strong types, and defines the
//! signing/verification capabilities that the model and coder consume instead
//! of calling a concrete library directly.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::CoreError;

/// Shared surface of the fixed 32-byte newtypes: raw access, hex and a
/// short `Debug` form.
macro_rules! fixed_bytes {
    ($name:ident, $label:literal) => {
        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut arr = [0u8; 32];
                hex::decode_to_slice(s, &mut arr)?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

/// A Blake3 digest. Document ids and policy hashes are these.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

fixed_bytes!(Blake3Hash, "Blake3");

impl Blake3Hash {
    /// Placeholder before a document is hashed.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

/// A peer's Ed25519 signing identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

fixed_bytes!(Ed25519PublicKey, "Ed25519Pub");

impl Ed25519PublicKey {
    /// Check `signature` over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

/// A peer's X25519 key, used for session key agreement.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionPublicKey(pub [u8; 32]);

fixed_bytes!(EncryptionPublicKey, "X25519Pub");

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Placeholder while a document is being signed.
    pub const ZERO: Self = Self([0u8; 64]);

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}..)", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 64]> for Ed25519Signature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

// serde only derives for arrays up to 32 elements.
impl Serialize for Ed25519Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> de::Visitor<'de> for SignatureVisitor {
            type Value = Ed25519Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("64 signature bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let arr: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Ed25519Signature(arr))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut arr = [0u8; 64];
                for (i, byte) in arr.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| <A::Error as de::Error>::invalid_length(i, &self))?;
                }
                Ok(Ed25519Signature(arr))
            }
        }

        deserializer.deserialize_bytes(SignatureVisitor)
    }
}

/// The Ed25519 key a peer signs its documents with.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic keypair, for fixtures and key recovery.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// Something that can produce signatures on behalf of a peer.
///
/// Signing may be temporarily impossible (a locked device, a hardware token
/// that is unplugged). That condition is reported as
/// [`CoreError::SigningUnavailable`] and never waited on.
pub trait SigningCapability: Send + Sync {
    /// The public half of the signing key.
    fn public_key(&self) -> Ed25519PublicKey;

    /// Sign a message, or report that the key cannot be used right now.
    fn try_sign(&self, message: &[u8]) -> Result<Ed25519Signature, CoreError>;
}

impl SigningCapability for Keypair {
    fn public_key(&self) -> Ed25519PublicKey {
        Keypair::public_key(self)
    }

    fn try_sign(&self, message: &[u8]) -> Result<Ed25519Signature, CoreError> {
        Ok(self.sign(message))
    }
}

/// Signature verification, injected into the model.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `message` for the given public key.
    fn verify(
        &self,
        key: &Ed25519PublicKey,
        message: &[u8],
        signature: &Ed25519Signature,
    ) -> Result<(), CoreError>;
}

/// The default verifier, backed by ed25519-dalek.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        key: &Ed25519PublicKey,
        message: &[u8],
        signature: &Ed25519Signature,
    ) -> Result<(), CoreError> {
        key.verify(message, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        // Tampered message should fail
        assert!(keypair.public_key().verify(b"hello worlD", &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let kp1 = Keypair::from_seed(&[0x42; 32]);
        let kp2 = Keypair::from_seed(&[0x42; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"m"), kp2.sign(b"m"));
    }

    #[test]
    fn test_signing_capability_for_keypair() {
        let keypair = Keypair::from_seed(&[7; 32]);
        let signer: &dyn SigningCapability = &keypair;

        let sig = signer.try_sign(b"payload").unwrap();
        Ed25519Verifier
            .verify(&signer.public_key(), b"payload", &sig)
            .unwrap();
    }

    #[test]
    fn test_verifier_rejects_wrong_key() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let sig = a.sign(b"payload");

        let err = Ed25519Verifier
            .verify(&b.public_key(), b"payload", &sig)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSignature));
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let sig = Keypair::from_seed(&[3; 32]).sign(b"x");

        let mut cbor = Vec::new();
        ciborium::into_writer(&sig, &mut cbor).unwrap();
        let decoded: Ed25519Signature = ciborium::from_reader(cbor.as_slice()).unwrap();
        assert_eq!(sig, decoded);

        let json = serde_json::to_string(&sig).unwrap();
        let decoded: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, decoded);
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pk = Keypair::generate().public_key();
        let recovered = Ed25519PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, recovered);
    }
}
