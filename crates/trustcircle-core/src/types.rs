//! Strong type definitions for the trust circle engine.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Ed25519PublicKey, EncryptionPublicKey};

/// Domain separator for deriving peer ids from key material.
pub const PEER_ID_DOMAIN: &[u8] = b"trustcircle-peer-v0:";

/// Identifier of a peer (one device identity).
///
/// Ids minted by [`PeerId::derive`] are the lowercase hex of
/// `Blake3(PEER_ID_DOMAIN || signing_key || encryption_key)`. Any string is
/// accepted where ids only travel through the key namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an arbitrary id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id bound to the given public key material.
    pub fn derive(signing_key: &Ed25519PublicKey, encryption_key: &EncryptionPublicKey) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(PEER_ID_DOMAIN);
        hasher.update(signing_key.as_bytes());
        hasher.update(encryption_key.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Borrow the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..16).unwrap_or(&self.0);
        write!(f, "PeerId({short})")
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable identifier shared by every generation of one circle.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CliqueId(String);

impl CliqueId {
    /// Wrap a clique id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh clique id from a founding peer and a nonce (usually a timestamp).
    pub fn mint(founder: &PeerId, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"trustcircle-clique-v0:");
        hasher.update(founder.as_str().as_bytes());
        hasher.update(&nonce.to_be_bytes());
        let hex = hasher.finalize().to_hex().to_string();
        Self(hex[..32].to_owned())
    }

    /// Borrow the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CliqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CliqueId({})", self.0)
    }
}

impl fmt::Display for CliqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CliqueId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A 32-byte circle identifier, computed as Blake3(canonical_bytes(circle)).
///
/// This is the content-address of one circle generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CircleId(pub [u8; 32]);

impl CircleId {
    /// Create a new CircleId from raw bytes.
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

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for CircleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CircleId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for CircleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for CircleId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
