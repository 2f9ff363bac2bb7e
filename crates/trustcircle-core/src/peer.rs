//! Peer documents: the three layers describing one device identity.
//!
//! - [`PermanentInfo`] binds the peer id to its public keys. Immutable.
//! - [`StableInfo`] carries self-asserted attributes (device class, policy
//!   opt-in). Signed by the peer, versioned.
//! - [`DynamicInfo`] carries the peer's trust edges and the circle generation
//!   they were computed against. Signed by the peer, versioned.
//!
//! Only the peer itself authors its StableInfo and DynamicInfo; everyone else
//! receives, verifies and stores copies.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::{dynamic_info_bytes, permanent_info_bytes, signed_message, stable_info_bytes};
use crate::circle::Circle;
use crate::crypto::{
    Blake3Hash, Ed25519PublicKey, Ed25519Signature, EncryptionPublicKey, SigningCapability,
};
use crate::error::CoreError;
use crate::types::{CircleId, CliqueId, PeerId};

/// Domain separator for StableInfo signatures.
pub const STABLE_INFO_DOMAIN: &[u8] = b"trustcircle-stable-v0:";

/// Domain separator for DynamicInfo signatures.
pub const DYNAMIC_INFO_DOMAIN: &[u8] = b"trustcircle-dynamic-v0:";

/// Immutable identity of a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermanentInfo {
    /// Derived from, and equal to, the hash of the key material.
    pub peer_id: PeerId,
    /// Hardware model identifier; policies map it to a capability category.
    pub model_id: String,
    pub signing_key: Ed25519PublicKey,
    pub encryption_key: EncryptionPublicKey,
    /// Peer-local counter of how far its knowledge of the circle has advanced.
    pub epoch: u64,
}

impl PermanentInfo {
    /// Build a PermanentInfo whose id is derived from the keys.
    pub fn new(
        model_id: impl Into<String>,
        signing_key: Ed25519PublicKey,
        encryption_key: EncryptionPublicKey,
        epoch: u64,
    ) -> Self {
        Self {
            peer_id: PeerId::derive(&signing_key, &encryption_key),
            model_id: model_id.into(),
            signing_key,
            encryption_key,
            epoch,
        }
    }

    /// Check that the peer id is the one derived from the key material.
    pub fn validate(&self) -> Result<(), CoreError> {
        let derived = PeerId::derive(&self.signing_key, &self.encryption_key);
        if derived != self.peer_id {
            return Err(CoreError::MalformedIdentity {
                claimed: self.peer_id.to_string(),
                derived: derived.to_string(),
            });
        }
        Ok(())
    }

    /// Canonical encoding.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        permanent_info_bytes(self)
    }
}

/// Self-asserted, signed peer attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableInfo {
    /// Strictly increasing on every change.
    pub version: u64,
    pub device_class: String,
    /// Version of the policy document the peer opted into.
    pub policy_version: u64,
    /// Content hash of that policy document.
    pub policy_hash: Blake3Hash,
    /// Optional per-policy secrets, keyed by name.
    pub policy_secrets: BTreeMap<String, Vec<u8>>,
    pub signature: Ed25519Signature,
}

impl StableInfo {
    /// Start building a StableInfo at the given version.
    pub fn builder(version: u64) -> StableInfoBuilder {
        StableInfoBuilder::new(version)
    }

    /// The bytes covered by the signature.
    pub fn signed_message(&self) -> Vec<u8> {
        signed_message(STABLE_INFO_DOMAIN, &stable_info_bytes(self))
    }

    /// True when everything except the signature matches.
    pub fn same_content(&self, other: &StableInfo) -> bool {
        stable_info_bytes(self) == stable_info_bytes(other)
    }
}

/// Builder for [`StableInfo`].
#[derive(Debug, Clone)]
pub struct StableInfoBuilder {
    version: u64,
    device_class: String,
    policy_version: u64,
    policy_hash: Blake3Hash,
    policy_secrets: BTreeMap<String, Vec<u8>>,
}

impl StableInfoBuilder {
    /// Start building at the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            device_class: String::new(),
            policy_version: 0,
            policy_hash: Blake3Hash::ZERO,
            policy_secrets: BTreeMap::new(),
        }
    }

    /// Set the device class.
    pub fn device_class(mut self, class: impl Into<String>) -> Self {
        self.device_class = class.into();
        self
    }

    /// Opt into a policy document.
    pub fn policy(mut self, version: u64, hash: Blake3Hash) -> Self {
        self.policy_version = version;
        self.policy_hash = hash;
        self
    }

    /// Attach a per-policy secret.
    pub fn secret(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.policy_secrets.insert(name.into(), value.into());
        self
    }

    /// Build and sign.
    pub fn sign(self, signer: &dyn SigningCapability) -> Result<StableInfo, CoreError> {
        let mut info = StableInfo {
            version: self.version,
            device_class: self.device_class,
            policy_version: self.policy_version,
            policy_hash: self.policy_hash,
            policy_secrets: self.policy_secrets,
            signature: Ed25519Signature::ZERO,
        };
        info.signature = signer.try_sign(&info.signed_message())?;
        Ok(info)
    }
}

/// A peer's signed view of its trust edges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicInfo {
    /// Strictly increasing on every change.
    pub version: u64,
    /// Clique of the circle this view was computed against.
    pub clique: CliqueId,
    /// Back-reference to the circle generation this view was computed against.
    pub circle_id: CircleId,
    pub circle_generation: u64,
    /// Peers this peer trusts, itself included.
    pub included: BTreeSet<PeerId>,
    /// Peers this peer has explicitly removed.
    pub excluded: BTreeSet<PeerId>,
    pub signature: Ed25519Signature,
}

impl DynamicInfo {
    /// Start building a DynamicInfo at the given version.
    pub fn builder(version: u64, circle: &Circle) -> DynamicInfoBuilder {
        DynamicInfoBuilder::new(version, circle)
    }

    /// The bytes covered by the signature.
    pub fn signed_message(&self) -> Vec<u8> {
        signed_message(DYNAMIC_INFO_DOMAIN, &dynamic_info_bytes(self))
    }

    /// True when everything except the signature matches.
    pub fn same_content(&self, other: &DynamicInfo) -> bool {
        dynamic_info_bytes(self) == dynamic_info_bytes(other)
    }

    /// Whether this view trusts `peer`.
    pub fn trusts(&self, peer: &PeerId) -> bool {
        self.included.contains(peer)
    }

    /// Whether this view excludes `peer`.
    pub fn excludes(&self, peer: &PeerId) -> bool {
        self.excluded.contains(peer)
    }
}

/// Builder for [`DynamicInfo`].
#[derive(Debug, Clone)]
pub struct DynamicInfoBuilder {
    version: u64,
    clique: CliqueId,
    circle_id: CircleId,
    circle_generation: u64,
    included: BTreeSet<PeerId>,
    excluded: BTreeSet<PeerId>,
}

impl DynamicInfoBuilder {
    /// Start building against the given circle generation.
    pub fn new(version: u64, circle: &Circle) -> Self {
        Self {
            version,
            clique: circle.clique.clone(),
            circle_id: circle.id(),
            circle_generation: circle.generation,
            included: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    /// Add a trusted peer.
    pub fn include(mut self, peer: PeerId) -> Self {
        self.included.insert(peer);
        self
    }

    /// Replace the trusted set.
    pub fn included(mut self, peers: impl IntoIterator<Item = PeerId>) -> Self {
        self.included = peers.into_iter().collect();
        self
    }

    /// Replace the excluded set.
    pub fn excluded(mut self, peers: impl IntoIterator<Item = PeerId>) -> Self {
        self.excluded = peers.into_iter().collect();
        self
    }

    /// Build and sign.
    pub fn sign(self, signer: &dyn SigningCapability) -> Result<DynamicInfo, CoreError> {
        let mut info = DynamicInfo {
            version: self.version,
            clique: self.clique,
            circle_id: self.circle_id,
            circle_generation: self.circle_generation,
            included: self.included,
            excluded: self.excluded,
            signature: Ed25519Signature::ZERO,
        };
        info.signature = signer.try_sign(&info.signed_message())?;
        Ok(info)
    }
}
