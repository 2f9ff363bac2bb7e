//! The model's arena of peers, circles, vouchers and policies.
//!
//! `ModelState` is a plain value. The [`Model`](crate::Model) keeps it behind
//! an `Arc` so readers and the convergence algorithm work on cheap snapshots
//! while writers copy-on-write.

use std::collections::BTreeMap;

use trustcircle_core::{
    Blake3Hash, Circle, CircleId, CliqueId, DynamicInfo, PeerId, PermanentInfo, StableInfo,
    Voucher,
};
use trustcircle_policy::{PolicyDocument, PolicyRegistry};

use crate::error::{ModelError, Result};

/// Everything the model knows about one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub permanent: PermanentInfo,
    pub stable: Option<StableInfo>,
    pub dynamic: Option<DynamicInfo>,
}

impl PeerRecord {
    /// A freshly registered peer with no signed documents yet.
    pub fn new(permanent: PermanentInfo) -> Self {
        Self {
            permanent,
            stable: None,
            dynamic: None,
        }
    }

    /// Highest document version seen from this peer.
    pub fn highest_version(&self) -> u64 {
        let stable = self.stable.as_ref().map_or(0, |s| s.version);
        let dynamic = self.dynamic.as_ref().map_or(0, |d| d.version);
        stable.max(dynamic)
    }
}

/// Snapshot-able model contents.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    pub(crate) peers: BTreeMap<PeerId, PeerRecord>,
    pub(crate) circles: BTreeMap<CircleId, Circle>,
    /// candidate -> voucher id -> voucher
    pub(crate) vouchers: BTreeMap<PeerId, BTreeMap<Blake3Hash, Voucher>>,
    pub(crate) policies: PolicyRegistry,
}

impl ModelState {
    /// Look up a peer.
    pub fn peer(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    /// Look up a peer, failing with `UnknownPeer`.
    pub fn require_peer(&self, id: &PeerId) -> Result<&PeerRecord> {
        self.peers
            .get(id)
            .ok_or_else(|| ModelError::UnknownPeer(id.clone()))
    }

    /// Whether the id is registered.
    pub fn has_peer(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// All registered peer ids, ordered.
    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    /// All registered peer records, ordered by id.
    pub fn peers(&self) -> impl Iterator<Item = (&PeerId, &PeerRecord)> {
        self.peers.iter()
    }

    /// The peer's stored DynamicInfo.
    pub fn dynamic_info(&self, id: &PeerId) -> Option<&DynamicInfo> {
        self.peers.get(id).and_then(|r| r.dynamic.as_ref())
    }

    /// The peer's stored StableInfo.
    pub fn stable_info(&self, id: &PeerId) -> Option<&StableInfo> {
        self.peers.get(id).and_then(|r| r.stable.as_ref())
    }

    /// A registered circle generation.
    pub fn circle(&self, id: &CircleId) -> Option<&Circle> {
        self.circles.get(id)
    }

    /// Every registered circle generation, ordered by id.
    pub fn circles(&self) -> impl Iterator<Item = &Circle> {
        self.circles.values()
    }

    /// Every registered voucher, grouped by candidate.
    pub fn vouchers(&self) -> impl Iterator<Item = &Voucher> {
        self.vouchers.values().flat_map(|by_id| by_id.values())
    }

    /// Every registered generation of one clique.
    pub fn circles_in_clique<'a>(&'a self, clique: &'a CliqueId) -> impl Iterator<Item = &'a Circle> {
        self.circles.values().filter(move |c| &c.clique == clique)
    }

    /// Registered vouchers naming `candidate`.
    pub fn vouchers_for(&self, candidate: &PeerId) -> impl Iterator<Item = &Voucher> {
        self.vouchers
            .get(candidate)
            .into_iter()
            .flat_map(|by_id| by_id.values())
    }

    /// Highest epoch among registered peers.
    pub fn max_epoch(&self) -> u64 {
        self.peers
            .values()
            .map(|r| r.permanent.epoch)
            .max()
            .unwrap_or(0)
    }

    /// The policy document a peer opted into, when it is registered locally.
    pub fn policy_of(&self, id: &PeerId) -> Option<&PolicyDocument> {
        let stable = self.stable_info(id)?;
        self.policies.lookup(&stable.policy_hash)
    }

    /// Capability category of a peer under its own policy.
    pub fn category_of(&self, id: &PeerId) -> Option<&str> {
        let record = self.peers.get(id)?;
        self.policy_of(id)?
            .category_for_model(&record.permanent.model_id)
    }

    /// The policy registry.
    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// The circle a peer's DynamicInfo currently points at, if registered.
    pub fn current_circle_of(&self, id: &PeerId) -> Option<&Circle> {
        let dynamic = self.dynamic_info(id)?;
        self.circles.get(&dynamic.circle_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustcircle_core::{EncryptionPublicKey, Keypair};

    fn record(seed: u8, epoch: u64) -> PeerRecord {
        let keypair = Keypair::from_seed(&[seed; 32]);
        PeerRecord::new(PermanentInfo::new(
            "model",
            keypair.public_key(),
            EncryptionPublicKey::from_bytes([seed; 32]),
            epoch,
        ))
    }

    #[test]
    fn test_max_epoch() {
        let mut state = ModelState::default();
        assert_eq!(state.max_epoch(), 0);

        for (seed, epoch) in [(1, 3), (2, 7), (3, 5)] {
            let r = record(seed, epoch);
            state.peers.insert(r.permanent.peer_id.clone(), r);
        }
        assert_eq!(state.max_epoch(), 7);
    }

    #[test]
    fn test_require_peer_unknown() {
        let state = ModelState::default();
        assert!(matches!(
            state.require_peer(&PeerId::from("ghost")),
            Err(ModelError::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_vouchers_for_empty() {
        let state = ModelState::default();
        assert_eq!(state.vouchers_for(&PeerId::from("x")).count(), 0);
    }

    #[test]
    fn test_highest_version_without_documents() {
        assert_eq!(record(1, 0).highest_version(), 0);
    }
}
