//! The value published under a circle key.
//!
//! Each account publishes everything its model knows about the circle. A
//! receiver merges it document by document through the model's ordinary
//! registration calls, so signatures and versions are checked exactly as for
//! local updates and merging the same snapshot twice changes nothing.

use serde::{Deserialize, Serialize};

use trustcircle_core::{
    from_cbor, to_cbor, Circle, DynamicInfo, PermanentInfo, StableInfo, Voucher,
};
use trustcircle_model::{Model, ModelError, ModelState, UpdateResult};
use trustcircle_policy::PolicyDocument;

use crate::error::Result;

/// Format version of [`CircleSnapshot`].
pub const SNAPSHOT_VERSION: u8 = 0;

/// One peer's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDocuments {
    pub permanent: PermanentInfo,
    pub stable: Option<StableInfo>,
    pub dynamic: Option<DynamicInfo>,
}

/// Everything one account knows about its circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleSnapshot {
    pub version: u8,
    pub peers: Vec<PeerDocuments>,
    pub circles: Vec<Circle>,
    pub vouchers: Vec<Voucher>,
    pub policies: Vec<PolicyDocument>,
}

/// Counts from merging a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Documents that changed the model.
    pub applied: usize,
    /// Documents refused for a reason other than being old.
    pub rejected: usize,
}

impl CircleSnapshot {
    /// Capture a model state.
    pub fn capture(state: &ModelState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            peers: state
                .peers()
                .map(|(_, record)| PeerDocuments {
                    permanent: record.permanent.clone(),
                    stable: record.stable.clone(),
                    dynamic: record.dynamic.clone(),
                })
                .collect(),
            circles: state.circles().cloned().collect(),
            vouchers: state.vouchers().cloned().collect(),
            policies: state.policies().documents().cloned().collect(),
        }
    }

    /// Encode for publishing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Decode a published value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(from_cbor(bytes)?)
    }

    /// Merge into `model`. Blocking: verifies every signature.
    ///
    /// Policies and peers go first so signed documents can be checked
    /// against their authors. Circles go last: only generations some
    /// accepted DynamicInfo points at are kept.
    pub fn merge_into(self, model: &Model) -> MergeReport {
        let mut report = MergeReport::default();

        for policy in self.policies {
            report.record(model.register_policy(policy));
        }
        for peer in &self.peers {
            report.record(model.register_peer(peer.permanent.clone()));
        }
        for voucher in self.vouchers {
            report.record(model.register_voucher(voucher));
        }
        for peer in self.peers {
            let id = peer.permanent.peer_id;
            if let Some(stable) = peer.stable {
                report.record(model.update_stable_info(&id, stable));
            }
            if let Some(dynamic) = peer.dynamic {
                report.record(model.update_dynamic_info(&id, dynamic));
            }
        }
        for circle in self.circles {
            report.record(model.register_circle(circle));
        }

        report
    }
}

impl MergeReport {
    fn record(&mut self, result: std::result::Result<UpdateResult, ModelError>) {
        match result {
            Ok(UpdateResult::Applied) => self.applied += 1,
            Ok(UpdateResult::Unchanged) => {}
            Err(e) if e.is_benign() => tracing::debug!(error = %e, "skipped document"),
            Err(e) => {
                tracing::warn!(error = %e, "rejected document from circle snapshot");
                self.rejected += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use trustcircle_core::{CliqueId, EncryptionPublicKey, Keypair};

    fn peer(seed: u8) -> (Keypair, PermanentInfo) {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let info = PermanentInfo::new(
            "Mac14,2",
            keypair.public_key(),
            EncryptionPublicKey::from_bytes([seed; 32]),
            0,
        );
        (keypair, info)
    }

    fn bootstrapped() -> (Model, PermanentInfo) {
        let model = Model::new();
        let (keypair, info) = peer(1);
        model.register_peer(info.clone()).unwrap();
        model
            .advance_peer(
                &info.peer_id,
                &BTreeSet::new(),
                &BTreeSet::new(),
                &keypair,
                || CliqueId::new("clique"),
            )
            .unwrap();
        (model, info)
    }

    #[test]
    fn test_merge_reproduces_model() {
        let (source, founder) = bootstrapped();
        let snapshot = CircleSnapshot::capture(&source.snapshot());
        let decoded = CircleSnapshot::from_bytes(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);

        let target = Model::new();
        let report = decoded.merge_into(&target);
        assert_eq!(report.rejected, 0);
        assert_eq!(target.dynamic_info(&founder.peer_id), source.dynamic_info(&founder.peer_id));
        assert_eq!(
            target.current_circle_of(&founder.peer_id),
            source.current_circle_of(&founder.peer_id)
        );
    }

    #[test]
    fn test_merge_twice_is_noop() {
        let (source, _) = bootstrapped();
        let snapshot = CircleSnapshot::capture(&source.snapshot());
        let target = Model::new();

        assert!(snapshot.clone().merge_into(&target).applied > 0);
        assert_eq!(snapshot.merge_into(&target), MergeReport::default());
    }

    #[test]
    fn test_tampered_document_rejected() {
        let (source, founder) = bootstrapped();
        let mut snapshot = CircleSnapshot::capture(&source.snapshot());
        let dynamic = snapshot.peers[0].dynamic.as_mut().unwrap();
        dynamic.included.insert(trustcircle_core::PeerId::from("intruder"));

        let target = Model::new();
        let report = snapshot.merge_into(&target);
        assert_eq!(report.rejected, 1);
        assert!(target.has_peer(&founder.peer_id));
        assert!(target.dynamic_info(&founder.peer_id).is_none());
        assert!(target.current_circle_of(&founder.peer_id).is_none());
    }

    #[test]
    fn test_unreferenced_circle_skipped() {
        let (source, founder) = bootstrapped();
        let mut snapshot = CircleSnapshot::capture(&source.snapshot());
        let forged = Circle::new(CliqueId::new("clique"), u64::MAX, [founder.peer_id.clone()]);
        snapshot.circles.push(forged.clone());

        let target = Model::new();
        let report = snapshot.merge_into(&target);
        assert_eq!(report.rejected, 0);
        assert!(target.circle(&forged.id()).is_none());
        assert_eq!(
            target.current_circle_of(&founder.peer_id),
            source.current_circle_of(&founder.peer_id)
        );
    }
}
