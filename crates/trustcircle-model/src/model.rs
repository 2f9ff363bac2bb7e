//! The peer/circle/voucher model.
//!
//! One `Model` per local account. All mutations run under a single exclusive
//! lock because convergence and signature chains span peers; queries take the
//! shared lock or work on an `Arc` snapshot. Signature checks and signing run
//! outside the lock against a snapshot, and writers re-validate versions when
//! they apply.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use trustcircle_core::{
    validation, Circle, CircleId, CliqueId, DynamicInfo, Ed25519Verifier, PeerId, PermanentInfo,
    SignatureVerifier, SigningCapability, StableInfo, Voucher,
};
use trustcircle_policy::{PolicyDocument, RegisterResult};

use crate::convergence::{self, Convergence};
use crate::error::{ModelError, Result};
use crate::state::{ModelState, PeerRecord};
use crate::status::{self, Membership, PeerStatus};

/// Result of a registration or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The model changed.
    Applied,
    /// The document was already known; nothing changed.
    Unchanged,
}

/// The in-memory trust model for one account.
pub struct Model {
    state: RwLock<Arc<ModelState>>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Model")
            .field("peers", &state.peers.len())
            .field("circles", &state.circles.len())
            .field("policies", &state.policies.len())
            .finish()
    }
}

impl Model {
    /// Create an empty model verifying with Ed25519.
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(Ed25519Verifier))
    }

    /// Create an empty model with an injected verifier.
    pub fn with_verifier(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            state: RwLock::new(Arc::new(ModelState::default())),
            verifier,
        }
    }

    /// A consistent, immutable view of the current state.
    pub fn snapshot(&self) -> Arc<ModelState> {
        Arc::clone(&self.read())
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<ModelState>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<ModelState>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a writable state under the exclusive lock.
    ///
    /// `f` must validate before it mutates: an error leaves the state as is.
    fn mutate<R>(&self, f: impl FnOnce(&mut ModelState) -> Result<R>) -> Result<R> {
        let mut guard = self.write();
        f(Arc::make_mut(&mut guard))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a peer's PermanentInfo. Idempotent.
    pub fn register_peer(&self, permanent: PermanentInfo) -> Result<UpdateResult> {
        validation::validate_permanent_info(&permanent)?;

        self.mutate(|state| {
            if let Some(existing) = state.peers.get(&permanent.peer_id) {
                if existing.permanent == permanent {
                    return Ok(UpdateResult::Unchanged);
                }
                tracing::warn!(peer = %permanent.peer_id, "identity conflict");
                return Err(ModelError::IdentityConflict(permanent.peer_id));
            }
            tracing::debug!(peer = %permanent.peer_id, epoch = permanent.epoch, "registered peer");
            state
                .peers
                .insert(permanent.peer_id.clone(), PeerRecord::new(permanent));
            Ok(UpdateResult::Applied)
        })
    }

    /// Store a newer StableInfo for `peer` after verifying its signature.
    pub fn update_stable_info(&self, peer: &PeerId, stable: StableInfo) -> Result<UpdateResult> {
        let author = self.snapshot().require_peer(peer)?.permanent.clone();
        if validation::verify_stable_info(&author, &stable, self.verifier.as_ref()).is_err() {
            tracing::warn!(peer = %peer, version = stable.version, "rejected stable info signature");
            return Err(ModelError::BadSignature { peer: peer.clone() });
        }

        self.mutate(|state| {
            let record = state
                .peers
                .get_mut(peer)
                .ok_or_else(|| ModelError::UnknownPeer(peer.clone()))?;
            if let Some(current) = &record.stable {
                if current.version == stable.version && current.same_content(&stable) {
                    return Ok(UpdateResult::Unchanged);
                }
                if stable.version <= current.version {
                    return Err(ModelError::StaleVersion {
                        peer: peer.clone(),
                        current: current.version,
                        offered: stable.version,
                    });
                }
            }
            tracing::debug!(peer = %peer, version = stable.version, "stable info updated");
            record.stable = Some(stable);
            Ok(UpdateResult::Applied)
        })
    }

    /// Store a newer DynamicInfo for `peer` after verifying its signature.
    pub fn update_dynamic_info(&self, peer: &PeerId, dynamic: DynamicInfo) -> Result<UpdateResult> {
        let author = self.snapshot().require_peer(peer)?.permanent.clone();
        if validation::verify_dynamic_info(&author, &dynamic, self.verifier.as_ref()).is_err() {
            tracing::warn!(peer = %peer, version = dynamic.version, "rejected dynamic info signature");
            return Err(ModelError::BadSignature { peer: peer.clone() });
        }

        self.mutate(|state| {
            if let Some(circle) = state.circles.get(&dynamic.circle_id) {
                if circle.generation != dynamic.circle_generation {
                    return Err(ModelError::CircleIdMismatch {
                        circle: dynamic.circle_id.to_hex(),
                        registered: circle.generation,
                        claimed: dynamic.circle_generation,
                    });
                }
            }
            let record = state
                .peers
                .get_mut(peer)
                .ok_or_else(|| ModelError::UnknownPeer(peer.clone()))?;
            apply_dynamic(record, peer, dynamic)
        })
    }

    /// Register a policy document after checking its content hash.
    pub fn register_policy(&self, document: PolicyDocument) -> Result<UpdateResult> {
        self.mutate(|state| match state.policies.register(document)? {
            RegisterResult::Inserted => Ok(UpdateResult::Applied),
            RegisterResult::AlreadyExists => Ok(UpdateResult::Unchanged),
        })
    }

    /// Register a circle generation computed elsewhere. Idempotent.
    ///
    /// The circle must be the one a registered peer's signed DynamicInfo
    /// points at; anything else is `UnreferencedCircle`.
    pub fn register_circle(&self, circle: Circle) -> Result<UpdateResult> {
        let id = circle.id();
        self.mutate(|state| {
            if state.circles.contains_key(&id) {
                return Ok(UpdateResult::Unchanged);
            }
            let referenced = state.peers.values().filter_map(|r| r.dynamic.as_ref()).any(|d| {
                d.circle_id == id && d.clique == circle.clique && d.circle_generation == circle.generation
            });
            if !referenced {
                tracing::debug!(circle = %id, generation = circle.generation, "unreferenced circle");
                return Err(ModelError::UnreferencedCircle(id.to_hex()));
            }
            Ok(insert_circle(state, circle))
        })
    }

    /// Register a voucher; the sponsor must be known, the candidate need not be.
    ///
    /// Registering the same voucher again is a no-op success.
    pub fn register_voucher(&self, voucher: Voucher) -> Result<UpdateResult> {
        let sponsor = self.snapshot().require_peer(&voucher.sponsor)?.permanent.clone();
        if validation::verify_voucher(&sponsor, &voucher, self.verifier.as_ref()).is_err() {
            tracing::warn!(sponsor = %voucher.sponsor, candidate = %voucher.candidate, "rejected voucher signature");
            return Err(ModelError::BadSignature {
                peer: voucher.sponsor.clone(),
            });
        }

        self.mutate(|state| {
            let by_id = state.vouchers.entry(voucher.candidate.clone()).or_default();
            let id = voucher.id();
            if by_id.contains_key(&id) {
                return Ok(UpdateResult::Unchanged);
            }
            tracing::debug!(sponsor = %voucher.sponsor, candidate = %voucher.candidate, "registered voucher");
            by_id.insert(id, voucher);
            Ok(UpdateResult::Applied)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Vouchers and convergence
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a voucher from `sponsor` for `candidate`, if policy allows.
    ///
    /// Returns `Ok(None)` when the sponsor's policy forbids the introduction
    /// or the sponsor's policy is not registered. The voucher is not registered.
    pub fn create_voucher(
        &self,
        candidate: &PermanentInfo,
        sponsor: &PeerId,
        signer: &dyn SigningCapability,
        issued_at: i64,
    ) -> Result<Option<Voucher>> {
        candidate.validate()?;
        let snapshot = self.snapshot();
        let record = snapshot.require_peer(sponsor)?;
        if signer.public_key() != record.permanent.signing_key {
            return Err(ModelError::SignerMismatch {
                peer: sponsor.clone(),
            });
        }

        let Some(policy) = snapshot.policy_of(sponsor) else {
            tracing::debug!(sponsor = %sponsor, "sponsor policy unavailable, denying voucher");
            return Ok(None);
        };
        let sponsor_category = policy.category_for_model(&record.permanent.model_id);
        let candidate_category = policy.category_for_model(&candidate.model_id);
        let allowed = match (sponsor_category, candidate_category) {
            (Some(s), Some(c)) => policy.can_introduce(s, c),
            _ => false,
        };
        if !allowed {
            tracing::debug!(
                sponsor = %sponsor,
                candidate = %candidate.peer_id,
                "policy forbids introduction"
            );
            return Ok(None);
        }

        let voucher = Voucher::sign(candidate.peer_id.clone(), sponsor.clone(), issued_at, signer)?;
        Ok(Some(voucher))
    }

    /// Run the convergence algorithm for `peer` without changing the model.
    pub fn calculate_dynamic_info<F>(
        &self,
        peer: &PeerId,
        adding: &BTreeSet<PeerId>,
        removing: &BTreeSet<PeerId>,
        signer: &dyn SigningCapability,
        clique_factory: F,
    ) -> Result<Convergence>
    where
        F: FnOnce() -> CliqueId,
    {
        let snapshot = self.snapshot();
        convergence::calculate(&snapshot, peer, adding, removing, signer, clique_factory)
    }

    /// Converge `peer` and apply the resulting circle and DynamicInfo.
    ///
    /// Computes on a snapshot and re-acquires the exclusive lock to apply. If
    /// another writer stored a DynamicInfo at or beyond the computed version
    /// in between, `StaleVersion` is returned and nothing is applied.
    pub fn advance_peer<F>(
        &self,
        peer: &PeerId,
        adding: &BTreeSet<PeerId>,
        removing: &BTreeSet<PeerId>,
        signer: &dyn SigningCapability,
        clique_factory: F,
    ) -> Result<Convergence>
    where
        F: FnOnce() -> CliqueId,
    {
        let result = self.calculate_dynamic_info(peer, adding, removing, signer, clique_factory)?;
        if !result.changed {
            return Ok(result);
        }

        self.mutate(|state| {
            let record = state
                .peers
                .get_mut(peer)
                .ok_or_else(|| ModelError::UnknownPeer(peer.clone()))?;
            if let Some(current) = &record.dynamic {
                if current.version >= result.dynamic_info.version {
                    return Err(ModelError::StaleVersion {
                        peer: peer.clone(),
                        current: current.version,
                        offered: result.dynamic_info.version,
                    });
                }
            }
            record.dynamic = Some(result.dynamic_info.clone());
            insert_circle(state, result.circle.clone());
            Ok(())
        })?;

        tracing::info!(
            peer = %peer,
            clique = %result.circle.clique,
            generation = result.circle.generation,
            members = result.circle.len(),
            "advanced peer"
        );
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Derived queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Status bitset of a registered peer.
    pub fn status_of(&self, peer: &PeerId) -> Result<PeerStatus> {
        let state = self.read();
        state.require_peer(peer)?;
        Ok(status::status_of(&state, peer))
    }

    /// Membership classification of any peer id.
    pub fn membership_of(&self, peer: &PeerId) -> Membership {
        status::membership_of(&self.read(), peer)
    }

    /// Whether both peers currently trust each other.
    pub fn is_mutually_trusted(&self, a: &PeerId, b: &PeerId) -> bool {
        status::mutually_trusted(&self.read(), a, b)
    }

    /// Peers trusted by `peer` that may access `view`.
    ///
    /// Each trusted peer is judged under its own opted-in policy; a trusted
    /// peer whose policy is not registered locally is left out.
    pub fn peers_trusted_by(&self, peer: &PeerId, view: &str) -> Result<BTreeSet<PeerId>> {
        let state = self.read();
        state.policies().require_view(view)?;
        state.require_peer(peer)?;

        let Some(dynamic) = state.dynamic_info(peer) else {
            return Ok(BTreeSet::new());
        };
        let allowed = dynamic
            .included
            .iter()
            .filter(|id| *id != peer)
            .filter(|id| {
                let Some(stable) = state.stable_info(id) else {
                    return false;
                };
                let category = state.category_of(id);
                state
                    .policies()
                    .evaluate(&stable.policy_hash, category, view)
            })
            .cloned()
            .collect();
        Ok(allowed)
    }

    /// Highest document version seen from each registered peer.
    pub fn vector_clock(&self) -> BTreeMap<PeerId, u64> {
        self.read()
            .peers()
            .map(|(id, record)| (id.clone(), record.highest_version()))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `peer` is registered.
    pub fn has_peer(&self, peer: &PeerId) -> bool {
        self.read().has_peer(peer)
    }

    /// All registered peer ids.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.read().peer_ids().cloned().collect()
    }

    /// A peer's PermanentInfo.
    pub fn permanent_info(&self, peer: &PeerId) -> Option<PermanentInfo> {
        self.read().peer(peer).map(|r| r.permanent.clone())
    }

    /// A peer's current StableInfo.
    pub fn stable_info(&self, peer: &PeerId) -> Option<StableInfo> {
        self.read().stable_info(peer).cloned()
    }

    /// A peer's current DynamicInfo.
    pub fn dynamic_info(&self, peer: &PeerId) -> Option<DynamicInfo> {
        self.read().dynamic_info(peer).cloned()
    }

    /// A registered circle generation.
    pub fn circle(&self, id: &CircleId) -> Option<Circle> {
        self.read().circle(id).cloned()
    }

    /// The circle a peer's DynamicInfo currently references.
    pub fn current_circle_of(&self, peer: &PeerId) -> Option<Circle> {
        self.read().current_circle_of(peer).cloned()
    }

    /// Vouchers registered for a candidate.
    pub fn vouchers_for(&self, candidate: &PeerId) -> Vec<Voucher> {
        self.read().vouchers_for(candidate).cloned().collect()
    }
}

fn insert_circle(state: &mut ModelState, circle: Circle) -> UpdateResult {
    let id = circle.id();
    if state.circles.contains_key(&id) {
        return UpdateResult::Unchanged;
    }
    tracing::debug!(circle = %id, generation = circle.generation, "registered circle");
    state.circles.insert(id, circle);
    UpdateResult::Applied
}

fn apply_dynamic(record: &mut PeerRecord, peer: &PeerId, dynamic: DynamicInfo) -> Result<UpdateResult> {
    if let Some(current) = &record.dynamic {
        if current.version == dynamic.version && current.same_content(&dynamic) {
            return Ok(UpdateResult::Unchanged);
        }
        if dynamic.version <= current.version {
            tracing::debug!(peer = %peer, current = current.version, offered = dynamic.version, "stale dynamic info");
            return Err(ModelError::StaleVersion {
                peer: peer.clone(),
                current: current.version,
                offered: dynamic.version,
            });
        }
    }
    tracing::debug!(peer = %peer, version = dynamic.version, "dynamic info updated");
    record.dynamic = Some(dynamic);
    Ok(UpdateResult::Applied)
}
