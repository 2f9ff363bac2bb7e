//! Test fixtures and helpers.
//!
//! Common setup code for integration tests and benchmarks.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use trustcircle_core::{
    Blake3Hash, CliqueId, CoreError, Ed25519PublicKey, Ed25519Signature, EncryptionPublicKey,
    Keypair, PeerId, PermanentInfo, SigningCapability, StableInfo, Voucher,
};
use trustcircle_model::{Convergence, Model};
use trustcircle_policy::PolicyDocument;

/// A deterministic peer: keys from a one-byte seed.
pub struct TestPeer {
    pub id: PeerId,
    pub keypair: Keypair,
    pub permanent: PermanentInfo,
    seed: u8,
}

impl TestPeer {
    /// A "Mac" peer at epoch 0.
    pub fn new(seed: u8) -> Self {
        Self::build(seed, "Mac14,2", 0)
    }

    /// A peer with a specific hardware model id.
    pub fn with_model(seed: u8, model_id: &str) -> Self {
        Self::build(seed, model_id, 0)
    }

    /// A peer at a specific epoch.
    pub fn with_epoch(seed: u8, epoch: u64) -> Self {
        Self::build(seed, "Mac14,2", epoch)
    }

    fn build(seed: u8, model_id: &str, epoch: u64) -> Self {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let permanent = PermanentInfo::new(
            model_id,
            keypair.public_key(),
            EncryptionPublicKey::from_bytes([seed ^ 0x5a; 32]),
            epoch,
        );
        Self {
            id: permanent.peer_id.clone(),
            keypair,
            permanent,
            seed,
        }
    }

    /// Register this peer's PermanentInfo.
    pub fn register(&self, model: &Model) {
        model
            .register_peer(self.permanent.clone())
            .expect("fixture peers are well formed");
    }

    /// Converge this peer with a clique id derived from its seed.
    pub fn advance(&self, model: &Model, adding: &[&PeerId], removing: &[&PeerId]) -> Convergence {
        let clique = CliqueId::new(format!("clique-{}", self.seed));
        model
            .advance_peer(&self.id, &ids(adding), &ids(removing), &self.keypair, || clique)
            .expect("fixture advance")
    }

    /// A voucher from this peer for `candidate`, signed without consulting policy.
    pub fn vouch_for(&self, candidate: &TestPeer) -> Voucher {
        Voucher::sign(candidate.id.clone(), self.id.clone(), 1_000, &self.keypair)
            .expect("keypairs always sign")
    }

    /// Opt into `policy_hash` with the next StableInfo version.
    pub fn opt_into(&self, model: &Model, policy_hash: Blake3Hash) {
        let version = model.stable_info(&self.id).map_or(1, |s| s.version + 1);
        let stable = StableInfo::builder(version)
            .device_class("test")
            .policy(1, policy_hash)
            .sign(&self.keypair)
            .expect("keypairs always sign");
        model
            .update_stable_info(&self.id, stable)
            .expect("fixture stable info");
    }

    /// A signer for this peer's key that can be locked.
    pub fn lockable_signer(&self) -> LockableSigner {
        LockableSigner::new(Keypair::from_seed(&[self.seed; 32]))
    }
}

/// Create `count` distinct peers with seeds 1..=count.
pub fn multi_peer_fixtures(count: u8) -> Vec<TestPeer> {
    (1..=count).map(TestPeer::new).collect()
}

/// A policy where Macs and phones are full devices and watches are limited.
pub fn standard_policy() -> PolicyDocument {
    PolicyDocument::builder(1)
        .category("Mac", "full")
        .category("iPhone", "full")
        .category("Watch", "limited")
        .introducer("full", "full")
        .introducer("limited", "full")
        .view("full", "passwords")
        .view("full", "wifi")
        .view("limited", "wifi")
        .build()
}

/// A signer that refuses to sign while locked, like a device behind a
/// passcode.
pub struct LockableSigner {
    keypair: Keypair,
    locked: AtomicBool,
}

impl LockableSigner {
    /// An unlocked signer.
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

impl SigningCapability for LockableSigner {
    fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    fn try_sign(&self, message: &[u8]) -> Result<Ed25519Signature, CoreError> {
        if self.is_locked() {
            return Err(CoreError::SigningUnavailable);
        }
        Ok(self.keypair.sign(message))
    }
}

fn ids(list: &[&PeerId]) -> BTreeSet<PeerId> {
    list.iter().map(|id| (*id).clone()).collect()
}
