//! Document validation: identity derivation and signature checks.
//!
//! Every StableInfo, DynamicInfo and Voucher must verify against the signing
//! key in the author's PermanentInfo before anyone stores it.

use crate::crypto::SignatureVerifier;
use crate::error::CoreError;
use crate::peer::{DynamicInfo, PermanentInfo, StableInfo};
use crate::voucher::Voucher;

/// Validate a PermanentInfo's identity binding.
pub fn validate_permanent_info(info: &PermanentInfo) -> Result<(), CoreError> {
    info.validate()
}

/// Verify a StableInfo was signed by the peer described by `author`.
pub fn verify_stable_info(
    author: &PermanentInfo,
    info: &StableInfo,
    verifier: &dyn SignatureVerifier,
) -> Result<(), CoreError> {
    verifier.verify(&author.signing_key, &info.signed_message(), &info.signature)
}

/// Verify a DynamicInfo was signed by the peer described by `author`.
pub fn verify_dynamic_info(
    author: &PermanentInfo,
    info: &DynamicInfo,
    verifier: &dyn SignatureVerifier,
) -> Result<(), CoreError> {
    verifier.verify(&author.signing_key, &info.signed_message(), &info.signature)
}

/// Verify a voucher was signed by its sponsor.
pub fn verify_voucher(
    sponsor: &PermanentInfo,
    voucher: &Voucher,
    verifier: &dyn SignatureVerifier,
) -> Result<(), CoreError> {
    if sponsor.peer_id != voucher.sponsor {
        return Err(CoreError::InvalidSignature);
    }
    verifier.verify(&sponsor.signing_key, &voucher.signed_message(), &voucher.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circle::Circle;
    use crate::crypto::{Ed25519Verifier, EncryptionPublicKey, Keypair};
    use crate::types::{CliqueId, PeerId};

    fn peer(seed: u8) -> (Keypair, PermanentInfo) {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let info = PermanentInfo::new(
            "model",
            keypair.public_key(),
            EncryptionPublicKey::from_bytes([seed; 32]),
            0,
        );
        (keypair, info)
    }

    #[test]
    fn test_stable_info_from_other_peer_rejected() {
        let (alice_key, alice) = peer(1);
        let (_, bob) = peer(2);

        let stable = StableInfo::builder(1).sign(&alice_key).unwrap();
        verify_stable_info(&alice, &stable, &Ed25519Verifier).unwrap();
        assert!(verify_stable_info(&bob, &stable, &Ed25519Verifier).is_err());
    }

    #[test]
    fn test_dynamic_info_verification() {
        let (key, info) = peer(3);
        let circle = Circle::new(CliqueId::from("c"), 0, [info.peer_id.clone()]);
        let dynamic = DynamicInfo::builder(1, &circle)
            .include(info.peer_id.clone())
            .sign(&key)
            .unwrap();

        verify_dynamic_info(&info, &dynamic, &Ed25519Verifier).unwrap();

        let mut tampered = dynamic;
        tampered.included.insert(PeerId::from("intruder"));
        assert!(verify_dynamic_info(&info, &tampered, &Ed25519Verifier).is_err());
    }

    #[test]
    fn test_voucher_sponsor_must_match() {
        let (sponsor_key, sponsor) = peer(4);
        let (_, other) = peer(5);

        let voucher = Voucher::sign(
            PeerId::from("cand"),
            sponsor.peer_id.clone(),
            0,
            &sponsor_key,
        )
        .unwrap();

        verify_voucher(&sponsor, &voucher, &Ed25519Verifier).unwrap();
        assert!(verify_voucher(&other, &voucher, &Ed25519Verifier).is_err());
    }

    #[test]
    fn test_validate_permanent_info() {
        let (_, info) = peer(6);
        validate_permanent_info(&info).unwrap();
    }
}
