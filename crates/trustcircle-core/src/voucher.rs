//! Vouchers: a sponsor's signed admission of a candidate peer.

use serde::{Deserialize, Serialize};

use crate::canonical::{signed_message, voucher_bytes};
use crate::crypto::{Blake3Hash, Ed25519Signature, SigningCapability};
use crate::error::CoreError;
use crate::types::PeerId;

/// Domain separator for voucher signatures.
pub const VOUCHER_DOMAIN: &[u8] = b"trustcircle-voucher-v0:";

/// A sponsor-signed assertion admitting a candidate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voucher {
    pub candidate: PeerId,
    pub sponsor: PeerId,
    /// Issuance time, Unix milliseconds.
    pub issued_at: i64,
    pub signature: Ed25519Signature,
}

impl Voucher {
    /// Create and sign a voucher.
    pub fn sign(
        candidate: PeerId,
        sponsor: PeerId,
        issued_at: i64,
        signer: &dyn SigningCapability,
    ) -> Result<Self, CoreError> {
        let mut voucher = Self {
            candidate,
            sponsor,
            issued_at,
            signature: Ed25519Signature::ZERO,
        };
        voucher.signature = signer.try_sign(&voucher.signed_message())?;
        Ok(voucher)
    }

    /// The bytes covered by the signature.
    pub fn signed_message(&self) -> Vec<u8> {
        signed_message(VOUCHER_DOMAIN, &voucher_bytes(self))
    }

    /// Content address of the voucher, signature included.
    pub fn id(&self) -> Blake3Hash {
        let mut bytes = voucher_bytes(self);
        bytes.extend_from_slice(&self.signature.0);
        Blake3Hash::hash(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_voucher_sign_verify() {
        let sponsor = Keypair::from_seed(&[9; 32]);
        let voucher = Voucher::sign(
            PeerId::from("candidate"),
            PeerId::from("sponsor"),
            1_736_870_400_000,
            &sponsor,
        )
        .unwrap();

        sponsor
            .public_key()
            .verify(&voucher.signed_message(), &voucher.signature)
            .unwrap();
    }

    #[test]
    fn test_voucher_id_stable() {
        let sponsor = Keypair::from_seed(&[9; 32]);
        let make = || {
            Voucher::sign(PeerId::from("c"), PeerId::from("s"), 42, &sponsor).unwrap()
        };
        assert_eq!(make().id(), make().id());
    }
}
