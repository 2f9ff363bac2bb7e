//! # Trust Circle Core
//!
//! Pure primitives for the trust circle engine: identities, peer documents,
//! circles, vouchers, and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over signed data structures.
//!
//! ## Key Types
//!
//! - [`PeerId`] - Identifier derived from a peer's public key material
//! - [`PermanentInfo`], [`StableInfo`], [`DynamicInfo`] - The layered peer documents
//! - [`Circle`] - One immutable generation of an agreed membership set
//! - [`Voucher`] - A sponsor's signed admission of a candidate
//! - [`SigningCapability`], [`SignatureVerifier`] - Injected crypto capabilities
//!
//! ## Canonicalization
//!
//! All signed documents are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod circle;
pub mod crypto;
pub mod error;
pub mod peer;
pub mod types;
pub mod validation;
pub mod voucher;

pub use canonical::{encode_canonical, from_cbor, to_cbor, CanonicalValue};
pub use circle::Circle;
pub use crypto::{
    Blake3Hash, Ed25519PublicKey, Ed25519Signature, Ed25519Verifier, EncryptionPublicKey, Keypair,
    SignatureVerifier, SigningCapability,
};
pub use error::{CoreError, Result};
pub use peer::{DynamicInfo, DynamicInfoBuilder, PermanentInfo, StableInfo, StableInfoBuilder};
pub use types::{CircleId, CliqueId, PeerId};
pub use validation::{verify_dynamic_info, verify_stable_info, verify_voucher};
pub use voucher::Voucher;
