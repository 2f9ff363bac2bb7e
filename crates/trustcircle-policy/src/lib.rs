//! # Trust Circle Policy
//!
//! Versioned, hashable rule sets deciding which peers may introduce which,
//! and which data views a peer may access.
//!
//! ## Overview
//!
//! - [`PolicyDocument`]: model prefix -> category rules, introducer rules, and
//!   per-category views. Addressed by its content hash.
//! - [`PolicyRegistry`]: the locally known documents. A peer's StableInfo names
//!   the policy it opted into by hash; when that hash is not registered, every
//!   evaluation for the peer is a denial.

pub mod document;
pub mod error;
pub mod registry;

pub use document::{CategoryRule, PolicyBuilder, PolicyDocument, POLICY_HASH_DOMAIN};
pub use error::{PolicyError, Result};
pub use registry::{PolicyRegistry, RegisterResult};
