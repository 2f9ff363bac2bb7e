//! # Trust Circle Testkit
//!
//! Testing utilities for the trust circle engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: store keys with their required classification
//! - **Generators**: Proptest strategies for ids, keys and peer documents
//! - **Fixtures**: deterministic peers, a standard policy and a lockable signer
//!
//! ## Golden Vectors
//!
//! ```rust
//! use trustcircle_testkit::vectors::verify_all_vectors;
//!
//! for (name, passed) in verify_all_vectors() {
//!     assert!(passed, "{}", name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use trustcircle_testkit::generators::key_kind;
//!
//! proptest! {
//!     #[test]
//!     fn keys_round_trip(kind in key_kind()) {
//!         let key = kind.to_key().unwrap();
//!         prop_assert_eq!(trustcircle_sync::classify(&key), kind);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use trustcircle_model::Model;
//! use trustcircle_testkit::fixtures::multi_peer_fixtures;
//!
//! let model = Model::new();
//! let peers = multi_peer_fixtures(2);
//! for p in &peers {
//!     p.register(&model);
//! }
//! let result = peers[0].advance(&model, &[&peers[1].id], &[]);
//! assert_eq!(result.circle.len(), 2);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_peer_fixtures, standard_policy, LockableSigner, TestPeer};
pub use generators::{key_kind, peer_id, permanent_info};
pub use vectors::{all_vectors, verify_all_vectors, KeyVector};
