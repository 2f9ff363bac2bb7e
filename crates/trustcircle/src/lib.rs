//! # Trust Circle
//!
//! Devices of one account agreeing on who belongs, and talking privately
//! once they do.
//!
//! ## Overview
//!
//! - **Model**: peers, circle generations, vouchers and policies, plus the
//!   membership convergence algorithm
//! - **Keys**: the flat key namespace of the shared key/value store
//! - **Coders**: one authenticated, encrypted session per pair of peers,
//!   negotiated over the store itself
//! - **Account**: the async facade tying them together for one local peer
//!
//! ## Key Concepts
//!
//! - **Circle**: an immutable generation of the agreed membership set.
//!   Changing membership creates the next generation.
//! - **Mutual trust**: two peers talk only when each includes the other.
//! - **Snapshot**: every local change is published as the whole model under
//!   the circle key; receivers merge it through ordinary verification.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trustcircle::{Account, AccountConfig};
//! use trustcircle::core::{EncryptionPublicKey, Keypair, PermanentInfo};
//! use trustcircle::model::Model;
//! use trustcircle::store::SqliteCoderStore;
//! use trustcircle::sync::MemoryKvs;
//!
//! async fn example() -> trustcircle::Result<()> {
//!     let keypair = Keypair::generate();
//!     let me = PermanentInfo::new(
//!         "Mac14,2",
//!         keypair.public_key(),
//!         EncryptionPublicKey::from_bytes([7; 32]),
//!         0,
//!     );
//!
//!     let kvs = MemoryKvs::new();
//!     let account = Account::new(
//!         me,
//!         Arc::new(keypair),
//!         Arc::new(Model::new()),
//!         Arc::new(SqliteCoderStore::open("coders.db")?),
//!         kvs.connect().await,
//!         AccountConfig::default(),
//!     );
//!
//!     // Found a circle of one
//!     let convergence = account.bootstrap().await?;
//!     assert_eq!(convergence.circle.generation, 0);
//!
//!     // React to whatever the other devices published
//!     for event in account.pump().await? {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `trustcircle::core` - Identities, peer documents, circles, vouchers
//! - `trustcircle::policy` - Policy documents and their registry
//! - `trustcircle::model` - The trust model and convergence
//! - `trustcircle::store` - Coder state persistence
//! - `trustcircle::coder` - Per-peer encrypted sessions
//! - `trustcircle::sync` - Key codec and key/value transport

pub mod account;
mod channel;
pub mod error;
pub mod snapshot;

// Re-export component crates
pub use trustcircle_coder as coder;
pub use trustcircle_core as core;
pub use trustcircle_model as model;
pub use trustcircle_policy as policy;
pub use trustcircle_store as store;
pub use trustcircle_sync as sync;

// Re-export main types for convenience
pub use account::{Account, AccountConfig, AccountEvent, Delivery};
pub use error::{AccountError, Result};
pub use snapshot::{CircleSnapshot, MergeReport};

// Re-export commonly used types
pub use trustcircle_core::{Circle, Keypair, PeerId, PermanentInfo, Voucher};
pub use trustcircle_model::{Membership, Model, PeerStatus};
