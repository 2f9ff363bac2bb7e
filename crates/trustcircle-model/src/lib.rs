//! # Trust Circle Model
//!
//! The in-memory peer/circle/voucher model and its membership convergence
//! algorithm.
//!
//! ## Overview
//!
//! A [`Model`] holds every registered peer (its PermanentInfo plus the latest
//! verified StableInfo and DynamicInfo), every circle generation, every
//! voucher and every policy document known to one account.
//!
//! ## Key Concepts
//!
//! - **Registration** is idempotent: re-submitting a known document succeeds
//!   without changing anything.
//! - **Convergence** ([`Model::calculate_dynamic_info`]) recomputes a peer's
//!   trust edges from an add/remove request on a snapshot; it never mutates.
//! - **Advancing** ([`Model::advance_peer`]) runs convergence and applies the
//!   result atomically under the exclusive lock.
//! - **Status** ([`PeerStatus`]) is derived from everyone's trust edges and
//!   epochs; there is no way to set it directly.
//!
//! ## Usage
//!
//! ```ignore
//! let model = Model::new();
//! model.register_peer(me.clone())?;
//! let result = model.advance_peer(&me.peer_id, &adding, &removing, &keypair, || clique)?;
//! assert!(model.status_of(&me.peer_id)?.is_empty());
//! ```

pub mod convergence;
pub mod error;
pub mod model;
pub mod state;
pub mod status;

pub use convergence::Convergence;
pub use error::{ModelError, Result};
pub use model::{Model, UpdateResult};
pub use state::{ModelState, PeerRecord};
pub use status::{Membership, PeerStatus, ANCIENT_EPOCH_DISTANCE};
