//! # Trust Circle Store
//!
//! Persistence for per-peer transport coder state.
//!
//! ## Overview
//!
//! Coders serialize their negotiation state to an opaque blob after every
//! change and hand it to a [`CoderStateStore`], keyed by remote peer id, so a
//! restarted process resumes where it left off instead of renegotiating.
//!
//! ## Key Types
//!
//! - [`CoderStateStore`] - The blocking persistence capability
//! - [`SqliteCoderStore`] - SQLite-based persistent storage
//! - [`MemoryCoderStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trustcircle_core::PeerId;
//! use trustcircle_store::{CoderStateStore, SqliteCoderStore};
//!
//! let store = SqliteCoderStore::open("coders.db").unwrap();
//! store.save(&PeerId::from("peer"), b"state").unwrap();
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryCoderStore;
pub use sqlite::SqliteCoderStore;
pub use traits::CoderStateStore;
