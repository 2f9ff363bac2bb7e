//! # Trust Circle Sync
//!
//! Addressing and transport for trust-circle traffic.
//!
//! ## Overview
//!
//! All circle state, retirements and coder frames travel through one flat,
//! eventually-consistent key/value namespace. The [`keys`] module maps
//! circle names and peer ids onto that namespace and back; the
//! [`KvsTransport`] trait is the boundary to the store itself.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trustcircle_core::PeerId;
//! use trustcircle_sync::keys::{classify, message_key, KeyKind};
//!
//! let key = message_key("Account", &PeerId::from("a"), &PeerId::from("b"));
//! assert!(matches!(classify(&key), KeyKind::Message { .. }));
//! ```

pub mod error;
pub mod keys;
pub mod transport;

pub use error::{Result, SyncError};
pub use keys::{classify, KeyKind};
pub use transport::memory::{MemoryKvs, MemoryKvsHandle};
pub use transport::{KvsTransport, KvsUpdate};
