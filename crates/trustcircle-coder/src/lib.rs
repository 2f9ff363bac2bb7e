//! # Trust Circle Coder
//!
//! Per-peer encrypted transport riding on the key/value namespace.
//!
//! ## Overview
//!
//! A [`Coder`] moves through `Uninitialized → Negotiating → Ready`. Until it
//! is ready, [`Coder::wrap`] hands back negotiation frames instead of
//! ciphertext; the caller publishes them and feeds whatever comes back into
//! [`Coder::unwrap`]. A failed frame resets the coder to negotiating and
//! produces a fresh `Hello`, so the pair always heals by itself.
//!
//! ## Handshake
//!
//! ```text
//! initiator                               responder
//!   Hello { eph_i, sig_i }         ───▶
//!                                  ◀───   Reply { eph_r, echo: eph_i, sig_r }
//!   Confirm { mac }                ───▶
//! ```
//!
//! Ephemeral keys are signed with each peer's Ed25519 identity key. Keys are
//! derived per direction from the X25519 secret and the handshake transcript.
//! When both sides send `Hello` at once, the side with the smaller peer id
//! stays initiator.
//!
//! ## Key Types
//!
//! - [`Coder`] - One remote peer's session
//! - [`WrapResult`] / [`UnwrapOutcome`] / [`CoderStatus`] - Call results
//! - [`CoderConfig`] - Limits

pub mod coder;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod state;
mod stream;

pub use coder::{Coder, CoderConfig, CoderStatus, UnwrapOutcome, WrapResult};
pub use error::{CoderError, Result};
pub use frame::{Frame, PROTOCOL_VERSION};
pub use state::Phase;
