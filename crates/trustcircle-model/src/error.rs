//! Error types for the peer/circle/voucher model.

use thiserror::Error;

use trustcircle_core::{CliqueId, CoreError, PeerId};
use trustcircle_policy::PolicyError;

/// Errors returned by model write operations.
///
/// Read-only queries never surface signature or version problems; those are
/// reported only by the write call that caused them.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The id is already bound to different key material.
    #[error("identity conflict for peer {0}")]
    IdentityConflict(PeerId),

    /// The peer id is not derived from its key material.
    #[error("malformed identity: {0}")]
    MalformedIdentity(String),

    #[error("bad signature on document from {peer}")]
    BadSignature { peer: PeerId },

    /// The offered version is not newer than the stored one.
    #[error("stale version for {peer}: stored {current}, offered {offered}")]
    StaleVersion {
        peer: PeerId,
        current: u64,
        offered: u64,
    },

    /// The local signing key cannot be used right now.
    #[error("signing key unavailable")]
    SigningUnavailable,

    /// The supplied signer does not hold the peer's signing key.
    #[error("signer does not hold the signing key of {peer}")]
    SignerMismatch { peer: PeerId },

    #[error("view {0} is not defined by any registered policy")]
    UnknownView(String),

    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("policy hash mismatch: {0}")]
    PolicyHashMismatch(String),

    /// A DynamicInfo references a registered circle with a different generation.
    #[error("circle {circle} is generation {registered}, document claims {claimed}")]
    CircleIdMismatch {
        circle: String,
        registered: u64,
        claimed: u64,
    },

    /// No signed DynamicInfo references the circle, so nothing vouches for it.
    #[error("circle {0} is not referenced by any registered peer")]
    UnreferencedCircle(String),

    /// The clique already holds the last representable generation.
    #[error("no circle generation left in clique {clique}")]
    GenerationsExhausted { clique: CliqueId },

    #[error("core error: {0}")]
    Core(String),
}

impl ModelError {
    /// Benign outcomes callers may treat as success.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ModelError::StaleVersion { .. } | ModelError::UnreferencedCircle(_)
        )
    }

    /// Errors worth showing to a user; everything else is operator-level.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ModelError::SigningUnavailable | ModelError::UnknownView(_)
        )
    }
}

impl From<CoreError> for ModelError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::SigningUnavailable => ModelError::SigningUnavailable,
            CoreError::MalformedIdentity { claimed, derived } => {
                ModelError::MalformedIdentity(format!("{claimed} (expected {derived})"))
            }
            other => ModelError::Core(other.to_string()),
        }
    }
}

impl From<PolicyError> for ModelError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::HashMismatch { claimed, computed } => {
                ModelError::PolicyHashMismatch(format!("claimed {claimed}, computed {computed}"))
            }
            PolicyError::UnknownView(view) => ModelError::UnknownView(view),
            other => ModelError::Core(other.to_string()),
        }
    }
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
