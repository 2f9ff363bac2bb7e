//! Error types for the transport coder.

use thiserror::Error;

use trustcircle_core::CoreError;
use trustcircle_store::StoreError;

/// Errors returned by coder calls.
///
/// Protocol-level problems with inbound frames are not errors; they surface
/// as [`UnwrapOutcome::Failure`](crate::UnwrapOutcome::Failure) and reset
/// the coder.
#[derive(Debug, Error)]
pub enum CoderError {
    /// Nothing to decode, or a frame larger than the configured limit.
    #[error("invalid input length: {len} bytes")]
    InputLength { len: usize },

    /// The local signing key cannot be used right now.
    #[error("signing key is currently unavailable")]
    SigningUnavailable,

    /// Coder state could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisting coder state failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A streaming call was made before negotiation completed.
    #[error("session is not established")]
    NotReady,

    /// Cipher failure on the local side.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl From<CoreError> for CoderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SigningUnavailable => CoderError::SigningUnavailable,
            other => CoderError::Serialization(other.to_string()),
        }
    }
}

/// Result type for coder operations.
pub type Result<T> = std::result::Result<T, CoderError>;
