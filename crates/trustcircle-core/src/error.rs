//! Error types for the trust circle core.

use thiserror::Error;

/// Errors raised while building, encoding, or verifying peer documents.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signing key exists but cannot be used right now (e.g. a locked device).
    #[error("signing key is currently unavailable")]
    SigningUnavailable,

    #[error("peer id {claimed} does not match key material (expected {derived})")]
    MalformedIdentity { claimed: String, derived: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
