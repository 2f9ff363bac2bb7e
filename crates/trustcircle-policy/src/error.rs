//! Error types for policy documents.

use thiserror::Error;

/// Errors that can occur while registering or consulting policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The document's claimed hash does not match its content.
    #[error("policy hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: String, computed: String },

    /// No registered policy defines the view.
    #[error("unknown view: {0}")]
    UnknownView(String),

    /// No policy is registered under the hash.
    #[error("policy not found: {0}")]
    NotFound(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] trustcircle_core::CoreError),
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
