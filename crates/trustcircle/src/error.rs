//! Error types for accounts.

use thiserror::Error;

use trustcircle_coder::CoderError;
use trustcircle_core::{CoreError, PeerId};
use trustcircle_model::ModelError;
use trustcircle_policy::PolicyError;
use trustcircle_store::StoreError;
use trustcircle_sync::SyncError;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Document encoding or identity error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Policy document error.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Trust model rejected an operation.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Transport coder error.
    #[error("coder error: {0}")]
    Coder(#[from] CoderError),

    /// Coder-state storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Key/value transport error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Messages only flow between peers that include each other.
    #[error("peer {0} is not mutually trusted")]
    NotMutuallyTrusted(PeerId),

    /// The peer is not registered in the model.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// A blocking worker task panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl AccountError {
    /// Whether the error only means "someone else got there first".
    pub fn is_benign(&self) -> bool {
        matches!(self, AccountError::Model(e) if e.is_benign())
    }

    /// Whether the error should be shown to the user rather than retried.
    pub fn is_user_visible(&self) -> bool {
        match self {
            AccountError::Model(e) => e.is_user_visible(),
            AccountError::Coder(CoderError::SigningUnavailable) => true,
            AccountError::NotMutuallyTrusted(_) => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for AccountError {
    fn from(err: tokio::task::JoinError) -> Self {
        AccountError::Worker(err.to_string())
    }
}

/// Result type for account operations.
pub type Result<T> = std::result::Result<T, AccountError>;
