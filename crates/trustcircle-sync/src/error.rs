//! Error types for the transport boundary.

use thiserror::Error;

/// Errors that can occur talking to the key/value store.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Timeout waiting for the store.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The update subscription ended.
    #[error("update channel closed")]
    ChannelClosed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
