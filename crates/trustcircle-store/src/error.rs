//! Store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The on-disk schema cannot be brought to this build's version.
    #[error("migration error: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
