use thiserror::Error;

use crate::storage::BulkWriteSummary;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Item is not a folder: {0}")]
    NotAFolder(String),

    #[error("Invalid mutation at index {index}: {reason}")]
    InvalidMutation { index: usize, reason: String },

    #[error("Unknown mutation type '{kind}' at index {index}")]
    UnknownMutationKind { index: usize, kind: String },

    #[error("Bulk write failed: {} of {} operations failed", .0.write_errors.len(), .0.attempted)]
    BulkWrite(BulkWriteSummary),

    #[error("Corrupt item record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the store
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMutation { .. } | Self::UnknownMutationKind { .. } | Self::NotAFolder(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
