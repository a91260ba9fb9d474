//! Error types shared across the crate.

use thiserror::Error;

use crate::api::TransportError;
use crate::types::DocPath;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OrderBridgeError>;

/// Result alias for document-store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum OrderBridgeError {
    /// Credential refresh failed. Fatal: a run aborts rather than continuing without a token.
    #[error("access token refresh failed (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    /// The external API kept throttling after the bounded retry budget was spent.
    #[error("record {record_id} still rate limited after {attempts} attempts")]
    RateLimited { record_id: String, attempts: u32 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OrderBridgeError {
    /// Errors that must stop a run instead of being counted against a single record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::InvalidConfig { .. })
    }

    /// Throttling that survived the retry budget; callers count it as a fetch failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {path}")]
    NotFound { path: DocPath },

    #[error("batch holds {ops} operations; the store accepts at most {max}")]
    BatchTooLarge { ops: usize, max: usize },

    #[error("store is locked by another process: {0}")]
    Locked(String),

    #[error("journal corrupted at offset {offset}: {reason}")]
    JournalCorruption { offset: u64, reason: String },

    #[error("commit rejected: {0}")]
    Rejected(String),

    #[error("store state poisoned by a panicked writer")]
    Poisoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A write plan could not be committed. Nothing from the plan is visible in the store.
#[derive(Debug, Error)]
#[error("apply failed for {parent}: {source}")]
pub struct ApplyError {
    pub parent: DocPath,
    #[source]
    pub source: StoreError,
}
