//! Crate-wide error type.
//!
//! Every fallible operation in the core returns [`CoreError`]. Variants map
//! 1:1 onto the domain error kinds described by the specification; `code()`
//! and `http_status()` are the stable identifiers an HTTP layer embedding
//! this crate would use to build the `{code, message, details?}` envelope.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path already in use: {0}")]
    PathInUse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict on {0}")]
    VersionConflict(String),

    #[error("idempotency replay mismatch for key {0}")]
    IdempotencyReplayMismatch(String),

    #[error("schema incompatible: {0}")]
    SchemaIncompatible(String),

    #[error("staging spool full for dataset {0}")]
    SpoolFull(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("parent not found for path {0}")]
    ParentNotFound(String),

    #[error("orphaned partition {0}")]
    OrphanedPartition(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend timeout: {0}")]
    BackendTimeout(String),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
}

impl CoreError {
    /// Stable code for the error envelope (spec §6/§7).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "InvalidPath",
            Self::PathInUse(_) => "PathInUse",
            Self::NotFound(_) => "NotFound",
            Self::VersionConflict(_) => "VersionConflict",
            Self::IdempotencyReplayMismatch(_) => "IdempotencyReplayMismatch",
            Self::SchemaIncompatible(_) => "SchemaIncompatible",
            Self::SpoolFull(_) => "SpoolFull",
            Self::QuotaExceeded(_) => "QuotaExceeded",
            Self::RateLimited(_) => "RateLimited",
            Self::ChecksumMismatch { .. } => "ChecksumMismatch",
            Self::ParentNotFound(_) => "ParentNotFound",
            Self::OrphanedPartition(_) => "OrphanedPartition",
            Self::BackendUnavailable(_) => "BackendUnavailable",
            Self::BackendTimeout(_) => "BackendTimeout",
            Self::StorageWriteFailed(_) => "StorageWriteFailed",
            Self::InvariantViolation(_) => "InvariantViolation",
            Self::Database(_) => "InvariantViolation",
            Self::Io(_) => "StorageWriteFailed",
            Self::ObjectStore(_) => "BackendUnavailable",
        }
    }

    /// HTTP status an embedding route handler should return.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidPath(_)
            | Self::SchemaIncompatible(_)
            | Self::ParentNotFound(_)
            | Self::QuotaExceeded(_) => 400,
            Self::NotFound(_) => 404,
            Self::VersionConflict(_) | Self::PathInUse(_) => 409,
            Self::IdempotencyReplayMismatch(_) => 412,
            Self::RateLimited(_) => 429,
            Self::BackendUnavailable(_) | Self::BackendTimeout(_) => 503,
            Self::ChecksumMismatch { .. }
            | Self::OrphanedPartition(_)
            | Self::SpoolFull(_)
            | Self::StorageWriteFailed(_)
            | Self::InvariantViolation(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::ObjectStore(_) => 500,
        }
    }
}
