//! Error types for the rollcall-store crate.
//!
//! All store operations return [`StoreError`] via [`StoreResult`].
//! The store never retries; callers decide from the variant what to do.
//!
//! | Variant                 | Caller action                          |
//! |-------------------------|----------------------------------------|
//! | `NotFound`              | create or report, caller's choice      |
//! | `SerializationConflict` | retry the whole transaction            |
//! | `BackendUnavailable`    | abort the request                      |
//! | `RecordCorrupt`         | abort, needs manual remediation        |
//! | `TooManyRows`           | abort, indicates a bug                 |
//! | `Model(..)`             | show the validation message verbatim   |

use rollcall_model::ModelError;
use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A write was attempted through a read-only transaction.
    #[error("read-only transaction cannot modify {kind} {key}")]
    ReadOnlyViolation { kind: &'static str, key: String },

    /// The transaction was already committed or rolled back.
    #[error("transaction already closed")]
    TransactionClosed,

    /// The storage backend could not be reached or opened.
    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// Stored bytes could not be decoded.
    #[error("record {key} is corrupt: {reason}")]
    RecordCorrupt { key: String, reason: String },

    /// More rows matched a unique key than possible.
    #[error("{count} rows matched a unique key in {table}")]
    TooManyRows { table: &'static str, count: usize },

    /// A concurrent transaction won; this one was rolled back.
    #[error("serialization conflict: {reason}")]
    SerializationConflict { reason: String },

    /// The caller cancelled the operation; the transaction was rolled back.
    #[error("operation cancelled")]
    Cancelled,

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The store configuration could not be read.
    #[error("config error: {0}")]
    Config(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// redb operation failed.
    #[error("embedded store error: {0}")]
    Embedded(#[from] redb::Error),

    /// JSON encoding of a reporting column failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error from the record model.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl StoreError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SerializationConflict { .. })
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::BackendUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Embedded(err.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        Self::Embedded(err.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        Self::Embedded(err.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        Self::Embedded(err.into())
    }
}

// ── tests ────────────────────────────────────────────────────────────
