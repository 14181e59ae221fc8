//! Storage backend capability traits.
//!
//! A [`TransactionBackend`] opens [`BackendTransaction`]s over encoded
//! record bytes. The façade in [`crate::transaction`] is the only caller;
//! it handles decoding, read-only enforcement and close-state tracking so
//! backends only move bytes.
//!
//! Two implementations ship with the crate:
//!
//! - [`EmbeddedBackend`]: a single redb file, one writer at a time.
//! - [`RelationalBackend`]: SQLite, serializable transactions with
//!   conflict-abort.

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreResult;

pub mod embedded;
pub mod relational;

pub use embedded::EmbeddedBackend;
pub use relational::RelationalBackend;

// ═══════════════════════════════════════════════════════════════════════
//  Keys and scopes
// ═══════════════════════════════════════════════════════════════════════

/// The two kinds of stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Settings,
    Event,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tenant and record kind a transaction is confined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub tenant: String,
    pub kind: RecordKind,
}

impl Scope {
    pub fn new(tenant: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            tenant: tenant.into(),
            kind,
        }
    }
}

/// A `(tenant, record id)` pair.
///
/// Record ids are case-insensitive: backends store [`RecordKey::storage_id`],
/// the lowercase form. The original spelling is kept for the embedded
/// backend's exact-case fallback and for error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    tenant: String,
    record_id: String,
    storage_id: String,
}

impl RecordKey {
    pub fn new(tenant: impl Into<String>, record_id: &str) -> Self {
        let record_id = record_id.trim().to_string();
        Self {
            tenant: tenant.into(),
            storage_id: record_id.to_lowercase(),
            record_id,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The record id as given by the caller.
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// The lowercase record id used for storage.
    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.storage_id)
    }
}

/// Plaintext columns kept beside the blob for external reporting.
///
/// Backends without columns ignore these. They are never read back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportColumns {
    pub nice_name: String,
    pub state: String,
    pub announce_channel: String,
    pub signup_channel: String,
    pub role_order: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════
//  Capability traits
// ═══════════════════════════════════════════════════════════════════════

/// A storage engine that can open transactions.
#[async_trait]
pub trait TransactionBackend: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Open a transaction confined to `scope`.
    ///
    /// Dropping the returned future before it resolves must release
    /// anything acquired so far.
    async fn begin(&self, scope: Scope, writable: bool) -> StoreResult<Box<dyn BackendTransaction>>;
}

/// One open transaction over encoded record bytes.
///
/// Every key passed in belongs to the transaction's scope. After `commit`
/// or `rollback` returns, further calls fail with
/// [`StoreError::TransactionClosed`](crate::StoreError::TransactionClosed).
#[async_trait]
pub trait BackendTransaction: Send {
    /// Fetch the stored bytes for `key`, or `None` if absent.
    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or replace the bytes for `key`.
    async fn put(&mut self, key: &RecordKey, blob: Vec<u8>, columns: ReportColumns) -> StoreResult<()>;

    /// Remove `key`. Fails with `NotFound` if nothing was stored.
    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()>;

    /// Every record in the scope, ordered by storage id.
    async fn list(&mut self) -> StoreResult<Vec<(String, Vec<u8>)>>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

// ── tests ────────────────────────────────────────────────────────────
