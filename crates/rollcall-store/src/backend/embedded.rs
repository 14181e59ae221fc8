//! Embedded single-file backend built on [`redb`].
//!
//! ## Layout
//!
//! | Table             | Key                  | Holds                     |
//! |-------------------|-----------------------|--------------------------|
//! | `settings`        | `{len}:{tenant}/{id}` | settings of every tenant |
//! | `events/{tenant}` | `{id}`                | one tenant's events      |
//!
//! Tenant event tables are created by the first commit that writes to them.
//!
//! ## Concurrency
//!
//! Writers are serialized store-wide: a writable transaction holds the
//! store's writer guard from `begin` until its commit has landed on disk
//! (or until rollback/drop). Reads run against a redb snapshot taken after
//! the guard was acquired, overlaid with the transaction's own pending
//! writes, which are applied in one redb write transaction at commit.
//! Read-only transactions never touch the guard.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadTransaction, TableDefinition, TableError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::{BackendTransaction, RecordKey, RecordKind, ReportColumns, Scope, TransactionBackend};
use crate::error::{StoreError, StoreResult};

/// Shared table holding every tenant's settings.
const SETTINGS_TABLE: &str = "settings";

/// Prefix of per-tenant event tables.
const EVENTS_TABLE_PREFIX: &str = "events/";

fn definition(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

// ═══════════════════════════════════════════════════════════════════════
//  Backend
// ═══════════════════════════════════════════════════════════════════════

/// Handle to a redb store file. Cheap to share behind an `Arc`.
pub struct EmbeddedBackend {
    db: Arc<Database>,
    writer: Arc<Mutex<()>>,
    path: PathBuf,
}

impl EmbeddedBackend {
    /// Open (or create) the store file at `path`.
    ///
    /// Blocks on file I/O; call from `spawn_blocking` in async code.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening embedded store");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::BackendUnavailable {
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let db = Database::create(path)?;
        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TransactionBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn begin(&self, scope: Scope, writable: bool) -> StoreResult<Box<dyn BackendTransaction>> {
        // Acquired before the snapshot so the snapshot already contains
        // every commit that precedes this writer.
        let writer = if writable {
            Some(Arc::clone(&self.writer).lock_owned().await)
        } else {
            None
        };

        let db = Arc::clone(&self.db);
        let snapshot = tokio::task::spawn_blocking(move || db.begin_read()).await??;

        debug!(tenant = %scope.tenant, kind = %scope.kind, writable, "embedded transaction started");
        Ok(Box::new(EmbeddedTransaction {
            db: Arc::clone(&self.db),
            table: table_name(&scope),
            prefix: entry_prefix(&scope),
            scope,
            snapshot: Some(snapshot),
            pending: BTreeMap::new(),
            writer,
            closed: false,
        }))
    }
}

fn table_name(scope: &Scope) -> String {
    match scope.kind {
        RecordKind::Settings => SETTINGS_TABLE.to_string(),
        RecordKind::Event => format!("{EVENTS_TABLE_PREFIX}{}", scope.tenant),
    }
}

fn entry_prefix(scope: &Scope) -> String {
    match scope.kind {
        // Length-prefixed so no tenant's prefix is a prefix of another's,
        // even when tenant ids contain '/'.
        RecordKind::Settings => format!("{}:{}/", scope.tenant.len(), scope.tenant),
        RecordKind::Event => String::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Transaction
// ═══════════════════════════════════════════════════════════════════════

/// An open transaction on an [`EmbeddedBackend`].
pub struct EmbeddedTransaction {
    db: Arc<Database>,
    scope: Scope,
    table: String,
    prefix: String,
    /// Moved into blocking reads and back; `None` only while a read is in flight.
    snapshot: Option<ReadTransaction>,
    /// Entry key → new bytes, or `None` for a delete.
    pending: BTreeMap<String, Option<Vec<u8>>>,
    writer: Option<OwnedMutexGuard<()>>,
    closed: bool,
}

impl EmbeddedTransaction {
    fn entry_key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }

    /// Entry key for an exact-case lookup, when it differs from the primary one.
    fn fallback_key(&self, key: &RecordKey) -> Option<String> {
        (key.record_id() != key.storage_id()).then(|| self.entry_key(key.record_id()))
    }

    fn ensure_writable(&self, key: &RecordKey) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        if self.writer.is_none() {
            return Err(StoreError::ReadOnlyViolation {
                kind: self.scope.kind.as_str(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Run a read against the snapshot on the blocking pool.
    async fn read<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&ReadTransaction, &str) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StoreError::TaskJoin("snapshot lost by an interrupted read".into()))?;
        let table = self.table.clone();

        let (snapshot, result) = tokio::task::spawn_blocking(move || {
            let result = f(&snapshot, &table);
            (snapshot, result)
        })
        .await?;

        self.snapshot = Some(snapshot);
        result
    }

    fn release(&mut self) {
        self.closed = true;
        self.snapshot = None;
        self.pending.clear();
        self.writer = None;
    }
}

#[async_trait]
impl BackendTransaction for EmbeddedTransaction {
    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Vec<u8>>> {
        let primary = self.entry_key(key.storage_id());
        if let Some(staged) = self.pending.get(&primary) {
            return Ok(staged.clone());
        }

        let fallback = self
            .fallback_key(key)
            .filter(|exact| !self.pending.contains_key(exact));
        self.read(move |snapshot, table| read_entry(snapshot, table, &primary, fallback.as_deref()))
            .await
    }

    async fn put(&mut self, key: &RecordKey, blob: Vec<u8>, _columns: ReportColumns) -> StoreResult<()> {
        self.ensure_writable(key)?;
        self.pending.insert(self.entry_key(key.storage_id()), Some(blob));
        Ok(())
    }

    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()> {
        self.ensure_writable(key)?;
        if self.get(key).await?.is_none() {
            return Err(StoreError::NotFound {
                kind: self.scope.kind.as_str(),
                key: key.to_string(),
            });
        }
        self.pending.insert(self.entry_key(key.storage_id()), None);
        if let Some(exact) = self.fallback_key(key) {
            self.pending.insert(exact, None);
        }
        Ok(())
    }

    async fn list(&mut self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let prefix = self.prefix.clone();
        let stored = self
            .read(move |snapshot, table| read_all(snapshot, table, &prefix))
            .await?;

        // Lowercase entries win over legacy exact-case ones for the same record.
        let mut merged: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (id, bytes) in stored {
            let lower = id.to_lowercase();
            if id == lower {
                merged.insert(lower, bytes);
            } else {
                merged.entry(lower).or_insert(bytes);
            }
        }
        for (entry, staged) in &self.pending {
            let Some(id) = entry.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            match staged {
                Some(bytes) => {
                    merged.insert(id.to_string(), bytes.clone());
                }
                None => {
                    merged.remove(&id.to_lowercase());
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        let writer = self.writer.take();
        let pending = std::mem::take(&mut self.pending);
        self.release();

        if writer.is_none() || pending.is_empty() {
            return Ok(());
        }

        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        let writes = pending.len();
        tokio::task::spawn_blocking(move || {
            // Released only once the write transaction has landed.
            let _writer = writer;
            apply_pending(&db, &table, &pending)
        })
        .await??;

        debug!(tenant = %self.scope.tenant, kind = %self.scope.kind, writes, "embedded transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        let discarded = self.pending.len();
        self.release();
        debug!(tenant = %self.scope.tenant, kind = %self.scope.kind, discarded, "embedded transaction rolled back");
        Ok(())
    }
}

// ── blocking helpers ─────────────────────────────────────────────────

fn read_entry(
    snapshot: &ReadTransaction,
    table: &str,
    primary: &str,
    fallback: Option<&str>,
) -> StoreResult<Option<Vec<u8>>> {
    let table = match snapshot.open_table(definition(table)) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if let Some(value) = table.get(primary)? {
        return Ok(Some(value.value().to_vec()));
    }
    if let Some(exact) = fallback {
        if let Some(value) = table.get(exact)? {
            debug!(key = exact, "exact-case fallback hit");
            return Ok(Some(value.value().to_vec()));
        }
    }
    Ok(None)
}

fn read_all(snapshot: &ReadTransaction, table: &str, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
    let table = match snapshot.open_table(definition(table)) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        let Some(id) = key.value().strip_prefix(prefix) else {
            break;
        };
        records.push((id.to_string(), value.value().to_vec()));
    }
    Ok(records)
}

fn apply_pending(db: &Database, table: &str, pending: &BTreeMap<String, Option<Vec<u8>>>) -> StoreResult<()> {
    let txn = db.begin_write()?;
    {
        let mut table = txn.open_table(definition(table))?;
        for (key, staged) in pending {
            match staged {
                Some(bytes) => {
                    table.insert(key.as_str(), bytes.as_slice())?;
                }
                None => {
                    table.remove(key.as_str())?;
                }
            }
        }
    }
    txn.commit()?;
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
