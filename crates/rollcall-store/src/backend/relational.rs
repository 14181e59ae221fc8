//! Relational backend on SQLite.
//!
//! Each transaction owns its own connection in WAL mode and runs inside
//! `BEGIN DEFERRED`. SQLite gives every transaction a consistent snapshot
//! and admits one writer at a time; a transaction that tries to write
//! after another has committed over its snapshot gets `SQLITE_BUSY`,
//! which surfaces as [`StoreError::SerializationConflict`] after the
//! transaction has been rolled back and closed.
//!
//! Event rows carry plaintext reporting columns next to the encoded blob
//! (see [`ReportColumns`]). Only the blob is read back.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, params};
use tracing::{debug, info, warn};

use super::{BackendTransaction, RecordKey, RecordKind, ReportColumns, Scope, TransactionBackend};
use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Default time a writer waits for the write lock before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn table_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Settings => "settings",
        RecordKind::Event => "events",
    }
}

/// Map lock contention onto a retryable conflict.
fn classify(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::SerializationConflict {
            reason: err.to_string(),
        },
        _ => StoreError::Sqlite(err),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Backend
// ═══════════════════════════════════════════════════════════════════════

/// SQLite-backed record store.
pub struct RelationalBackend {
    path: PathBuf,
    busy_timeout: Duration,
}

impl RelationalBackend {
    /// Open (or create) the database at `path` and run pending migrations.
    ///
    /// Blocks on file I/O; call from `spawn_blocking` in async code.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening relational store");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::BackendUnavailable {
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let conn = open_connection(path, busy_timeout)?;
        migration::run_all(&conn)?;

        Ok(Self {
            path: path.to_path_buf(),
            busy_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    let conn = Connection::open(path).map_err(|e| StoreError::BackendUnavailable {
        reason: format!("cannot open {}: {e}", path.display()),
    })?;

    // WAL: readers keep their snapshot while a writer commits.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", busy_timeout.as_millis() as i64)?;
    Ok(conn)
}

#[async_trait]
impl TransactionBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn begin(&self, scope: Scope, writable: bool) -> StoreResult<Box<dyn BackendTransaction>> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;

        let conn = tokio::task::spawn_blocking(move || -> StoreResult<Connection> {
            let conn = open_connection(&path, busy_timeout)?;
            if !writable {
                conn.pragma_update(None, "query_only", "ON")?;
            }
            conn.execute_batch("BEGIN DEFERRED;").map_err(classify)?;
            Ok(conn)
        })
        .await??;

        debug!(tenant = %scope.tenant, kind = %scope.kind, writable, "relational transaction started");
        Ok(Box::new(RelationalTransaction {
            conn: Arc::new(Mutex::new(Some(conn))),
            table: table_for(scope.kind),
            scope,
            writable,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Transaction
// ═══════════════════════════════════════════════════════════════════════

/// An open transaction on a [`RelationalBackend`].
///
/// The connection lives behind a mutex so a rollback issued after a
/// cancelled operation waits for that operation to finish first. Dropping
/// the last handle closes the connection, which rolls back anything
/// uncommitted.
pub struct RelationalTransaction {
    conn: Arc<Mutex<Option<Connection>>>,
    scope: Scope,
    table: &'static str,
    writable: bool,
}

/// Roll back a transaction being abandoned. The connection closes on drop
/// either way, which also discards anything uncommitted.
fn abandon(active: Connection) {
    if let Err(err) = active.execute_batch("ROLLBACK;") {
        warn!(%err, "rollback failed, closing connection");
    }
}

fn lock(conn: &Mutex<Option<Connection>>) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
    conn.lock()
        .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))
}

impl RelationalTransaction {
    /// Run `f` against the open connection on the blocking pool.
    ///
    /// A conflict rolls the transaction back and closes it.
    async fn execute<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            let active = guard.as_ref().ok_or(StoreError::TransactionClosed)?;
            let result = f(active);
            if let Err(StoreError::SerializationConflict { reason }) = &result {
                warn!(%reason, "serialization conflict, rolling back");
                if let Some(active) = guard.take() {
                    abandon(active);
                }
            }
            result
        })
        .await?
    }

    fn ensure_writable(&self, key: &RecordKey) -> StoreResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnlyViolation {
                kind: self.scope.kind.as_str(),
                key: key.to_string(),
            })
        }
    }
}

#[async_trait]
impl BackendTransaction for RelationalTransaction {
    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Vec<u8>>> {
        let table = self.table;
        let tenant = key.tenant().to_string();
        let id = key.storage_id().to_string();
        let shown = key.to_string();

        self.execute(move |conn| {
            let sql = format!("SELECT record FROM {table} WHERE tenant_id = ?1 AND record_id = ?2");
            let mut stmt = conn.prepare_cached(&sql).map_err(classify)?;
            let rows = stmt
                .query_map(params![tenant, id], |row| row.get::<_, Vec<u8>>(0))
                .map_err(classify)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(classify)?;

            match rows.len() {
                0 | 1 => Ok(rows.into_iter().next()),
                count => {
                    warn!(key = %shown, count, "unique key matched several rows");
                    Err(StoreError::TooManyRows { table, count })
                }
            }
        })
        .await
    }

    async fn put(&mut self, key: &RecordKey, blob: Vec<u8>, columns: ReportColumns) -> StoreResult<()> {
        self.ensure_writable(key)?;
        let kind = self.scope.kind;
        let tenant = key.tenant().to_string();
        let id = key.storage_id().to_string();
        let role_order = serde_json::to_string(&columns.role_order)?;

        self.execute(move |conn| {
            let now = chrono::Utc::now().timestamp();
            let written = match kind {
                RecordKind::Settings => conn.execute(
                    "INSERT INTO settings (tenant_id, record_id, record, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(tenant_id, record_id) DO UPDATE SET
                        record = excluded.record,
                        updated_at = excluded.updated_at",
                    params![tenant, id, blob, now],
                ),
                RecordKind::Event => conn.execute(
                    "INSERT INTO events (tenant_id, record_id, nice_name, state, announce_channel,
                                         signup_channel, role_order, record, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(tenant_id, record_id) DO UPDATE SET
                        nice_name = excluded.nice_name,
                        state = excluded.state,
                        announce_channel = excluded.announce_channel,
                        signup_channel = excluded.signup_channel,
                        role_order = excluded.role_order,
                        record = excluded.record,
                        updated_at = excluded.updated_at",
                    params![
                        tenant,
                        id,
                        columns.nice_name,
                        columns.state,
                        columns.announce_channel,
                        columns.signup_channel,
                        role_order,
                        blob,
                        now,
                    ],
                ),
            };
            written.map_err(classify)?;
            Ok(())
        })
        .await
    }

    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()> {
        self.ensure_writable(key)?;
        let table = self.table;
        let kind = self.scope.kind.as_str();
        let tenant = key.tenant().to_string();
        let id = key.storage_id().to_string();
        let shown = key.to_string();

        self.execute(move |conn| {
            let sql = format!("DELETE FROM {table} WHERE tenant_id = ?1 AND record_id = ?2");
            let removed = conn.execute(&sql, params![tenant, id]).map_err(classify)?;
            match removed {
                0 => Err(StoreError::NotFound { kind, key: shown }),
                1 => Ok(()),
                count => Err(StoreError::TooManyRows { table, count }),
            }
        })
        .await
    }

    async fn list(&mut self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let table = self.table;
        let tenant = self.scope.tenant.clone();

        self.execute(move |conn| {
            let sql = format!("SELECT record_id, record FROM {table} WHERE tenant_id = ?1 ORDER BY record_id");
            let mut stmt = conn.prepare_cached(&sql).map_err(classify)?;
            let rows = stmt
                .query_map(params![tenant], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(classify)?
                .collect::<Result<Vec<(String, Vec<u8>)>, _>>()
                .map_err(classify)?;
            Ok(rows)
        })
        .await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            let active = guard.take().ok_or(StoreError::TransactionClosed)?;
            if let Err(e) = active.execute_batch("COMMIT;") {
                abandon(active);
                return Err(classify(e));
            }
            Ok(())
        })
        .await??;

        debug!(tenant = %self.scope.tenant, kind = %self.scope.kind, "relational transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let mut guard = lock(&conn)?;
            let active = guard.take().ok_or(StoreError::TransactionClosed)?;
            active.execute_batch("ROLLBACK;")?;
            Ok(())
        })
        .await??;

        debug!(tenant = %self.scope.tenant, kind = %self.scope.kind, "relational transaction rolled back");
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
