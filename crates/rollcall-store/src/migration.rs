//! Schema migrations for the relational backend.
//!
//! Static SQL keyed by version; `_migrations` records what has run.

use rusqlite::{Connection, params};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// `(version, sql)` pairs, strictly increasing by version. Append only.
static MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE settings (
            tenant_id  TEXT NOT NULL,
            record_id  TEXT NOT NULL,
            record     BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, record_id)
        );

        CREATE TABLE events (
            tenant_id        TEXT NOT NULL,
            record_id        TEXT NOT NULL,
            nice_name        TEXT NOT NULL DEFAULT '',
            state            TEXT NOT NULL DEFAULT 'open',
            announce_channel TEXT NOT NULL DEFAULT '',
            signup_channel   TEXT NOT NULL DEFAULT '',
            record           BLOB NOT NULL,
            updated_at       INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, record_id)
        );
        "#,
    ),
    (
        2,
        r#"
        ALTER TABLE events ADD COLUMN role_order TEXT NOT NULL DEFAULT '[]';
        CREATE INDEX idx_events_tenant_state ON events(tenant_id, state);
        "#,
    ),
];

fn failed(version: u32, step: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| StoreError::Migration {
        version,
        message: format!("{step}: {e}"),
    }
}

/// Bring the record schema up to date. Each version runs in its own
/// transaction and is recorded in `_migrations`.
///
/// Synchronous; call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version    INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )
    .map_err(failed(0, "create _migrations"))?;

    let current = current_version(conn)?;
    let mut applied = 0;
    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        apply(conn, version, sql)?;
        applied += 1;
    }

    if applied == 0 {
        debug!(version = current, "record schema is up to date");
    } else {
        info!(from = current, applied, "record schema migrated");
    }
    Ok(())
}

/// Highest applied version, 0 on a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
        .map_err(failed(0, "read current version"))
}

fn apply(conn: &Connection, version: u32, sql: &str) -> StoreResult<()> {
    let tx = conn.unchecked_transaction().map_err(failed(version, "begin"))?;
    let result = tx.execute_batch(sql).and_then(|()| {
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, chrono::Utc::now().timestamp()],
        )
    });

    match result {
        Ok(_) => {
            tx.commit().map_err(failed(version, "commit"))?;
            info!(version, "migration applied");
            Ok(())
        }
        Err(e) => {
            warn!(version, err = %e, "migration failed, rolling back");
            if let Err(err) = tx.rollback() {
                warn!(version, %err, "rollback failed");
            }
            Err(failed(version, "apply")(e))
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
