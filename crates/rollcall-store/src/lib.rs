//! # rollcall-store
//!
//! Transactional record store for rollcall.
//!
//! Keeps each tenant's [`Settings`](rollcall_model::Settings) and
//! [`Event`](rollcall_model::Event) documents as versioned binary blobs in
//! one of two backends behind the same transaction contract:
//!
//! - **embedded**: one redb file; writers are serialized store-wide.
//! - **relational**: SQLite in WAL mode; concurrent writers are detected
//!   and the loser aborts with a retryable conflict.
//!
//! The store never retries. Every error reaches the caller typed, see
//! [`StoreError`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Store / Transaction<R>  (façade)        │
//! │    decode · encode · read-only · close   │
//! ├─────────────────────────────────────────┤
//! │  TransactionBackend / BackendTransaction │
//! ├────────────────────┬────────────────────┤
//! │  EmbeddedBackend   │  RelationalBackend │
//! │  (redb)            │  (rusqlite WAL)    │
//! │                    │  Migrations        │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use rollcall_model::engine;
//! use rollcall_store::{Store, StoreConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Store::open(&StoreConfig::load("config/default.toml")?).await?;
//! let cancel = CancellationToken::new();
//!
//! let mut txn = store.open_event_transaction("guild-1", true, &cancel).await?;
//! txn.update("Raid Night", &cancel, |event| engine::signup(event, "<@42>", "tank")).await?;
//! txn.commit(&cancel).await?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod migration;
pub mod record;
pub mod transaction;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{
    BackendTransaction, EmbeddedBackend, RecordKey, RecordKind, RelationalBackend, ReportColumns, Scope,
    TransactionBackend,
};
pub use config::{BackendKind, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use record::{Record, SETTINGS_RECORD_ID};
pub use transaction::{EventTransaction, SettingsTransaction, Store, Transaction};
