//! The transaction façade callers work with.
//!
//! [`Store`] opens [`Transaction`]s confined to one tenant and one record
//! kind. A transaction decodes records on the way out, encodes them on the
//! way in, enforces read-only mode and tracks whether it has been closed,
//! independent of the backend underneath.
//!
//! Every operation takes a [`CancellationToken`]. When the token fires
//! mid-operation the transaction is rolled back, its backend resources are
//! released, and the operation returns [`StoreError::Cancelled`].

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use rollcall_model::{Event, ModelError, ModelResult, Settings, decode, encode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendTransaction, EmbeddedBackend, RecordKey, RelationalBackend, Scope, TransactionBackend};
use crate::config::{BackendKind, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::record::{Record, SETTINGS_RECORD_ID};

/// Transaction over a tenant's events.
pub type EventTransaction = Transaction<Event>;

/// Transaction over a tenant's settings document.
pub type SettingsTransaction = Transaction<Settings>;

/// Resolve `fut` unless `cancel` fires first; `None` means cancelled.
async fn until_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = StoreResult<T>>) -> Option<StoreResult<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = fut => Some(result),
    }
}

fn blank(what: &str) -> StoreError {
    ModelError::InvalidArgument(format!("{what} must not be blank")).into()
}

// ═══════════════════════════════════════════════════════════════════════
//  Store
// ═══════════════════════════════════════════════════════════════════════

/// Entry point: a handle to one backend. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn TransactionBackend>,
}

impl Store {
    pub fn new(backend: impl TransactionBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Open the backend named by `config`.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.path.clone();
        let busy_timeout = config.busy_timeout();

        let store = match config.backend {
            BackendKind::Embedded => {
                let backend = tokio::task::spawn_blocking(move || EmbeddedBackend::open(path)).await??;
                Self::new(backend)
            }
            BackendKind::Relational => {
                let backend =
                    tokio::task::spawn_blocking(move || RelationalBackend::open(path, busy_timeout)).await??;
                Self::new(backend)
            }
        };
        Ok(store)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Begin a transaction over records of type `R` for `tenant`.
    #[instrument(skip(self, cancel), fields(backend = self.backend.name(), kind = %R::KIND))]
    pub async fn begin<R: Record>(
        &self,
        tenant: &str,
        writable: bool,
        cancel: &CancellationToken,
    ) -> StoreResult<Transaction<R>> {
        let tenant = tenant.trim();
        if tenant.is_empty() {
            return Err(blank("tenant id"));
        }

        let scope = Scope::new(tenant, R::KIND);
        let inner = until_cancelled(cancel, self.backend.begin(scope.clone(), writable))
            .await
            .ok_or(StoreError::Cancelled)??;

        Ok(Transaction {
            inner,
            backend: self.backend.name(),
            scope,
            writable,
            closed: false,
            _record: PhantomData,
        })
    }

    pub async fn open_event_transaction(
        &self,
        tenant: &str,
        writable: bool,
        cancel: &CancellationToken,
    ) -> StoreResult<EventTransaction> {
        self.begin(tenant, writable, cancel).await
    }

    pub async fn open_settings_transaction(
        &self,
        tenant: &str,
        writable: bool,
        cancel: &CancellationToken,
    ) -> StoreResult<SettingsTransaction> {
        self.begin(tenant, writable, cancel).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Transaction
// ═══════════════════════════════════════════════════════════════════════

/// An open transaction over one tenant's records of type `R`.
///
/// Must be ended with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping an open transaction rolls it back.
pub struct Transaction<R: Record> {
    inner: Box<dyn BackendTransaction>,
    backend: &'static str,
    scope: Scope,
    writable: bool,
    closed: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Transaction<R> {
    pub fn tenant(&self) -> &str {
        &self.scope.tenant
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ── reads ────────────────────────────────────────────────────────

    /// Fetch a record, or `None` if nothing is stored under `record_id`.
    #[instrument(skip(self, cancel), fields(backend = self.backend, tenant = %self.scope.tenant, kind = %R::KIND))]
    pub async fn get(&mut self, record_id: &str, cancel: &CancellationToken) -> StoreResult<Option<R>> {
        let key = self.key(record_id)?;
        let outcome = until_cancelled(cancel, self.inner.get(&key)).await;
        let Some(bytes) = self.settle(outcome).await? else {
            return Ok(None);
        };
        decode_record(&key, &bytes).map(Some)
    }

    /// Fetch a record that must exist.
    pub async fn require(&mut self, record_id: &str, cancel: &CancellationToken) -> StoreResult<R> {
        match self.get(record_id, cancel).await? {
            Some(record) => Ok(record),
            None => Err(StoreError::NotFound {
                kind: R::KIND.as_str(),
                key: self.key(record_id)?.to_string(),
            }),
        }
    }

    /// Fetch a record, or a fresh one if nothing is stored yet.
    ///
    /// A fresh record is not written until [`put`](Self::put).
    pub async fn get_or_create(&mut self, record_id: &str, cancel: &CancellationToken) -> StoreResult<R> {
        match self.get(record_id, cancel).await? {
            Some(record) => Ok(record),
            None => Ok(R::create(record_id.trim())),
        }
    }

    /// Every record of this kind in the tenant, ordered by lowercase id.
    #[instrument(skip(self, cancel), fields(backend = self.backend, tenant = %self.scope.tenant, kind = %R::KIND))]
    pub async fn list(&mut self, cancel: &CancellationToken) -> StoreResult<Vec<R>> {
        self.ensure_open()?;
        let outcome = until_cancelled(cancel, self.inner.list()).await;
        let stored = self.settle(outcome).await?;

        let mut records = Vec::with_capacity(stored.len());
        for (id, bytes) in stored {
            let key = RecordKey::new(self.scope.tenant.clone(), &id);
            records.push(decode_record(&key, &bytes)?);
        }
        debug!(count = records.len(), "records listed");
        Ok(records)
    }

    // ── writes ───────────────────────────────────────────────────────

    /// Insert or replace the record stored under `record_id`.
    #[instrument(skip(self, record, cancel), fields(backend = self.backend, tenant = %self.scope.tenant, kind = %R::KIND))]
    pub async fn put(&mut self, record_id: &str, record: &R, cancel: &CancellationToken) -> StoreResult<()> {
        let key = self.key(record_id)?;
        self.ensure_writable(&key)?;

        let blob = encode(record);
        let outcome = until_cancelled(cancel, self.inner.put(&key, blob, record.report_columns())).await;
        self.settle(outcome).await
    }

    /// Read-modify-write an existing record.
    ///
    /// When `f` fails nothing is written and the stored record is unchanged.
    pub async fn update<T, F>(&mut self, record_id: &str, cancel: &CancellationToken, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut R) -> ModelResult<T>,
    {
        let mut record = self.require(record_id, cancel).await?;
        let out = f(&mut record)?;
        self.put(record_id, &record, cancel).await?;
        Ok(out)
    }

    // ── close ────────────────────────────────────────────────────────

    /// Make every write in this transaction durable.
    ///
    /// Cancellation is honoured until the commit starts; once started it
    /// runs to completion.
    #[instrument(skip(self, cancel), fields(backend = self.backend, tenant = %self.scope.tenant, kind = %R::KIND))]
    pub async fn commit(&mut self, cancel: &CancellationToken) -> StoreResult<()> {
        self.ensure_open()?;
        if cancel.is_cancelled() {
            self.abort().await;
            return Err(StoreError::Cancelled);
        }
        self.closed = true;
        self.inner.commit().await
    }

    /// Discard every write in this transaction.
    #[instrument(skip(self), fields(backend = self.backend, tenant = %self.scope.tenant, kind = %R::KIND))]
    pub async fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.inner.rollback().await
    }

    // ── internals ────────────────────────────────────────────────────

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            warn!(tenant = %self.scope.tenant, kind = %R::KIND, "transaction already closed");
            return Err(StoreError::TransactionClosed);
        }
        Ok(())
    }

    fn key(&self, record_id: &str) -> StoreResult<RecordKey> {
        self.ensure_open()?;
        if record_id.trim().is_empty() {
            return Err(blank("record id"));
        }
        Ok(RecordKey::new(self.scope.tenant.clone(), record_id))
    }

    fn ensure_writable(&self, key: &RecordKey) -> StoreResult<()> {
        if self.writable {
            return Ok(());
        }
        Err(StoreError::ReadOnlyViolation {
            kind: R::KIND.as_str(),
            key: key.to_string(),
        })
    }

    /// Turn a backend outcome into the caller's result, closing the
    /// transaction on cancellation or conflict.
    async fn settle<T>(&mut self, outcome: Option<StoreResult<T>>) -> StoreResult<T> {
        match outcome {
            Some(Err(err @ StoreError::SerializationConflict { .. })) => {
                // The backend has already rolled back.
                self.closed = true;
                Err(err)
            }
            Some(result) => result,
            None => {
                self.abort().await;
                Err(StoreError::Cancelled)
            }
        }
    }

    async fn abort(&mut self) {
        self.closed = true;
        match self.inner.rollback().await {
            Ok(()) => debug!(tenant = %self.scope.tenant, kind = %R::KIND, "cancelled, rolled back"),
            Err(err) => warn!(tenant = %self.scope.tenant, kind = %R::KIND, %err, "rollback after cancellation failed"),
        }
    }
}

impl Transaction<Event> {
    /// Delete an event.
    #[instrument(skip(self, cancel), fields(backend = self.backend, tenant = %self.scope.tenant))]
    pub async fn delete(&mut self, record_id: &str, cancel: &CancellationToken) -> StoreResult<()> {
        let key = self.key(record_id)?;
        self.ensure_writable(&key)?;
        let outcome = until_cancelled(cancel, self.inner.delete(&key)).await;
        self.settle(outcome).await
    }
}

impl Transaction<Settings> {
    /// The tenant's settings, defaults if none were ever saved.
    pub async fn settings(&mut self, cancel: &CancellationToken) -> StoreResult<Settings> {
        self.get_or_create(SETTINGS_RECORD_ID, cancel).await
    }

    pub async fn put_settings(&mut self, settings: &Settings, cancel: &CancellationToken) -> StoreResult<()> {
        self.put(SETTINGS_RECORD_ID, settings, cancel).await
    }

    /// Overwrite the tenant's settings with defaults.
    pub async fn reset(&mut self, cancel: &CancellationToken) -> StoreResult<()> {
        self.put_settings(&Settings::with_defaults(), cancel).await
    }

    pub async fn get_setting(&mut self, name: &str, cancel: &CancellationToken) -> StoreResult<String> {
        Ok(self.settings(cancel).await?.get_setting(name)?)
    }

    /// Validate and store one setting. An invalid value leaves the stored
    /// settings untouched.
    pub async fn set_setting(&mut self, name: &str, value: &str, cancel: &CancellationToken) -> StoreResult<()> {
        let mut settings = self.settings(cancel).await?;
        settings.set_setting(name, value)?;
        self.put_settings(&settings, cancel).await
    }
}

impl<R: Record> Drop for Transaction<R> {
    fn drop(&mut self) {
        if !self.closed {
            // Backend resources roll back when `inner` drops.
            warn!(tenant = %self.scope.tenant, kind = %R::KIND, "transaction dropped while open, rolling back");
        }
    }
}

fn decode_record<R: Record>(key: &RecordKey, bytes: &[u8]) -> StoreResult<R> {
    decode(bytes).map_err(|err| {
        warn!(key = %key, %err, "stored record failed to decode");
        let reason = match err {
            ModelError::Corrupt { reason } => reason,
            other => other.to_string(),
        };
        StoreError::RecordCorrupt {
            key: key.to_string(),
            reason,
        }
    })
}

// ── tests ────────────────────────────────────────────────────────────
