//! Integration tests for the rollcall-store crate.
//!
//! Each scenario runs against both backends on real files (via tempfile),
//! since callers must not be able to tell them apart.

use std::time::Duration;

use rollcall_model::{Event, ModelError, Placement, Settings, engine};
use rollcall_store::{
    BackendKind, EmbeddedBackend, RecordKey, RecordKind, RelationalBackend, ReportColumns, Scope, Store,
    StoreConfig, StoreError, TransactionBackend,
};
use tokio_util::sync::CancellationToken;

fn embedded(dir: &tempfile::TempDir) -> EmbeddedBackend {
    EmbeddedBackend::open(dir.path().join("store.redb")).unwrap()
}

fn relational(dir: &tempfile::TempDir) -> RelationalBackend {
    RelationalBackend::open(dir.path().join("store.db"), Duration::from_secs(5)).unwrap()
}

/// One store per backend, each in its own temp directory.
fn stores() -> Vec<(tempfile::TempDir, Store)> {
    let a = tempfile::tempdir().unwrap();
    let embedded = Store::new(embedded(&a));
    let b = tempfile::tempdir().unwrap();
    let relational = Store::new(relational(&b));
    vec![(a, embedded), (b, relational)]
}

fn raid() -> Event {
    let mut event = Event::new("Raid Night");
    event.signup_channel = "signups".into();
    event.set_role("tank", "🛡", 2);
    event.set_role("healer", "✚", 1);
    event
}

// ═══════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn event_keys_are_case_insensitive() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.put("Raid Night", &raid(), &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        let event = txn.require("RAID NIGHT", &cancel).await.unwrap();
        assert_eq!(event.name, "Raid Night", "{}", store.backend_name());
        assert_eq!(event, raid());
        txn.commit(&cancel).await.unwrap();
    }
}

#[tokio::test]
async fn overflow_is_classified_at_read_time() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.put("raid", &raid(), &cancel).await.unwrap();
        for who in ["A", "B", "C"] {
            txn.update("raid", &cancel, |event: &mut Event| engine::signup(event, who, "tank"))
                .await
                .unwrap();
        }
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        let event = txn.require("raid", &cancel).await.unwrap();
        assert_eq!(engine::placement_of(&event, "C"), Some(Placement::Overflow));

        txn.update("raid", &cancel, |event: &mut Event| Ok(engine::withdraw(event, "C")))
            .await
            .unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        let event = txn.require("raid", &cancel).await.unwrap();
        let tanks = engine::role_roster(&event, "tank").unwrap();
        assert_eq!(tanks.main, vec!["A", "B"], "{}", store.backend_name());
        assert!(tanks.overflow.is_empty());
        assert_eq!(event.signups.len(), 3, "withdrawn signup is kept for audit");
        txn.rollback().await.unwrap();
    }
}

#[tokio::test]
async fn list_is_scoped_to_tenant() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        for (tenant, names) in [("g1", vec!["Raid", "Arena"]), ("g2", vec!["Dungeon"])] {
            let mut txn = store.open_event_transaction(tenant, true, &cancel).await.unwrap();
            for name in names {
                txn.put(name, &Event::new(name), &cancel).await.unwrap();
            }
            txn.commit(&cancel).await.unwrap();
        }

        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        let names: Vec<String> = txn
            .list(&cancel)
            .await
            .unwrap()
            .into_iter()
            .map(|event| event.name)
            .collect();
        assert_eq!(names, vec!["Arena", "Raid"], "{}", store.backend_name());
        txn.commit(&cancel).await.unwrap();
    }
}

#[tokio::test]
async fn delete_removes_and_missing_is_not_found() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.put("Raid", &Event::new("Raid"), &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.delete("RAID", &cancel).await.unwrap();
        let err = txn.delete("raid", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "event", .. }), "{}", store.backend_name());
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        assert!(txn.get("raid", &cancel).await.unwrap().is_none());
        let err = txn.require("raid", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        txn.rollback().await.unwrap();
    }
}

#[tokio::test]
async fn get_or_create_does_not_write() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        let event = txn.get_or_create(" Trial ", &cancel).await.unwrap();
        assert_eq!(event.name, "Trial");
        assert!(event.is_open());
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        assert!(txn.list(&cancel).await.unwrap().is_empty(), "{}", store.backend_name());
        txn.commit(&cancel).await.unwrap();
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Transaction contract
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn read_only_transaction_rejects_writes() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        let err = txn.put("raid", &raid(), &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnlyViolation { .. }), "{}", store.backend_name());
        let err = txn.delete("raid", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnlyViolation { .. }));

        let mut settings = store.open_settings_transaction("g1", false, &cancel).await.unwrap();
        let err = settings.reset(&cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnlyViolation { kind: "settings", .. }));
    }
}

#[tokio::test]
async fn double_close_reports_transaction_closed() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.rollback().await.unwrap();
        assert!(matches!(txn.commit(&cancel).await, Err(StoreError::TransactionClosed)));
        assert!(matches!(txn.rollback().await, Err(StoreError::TransactionClosed)));

        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();
        assert!(matches!(txn.rollback().await, Err(StoreError::TransactionClosed)));
        assert!(matches!(txn.get("raid", &cancel).await, Err(StoreError::TransactionClosed)));
    }
}

#[tokio::test]
async fn rollback_discards_writes() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.put("raid", &raid(), &cancel).await.unwrap();
        assert!(txn.get("raid", &cancel).await.unwrap().is_some());
        txn.rollback().await.unwrap();

        let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
        assert!(txn.get("raid", &cancel).await.unwrap().is_none(), "{}", store.backend_name());
        txn.rollback().await.unwrap();
    }
}

#[tokio::test]
async fn dropped_transaction_is_rolled_back() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        {
            let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
            txn.put("raid", &raid(), &cancel).await.unwrap();
        }

        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        assert!(txn.get("raid", &cancel).await.unwrap().is_none(), "{}", store.backend_name());
        txn.commit(&cancel).await.unwrap();
    }
}

#[tokio::test]
async fn cancelled_operation_rolls_back() {
    for (_dir, store) in stores() {
        let cancel = CancellationToken::new();
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.put("raid", &raid(), &cancel).await.unwrap();

        cancel.cancel();
        let err = txn.put("arena", &Event::new("Arena"), &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled), "{}", store.backend_name());
        assert!(matches!(txn.commit(&cancel).await, Err(StoreError::TransactionClosed)));

        let fresh = CancellationToken::new();
        let mut txn = store.open_event_transaction("g1", true, &fresh).await.unwrap();
        assert!(txn.list(&fresh).await.unwrap().is_empty());
        txn.commit(&fresh).await.unwrap();
    }
}

/// Write undecodable bytes straight through the backend, then read them
/// back through the façade.
async fn read_corrupt_record(backend: impl TransactionBackend) {
    let key = RecordKey::new("g1", "raid");
    let mut raw = backend.begin(Scope::new("g1", RecordKind::Event), true).await.unwrap();
    raw.put(&key, vec![0xff, 0x01], ReportColumns::default()).await.unwrap();
    raw.commit().await.unwrap();

    let store = Store::new(backend);
    let cancel = CancellationToken::new();
    let mut txn = store.open_event_transaction("g1", false, &cancel).await.unwrap();
    let err = txn.get("Raid", &cancel).await.unwrap_err();
    assert!(
        matches!(&err, StoreError::RecordCorrupt { key, .. } if key == "g1/raid"),
        "{}: {err}",
        store.backend_name()
    );
    assert!(!err.is_retryable());
    txn.rollback().await.unwrap();
}

#[tokio::test]
async fn corrupt_bytes_surface_as_record_corrupt() {
    let a = tempfile::tempdir().unwrap();
    read_corrupt_record(embedded(&a)).await;
    let b = tempfile::tempdir().unwrap();
    read_corrupt_record(relational(&b)).await;
}

#[tokio::test]
async fn relational_concurrent_writers_conflict() {
    let cancel = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(relational(&dir));

    let mut seed = store.open_event_transaction("g1", true, &cancel).await.unwrap();
    seed.put("raid", &raid(), &cancel).await.unwrap();
    seed.commit(&cancel).await.unwrap();

    let mut a = store.open_event_transaction("g1", true, &cancel).await.unwrap();
    let mut b = store.open_event_transaction("g1", true, &cancel).await.unwrap();
    let mut event_a = a.require("raid", &cancel).await.unwrap();
    let mut event_b = b.require("raid", &cancel).await.unwrap();

    engine::signup(&mut event_a, "A", "tank").unwrap();
    a.put("raid", &event_a, &cancel).await.unwrap();
    a.commit(&cancel).await.unwrap();

    engine::signup(&mut event_b, "B", "tank").unwrap();
    let err = b.put("raid", &event_b, &cancel).await.unwrap_err();
    assert!(matches!(err, StoreError::SerializationConflict { .. }), "{err}");
    assert!(err.is_retryable());
    assert!(b.is_closed());

    let mut check = store.open_event_transaction("g1", false, &cancel).await.unwrap();
    let event = check.require("raid", &cancel).await.unwrap();
    let participants: Vec<&str> = event.active_signups().map(|s| s.participant.as_str()).collect();
    assert_eq!(participants, vec!["A"]);
    check.rollback().await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
//  Settings
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn settings_validation_through_store() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_settings_transaction("g1", true, &cancel).await.unwrap();
        assert_eq!(txn.settings(&cancel).await.unwrap(), Settings::with_defaults());

        txn.set_setting("ShowAfterSignup", "no", &cancel).await.unwrap();
        txn.set_setting("showaftersignup", "yes", &cancel).await.unwrap();
        let err = txn.set_setting("showaftersignup", "maybe", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::Model(ModelError::InvalidSettingValue { .. })));
        let err = txn.set_setting("volume", "11", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::Model(ModelError::UnknownSetting { .. })));
        txn.set_setting("signupchannel", "#signups", &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_settings_transaction("g1", false, &cancel).await.unwrap();
        assert_eq!(txn.get_setting("showaftersignup", &cancel).await.unwrap(), "true");
        assert_eq!(txn.get_setting("signupchannel", &cancel).await.unwrap(), "signups");
        txn.commit(&cancel).await.unwrap();

        // Other tenants still see defaults.
        let mut txn = store.open_settings_transaction("g2", false, &cancel).await.unwrap();
        assert_eq!(
            txn.get_setting("signupchannel", &cancel).await.unwrap(),
            "",
            "{}",
            store.backend_name()
        );
        txn.commit(&cancel).await.unwrap();
    }
}

#[tokio::test]
async fn settings_reset_restores_defaults() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_settings_transaction("g1", true, &cancel).await.unwrap();
        txn.set_setting("commandprefix", "?", &cancel).await.unwrap();
        txn.set_setting("adminroles", "Officer, GM", &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_settings_transaction("g1", true, &cancel).await.unwrap();
        assert_eq!(txn.get_setting("adminroles", &cancel).await.unwrap(), "Officer,GM");
        txn.reset(&cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_settings_transaction("g1", false, &cancel).await.unwrap();
        assert_eq!(txn.settings(&cancel).await.unwrap(), Settings::with_defaults());
        txn.commit(&cancel).await.unwrap();
    }
}

#[tokio::test]
async fn settings_do_not_leak_between_nested_tenant_ids() {
    let cancel = CancellationToken::new();
    for (_dir, store) in stores() {
        let mut txn = store.open_settings_transaction("a/b", true, &cancel).await.unwrap();
        txn.set_setting("commandprefix", "?", &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_settings_transaction("a", false, &cancel).await.unwrap();
        assert!(txn.list(&cancel).await.unwrap().is_empty(), "{}", store.backend_name());
        assert!(txn.get("b/settings", &cancel).await.unwrap().is_none());
        assert_eq!(txn.get_setting("commandprefix", &cancel).await.unwrap(), "!");
        txn.commit(&cancel).await.unwrap();

        let mut txn = store.open_settings_transaction("a/b", false, &cancel).await.unwrap();
        assert_eq!(txn.get_setting("commandprefix", &cancel).await.unwrap(), "?");
        txn.commit(&cancel).await.unwrap();
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn store_opens_from_config() {
    let dir = tempfile::tempdir().unwrap();
    for (backend, file) in [(BackendKind::Embedded, "nested/store.redb"), (BackendKind::Relational, "nested/store.db")] {
        let config = StoreConfig {
            backend,
            path: dir.path().join(file),
            ..StoreConfig::default()
        };
        let store = Store::open(&config).await.unwrap();
        assert!(config.path.exists());

        let cancel = CancellationToken::new();
        let mut txn = store.open_event_transaction("g1", true, &cancel).await.unwrap();
        txn.put("raid", &raid(), &cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();
    }
}
