//! Documents the store knows how to keep.

use rollcall_model::{Event, Settings, Versioned};

use crate::backend::{RecordKind, ReportColumns};

/// Record id of the single settings document per tenant.
pub const SETTINGS_RECORD_ID: &str = "settings";

/// A document type the store can load and save.
pub trait Record: Versioned + Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    /// A fresh document for a record id that has nothing stored yet.
    fn create(record_id: &str) -> Self;

    /// Plaintext reporting columns written next to the blob.
    fn report_columns(&self) -> ReportColumns {
        ReportColumns::default()
    }
}

impl Record for Event {
    const KIND: RecordKind = RecordKind::Event;

    fn create(record_id: &str) -> Self {
        Event::new(record_id)
    }

    fn report_columns(&self) -> ReportColumns {
        ReportColumns {
            nice_name: self.name.clone(),
            state: self.lifecycle().as_str().to_string(),
            announce_channel: self.announce_channel.clone(),
            signup_channel: self.signup_channel.clone(),
            role_order: self.role_order.clone(),
        }
    }
}

impl Record for Settings {
    const KIND: RecordKind = RecordKind::Settings;

    fn create(_record_id: &str) -> Self {
        Settings::with_defaults()
    }
}
