//! Error types for the rollcall-model crate.
//!
//! Validation failures (unknown role, unknown setting, closed event, bad
//! setting value) carry enough context to be shown to the person who issued
//! the command. [`ModelError::Corrupt`] is reserved for bytes that cannot be
//! decoded into a record.

use thiserror::Error;

/// Alias for `Result<T, ModelError>`.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors produced by the record model, the signup engine and the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The requested role is not offered by the event.
    #[error("unknown role: {role}")]
    UnknownRole { role: String },

    /// The event is not accepting signups.
    #[error("event {event} is closed")]
    EventClosed { event: String },

    /// The setting name is not one of the fixed setting names.
    #[error("unknown setting: {name}")]
    UnknownSetting { name: String },

    /// The value given for a setting failed validation.
    #[error("invalid value {value:?} for setting {name}: {reason}")]
    InvalidSettingValue {
        name: String,
        value: String,
        reason: String,
    },

    /// An invalid argument was provided to a model operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored bytes could not be decoded into a record.
    #[error("corrupt record: {reason}")]
    Corrupt { reason: String },
}
