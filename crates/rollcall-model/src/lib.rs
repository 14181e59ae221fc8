//! # rollcall-model
//!
//! Record model for rollcall: per-tenant [`Settings`], per-tenant [`Event`]
//! rosters, the signup engine that assigns participants to role slots, and
//! the versioned binary encoding both documents are stored in.
//!
//! Nothing in this crate performs I/O. The `rollcall-store` crate loads and
//! saves these documents inside transactions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  engine    signup / withdraw / roster    │
//! ├─────────────────────────────────────────┤
//! │  event     Event, RoleSlot, Signup       │
//! │  settings  Settings, SettingName         │
//! │  identity  participant normalization     │
//! ├─────────────────────────────────────────┤
//! │  encoding  format byte + protobuf body   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```
//! use rollcall_model::{engine, Event, Placement};
//!
//! let mut event = Event::new("Raid Night");
//! event.set_role("tank", "🛡", 1);
//!
//! engine::signup(&mut event, "<@1>", "tank").unwrap();
//! let outcome = engine::signup(&mut event, "<@2>", "Tank").unwrap();
//! assert_eq!(outcome.placement, Placement::Overflow);
//! ```

pub mod encoding;
pub mod engine;
pub mod error;
pub mod event;
pub mod identity;
pub mod settings;

// ── re-exports ───────────────────────────────────────────────────────

pub use encoding::{Versioned, decode, encode};
pub use engine::{BatchEntry, Placement, RoleRoster, SignupOutcome};
pub use error::{ModelError, ModelResult};
pub use event::{Event, EventState, RoleSlot, Signup, SignupStatus};
pub use identity::{normalize_participant, same_participant};
pub use settings::{SettingKind, SettingName, Settings, parse_bool};
