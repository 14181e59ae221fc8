//! Event (trial) documents.
//!
//! An [`Event`] is a named roster with an open/closed lifecycle, a list of
//! [`RoleSlot`]s with capacities, and the append-ordered list of every
//! [`Signup`] ever made, including canceled ones kept for audit.
//!
//! Field tags are part of the stored format and must never be reused.

use std::collections::BTreeMap;

use crate::encoding::Versioned;
use crate::identity::{normalize_participant, same_participant};

// ═══════════════════════════════════════════════════════════════════════
//  Enumerations
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle state of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EventState {
    /// Accepting signups.
    Open = 0,
    /// Not accepting signups.
    Closed = 1,
}

impl EventState {
    /// Lowercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single signup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SignupStatus {
    /// Counts toward capacity and appears in listings.
    Active = 0,
    /// Withdrawn; kept for audit only.
    Canceled = 1,
}

// ═══════════════════════════════════════════════════════════════════════
//  Documents
// ═══════════════════════════════════════════════════════════════════════

/// A role offered by an event.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct RoleSlot {
    /// Role name; compared case-insensitively.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Display emoji, empty when none was configured.
    #[prost(string, tag = "2")]
    pub emoji: String,
    /// Number of main slots. Zero means the role is not offered.
    #[prost(uint32, tag = "3")]
    pub capacity: u32,
}

impl RoleSlot {
    /// Build a role slot.
    pub fn new(name: impl Into<String>, emoji: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            emoji: emoji.into(),
            capacity,
        }
    }

    /// Whether this slot is named `role`, ignoring case.
    pub fn is_named(&self, role: &str) -> bool {
        role_key(&self.name) == role_key(role)
    }
}

/// A participant's claim on a role.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Signup {
    /// Canonical participant identifier.
    #[prost(string, tag = "1")]
    pub participant: String,
    /// Role name as spelled by the matching [`RoleSlot`] at signup time.
    #[prost(string, tag = "2")]
    pub role: String,
    #[prost(enumeration = "SignupStatus", tag = "3")]
    pub status: i32,
}

impl Signup {
    /// Build an active signup for an already-normalized participant.
    pub fn active(participant: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            role: role.into(),
            status: SignupStatus::Active as i32,
        }
    }

    /// Whether this signup still counts.
    pub fn is_active(&self) -> bool {
        matches!(SignupStatus::try_from(self.status), Ok(SignupStatus::Active))
    }

    /// Soft-delete this signup.
    pub fn cancel(&mut self) {
        self.status = SignupStatus::Canceled as i32;
    }

    /// Whether this signup is for `role`, ignoring case.
    pub fn is_for_role(&self, role: &str) -> bool {
        role_key(&self.role) == role_key(role)
    }
}

/// A role-limited signup roster.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    /// Display name; the store key is its lowercase form.
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(string, tag = "3")]
    pub announce_channel: String,
    #[prost(string, tag = "4")]
    pub signup_channel: String,
    /// Overrides the tenant-wide announce target when non-empty.
    #[prost(string, tag = "5")]
    pub announce_to: String,
    #[prost(enumeration = "EventState", tag = "6")]
    pub state: i32,
    /// Legacy role → capacity map. Emptied by [`Event::migrate_role_counts`].
    #[prost(btree_map = "string, uint32", tag = "7")]
    pub role_counts: BTreeMap<String, u32>,
    #[prost(message, repeated, tag = "8")]
    pub signups: Vec<Signup>,
    #[prost(message, repeated, tag = "9")]
    pub roles: Vec<RoleSlot>,
    /// Explicit display order as lowercase role names.
    #[prost(string, repeated, tag = "10")]
    pub role_order: Vec<String>,
}

impl Versioned for Event {
    fn upgrade(&mut self) -> bool {
        self.migrate_role_counts()
    }
}

impl Event {
    /// Create an open event with no roles and no signups.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: EventState::Open as i32,
            ..Default::default()
        }
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Current lifecycle state. Unrecognized stored values read as closed.
    pub fn lifecycle(&self) -> EventState {
        EventState::try_from(self.state).unwrap_or(EventState::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle() == EventState::Open
    }

    /// Start accepting signups.
    pub fn open(&mut self) {
        self.state = EventState::Open as i32;
    }

    /// Stop accepting signups. Existing signups are kept.
    pub fn close(&mut self) {
        self.state = EventState::Closed as i32;
    }

    // ── roles ────────────────────────────────────────────────────────

    /// Look up a role slot by case-insensitive name.
    pub fn role(&self, name: &str) -> Option<&RoleSlot> {
        self.roles.iter().find(|slot| slot.is_named(name))
    }

    /// Add a role slot, or update emoji and capacity of an existing one in place.
    pub fn set_role(&mut self, name: &str, emoji: &str, capacity: u32) {
        match self.roles.iter_mut().find(|slot| slot.is_named(name)) {
            Some(slot) => {
                slot.emoji = emoji.to_string();
                slot.capacity = capacity;
            }
            None => self.roles.push(RoleSlot::new(name.trim(), emoji, capacity)),
        }
    }

    /// Remove a role slot. Signups for the role are kept but no longer listed.
    pub fn remove_role(&mut self, name: &str) -> bool {
        let before = self.roles.len();
        self.roles.retain(|slot| !slot.is_named(name));
        let key = role_key(name);
        self.role_order.retain(|entry| *entry != key);
        self.roles.len() != before
    }

    /// Replace the explicit display order.
    ///
    /// Names are lowercased; blanks and repeats are dropped.
    pub fn set_role_order<S: AsRef<str>>(&mut self, names: &[S]) {
        let mut order: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let key = role_key(name.as_ref());
            if !key.is_empty() && !order.contains(&key) {
                order.push(key);
            }
        }
        self.role_order = order;
    }

    /// Role slots in display order.
    ///
    /// Roles named in `role_order` come first, in that order; the remaining
    /// slots follow in the order they were added.
    pub fn ordered_roles(&self) -> Vec<&RoleSlot> {
        let mut ordered: Vec<&RoleSlot> = self
            .role_order
            .iter()
            .filter_map(|key| self.role(key))
            .collect();
        for slot in &self.roles {
            if !ordered.iter().any(|seen| seen.is_named(&slot.name)) {
                ordered.push(slot);
            }
        }
        ordered
    }

    // ── signups ──────────────────────────────────────────────────────

    /// Active signups in append order.
    pub fn active_signups(&self) -> impl Iterator<Item = &Signup> {
        self.signups.iter().filter(|s| s.is_active())
    }

    /// Active signups for one role in append order.
    pub fn active_signups_for_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Signup> {
        self.active_signups().filter(move |s| s.is_for_role(role))
    }

    /// The participant's active signup, if any.
    pub fn active_signup_for(&self, participant: &str) -> Option<&Signup> {
        self.active_signups()
            .find(|s| same_participant(&s.participant, participant))
    }

    /// Every signup the participant ever made here, canceled ones included.
    pub fn history_for(&self, participant: &str) -> Vec<&Signup> {
        let who = normalize_participant(participant);
        self.signups
            .iter()
            .filter(|s| same_participant(&s.participant, &who))
            .collect()
    }

    // ── schema migration ─────────────────────────────────────────────

    /// Rewrite the legacy role → capacity map into role slots.
    ///
    /// Legacy records carry no emoji and no explicit order; slots are created
    /// with an empty emoji in map key order. Roles that already have a slot
    /// keep it. Returns `true` if the legacy map was non-empty.
    pub fn migrate_role_counts(&mut self) -> bool {
        if self.role_counts.is_empty() {
            return false;
        }
        let legacy = std::mem::take(&mut self.role_counts);
        for (name, capacity) in legacy {
            if self.role(&name).is_none() {
                self.roles.push(RoleSlot::new(name, "", capacity));
            }
        }
        tracing::debug!(event = %self.name, roles = self.roles.len(), "migrated legacy role counts");
        true
    }
}

/// Normalized identity of a role name.
pub(crate) fn role_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};

    fn raid() -> Event {
        let mut event = Event::new("Raid Night");
        event.set_role("Tank", "🛡", 2);
        event.set_role("Healer", "💚", 3);
        event.set_role("DPS", "⚔", 5);
        event
    }

    #[test]
    fn new_event_is_open_and_empty() {
        let event = Event::new("Raid");
        assert!(event.is_open());
        assert_eq!(event.lifecycle(), EventState::Open);
        assert!(event.roles.is_empty());
        assert!(event.signups.is_empty());
    }

    #[test]
    fn open_and_close() {
        let mut event = Event::new("Raid");
        event.close();
        assert_eq!(event.lifecycle(), EventState::Closed);
        event.open();
        assert!(event.is_open());
    }

    #[test]
    fn unknown_state_reads_as_closed() {
        let mut event = Event::new("Raid");
        event.state = 17;
        assert!(!event.is_open());
    }

    #[test]
    fn role_lookup_ignores_case() {
        let event = raid();
        assert_eq!(event.role("tank").unwrap().name, "Tank");
        assert_eq!(event.role("HEALER").unwrap().capacity, 3);
        assert!(event.role("bard").is_none());
    }

    #[test]
    fn set_role_updates_in_place() {
        let mut event = raid();
        event.set_role("tank", "🪓", 4);
        assert_eq!(event.roles.len(), 3);
        assert_eq!(event.roles[0].name, "Tank");
        assert_eq!(event.roles[0].emoji, "🪓");
        assert_eq!(event.roles[0].capacity, 4);
    }

    #[test]
    fn remove_role_drops_slot_and_order_entry() {
        let mut event = raid();
        event.set_role_order(&["dps", "tank"]);
        assert!(event.remove_role("TANK"));
        assert!(!event.remove_role("tank"));
        assert!(event.role("tank").is_none());
        assert_eq!(event.role_order, vec!["dps"]);
    }

    #[test]
    fn role_order_is_lowercased_and_deduplicated() {
        let mut event = raid();
        event.set_role_order(&["DPS", " ", "dps", "Healer"]);
        assert_eq!(event.role_order, vec!["dps", "healer"]);
    }

    #[test]
    fn ordered_roles_put_explicit_order_first() {
        let mut event = raid();
        event.set_role_order(&["dps", "missing"]);
        let names: Vec<&str> = event.ordered_roles().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["DPS", "Tank", "Healer"]);
    }

    #[test]
    fn ordered_roles_default_to_discovery_order() {
        let event = raid();
        let names: Vec<&str> = event.ordered_roles().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Tank", "Healer", "DPS"]);
    }

    #[test]
    fn history_includes_canceled_signups() {
        let mut event = raid();
        event.signups.push(Signup::active("<@1>", "Tank"));
        event.signups[0].cancel();
        event.signups.push(Signup::active("<@1>", "DPS"));

        assert_eq!(event.history_for("<@!1>").len(), 2);
        assert_eq!(event.active_signup_for("<@!1>").unwrap().role, "DPS");
        assert_eq!(event.active_signups().count(), 1);
    }

    #[test]
    fn migrate_role_counts_builds_slots() {
        let mut event = Event::new("Legacy");
        event.role_counts.insert("tank".into(), 2);
        event.role_counts.insert("dps".into(), 6);

        assert!(event.migrate_role_counts());
        assert!(event.role_counts.is_empty());
        assert_eq!(event.roles.len(), 2);
        assert_eq!(event.roles[0], RoleSlot::new("dps", "", 6));
        assert_eq!(event.roles[1], RoleSlot::new("tank", "", 2));
        assert!(event.role_order.is_empty());
    }

    #[test]
    fn migrate_role_counts_is_idempotent() {
        let mut event = Event::new("Legacy");
        event.role_counts.insert("tank".into(), 2);
        event.migrate_role_counts();
        let once = event.clone();

        assert!(!event.migrate_role_counts());
        assert_eq!(event, once);
    }

    #[test]
    fn migrate_role_counts_keeps_existing_slots() {
        let mut event = Event::new("Mixed");
        event.set_role("Tank", "🛡", 3);
        event.role_counts.insert("tank".into(), 1);
        event.role_counts.insert("healer".into(), 2);

        event.migrate_role_counts();
        assert_eq!(event.role("tank").unwrap().capacity, 3);
        assert_eq!(event.role("healer").unwrap().capacity, 2);
    }

    #[test]
    fn legacy_record_is_migrated_on_decode() {
        let mut legacy = Event::new("Legacy");
        legacy.role_counts.insert("tank".into(), 2);
        legacy.signups.push(Signup::active("<@1>", "tank"));
        let stored = encode(&legacy);

        let decoded: Event = decode(&stored).unwrap();
        assert!(decoded.role_counts.is_empty());
        assert_eq!(decoded.role("tank").unwrap().capacity, 2);

        // Decoding again from the same stored bytes migrates again.
        let again: Event = decode(&stored).unwrap();
        assert_eq!(again, decoded);

        // After an explicit save the migrated shape round-trips unchanged.
        let resaved: Event = decode(&encode(&decoded)).unwrap();
        assert_eq!(resaved, decoded);
    }

    #[test]
    fn engine_produced_event_round_trips() {
        let mut event = raid();
        event.description = "Thursday 20:00".into();
        event.announce_channel = "raids".into();
        event.set_role_order(&["healer"]);
        event.signups.push(Signup::active("<@1>", "Tank"));
        event.signups.push(Signup::active("<@2>", "Tank"));
        event.signups[0].cancel();
        event.close();

        let decoded: Event = decode(&encode(&event)).unwrap();
        assert_eq!(decoded, event);
    }
}
