//! Signup engine.
//!
//! Pure functions that move participants in and out of an [`Event`]'s
//! roster. Nothing here touches storage; callers load an event inside a
//! transaction, apply these operations, and save it back.
//!
//! Overflow is never stored. Whether a signup is "main" or "overflow" is
//! computed from its position among the role's active signups (append
//! order) and the role's current capacity, so changing a capacity
//! reclassifies existing signups without rewriting them.
//!
//! Every mutating operation validates first and mutates last: an error
//! leaves the event exactly as it was.

use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::event::{Event, RoleSlot, Signup};
use crate::identity::{normalize_participant, same_participant};

/// Whether a signup falls inside or beyond its role's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Main,
    Overflow,
}

impl Placement {
    fn at(position: usize, capacity: u32) -> Self {
        if position < capacity as usize {
            Self::Main
        } else {
            Self::Overflow
        }
    }

    pub fn is_overflow(&self) -> bool {
        *self == Self::Overflow
    }
}

/// Result of a successful [`signup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupOutcome {
    /// Where the participant now sits in the role.
    pub placement: Placement,
    /// Role of the active signup canceled to make room for this one.
    pub previous_role: Option<String>,
    /// `false` when the participant was already signed up for this role.
    pub changed: bool,
}

impl SignupOutcome {
    pub fn is_overflow(&self) -> bool {
        self.placement.is_overflow()
    }
}

/// Active signups of one role split by capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRoster<'a> {
    pub slot: &'a RoleSlot,
    /// First `capacity` participants in signup order.
    pub main: Vec<&'a str>,
    /// Everyone after the first `capacity`, in signup order.
    pub overflow: Vec<&'a str>,
}

// ═══════════════════════════════════════════════════════════════════════
//  Mutations
// ═══════════════════════════════════════════════════════════════════════

/// Sign `participant` up for `role`.
///
/// - Closed events reject with [`ModelError::EventClosed`].
/// - Roles without a slot, or with capacity 0, reject with [`ModelError::UnknownRole`].
/// - An active signup for the same role is kept as-is.
/// - An active signup for a different role is canceled first, so a
///   participant never holds more than one active signup per event.
pub fn signup(event: &mut Event, participant: &str, role: &str) -> ModelResult<SignupOutcome> {
    if !event.is_open() {
        return Err(ModelError::EventClosed {
            event: event.name.clone(),
        });
    }

    let slot = event
        .role(role)
        .filter(|slot| slot.capacity > 0)
        .ok_or_else(|| ModelError::UnknownRole {
            role: role.trim().to_string(),
        })?;
    let role_name = slot.name.clone();
    let capacity = slot.capacity;

    let who = normalize_participant(participant);
    if who.is_empty() {
        return Err(ModelError::InvalidArgument("participant must not be empty".into()));
    }

    let existing = event
        .signups
        .iter()
        .position(|s| s.is_active() && same_participant(&s.participant, &who));

    let mut previous_role = None;
    if let Some(index) = existing {
        if event.signups[index].is_for_role(&role_name) {
            let placement = position_in_role(event, &role_name, &who)
                .map(|position| Placement::at(position, capacity))
                .unwrap_or(Placement::Overflow);
            return Ok(SignupOutcome {
                placement,
                previous_role: None,
                changed: false,
            });
        }
        let prior = &mut event.signups[index];
        prior.cancel();
        previous_role = Some(prior.role.clone());
    }

    let ahead = event.active_signups_for_role(&role_name).count();
    let placement = Placement::at(ahead, capacity);
    event.signups.push(Signup::active(who.clone(), role_name.clone()));

    debug!(
        event = %event.name,
        participant = %who,
        role = %role_name,
        ?placement,
        replaced = ?previous_role,
        "signup recorded"
    );

    Ok(SignupOutcome {
        placement,
        previous_role,
        changed: true,
    })
}

/// Cancel the participant's active signup.
///
/// Returns `true` if a signup was canceled; withdrawing again is a no-op.
pub fn withdraw(event: &mut Event, participant: &str) -> bool {
    let who = normalize_participant(participant);
    let mut canceled = false;
    // Records written before normalization may hold more than one.
    for signup in event
        .signups
        .iter_mut()
        .filter(|s| s.is_active() && same_participant(&s.participant, &who))
    {
        signup.cancel();
        canceled = true;
    }
    if canceled {
        debug!(event = %event.name, participant = %who, "signup withdrawn");
    }
    canceled
}

/// Drop every signup, canceled ones included. Returns how many were removed.
pub fn clear_signups(event: &mut Event) -> usize {
    let removed = event.signups.len();
    event.signups.clear();
    debug!(event = %event.name, removed, "signups cleared");
    removed
}

/// Outcome of one participant within a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry<T> {
    pub participant: String,
    pub result: ModelResult<T>,
}

/// Sign several participants up for one role.
///
/// Each participant is processed independently in order; a failure for one
/// leaves the event as the previous successful steps left it.
pub fn signup_many<S: AsRef<str>>(
    event: &mut Event,
    participants: &[S],
    role: &str,
) -> Vec<BatchEntry<SignupOutcome>> {
    participants
        .iter()
        .map(|p| BatchEntry {
            participant: normalize_participant(p.as_ref()),
            result: signup(event, p.as_ref(), role),
        })
        .collect()
}

/// Withdraw several participants. Each entry reports whether a signup was canceled.
pub fn withdraw_many<S: AsRef<str>>(event: &mut Event, participants: &[S]) -> Vec<BatchEntry<bool>> {
    participants
        .iter()
        .map(|p| BatchEntry {
            participant: normalize_participant(p.as_ref()),
            result: Ok(withdraw(event, p.as_ref())),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
//  Read-time classification
// ═══════════════════════════════════════════════════════════════════════

/// Current placement of the participant's active signup, if any.
pub fn placement_of(event: &Event, participant: &str) -> Option<Placement> {
    let who = normalize_participant(participant);
    let signup = event.active_signup_for(&who)?;
    let capacity = event.role(&signup.role).map_or(0, |slot| slot.capacity);
    let position = position_in_role(event, &signup.role, &who)?;
    Some(Placement::at(position, capacity))
}

/// Main/overflow split for one role, or `None` if the event has no such role.
pub fn role_roster<'a>(event: &'a Event, role: &str) -> Option<RoleRoster<'a>> {
    event.role(role).map(|slot| split_role(event, slot))
}

/// Main/overflow split for every role, in display order.
pub fn roster(event: &Event) -> Vec<RoleRoster<'_>> {
    event
        .ordered_roles()
        .into_iter()
        .map(|slot| split_role(event, slot))
        .collect()
}

fn split_role<'a>(event: &'a Event, slot: &'a RoleSlot) -> RoleRoster<'a> {
    let mut main = Vec::new();
    let mut overflow = Vec::new();
    for (position, signup) in event.active_signups_for_role(&slot.name).enumerate() {
        match Placement::at(position, slot.capacity) {
            Placement::Main => main.push(signup.participant.as_str()),
            Placement::Overflow => overflow.push(signup.participant.as_str()),
        }
    }
    RoleRoster {
        slot,
        main,
        overflow,
    }
}

/// Zero-based position of the participant among the role's active signups.
fn position_in_role(event: &Event, role: &str, who: &str) -> Option<usize> {
    event
        .active_signups_for_role(role)
        .position(|s| same_participant(&s.participant, who))
}

// ── tests ────────────────────────────────────────────────────────────
