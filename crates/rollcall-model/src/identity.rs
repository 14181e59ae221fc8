//! Participant identity normalization.
//!
//! Participants are stored as plain strings, usually a chat-platform mention
//! token such as `<@1234>`. Older clients emitted the nickname form `<@!1234>`
//! for the same user. Both spellings must compare equal, and only the
//! canonical one may ever be written, otherwise the same person can hold two
//! active signups in one event.

/// Rewrite a participant identifier to its canonical form.
///
/// Surrounding whitespace is trimmed and `<@!DIGITS>` becomes `<@DIGITS>`.
/// Any other text is returned unchanged.
pub fn normalize_participant(raw: &str) -> String {
    let trimmed = raw.trim();
    match legacy_mention_id(trimmed) {
        Some(id) => format!("<@{id}>"),
        None => trimmed.to_string(),
    }
}

/// Compare two participant identifiers after normalization.
pub fn same_participant(a: &str, b: &str) -> bool {
    normalize_participant(a) == normalize_participant(b)
}

/// Extract the numeric id from a `<@!DIGITS>` mention.
fn legacy_mention_id(text: &str) -> Option<&str> {
    let id = text.strip_prefix("<@!")?.strip_suffix('>')?;
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Some(id)
    } else {
        None
    }
}

// ── tests ────────────────────────────────────────────────────────────
