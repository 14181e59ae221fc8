//! Per-tenant settings and their validation.
//!
//! Settings are read and written by name through [`Settings::get_setting`]
//! and [`Settings::set_setting`]. Names are matched case-insensitively
//! against the fixed set in [`SettingName`]. Every value is stored as text;
//! boolean settings are always stored as the literal `"true"` or `"false"`.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::encoding::Versioned;
use crate::error::{ModelError, ModelResult};

const TRUE: &str = "true";
const FALSE: &str = "false";

/// Spellings accepted as `true`, compared after trimming and lowercasing.
const TRUTHY: &[&str] = &["yes", "true", "ok", "1", "+", "t", "on"];

/// Spellings accepted as `false`, compared after trimming and lowercasing.
const FALSY: &[&str] = &["", "no", "false", "not ok", "0", "-", "f", "off"];

/// Parse one of the accepted boolean spellings.
pub fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim().to_lowercase();
    if TRUTHY.contains(&text.as_str()) {
        Some(true)
    } else if FALSY.contains(&text.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn bool_text(value: bool) -> &'static str {
    if value { TRUE } else { FALSE }
}

// ═══════════════════════════════════════════════════════════════════════
//  Setting names
// ═══════════════════════════════════════════════════════════════════════

/// How a setting's value is validated and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// Free text, trimmed.
    Text,
    /// Channel name; a leading `#` is stripped.
    Channel,
    /// Boolean stored as `"true"` / `"false"`.
    Flag,
    /// Comma-joined list of admin role identifiers.
    RoleList,
}

/// The fixed set of setting names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingName {
    CommandPrefix,
    AdminChannel,
    AnnounceChannel,
    SignupChannel,
    AnnounceTo,
    ShowAfterSignup,
    ShowAfterWithdraw,
    HideReactionsAnnounce,
    HideReactionsShow,
    AdminRoles,
    EmbedColor,
    ErrorColor,
}

impl SettingName {
    /// Every setting, in help-listing order.
    pub const ALL: [SettingName; 12] = [
        Self::CommandPrefix,
        Self::AdminChannel,
        Self::AnnounceChannel,
        Self::SignupChannel,
        Self::AnnounceTo,
        Self::ShowAfterSignup,
        Self::ShowAfterWithdraw,
        Self::HideReactionsAnnounce,
        Self::HideReactionsShow,
        Self::AdminRoles,
        Self::EmbedColor,
        Self::ErrorColor,
    ];

    /// Lowercase name used for lookup.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandPrefix => "commandprefix",
            Self::AdminChannel => "adminchannel",
            Self::AnnounceChannel => "announcechannel",
            Self::SignupChannel => "signupchannel",
            Self::AnnounceTo => "announceto",
            Self::ShowAfterSignup => "showaftersignup",
            Self::ShowAfterWithdraw => "showafterwithdraw",
            Self::HideReactionsAnnounce => "hidereactionsannounce",
            Self::HideReactionsShow => "hidereactionsshow",
            Self::AdminRoles => "adminroles",
            Self::EmbedColor => "embedcolor",
            Self::ErrorColor => "errorcolor",
        }
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            Self::CommandPrefix | Self::AnnounceTo | Self::EmbedColor | Self::ErrorColor => {
                SettingKind::Text
            }
            Self::AdminChannel | Self::AnnounceChannel | Self::SignupChannel => {
                SettingKind::Channel
            }
            Self::ShowAfterSignup
            | Self::ShowAfterWithdraw
            | Self::HideReactionsAnnounce
            | Self::HideReactionsShow => SettingKind::Flag,
            Self::AdminRoles => SettingKind::RoleList,
        }
    }
}

impl fmt::Display for SettingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| ModelError::UnknownSetting {
                name: s.trim().to_string(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Settings document
// ═══════════════════════════════════════════════════════════════════════

/// Per-tenant settings document.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Settings {
    #[prost(string, tag = "1")]
    pub command_prefix: String,
    #[prost(string, tag = "2")]
    pub admin_channel: String,
    #[prost(string, tag = "3")]
    pub announce_channel: String,
    #[prost(string, tag = "4")]
    pub signup_channel: String,
    /// Who gets notified on announcements, e.g. `here` or a role mention.
    #[prost(string, tag = "5")]
    pub announce_to: String,
    #[prost(string, tag = "6")]
    pub show_after_signup: String,
    #[prost(string, tag = "7")]
    pub show_after_withdraw: String,
    #[prost(string, tag = "8")]
    pub hide_reactions_announce: String,
    #[prost(string, tag = "9")]
    pub hide_reactions_show: String,
    /// Role identifiers allowed to run admin commands; unique.
    #[prost(string, repeated, tag = "10")]
    pub admin_roles: Vec<String>,
    #[prost(string, tag = "11")]
    pub embed_color: String,
    #[prost(string, tag = "12")]
    pub error_color: String,
}

impl Versioned for Settings {
    /// Normalize boolean spellings written by older builds.
    fn upgrade(&mut self) -> bool {
        let defaults = Settings::with_defaults();
        let mut changed = false;
        for name in SettingName::ALL {
            if name.kind() != SettingKind::Flag {
                continue;
            }
            let stored = self.text(name).to_string();
            let normalized = match parse_bool(&stored) {
                Some(value) => bool_text(value).to_string(),
                None => {
                    warn!(setting = %name, value = %stored, "unreadable stored flag, using default");
                    defaults.text(name).to_string()
                }
            };
            if normalized != stored {
                self.store(name, normalized);
                changed = true;
            }
        }
        changed
    }
}

impl Settings {
    /// Settings for a tenant that has never changed anything.
    pub fn with_defaults() -> Self {
        Self {
            command_prefix: "!".into(),
            admin_channel: String::new(),
            announce_channel: String::new(),
            signup_channel: String::new(),
            announce_to: "here".into(),
            show_after_signup: TRUE.into(),
            show_after_withdraw: TRUE.into(),
            hide_reactions_announce: FALSE.into(),
            hide_reactions_show: FALSE.into(),
            admin_roles: Vec::new(),
            embed_color: "0x00cc00".into(),
            error_color: "0xcc0000".into(),
        }
    }

    /// Restore every setting to its default.
    pub fn reset(&mut self) {
        *self = Self::with_defaults();
    }

    /// Read a setting by name.
    ///
    /// The admin role list is returned comma-joined.
    pub fn get_setting(&self, name: &str) -> ModelResult<String> {
        let name: SettingName = name.parse()?;
        Ok(match name.kind() {
            SettingKind::RoleList => self.admin_roles.join(","),
            _ => self.text(name).to_string(),
        })
    }

    /// Validate and store a setting by name.
    ///
    /// On error the previous value is left untouched.
    pub fn set_setting(&mut self, name: &str, value: &str) -> ModelResult<()> {
        let name: SettingName = name.parse()?;
        let normalized = match name.kind() {
            SettingKind::Text => value.trim().to_string(),
            SettingKind::Channel => {
                let trimmed = value.trim();
                trimmed.strip_prefix('#').unwrap_or(trimmed).to_string()
            }
            SettingKind::Flag => {
                let parsed = parse_bool(value).ok_or_else(|| ModelError::InvalidSettingValue {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "expected a yes/no value".into(),
                })?;
                bool_text(parsed).to_string()
            }
            SettingKind::RoleList => value.to_string(),
        };
        self.store(name, normalized);
        Ok(())
    }

    /// Whether `role` is one of the configured admin roles.
    pub fn is_admin_role(&self, role: &str) -> bool {
        self.admin_roles.iter().any(|r| r == role.trim())
    }

    pub fn show_after_signup(&self) -> bool {
        self.show_after_signup == TRUE
    }

    pub fn show_after_withdraw(&self) -> bool {
        self.show_after_withdraw == TRUE
    }

    pub fn hide_reactions_announce(&self) -> bool {
        self.hide_reactions_announce == TRUE
    }

    pub fn hide_reactions_show(&self) -> bool {
        self.hide_reactions_show == TRUE
    }

    // ── field access by name ─────────────────────────────────────────

    fn text(&self, name: SettingName) -> &str {
        match name {
            SettingName::CommandPrefix => &self.command_prefix,
            SettingName::AdminChannel => &self.admin_channel,
            SettingName::AnnounceChannel => &self.announce_channel,
            SettingName::SignupChannel => &self.signup_channel,
            SettingName::AnnounceTo => &self.announce_to,
            SettingName::ShowAfterSignup => &self.show_after_signup,
            SettingName::ShowAfterWithdraw => &self.show_after_withdraw,
            SettingName::HideReactionsAnnounce => &self.hide_reactions_announce,
            SettingName::HideReactionsShow => &self.hide_reactions_show,
            SettingName::EmbedColor => &self.embed_color,
            SettingName::ErrorColor => &self.error_color,
            SettingName::AdminRoles => "",
        }
    }

    fn store(&mut self, name: SettingName, value: String) {
        match name {
            SettingName::CommandPrefix => self.command_prefix = value,
            SettingName::AdminChannel => self.admin_channel = value,
            SettingName::AnnounceChannel => self.announce_channel = value,
            SettingName::SignupChannel => self.signup_channel = value,
            SettingName::AnnounceTo => self.announce_to = value,
            SettingName::ShowAfterSignup => self.show_after_signup = value,
            SettingName::ShowAfterWithdraw => self.show_after_withdraw = value,
            SettingName::HideReactionsAnnounce => self.hide_reactions_announce = value,
            SettingName::HideReactionsShow => self.hide_reactions_show = value,
            SettingName::AdminRoles => self.admin_roles = split_roles(&value),
            SettingName::EmbedColor => self.embed_color = value,
            SettingName::ErrorColor => self.error_color = value,
        }
    }
}

/// Split a comma-joined role list, trimming entries and dropping blanks and repeats.
fn split_roles(value: &str) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    for role in value.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }
    roles
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};

    #[test]
    fn every_truthy_spelling_parses() {
        for text in ["yes", "TRUE", "ok", "1", "+", "t", " On "] {
            assert_eq!(parse_bool(text), Some(true), "{text}");
        }
    }

    #[test]
    fn every_falsy_spelling_parses() {
        for text in ["", "no", "False", "not ok", "0", "-", "f", "OFF"] {
            assert_eq!(parse_bool(text), Some(false), "{text}");
        }
    }

    #[test]
    fn other_spellings_do_not_parse() {
        for text in ["maybe", "2", "yes please", "nope"] {
            assert_eq!(parse_bool(text), None, "{text}");
        }
    }

    #[test]
    fn setting_names_are_case_insensitive() {
        assert_eq!(
            "ShowAfterSignup".parse::<SettingName>().unwrap(),
            SettingName::ShowAfterSignup
        );
        assert_eq!(" ADMINROLES ".parse::<SettingName>().unwrap(), SettingName::AdminRoles);
    }

    #[test]
    fn every_name_parses_back() {
        for name in SettingName::ALL {
            assert_eq!(name.as_str().parse::<SettingName>().unwrap(), name);
        }
    }

    #[test]
    fn unknown_setting_is_rejected() {
        let mut settings = Settings::with_defaults();
        let err = settings.set_setting("colour", "red").unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownSetting {
                name: "colour".into()
            }
        );
        assert!(settings.get_setting("colour").is_err());
    }

    #[test]
    fn yes_normalizes_to_true() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("showaftersignup", "no").unwrap();
        settings.set_setting("showaftersignup", "yes").unwrap();
        assert_eq!(settings.show_after_signup, "true");
        assert_eq!(settings.get_setting("showaftersignup").unwrap(), "true");
    }

    #[test]
    fn invalid_flag_keeps_previous_value() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("showaftersignup", "off").unwrap();

        let err = settings.set_setting("showaftersignup", "maybe").unwrap_err();
        assert!(matches!(err, ModelError::InvalidSettingValue { .. }));
        assert_eq!(settings.show_after_signup, "false");
    }

    #[test]
    fn channel_settings_strip_hash() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("signupchannel", "#raid-signups").unwrap();
        settings.set_setting("AnnounceChannel", " announcements ").unwrap();
        assert_eq!(settings.signup_channel, "raid-signups");
        assert_eq!(settings.announce_channel, "announcements");
    }

    #[test]
    fn admin_roles_round_trip_joined() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("adminroles", "officer, raid lead,officer,,gm").unwrap();
        assert_eq!(settings.admin_roles, vec!["officer", "raid lead", "gm"]);
        assert_eq!(settings.get_setting("adminroles").unwrap(), "officer,raid lead,gm");

        settings.set_setting("adminroles", "").unwrap();
        assert!(settings.admin_roles.is_empty());
        assert_eq!(settings.get_setting("adminroles").unwrap(), "");
    }

    #[test]
    fn is_admin_role_matches_exactly() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("adminroles", "Officer").unwrap();
        assert!(settings.is_admin_role("Officer"));
        assert!(!settings.is_admin_role("officer"));
    }

    #[test]
    fn text_settings_are_trimmed() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("commandprefix", " ? ").unwrap();
        settings.set_setting("errorcolor", "0xff0000").unwrap();
        assert_eq!(settings.get_setting("commandprefix").unwrap(), "?");
        assert_eq!(settings.get_setting("errorcolor").unwrap(), "0xff0000");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut settings = Settings::with_defaults();
        settings.set_setting("commandprefix", "?").unwrap();
        settings.set_setting("hidereactionsshow", "on").unwrap();
        settings.reset();
        assert_eq!(settings, Settings::with_defaults());
    }

    #[test]
    fn typed_flag_accessors() {
        let mut settings = Settings::with_defaults();
        assert!(settings.show_after_signup());
        assert!(!settings.hide_reactions_announce());
        settings.set_setting("hidereactionsannounce", "+").unwrap();
        assert!(settings.hide_reactions_announce());
    }

    #[test]
    fn legacy_flag_spellings_normalize_on_decode() {
        let mut legacy = Settings::with_defaults();
        legacy.show_after_signup = "yes".into();
        legacy.show_after_withdraw = "garbage".into();
        legacy.hide_reactions_show = String::new();

        let decoded: Settings = decode(&encode(&legacy)).unwrap();
        assert_eq!(decoded.show_after_signup, "true");
        assert_eq!(decoded.show_after_withdraw, "true");
        assert_eq!(decoded.hide_reactions_show, "false");
    }
}
