//! Per-user metadata built up from event traffic.

use serde::{Deserialize, Serialize};

/// Fallback shown when a user's name has never been resolved.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Name details supplied by the user directory.
///
/// Either field may be absent; a present value overwrites what the profile
/// held, an absent one leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHint {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

impl ProfileHint {
    /// Drops blank values and a leading `@` on the handle.
    #[must_use]
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            display_name: clean(self.display_name),
            handle: clean(self.handle.map(|h| h.trim().trim_start_matches('@').to_string())),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.handle.is_none()
    }
}

/// A row of the profile registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub platform: String,
    pub first_seen: String,
    pub last_seen: String,
    pub last_action: String,
    pub total_actions: i64,
}

impl Profile {
    /// `Name (@handle)`, falling back to [`DEFAULT_DISPLAY_NAME`].
    pub fn label(&self) -> String {
        label(self.display_name.as_deref(), self.handle.as_deref())
    }
}

/// `Name (@handle)` from optional parts.
pub fn label(display_name: Option<&str>, handle: Option<&str>) -> String {
    let name = display_name
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME);
    match handle.filter(|handle| !handle.is_empty()) {
        Some(handle) => format!("{name} (@{handle})"),
        None => name.to_string(),
    }
}

/// A recipient entry for the broadcast picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceMember {
    pub id: String,
    pub name: String,
    pub handle: Option<String>,
}

impl From<&Profile> for AudienceMember {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.user_id.clone(),
            name: profile.label(),
            handle: profile.handle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_normalization_drops_blanks() {
        let hint = ProfileHint {
            display_name: Some("  ".to_string()),
            handle: Some(" @sniper ".to_string()),
        }
        .normalized();
        assert_eq!(hint.display_name, None);
        assert_eq!(hint.handle.as_deref(), Some("sniper"));
        assert!(!hint.is_empty());
        assert!(ProfileHint::default().normalized().is_empty());
    }

    #[test]
    fn label_combines_name_and_handle() {
        assert_eq!(label(Some("Alex"), Some("alex")), "Alex (@alex)");
        assert_eq!(label(None, Some("alex")), "User (@alex)");
        assert_eq!(label(Some("Alex"), None), "Alex");
        assert_eq!(label(Some(""), Some("")), "User");
    }
}
