//! Event kind enum as the single source of truth for event kind strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::ValidationError;

/// Interaction kinds too noisy to be worth ranking on the dashboard.
pub const LOW_SIGNAL_KINDS: [&str; 3] = ["click_button", "button_click", "click"];

/// Kinds reported by clients.
///
/// Lifecycle kinds drive the session ledger; everything else is an
/// interaction carrying its own name (`view_build`, `search`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    Ping,
    Error,
    Action(String),
}

impl EventKind {
    /// The stored name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::Ping => "ping",
            Self::Error => "error",
            Self::Action(name) => name,
        }
    }

    /// Whether events of this kind are ranked in the action histogram.
    pub fn is_ranked(&self) -> bool {
        match self {
            Self::Action(name) => !LOW_SIGNAL_KINDS.contains(&name.as_str()),
            Self::Error => true,
            Self::SessionStart | Self::SessionEnd | Self::Ping => false,
        }
    }

    /// Kinds that never appear in the action histogram.
    pub fn unranked_kinds() -> impl Iterator<Item = &'static str> {
        ["session_start", "session_end", "ping"]
            .into_iter()
            .chain(LOW_SIGNAL_KINDS)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(ValidationError::Empty { field: "action" }),
            "session_start" => Ok(Self::SessionStart),
            "session_end" => Ok(Self::SessionEnd),
            "ping" | "heartbeat" => Ok(Self::Ping),
            "error" => Ok(Self::Error),
            other => Ok(Self::Action(other.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
