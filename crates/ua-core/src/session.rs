//! Session intervals built from paired start/end events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Started, no matching end yet.
    Open,
    /// Paired with a `session_end`; its duration counts toward usage.
    Closed,
    /// Replaced by a newer start before it was ended; contributes zero minutes.
    Abandoned,
}

impl SessionStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// A usage interval for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_minutes: Option<i64>,
    pub platform: String,
    pub status: SessionStatus,
}

/// Whole minutes between `start` and `end`, floored, never negative.
///
/// Clock skew that puts `end` before `start` yields zero.
pub fn session_duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let elapsed_ms = end.signed_duration_since(start).num_milliseconds();
    (elapsed_ms / 60_000).max(0)
}
