//! Online/offline status derived from the recency of a user's last event.
//!
//! There is no background sweep: status is evaluated against the query time,
//! so a user drifts offline without any write happening.

use chrono::{DateTime, Duration, Utc};

use crate::types::ValidationError;

/// How recent the last event must be for a user to count as online.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlineWindow(Duration);

impl OnlineWindow {
    /// Default window of two minutes.
    pub const DEFAULT_SECS: u64 = 120;

    /// Creates a window of the given length.
    pub fn from_secs(secs: u64) -> Result<Self, ValidationError> {
        if secs == 0 {
            return Err(ValidationError::OutOfRange {
                field: "online_window_secs",
                reason: "must be positive".to_string(),
            });
        }
        let secs = i64::try_from(secs).map_err(|_| ValidationError::OutOfRange {
            field: "online_window_secs",
            reason: format!("{secs} is too large"),
        })?;
        Ok(Self(Duration::seconds(secs)))
    }

    /// Window length.
    pub const fn duration(self) -> Duration {
        self.0
    }

    /// Whether a user last seen at `last_seen` is online at `now`.
    ///
    /// A `last_seen` in the future (client clock ahead) counts as online.
    pub fn is_online(self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_seen) < self.0
    }
}

impl Default for OnlineWindow {
    fn default() -> Self {
        Self(Duration::seconds(120))
    }
}
