//! Display formatting for the dashboard.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeZone, Utc};

use crate::event::parse_client_timestamp;
use crate::types::ValidationError;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;
const DISPLAY_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Renders a usage total.
///
/// `59` → `59m`, `125` → `2h5m`, `1500` → `1d1h`. Minutes are dropped once the
/// total reaches a day; zero components are omitted.
pub fn format_duration(total_minutes: i64) -> String {
    let total_minutes = total_minutes.max(0);
    if total_minutes < MINUTES_PER_HOUR {
        return format!("{total_minutes}m");
    }
    if total_minutes < MINUTES_PER_DAY {
        let hours = total_minutes / MINUTES_PER_HOUR;
        let minutes = total_minutes % MINUTES_PER_HOUR;
        return if minutes == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h{minutes}m")
        };
    }
    let days = total_minutes / MINUTES_PER_DAY;
    let hours = (total_minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    if hours == 0 {
        format!("{days}d")
    } else {
        format!("{days}d{hours}h")
    }
}

/// Fixed offset used for every human-facing timestamp.
///
/// Storage and arithmetic stay in UTC; this is applied only when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOffset(FixedOffset);

impl DisplayOffset {
    /// Default offset, UTC+3.
    pub const DEFAULT_MINUTES: i32 = 180;

    /// Creates an offset east of UTC.
    pub fn from_minutes(minutes: i32) -> Result<Self, ValidationError> {
        Some(minutes)
            .filter(|minutes| minutes.abs() <= 18 * 60)
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
            .map(Self)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "display_offset_minutes",
                reason: format!("{minutes} is outside -1080..=1080"),
            })
    }

    /// Renders a UTC instant as `dd.mm.YYYY HH:MM:SS` local time.
    pub fn render(self, timestamp: DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.0)
            .format(DISPLAY_FORMAT)
            .to_string()
    }

    /// Renders a stored timestamp string.
    ///
    /// Missing values render as `-`; unparsable ones are shown unchanged.
    pub fn humanize(self, stored: Option<&str>) -> String {
        match stored.map(str::trim) {
            None | Some("") => "-".to_string(),
            Some(raw) => parse_client_timestamp(raw)
                .map_or_else(|_| raw.to_string(), |parsed| self.render(parsed)),
        }
    }

    /// Local midnight of the day containing `now`, as a UTC instant.
    pub fn start_of_day(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_midnight = now
            .with_timezone(&self.0)
            .date_naive()
            .and_time(NaiveTime::MIN);
        self.0
            .from_local_datetime(&local_midnight)
            .single()
            .map_or(now, |midnight| midnight.with_timezone(&Utc))
    }
}

impl Default for DisplayOffset {
    fn default() -> Self {
        Self(FixedOffset::east_opt(Self::DEFAULT_MINUTES * 60).unwrap_or_else(|| Utc.fix()))
    }
}

/// Human-readable text for an event kind.
pub fn action_label(kind: &str) -> String {
    let label = match kind {
        "view_build" => "Build views",
        "search" => "Searches",
        "open_screen" => "Screen opens",
        "switch_category" => "Category switches",
        "click_button" => "Clicks",
        "session_start" => "Opened the app",
        "session_end" => "Closed the app",
        "ping" => "Still active",
        "error" => "Errors",
        other => return other.to_string(),
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn duration_formatting_parity() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(59), "59m");
        assert_eq!(format_duration(60), "1h");
        assert_eq!(format_duration(125), "2h5m");
        assert_eq!(format_duration(1439), "23h59m");
        assert_eq!(format_duration(1440), "1d");
        assert_eq!(format_duration(1500), "1d1h");
        assert_eq!(format_duration(1441), "1d");
        assert_eq!(format_duration(3 * 1440 + 5 * 60 + 7), "3d5h");
    }

    #[test]
    fn negative_duration_renders_as_zero() {
        assert_eq!(format_duration(-5), "0m");
    }

    #[test]
    fn humanize_converts_to_display_offset() {
        let offset = DisplayOffset::default();
        insta::assert_snapshot!(
            offset.humanize(Some("2025-03-01T22:30:05.000Z")),
            @"02.03.2025 01:30:05"
        );
    }

    #[test]
    fn humanize_handles_missing_and_garbage() {
        let offset = DisplayOffset::default();
        assert_eq!(offset.humanize(None), "-");
        assert_eq!(offset.humanize(Some("")), "-");
        assert_eq!(offset.humanize(Some("not a time")), "not a time");
    }

    #[test]
    fn start_of_day_uses_display_offset() {
        let offset = DisplayOffset::default();
        // 22:30 UTC is already the next day at UTC+3.
        assert_eq!(
            offset.start_of_day(at("2025-03-01T22:30:00Z")),
            at("2025-03-01T21:00:00Z")
        );
        assert_eq!(
            offset.start_of_day(at("2025-03-01T20:59:59Z")),
            at("2025-02-28T21:00:00Z")
        );

        let utc = DisplayOffset::from_minutes(0).unwrap();
        assert_eq!(
            utc.start_of_day(at("2025-03-01T22:30:00Z")),
            at("2025-03-01T00:00:00Z")
        );
    }

    #[test]
    fn offset_range_is_validated() {
        assert!(DisplayOffset::from_minutes(-300).is_ok());
        assert!(DisplayOffset::from_minutes(24 * 60).is_err());
    }

    #[test]
    fn action_labels_fall_back_to_kind() {
        assert_eq!(action_label("search"), "Searches");
        assert_eq!(action_label("share_build"), "share_build");
    }
}
