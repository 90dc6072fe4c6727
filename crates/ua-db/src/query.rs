//! Read paths and the destructive clear.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use ua_core::dashboard::{KindCount, ProfileUsage, RecentEvent, StoreCounts};
use ua_core::{
    AudienceMember, DashboardSnapshot, ErrorEntry, EventKind, Profile, Session, SessionStatus,
    format_timestamp,
};

use crate::{Database, DbError};

/// A user's accumulated closed-session time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageTotal {
    pub user_id: String,
    pub total_minutes: i64,
    pub last_updated: String,
}

/// Rows removed by [`Database::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStats {
    pub events: usize,
    pub profiles: usize,
    pub errors: usize,
}

const PROFILE_COLUMNS: &str =
    "user_id, display_name, handle, platform, first_seen, last_seen, last_action, total_actions";

impl Database {
    /// Looks up one profile.
    pub fn profile(&self, user_id: &str) -> Result<Option<Profile>, DbError> {
        let profile = self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?"),
                params![user_id],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Looks up one usage total.
    pub fn usage_total(&self, user_id: &str) -> Result<Option<UsageTotal>, DbError> {
        let total = self
            .conn
            .query_row(
                "SELECT user_id, total_minutes, last_updated FROM usage_totals WHERE user_id = ?",
                params![user_id],
                |row| {
                    Ok(UsageTotal {
                        user_id: row.get(0)?,
                        total_minutes: row.get(1)?,
                        last_updated: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(total)
    }

    /// Lists a user's sessions, newest start first.
    pub fn user_sessions(&self, user_id: &str) -> Result<Vec<Session>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, start_time, end_time, duration_minutes, platform, status
            FROM sessions
            WHERE user_id = ?
            ORDER BY start_time DESC, id DESC
            ",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let status: String = row.get(6)?;
            Ok((
                Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    start_time: row.get(2)?,
                    end_time: row.get(3)?,
                    duration_minutes: row.get(4)?,
                    platform: row.get(5)?,
                    status: SessionStatus::Open,
                },
                status,
            ))
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            let (mut session, status) = row?;
            session.status = status.parse().unwrap_or_else(|_| {
                tracing::warn!(session_id = session.id, status, "unknown session status");
                SessionStatus::Open
            });
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// The newest events, joined with their author's profile.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<RecentEvent>, DbError> {
        read_recent_events(&self.conn, limit)
    }

    /// The newest error log rows.
    pub fn recent_errors(&self, limit: usize) -> Result<Vec<ErrorEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, source, message, details, recorded_at
            FROM error_log
            ORDER BY id DESC
            LIMIT ?
            ",
        )?;
        let rows = stmt.query_map(params![sql_limit(limit)], |row| {
            Ok(ErrorEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                source: row.get(2)?,
                message: row.get(3)?,
                details: row.get(4)?,
                recorded_at: row.get(5)?,
            })
        })?;
        let mut errors = Vec::new();
        for row in rows {
            errors.push(row?);
        }
        Ok(errors)
    }

    /// Every reachable user, most recently seen first.
    pub fn broadcast_audience(
        &self,
        placeholder_ids: &[String],
    ) -> Result<Vec<AudienceMember>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY last_seen DESC, user_id ASC"
        ))?;
        let rows = stmt.query_map([], profile_from_row)?;
        let mut audience = Vec::new();
        for row in rows {
            let profile = row?;
            if placeholder_ids
                .iter()
                .any(|placeholder| placeholder.eq_ignore_ascii_case(&profile.user_id))
            {
                continue;
            }
            audience.push(AudienceMember::from(&profile));
        }
        Ok(audience)
    }

    /// Reads everything the dashboard shows in one consistent snapshot.
    ///
    /// `day_start` bounds the "today" counters.
    pub fn dashboard_snapshot(
        &self,
        day_start: DateTime<Utc>,
        popular_limit: usize,
        recent_limit: usize,
    ) -> Result<DashboardSnapshot, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let since = format_timestamp(day_start);

        let count = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<i64, DbError> {
            Ok(tx.query_row(sql, args, |row| row.get(0))?)
        };
        let counts = StoreCounts {
            profiles: count("SELECT COUNT(*) FROM profiles", &[])?,
            events: count("SELECT COUNT(*) FROM events", &[])?,
            error_events: count(
                "SELECT COUNT(*) FROM events WHERE kind = ?",
                &[&EventKind::Error.as_str()],
            )?,
            events_today: count(
                "SELECT COUNT(*) FROM events WHERE COALESCE(occurred_at, received_at) >= ?",
                &[&since],
            )?,
            profiles_today: count(
                "SELECT COUNT(*) FROM profiles WHERE first_seen >= ?",
                &[&since],
            )?,
        };

        let popular = read_popular_kinds(&tx, popular_limit)?;
        let profiles = read_profile_usage(&tx)?;
        let recent = read_recent_events(&tx, recent_limit)?;
        tx.commit()?;

        Ok(DashboardSnapshot {
            counts,
            popular,
            profiles,
            recent,
        })
    }

    /// Truncates the event log, the profile registry and the error log.
    ///
    /// Sessions and usage totals are left in place.
    pub fn clear(&mut self) -> Result<ClearStats, DbError> {
        let tx = self.conn.transaction()?;
        let stats = ClearStats {
            events: tx.execute("DELETE FROM events", [])?,
            profiles: tx.execute("DELETE FROM profiles", [])?,
            errors: tx.execute("DELETE FROM error_log", [])?,
        };
        tx.commit()?;
        tracing::warn!(?stats, "cleared analytics stores");
        Ok(stats)
    }
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        handle: row.get(2)?,
        platform: row.get(3)?,
        first_seen: row.get(4)?,
        last_seen: row.get(5)?,
        last_action: row.get(6)?,
        total_actions: row.get(7)?,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn read_popular_kinds(conn: &Connection, limit: usize) -> Result<Vec<KindCount>, DbError> {
    let mut values: Vec<SqlValue> = EventKind::unranked_kinds()
        .map(|kind| SqlValue::Text(kind.to_string()))
        .collect();
    let placeholders = vec!["?"; values.len()].join(", ");
    values.push(SqlValue::Integer(sql_limit(limit)));

    let mut stmt = conn.prepare(&format!(
        "
        SELECT kind, COUNT(*) AS uses
        FROM events
        WHERE kind NOT IN ({placeholders})
        GROUP BY kind
        ORDER BY uses DESC, kind ASC
        LIMIT ?
        "
    ))?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(KindCount {
            kind: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    let mut kinds = Vec::new();
    for row in rows {
        kinds.push(row?);
    }
    Ok(kinds)
}

fn read_profile_usage(conn: &Connection) -> Result<Vec<ProfileUsage>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT p.user_id, p.display_name, p.handle, p.platform, p.first_seen, p.last_seen,
               p.last_action, p.total_actions, COALESCE(u.total_minutes, 0)
        FROM profiles p
        LEFT JOIN usage_totals u ON u.user_id = p.user_id
        ORDER BY p.last_seen DESC, p.user_id ASC
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ProfileUsage {
            profile: profile_from_row(row)?,
            total_minutes: row.get(8)?,
        })
    })?;
    let mut profiles = Vec::new();
    for row in rows {
        profiles.push(row?);
    }
    Ok(profiles)
}

struct RecentEventRow {
    id: i64,
    user_id: String,
    kind: String,
    payload: String,
    timestamp: Option<String>,
    display_name: Option<String>,
    handle: Option<String>,
}

fn read_recent_events(conn: &Connection, limit: usize) -> Result<Vec<RecentEvent>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT e.id, e.user_id, e.kind, e.payload,
               COALESCE(e.occurred_at, e.client_timestamp, e.received_at),
               p.display_name, p.handle
        FROM events e
        LEFT JOIN profiles p ON p.user_id = e.user_id
        ORDER BY e.id DESC
        LIMIT ?
        ",
    )?;
    let rows = stmt.query_map(params![sql_limit(limit)], |row| {
        Ok(RecentEventRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            payload: row.get(3)?,
            timestamp: row.get(4)?,
            display_name: row.get(5)?,
            handle: row.get(6)?,
        })
    })?;
    let mut events = Vec::new();
    for row in rows {
        let row = row?;
        let payload =
            serde_json::from_str(&row.payload).map_err(|err| DbError::InvalidPayload {
                event_id: row.id,
                message: err.to_string(),
            })?;
        events.push(RecentEvent {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            payload,
            timestamp: row.timestamp,
            display_name: row.display_name,
            handle: row.handle,
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use serde_json::json;
    use ua_core::{
        Admission, DashboardOptions, Event, IngestRequest, OpenSessionPolicy, ProfileHint, compose,
    };

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(user_id: &str, action: &str, at: DateTime<Utc>) -> Event {
        let request: IngestRequest = serde_json::from_value(json!({
            "user_id": user_id,
            "action": action,
            "details": {"platform": "android"},
            "timestamp": format_timestamp(at),
        }))
        .unwrap();
        match request.validate(&[], at).unwrap() {
            Admission::Accepted(event) => event,
            Admission::Placeholder(_) => unreachable!(),
        }
    }

    fn ingest_all(db: &mut Database, events: &[Event]) {
        for event in events {
            db.ingest(event, None, OpenSessionPolicy::Supersede)
                .expect("ingest");
        }
    }

    #[test]
    fn popular_kinds_exclude_lifecycle_and_clicks() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        ingest_all(
            &mut db,
            &[
                event("1", "session_start", t0()),
                event("1", "search", t0()),
                event("1", "view_build", t0()),
                event("2", "view_build", t0()),
                event("2", "click_button", t0()),
                event("2", "ping", t0()),
                event("2", "error", t0()),
                event("1", "session_end", t0()),
            ],
        );

        let kinds = read_popular_kinds(&db.conn, 10).expect("popular");
        let kinds: Vec<(&str, i64)> = kinds.iter().map(|k| (k.kind.as_str(), k.count)).collect();
        assert_eq!(kinds, vec![("view_build", 2), ("error", 1), ("search", 1)]);

        let top = read_popular_kinds(&db.conn, 1).expect("popular");
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn snapshot_counts_today_from_day_start() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let yesterday = t0() - Duration::days(1);
        ingest_all(
            &mut db,
            &[
                event("old", "search", yesterday),
                event("old", "search", t0()),
                event("new", "search", t0()),
                event("new", "error", t0()),
            ],
        );

        let day_start = t0() - Duration::hours(1);
        let snapshot = db.dashboard_snapshot(day_start, 10, 30).expect("snapshot");

        assert_eq!(snapshot.counts.profiles, 2);
        assert_eq!(snapshot.counts.events, 4);
        assert_eq!(snapshot.counts.error_events, 1);
        assert_eq!(snapshot.counts.events_today, 3);
        assert_eq!(snapshot.counts.profiles_today, 1);
    }

    #[test]
    fn snapshot_lists_users_with_usage_and_recent_events() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        ingest_all(
            &mut db,
            &[
                event("42", "session_start", t0()),
                event("42", "session_end", t0() + Duration::seconds(125)),
                event("7", "view_build", t0() + Duration::minutes(5)),
            ],
        );

        let snapshot = db.dashboard_snapshot(t0(), 10, 2).expect("snapshot");
        assert_eq!(snapshot.profiles.len(), 2);
        assert_eq!(snapshot.profiles[0].profile.user_id, "7");
        assert_eq!(snapshot.profiles[0].total_minutes, 0);
        assert_eq!(snapshot.profiles[1].profile.user_id, "42");
        assert_eq!(snapshot.profiles[1].total_minutes, 2);

        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.recent[0].kind, "view_build");
        assert_eq!(snapshot.recent[1].kind, "session_end");
        assert_eq!(snapshot.recent[0].payload, json!({"platform": "android"}));
    }

    #[test]
    fn dashboard_after_clear_is_empty() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        ingest_all(
            &mut db,
            &[
                event("42", "session_start", t0()),
                event("42", "error", t0()),
                event("42", "session_end", t0() + Duration::minutes(3)),
            ],
        );

        let stats = db.clear().expect("clear");
        assert_eq!(
            stats,
            ClearStats {
                events: 3,
                profiles: 1,
                errors: 1,
            }
        );

        let snapshot = db.dashboard_snapshot(t0(), 10, 30).expect("snapshot");
        let dashboard = compose(snapshot, t0(), DashboardOptions::default());
        assert_eq!(dashboard.stats.total_users, 0);
        assert_eq!(dashboard.stats.online_users, 0);
        assert_eq!(dashboard.stats.total_actions, 0);
        assert_eq!(dashboard.stats.total_errors, 0);
        assert_eq!(dashboard.stats.today_actions, 0);
        assert_eq!(dashboard.stats.today_new_users, 0);
        assert!(dashboard.popular_actions.is_empty());
        assert!(dashboard.users.is_empty());
        assert!(dashboard.recent_activity.is_empty());
        assert!(db.recent_errors(10).expect("errors").is_empty());

        // Session history survives a clear.
        assert_eq!(db.user_sessions("42").expect("sessions").len(), 1);
    }

    #[test]
    fn broadcast_audience_orders_by_last_seen() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let hint = ProfileHint {
            display_name: Some("Alex".to_string()),
            handle: Some("alex".to_string()),
        };
        db.ingest(
            &event("1", "search", t0()),
            Some(&hint),
            OpenSessionPolicy::Supersede,
        )
        .expect("ingest");
        ingest_all(&mut db, &[event("2", "search", t0() + Duration::minutes(1))]);

        let audience = db.broadcast_audience(&[]).expect("audience");
        assert_eq!(audience.len(), 2);
        assert_eq!(audience[0].id, "2");
        assert_eq!(audience[0].name, "User");
        assert_eq!(audience[1].name, "Alex (@alex)");

        let filtered = db.broadcast_audience(&["2".to_string()]).expect("audience");
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn recent_errors_are_newest_first_and_bounded() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        for index in 0..5 {
            db.record_error(
                Some("1"),
                ua_core::ErrorSource::Storage,
                &format!("failure {index}"),
                "{}",
                t0(),
            )
            .expect("record");
        }

        let errors = db.recent_errors(3).expect("errors");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].message, "failure 4");
        assert_eq!(errors[2].message, "failure 2");
    }
}
