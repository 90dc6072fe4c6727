//! The ingest unit of work.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};
use ua_core::{
    ErrorSource, Event, EventKind, OpenSessionPolicy, ProfileHint, SessionStatus,
    format_timestamp, parse_client_timestamp, session_duration_minutes,
};

use crate::{Database, DbError};

/// What an ingest did to the session ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    /// Not a session event.
    None,
    /// A new open session; `superseded` earlier sessions were abandoned.
    Opened { session_id: i64, superseded: usize },
    /// An open session was closed and its minutes added to the usage total.
    Closed {
        session_id: i64,
        duration_minutes: i64,
    },
    /// A `session_end` with no open session to pair with.
    Unpaired,
    /// A session event whose timestamp could not be parsed.
    Skipped,
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub event_id: i64,
    pub session: SessionEffect,
}

impl Database {
    /// Applies one event to every store in a single transaction.
    ///
    /// The event is appended to the log, mirrored into the error log when it
    /// is an `error` event or carries an unparsable timestamp, paired into the
    /// session ledger, and folded into the user's profile.
    pub fn ingest(
        &mut self,
        event: &Event,
        hint: Option<&ProfileHint>,
        policy: OpenSessionPolicy,
    ) -> Result<IngestReceipt, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let event_id = insert_event(&tx, event)?;
        let user_id = event.user_id.as_str();
        let recorded_at = format_timestamp(event.received_at);

        if event.kind == EventKind::Error {
            insert_error(
                &tx,
                Some(user_id),
                ErrorSource::Client,
                &event.error_message(),
                &event.payload_json(),
                &recorded_at,
            )?;
        }

        let session = match event.occurred_at {
            Some(at) => match event.kind {
                EventKind::SessionStart => open_session(&tx, event, at, policy)?,
                EventKind::SessionEnd => close_session(&tx, user_id, at, &recorded_at)?,
                _ => SessionEffect::None,
            },
            None => {
                let error = event.timestamp_error().map(|err| err.to_string());
                insert_error(
                    &tx,
                    Some(user_id),
                    ErrorSource::Timestamp,
                    error.as_deref().unwrap_or("unparsable timestamp"),
                    &event.payload_json(),
                    &recorded_at,
                )?;
                if matches!(event.kind, EventKind::SessionStart | EventKind::SessionEnd) {
                    SessionEffect::Skipped
                } else {
                    SessionEffect::None
                }
            }
        };

        touch_profile(&tx, event, hint)?;
        tx.commit()?;

        tracing::debug!(user_id, kind = %event.kind, event_id, ?session, "ingested event");
        Ok(IngestReceipt { event_id, session })
    }

    /// Appends a row to the error log outside of any ingest.
    pub fn record_error(
        &mut self,
        user_id: Option<&str>,
        source: ErrorSource,
        message: &str,
        details: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let tx = self.conn.transaction()?;
        let id = insert_error(&tx, user_id, source, message, details, &format_timestamp(at))?;
        tx.commit()?;
        Ok(id)
    }
}

fn insert_event(tx: &Transaction<'_>, event: &Event) -> Result<i64, DbError> {
    tx.execute(
        "
        INSERT INTO events (user_id, kind, payload, client_timestamp, occurred_at, received_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
        params![
            event.user_id.as_str(),
            event.kind.as_str(),
            event.payload_json(),
            event.raw_timestamp,
            event.occurred_at.map(format_timestamp),
            format_timestamp(event.received_at),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_error(
    tx: &Transaction<'_>,
    user_id: Option<&str>,
    source: ErrorSource,
    message: &str,
    details: &str,
    recorded_at: &str,
) -> Result<i64, DbError> {
    tx.execute(
        "
        INSERT INTO error_log (user_id, source, message, details, recorded_at)
        VALUES (?, ?, ?, ?, ?)
        ",
        params![user_id, source.as_str(), message, details, recorded_at],
    )?;
    Ok(tx.last_insert_rowid())
}

fn open_session(
    tx: &Transaction<'_>,
    event: &Event,
    start: DateTime<Utc>,
    policy: OpenSessionPolicy,
) -> Result<SessionEffect, DbError> {
    let start_time = format_timestamp(start);
    let superseded = match policy {
        OpenSessionPolicy::Supersede => tx.execute(
            "
            UPDATE sessions
            SET end_time = ?, duration_minutes = 0, status = ?
            WHERE user_id = ? AND end_time IS NULL
            ",
            params![
                start_time,
                SessionStatus::Abandoned.as_str(),
                event.user_id.as_str()
            ],
        )?,
        OpenSessionPolicy::Permissive => 0,
    };
    if superseded > 0 {
        tracing::info!(
            user_id = event.user_id.as_str(),
            superseded,
            "abandoned open sessions on new start"
        );
    }

    tx.execute(
        "
        INSERT INTO sessions (user_id, start_time, platform, status)
        VALUES (?, ?, ?, ?)
        ",
        params![
            event.user_id.as_str(),
            start_time,
            event.platform(),
            SessionStatus::Open.as_str()
        ],
    )?;
    Ok(SessionEffect::Opened {
        session_id: tx.last_insert_rowid(),
        superseded,
    })
}

fn close_session(
    tx: &Transaction<'_>,
    user_id: &str,
    end: DateTime<Utc>,
    recorded_at: &str,
) -> Result<SessionEffect, DbError> {
    let open: Option<(i64, String)> = tx
        .query_row(
            "
            SELECT id, start_time
            FROM sessions
            WHERE user_id = ? AND end_time IS NULL
            ORDER BY start_time DESC, id DESC
            LIMIT 1
            ",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((session_id, start_time)) = open else {
        tracing::debug!(user_id, "session_end without an open session");
        return Ok(SessionEffect::Unpaired);
    };

    let start = parse_client_timestamp(&start_time).map_err(|_| DbError::TimestampParse {
        column: "sessions.start_time",
        timestamp: start_time.clone(),
    })?;
    let duration_minutes = session_duration_minutes(start, end);

    tx.execute(
        "
        UPDATE sessions
        SET end_time = ?, duration_minutes = ?, status = ?
        WHERE id = ?
        ",
        params![
            format_timestamp(end),
            duration_minutes,
            SessionStatus::Closed.as_str(),
            session_id
        ],
    )?;
    tx.execute(
        "
        INSERT INTO usage_totals (user_id, total_minutes, last_updated)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            total_minutes = usage_totals.total_minutes + excluded.total_minutes,
            last_updated = excluded.last_updated
        ",
        params![user_id, duration_minutes, recorded_at],
    )?;

    Ok(SessionEffect::Closed {
        session_id,
        duration_minutes,
    })
}

fn touch_profile(
    tx: &Transaction<'_>,
    event: &Event,
    hint: Option<&ProfileHint>,
) -> Result<(), DbError> {
    let seen_at = format_timestamp(event.effective_time());
    let display_name = hint.and_then(|h| h.display_name.as_deref());
    let handle = hint.and_then(|h| h.handle.as_deref());
    let reported_platform = event
        .payload
        .get("platform")
        .and_then(serde_json::Value::as_str)
        .filter(|platform| !platform.trim().is_empty());

    tx.execute(
        "
        INSERT INTO profiles
        (user_id, display_name, handle, platform, first_seen, last_seen, last_action, total_actions)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, 1)
        ON CONFLICT(user_id) DO UPDATE SET
            display_name = COALESCE(excluded.display_name, profiles.display_name),
            handle = COALESCE(excluded.handle, profiles.handle),
            platform = COALESCE(?7, profiles.platform),
            last_seen = excluded.last_seen,
            last_action = excluded.last_action,
            total_actions = profiles.total_actions + 1
        ",
        params![
            event.user_id.as_str(),
            display_name,
            handle,
            event.platform(),
            seen_at,
            event.kind.as_str(),
            reported_platform,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::thread;

    use chrono::Duration;
    use serde_json::{Value, json};
    use ua_core::{Admission, IngestRequest, SessionStatus};

    const POLICY: OpenSessionPolicy = OpenSessionPolicy::Supersede;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event_at(user_id: &str, action: &str, at: DateTime<Utc>, details: Value) -> Event {
        let request: IngestRequest = serde_json::from_value(json!({
            "user_id": user_id,
            "action": action,
            "details": details,
            "timestamp": format_timestamp(at),
        }))
        .unwrap();
        match request.validate(&[], at).unwrap() {
            Admission::Accepted(event) => event,
            Admission::Placeholder(_) => unreachable!(),
        }
    }

    fn event(user_id: &str, action: &str, at: DateTime<Utc>) -> Event {
        event_at(user_id, action, at, json!({"platform": "android"}))
    }

    fn ingest(db: &mut Database, event: &Event) -> IngestReceipt {
        db.ingest(event, None, POLICY).expect("ingest")
    }

    fn total_minutes(db: &Database, user_id: &str) -> Option<i64> {
        db.usage_total(user_id)
            .expect("usage total")
            .map(|total| total.total_minutes)
    }

    #[test]
    fn start_then_end_closes_session() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        ingest(&mut db, &event("42", "session_start", t0()));
        let receipt = ingest(
            &mut db,
            &event("42", "session_end", t0() + Duration::seconds(125)),
        );

        assert!(matches!(
            receipt.session,
            SessionEffect::Closed {
                duration_minutes: 2,
                ..
            }
        ));
        let sessions = db.user_sessions("42").expect("sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, Some(2));
        assert_eq!(sessions[0].status, SessionStatus::Closed);
        assert_eq!(sessions[0].platform, "android");
        assert_eq!(
            sessions[0].end_time.as_deref(),
            Some("2025-03-01T10:02:05.000Z")
        );
        assert_eq!(total_minutes(&db, "42"), Some(2));
    }

    #[test]
    fn actions_without_sessions_only_touch_profile() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        for offset in 0..3 {
            ingest(
                &mut db,
                &event("7", "view_build", t0() + Duration::seconds(offset)),
            );
        }

        let profile = db.profile("7").expect("profile").expect("row");
        assert_eq!(profile.total_actions, 3);
        assert_eq!(profile.last_action, "view_build");
        assert!(db.user_sessions("7").expect("sessions").is_empty());
        assert_eq!(total_minutes(&db, "7"), None);
    }

    #[test]
    fn end_without_start_is_stored_but_unpaired() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        let receipt = ingest(&mut db, &event("9", "session_end", t0()));

        assert_eq!(receipt.session, SessionEffect::Unpaired);
        assert!(receipt.event_id > 0);
        assert!(db.user_sessions("9").expect("sessions").is_empty());
        assert_eq!(total_minutes(&db, "9"), None);
        assert_eq!(db.recent_events(10).expect("recent").len(), 1);
    }

    #[test]
    fn end_before_start_clamps_to_zero() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        ingest(&mut db, &event("5", "session_start", t0()));
        let receipt = ingest(
            &mut db,
            &event("5", "session_end", t0() - Duration::minutes(3)),
        );

        assert!(matches!(
            receipt.session,
            SessionEffect::Closed {
                duration_minutes: 0,
                ..
            }
        ));
        assert_eq!(total_minutes(&db, "5"), Some(0));
    }

    #[test]
    fn duplicate_event_counts_twice() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let first = event_at("3", "search", t0(), json!({"platform": "ios"}));
        let later = event_at(
            "3",
            "search",
            t0() + Duration::seconds(30),
            json!({"platform": "android"}),
        );

        ingest(&mut db, &first);
        let before = db.profile("3").expect("profile").expect("row").total_actions;
        ingest(&mut db, &later);
        ingest(&mut db, &later);

        let profile = db.profile("3").expect("profile").expect("row");
        assert_eq!(profile.total_actions, before + 2);
        assert_eq!(profile.last_seen, "2025-03-01T10:00:30.000Z");
        assert_eq!(profile.first_seen, "2025-03-01T10:00:00.000Z");
        assert_eq!(profile.platform, "android");
    }

    #[test]
    fn events_without_platform_keep_known_platform() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        ingest(&mut db, &event("3", "search", t0()));
        ingest(
            &mut db,
            &event_at("3", "search", t0() + Duration::seconds(1), json!({})),
        );

        let profile = db.profile("3").expect("profile").expect("row");
        assert_eq!(profile.platform, "android");
    }

    #[test]
    fn total_equals_sum_of_closed_durations() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let lengths = [125_i64, 59, 3_600, 61, 0];

        let mut at = t0();
        for (index, seconds) in lengths.iter().enumerate() {
            let other = format!("other-{index}");
            ingest(&mut db, &event("42", "session_start", at));
            ingest(&mut db, &event(&other, "session_start", at));
            ingest(&mut db, &event(&other, "session_end", at + Duration::minutes(7)));
            ingest(
                &mut db,
                &event("42", "session_end", at + Duration::seconds(*seconds)),
            );
            at += Duration::hours(2);
        }

        let expected: i64 = lengths.iter().map(|seconds| seconds / 60).sum();
        let sessions = db.user_sessions("42").expect("sessions");
        let summed: i64 = sessions
            .iter()
            .filter_map(|session| session.duration_minutes)
            .sum();
        assert_eq!(total_minutes(&db, "42"), Some(expected));
        assert_eq!(summed, expected);
    }

    #[test]
    fn supersede_abandons_earlier_open_session() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        ingest(&mut db, &event("1", "session_start", t0()));
        let receipt = ingest(
            &mut db,
            &event("1", "session_start", t0() + Duration::minutes(30)),
        );
        assert!(matches!(
            receipt.session,
            SessionEffect::Opened { superseded: 1, .. }
        ));
        ingest(
            &mut db,
            &event("1", "session_end", t0() + Duration::minutes(35)),
        );

        let sessions = db.user_sessions("1").expect("sessions");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].status, SessionStatus::Closed);
        assert_eq!(sessions[0].duration_minutes, Some(5));
        assert_eq!(sessions[1].status, SessionStatus::Abandoned);
        assert_eq!(sessions[1].duration_minutes, Some(0));
        assert_eq!(total_minutes(&db, "1"), Some(5));
    }

    #[test]
    fn permissive_keeps_every_start_open() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let policy = OpenSessionPolicy::Permissive;

        db.ingest(&event("1", "session_start", t0()), None, policy)
            .expect("ingest");
        db.ingest(
            &event("1", "session_start", t0() + Duration::minutes(30)),
            None,
            policy,
        )
        .expect("ingest");
        db.ingest(
            &event("1", "session_end", t0() + Duration::minutes(35)),
            None,
            policy,
        )
        .expect("ingest");
        db.ingest(
            &event("1", "session_end", t0() + Duration::minutes(40)),
            None,
            policy,
        )
        .expect("ingest");

        let sessions = db.user_sessions("1").expect("sessions");
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Closed));
        // The later start closes first (5 min), the earlier one second (40 min).
        assert_eq!(total_minutes(&db, "1"), Some(45));
    }

    #[test]
    fn unparsable_timestamp_skips_pairing_but_stores_event() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        ingest(&mut db, &event("8", "session_start", t0()));

        let request: IngestRequest = serde_json::from_value(json!({
            "user_id": "8",
            "action": "session_end",
            "timestamp": "not-a-time",
        }))
        .unwrap();
        let Admission::Accepted(bad) = request
            .validate(&[], t0() + Duration::minutes(10))
            .unwrap()
        else {
            unreachable!()
        };

        let receipt = ingest(&mut db, &bad);
        assert_eq!(receipt.session, SessionEffect::Skipped);

        let sessions = db.user_sessions("8").expect("sessions");
        assert_eq!(sessions[0].status, SessionStatus::Open);
        assert_eq!(total_minutes(&db, "8"), None);

        let profile = db.profile("8").expect("profile").expect("row");
        assert_eq!(profile.total_actions, 2);
        assert_eq!(profile.last_seen, "2025-03-01T10:10:00.000Z");

        let errors = db.recent_errors(10).expect("errors");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "timestamp");
        assert!(errors[0].message.contains("not-a-time"));
    }

    #[test]
    fn error_events_are_mirrored_into_error_log() {
        let mut db = Database::open_in_memory().expect("open in-memory db");

        ingest(
            &mut db,
            &event_at("4", "error", t0(), json!({"message": "render failed"})),
        );

        let errors = db.recent_errors(10).expect("errors");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "client");
        assert_eq!(errors[0].message, "render failed");
        assert_eq!(errors[0].user_id.as_deref(), Some("4"));
    }

    #[test]
    fn hints_fill_profile_opportunistically() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let hint = ProfileHint {
            display_name: Some("Alex".to_string()),
            handle: Some("alex".to_string()),
        };

        db.ingest(&event("2", "search", t0()), Some(&hint), POLICY)
            .expect("ingest");
        db.ingest(&event("2", "search", t0()), None, POLICY)
            .expect("ingest");
        db.ingest(
            &event("2", "search", t0()),
            Some(&ProfileHint {
                display_name: Some("Alexander".to_string()),
                handle: None,
            }),
            POLICY,
        )
        .expect("ingest");

        let profile = db.profile("2").expect("profile").expect("row");
        assert_eq!(profile.display_name.as_deref(), Some("Alexander"));
        assert_eq!(profile.handle.as_deref(), Some("alex"));
    }

    #[test]
    fn record_error_appends_to_log() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.record_error(None, ErrorSource::Validation, "user_id is required", "{}", t0())
            .expect("record");

        let errors = db.recent_errors(5).expect("errors");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].user_id, None);
        assert_eq!(errors[0].recorded_at, "2025-03-01T10:00:00.000Z");
    }

    #[test]
    fn concurrent_closures_do_not_lose_minutes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("analytics.db");
        Database::open(&path).expect("create db");

        let workers: Vec<_> = (0..6_i64)
            .map(|worker| {
                let path = path.clone();
                thread::spawn(move || run_worker(&path, worker))
            })
            .collect();
        let mut expected = 0;
        for handle in workers {
            expected += handle.join().expect("worker thread");
        }

        let db = Database::open(&path).expect("reopen db");
        assert_eq!(total_minutes(&db, "42"), Some(expected));
        for worker in 0..6 {
            assert_eq!(total_minutes(&db, &format!("solo-{worker}")), Some(4 * 3));
        }
    }

    /// Opens its own connection and closes sessions for a shared user.
    ///
    /// Every start shares `t0`, so whichever open row an end pairs with, the
    /// duration depends only on the end time.
    fn run_worker(path: &Path, worker: i64) -> i64 {
        let mut db = Database::open(path).expect("open db in worker");
        let policy = OpenSessionPolicy::Permissive;
        let solo = format!("solo-{worker}");
        let mut minutes = 0;
        for round in 0..4 {
            let length = worker * 4 + round + 1;
            db.ingest(&event("42", "session_start", t0()), None, policy)
                .expect("start");
            db.ingest(&event(&solo, "session_start", t0()), None, policy)
                .expect("solo start");
            db.ingest(
                &event("42", "session_end", t0() + Duration::minutes(length)),
                None,
                policy,
            )
            .expect("end");
            db.ingest(
                &event(&solo, "session_end", t0() + Duration::minutes(3)),
                None,
                policy,
            )
            .expect("solo end");
            minutes += length;
        }
        minutes
    }
}
