//! Storage layer for usage analytics.
//!
//! Provides persistence for the event log, session ledger, usage totals,
//! profile registry and error log using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! This means a `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! For multi-threaded access, either:
//! - Use a `Mutex<Database>` to serialize access
//! - Use separate `Database` instances per thread against the same file
//!
//! Every ingest runs in an `IMMEDIATE` transaction, so separate connections
//! serialize their writes on the SQLite lock and a crash mid-ingest leaves
//! no partial state behind.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Derived timestamps are stored as TEXT in RFC 3339 with millisecond precision
//! and a `Z` suffix (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic ordering
//! matches chronological ordering. The client's original timestamp string is kept
//! verbatim in `events.client_timestamp`.
//!
//! ## Usage Totals
//!
//! `usage_totals.total_minutes` is only ever changed by an upsert that adds to the
//! stored value inside SQLite; it is never read back and rewritten.

mod ingest;
mod query;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;

pub use ingest::{IngestReceipt, SessionEffect};
pub use query::{ClearStats, UsageTotal};

/// How long a connection waits for another writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp in {column}: {timestamp}")]
    TimestampParse {
        column: &'static str,
        timestamp: String,
    },
    /// A stored event payload is not valid JSON.
    #[error("invalid payload for event {event_id}: {message}")]
    InvalidPayload { event_id: i64, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Event store: append-only log of accepted client events
            -- client_timestamp: timestamp string exactly as sent (may be unparsable)
            -- occurred_at: canonical UTC form, NULL when client_timestamp is unparsable
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                client_timestamp TEXT,
                occurred_at TEXT,
                received_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id);
            CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);
            CREATE INDEX IF NOT EXISTS idx_events_occurred ON events(occurred_at);

            -- Session ledger: status is 'open', 'closed' or 'abandoned'
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_minutes INTEGER,
                platform TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                CHECK (duration_minutes IS NULL OR duration_minutes >= 0)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_open ON sessions(user_id, end_time, start_time);

            CREATE TABLE IF NOT EXISTS usage_totals (
                user_id TEXT PRIMARY KEY,
                total_minutes INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT,
                handle TEXT,
                platform TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                last_action TEXT NOT NULL,
                total_actions INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_profiles_last_seen ON profiles(last_seen);

            CREATE TABLE IF NOT EXISTS error_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                source TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}
