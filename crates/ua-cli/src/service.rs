//! The analytics engine as seen by its callers.
//!
//! [`Analytics`] owns the shared database handle, the user directory and the
//! validated settings. HTTP handlers and CLI commands both go through it, so
//! ingest failures are logged the same way regardless of the front door.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use ua_core::{
    Admission, AudienceMember, Dashboard, ErrorEntry, ErrorSource, IngestRequest, Session, UserId,
    ValidationError, compose,
};
use ua_db::{ClearStats, Database, DbError, IngestReceipt};
use ua_directory::DirectoryLookup;

use crate::config::Settings;

/// Longest request body kept in the error log.
const MAX_LOGGED_BODY: usize = 2048;

/// Database handle shared between request handlers.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Failures surfaced to callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] DbError),
    /// The blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// What an accepted ingest did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored(IngestReceipt),
    /// Placeholder user: acknowledged, nothing stored.
    Placeholder,
}

/// Entry point to the engine.
#[derive(Clone)]
pub struct Analytics<D> {
    db: SharedDatabase,
    directory: D,
    settings: Arc<Settings>,
}

impl<D: DirectoryLookup> Analytics<D> {
    pub fn new(db: Database, directory: D, settings: Settings) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            directory,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ingests a raw JSON request body.
    pub async fn ingest_json(&self, body: &[u8]) -> Result<IngestOutcome, ServiceError> {
        match IngestRequest::from_json(body) {
            Ok(request) => self.ingest(request).await,
            Err(err) => {
                tracing::info!(error = %err, "rejected unparsable ingest body");
                self.log_failure(
                    None,
                    ErrorSource::Validation,
                    err.to_string(),
                    truncated_body(body),
                    Utc::now(),
                )
                .await;
                Err(err.into())
            }
        }
    }

    /// Validates and applies one event.
    ///
    /// Rejected requests and storage failures are recorded in the error log
    /// before the error is returned.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, ServiceError> {
        let received_at = Utc::now();
        let raw = serde_json::to_string(&request).unwrap_or_default();
        let claimed_user = request.user_id.as_ref().and_then(claimed_user_id);

        let event = match request.validate(&self.settings.placeholder_user_ids, received_at) {
            Ok(Admission::Accepted(event)) => event,
            Ok(Admission::Placeholder(user_id)) => {
                tracing::debug!(%user_id, "placeholder user, event dropped");
                return Ok(IngestOutcome::Placeholder);
            }
            Err(err) => {
                tracing::info!(error = %err, "rejected ingest request");
                self.log_failure(
                    claimed_user,
                    ErrorSource::Validation,
                    err.to_string(),
                    raw,
                    received_at,
                )
                .await;
                return Err(err.into());
            }
        };

        // Enrichment is opportunistic; a directory outage never blocks ingest.
        let hint = match self.directory.get_profile_hint(&event.user_id).await {
            Ok(hint) => hint,
            Err(err) => {
                tracing::warn!(user_id = %event.user_id, error = %err, "directory lookup failed");
                None
            }
        };

        let user_id = event.user_id.to_string();
        let policy = self.settings.open_session_policy;
        match self
            .blocking(move |db| db.ingest(&event, hint.as_ref(), policy))
            .await
        {
            Ok(receipt) => Ok(IngestOutcome::Stored(receipt)),
            Err(err) => {
                tracing::error!(%user_id, error = %err, "ingest failed");
                self.log_failure(
                    Some(user_id),
                    ErrorSource::Storage,
                    err.to_string(),
                    raw,
                    received_at,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Builds the dashboard as of `now`.
    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard, ServiceError> {
        let options = self.settings.dashboard;
        let day_start = options.display_offset.start_of_day(now);
        let popular_limit = self.settings.popular_actions_limit;
        let recent_limit = self.settings.recent_activity_limit;
        let snapshot = self
            .blocking(move |db| db.dashboard_snapshot(day_start, popular_limit, recent_limit))
            .await?;
        Ok(compose(snapshot, now, options))
    }

    /// Truncates events, profiles and the error log.
    pub async fn clear(&self) -> Result<ClearStats, ServiceError> {
        self.blocking(Database::clear).await
    }

    /// Newest error log rows; `None` uses the configured limit.
    pub async fn recent_errors(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ErrorEntry>, ServiceError> {
        let limit = limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.settings.recent_errors_limit);
        self.blocking(move |db| db.recent_errors(limit)).await
    }

    /// Every reachable, non-placeholder user.
    pub async fn broadcast_audience(&self) -> Result<Vec<AudienceMember>, ServiceError> {
        let placeholders = self.settings.placeholder_user_ids.clone();
        self.blocking(move |db| db.broadcast_audience(&placeholders))
            .await
    }

    /// A user's sessions, newest first.
    pub async fn user_sessions(&self, user_id: &str) -> Result<Vec<Session>, ServiceError> {
        let user_id = UserId::new(user_id)?;
        self.blocking(move |db| db.user_sessions(user_id.as_str()))
            .await
    }

    /// Runs a storage operation off the async executor.
    async fn blocking<T, F>(&self, operation: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T, DbError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || operation(&mut *db.lock())).await?;
        Ok(result?)
    }

    /// Records a failure in the error log. Failing to do so is only traced.
    async fn log_failure(
        &self,
        user_id: Option<String>,
        source: ErrorSource,
        message: String,
        details: String,
        at: DateTime<Utc>,
    ) {
        let result = self
            .blocking(move |db| db.record_error(user_id.as_deref(), source, &message, &details, at))
            .await;
        if let Err(err) = result {
            tracing::warn!(%source, error = %err, "failed to record error");
        }
    }
}

fn claimed_user_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(id) => id.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    Some(id).filter(|id| !id.is_empty())
}

fn truncated_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_LOGGED_BODY) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.into_owned(),
    }
}
