//! Request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;
use ua_core::{AudienceMember, Dashboard, ErrorEntry, Session};
use ua_directory::DirectoryLookup;

use crate::api::response::{ApiError, ClearResponse, HealthResponse, StatusResponse};
use crate::service::{Analytics, IngestOutcome};

/// POST /api/analytics - record one client event.
///
/// Placeholder users get the same `ok` as stored events.
pub async fn ingest<D>(
    State(analytics): State<Analytics<D>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError>
where
    D: DirectoryLookup + Clone + 'static,
{
    match analytics.ingest_json(&body).await? {
        IngestOutcome::Stored(receipt) => {
            tracing::debug!(
                event_id = receipt.event_id,
                session = ?receipt.session,
                "event stored"
            );
        }
        IngestOutcome::Placeholder => {}
    }
    Ok(Json(StatusResponse::ok()))
}

/// GET /api/analytics/dashboard
pub async fn dashboard<D>(
    State(analytics): State<Analytics<D>>,
) -> Result<Json<Dashboard>, ApiError>
where
    D: DirectoryLookup + Clone + 'static,
{
    Ok(Json(analytics.dashboard(Utc::now()).await?))
}

/// DELETE /api/analytics/clear - irreversible, no confirmation.
pub async fn clear<D>(
    State(analytics): State<Analytics<D>>,
) -> Result<Json<ClearResponse>, ApiError>
where
    D: DirectoryLookup + Clone + 'static,
{
    let stats = analytics.clear().await?;
    Ok(Json(ClearResponse {
        status: "ok".to_string(),
        events: stats.events,
        profiles: stats.profiles,
        errors: stats.errors,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub limit: Option<usize>,
}

/// GET /api/analytics/errors?limit=N
pub async fn errors<D>(
    State(analytics): State<Analytics<D>>,
    Query(query): Query<ErrorsQuery>,
) -> Result<Json<Vec<ErrorEntry>>, ApiError>
where
    D: DirectoryLookup + Clone + 'static,
{
    Ok(Json(analytics.recent_errors(query.limit).await?))
}

/// GET /api/analytics/broadcast-users
pub async fn broadcast_users<D>(
    State(analytics): State<Analytics<D>>,
) -> Result<Json<Vec<AudienceMember>>, ApiError>
where
    D: DirectoryLookup + Clone + 'static,
{
    Ok(Json(analytics.broadcast_audience().await?))
}

/// GET /api/analytics/users/:user_id/sessions
pub async fn user_sessions<D>(
    State(analytics): State<Analytics<D>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Session>>, ApiError>
where
    D: DirectoryLookup + Clone + 'static,
{
    Ok(Json(analytics.user_sessions(&user_id).await?))
}

/// GET /health - liveness.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
