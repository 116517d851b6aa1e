//! REST API endpoints for geotrack
//!
//! All endpoints are under /api/v1/ and return JSON, except the export
//! endpoints which return the raw CSV/GPX text blobs.

use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use geotrack_core::analytics::{export, stats};
use geotrack_core::format::format_date;
use geotrack_core::geo::{self, Region};
use geotrack_core::track::engine::EngineError;
use geotrack_core::track::source::FixEvent;
use geotrack_core::{Fix, Session};
use serde::{Deserialize, Serialize};

/// Live tracking status response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub state: String,
    pub is_active: bool,
    pub elapsed_millis: i64,
    pub distance_meters: f64,
    pub point_count: usize,
    /// Notification-style summary line, absent when idle
    pub summary: Option<String>,
}

/// One entry in the session history listing
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub distance: f64,
    pub point_count: usize,
    /// Start date formatted for display
    pub date: String,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            start_time: s.start_time,
            end_time: s.end_time,
            distance: s.distance,
            point_count: s.points.len(),
            date: format_date(s.start_time),
        }
    }
}

/// Tracking toggle request
#[derive(Deserialize)]
pub struct TrackingRequest {
    pub enabled: bool,
}

/// Device fix intake request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds; defaults to the server clock when absent
    pub timestamp_millis: Option<i64>,
}

/// Fix intake response
#[derive(Serialize)]
pub struct FixResponse {
    pub queued: bool,
}

/// Remote URL response
#[derive(Serialize)]
pub struct RemoteUrlResponse {
    pub url: String,
}

fn engine_error_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::PermissionDenied => StatusCode::FORBIDDEN,
        EngineError::AlreadyTracking | EngineError::NoActiveSession => StatusCode::CONFLICT,
    }
}

async fn status_response(state: &AppState) -> Result<StatusResponse, (StatusCode, String)> {
    let status = state
        .engine
        .status()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let summary = state
        .engine
        .status_line()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(StatusResponse {
        version: geotrack_core::VERSION.to_string(),
        state: if status.is_active { "Active" } else { "Idle" }.to_string(),
        is_active: status.is_active,
        elapsed_millis: status.elapsed_millis,
        distance_meters: status.distance_meters,
        point_count: status.point_count,
        summary,
    })
}

/// GET /api/v1/status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    Ok(Json(status_response(&state).await?))
}

/// POST /api/v1/tracking
///
/// Starts or stops the session. Caller-misuse transitions (starting while
/// active, stopping while idle) surface as 409, a missing location
/// permission as 403 — the UI is expected to show these, not retry.
pub async fn toggle_tracking(
    State(state): State<AppState>,
    Json(req): Json<TrackingRequest>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    if req.enabled {
        state
            .engine
            .start()
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map_err(|e| (engine_error_status(&e), e.to_string()))?;
    } else {
        let session = state
            .engine
            .stop()
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map_err(|e| (engine_error_status(&e), e.to_string()))?;
        tracing::info!(
            session = %session.id(),
            points = session.points.len(),
            "Session finalized via API"
        );
    }

    Ok(Json(status_response(&state).await?))
}

/// POST /api/v1/fix
///
/// Intake for device fixes. Queued for the engine thread; a full queue
/// answers 503 and the device retries with its next report.
pub async fn post_fix(
    State(state): State<AppState>,
    Json(req): Json<FixRequest>,
) -> Result<(StatusCode, Json<FixResponse>), (StatusCode, String)> {
    let timestamp_millis = req.timestamp_millis.unwrap_or_else(now_millis);
    let fix = Fix {
        latitude: req.latitude,
        longitude: req.longitude,
        timestamp_millis,
    };

    match state.fix_tx.try_send(FixEvent::Fix(fix)) {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(FixResponse { queued: true }))),
        Err(e) => {
            tracing::warn!(error = %e, "Fix intake queue full");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "Fix queue full".to_string(),
            ))
        }
    }
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, (StatusCode, String)> {
    let sessions = state
        .store
        .list_all()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(sessions.iter().map(SessionSummary::from).collect()))
}

fn load_session(state: &AppState, start_time: i64) -> Result<Session, (StatusCode, String)> {
    state
        .store
        .get(start_time)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No session with start time {start_time}"),
            )
        })
}

/// GET /api/v1/sessions/{start_time}
pub async fn get_session(
    State(state): State<AppState>,
    Path(start_time): Path<i64>,
) -> Result<Json<Session>, (StatusCode, String)> {
    Ok(Json(load_session(&state, start_time)?))
}

/// GET /api/v1/sessions/{start_time}/stats
pub async fn get_session_stats(
    State(state): State<AppState>,
    Path(start_time): Path<i64>,
) -> Result<Json<stats::SessionStats>, (StatusCode, String)> {
    let session = load_session(&state, start_time)?;
    match stats::compute_stats(&session) {
        Some(s) => Ok(Json(s)),
        None => Err((
            StatusCode::NOT_FOUND,
            "Too few points for statistics".to_string(),
        )),
    }
}

/// GET /api/v1/sessions/{start_time}/region
pub async fn get_session_region(
    State(state): State<AppState>,
    Path(start_time): Path<i64>,
) -> Result<Json<Region>, (StatusCode, String)> {
    let session = load_session(&state, start_time)?;
    match geo::bounding_region(&session.points) {
        Some(region) => Ok(Json(region)),
        None => Err((StatusCode::NOT_FOUND, "Session has no points".to_string())),
    }
}

/// GET /api/v1/sessions/{start_time}/export/csv
pub async fn export_csv(
    State(state): State<AppState>,
    Path(start_time): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = load_session(&state, start_time)?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        export::to_csv(&session),
    ))
}

/// GET /api/v1/sessions/{start_time}/export/gpx
pub async fn export_gpx(
    State(state): State<AppState>,
    Path(start_time): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = load_session(&state, start_time)?;
    Ok((
        [(header::CONTENT_TYPE, "application/gpx+xml; charset=utf-8")],
        export::to_gpx(&session),
    ))
}

/// GET /api/v1/remote-url
///
/// Returns the LAN URL a phone on the same network posts fixes to.
pub async fn get_remote_url(State(state): State<AppState>) -> Json<RemoteUrlResponse> {
    let ip = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "localhost".to_string());
    Json(RemoteUrlResponse {
        url: format!("http://{}:{}", ip, state.config.port),
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
