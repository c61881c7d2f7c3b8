//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters via axum extractors,
//! interacts with AppState services, and returns JSON responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use parley_core::error::ValidationErrors;
use parley_core::types::{
    IngestOutcome, IngestRequest, ParticipantAnalytics, SearchOutcome, TopicStat,
    TranscriptDetail, TranscriptListItem,
};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_secs: u64,
    pub transcripts: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptListResponse {
    pub count: usize,
    pub transcripts: Vec<TranscriptListItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub count: usize,
    pub topics: Vec<TopicStat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantsResponse {
    pub total_participants: usize,
    pub participants: Vec<ParticipantAnalytics>,
}

// =============================================================================
// Public endpoints
// =============================================================================

/// GET / - service banner.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Parley meeting intelligence API".to_string(),
        status: "running".to_string(),
    })
}

/// GET /health - liveness plus stored transcript count.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.queries.stats()?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        transcripts: stats.transcripts,
    }))
}

// =============================================================================
// Ingestion
// =============================================================================

/// POST /api/ingest - validate, extract, and store one transcript.
///
/// A body that is not valid JSON is reported as a validation failure on
/// `body`, alongside the field-level failures a parsed body can produce.
pub async fn ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let Json(request) = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(rejection.body_text());
        }
        let mut errors = ValidationErrors::new();
        errors.push("body", rejection.body_text());
        ApiError::Validation(errors)
    })?;

    let outcome = state.pipeline.ingest(request).await?;
    info!(id = outcome.id, "Transcript ingested");

    Ok((StatusCode::CREATED, Json(outcome)))
}

// =============================================================================
// Transcripts
// =============================================================================

/// GET /api/transcripts - all transcripts, most recent meeting first.
pub async fn list_transcripts(
    State(state): State<AppState>,
) -> Result<Json<TranscriptListResponse>, ApiError> {
    let transcripts = state.queries.list_transcripts()?;
    Ok(Json(TranscriptListResponse {
        count: transcripts.len(),
        transcripts,
    }))
}

/// GET /api/transcripts/{id} - one transcript with its full knowledge graph.
pub async fn get_transcript(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TranscriptDetail>, ApiError> {
    let Path(id) = id
        .map_err(|_| ApiError::BadRequest("Transcript id must be an integer".to_string()))?;
    Ok(Json(state.repo.find_detail(id)?))
}

// =============================================================================
// Search
// =============================================================================

/// GET /api/search?q=&limit= - rank transcripts by semantic similarity.
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let query = params.q.unwrap_or_default();

    let outcome = state.search.search(&query, params.limit).await?;
    Ok(Json(outcome))
}

// =============================================================================
// Analytics
// =============================================================================

/// GET /api/analytics/topics - topic frequency across all meetings.
pub async fn topics(State(state): State<AppState>) -> Result<Json<TopicsResponse>, ApiError> {
    let topics = state.queries.topic_stats()?;
    Ok(Json(TopicsResponse {
        count: topics.len(),
        topics,
    }))
}

/// GET /api/analytics/participants - per-participant meeting involvement.
pub async fn participants(
    State(state): State<AppState>,
) -> Result<Json<ParticipantsResponse>, ApiError> {
    let participants = state.queries.participant_analytics()?;
    Ok(Json(ParticipantsResponse {
        total_participants: participants.len(),
        participants,
    }))
}
