//! Tournament and candidate endpoints
//!
//! `POST /match` takes the raw probe image bytes as the request body and runs
//! one tournament to completion before responding.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::{ProbeAsset, TournamentResult};
use crate::services::CandidateSummary;
use crate::AppState;

/// Largest accepted probe upload
const MAX_PROBE_BYTES: usize = 20 * 1024 * 1024;

/// Query parameters for POST /match
#[derive(Debug, Default, Deserialize)]
pub struct MatchQuery {
    /// Overrides the configured batch size
    pub batch_size: Option<usize>,
}

/// POST /match?batch_size=N
pub async fn run_match(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
    body: Bytes,
) -> ApiResult<Json<TournamentResult>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest(
            "request body must contain the probe image".to_string(),
        ));
    }

    let probe = ProbeAsset::from_bytes(&body, "upload")?;
    let batch_size = query
        .batch_size
        .unwrap_or(state.controller.settings().batch_size);

    info!(bytes = body.len(), batch_size, "Match request received");

    match state.controller.run_with_batch_size(&probe, batch_size).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

/// GET /candidates/summary
pub async fn candidate_summary(State(state): State<AppState>) -> Json<CandidateSummary> {
    Json(state.repository.summary())
}

/// Build tournament routes
pub fn match_routes() -> Router<AppState> {
    Router::new()
        .route("/match", post(run_match))
        .layer(DefaultBodyLimit::max(MAX_PROBE_BYTES))
        .route("/candidates/summary", get(candidate_summary))
}
