//! Error types for avm-matcher
//!
//! Per-asset and per-batch failures never surface here: they are contained
//! where they happen and recorded in the audit trail. `MatchError` covers the
//! conditions that stop a run.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{AgeGroup, Gender};
use crate::services::candidate_repository::RepositoryError;

/// Fatal tournament errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// Probe asset unreadable; no run starts
    #[error("Input error: {0}")]
    Input(String),

    /// Candidate filter produced an empty population
    #[error("No candidates match criteria: gender={gender}, age_group={age_group}")]
    NoCandidates { gender: Gender, age_group: AgeGroup },

    /// Prefetch cached zero assets
    #[error("No assets available: 0 of {requested} candidate assets could be fetched")]
    NoAssetsAvailable { requested: usize },

    /// A round failed to shrink the population
    #[error("Round {round} did not reduce population of {population}")]
    NoProgress { round: u32, population: usize },

    /// Invalid tournament configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Candidate repository could not be loaded
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// avm-common error
    #[error("Common error: {0}")]
    Common(#[from] avm_common::Error),
}

impl MatchError {
    /// Stable machine-readable code for structured error results
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Input(_) => "INPUT_ERROR",
            MatchError::NoCandidates { .. } => "NO_CANDIDATES",
            MatchError::NoAssetsAvailable { .. } => "NO_ASSETS_AVAILABLE",
            MatchError::NoProgress { .. } => "NO_PROGRESS",
            MatchError::Config(_) => "CONFIG_ERROR",
            MatchError::Repository(_) => "REPOSITORY_ERROR",
            MatchError::Common(_) => "COMMON_ERROR",
        }
    }

    /// Structured error body shared by the HTTP API and the CLI
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Tournament failure, mapped by kind
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": { "code": "BAD_REQUEST", "message": msg } }),
            ),
            ApiError::Match(ref err) => {
                let status = match err {
                    MatchError::Input(_) | MatchError::Config(_) => StatusCode::BAD_REQUEST,
                    MatchError::NoCandidates { .. } | MatchError::NoAssetsAvailable { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_json())
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": { "code": "INTERNAL_ERROR", "message": msg } }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
