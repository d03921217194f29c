//! avm-matcher library interface
//!
//! Tournament-elimination matcher: narrows a candidate pool to the single
//! best match for a probe image using an oracle that only compares small
//! batches at a time.

pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod tournament;

pub use crate::error::{ApiError, ApiResult, MatchError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use avm_common::events::EventBus;

use crate::services::CandidateRepository;
use crate::tournament::TournamentController;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<TournamentController>,
    pub repository: Arc<dyn CandidateRepository>,
    /// Event bus for SSE broadcasting
    pub events: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last failed run, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(controller: Arc<TournamentController>, repository: Arc<dyn CandidateRepository>) -> Self {
        let events = controller.events().clone();
        Self {
            controller,
            repository,
            events,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::match_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
