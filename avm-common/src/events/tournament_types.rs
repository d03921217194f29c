//! Supporting types carried by tournament events

use serde::{Deserialize, Serialize};

/// How a batch winner was decided
///
/// FALLBACK results must stay distinguishable from genuine oracle decisions
/// all the way into the serialized audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    /// The oracle returned a valid ordinal
    Oracle,
    /// Deterministic fallback (first of permuted order, or first batch id)
    Fallback,
}

impl DecisionStatus {
    pub fn is_fallback(self) -> bool {
        matches!(self, DecisionStatus::Fallback)
    }
}

/// Tournament lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentState {
    Filtering,
    Prefetching,
    Round(u32),
    Done,
    Failed,
}

impl std::fmt::Display for TournamentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentState::Filtering => write!(f, "FILTERING"),
            TournamentState::Prefetching => write!(f, "PREFETCHING"),
            TournamentState::Round(n) => write!(f, "ROUND({})", n),
            TournamentState::Done => write!(f, "DONE(success)"),
            TournamentState::Failed => write!(f, "DONE(error)"),
        }
    }
}
