//! Tournament audit trail and final result
//!
//! Everything here serializes to the JSON consumed by result viewers. Ids are
//! stable candidate ids; metadata may be missing for any id.

use avm_common::events::DecisionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::{CandidateMetadata, ProbeProfile};

/// Why a batch was decided by fallback instead of the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No batch id resolved to a cached asset
    NoResolvedAssets,
    /// Oracle call failed
    OracleError(String),
    /// Oracle call exceeded its time bound
    OracleTimeout,
    /// Oracle answered with an ordinal outside 1..=k (including negatives)
    OrdinalOutOfRange(i64),
    /// The comparator task itself failed (panic or join error)
    TaskFailed(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NoResolvedAssets => write!(f, "no cached assets in batch"),
            FallbackReason::OracleError(msg) => write!(f, "oracle error: {}", msg),
            FallbackReason::OracleTimeout => write!(f, "oracle timeout"),
            FallbackReason::OrdinalOutOfRange(n) => write!(f, "ordinal {} out of range", n),
            FallbackReason::TaskFailed(msg) => write!(f, "comparator task failed: {}", msg),
        }
    }
}

/// Outcome of one batch comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Position of the batch within its round
    pub batch_index: usize,
    /// Batch ids in Batch Builder order
    pub batch_ids: Vec<String>,
    /// Ids in the permuted order shown to the oracle (ordinal n = index n-1)
    pub resolved_ids: Vec<String>,
    pub winner_id: String,
    /// 1-based ordinal in the permuted order; 0 when no ordinal was shown
    pub winner_ordinal: usize,
    pub status: DecisionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

impl BatchResult {
    /// Genuine oracle decision
    pub fn oracle(
        batch_index: usize,
        batch_ids: Vec<String>,
        resolved_ids: Vec<String>,
        winner_ordinal: usize,
    ) -> Self {
        let winner_id = resolved_ids[winner_ordinal - 1].clone();
        Self {
            batch_index,
            batch_ids,
            resolved_ids,
            winner_id,
            winner_ordinal,
            status: DecisionStatus::Oracle,
            fallback_reason: None,
        }
    }

    /// Fallback to ordinal 1 of the permuted order
    pub fn permuted_fallback(
        batch_index: usize,
        batch_ids: Vec<String>,
        resolved_ids: Vec<String>,
        reason: FallbackReason,
    ) -> Self {
        let winner_id = resolved_ids[0].clone();
        Self {
            batch_index,
            batch_ids,
            resolved_ids,
            winner_id,
            winner_ordinal: 1,
            status: DecisionStatus::Fallback,
            fallback_reason: Some(reason),
        }
    }

    /// Fallback to the batch's first original id (nothing was shown to the oracle)
    pub fn first_id_fallback(
        batch_index: usize,
        batch_ids: Vec<String>,
        reason: FallbackReason,
    ) -> Self {
        let winner_id = batch_ids[0].clone();
        Self {
            batch_index,
            batch_ids,
            resolved_ids: Vec::new(),
            winner_id,
            winner_ordinal: 0,
            status: DecisionStatus::Fallback,
            fallback_reason: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.status.is_fallback()
    }
}

/// One elimination round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number
    pub round: u32,
    /// Population entering the round
    pub population: Vec<String>,
    /// Results in batch order
    pub batch_results: Vec<BatchResult>,
    /// Winners in batch order; the next round's population
    pub winners: Vec<String>,
    pub elapsed_ms: u64,
}

impl RoundRecord {
    pub fn fallback_count(&self) -> usize {
        self.batch_results.iter().filter(|r| r.is_fallback()).count()
    }
}

/// An id dropped during prefetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedAsset {
    pub candidate_id: String,
    pub reason: String,
}

/// Prefetch stage metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefetchMetrics {
    pub requested: usize,
    pub cached: usize,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub dropped: Vec<DroppedAsset>,
}

/// Final result of a tournament run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub probe_source: String,
    pub probe_profile: ProbeProfile,
    pub batch_size: usize,
    pub winner_id: Option<String>,
    #[serde(default)]
    pub best_match_metadata: Option<CandidateMetadata>,
    pub total_rounds: u32,
    pub fallback_count: usize,
    pub rounds: Vec<RoundRecord>,
    pub metrics: PrefetchMetrics,
}
