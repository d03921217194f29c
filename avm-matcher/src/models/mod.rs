//! Data models for candidates, probes and the tournament audit trail

pub mod candidate;
pub mod tournament_result;

pub use avm_common::events::DecisionStatus;
pub use candidate::{AgeGroup, CandidateAsset, CandidateMetadata, Gender, ProbeAsset, ProbeProfile};
pub use tournament_result::{
    BatchResult, DroppedAsset, FallbackReason, PrefetchMetrics, RoundRecord, TournamentResult,
};
