//! Tournament controller
//!
//! State machine for one run:
//! FILTERING → PREFETCHING → ROUND(1) → … → ROUND(n) → DONE | FAILED.
//! Rounds repeat on the surviving population until one candidate remains.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use avm_common::config::{OracleConfig, TournamentConfig};
use avm_common::events::{EventBus, TournamentEvent, TournamentState};

use super::batch_builder::BatchBuilder;
use super::comparator::{Comparator, Shuffler};
use super::prefetcher::AssetPrefetcher;
use super::round_executor::RoundExecutor;
use crate::error::MatchError;
use crate::models::{AgeGroup, ProbeAsset, ProbeProfile, RoundRecord, TournamentResult};
use crate::services::{Annotator, AssetFetcher, CandidateRepository, ClassifierOracle};

/// Tunables for a tournament run
#[derive(Debug, Clone, PartialEq)]
pub struct TournamentSettings {
    pub batch_size: usize,
    pub max_fetch_concurrency: usize,
    pub max_compare_concurrency: usize,
    pub fetch_timeout: Duration,
    /// Bound on each oracle call (classification and comparison)
    pub oracle_timeout: Duration,
    pub inter_round_delay: Duration,
}

impl TournamentSettings {
    pub fn from_config(tournament: &TournamentConfig, oracle: &OracleConfig) -> Result<Self, MatchError> {
        tournament.validate().map_err(config_error)?;
        oracle.validate().map_err(config_error)?;
        Ok(Self {
            batch_size: tournament.batch_size,
            max_fetch_concurrency: tournament.max_fetch_concurrency,
            max_compare_concurrency: tournament.max_compare_concurrency,
            fetch_timeout: tournament.fetch_timeout(),
            oracle_timeout: oracle.timeout(),
            inter_round_delay: tournament.inter_round_delay(),
        })
    }
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            batch_size: 6,
            max_fetch_concurrency: 10,
            max_compare_concurrency: 10,
            fetch_timeout: Duration::from_secs(10),
            oracle_timeout: Duration::from_secs(60),
            inter_round_delay: Duration::from_millis(1000),
        }
    }
}

fn config_error(err: avm_common::Error) -> MatchError {
    match err {
        avm_common::Error::Config(msg) => MatchError::Config(msg),
        other => MatchError::Common(other),
    }
}

fn validate_batch_size(batch_size: usize) -> Result<(), MatchError> {
    if batch_size < 2 {
        return Err(MatchError::Config(format!(
            "batch_size must be at least 2 (got {})",
            batch_size
        )));
    }
    Ok(())
}

pub struct TournamentController {
    repository: Arc<dyn CandidateRepository>,
    oracle: Arc<dyn ClassifierOracle>,
    prefetcher: AssetPrefetcher,
    executor: RoundExecutor,
    settings: TournamentSettings,
    events: EventBus,
}

impl TournamentController {
    pub fn new(
        repository: Arc<dyn CandidateRepository>,
        fetcher: Arc<dyn AssetFetcher>,
        oracle: Arc<dyn ClassifierOracle>,
        annotator: Arc<dyn Annotator>,
        shuffler: Arc<dyn Shuffler>,
        settings: TournamentSettings,
        events: EventBus,
    ) -> Self {
        let prefetcher = AssetPrefetcher::new(
            Arc::clone(&repository),
            fetcher,
            settings.max_fetch_concurrency,
            settings.fetch_timeout,
        );
        let comparator = Arc::new(Comparator::new(
            Arc::clone(&oracle),
            annotator,
            shuffler,
            settings.oracle_timeout,
        ));
        let executor = RoundExecutor::new(comparator, settings.max_compare_concurrency, events.clone());

        Self {
            repository,
            oracle,
            prefetcher,
            executor,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &TournamentSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run a tournament with the configured batch size
    pub async fn run(&self, probe: &ProbeAsset) -> Result<TournamentResult, MatchError> {
        self.run_with_batch_size(probe, self.settings.batch_size).await
    }

    /// Run a tournament with an explicit batch size
    pub async fn run_with_batch_size(
        &self,
        probe: &ProbeAsset,
        batch_size: usize,
    ) -> Result<TournamentResult, MatchError> {
        validate_batch_size(batch_size)?;
        let builder = BatchBuilder::new(batch_size)?;
        let run_id = Uuid::new_v4();

        info!(run_id = %run_id, probe = %probe.source, batch_size, "Tournament started");

        match self.execute(run_id, probe, builder).await {
            Ok(result) => {
                info!(
                    run_id = %run_id,
                    winner = ?result.winner_id,
                    rounds = result.total_rounds,
                    fallbacks = result.fallback_count,
                    "Tournament completed"
                );
                self.set_state(run_id, TournamentState::Done);
                self.events.emit_lossy(TournamentEvent::TournamentCompleted {
                    run_id,
                    winner_id: result.winner_id.clone(),
                    total_rounds: result.total_rounds,
                    timestamp: chrono::Utc::now(),
                });
                Ok(result)
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Tournament failed");
                self.set_state(run_id, TournamentState::Failed);
                self.events.emit_lossy(TournamentEvent::TournamentFailed {
                    run_id,
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: Uuid,
        probe: &ProbeAsset,
        builder: BatchBuilder,
    ) -> Result<TournamentResult, MatchError> {
        let started_at = chrono::Utc::now();

        // FILTERING
        self.set_state(run_id, TournamentState::Filtering);
        let profile = self.classify(run_id, probe).await;

        let ids = self
            .repository
            .ids_by_criteria(Some(profile.gender), Some(profile.age_group));
        info!(
            run_id = %run_id,
            gender = %profile.gender,
            age_group = %profile.age_group,
            candidates = ids.len(),
            "Candidates filtered"
        );
        self.events.emit_lossy(TournamentEvent::CandidatesFiltered {
            run_id,
            candidate_count: ids.len(),
            timestamp: chrono::Utc::now(),
        });
        if ids.is_empty() {
            return Err(MatchError::NoCandidates {
                gender: profile.gender,
                age_group: profile.age_group,
            });
        }

        // PREFETCHING
        self.set_state(run_id, TournamentState::Prefetching);
        let outcome = self.prefetcher.prefetch(&ids).await?;
        self.events.emit_lossy(TournamentEvent::PrefetchCompleted {
            run_id,
            requested: outcome.metrics.requested,
            cached: outcome.metrics.cached,
            elapsed_ms: outcome.metrics.elapsed_ms,
            timestamp: chrono::Utc::now(),
        });

        // ROUND(n)
        let mut population = outcome.population;
        let mut rounds: Vec<RoundRecord> = Vec::new();
        let mut round = 0u32;
        while population.len() > 1 {
            round += 1;
            self.set_state(run_id, TournamentState::Round(round));

            let record = self
                .executor
                .execute(run_id, round, &population, builder, probe, &outcome.cache)
                .await;

            if record.winners.len() >= population.len() {
                return Err(MatchError::NoProgress {
                    round,
                    population: population.len(),
                });
            }

            population = record.winners.clone();
            rounds.push(record);

            if population.len() > 1 && !self.settings.inter_round_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_round_delay).await;
            }
        }

        let winner_id = population.into_iter().next();
        let best_match_metadata = winner_id
            .as_deref()
            .and_then(|id| self.repository.metadata(id));
        let fallback_count = rounds.iter().map(RoundRecord::fallback_count).sum();

        Ok(TournamentResult {
            run_id,
            started_at,
            probe_source: probe.source.clone(),
            probe_profile: profile,
            batch_size: builder.capacity(),
            winner_id,
            best_match_metadata,
            total_rounds: round,
            fallback_count,
            rounds,
            metrics: outcome.metrics,
        })
    }

    /// Classify the probe; failure degrades to an unknown-gender adult profile
    async fn classify(&self, run_id: Uuid, probe: &ProbeAsset) -> ProbeProfile {
        let answer =
            tokio::time::timeout(self.settings.oracle_timeout, self.oracle.classify_probe(&probe.image))
                .await;

        let profile = match answer {
            Ok(Ok(classification)) => ProbeProfile {
                gender: classification.gender,
                is_minor: classification.is_minor,
                age_group: AgeGroup::from_minor(classification.is_minor),
                classified: true,
            },
            Ok(Err(e)) => {
                warn!(run_id = %run_id, error = %e, "Probe classification failed, widening filter");
                ProbeProfile::unclassified()
            }
            Err(_) => {
                warn!(run_id = %run_id, "Probe classification timed out, widening filter");
                ProbeProfile::unclassified()
            }
        };

        self.events.emit_lossy(TournamentEvent::ProbeClassified {
            run_id,
            gender: profile.gender.to_string(),
            is_minor: profile.is_minor,
            classified: profile.classified,
            timestamp: chrono::Utc::now(),
        });
        profile
    }

    fn set_state(&self, run_id: Uuid, state: TournamentState) {
        info!(run_id = %run_id, state = %state, "Tournament state changed");
        self.events.emit_lossy(TournamentEvent::StateChanged {
            run_id,
            state,
            timestamp: chrono::Utc::now(),
        });
    }
}
