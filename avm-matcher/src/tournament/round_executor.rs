//! One elimination round
//!
//! Builds the round's batches and runs one comparator task per batch on a
//! `JoinSet`, bounded by a semaphore. The round ends only when every task has
//! finished. A task that dies without a result is replaced by a first-id
//! FALLBACK; it never aborts its siblings.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use avm_common::events::{EventBus, TournamentEvent};

use super::batch_builder::BatchBuilder;
use super::comparator::Comparator;
use super::prefetcher::AssetCache;
use crate::models::{BatchResult, FallbackReason, ProbeAsset, RoundRecord};

pub struct RoundExecutor {
    comparator: Arc<Comparator>,
    max_concurrency: usize,
    events: EventBus,
}

impl RoundExecutor {
    pub fn new(comparator: Arc<Comparator>, max_concurrency: usize, events: EventBus) -> Self {
        Self {
            comparator,
            max_concurrency: max_concurrency.max(1),
            events,
        }
    }

    pub async fn execute(
        &self,
        run_id: Uuid,
        round: u32,
        population: &[String],
        builder: BatchBuilder,
        probe: &ProbeAsset,
        cache: &Arc<AssetCache>,
    ) -> RoundRecord {
        let start = Instant::now();
        let batches = builder.build(population);
        let batch_count = batches.len();
        let concurrency = batch_count.min(self.max_concurrency).max(1);

        info!(
            round,
            population = population.len(),
            batches = batch_count,
            concurrency,
            "Round started"
        );
        self.events.emit_lossy(TournamentEvent::RoundStarted {
            run_id,
            round,
            population: population.len(),
            batch_count,
            timestamp: chrono::Utc::now(),
        });

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        for batch in batches.iter().cloned() {
            let comparator = Arc::clone(&self.comparator);
            let semaphore = Arc::clone(&semaphore);
            let probe = probe.clone();
            let cache = Arc::clone(cache);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                comparator.compare(&probe, &batch, &cache).await
            });
        }

        let mut slots: Vec<Option<BatchResult>> = vec![None; batch_count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    self.events.emit_lossy(TournamentEvent::BatchDecided {
                        run_id,
                        round,
                        winner_id: result.winner_id.clone(),
                        status: result.status,
                        timestamp: chrono::Utc::now(),
                    });
                    let index = result.batch_index;
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => {
                    warn!(round, error = %e, "Comparator task failed");
                }
            }
        }

        let batch_results: Vec<BatchResult> = slots
            .into_iter()
            .zip(batches)
            .map(|(slot, batch)| {
                slot.unwrap_or_else(|| {
                    let result = BatchResult::first_id_fallback(
                        batch.index(),
                        batch.ids().to_vec(),
                        FallbackReason::TaskFailed("comparator task ended without a result".to_string()),
                    );
                    self.events.emit_lossy(TournamentEvent::BatchDecided {
                        run_id,
                        round,
                        winner_id: result.winner_id.clone(),
                        status: result.status,
                        timestamp: chrono::Utc::now(),
                    });
                    result
                })
            })
            .collect();

        let winners: Vec<String> = batch_results.iter().map(|r| r.winner_id.clone()).collect();
        let record = RoundRecord {
            round,
            population: population.to_vec(),
            batch_results,
            winners,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            round,
            winners = record.winners.len(),
            fallbacks = record.fallback_count(),
            elapsed_ms = record.elapsed_ms,
            "Round completed"
        );
        self.events.emit_lossy(TournamentEvent::RoundCompleted {
            run_id,
            round,
            winners: record.winners.len(),
            timestamp: chrono::Utc::now(),
        });

        record
    }
}
