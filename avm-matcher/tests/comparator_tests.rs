//! Comparator and round executor behavior

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use avm_common::events::{DecisionStatus, EventBus, TournamentEvent};
use avm_matcher::models::{AgeGroup, CandidateAsset, FallbackReason, Gender};
use avm_matcher::services::{Annotator, StripAnnotator};
use avm_matcher::tournament::{
    AssetCache, Batch, BatchBuilder, Comparator, RandomShuffler, RoundExecutor, Shuffler,
};
use helpers::*;
use uuid::Uuid;

fn asset(id: &str, red: u8) -> CandidateAsset {
    CandidateAsset {
        id: id.to_string(),
        image: Arc::new(solid_image(red)),
        metadata: record(id, Gender::Female, AgeGroup::Adult),
    }
}

fn cache(assets: &[(&str, u8)]) -> AssetCache {
    AssetCache::from_assets(assets.iter().map(|(id, red)| asset(id, *red)))
}

fn batch(ids: &[&str]) -> Batch {
    Batch::new(0, ids.iter().map(|s| s.to_string()).collect())
}

fn comparator(oracle: ScriptedOracle, shuffler: Arc<dyn Shuffler>) -> Comparator {
    Comparator::new(
        Arc::new(oracle),
        Arc::new(StripAnnotator::default()),
        shuffler,
        Duration::from_secs(2),
    )
}

// ============================================================================
// Permutation handling
// ============================================================================

#[tokio::test]
async fn test_winner_is_stable_under_permutation() {
    let cache = cache(&[("a", 200), ("b", 10), ("c", 50)]);
    let batch = batch(&["a", "b", "c"]);

    let identity = comparator(ScriptedOracle::brightest(), Arc::new(IdentityShuffler))
        .compare(&probe(), &batch, &cache)
        .await;
    let reversed = comparator(ScriptedOracle::brightest(), Arc::new(ReverseShuffler))
        .compare(&probe(), &batch, &cache)
        .await;

    assert_eq!(identity.winner_id, "a");
    assert_eq!(reversed.winner_id, "a");
    assert_eq!(identity.winner_ordinal, 1);
    assert_eq!(reversed.winner_ordinal, 3);
    assert_eq!(reversed.resolved_ids, vec!["c", "b", "a"]);
    assert_eq!(identity.status, DecisionStatus::Oracle);
}

#[tokio::test]
async fn test_random_permutation_maps_back_exactly() {
    let cache = cache(&[("a", 10), ("b", 20), ("c", 250), ("d", 40), ("e", 30)]);
    let batch = batch(&["a", "b", "c", "d", "e"]);
    let comparator = comparator(ScriptedOracle::brightest(), Arc::new(RandomShuffler));

    for _ in 0..25 {
        let result = comparator.compare(&probe(), &batch, &cache).await;
        assert_eq!(result.winner_id, "c");
        assert_eq!(result.resolved_ids[result.winner_ordinal - 1], "c");
        assert_eq!(result.batch_ids, vec!["a", "b", "c", "d", "e"]);

        let mut shown = result.resolved_ids.clone();
        shown.sort();
        assert_eq!(shown, vec!["a", "b", "c", "d", "e"]);
    }
}

// ============================================================================
// Fallbacks
// ============================================================================

#[tokio::test]
async fn test_zero_negative_and_too_large_ordinals_fall_back() {
    let cache = cache(&[("a", 10), ("b", 20), ("c", 30)]);
    let batch = batch(&["a", "b", "c"]);

    for ordinal in [0i64, 4, -1, -3] {
        let result = comparator(
            ScriptedOracle::new(CompareMode::Fixed(ordinal), female_adult()),
            Arc::new(ReverseShuffler),
        )
        .compare(&probe(), &batch, &cache)
        .await;

        assert_eq!(result.status, DecisionStatus::Fallback);
        assert_eq!(result.winner_id, "c");
        assert_eq!(result.winner_ordinal, 1);
        assert_eq!(
            result.fallback_reason,
            Some(FallbackReason::OrdinalOutOfRange(ordinal))
        );
    }
}

#[tokio::test]
async fn test_oracle_error_is_flagged() {
    let cache = cache(&[("a", 10), ("b", 20)]);
    let result = comparator(
        ScriptedOracle::new(CompareMode::AlwaysError, female_adult()),
        Arc::new(IdentityShuffler),
    )
    .compare(&probe(), &batch(&["a", "b"]), &cache)
    .await;

    assert!(result.is_fallback());
    assert_eq!(result.winner_id, "a");
    match result.fallback_reason {
        Some(FallbackReason::OracleError(msg)) => assert!(msg.contains("connection reset")),
        other => panic!("unexpected reason: {:?}", other),
    }
}

struct PanickingAnnotator;

impl Annotator for PanickingAnnotator {
    fn label(&self, _image: &image::DynamicImage, _text: &str) -> image::DynamicImage {
        panic!("annotator exploded");
    }
}

#[tokio::test]
async fn test_labeling_panic_falls_back_without_oracle_call() {
    let oracle = Arc::new(ScriptedOracle::brightest());
    let comparator = Comparator::new(
        oracle.clone(),
        Arc::new(PanickingAnnotator),
        Arc::new(ReverseShuffler),
        Duration::from_secs(2),
    );

    let cache = cache(&[("a", 10), ("b", 200)]);
    let result = comparator.compare(&probe(), &batch(&["a", "b"]), &cache).await;

    assert_eq!(result.status, DecisionStatus::Fallback);
    assert_eq!(result.winner_id, "b");
    assert_eq!(result.winner_ordinal, 1);
    assert!(matches!(result.fallback_reason, Some(FallbackReason::TaskFailed(_))));
    assert_eq!(oracle.compare_calls(), 0);
}

#[tokio::test]
async fn test_uncached_ids_are_skipped() {
    let cache = cache(&[("b", 10), ("c", 90)]);
    let result = comparator(ScriptedOracle::brightest(), Arc::new(IdentityShuffler))
        .compare(&probe(), &batch(&["a", "b", "c"]), &cache)
        .await;

    assert_eq!(result.resolved_ids, vec!["b", "c"]);
    assert_eq!(result.winner_id, "c");
    assert_eq!(result.winner_ordinal, 2);
    assert_eq!(result.batch_ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_nothing_resolved_uses_first_batch_id() {
    let oracle = Arc::new(ScriptedOracle::brightest());
    let comparator = Comparator::new(
        oracle.clone(),
        Arc::new(StripAnnotator::default()),
        Arc::new(RandomShuffler),
        Duration::from_secs(2),
    );

    let result = comparator
        .compare(&probe(), &batch(&["x", "y"]), &cache(&[]))
        .await;

    assert_eq!(result.winner_id, "x");
    assert_eq!(result.winner_ordinal, 0);
    assert!(result.resolved_ids.is_empty());
    assert_eq!(result.fallback_reason, Some(FallbackReason::NoResolvedAssets));
    assert_eq!(oracle.compare_calls(), 0);
}

// ============================================================================
// Round executor
// ============================================================================

#[tokio::test]
async fn test_round_results_in_batch_order_with_events() {
    let population: Vec<String> = ids(6);
    let assets: Vec<(String, u8)> = population
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), (100 - i * 10) as u8))
        .collect();
    let cache = Arc::new(AssetCache::from_assets(
        assets.iter().map(|(id, red)| asset(id, *red)),
    ));

    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let comparator = Arc::new(comparator(
        ScriptedOracle::brightest().with_delay(Duration::from_millis(5)),
        Arc::new(RandomShuffler),
    ));
    let executor = RoundExecutor::new(comparator, 10, events);

    let run_id = Uuid::new_v4();
    let record = executor
        .execute(
            run_id,
            1,
            &population,
            BatchBuilder::new(2).unwrap(),
            &probe(),
            &cache,
        )
        .await;

    assert_eq!(record.round, 1);
    assert_eq!(record.population, population);
    assert_eq!(record.winners, vec!["c0", "c2", "c4"]);
    let indices: Vec<usize> = record.batch_results.iter().map(|r| r.batch_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let mut decided = 0;
    let mut started = false;
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            TournamentEvent::RoundStarted { batch_count, population, .. } => {
                assert_eq!(batch_count, 3);
                assert_eq!(population, 6);
                started = true;
            }
            TournamentEvent::BatchDecided { round, .. } => {
                assert_eq!(round, 1);
                decided += 1;
            }
            TournamentEvent::RoundCompleted { winners, .. } => {
                assert_eq!(winners, 3);
                completed = true;
            }
            _ => {}
        }
    }
    assert!(started && completed);
    assert_eq!(decided, 3);
}
