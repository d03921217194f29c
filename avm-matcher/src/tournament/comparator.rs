//! Single-batch comparison
//!
//! Resolves a batch against the cache, shows it to the oracle in a random
//! order with visible ordinal labels, and maps the answer back to a stable id.
//! Every failure path produces a FALLBACK result; `compare` never errors.

use image::DynamicImage;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::batch_builder::Batch;
use super::prefetcher::AssetCache;
use crate::models::{BatchResult, CandidateAsset, FallbackReason, ProbeAsset};
use crate::services::{Annotator, ClassifierOracle};

/// Label composited onto the probe
pub const PROBE_LABEL: &str = "Real Photo";

/// Permutation source for batch display order
pub trait Shuffler: Send + Sync {
    /// A permutation of `0..len`; `result[i]` is the source index shown at position `i`
    fn permute(&self, len: usize) -> Vec<usize>;
}

/// Uniform random permutation from the thread RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomShuffler;

impl Shuffler for RandomShuffler {
    fn permute(&self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rand::thread_rng());
        order
    }
}

pub struct Comparator {
    oracle: Arc<dyn ClassifierOracle>,
    annotator: Arc<dyn Annotator>,
    shuffler: Arc<dyn Shuffler>,
    timeout: Duration,
}

impl Comparator {
    pub fn new(
        oracle: Arc<dyn ClassifierOracle>,
        annotator: Arc<dyn Annotator>,
        shuffler: Arc<dyn Shuffler>,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            annotator,
            shuffler,
            timeout,
        }
    }

    pub async fn compare(&self, probe: &ProbeAsset, batch: &Batch, cache: &AssetCache) -> BatchResult {
        let batch_ids = batch.ids().to_vec();

        let resolved: Vec<&CandidateAsset> = batch
            .ids()
            .iter()
            .filter_map(|id| {
                let asset = cache.get(id);
                if asset.is_none() {
                    warn!(candidate_id = %id, batch = batch.index(), "Batch id not in asset cache");
                }
                asset
            })
            .collect();

        if resolved.is_empty() {
            warn!(batch = batch.index(), "No cached assets in batch, using first id");
            return BatchResult::first_id_fallback(
                batch.index(),
                batch_ids,
                FallbackReason::NoResolvedAssets,
            );
        }

        let order = self.permutation(resolved.len());
        let permuted: Vec<&CandidateAsset> = order.iter().map(|&i| resolved[i]).collect();
        let resolved_ids: Vec<String> = permuted.iter().map(|a| a.id.clone()).collect();

        // Compositing runs on the blocking pool
        let annotator = Arc::clone(&self.annotator);
        let shown: Vec<Arc<DynamicImage>> = permuted.iter().map(|a| Arc::clone(&a.image)).collect();
        let probe_image = Arc::clone(&probe.image);
        let labeling = tokio::task::spawn_blocking(move || {
            let labeled: Vec<DynamicImage> = shown
                .iter()
                .enumerate()
                .map(|(pos, image)| annotator.label(image, &(pos + 1).to_string()))
                .collect();
            (annotator.label(&probe_image, PROBE_LABEL), labeled)
        })
        .await;

        let k = resolved_ids.len();
        let reason = match labeling {
            Ok((labeled_probe, labeled)) => {
                let answer = tokio::time::timeout(
                    self.timeout,
                    self.oracle.compare_batch(&labeled_probe, &labeled),
                )
                .await;

                match answer {
                    Ok(Ok(ordinal)) => match usize::try_from(ordinal) {
                        Ok(n) if (1..=k).contains(&n) => {
                            debug!(
                                batch = batch.index(),
                                ordinal = n,
                                winner = %resolved_ids[n - 1],
                                "Oracle decided batch"
                            );
                            return BatchResult::oracle(batch.index(), batch_ids, resolved_ids, n);
                        }
                        _ => FallbackReason::OrdinalOutOfRange(ordinal),
                    },
                    Ok(Err(e)) => FallbackReason::OracleError(e.to_string()),
                    Err(_) => FallbackReason::OracleTimeout,
                }
            }
            Err(e) => FallbackReason::TaskFailed(format!("labeling failed: {}", e)),
        };

        warn!(
            batch = batch.index(),
            batch_size = k,
            reason = %reason,
            "Oracle decision unavailable, using first displayed candidate"
        );
        BatchResult::permuted_fallback(batch.index(), batch_ids, resolved_ids, reason)
    }

    /// Shuffler output, or identity if it is not a permutation of `0..len`
    fn permutation(&self, len: usize) -> Vec<usize> {
        let order = self.shuffler.permute(len);
        let mut seen = vec![false; len];
        let valid = order.len() == len
            && order
                .iter()
                .all(|&i| i < len && !std::mem::replace(&mut seen[i], true));
        if valid {
            order
        } else {
            warn!(len, "Shuffler returned an invalid permutation, using identity order");
            (0..len).collect()
        }
    }
}
