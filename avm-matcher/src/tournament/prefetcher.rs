//! Asset prefetch stage
//!
//! Fetches and decodes every candidate asset once, before any round runs.
//! Each id is an independent bounded fetch; failures drop the id with a
//! warning. The resulting cache is write-once: it is frozen before the first
//! round and only read afterwards.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::MatchError;
use crate::models::{CandidateAsset, DroppedAsset, PrefetchMetrics};
use crate::services::{AssetFetcher, CandidateRepository, FetchError};

/// Read-only id → asset cache
#[derive(Debug, Default)]
pub struct AssetCache {
    assets: HashMap<String, CandidateAsset>,
}

impl AssetCache {
    pub fn from_assets(assets: impl IntoIterator<Item = CandidateAsset>) -> Self {
        Self {
            assets: assets.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&CandidateAsset> {
        self.assets.get(id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Prefetch stage output
#[derive(Debug)]
pub struct PrefetchOutcome {
    pub cache: Arc<AssetCache>,
    /// Cached ids in input order
    pub population: Vec<String>,
    pub metrics: PrefetchMetrics,
}

pub struct AssetPrefetcher {
    repository: Arc<dyn CandidateRepository>,
    fetcher: Arc<dyn AssetFetcher>,
    max_concurrency: usize,
    fetch_timeout: Duration,
}

impl AssetPrefetcher {
    pub fn new(
        repository: Arc<dyn CandidateRepository>,
        fetcher: Arc<dyn AssetFetcher>,
        max_concurrency: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            fetcher,
            max_concurrency: max_concurrency.max(1),
            fetch_timeout,
        }
    }

    /// Fetch all ids; fails only when nothing could be cached
    pub async fn prefetch(&self, ids: &[String]) -> Result<PrefetchOutcome, MatchError> {
        let start = Instant::now();

        let mut seen = HashSet::new();
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        let requested = unique.len();

        info!(
            requested,
            concurrency = self.max_concurrency,
            timeout_ms = self.fetch_timeout.as_millis() as u64,
            "Prefetching candidate assets"
        );

        let outcomes: Vec<(String, Result<CandidateAsset, FetchError>)> =
            stream::iter(unique.iter().cloned())
                .map(|id| async move {
                    let result = self.fetch_one(&id).await;
                    (id, result)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

        let mut assets = HashMap::with_capacity(outcomes.len());
        let mut dropped = Vec::new();
        for (id, result) in outcomes {
            match result {
                Ok(asset) => {
                    assets.insert(id, asset);
                }
                Err(e) => {
                    warn!(candidate_id = %id, error = %e, "Dropping candidate: asset unavailable");
                    dropped.push(DroppedAsset {
                        candidate_id: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Completion order is arbitrary; keep the caller's order
        let population: Vec<String> = unique
            .into_iter()
            .filter(|id| assets.contains_key(id))
            .collect();
        dropped.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));

        let metrics = PrefetchMetrics {
            requested,
            cached: population.len(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            dropped,
        };

        info!(
            requested = metrics.requested,
            cached = metrics.cached,
            dropped = metrics.dropped.len(),
            elapsed_ms = metrics.elapsed_ms,
            "Prefetch complete"
        );

        if population.is_empty() {
            return Err(MatchError::NoAssetsAvailable { requested });
        }

        Ok(PrefetchOutcome {
            cache: Arc::new(AssetCache { assets }),
            population,
            metrics,
        })
    }

    /// Fetch and decode one asset within the per-fetch time bound
    async fn fetch_one(&self, id: &str) -> Result<CandidateAsset, FetchError> {
        let metadata = self
            .repository
            .metadata(id)
            .ok_or(FetchError::MissingLocator)?;
        let locator = metadata
            .source_locator
            .clone()
            .filter(|l| !l.trim().is_empty())
            .ok_or(FetchError::MissingLocator)?;

        let timeout = self.fetch_timeout;
        let work = async {
            let bytes = self.fetcher.fetch(&locator, timeout).await?;
            let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            Ok::<_, FetchError>(image)
        };

        let image = tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;

        Ok(CandidateAsset {
            id: id.to_string(),
            image: Arc::new(image),
            metadata,
        })
    }
}
