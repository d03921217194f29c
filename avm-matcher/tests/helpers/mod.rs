//! Shared fakes and fixtures for avm-matcher integration tests
//!
//! Candidate images are solid colors; the red channel is the candidate's
//! "similarity". `ScriptedOracle` in `Brightest` mode reads the top-left
//! pixel of each labeled candidate, so its choice does not depend on display
//! order.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avm_common::events::EventBus;
use avm_matcher::models::{AgeGroup, CandidateMetadata, Gender, ProbeAsset};
use avm_matcher::services::{
    AssetFetcher, ClassifierOracle, FetchError, JsonlCandidateRepository, OracleError,
    ProbeClassification, StripAnnotator,
};
use avm_matcher::tournament::{Shuffler, TournamentController, TournamentSettings};

// ============================================================================
// Images
// ============================================================================

pub fn solid_image(red: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([red, 0, 0])))
}

pub fn solid_png(red: u8) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    solid_image(red)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("PNG encode");
    buffer.into_inner()
}

pub fn probe() -> ProbeAsset {
    ProbeAsset::from_image(solid_image(128), "probe.png")
}

fn top_left_red(image: &DynamicImage) -> u8 {
    image.to_rgb8().get_pixel(0, 0).0[0]
}

// ============================================================================
// Candidate records
// ============================================================================

pub fn locator(id: &str) -> String {
    format!("mem://{}", id)
}

pub fn record(id: &str, gender: Gender, age_group: AgeGroup) -> CandidateMetadata {
    CandidateMetadata {
        candidate_id: id.to_string(),
        gender,
        age_group,
        filename: Some(format!("{}.png", id)),
        source_locator: Some(locator(id)),
    }
}

/// `n` female adults `c0..c{n-1}`
pub fn female_adults(n: usize) -> Vec<CandidateMetadata> {
    (0..n)
        .map(|i| record(&format!("c{}", i), Gender::Female, AgeGroup::Adult))
        .collect()
}

pub fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("c{}", i)).collect()
}

pub fn female_adult() -> Option<ProbeClassification> {
    Some(ProbeClassification {
        gender: Gender::Female,
        is_minor: false,
    })
}

// ============================================================================
// Concurrency tracking
// ============================================================================

#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    pub fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { tracker: self }
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard<'a> {
    tracker: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Fetcher
// ============================================================================

#[derive(Debug, Clone)]
pub enum FetchBehavior {
    Bytes(Vec<u8>),
    Fail(FetchError),
    Slow(Duration, Vec<u8>),
}

/// In-memory fetcher keyed by `mem://<id>` locators
#[derive(Debug, Default)]
pub struct FakeFetcher {
    behaviors: HashMap<String, FetchBehavior>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub in_flight: InFlight,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every id in `ids` gets a distinct red value, brightest last
    pub fn with_images(mut self, ids: &[String]) -> Self {
        for (i, id) in ids.iter().enumerate() {
            let red = (10 + i * 7).min(255) as u8;
            self.behaviors
                .insert(id.clone(), FetchBehavior::Bytes(solid_png(red)));
        }
        self
    }

    pub fn with_image(mut self, id: &str, red: u8) -> Self {
        self.behaviors
            .insert(id.to_string(), FetchBehavior::Bytes(solid_png(red)));
        self
    }

    pub fn with_bytes(mut self, id: &str, bytes: Vec<u8>) -> Self {
        self.behaviors
            .insert(id.to_string(), FetchBehavior::Bytes(bytes));
        self
    }

    pub fn with_failure(mut self, id: &str) -> Self {
        self.behaviors.insert(
            id.to_string(),
            FetchBehavior::Fail(FetchError::Status(404)),
        );
        self
    }

    pub fn with_slow(mut self, id: &str, delay: Duration, red: u8) -> Self {
        self.behaviors
            .insert(id.to_string(), FetchBehavior::Slow(delay, solid_png(red)));
        self
    }

    /// Delay applied to every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, locator: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let id = locator.strip_prefix("mem://").unwrap_or(locator);
        match self.behaviors.get(id) {
            Some(FetchBehavior::Bytes(bytes)) => Ok(bytes.clone()),
            Some(FetchBehavior::Fail(e)) => Err(e.clone()),
            Some(FetchBehavior::Slow(delay, bytes)) => {
                tokio::time::sleep(*delay).await;
                Ok(bytes.clone())
            }
            None => Err(FetchError::Status(404)),
        }
    }
}

// ============================================================================
// Oracle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareMode {
    /// Pick the candidate with the highest red value
    Brightest,
    AlwaysError,
    Fixed(i64),
    Panic,
    /// Never answers within any reasonable timeout
    Hang,
}

#[derive(Debug)]
pub struct ScriptedOracle {
    mode: CompareMode,
    classification: Option<ProbeClassification>,
    hang_classify: bool,
    delay: Duration,
    pub compare_calls: AtomicUsize,
    pub classify_calls: AtomicUsize,
    pub in_flight: InFlight,
}

impl ScriptedOracle {
    pub fn new(mode: CompareMode, classification: Option<ProbeClassification>) -> Self {
        Self {
            mode,
            classification,
            hang_classify: false,
            delay: Duration::ZERO,
            compare_calls: AtomicUsize::new(0),
            classify_calls: AtomicUsize::new(0),
            in_flight: InFlight::default(),
        }
    }

    pub fn brightest() -> Self {
        Self::new(CompareMode::Brightest, female_adult())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Classification never answers
    pub fn with_hanging_classifier(mut self) -> Self {
        self.hang_classify = true;
        self
    }

    pub fn compare_calls(&self) -> usize {
        self.compare_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierOracle for ScriptedOracle {
    async fn classify_probe(&self, _probe: &DynamicImage) -> Result<ProbeClassification, OracleError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_classify {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.classification
            .ok_or_else(|| OracleError::Api {
                status: 503,
                message: "classifier unavailable".to_string(),
            })
    }

    async fn compare_batch(
        &self,
        _labeled_probe: &DynamicImage,
        candidates: &[DynamicImage],
    ) -> Result<i64, OracleError> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.mode {
            CompareMode::Brightest => {
                let mut best = 0;
                for (i, image) in candidates.iter().enumerate() {
                    if top_left_red(image) > top_left_red(&candidates[best]) {
                        best = i;
                    }
                }
                Ok(best as i64 + 1)
            }
            CompareMode::AlwaysError => Err(OracleError::Network("connection reset".to_string())),
            CompareMode::Fixed(ordinal) => Ok(ordinal),
            CompareMode::Panic => panic!("oracle exploded"),
            CompareMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(1)
            }
        }
    }
}

// ============================================================================
// Shufflers
// ============================================================================

pub struct IdentityShuffler;

impl Shuffler for IdentityShuffler {
    fn permute(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }
}

pub struct ReverseShuffler;

impl Shuffler for ReverseShuffler {
    fn permute(&self, len: usize) -> Vec<usize> {
        (0..len).rev().collect()
    }
}

// ============================================================================
// Controller
// ============================================================================

pub fn test_settings(batch_size: usize) -> TournamentSettings {
    TournamentSettings {
        batch_size,
        max_fetch_concurrency: 10,
        max_compare_concurrency: 10,
        fetch_timeout: Duration::from_millis(500),
        oracle_timeout: Duration::from_secs(2),
        inter_round_delay: Duration::ZERO,
    }
}

pub fn controller(
    records: Vec<CandidateMetadata>,
    fetcher: Arc<FakeFetcher>,
    oracle: Arc<ScriptedOracle>,
    shuffler: Arc<dyn Shuffler>,
    settings: TournamentSettings,
) -> TournamentController {
    TournamentController::new(
        Arc::new(JsonlCandidateRepository::from_records(records)),
        fetcher,
        oracle,
        Arc::new(StripAnnotator::default()),
        shuffler,
        settings,
        EventBus::default(),
    )
}
