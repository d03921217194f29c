//! Candidate metadata repository
//!
//! The metadata store is a flat JSONL file, one record per line, keyed by
//! candidate id. Blank lines are skipped; malformed lines and duplicate ids
//! are skipped with a warning so one bad record never blocks a run.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{AgeGroup, CandidateMetadata, Gender};

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Failed to read metadata file {path}: {message}")]
    Io { path: String, message: String },
}

/// Candidate metadata lookup
///
/// `Unknown` (or `None`) criteria act as wildcards.
pub trait CandidateRepository: Send + Sync {
    /// Candidate ids matching the criteria, in store order
    fn ids_by_criteria(&self, gender: Option<Gender>, age_group: Option<AgeGroup>) -> Vec<String>;

    /// Metadata for one id, if known
    fn metadata(&self, id: &str) -> Option<CandidateMetadata>;

    /// Population summary
    fn summary(&self) -> CandidateSummary {
        let ids = self.ids_by_criteria(None, None);
        let records = ids.iter().filter_map(|id| self.metadata(id));
        CandidateSummary::from_records(records)
    }
}

/// Population summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandidateSummary {
    pub total: usize,
    pub gender_distribution: BTreeMap<String, usize>,
    pub age_group_distribution: BTreeMap<String, usize>,
}

impl CandidateSummary {
    fn from_records(records: impl Iterator<Item = CandidateMetadata>) -> Self {
        let mut summary = CandidateSummary::default();
        for record in records {
            summary.total += 1;
            *summary
                .gender_distribution
                .entry(record.gender.to_string())
                .or_insert(0) += 1;
            *summary
                .age_group_distribution
                .entry(record.age_group.to_string())
                .or_insert(0) += 1;
        }
        summary
    }
}

/// In-memory repository backed by a JSONL metadata file
#[derive(Debug, Clone, Default)]
pub struct JsonlCandidateRepository {
    records: Vec<CandidateMetadata>,
    index: HashMap<String, usize>,
}

impl JsonlCandidateRepository {
    /// Load records from a JSONL file
    pub fn load(path: &Path) -> Result<Self, RepositoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| RepositoryError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CandidateMetadata>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed metadata record"
                ),
            }
        }

        let repository = Self::from_records(records);
        info!(
            path = %path.display(),
            candidates = repository.len(),
            "Loaded candidate metadata"
        );
        Ok(repository)
    }

    /// Build from already-parsed records (first occurrence of an id wins)
    pub fn from_records(records: Vec<CandidateMetadata>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.candidate_id) {
                warn!(candidate_id = %record.candidate_id, "Duplicate candidate id, keeping first record");
                continue;
            }
            index.insert(record.candidate_id.clone(), kept.len());
            kept.push(record);
        }
        Self { records: kept, index }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CandidateRepository for JsonlCandidateRepository {
    fn ids_by_criteria(&self, gender: Option<Gender>, age_group: Option<AgeGroup>) -> Vec<String> {
        let gender = gender.filter(|g| g.is_known());
        let age_group = age_group.filter(|a| a.is_known());

        self.records
            .iter()
            .filter(|r| gender.map_or(true, |g| r.gender == g))
            .filter(|r| age_group.map_or(true, |a| r.age_group == a))
            .map(|r| r.candidate_id.clone())
            .collect()
    }

    fn metadata(&self, id: &str) -> Option<CandidateMetadata> {
        self.index.get(id).map(|&i| self.records[i].clone())
    }

    fn summary(&self) -> CandidateSummary {
        CandidateSummary::from_records(self.records.iter().cloned())
    }
}
