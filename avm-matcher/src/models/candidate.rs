//! Candidate and probe data model
//!
//! Metadata records are typed: gender and age group carry an explicit
//! `Unknown` sentinel instead of relying on absent keys.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::MatchError;

/// Candidate / probe gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    /// Lenient parse: case-insensitive, anything unrecognized is `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Gender::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }
}

impl From<Option<String>> for Gender {
    fn from(value: Option<String>) -> Self {
        value.as_deref().map(Gender::parse).unwrap_or_default()
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate / probe age group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum AgeGroup {
    Adult,
    Child,
    #[default]
    Unknown,
}

impl AgeGroup {
    /// Lenient parse: case-insensitive, anything unrecognized is `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "adult" => AgeGroup::Adult,
            "child" => AgeGroup::Child,
            _ => AgeGroup::Unknown,
        }
    }

    /// Age group for a classified probe
    pub fn from_minor(is_minor: bool) -> Self {
        if is_minor {
            AgeGroup::Child
        } else {
            AgeGroup::Adult
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, AgeGroup::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgeGroup::Adult => "adult",
            AgeGroup::Child => "child",
            AgeGroup::Unknown => "unknown",
        }
    }
}

impl From<Option<String>> for AgeGroup {
    fn from(value: Option<String>) -> Self {
        value.as_deref().map(AgeGroup::parse).unwrap_or_default()
    }
}

impl std::fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate metadata record
///
/// Accepts the metadata store's field names (`avatar_id`, `public_url`) on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Stable candidate id
    #[serde(alias = "avatar_id", alias = "id")]
    pub candidate_id: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub age_group: AgeGroup,
    #[serde(default)]
    pub filename: Option<String>,
    /// Where the asset bytes live (URL or path)
    #[serde(default, alias = "public_url")]
    pub source_locator: Option<String>,
}

/// A fetched and decoded candidate
///
/// Immutable once cached; the image is shared, never copied, between rounds.
#[derive(Debug, Clone)]
pub struct CandidateAsset {
    pub id: String,
    pub image: Arc<DynamicImage>,
    pub metadata: CandidateMetadata,
}

/// The single input image for a run
#[derive(Debug, Clone)]
pub struct ProbeAsset {
    pub image: Arc<DynamicImage>,
    /// Human-readable origin (path or "upload")
    pub source: String,
}

impl ProbeAsset {
    pub fn from_image(image: DynamicImage, source: impl Into<String>) -> Self {
        Self {
            image: Arc::new(image),
            source: source.into(),
        }
    }

    /// Decode a probe from raw bytes
    pub fn from_bytes(bytes: &[u8], source: impl Into<String>) -> Result<Self, MatchError> {
        let source = source.into();
        let image = image::load_from_memory(bytes)
            .map_err(|e| MatchError::Input(format!("Failed to decode probe image {}: {}", source, e)))?;
        Ok(Self::from_image(image, source))
    }

    /// Load and decode a probe from disk
    pub fn load(path: &Path) -> Result<Self, MatchError> {
        let bytes = std::fs::read(path).map_err(|e| {
            MatchError::Input(format!("Failed to read probe image {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes, path.display().to_string())
    }
}

/// Probe characteristics used to filter candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeProfile {
    pub gender: Gender,
    pub is_minor: bool,
    pub age_group: AgeGroup,
    /// False when classification failed and defaults were used
    pub classified: bool,
}

impl ProbeProfile {
    /// Degraded profile used when the oracle cannot classify the probe
    pub fn unclassified() -> Self {
        Self {
            gender: Gender::Unknown,
            is_minor: false,
            age_group: AgeGroup::Adult,
            classified: false,
        }
    }
}
