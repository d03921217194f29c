//! External collaborators: metadata store, asset fetch, oracle, labeling

pub mod annotator;
pub mod asset_fetcher;
pub mod candidate_repository;
pub mod gemini_client;
pub mod oracle;

pub use annotator::{Annotator, StripAnnotator};
pub use asset_fetcher::{AssetFetcher, FetchError, HttpAssetFetcher};
pub use candidate_repository::{CandidateRepository, CandidateSummary, JsonlCandidateRepository, RepositoryError};
pub use gemini_client::{GeminiClient, GeminiClientConfig};
pub use oracle::{ClassifierOracle, OracleError, ProbeClassification};
