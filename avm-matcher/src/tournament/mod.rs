//! Tournament elimination engine

pub mod batch_builder;
pub mod comparator;
pub mod controller;
pub mod prefetcher;
pub mod round_executor;

pub use batch_builder::{Batch, BatchBuilder};
pub use comparator::{Comparator, RandomShuffler, Shuffler, PROBE_LABEL};
pub use controller::{TournamentController, TournamentSettings};
pub use prefetcher::{AssetCache, AssetPrefetcher, PrefetchOutcome};
pub use round_executor::RoundExecutor;
