//! # AVM Common Library
//!
//! Shared code for the avatar match workspace:
//! - Error type shared across crates
//! - TOML bootstrap configuration and API key resolution
//! - Tracing subscriber initialization
//! - Tournament event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
