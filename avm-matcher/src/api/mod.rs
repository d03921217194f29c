//! HTTP API handlers for avm-matcher

pub mod health;
pub mod matching;
pub mod sse;

pub use health::health_routes;
pub use matching::match_routes;
pub use sse::event_stream;
