//! Event types for the AVM event system
//!
//! Provides tournament progress events and the EventBus used to broadcast them.

mod tournament_types;

pub use tournament_types::{DecisionStatus, TournamentState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tournament progress events
///
/// Events are broadcast via EventBus and serialize to tagged JSON, so a
/// front-end can stream them as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TournamentEvent {
    /// Controller entered a new state
    StateChanged {
        run_id: Uuid,
        state: TournamentState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Probe classification finished (possibly degraded)
    ProbeClassified {
        run_id: Uuid,
        gender: String,
        is_minor: bool,
        /// False when classification failed and defaults were used
        classified: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Candidate filter applied
    CandidatesFiltered {
        run_id: Uuid,
        candidate_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Prefetch stage finished
    PrefetchCompleted {
        run_id: Uuid,
        requested: usize,
        cached: usize,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Round started
    RoundStarted {
        run_id: Uuid,
        round: u32,
        population: usize,
        batch_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One batch decided
    BatchDecided {
        run_id: Uuid,
        round: u32,
        winner_id: String,
        status: DecisionStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Round finished (barrier reached)
    RoundCompleted {
        run_id: Uuid,
        round: u32,
        winners: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tournament finished with a winner
    TournamentCompleted {
        run_id: Uuid,
        winner_id: Option<String>,
        total_rounds: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tournament aborted
    TournamentFailed {
        run_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TournamentEvent {
    /// Variant name, used as the SSE event type
    pub fn event_type(&self) -> &'static str {
        match self {
            TournamentEvent::StateChanged { .. } => "StateChanged",
            TournamentEvent::ProbeClassified { .. } => "ProbeClassified",
            TournamentEvent::CandidatesFiltered { .. } => "CandidatesFiltered",
            TournamentEvent::PrefetchCompleted { .. } => "PrefetchCompleted",
            TournamentEvent::RoundStarted { .. } => "RoundStarted",
            TournamentEvent::BatchDecided { .. } => "BatchDecided",
            TournamentEvent::RoundCompleted { .. } => "RoundCompleted",
            TournamentEvent::TournamentCompleted { .. } => "TournamentCompleted",
            TournamentEvent::TournamentFailed { .. } => "TournamentFailed",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            TournamentEvent::StateChanged { run_id, .. }
            | TournamentEvent::ProbeClassified { run_id, .. }
            | TournamentEvent::CandidatesFiltered { run_id, .. }
            | TournamentEvent::PrefetchCompleted { run_id, .. }
            | TournamentEvent::RoundStarted { run_id, .. }
            | TournamentEvent::BatchDecided { run_id, .. }
            | TournamentEvent::RoundCompleted { run_id, .. }
            | TournamentEvent::TournamentCompleted { run_id, .. }
            | TournamentEvent::TournamentFailed { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for tournament events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TournamentEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow receivers
    /// start missing old events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TournamentEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TournamentEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_before_subscribe_are_not_replayed() {
        let bus = EventBus::new(10);
        bus.emit_lossy(TournamentEvent::TournamentFailed {
            run_id: Uuid::new_v4(),
            message: "nobody listening".to_string(),
            timestamp: chrono::Utc::now(),
        });
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(TournamentEvent::RoundStarted {
            run_id: Uuid::new_v4(),
            round: 1,
            population: 7,
            batch_count: 3,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            TournamentEvent::RoundStarted { round, population, batch_count, .. } => {
                assert_eq!(round, 1);
                assert_eq!(population, 7);
                assert_eq!(batch_count, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TournamentEvent::BatchDecided {
            run_id: Uuid::nil(),
            round: 2,
            winner_id: "a1".to_string(),
            status: DecisionStatus::Fallback,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "BatchDecided");
        assert_eq!(event.run_id(), Uuid::nil());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BatchDecided");
        assert_eq!(json["status"], "FALLBACK");
    }
}
