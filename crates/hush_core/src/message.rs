//! Message Types for Thread Communication
//!
//! Commands flow from callers -> control thread
//! Events flow from control thread -> callers

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::controller::EngineState;
use crate::error::EngineResult;
use crate::reconciler::ReconcileReport;
use crate::session::SessionId;
use crate::source::{SourceDeclaration, SourceId};

/// Commands sent to the engine's control thread
#[derive(Debug)]
pub enum Command {
    /// Acquire the device; the outcome is sent on `reply`
    Start { reply: Sender<EngineResult<()>> },

    Stop,

    /// Full replacement of the desired source list
    SourcesChanged(Vec<SourceDeclaration>),

    /// Master gain target (0.0 - 1.0)
    MasterGainChanged(f32),

    /// Request current state (triggers StateUpdate event)
    RequestState,

    /// Reply with a snapshot of the engine
    Snapshot { reply: Sender<EngineSnapshot> },

    Shutdown,
}

/// Point-in-time view of the engine for UI sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: EngineState,

    /// Sources with a live suppression unit, sorted
    pub live_sources: Vec<SourceId>,

    pub master_gain: f32,

    /// Active declarations in the most recent snapshot
    pub pending_sources: usize,

    pub session: Option<SessionId>,

    /// Output peaks (left, right) of the last rendered block
    pub peaks: (f32, f32),
}

/// Events sent from the control thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Device acquired, session running
    Started { device: String },

    Stopped,

    /// Capture could not start; the UI keeps working without audio
    DemoMode { reason: String },

    Error { message: String },

    /// A reconciliation pass changed the graph
    Reconciled {
        created: Vec<SourceId>,
        updated: Vec<SourceId>,
        released: Vec<SourceId>,
    },

    /// One source could not be applied; retried on the next snapshot
    SourceFailed { id: SourceId, message: String },

    /// Output peak levels, 0.0 - 1.0
    LevelUpdate { left: f32, right: f32 },

    StateUpdate(EngineSnapshot),
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }

    /// Periodic or on-request status that a newer event supersedes
    pub fn is_telemetry(&self) -> bool {
        matches!(self, Event::LevelUpdate { .. } | Event::StateUpdate(_))
    }

    /// Events describing a reconcile pass; empty for a no-op pass
    pub fn from_report(report: &ReconcileReport) -> Vec<Event> {
        let mut events = Vec::with_capacity(report.failed.len() + 1);
        if report.mutation_count() > 0 {
            events.push(Event::Reconciled {
                created: report.created.clone(),
                updated: report.updated.clone(),
                released: report.released.clone(),
            });
        }
        events.extend(report.failed.iter().map(|failure| Event::SourceFailed {
            id: failure.id.clone(),
            message: failure.error.to_string(),
        }));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::reconciler::SourceFailure;

    #[test]
    fn test_event_serialization() {
        let event = Event::LevelUpdate {
            left: 0.5,
            right: 0.7,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("LevelUpdate"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_demo_mode_payload() {
        let event = Event::DemoMode {
            reason: "permission denied".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"DemoMode""#));
        assert!(json.contains("permission denied"));
    }

    #[test]
    fn test_error_helper() {
        let event = Event::error(EngineError::GraphQueueFull);
        assert!(matches!(event, Event::Error { ref message } if message.contains("queue")));
    }

    #[test]
    fn test_telemetry_classification() {
        assert!(Event::LevelUpdate { left: 0.0, right: 0.0 }.is_telemetry());
        assert!(!Event::Stopped.is_telemetry());
        assert!(!Event::DemoMode { reason: String::new() }.is_telemetry());
    }

    #[test]
    fn test_events_from_report() {
        assert!(Event::from_report(&ReconcileReport::default()).is_empty());

        let report = ReconcileReport {
            created: vec![SourceId::new("a")],
            failed: vec![SourceFailure {
                id: SourceId::new("b"),
                error: EngineError::GraphCapacity {
                    id: SourceId::new("b"),
                    capacity: 1,
                },
            }],
            ..ReconcileReport::default()
        };
        let events = Event::from_report(&report);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Reconciled { ref created, .. } if created.len() == 1));
        assert!(matches!(events[1], Event::SourceFailed { ref id, .. } if id.as_str() == "b"));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = EngineSnapshot {
            state: EngineState::Running,
            live_sources: vec![SourceId::new("ac")],
            master_gain: 0.7,
            pending_sources: 1,
            session: None,
            peaks: (0.1, 0.2),
        };
        let json = serde_json::to_string(&Event::StateUpdate(snapshot.clone())).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Event::StateUpdate(snapshot));
    }
}
