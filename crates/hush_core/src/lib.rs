//! Hush Core - Suppression Engine
//!
//! This crate turns a declarative list of noise sources into a live
//! processing graph on the microphone signal:
//! - Capture session management (device acquisition via CPAL)
//! - Reconciliation of declared sources against live suppression units
//! - Lock-free hand-off of graph edits to the audio callback
//! - A threaded facade with a command/event interface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Caller / UI                           │
//! │   snapshots, master gain ──commands──▶ AudioEngine          │
//! │                          ◀──events───                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Thread                          │
//! │   EngineController ─▶ Reconciler ─▶ SessionHandle           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ rtrb (GraphCommand)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │   Mic ──rtrb──▶ unit₁ ▶ … ▶ unitₙ ▶ master ──▶ Output       │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod config;
mod controller;
mod device;
mod engine;
mod error;
mod graph;
mod message;
mod reconciler;
mod session;
mod source;
mod unit;

pub use backend::{AcquisitionGate, CaptureBackend, CpalBackend, DeviceStream, OfflineBackend};
pub use config::{EngineConfig, SmoothingConfig, StreamConfig};
pub use controller::{is_demo_mode, EngineController, EngineState, StateCell};
pub use device::{AudioDevice, DeviceType};
pub use engine::{AudioEngine, PendingStart};
pub use error::{EngineError, EngineResult};
pub use graph::{GraphRenderer, RenderMeters, UnitKey};
pub use message::{Command, EngineSnapshot, Event};
pub use reconciler::{ReconcileReport, Reconciler, SourceFailure};
pub use session::{CaptureSessionManager, SessionHandle, SessionId, SessionState};
pub use source::{
    NoiseKind, SourceDeclaration, SourceId, SuppressionParams, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ,
};
pub use unit::SuppressionUnitHandle;

// Re-export DSP constants for convenience
pub use hush_dsp::{compensation_gain, COMPENSATION_SLOPE, NOTCH_Q};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let _config = EngineConfig::default();
        let _decl = SourceDeclaration::from_preset("ac", NoiseKind::Ac);
        let _backend = OfflineBackend::new();
        assert!((compensation_gain(0.5) - 0.8).abs() < 1e-6);
    }
}
