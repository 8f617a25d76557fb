//! Engine Controller
//!
//! The single-threaded state machine behind [`crate::AudioEngine`]:
//!
//! ```text
//! Idle ──start()──▶ Starting ──ok──▶ Running ──stop()──▶ Stopping ──▶ Idle
//!                      │
//!                      └──DeviceUnavailable──▶ Idle
//! ```
//!
//! Only `Running` reconciles. Snapshots and master gain received in any
//! other state are kept as the pending desired state and applied on
//! entering `Running`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::CaptureBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::EngineSnapshot;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::session::{CaptureSessionManager, SessionHandle};
use crate::source::{SourceDeclaration, SourceId};

/// Facade lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl EngineState {
    fn to_u8(self) -> u8 {
        match self {
            EngineState::Idle => 0,
            EngineState::Starting => 1,
            EngineState::Running => 2,
            EngineState::Stopping => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::Stopping,
            _ => EngineState::Idle,
        }
    }
}

/// Engine state readable from any thread
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: EngineState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub fn load(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: EngineState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }
}

/// Serialized owner of the session manager and reconciler
pub struct EngineController {
    sessions: CaptureSessionManager,
    reconciler: Reconciler,
    state: Arc<StateCell>,
    session: Option<SessionHandle>,
    desired: Vec<SourceDeclaration>,
    master_gain: f32,
}

impl EngineController {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let master_gain = config.initial_master_gain;

        Ok(Self {
            sessions: CaptureSessionManager::new(backend, config),
            reconciler: Reconciler::new(),
            state: Arc::new(StateCell::new(EngineState::Idle)),
            session: None,
            desired: Vec::new(),
            master_gain,
        })
    }

    /// Acquire the device and materialize the pending desired state
    ///
    /// Blocks for the duration of device acquisition. Calling it while
    /// already running acquires nothing and changes nothing.
    pub fn start(&mut self) -> EngineResult<ReconcileReport> {
        if self.state() == EngineState::Running {
            let handle = self.sessions.start_with_gain(self.master_gain)?;
            debug!("Start ignored: session {} already running", handle.id());
            return Ok(ReconcileReport::default());
        }

        self.set_state(EngineState::Starting);
        let handle = match self.sessions.start_with_gain(self.master_gain) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Start failed, staying idle: {}", e);
                self.set_state(EngineState::Idle);
                return Err(e);
            }
        };

        self.session = Some(handle.clone());
        self.set_state(EngineState::Running);
        info!(
            "Engine running; applying {} pending sources",
            self.pending_count()
        );

        self.reconciler.reconcile(&self.desired, &handle)
    }

    /// Tear down every unit and release the device; always ends `Idle`
    ///
    /// Returns the sources whose units were released.
    pub fn stop(&mut self) -> Vec<SourceId> {
        if self.state() == EngineState::Idle && self.session.is_none() {
            return Vec::new();
        }
        self.set_state(EngineState::Stopping);

        let mut released = Vec::new();
        if let Some(session) = self.session.take() {
            match self.reconciler.teardown(&session) {
                Ok(ids) => released = ids,
                Err(e) => error!("Teardown failed: {}", e),
            }
            let leftover = self.sessions.stop();
            self.reconciler.forget_session(session.id());
            released.extend(leftover);
        } else {
            self.sessions.stop();
        }

        self.set_state(EngineState::Idle);
        info!("Engine idle ({} units released)", released.len());
        released
    }

    /// Record `snapshot` as the desired state and reconcile if running
    pub fn on_sources_changed(
        &mut self,
        snapshot: Vec<SourceDeclaration>,
    ) -> EngineResult<ReconcileReport> {
        self.desired = snapshot;

        match (&self.session, self.state()) {
            (Some(session), EngineState::Running) => {
                self.reconciler.reconcile(&self.desired, session)
            }
            _ => {
                debug!("Not running; {} sources pending", self.pending_count());
                Ok(ReconcileReport::default())
            }
        }
    }

    /// Record the master gain and ramp to it if running
    pub fn on_master_gain_changed(&mut self, value: f32) {
        if !value.is_finite() {
            warn!("Ignoring non-finite master gain");
            return;
        }
        self.master_gain = value.clamp(0.0, 1.0);
        if self.state() == EngineState::Running {
            self.sessions.set_master_gain(self.master_gain);
        }
    }

    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    /// Shared view of the state for other threads
    pub fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn desired(&self) -> &[SourceDeclaration] {
        &self.desired
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state(),
            live_sources: self.reconciler.live_ids(),
            master_gain: self.master_gain,
            pending_sources: self.pending_count(),
            session: self.session.as_ref().map(SessionHandle::id),
            peaks: self.session.as_ref().map_or((0.0, 0.0), SessionHandle::peaks),
        }
    }

    fn pending_count(&self) -> usize {
        let mut ids: Vec<&SourceId> = self
            .desired
            .iter()
            .filter(|decl| decl.active)
            .map(|decl| &decl.id)
            .collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state.load();
        if previous != state {
            debug!("Engine state {:?} -> {:?}", previous, state);
            self.state.store(state);
        }
    }
}

impl Drop for EngineController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `true` for errors that mean "no audio, keep the UI going"
pub fn is_demo_mode(err: &EngineError) -> bool {
    matches!(err, EngineError::DeviceUnavailable(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OfflineBackend;

    fn controller(backend: &OfflineBackend) -> EngineController {
        EngineController::new(Arc::new(backend.clone()), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_pending_state_applied_on_start() {
        let backend = OfflineBackend::new();
        let mut engine = controller(&backend);

        let report = engine
            .on_sources_changed(vec![SourceDeclaration::new("a", 120.0, 0.7)])
            .unwrap();
        assert!(report.is_noop());
        engine.on_master_gain_changed(0.4);
        assert_eq!(engine.snapshot().pending_sources, 1);
        assert!(engine.snapshot().live_sources.is_empty());

        let report = engine.start().unwrap();
        assert_eq!(report.created, vec![SourceId::new("a")]);
        assert_eq!(engine.state(), EngineState::Running);

        backend.render(&mut vec![1.0_f32; 64]);
        let session = engine.session().unwrap();
        assert_eq!(session.frames_rendered(), 32);
        assert!(session.peaks().0 > 0.0);
        assert_eq!(engine.snapshot().live_sources, vec![SourceId::new("a")]);
    }

    #[test]
    fn test_failed_start_returns_to_idle() {
        let backend = OfflineBackend::unavailable("no microphone");
        let mut engine = controller(&backend);

        let err = engine.start().unwrap_err();
        assert!(is_demo_mode(&err));
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.session().is_none());
    }

    #[test]
    fn test_start_while_running_does_not_reacquire() {
        let backend = OfflineBackend::new();
        let mut engine = controller(&backend);
        engine.start().unwrap();
        engine.start().unwrap();
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_stop_from_any_state() {
        let backend = OfflineBackend::new();
        let mut engine = controller(&backend);
        assert!(engine.stop().is_empty());
        assert_eq!(engine.state(), EngineState::Idle);

        engine
            .on_sources_changed(vec![
                SourceDeclaration::new("a", 120.0, 0.7),
                SourceDeclaration::new("b", 800.0, 0.6),
            ])
            .unwrap();
        engine.start().unwrap();

        let released = engine.stop();
        assert_eq!(released, vec![SourceId::new("a"), SourceId::new("b")]);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.reconciler().is_empty());
        assert!(!backend.is_held());

        assert!(engine.stop().is_empty());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_restart_restores_desired_state() {
        let backend = OfflineBackend::new();
        let mut engine = controller(&backend);
        engine
            .on_sources_changed(vec![SourceDeclaration::new("a", 120.0, 0.7)])
            .unwrap();
        engine.start().unwrap();
        engine.stop();

        let report = engine.start().unwrap();
        assert_eq!(report.created, vec![SourceId::new("a")]);
        assert_eq!(backend.open_count(), 2);
    }

    #[test]
    fn test_master_gain_clamped_and_recorded() {
        let backend = OfflineBackend::new();
        let mut engine = controller(&backend);
        engine.on_master_gain_changed(3.0);
        assert_eq!(engine.master_gain(), 1.0);
        engine.on_master_gain_changed(f32::NAN);
        assert_eq!(engine.master_gain(), 1.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_units: 0,
            ..EngineConfig::default()
        };
        let result = EngineController::new(Arc::new(OfflineBackend::new()), config);
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn test_state_cell_round_trip() {
        let cell = StateCell::new(EngineState::Idle);
        for state in [
            EngineState::Starting,
            EngineState::Running,
            EngineState::Stopping,
            EngineState::Idle,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }
}
