//! Capture Session Management
//!
//! A session is one acquisition of the capture device plus the processing
//! graph built on it. [`CaptureSessionManager`] owns the lifecycle;
//! [`SessionHandle`] is the cheap, cloneable token the reconciler and unit
//! handles use to reach the graph.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hush_dsp::{ProcessContext, SuppressionUnit};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{CaptureBackend, DeviceStream};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{self, GraphControl, UnitKey};
use crate::source::{SourceId, SuppressionParams};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Active,
    Stopped,
}

struct SessionLink {
    id: SessionId,
    active: AtomicBool,
    graph: Mutex<GraphControl>,
    context: ProcessContext,
    source_ramp_secs: f32,
    device_name: String,
}

/// Shared reference to one capture session
///
/// Clones refer to the same session. After the session stops every clone
/// reports `is_active() == false` and refuses graph edits.
#[derive(Clone)]
pub struct SessionHandle {
    link: Arc<SessionLink>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.link.id
    }

    pub fn is_active(&self) -> bool {
        self.link.active.load(Ordering::Acquire)
    }

    pub fn device_name(&self) -> &str {
        &self.link.device_name
    }

    pub fn sample_rate(&self) -> f32 {
        self.link.context.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.link.context.channels
    }

    /// Units currently attached to the graph
    pub fn live_unit_count(&self) -> usize {
        self.link.graph.lock().live_count()
    }

    /// Latest output peaks (left, right)
    pub fn peaks(&self) -> (f32, f32) {
        self.link.graph.lock().meters().peaks()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.link.graph.lock().meters().frames_rendered()
    }

    pub fn xruns(&self) -> u64 {
        self.link.graph.lock().meters().xruns()
    }

    /// Build a unit for this session's stream format, seeded at `params`
    pub(crate) fn build_unit(&self, params: SuppressionParams) -> EngineResult<SuppressionUnit> {
        Ok(SuppressionUnit::new(
            self.link.context.sample_rate,
            self.link.context.channels,
            params.frequency_hz,
            params.intensity,
            self.link.source_ramp_secs,
        )?)
    }

    pub(crate) fn attach(&self, id: &SourceId, unit: SuppressionUnit) -> EngineResult<UnitKey> {
        self.ensure_active()?;
        self.link.graph.lock().attach(id, unit)
    }

    pub(crate) fn set_frequency(&self, key: UnitKey, frequency_hz: f32) -> EngineResult<()> {
        self.ensure_active()?;
        self.link.graph.lock().set_frequency(key, frequency_hz)
    }

    pub(crate) fn set_intensity(&self, key: UnitKey, intensity: f32) -> EngineResult<()> {
        self.ensure_active()?;
        self.link.graph.lock().set_intensity(key, intensity)
    }

    pub(crate) fn detach(&self, key: UnitKey, id: &SourceId) -> EngineResult<()> {
        self.ensure_active()?;
        self.link.graph.lock().detach(key, id)
    }

    pub(crate) fn set_master_gain(&self, gain: f32) -> EngineResult<()> {
        self.ensure_active()?;
        self.link.graph.lock().set_master_gain(gain)
    }

    fn ensure_active(&self) -> EngineResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(EngineError::SessionInactive(self.link.id.raw()))
        }
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.link.id == other.link.id
    }
}

impl Eq for SessionHandle {}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.link.id)
            .field("active", &self.is_active())
            .field("device", &self.link.device_name)
            .finish()
    }
}

struct ActiveSession {
    handle: SessionHandle,
    stream: Box<dyn DeviceStream>,
}

/// Owns at most one capture session at a time
pub struct CaptureSessionManager {
    backend: Arc<dyn CaptureBackend>,
    config: EngineConfig,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl CaptureSessionManager {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            state: SessionState::Uninitialized,
            active: None,
        }
    }

    /// Start a session with the configured initial master gain
    pub fn start(&mut self) -> EngineResult<SessionHandle> {
        let gain = self.config.initial_master_gain;
        self.start_with_gain(gain)
    }

    /// Acquire the device and build the master stage at `master_gain`
    ///
    /// Blocks until the device is running. If a session is already active
    /// its handle is returned and nothing is acquired. On failure the
    /// manager stays in its previous state.
    pub fn start_with_gain(&mut self, master_gain: f32) -> EngineResult<SessionHandle> {
        if let Some(active) = &self.active {
            debug!("Session {} already active", active.handle.id());
            return Ok(active.handle.clone());
        }

        let (control, renderer) = graph::channel(&self.config, master_gain.clamp(0.0, 1.0));
        let context = renderer.context();

        info!("Acquiring capture device via {} backend", self.backend.name());
        let stream = self.backend.open(&self.config, renderer)?;

        let handle = SessionHandle {
            link: Arc::new(SessionLink {
                id: SessionId::next(),
                active: AtomicBool::new(true),
                graph: Mutex::new(control),
                context,
                source_ramp_secs: self.config.smoothing.source_ramp_secs(),
                device_name: stream.device_name().to_string(),
            }),
        };

        info!(
            "Session {} active on '{}' ({} Hz, {} ch)",
            handle.id(),
            handle.device_name(),
            context.sample_rate,
            context.channels
        );

        self.active = Some(ActiveSession {
            handle: handle.clone(),
            stream,
        });
        self.state = SessionState::Active;
        Ok(handle)
    }

    /// Release the device and every unit still in the graph
    ///
    /// Idempotent. Returns the sources whose units were still attached;
    /// a correct reconciler tears down first, so this is normally empty.
    pub fn stop(&mut self) -> Vec<SourceId> {
        let Some(active) = self.active.take() else {
            return Vec::new();
        };

        let link = &active.handle.link;
        link.active.store(false, Ordering::Release);
        let leftover = link.graph.lock().detach_all();
        if !leftover.is_empty() {
            warn!(
                "Session {} stopped with {} units still attached: {:?}",
                link.id,
                leftover.len(),
                leftover
            );
        }

        active.stream.close();
        link.graph.lock().collect_retired();

        self.state = SessionState::Stopped;
        info!("Session {} stopped", link.id);
        leftover
    }

    /// Ramp the master stage; no-op without an active session
    pub fn set_master_gain(&mut self, target: f32) {
        let Some(active) = &self.active else {
            return;
        };
        if let Err(e) = active.handle.set_master_gain(target.clamp(0.0, 1.0)) {
            warn!("Master gain change dropped: {}", e);
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.active.as_ref().map(|active| active.handle.clone())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
