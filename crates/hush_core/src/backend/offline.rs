//! Offline Backend
//!
//! Runs the graph without audio hardware. The caller owns the clock:
//! [`OfflineBackend::render`] processes one block exactly as a device
//! callback would. Used by tests, benchmarks and headless runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{CaptureBackend, DeviceStream};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::GraphRenderer;

const DEVICE_NAME: &str = "Offline";

struct OfflineShared {
    renderer: Mutex<Option<GraphRenderer>>,
    unavailable: Mutex<Option<String>>,
    held: AtomicBool,
    opens: AtomicUsize,
    gate: Mutex<Option<Receiver<()>>>,
}

/// Hardware-free capture backend
///
/// Clones share one simulated device.
#[derive(Clone)]
pub struct OfflineBackend {
    shared: Arc<OfflineShared>,
}

/// Holds a gated backend's acquisition until released
pub struct AcquisitionGate {
    sender: Sender<()>,
}

impl AcquisitionGate {
    /// Let one pending (or the next) acquisition complete
    pub fn release(&self) {
        let _ = self.sender.send(());
    }
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(OfflineShared {
                renderer: Mutex::new(None),
                unavailable: Mutex::new(None),
                held: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                gate: Mutex::new(None),
            }),
        }
    }

    /// A device that refuses every acquisition with `reason`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let backend = Self::new();
        backend.set_unavailable(Some(reason.into()));
        backend
    }

    /// A device whose acquisitions block until the gate is released
    pub fn gated() -> (Self, AcquisitionGate) {
        let backend = Self::new();
        let (sender, receiver) = bounded(1);
        *backend.shared.gate.lock() = Some(receiver);
        (backend, AcquisitionGate { sender })
    }

    /// Make future acquisitions fail (`Some`) or succeed (`None`)
    pub fn set_unavailable(&self, reason: Option<String>) {
        *self.shared.unavailable.lock() = reason;
    }

    /// Number of acquisition attempts so far
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Whether a session currently holds the device
    pub fn is_held(&self) -> bool {
        self.shared.held.load(Ordering::SeqCst)
    }

    /// Render one block in place; returns `false` when no stream is open
    pub fn render(&self, buffer: &mut [f32]) -> bool {
        match self.shared.renderer.lock().as_mut() {
            Some(renderer) => {
                renderer.render(buffer);
                true
            }
            None => false,
        }
    }

    /// Render `frames` frames of silence to advance the clock
    pub fn advance(&self, frames: usize) -> bool {
        let channels = match self.shared.renderer.lock().as_ref() {
            Some(renderer) => renderer.context().channels,
            None => return false,
        };
        let mut block = vec![0.0_f32; frames * channels];
        self.render(&mut block)
    }

    /// Units currently in the render chain
    pub fn unit_count(&self) -> usize {
        self.shared
            .renderer
            .lock()
            .as_ref()
            .map_or(0, |renderer| renderer.unit_count())
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for OfflineBackend {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn open(
        &self,
        _config: &EngineConfig,
        renderer: GraphRenderer,
    ) -> EngineResult<Box<dyn DeviceStream>> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        let gate = self.shared.gate.lock().clone();
        if let Some(gate) = gate {
            debug!("Offline acquisition waiting on gate");
            gate.recv().map_err(|_| {
                EngineError::DeviceUnavailable("acquisition gate dropped".into())
            })?;
        }

        if let Some(reason) = self.shared.unavailable.lock().clone() {
            return Err(EngineError::DeviceUnavailable(reason));
        }

        if self.shared.held.swap(true, Ordering::SeqCst) {
            return Err(EngineError::DeviceUnavailable(
                "device is held by another session".into(),
            ));
        }

        *self.shared.renderer.lock() = Some(renderer);
        info!("Offline device opened");

        Ok(Box::new(OfflineStream {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct OfflineStream {
    shared: Arc<OfflineShared>,
}

impl DeviceStream for OfflineStream {
    fn device_name(&self) -> &str {
        DEVICE_NAME
    }

    fn close(self: Box<Self>) {}
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        self.shared.renderer.lock().take();
        self.shared.held.store(false, Ordering::SeqCst);
        debug!("Offline device closed");
    }
}
