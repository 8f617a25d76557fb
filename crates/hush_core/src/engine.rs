//! Audio Engine - Main Entry Point
//!
//! `AudioEngine` is the thread-safe facade callers hold. It owns a control
//! thread that runs the [`EngineController`] state machine; every public
//! method is a message to that thread, so reconciliations are serialized
//! and applied in arrival order.
//!
//! ```text
//!  caller ──Command──▶ control thread ──GraphCommand──▶ audio callback
//!         ◀──Event────  (controller)   ◀──retired units─
//! ```
//!
//! Device acquisition blocks the control thread. `start()` therefore
//! returns a [`PendingStart`] immediately; commands sent meanwhile are
//! queued and run once acquisition finishes, which is what makes `stop()`
//! safe while starting.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use tracing::{debug, error, info, warn};

use crate::backend::{CaptureBackend, CpalBackend};
use crate::config::EngineConfig;
use crate::controller::{is_demo_mode, EngineController, EngineState, StateCell};
use crate::device::AudioDevice;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, EngineSnapshot, Event};
use crate::source::SourceDeclaration;

/// Interval between level meter events while running (~30fps)
const LEVEL_INTERVAL: Duration = Duration::from_millis(33);

/// Events buffered for the caller before new ones are dropped
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Queue depth at which meter and state events stop being queued, so
/// lifecycle events always find room behind them
const TELEMETRY_QUEUE_LIMIT: usize = 32;

/// Deferred outcome of [`AudioEngine::start`]
#[must_use = "the start outcome is only reported through this handle"]
#[derive(Debug)]
pub struct PendingStart {
    receiver: Receiver<EngineResult<()>>,
}

impl PendingStart {
    /// Block until acquisition completes
    pub fn wait(self) -> EngineResult<()> {
        self.receiver
            .recv()
            .map_err(|_| EngineError::ChannelRecvError)?
    }

    /// Block up to `timeout`; `None` if acquisition is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<EngineResult<()>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(EngineError::ChannelRecvError)),
        }
    }

    /// Non-blocking poll
    pub fn try_result(&self) -> Option<EngineResult<()>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(EngineError::ChannelRecvError)),
        }
    }
}

/// Main audio engine handle
pub struct AudioEngine {
    command_sender: Sender<Command>,
    event_receiver: Receiver<Event>,
    control_thread: Option<JoinHandle<()>>,
    state: Arc<StateCell>,
    config: EngineConfig,
}

impl AudioEngine {
    /// Create an engine on the default audio host
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        Self::with_backend(Arc::new(CpalBackend::new()), config)
    }

    /// Create an engine that captures through `backend`
    pub fn with_backend(
        backend: Arc<dyn CaptureBackend>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let controller = EngineController::new(backend, config.clone())?;
        let state = controller.state_cell();

        let (command_sender, command_receiver) = unbounded::<Command>();
        let (event_sender, event_receiver) = bounded::<Event>(EVENT_QUEUE_CAPACITY);

        let control_thread = thread::Builder::new()
            .name("hush-control".into())
            .spawn(move || control_thread_main(controller, command_receiver, event_sender))
            .map_err(|e| EngineError::ConfigError(format!("failed to spawn control thread: {}", e)))?;

        Ok(Self {
            command_sender,
            event_receiver,
            control_thread: Some(control_thread),
            state,
            config,
        })
    }

    /// Begin acquiring the capture device
    ///
    /// `DeviceUnavailable` on the returned handle means demo mode: the
    /// engine stays `Idle` and keeps accepting snapshots.
    pub fn start(&self) -> EngineResult<PendingStart> {
        let (reply, receiver) = bounded(1);
        self.send_command(Command::Start { reply })?;
        Ok(PendingStart { receiver })
    }

    /// Release every unit and the device; valid in any state
    pub fn stop(&self) -> EngineResult<()> {
        self.send_command(Command::Stop)
    }

    /// Replace the desired source list
    pub fn on_sources_changed(&self, snapshot: Vec<SourceDeclaration>) -> EngineResult<()> {
        self.send_command(Command::SourcesChanged(snapshot))
    }

    /// Set master gain (0.0 - 1.0)
    pub fn on_master_gain_changed(&self, value: f32) -> EngineResult<()> {
        self.send_command(Command::MasterGainChanged(value))
    }

    /// Request state update
    pub fn request_state(&self) -> EngineResult<()> {
        self.send_command(Command::RequestState)
    }

    /// Snapshot taken after every previously sent command has run
    pub fn snapshot(&self) -> EngineResult<EngineSnapshot> {
        let (reply, receiver) = bounded(1);
        self.send_command(Command::Snapshot { reply })?;
        receiver.recv().map_err(|_| EngineError::ChannelRecvError)
    }

    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.event_receiver.recv().ok()
    }

    /// Get next event, waiting at most `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    pub fn list_devices(&self) -> EngineResult<Vec<AudioDevice>> {
        AudioDevice::enumerate_all()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Events queued and not yet polled
    pub fn pending_events(&self) -> usize {
        self.event_receiver.len()
    }

    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.command_sender.send(Command::Shutdown);
        if let Some(handle) = self.control_thread.take() {
            if handle.join().is_err() {
                error!("Control thread panicked");
            }
        }
    }
}

fn control_thread_main(
    mut controller: EngineController,
    commands: Receiver<Command>,
    events: Sender<Event>,
) {
    info!("Control thread started");
    // Never block on a caller that is not reading events
    let emit = |event: Event| {
        if event.is_telemetry() && events.len() >= TELEMETRY_QUEUE_LIMIT {
            return;
        }
        if let Err(TrySendError::Full(event)) = events.try_send(event) {
            warn!("Event queue full, dropping {:?}", event);
        }
    };

    loop {
        match commands.recv_timeout(LEVEL_INTERVAL) {
            Ok(Command::Start { reply }) => {
                let was_running = controller.state() == EngineState::Running;
                let result = match controller.start() {
                    Ok(report) => {
                        if !was_running {
                            if let Some(session) = controller.session() {
                                emit(Event::Started {
                                    device: session.device_name().to_string(),
                                });
                            }
                        }
                        Event::from_report(&report).into_iter().for_each(emit);
                        Ok(())
                    }
                    Err(e) if is_demo_mode(&e) => {
                        info!("Entering demo mode: {}", e);
                        emit(Event::DemoMode {
                            reason: e.to_string(),
                        });
                        Err(e)
                    }
                    Err(e) => {
                        error!("Start failed: {}", e);
                        emit(Event::error(&e));
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }

            Ok(Command::Stop) => {
                let was_active = controller.state() != EngineState::Idle
                    || controller.session().is_some();
                controller.stop();
                if was_active {
                    emit(Event::Stopped);
                }
            }

            Ok(Command::SourcesChanged(snapshot)) => match controller.on_sources_changed(snapshot) {
                Ok(report) => Event::from_report(&report).into_iter().for_each(emit),
                Err(e) => {
                    error!("Reconciliation aborted: {}", e);
                    emit(Event::error(&e));
                }
            },

            Ok(Command::MasterGainChanged(value)) => controller.on_master_gain_changed(value),

            Ok(Command::RequestState) => emit(Event::StateUpdate(controller.snapshot())),

            Ok(Command::Snapshot { reply }) => {
                let _ = reply.send(controller.snapshot());
            }

            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,

            Err(RecvTimeoutError::Timeout) => {
                if controller.state() == EngineState::Running {
                    if let Some(session) = controller.session() {
                        let (left, right) = session.peaks();
                        emit(Event::LevelUpdate { left, right });
                    }
                }
            }
        }
    }

    controller.stop();
    debug!("Control thread exiting");
}
