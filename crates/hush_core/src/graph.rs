//! Processing Graph
//!
//! The live signal chain of a capture session, split into two halves the
//! way an rtrb ring is split into producer and consumer:
//!
//! - [`GraphControl`] lives on the control thread. It owns the ledger of
//!   live units and is the only place units are built or freed.
//! - [`GraphRenderer`] lives on the audio thread. It owns the units while
//!   they are in the chain and applies queued edits at block boundaries.
//!
//! ```text
//! control thread                          audio thread
//! ┌──────────────┐  GraphCommand (rtrb)  ┌──────────────┐
//! │ GraphControl │ ────────────────────▶ │ GraphRenderer│
//! │   (ledger)   │ ◀──────────────────── │   (chain)    │
//! └──────────────┘  retired units (rtrb) └──────────────┘
//! ```
//!
//! Topology is `input → unit₁ → … → unitₙ → master → output`. Every unit
//! is linear and time-invariant between edits, so chain order carries no
//! meaning; detaching any one unit leaves the rest intact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use hush_dsp::{AudioProcessor, MasterStage, ProcessContext, SuppressionUnit};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::source::SourceId;

/// Queue slots per unit of capacity
const COMMAND_SLOTS_PER_UNIT: usize = 16;

/// Identity of one attachment of a unit to one graph
///
/// Keys are never reused within a graph, so an edit addressed to a
/// detached unit can never land on a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey(u64);

impl UnitKey {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Edits sent from the control thread to the render loop
pub(crate) enum GraphCommand {
    Attach {
        key: UnitKey,
        unit: Box<SuppressionUnit>,
    },
    SetFrequency {
        key: UnitKey,
        frequency_hz: f32,
    },
    SetIntensity {
        key: UnitKey,
        intensity: f32,
    },
    Detach {
        key: UnitKey,
    },
    SetMasterGain(f32),
}

/// Levels and counters published by the render loop
#[derive(Debug)]
pub struct RenderMeters {
    peak_left_bits: AtomicU32,
    peak_right_bits: AtomicU32,
    frames_rendered: AtomicU64,
    xruns: AtomicU64,
}

impl RenderMeters {
    pub fn new() -> Self {
        Self {
            peak_left_bits: AtomicU32::new(0.0_f32.to_bits()),
            peak_right_bits: AtomicU32::new(0.0_f32.to_bits()),
            frames_rendered: AtomicU64::new(0),
            xruns: AtomicU64::new(0),
        }
    }

    pub fn set_peaks(&self, left: f32, right: f32) {
        self.peak_left_bits.store(left.to_bits(), Ordering::Relaxed);
        self.peak_right_bits.store(right.to_bits(), Ordering::Relaxed);
    }

    pub fn peaks(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_left_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.peak_right_bits.load(Ordering::Relaxed)),
        )
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Count a capture overflow or playback underrun
    pub fn record_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }
}

impl Default for RenderMeters {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a connected control/render pair for one session
pub(crate) fn channel(config: &EngineConfig, master_gain: f32) -> (GraphControl, GraphRenderer) {
    let slots = config.max_units * COMMAND_SLOTS_PER_UNIT;
    let (command_tx, command_rx) = RingBuffer::new(slots);
    let (retired_tx, retired_rx) = RingBuffer::new(slots);
    let meters = Arc::new(RenderMeters::new());

    let context = ProcessContext::new(
        config.stream.sample_rate as f32,
        config.stream.channels as usize,
    );

    let control = GraphControl {
        commands: command_tx,
        retired: retired_rx,
        live: HashMap::with_capacity(config.max_units),
        capacity: config.max_units,
        next_key: 1,
        meters: Arc::clone(&meters),
    };

    let renderer = GraphRenderer {
        commands: command_rx,
        retired: retired_tx,
        chain: Vec::with_capacity(config.max_units),
        master: MasterStage::new(master_gain, config.smoothing.master_ramp_secs()),
        context,
        meters,
    };

    (control, renderer)
}

/// Control-thread half of the graph
pub(crate) struct GraphControl {
    commands: Producer<GraphCommand>,
    retired: Consumer<Box<SuppressionUnit>>,
    live: HashMap<UnitKey, SourceId>,
    capacity: usize,
    next_key: u64,
    meters: Arc<RenderMeters>,
}

impl GraphControl {
    pub fn attach(&mut self, id: &SourceId, unit: SuppressionUnit) -> EngineResult<UnitKey> {
        self.collect_retired();

        if self.live.len() >= self.capacity {
            return Err(EngineError::GraphCapacity {
                id: id.clone(),
                capacity: self.capacity,
            });
        }

        let key = UnitKey(self.next_key);
        self.send(GraphCommand::Attach {
            key,
            unit: Box::new(unit),
        })?;
        self.next_key += 1;
        self.live.insert(key, id.clone());
        trace!("Attached unit {:?} for '{}'", key, id);
        Ok(key)
    }

    pub fn set_frequency(&mut self, key: UnitKey, frequency_hz: f32) -> EngineResult<()> {
        self.ensure_live(key)?;
        self.send(GraphCommand::SetFrequency { key, frequency_hz })
    }

    pub fn set_intensity(&mut self, key: UnitKey, intensity: f32) -> EngineResult<()> {
        self.ensure_live(key)?;
        self.send(GraphCommand::SetIntensity { key, intensity })
    }

    /// Detach a live unit; a key that is not live is a double release
    pub fn detach(&mut self, key: UnitKey, id: &SourceId) -> EngineResult<()> {
        if !self.live.contains_key(&key) {
            return Err(EngineError::DoubleRelease(id.clone()));
        }
        self.collect_retired();
        self.send(GraphCommand::Detach { key })?;
        self.live.remove(&key);
        trace!("Detached unit {:?} for '{}'", key, id);
        Ok(())
    }

    pub fn set_master_gain(&mut self, gain: f32) -> EngineResult<()> {
        self.collect_retired();
        self.send(GraphCommand::SetMasterGain(gain))
    }

    /// Forget every live unit; the renderer is about to be dropped with them
    pub fn detach_all(&mut self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.live.drain().map(|(_, id)| id).collect();
        ids.sort();
        ids
    }

    /// Free units the render loop has retired
    pub fn collect_retired(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(unit) = self.retired.pop() {
            drop(unit);
            freed += 1;
        }
        if freed > 0 {
            debug!("Freed {} retired suppression units", freed);
        }
        freed
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn meters(&self) -> &Arc<RenderMeters> {
        &self.meters
    }

    fn ensure_live(&self, key: UnitKey) -> EngineResult<()> {
        if self.live.contains_key(&key) {
            Ok(())
        } else {
            Err(EngineError::InvariantViolation(format!(
                "edit addressed to unit {:?} which is not attached",
                key
            )))
        }
    }

    fn send(&mut self, command: GraphCommand) -> EngineResult<()> {
        match self.commands.push(command) {
            Ok(()) => Ok(()),
            // A rejected Attach hands its unit back here and frees it
            Err(PushError::Full(_)) => Err(EngineError::GraphQueueFull),
        }
    }
}

/// Audio-thread half of the graph
///
/// # Real-time Safety
/// `render()` never allocates: the chain was reserved for the configured
/// unit capacity and detached units are handed back to the control thread
/// to be freed.
pub struct GraphRenderer {
    commands: Consumer<GraphCommand>,
    retired: Producer<Box<SuppressionUnit>>,
    chain: Vec<(UnitKey, Box<SuppressionUnit>)>,
    master: MasterStage,
    context: ProcessContext,
    meters: Arc<RenderMeters>,
}

impl GraphRenderer {
    /// Process one interleaved block in place
    ///
    /// `buffer` holds the captured input on entry and the suppressed
    /// output on return.
    pub fn render(&mut self, buffer: &mut [f32]) {
        self.apply_commands();

        for (_, unit) in self.chain.iter_mut() {
            unit.process(buffer, &self.context);
        }
        self.master.process(buffer, &self.context);

        self.publish(buffer);
    }

    pub fn context(&self) -> ProcessContext {
        self.context
    }

    pub fn meters(&self) -> Arc<RenderMeters> {
        Arc::clone(&self.meters)
    }

    pub fn unit_count(&self) -> usize {
        self.chain.len()
    }

    pub fn master_gain(&self) -> f32 {
        self.master.gain()
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                GraphCommand::Attach { key, unit } => self.chain.push((key, unit)),
                GraphCommand::SetFrequency { key, frequency_hz } => {
                    if let Some(unit) = self.unit_mut(key) {
                        // Rejected values leave the unit where it was
                        let _ = unit.set_frequency(frequency_hz);
                    }
                }
                GraphCommand::SetIntensity { key, intensity } => {
                    if let Some(unit) = self.unit_mut(key) {
                        unit.set_intensity(intensity);
                    }
                }
                GraphCommand::Detach { key } => {
                    if let Some(pos) = self.chain.iter().position(|(k, _)| *k == key) {
                        let (_, unit) = self.chain.remove(pos);
                        // Ring full means the control side stopped collecting;
                        // freeing here is the only option left
                        let _ = self.retired.push(unit);
                    }
                }
                GraphCommand::SetMasterGain(gain) => self.master.set_gain(gain),
            }
        }
    }

    fn unit_mut(&mut self, key: UnitKey) -> Option<&mut SuppressionUnit> {
        self.chain
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, unit)| unit.as_mut())
    }

    fn publish(&self, buffer: &[f32]) {
        let channels = self.context.channels;
        let mut peak_l = 0.0_f32;
        let mut peak_r = 0.0_f32;
        for frame in buffer.chunks_exact(channels) {
            peak_l = peak_l.max(frame[0].abs());
            peak_r = peak_r.max(frame[channels - 1].abs());
        }
        self.meters.set_peaks(peak_l, peak_r);
        self.meters
            .frames_rendered
            .fetch_add((buffer.len() / channels) as u64, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for GraphRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRenderer")
            .field("units", &self.chain.len())
            .field("master_gain", &self.master.gain())
            .field("context", &self.context)
            .finish()
    }
}
