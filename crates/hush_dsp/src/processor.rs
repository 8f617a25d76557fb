//! Audio Processor Trait
//!
//! Common interface for the stages the render loop drives: every
//! suppression unit in the chain, then the master stage.

use crate::master::MasterStage;
use crate::suppressor::SuppressionUnit;

/// Context passed to processors containing stream metadata
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    pub sample_rate: f32,
    pub channels: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Duration of `frames` frames in seconds
    pub fn frames_to_secs(&self, frames: usize) -> f32 {
        frames as f32 / self.sample_rate
    }
}

/// Trait for stages in the render chain
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO unbounded loops
/// - O(n) time complexity where n = buffer size
///
/// Violating these rules causes audio dropouts ("glitches").
pub trait AudioProcessor: Send {
    /// Process audio buffer in-place
    ///
    /// Buffer format is interleaved: [L0, R0, L1, R1, ...]
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext);

    /// Reset internal state (delay lines, ramps in flight)
    fn reset(&mut self);

    /// Human-readable name for debugging
    fn name(&self) -> &'static str;
}

impl AudioProcessor for SuppressionUnit {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {
        SuppressionUnit::reset(self);
    }

    fn name(&self) -> &'static str {
        "Suppression Unit"
    }
}

impl AudioProcessor for MasterStage {
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext) {
        self.process_interleaved(buffer, context.channels, context.sample_rate);
    }

    fn reset(&mut self) {
        self.snap();
    }

    fn name(&self) -> &'static str {
        "Master Gain"
    }
}
