//! Master Output Gain
//!
//! The last stage before the output sink. A single smoothed gain in
//! [0, 1], independent of every per-source setting.

use crate::smoother::Smoother;

/// Smoothed master gain stage
#[derive(Debug, Clone)]
pub struct MasterStage {
    gain: Smoother,
}

impl MasterStage {
    /// Create a stage seeded directly at `gain` (no ramp)
    pub fn new(gain: f32, ramp_secs: f32) -> Self {
        Self {
            gain: Smoother::new(gain.clamp(0.0, 1.0), ramp_secs),
        }
    }

    /// Ramp toward a new gain (clamped to 0.0 - 1.0)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set_target(gain.clamp(0.0, 1.0));
    }

    /// Finish any ramp in flight immediately
    pub fn snap(&mut self) {
        let target = self.gain.target();
        self.gain.reset(target);
    }

    /// Gain the stage is heading to
    pub fn target(&self) -> f32 {
        self.gain.target()
    }

    /// Current interpolated gain
    pub fn gain(&self) -> f32 {
        self.gain.current()
    }

    /// Apply the gain to an interleaved buffer in-place
    ///
    /// The gain is interpolated per frame between its value at the start
    /// and at the end of the block.
    ///
    /// # Real-time Safety
    /// No allocations. O(n) where n = buffer length.
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize, sample_rate: f32) {
        let channels = channels.max(1);
        let frames = buffer.len() / channels;
        if frames == 0 {
            return;
        }

        let start = self.gain.current();
        let end = self.gain.advance(frames as f32 / sample_rate);

        // Settled unity gain: nothing to do
        if start == end && (end - 1.0).abs() < f32::EPSILON {
            return;
        }

        let step = (end - start) / frames as f32;
        for (i, frame) in buffer.chunks_exact_mut(channels).enumerate() {
            let gain = start + step * (i + 1) as f32;
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

impl Default for MasterStage {
    fn default() -> Self {
        Self::new(1.0, 0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_gain_applies_immediately() {
        let mut master = MasterStage::new(0.5, 0.1);
        let mut buffer = vec![1.0; 64];
        master.process_interleaved(&mut buffer, 2, 48000.0);
        assert!(buffer.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_gain_is_clamped() {
        let mut master = MasterStage::new(3.0, 0.1);
        assert_eq!(master.target(), 1.0);
        master.set_gain(-1.0);
        assert_eq!(master.target(), 0.0);
    }

    #[test]
    fn test_gain_change_ramps_monotonically() {
        let mut master = MasterStage::new(1.0, 0.1);
        master.set_gain(0.0);

        let mut buffer = vec![1.0; 480];
        master.process_interleaved(&mut buffer, 1, 48000.0);

        assert!(buffer[0] < 1.0 && buffer[0] > 0.9, "first frame: {}", buffer[0]);
        for pair in buffer.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        assert!(master.gain() > 0.0, "must not reach silence in one 10ms block");
    }

    #[test]
    fn test_snap_finishes_ramp() {
        let mut master = MasterStage::new(1.0, 0.1);
        master.set_gain(0.2);
        master.snap();
        assert_eq!(master.gain(), 0.2);
    }

    #[test]
    fn test_settles_after_ramp() {
        let mut master = MasterStage::new(1.0, 0.1);
        master.set_gain(0.7);
        let mut buffer = vec![0.0; 960];
        for _ in 0..12 {
            master.process_interleaved(&mut buffer, 2, 48000.0);
        }
        assert_eq!(master.gain(), 0.7);
    }
}
