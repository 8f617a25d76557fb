//! Parameter Smoothing
//!
//! A first-order exponential approach of a control value toward a target.
//! Every control change in the engine (notch frequency, suppression depth,
//! compensating gain, master gain) goes through a [`Smoother`] so that
//! edits never produce a step in the signal path.
//!
//! # Algorithm
//!
//! ```text
//!   value += (target - value) * (1 - e^(-dt / tau))
//! ```
//!
//! `tau` is a fifth of the ramp window, so after one full window the
//! residual is below 1% and the value snaps to the target. Setting a new
//! target re-arms the window and continues from the current value.
//!
//! The smoother knows nothing about audio topology; it is advanced by
//! whoever owns the clock (the audio callback, in practice).

/// Exponential time constants per ramp window
const RAMP_TIME_CONSTANTS: f32 = 5.0;

/// Distance below which the value is considered to have arrived
const SETTLE_EPSILON: f32 = 1.0e-6;

/// Smoothed scalar control value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoother {
    current: f32,
    target: f32,
    ramp_secs: f32,
    remaining_secs: f32,
}

impl Smoother {
    /// Create a settled smoother at `value` with the given ramp window
    pub fn new(value: f32, ramp_secs: f32) -> Self {
        Self {
            current: value,
            target: value,
            ramp_secs: ramp_secs.max(0.0),
            remaining_secs: 0.0,
        }
    }

    /// Create a settled smoother with the ramp window given in milliseconds
    pub fn from_millis(value: f32, ramp_ms: f32) -> Self {
        Self::new(value, ramp_ms / 1000.0)
    }

    /// Set a new target
    ///
    /// Re-arms the ramp window. The approach continues from the current
    /// (possibly mid-transition) value; it never restarts from where the
    /// previous ramp began. Pending targets are not queued.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }

        self.target = target;
        self.remaining_secs = self.ramp_secs;

        if self.ramp_secs <= 0.0 || (self.target - self.current).abs() <= SETTLE_EPSILON {
            self.settle();
        }
    }

    /// Jump straight to `value` with no ramp
    pub fn reset(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining_secs = 0.0;
    }

    /// Advance the clock by `dt_secs` and return the new current value
    ///
    /// # Real-time Safety
    /// No allocations, O(1).
    #[inline]
    pub fn advance(&mut self, dt_secs: f32) -> f32 {
        if self.remaining_secs <= 0.0 || dt_secs <= 0.0 {
            return self.current;
        }

        if dt_secs >= self.remaining_secs {
            self.settle();
            return self.current;
        }

        let before = self.target - self.current;
        let k = 1.0 - (-dt_secs * RAMP_TIME_CONSTANTS / self.ramp_secs).exp();
        self.current += before * k;
        self.remaining_secs -= dt_secs;

        // Rounding must never carry the value past the target
        let after = self.target - self.current;
        if after.abs() <= SETTLE_EPSILON || after.signum() != before.signum() {
            self.settle();
        }

        self.current
    }

    /// Current interpolated value
    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Value being approached
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the value has arrived at its target
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.remaining_secs <= 0.0
    }

    /// Length of the ramp window in seconds
    pub fn ramp_secs(&self) -> f32 {
        self.ramp_secs
    }

    fn settle(&mut self) {
        self.current = self.target;
        self.remaining_secs = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 0.001; // 1ms audio-clock tick

    #[test]
    fn test_new_is_settled() {
        let s = Smoother::new(0.5, 0.05);
        assert!(s.is_settled());
        assert_eq!(s.current(), 0.5);
        assert_eq!(s.target(), 0.5);
    }

    #[test]
    fn test_distance_never_increases() {
        let mut s = Smoother::new(0.0, 0.05);
        s.set_target(1.0);

        let mut last_distance = (s.target() - s.current()).abs();
        for _ in 0..100 {
            s.advance(STEP);
            let distance = (s.target() - s.current()).abs();
            assert!(distance <= last_distance, "{} > {}", distance, last_distance);
            assert!(s.current() <= 1.0, "overshoot: {}", s.current());
            last_distance = distance;
        }
    }

    #[test]
    fn test_reaches_target_within_ramp() {
        let mut s = Smoother::from_millis(120.0, 50.0);
        s.set_target(250.0);

        let mut elapsed = 0.0;
        while !s.is_settled() {
            s.advance(STEP);
            elapsed += STEP;
            assert!(elapsed <= 0.05 + 2.0 * STEP, "still ramping after {}s", elapsed);
        }
        assert_eq!(s.current(), 250.0);
    }

    #[test]
    fn test_downward_ramp_does_not_undershoot() {
        let mut s = Smoother::new(1.0, 0.1);
        s.set_target(0.0);

        for _ in 0..200 {
            let v = s.advance(STEP);
            assert!(v >= 0.0, "undershoot: {}", v);
        }
        assert_eq!(s.current(), 0.0);
    }

    #[test]
    fn test_retarget_continues_from_current_value() {
        let mut s = Smoother::new(0.0, 0.05);
        s.set_target(1.0);
        for _ in 0..10 {
            s.advance(STEP);
        }
        let midway = s.current();
        assert!(midway > 0.0 && midway < 1.0);

        // Redirect back down: the first step must start from `midway`
        s.set_target(0.0);
        let next = s.advance(STEP);
        assert!(next < midway);
        assert!(next > 0.0);
    }

    #[test]
    fn test_same_target_does_not_rearm() {
        let mut s = Smoother::new(0.0, 0.05);
        s.set_target(1.0);
        s.advance(0.04);

        s.set_target(1.0);
        s.advance(0.011);
        assert!(s.is_settled());
    }

    #[test]
    fn test_zero_ramp_is_instant() {
        let mut s = Smoother::new(0.0, 0.0);
        s.set_target(0.8);
        assert!(s.is_settled());
        assert_eq!(s.current(), 0.8);
    }

    #[test]
    fn test_reset_skips_ramp() {
        let mut s = Smoother::new(0.0, 0.05);
        s.set_target(1.0);
        s.reset(0.3);
        assert!(s.is_settled());
        assert_eq!(s.current(), 0.3);
        assert_eq!(s.target(), 0.3);
    }

    #[test]
    fn test_large_step_settles() {
        let mut s = Smoother::new(0.0, 0.05);
        s.set_target(1.0);
        assert_eq!(s.advance(1.0), 1.0);
        assert!(s.is_settled());
    }
}
