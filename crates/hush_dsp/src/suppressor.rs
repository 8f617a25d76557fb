//! Narrow-Band Suppression Unit
//!
//! One unit per declared noise source: a peaking biquad cut ("notch" with a
//! finite, intensity-controlled depth) followed by a compensating gain
//! stage that keeps full suppression from reading as an overall level dip.
//!
//! ```text
//!   in ──▶ [ notch @ f0, Q = 1.5, depth = -24dB × intensity ] ──▶ [ × (1 - 0.4 × intensity) ] ──▶ out
//! ```
//!
//! Based on the RBJ (Robert Bristow-Johnson) Audio EQ Cookbook peaking
//! filter. Frequency and intensity edits ramp through [`Smoother`]s that
//! the audio callback advances once per block.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::error::DspError;
use crate::smoother::Smoother;
use crate::MAX_CHANNELS;

/// Quality factor of every notch (design constant, not user-configurable)
pub const NOTCH_Q: f32 = 1.5;

/// Depth of the notch at full intensity, in dB
pub const MAX_NOTCH_DEPTH_DB: f32 = 24.0;

/// Compensating gain lost per unit of intensity
pub const COMPENSATION_SLOPE: f32 = 0.4;

/// Highest center frequency as a fraction of the sample rate
const NYQUIST_GUARD: f32 = 0.45;

/// Compensating gain for an intensity: `1 - intensity × 0.4`
///
/// Full suppression never cuts more than 40% of the perceived level.
#[inline]
pub fn compensation_gain(intensity: f32) -> f32 {
    1.0 - intensity.clamp(0.0, 1.0) * COMPENSATION_SLOPE
}

/// Notch depth in dB for an intensity (0 at rest, -24dB at full)
#[inline]
pub fn notch_depth_db(intensity: f32) -> f32 {
    -MAX_NOTCH_DEPTH_DB * intensity.clamp(0.0, 1.0)
}

/// Live processing state for one suppressed noise source
pub struct SuppressionUnit {
    // One filter state per interleaved channel
    filters: Vec<DirectForm2Transposed<f32>>,
    frequency: Smoother,
    intensity: Smoother,
    // Parameters the current coefficients were computed from
    applied_frequency: f32,
    applied_intensity: f32,
    sample_rate: f32,
}

impl SuppressionUnit {
    /// Build a unit seeded directly at `frequency_hz` / `intensity`
    ///
    /// Allocates; call from the control thread, never the audio callback.
    pub fn new(
        sample_rate: f32,
        channels: usize,
        frequency_hz: f32,
        intensity: f32,
        ramp_secs: f32,
    ) -> Result<Self, DspError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(DspError::InvalidChannelCount(channels));
        }
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(DspError::InvalidFrequency(frequency_hz));
        }

        let intensity = intensity.clamp(0.0, 1.0);
        let coeffs = Self::coefficients(sample_rate, frequency_hz, intensity)?;

        Ok(Self {
            filters: (0..channels)
                .map(|_| DirectForm2Transposed::<f32>::new(coeffs))
                .collect(),
            frequency: Smoother::new(frequency_hz, ramp_secs),
            intensity: Smoother::new(intensity, ramp_secs),
            applied_frequency: frequency_hz,
            applied_intensity: intensity,
            sample_rate,
        })
    }

    fn coefficients(
        sample_rate: f32,
        frequency_hz: f32,
        intensity: f32,
    ) -> Result<Coefficients<f32>, DspError> {
        let f0 = frequency_hz.min(sample_rate * NYQUIST_GUARD);

        Coefficients::<f32>::from_params(
            Type::PeakingEQ(notch_depth_db(intensity)),
            sample_rate.hz(),
            f0.hz(),
            NOTCH_Q,
        )
        .map_err(|_| DspError::InvalidCoefficients {
            frequency: frequency_hz,
            sample_rate,
        })
    }

    /// Ramp the notch toward a new center frequency
    pub fn set_frequency(&mut self, frequency_hz: f32) -> Result<(), DspError> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(DspError::InvalidFrequency(frequency_hz));
        }
        self.frequency.set_target(frequency_hz);
        Ok(())
    }

    /// Ramp depth and compensating gain toward a new intensity
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity.set_target(intensity.clamp(0.0, 1.0));
    }

    /// Frequency the notch is heading to
    pub fn frequency_target(&self) -> f32 {
        self.frequency.target()
    }

    /// Intensity the unit is heading to
    pub fn intensity_target(&self) -> f32 {
        self.intensity.target()
    }

    /// Compensating gain the unit is heading to
    pub fn compensation_target(&self) -> f32 {
        compensation_gain(self.intensity.target())
    }

    /// Current interpolated center frequency
    pub fn frequency(&self) -> f32 {
        self.frequency.current()
    }

    /// Current interpolated intensity
    pub fn intensity(&self) -> f32 {
        self.intensity.current()
    }

    /// Whether every parameter has arrived at its target
    pub fn is_settled(&self) -> bool {
        self.frequency.is_settled() && self.intensity.is_settled()
    }

    pub fn channels(&self) -> usize {
        self.filters.len()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Process an interleaved buffer in-place
    ///
    /// Advances the parameter clock by the block's duration. Coefficients
    /// are recomputed once per block while ramping; the compensating gain
    /// is interpolated per frame across the block.
    ///
    /// # Real-time Safety
    /// No allocations. O(n) where n = buffer length.
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        let channels = self.filters.len();
        let frames = buffer.len() / channels;
        if frames == 0 {
            return;
        }

        let dt = frames as f32 / self.sample_rate;
        let gain_start = compensation_gain(self.intensity.current());
        let frequency = self.frequency.advance(dt);
        let intensity = self.intensity.advance(dt);
        let gain_end = compensation_gain(intensity);

        if frequency != self.applied_frequency || intensity != self.applied_intensity {
            // Keep the previous response if the new one is unusable
            if let Ok(coeffs) = Self::coefficients(self.sample_rate, frequency, intensity) {
                for filter in &mut self.filters {
                    filter.update_coefficients(coeffs);
                }
                self.applied_frequency = frequency;
                self.applied_intensity = intensity;
            }
        }

        let gain_step = (gain_end - gain_start) / frames as f32;
        for (i, frame) in buffer.chunks_exact_mut(channels).enumerate() {
            let gain = gain_start + gain_step * (i + 1) as f32;
            for (sample, filter) in frame.iter_mut().zip(self.filters.iter_mut()) {
                *sample = filter.run(*sample) * gain;
            }
        }
    }

    /// Clear filter delay lines
    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset_state();
        }
    }
}

impl std::fmt::Debug for SuppressionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionUnit")
            .field("channels", &self.filters.len())
            .field("frequency", &self.frequency)
            .field("intensity", &self.intensity)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
