//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while building or retuning DSP stages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Invalid center frequency: {0}Hz (must be finite and positive)")]
    InvalidFrequency(f32),

    #[error("Invalid filter coefficients for frequency {frequency}Hz at sample rate {sample_rate}Hz")]
    InvalidCoefficients { frequency: f32, sample_rate: f32 },

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Unsupported channel count: {0} (must be 1-{max})", max = crate::MAX_CHANNELS)]
    InvalidChannelCount(usize),
}
