//! Engine Error Types

use thiserror::Error;

use crate::source::SourceId;

/// Errors that can occur in the audio engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Capture could not be opened: permission denied, no device, or the
    /// device is already held. Reported once to the `start()` caller.
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Stream configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid declaration for source '{id}': {reason}")]
    InvalidDeclaration { id: SourceId, reason: String },

    #[error("Unit table full - cannot attach '{id}' (capacity {capacity})")]
    GraphCapacity { id: SourceId, capacity: usize },

    #[error("Graph command queue full - render clock is not draining it")]
    GraphQueueFull,

    #[error("Session {0} is not active")]
    SessionInactive(u64),

    #[error("Suppression unit for source '{0}' released twice")]
    DoubleRelease(SourceId),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("DSP error: {0}")]
    DspError(#[from] hush_dsp::DspError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("Channel receive error - sender dropped")]
    ChannelRecvError,
}

impl EngineError {
    /// Reconciler bugs: fatal to the call, never tolerated
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            EngineError::DoubleRelease(_) | EngineError::InvariantViolation(_)
        )
    }

    /// Failures scoped to a single source; retried on the next snapshot
    pub fn is_per_source(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidDeclaration { .. }
                | EngineError::GraphCapacity { .. }
                | EngineError::GraphQueueFull
                | EngineError::DspError(_)
        )
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
