//! Hush DSP - Digital Signal Processing Module
//!
//! Real-time building blocks for the suppression engine:
//! - [`Smoother`]: click-free first-order ramps for every control value
//! - [`SuppressionUnit`]: one narrow-band notch in series with a
//!   compensating gain stage, one per declared noise source
//! - [`MasterStage`]: the smoothed master output gain
//!
//! # Architecture
//!
//! Nothing in this crate allocates, locks or blocks once constructed.
//! Construction happens on the control thread; processing happens in the
//! audio callback, which also drives every smoother's clock.

mod error;
mod master;
mod processor;
mod smoother;
mod suppressor;

pub use error::DspError;
pub use master::MasterStage;
pub use processor::{AudioProcessor, ProcessContext};
pub use smoother::Smoother;
pub use suppressor::{
    compensation_gain, notch_depth_db, SuppressionUnit, COMPENSATION_SLOPE, MAX_NOTCH_DEPTH_DB,
    NOTCH_Q,
};

/// Highest interleaved channel count a processing stage accepts
pub const MAX_CHANNELS: usize = 8;
