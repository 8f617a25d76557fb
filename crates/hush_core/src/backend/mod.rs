//! Capture Backends
//!
//! A backend turns a [`GraphRenderer`] into sound: it acquires the capture
//! device and a playback sink and drives `render()` from the device clock.
//! Acquisition is blocking and happens on the control thread; the engine
//! never talks to an audio API directly.

mod cpal_stream;
mod offline;

pub use cpal_stream::CpalBackend;
pub use offline::{AcquisitionGate, OfflineBackend};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::graph::GraphRenderer;

/// Something that can open a capture-to-playback path
pub trait CaptureBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquire devices and start rendering
    ///
    /// Blocks until the device is running or has failed. Any failure to
    /// acquire (permission, missing device, device already held) is
    /// reported as `EngineError::DeviceUnavailable`.
    fn open(
        &self,
        config: &EngineConfig,
        renderer: GraphRenderer,
    ) -> EngineResult<Box<dyn DeviceStream>>;
}

/// A running device path; closing it releases the device
pub trait DeviceStream: Send {
    fn device_name(&self) -> &str;

    /// Stop the device clock and free the renderer with every unit it held
    fn close(self: Box<Self>);
}
