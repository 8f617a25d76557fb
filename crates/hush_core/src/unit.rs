//! Suppression Unit Handles
//!
//! The control-side face of one suppression unit. The DSP state itself
//! lives in the render chain; a handle records where it is attached and
//! the targets last sent to it.

use hush_dsp::compensation_gain;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::graph::UnitKey;
use crate::session::{SessionHandle, SessionId};
use crate::source::{SourceId, SuppressionParams};

/// Handle to one live suppression unit
///
/// Must be released exactly once. Releasing twice fails with
/// `DoubleRelease`; dropping an unreleased handle is logged.
#[derive(Debug)]
pub struct SuppressionUnitHandle {
    id: SourceId,
    key: UnitKey,
    session: SessionId,
    frequency_hz: f32,
    intensity: f32,
    released: bool,
}

impl SuppressionUnitHandle {
    /// Build a unit seeded at `params` and attach it to the session graph
    ///
    /// The unit starts at its initial parameters with no ramp.
    pub fn create(
        session: &SessionHandle,
        id: SourceId,
        params: SuppressionParams,
    ) -> EngineResult<Self> {
        let unit = session.build_unit(params)?;
        let key = session.attach(&id, unit)?;

        Ok(Self {
            id,
            key,
            session: session.id(),
            frequency_hz: params.frequency_hz,
            intensity: params.intensity,
            released: false,
        })
    }

    /// Ramp the notch center to `frequency_hz`
    pub fn set_frequency(&mut self, session: &SessionHandle, frequency_hz: f32) -> EngineResult<()> {
        self.ensure_usable(session)?;
        session.set_frequency(self.key, frequency_hz)?;
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Ramp notch depth and compensating gain together to `intensity`
    pub fn set_intensity(&mut self, session: &SessionHandle, intensity: f32) -> EngineResult<()> {
        self.ensure_usable(session)?;
        let intensity = intensity.clamp(0.0, 1.0);
        session.set_intensity(self.key, intensity)?;
        self.intensity = intensity;
        Ok(())
    }

    /// Detach the unit from the graph
    pub fn release(&mut self, session: &SessionHandle) -> EngineResult<()> {
        if self.released {
            return Err(EngineError::DoubleRelease(self.id.clone()));
        }
        self.ensure_session(session)?;
        session.detach(self.key, &self.id)?;
        self.released = true;
        Ok(())
    }

    /// Mark released because the whole session was torn down underneath
    pub(crate) fn forget(&mut self) {
        self.released = true;
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn key(&self) -> UnitKey {
        self.key
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn frequency_target(&self) -> f32 {
        self.frequency_hz
    }

    pub fn intensity_target(&self) -> f32 {
        self.intensity
    }

    pub fn compensation_target(&self) -> f32 {
        compensation_gain(self.intensity)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_usable(&self, session: &SessionHandle) -> EngineResult<()> {
        if self.released {
            return Err(EngineError::InvariantViolation(format!(
                "edit on released unit for '{}'",
                self.id
            )));
        }
        self.ensure_session(session)
    }

    fn ensure_session(&self, session: &SessionHandle) -> EngineResult<()> {
        if session.id() != self.session {
            return Err(EngineError::InvariantViolation(format!(
                "unit for '{}' belongs to session {}, not {}",
                self.id,
                self.session,
                session.id()
            )));
        }
        Ok(())
    }
}

impl Drop for SuppressionUnitHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Suppression unit for '{}' dropped without release (session {})",
                self.id, self.session
            );
        }
    }
}
