//! Source Declarations
//!
//! The engine's read-only view of the external source list. A snapshot is
//! an ordered `Vec<SourceDeclaration>`; identity is the [`SourceId`], every
//! other field may change between snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Lowest center frequency a source can be tuned to (Hz)
pub const MIN_FREQUENCY_HZ: f32 = 60.0;

/// Highest center frequency a source can be tuned to (Hz)
pub const MAX_FREQUENCY_HZ: f32 = 4000.0;

/// Stable identifier of a declared source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of ambient noise a source represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    Ac,
    Chatter,
    Traffic,
    Keyboard,
    Music,
    #[default]
    Custom,
}

impl NoiseKind {
    pub const ALL: [NoiseKind; 6] = [
        NoiseKind::Ac,
        NoiseKind::Chatter,
        NoiseKind::Traffic,
        NoiseKind::Keyboard,
        NoiseKind::Music,
        NoiseKind::Custom,
    ];

    pub fn label(self) -> &'static str {
        match self {
            NoiseKind::Ac => "Humming AC",
            NoiseKind::Chatter => "Coworkers",
            NoiseKind::Traffic => "Traffic",
            NoiseKind::Keyboard => "Keyboards",
            NoiseKind::Music => "Background Music",
            NoiseKind::Custom => "Custom Noise",
        }
    }

    /// Typical center frequency of this noise (Hz)
    pub fn default_frequency_hz(self) -> f32 {
        match self {
            NoiseKind::Ac => 120.0,
            NoiseKind::Chatter => 800.0,
            NoiseKind::Traffic => 250.0,
            NoiseKind::Keyboard => 1200.0,
            NoiseKind::Music => 440.0,
            NoiseKind::Custom => 500.0,
        }
    }

    pub fn default_intensity(self) -> f32 {
        match self {
            NoiseKind::Ac => 0.7,
            NoiseKind::Chatter => 0.6,
            NoiseKind::Traffic => 0.5,
            NoiseKind::Keyboard => 0.4,
            NoiseKind::Music => 0.45,
            NoiseKind::Custom => 0.5,
        }
    }

    /// Parse the lowercase wire name (`"ac"`, `"chatter"`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            NoiseKind::Ac => "ac",
            NoiseKind::Chatter => "chatter",
            NoiseKind::Traffic => "traffic",
            NoiseKind::Keyboard => "keyboard",
            NoiseKind::Music => "music",
            NoiseKind::Custom => "custom",
        }
    }
}

fn default_active() -> bool {
    true
}

/// One declared noise source to suppress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDeclaration {
    pub id: SourceId,

    #[serde(default)]
    pub kind: NoiseKind,

    /// Center of the band to attenuate (Hz, positive)
    pub center_frequency_hz: f32,

    /// How hard to suppress (0.0 - 1.0)
    pub suppression_intensity: f32,

    /// Inactive sources are declared but not processed
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Sanitised parameters a suppression unit is driven with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressionParams {
    pub frequency_hz: f32,
    pub intensity: f32,
}

impl SourceDeclaration {
    /// Active custom source
    pub fn new(id: impl Into<SourceId>, center_frequency_hz: f32, suppression_intensity: f32) -> Self {
        Self {
            id: id.into(),
            kind: NoiseKind::Custom,
            center_frequency_hz,
            suppression_intensity,
            active: true,
        }
    }

    /// Active source seeded with a noise kind's typical frequency and intensity
    pub fn from_preset(id: impl Into<SourceId>, kind: NoiseKind) -> Self {
        Self {
            id: id.into(),
            kind,
            center_frequency_hz: kind.default_frequency_hz(),
            suppression_intensity: kind.default_intensity(),
            active: true,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_frequency(mut self, center_frequency_hz: f32) -> Self {
        self.center_frequency_hz = center_frequency_hz;
        self
    }

    pub fn with_intensity(mut self, suppression_intensity: f32) -> Self {
        self.suppression_intensity = suppression_intensity;
        self
    }

    /// Validate and clamp into the parameters a unit is driven with
    ///
    /// Frequencies are clamped to 60 - 4000 Hz and intensity to 0 - 1.
    /// Non-finite values and non-positive frequencies are rejected.
    pub fn sanitized(&self) -> EngineResult<SuppressionParams> {
        let freq = self.center_frequency_hz;
        if !(freq.is_finite() && freq > 0.0) {
            return Err(EngineError::InvalidDeclaration {
                id: self.id.clone(),
                reason: format!("center frequency must be positive, got {}", freq),
            });
        }
        if !self.suppression_intensity.is_finite() {
            return Err(EngineError::InvalidDeclaration {
                id: self.id.clone(),
                reason: "intensity is not a number".into(),
            });
        }

        Ok(SuppressionParams {
            frequency_hz: freq.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
            intensity: self.suppression_intensity.clamp(0.0, 1.0),
        })
    }
}
