//! Engine and Stream Configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels as usize > hush_dsp::MAX_CHANNELS {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Ramp windows applied to control changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Per-source frequency / intensity / compensation ramp
    pub source_ramp_ms: f32,

    /// Master gain ramp
    pub master_ramp_ms: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            source_ramp_ms: 50.0,
            master_ramp_ms: 100.0,
        }
    }
}

impl SmoothingConfig {
    pub fn source_ramp_secs(&self) -> f32 {
        self.source_ramp_ms / 1000.0
    }

    pub fn master_ramp_secs(&self) -> f32 {
        self.master_ramp_ms / 1000.0
    }
}

fn default_master_gain() -> f32 {
    0.7
}

fn default_max_units() -> usize {
    64
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub stream: StreamConfig,

    /// Capture -> render ring capacity in frames (multiple of buffer_size)
    pub ring_buffer_frames: usize,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    /// Master gain the session starts at when nothing was declared yet
    #[serde(default = "default_master_gain")]
    pub initial_master_gain: f32,

    /// Upper bound on simultaneously live suppression units
    #[serde(default = "default_max_units")]
    pub max_units: usize,

    /// Capture device by name; `None` picks the system default
    #[serde(default)]
    pub input_device: Option<String>,

    /// Playback device by name; `None` picks the system default
    #[serde(default)]
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            // 4 buffers worth of ring buffer capacity
            ring_buffer_frames: 512 * 4,
            smoothing: SmoothingConfig::default(),
            initial_master_gain: default_master_gain(),
            max_units: default_max_units(),
            input_device: None,
            output_device: None,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.6ms latency
            },
            ring_buffer_frames: 128 * 8,
            ..Self::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms latency
            },
            ring_buffer_frames: 1024 * 4,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.stream.validate().map_err(EngineError::ConfigError)?;

        if self.ring_buffer_frames < self.stream.buffer_size as usize {
            return Err(EngineError::ConfigError(format!(
                "Ring buffer ({} frames) smaller than one buffer ({} frames)",
                self.ring_buffer_frames, self.stream.buffer_size
            )));
        }
        if self.max_units == 0 || self.max_units > 256 {
            return Err(EngineError::ConfigError(format!(
                "Invalid unit capacity: {}",
                self.max_units
            )));
        }
        for ramp in [self.smoothing.source_ramp_ms, self.smoothing.master_ramp_ms] {
            if !ramp.is_finite() || ramp < 0.0 {
                return Err(EngineError::ConfigError(format!("Invalid ramp: {}ms", ramp)));
            }
        }
        if !(0.0..=1.0).contains(&self.initial_master_gain) {
            return Err(EngineError::ConfigError(format!(
                "Master gain out of range: {}",
                self.initial_master_gain
            )));
        }
        Ok(())
    }

    /// Load a JSON config file, falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default config ({})", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stream.sample_rate, 48000);
        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.initial_master_gain, 0.7);
        assert_eq!(config.smoothing.source_ramp_ms, 50.0);
        assert_eq!(config.smoothing.master_ramp_ms, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_latency_calculation() {
        let config = StreamConfig {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 480, // Exactly 10ms at 48kHz
        };
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_presets_validate() {
        assert!(EngineConfig::low_latency().validate().is_ok());
        assert!(EngineConfig::stable().validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.stream.sample_rate = 1000;
        assert!(matches!(config.validate(), Err(EngineError::ConfigError(_))));

        let mut config = EngineConfig::default();
        config.ring_buffer_frames = 16;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_units = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.smoothing.master_ramp_ms = -1.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.initial_master_gain = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backward_compat_missing_fields() {
        let json = r#"{
            "stream": {"sample_rate": 44100, "channels": 1, "buffer_size": 256},
            "ring_buffer_frames": 1024
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stream.sample_rate, 44100);
        assert_eq!(config.smoothing, SmoothingConfig::default());
        assert_eq!(config.max_units, 64);
        assert!(config.input_device.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("hush-config-{}.json", std::process::id()));
        let mut config = EngineConfig::stable();
        config.input_device = Some("USB Mic".into());
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = EngineConfig::load_or_default(Path::new("/nonexistent/hush.json"));
        assert_eq!(config, EngineConfig::default());
    }
}
