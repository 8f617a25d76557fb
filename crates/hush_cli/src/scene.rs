//! Scene files
//!
//! A scene is what a UI would hold: the declared sources and the master
//! gain. The runner feeds it to the engine as a snapshot.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use hush_core::{NoiseKind, SourceDeclaration};
use serde::{Deserialize, Serialize};

fn default_master_gain() -> f32 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default = "default_master_gain")]
    pub master_gain: f32,

    #[serde(default)]
    pub sources: Vec<SourceDeclaration>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            master_gain: default_master_gain(),
            sources: Vec::new(),
        }
    }
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scene {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing scene {}", path.display()))
    }

    /// Append one preset source per name, numbering repeats (`ac-1`, `ac-2`)
    pub fn add_presets(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            let Some(kind) = NoiseKind::from_name(name) else {
                bail!("unknown preset '{}'", name);
            };
            let id = self.unused_id(kind.name());
            self.sources.push(SourceDeclaration::from_preset(id, kind));
        }
        Ok(())
    }

    /// First `<prefix>-<n>` no source in the scene already uses
    fn unused_id(&self, prefix: &str) -> String {
        (1u32..)
            .map(|n| format!("{}-{}", prefix, n))
            .find(|id| self.sources.iter().all(|decl| decl.id.as_str() != id.as_str()))
            .unwrap_or_else(|| prefix.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_defaults() {
        let scene: Scene = serde_json::from_str("{}").unwrap();
        assert_eq!(scene, Scene::default());
        assert_eq!(scene.master_gain, 0.7);
    }

    #[test]
    fn test_add_presets_numbers_repeats() {
        let mut scene = Scene::default();
        scene
            .add_presets(&["ac".to_string(), "AC".to_string(), "music".to_string()])
            .unwrap();
        let ids: Vec<&str> = scene.sources.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ac-1", "ac-2", "music-1"]);
        assert_eq!(scene.sources[2].center_frequency_hz, 440.0);
    }

    #[test]
    fn test_add_presets_skips_ids_taken_by_scene() {
        let json = r#"{"sources": [
            {"id": "ac-2", "kind": "ac", "center_frequency_hz": 100.0, "suppression_intensity": 0.9},
            {"id": "ac-1", "kind": "custom", "center_frequency_hz": 300.0, "suppression_intensity": 0.2}
        ]}"#;
        let mut scene: Scene = serde_json::from_str(json).unwrap();
        scene
            .add_presets(&["ac".to_string(), "ac".to_string()])
            .unwrap();

        let ids: Vec<&str> = scene.sources.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ac-2", "ac-1", "ac-3", "ac-4"]);
        assert_eq!(scene.sources[0].center_frequency_hz, 100.0);
    }

    #[test]
    fn test_unknown_preset() {
        let mut scene = Scene::default();
        assert!(scene.add_presets(&["jackhammer".to_string()]).is_err());
    }

    #[test]
    fn test_scene_parses_sources() {
        let json = r#"{
            "master_gain": 0.5,
            "sources": [
                {"id": "fan", "kind": "ac", "center_frequency_hz": 120.0, "suppression_intensity": 0.8},
                {"id": "radio", "center_frequency_hz": 440.0, "suppression_intensity": 0.3, "active": false}
            ]
        }"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.sources.len(), 2);
        assert_eq!(scene.sources[0].kind, NoiseKind::Ac);
        assert!(!scene.sources[1].active);
    }
}
