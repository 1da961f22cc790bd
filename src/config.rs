//! Creation-time configuration supplied by the surrounding dashboard.
//!
//! The same JSON shape is accepted by the native CLI (`--config`) and by the
//! browser entry point, so field names are camelCase.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::emotion::DEFAULT_EMOTION;
use crate::theme::DEFAULT_THEME;

/// Whether the particle system is drawn around the sphere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualizationMode {
    /// Sphere plus the theme's particle system.
    #[default]
    Full,
    /// Sphere only; the particle system stays allocated but is not drawn.
    SphereOnly,
}

impl VisualizationMode {
    pub fn draws_particles(&self) -> bool {
        matches!(self, VisualizationMode::Full)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Frame surface width in pixels.
    pub width: u32,
    /// Frame surface height in pixels.
    pub height: u32,
    /// Linear RGB tint mixed into every theme.
    pub base_color: [f32; 3],
    pub theme: String,
    pub emotion: String,
    pub mode: VisualizationMode,
    /// Multiplier applied to the averaged microphone spectrum before clamping.
    pub audio_gain: f32,
    /// Transition length used by hosts that do not pass an explicit duration.
    pub emotion_transition_ms: f64,
    /// Seed for particle generation. Equal seeds give identical layouts.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            base_color: [0.35, 0.55, 1.0],
            theme: DEFAULT_THEME.to_string(),
            emotion: DEFAULT_EMOTION.to_string(),
            mode: VisualizationMode::Full,
            audio_gain: 1.5,
            emotion_transition_ms: 800.0,
            seed: 0x5DEECE66D,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        Ok(config)
    }

    /// Width and height with zero dimensions raised to one pixel.
    pub fn surface_size(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{"theme":"matrix","audioGain":2.0}"#).unwrap();
        assert_eq!(config.theme, "matrix");
        assert_eq!(config.audio_gain, 2.0);
        assert_eq!(config.emotion, DEFAULT_EMOTION);
        assert_eq!(config.width, 512);
    }

    #[test]
    fn test_mode_serialization() {
        let config = EngineConfig::from_json_str(r#"{"mode":"sphereOnly"}"#).unwrap();
        assert_eq!(config.mode, VisualizationMode::SphereOnly);
        assert!(!config.mode.draws_particles());
    }

    #[test]
    fn test_surface_size_never_zero() {
        let config = EngineConfig { width: 0, height: 0, ..Default::default() };
        assert_eq!(config.surface_size(), (1, 1));
    }
}
