//! Theme registry.
//!
//! Each theme bundles a procedural shader program for the sphere, an ordered
//! color palette and the particle variant that orbits it. The table is fixed
//! at build time; adding a theme means adding a row here and a WGSL file, the
//! render loop never branches on theme names.

use crate::error::EngineError;
use crate::particle::ParticleVariant;

/// Theme used when a requested theme is unknown or fails to compile.
pub const DEFAULT_THEME: &str = "default";

/// Prelude prepended to every theme program: uniform block, vertex layout
/// and the shared noise/lighting helpers.
pub const COMMON_PRELUDE: &str = include_str!("gpu/shaders/common.wgsl");

/// Blend modes for particle rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Standard alpha blending.
    AlphaBlend,
    /// Additive blending (for glows, sparks).
    #[default]
    Additive,
}

impl BlendMode {
    /// Convert to wgpu blend state.
    pub fn to_blend_state(&self) -> wgpu::BlendState {
        match self {
            BlendMode::AlphaBlend => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }
}

/// A vertex/fragment program pair in WGSL.
#[derive(Clone, Copy, Debug)]
pub struct ShaderProgram {
    pub label: &'static str,
    /// Theme body; compiled after [`COMMON_PRELUDE`].
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

impl ShaderProgram {
    const fn wgsl(label: &'static str, source: &'static str) -> Self {
        Self {
            label,
            source,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        }
    }

    /// Full module source as handed to the shader compiler.
    pub fn full_source(&self) -> String {
        let mut source = String::with_capacity(COMMON_PRELUDE.len() + self.source.len() + 1);
        source.push_str(COMMON_PRELUDE);
        source.push('\n');
        source.push_str(self.source);
        source
    }
}

/// Immutable description of one theme.
#[derive(Debug)]
pub struct ThemeDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    /// Linear RGB, at least three entries. The first is the dominant color.
    pub palette: &'static [[f32; 3]],
    pub program: ShaderProgram,
    pub particle_variant: ParticleVariant,
    /// Particle count on a high tier adapter, scaled down by the GPU profile.
    pub particle_count: u32,
    pub particle_blend: BlendMode,
    /// Background clear color for the scene target.
    pub clear_color: [f32; 3],
}

impl ThemeDescriptor {
    /// Palette padded (by repeating the last color) or truncated to four slots.
    pub fn palette_slots(&self) -> [[f32; 4]; 4] {
        let mut slots = [[0.0, 0.0, 0.0, 1.0]; 4];
        for (i, slot) in slots.iter_mut().enumerate() {
            let color = self.palette[i.min(self.palette.len() - 1)];
            *slot = [color[0], color[1], color[2], 1.0];
        }
        slots
    }
}

pub static THEMES: [ThemeDescriptor; 8] = [
    ThemeDescriptor {
        id: "default",
        name: "Default",
        palette: &[[0.35, 0.55, 1.0], [0.62, 0.36, 1.0], [0.85, 0.92, 1.0]],
        program: ShaderProgram::wgsl("Theme Shader: default", include_str!("gpu/shaders/theme_default.wgsl")),
        particle_variant: ParticleVariant::Generic,
        particle_count: 600,
        particle_blend: BlendMode::Additive,
        clear_color: [0.01, 0.012, 0.025],
    },
    ThemeDescriptor {
        id: "cyberpunk",
        name: "Cyberpunk",
        palette: &[[1.0, 0.1, 0.65], [0.05, 0.95, 1.0], [1.0, 0.9, 0.1], [0.45, 0.1, 0.9]],
        program: ShaderProgram::wgsl("Theme Shader: cyberpunk", include_str!("gpu/shaders/theme_cyberpunk.wgsl")),
        particle_variant: ParticleVariant::RadialOrbit,
        particle_count: 900,
        particle_blend: BlendMode::Additive,
        clear_color: [0.02, 0.0, 0.04],
    },
    ThemeDescriptor {
        id: "matrix",
        name: "Matrix",
        palette: &[[0.1, 1.0, 0.35], [0.0, 0.55, 0.15], [0.7, 1.0, 0.75]],
        program: ShaderProgram::wgsl("Theme Shader: matrix", include_str!("gpu/shaders/theme_matrix.wgsl")),
        particle_variant: ParticleVariant::FallingCascade,
        particle_count: 1200,
        particle_blend: BlendMode::Additive,
        clear_color: [0.0, 0.02, 0.0],
    },
    ThemeDescriptor {
        id: "neural",
        name: "Neural",
        palette: &[[0.95, 0.55, 0.2], [1.0, 0.85, 0.5], [0.55, 0.25, 0.75]],
        program: ShaderProgram::wgsl("Theme Shader: neural", include_str!("gpu/shaders/theme_neural.wgsl")),
        particle_variant: ParticleVariant::SynapticLinks,
        particle_count: 720,
        particle_blend: BlendMode::Additive,
        clear_color: [0.02, 0.01, 0.02],
    },
    ThemeDescriptor {
        id: "quantum",
        name: "Quantum",
        palette: &[[0.4, 0.3, 1.0], [0.1, 0.9, 0.9], [1.0, 1.0, 1.0]],
        program: ShaderProgram::wgsl("Theme Shader: quantum", include_str!("gpu/shaders/theme_quantum.wgsl")),
        particle_variant: ParticleVariant::QuantumJitter,
        particle_count: 800,
        particle_blend: BlendMode::Additive,
        clear_color: [0.005, 0.005, 0.03],
    },
    ThemeDescriptor {
        id: "fractal",
        name: "Fractal",
        palette: &[[1.0, 0.45, 0.15], [0.95, 0.2, 0.45], [0.3, 0.15, 0.6], [1.0, 0.9, 0.6]],
        program: ShaderProgram::wgsl("Theme Shader: fractal", include_str!("gpu/shaders/theme_fractal.wgsl")),
        particle_variant: ParticleVariant::FractalPoints,
        particle_count: 1024,
        particle_blend: BlendMode::Additive,
        clear_color: [0.02, 0.01, 0.015],
    },
    ThemeDescriptor {
        id: "ethereal",
        name: "Ethereal",
        palette: &[[0.85, 0.8, 1.0], [0.6, 0.85, 1.0], [1.0, 0.75, 0.9]],
        program: ShaderProgram::wgsl("Theme Shader: ethereal", include_str!("gpu/shaders/theme_ethereal.wgsl")),
        particle_variant: ParticleVariant::DriftingMotes,
        particle_count: 500,
        particle_blend: BlendMode::AlphaBlend,
        clear_color: [0.03, 0.03, 0.05],
    },
    ThemeDescriptor {
        id: "hologram",
        name: "Hologram",
        palette: &[[0.2, 0.85, 1.0], [0.6, 1.0, 1.0], [0.1, 0.35, 0.9]],
        program: ShaderProgram::wgsl("Theme Shader: hologram", include_str!("gpu/shaders/theme_hologram.wgsl")),
        particle_variant: ParticleVariant::InterferenceField,
        particle_count: 1024,
        particle_blend: BlendMode::Additive,
        clear_color: [0.0, 0.015, 0.03],
    },
];

/// Look up a theme by id.
pub fn get_theme(id: &str) -> Result<&'static ThemeDescriptor, EngineError> {
    THEMES
        .iter()
        .find(|theme| theme.id == id)
        .ok_or_else(|| EngineError::UnknownTheme(id.to_string()))
}

pub fn default_theme() -> &'static ThemeDescriptor {
    &THEMES[0]
}

/// Registered theme ids in table order.
pub fn theme_ids() -> impl Iterator<Item = &'static str> {
    THEMES.iter().map(|theme| theme.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_has_builtin_themes() {
        for id in ["default", "cyberpunk", "matrix", "neural", "quantum", "fractal", "ethereal", "hologram"] {
            assert!(get_theme(id).is_ok(), "missing theme {id}");
        }
        assert_eq!(default_theme().id, DEFAULT_THEME);
        assert_eq!(theme_ids().collect::<HashSet<_>>().len(), THEMES.len());
    }

    #[test]
    fn test_unknown_theme_is_an_error() {
        match get_theme("invalid-id") {
            Err(EngineError::UnknownTheme(id)) => assert_eq!(id, "invalid-id"),
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn test_ids_unique_and_palettes_complete() {
        let mut seen = HashSet::new();
        for theme in THEMES.iter() {
            assert!(seen.insert(theme.id), "duplicate theme {}", theme.id);
            assert!(theme.palette.len() >= 3, "{} palette too short", theme.id);
            assert!(theme.particle_count > 0);
        }
    }

    #[test]
    fn test_each_theme_owns_a_distinct_particle_variant() {
        let variants: HashSet<_> = THEMES.iter().map(|t| t.particle_variant).collect();
        assert_eq!(variants.len(), THEMES.len());
        assert_eq!(default_theme().particle_variant, ParticleVariant::Generic);
    }

    #[test]
    fn test_palette_slots_repeat_last_color() {
        let theme = get_theme("matrix").unwrap();
        let slots = theme.palette_slots();
        assert_eq!(slots[2], [0.7, 1.0, 0.75, 1.0]);
        assert_eq!(slots[3], slots[2]);
    }

    #[test]
    fn test_full_source_starts_with_prelude() {
        let source = default_theme().program.full_source();
        assert!(source.starts_with(COMMON_PRELUDE));
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn fs_main"));
    }
}
