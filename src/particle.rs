//! Particle system core types and the single-instance manager.
//!
//! A theme names one [`ParticleVariant`]; the manager builds that variant's
//! strategy, owns the CPU-side point buffer and mirrors it into one GPU
//! buffer. Point buffers are sized once at activation and mutated in place
//! every frame.

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::backend::{BufferId, RenderBackend};
use crate::error::EngineError;
use crate::particle_variants;
use crate::theme::ThemeDescriptor;

/// Per-point data uploaded to the GPU as instance attributes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 3],
    pub size: f32,
    /// RGB plus opacity.
    pub color: [f32; 4],
}

impl ParticleVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32, 2 => Float32x4];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ParticleVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Generator strategies selectable by themes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticleVariant {
    Generic,
    RadialOrbit,
    FallingCascade,
    SynapticLinks,
    QuantumJitter,
    FractalPoints,
    DriftingMotes,
    InterferenceField,
}

impl ParticleVariant {
    /// Build a fresh strategy for this variant.
    pub fn strategy(&self) -> Box<dyn ParticleStrategy> {
        match self {
            ParticleVariant::Generic => Box::new(particle_variants::GenericShell::default()),
            ParticleVariant::RadialOrbit => Box::new(particle_variants::RadialOrbit::default()),
            ParticleVariant::FallingCascade => Box::new(particle_variants::FallingCascade::default()),
            ParticleVariant::SynapticLinks => Box::new(particle_variants::SynapticLinks::default()),
            ParticleVariant::QuantumJitter => Box::new(particle_variants::QuantumJitter::default()),
            ParticleVariant::FractalPoints => Box::new(particle_variants::FractalPoints::default()),
            ParticleVariant::DriftingMotes => Box::new(particle_variants::DriftingMotes::default()),
            ParticleVariant::InterferenceField => Box::new(particle_variants::InterferenceField::default()),
        }
    }
}

/// Deterministic xorshift64 generator.
#[derive(Clone, Debug)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        // Seed 0 is degenerate for xorshift (produces all zeros)
        Self {
            state: if seed == 0 { 0x5DEECE66D } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    /// Uniformly distributed unit vector.
    pub fn unit_vector(&mut self) -> [f32; 3] {
        let z = self.range(-1.0, 1.0);
        let theta = self.range(0.0, std::f32::consts::TAU);
        let r = (1.0 - z * z).max(0.0).sqrt();
        [r * theta.cos(), r * theta.sin(), z]
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next_u64() % items.len() as u64) as usize]
    }
}

/// Per-frame inputs to a particle strategy.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParticleFrame {
    /// Seconds since the engine started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
    pub audio_level: f32,
    pub intensity: f32,
    pub speed: f32,
}

/// Generator and per-frame update rule for one particle variant.
pub trait ParticleStrategy {
    fn variant(&self) -> ParticleVariant;

    /// Fill `points` with the initial layout and allocate any per-point state.
    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng);

    /// Mutate `points` in place. Must not allocate.
    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame);

    /// Rotation of the whole system around the vertical axis, radians per
    /// second at speed 1.
    fn rotation_rate(&self) -> f32 {
        0.1
    }

    /// Release strategy-owned state.
    fn dispose(&mut self) {}
}

/// The live particle system of the active theme.
pub struct ParticleSystemInstance {
    pub variant: ParticleVariant,
    pub owner: &'static str,
    pub buffer: BufferId,
    pub points: Vec<ParticleVertex>,
    pub rotation: f32,
    strategy: Box<dyn ParticleStrategy>,
}

impl ParticleSystemInstance {
    pub fn rotation_rate(&self) -> f32 {
        self.strategy.rotation_rate()
    }
}

/// Owns at most one particle system at a time.
pub struct ParticleManager {
    active: Option<ParticleSystemInstance>,
    budget_scale: f32,
    seed: u64,
}

impl ParticleManager {
    pub fn new(budget_scale: f32, seed: u64) -> Self {
        Self {
            active: None,
            budget_scale: budget_scale.clamp(0.05, 1.0),
            seed,
        }
    }

    /// Number of points a theme gets under the current budget.
    pub fn budget_for(&self, theme: &ThemeDescriptor) -> usize {
        ((theme.particle_count as f32 * self.budget_scale).round() as usize).max(1)
    }

    /// Build the theme's particle system, disposing any previous instance first.
    pub fn activate<B: RenderBackend>(
        &mut self,
        theme: &'static ThemeDescriptor,
        backend: &mut B,
    ) -> Result<&ParticleSystemInstance, EngineError> {
        self.deactivate(backend);

        let count = self.budget_for(theme);
        let mut strategy = theme.particle_variant.strategy();
        let mut points = vec![ParticleVertex::zeroed(); count];
        let mut rng = Rng::new(self.seed);
        strategy.create(&mut points, theme.palette, &mut rng);

        let buffer = backend.create_particle_buffer(theme.id, count)?;
        if let Err(e) = backend.write_particles(buffer, &points) {
            backend.release_buffer(buffer);
            return Err(e);
        }

        log::debug!(
            "Activated {:?} particles for theme '{}' ({} points)",
            theme.particle_variant,
            theme.id,
            count
        );

        Ok(self.active.insert(ParticleSystemInstance {
            variant: theme.particle_variant,
            owner: theme.id,
            buffer,
            points,
            rotation: 0.0,
            strategy,
        }))
    }

    /// Advance the live instance and upload it.
    pub fn update<B: RenderBackend>(
        &mut self,
        frame: &ParticleFrame,
        backend: &mut B,
    ) -> Result<(), EngineError> {
        let Some(instance) = self.active.as_mut() else {
            return Ok(());
        };
        instance.strategy.update(&mut instance.points, frame);
        instance.rotation = (instance.rotation
            + instance.strategy.rotation_rate() * frame.speed * frame.dt)
            % std::f32::consts::TAU;
        backend.write_particles(instance.buffer, &instance.points)
    }

    /// Dispose the live instance and its GPU buffer.
    pub fn deactivate<B: RenderBackend>(&mut self, backend: &mut B) {
        if let Some(mut instance) = self.active.take() {
            instance.strategy.dispose();
            backend.release_buffer(instance.buffer);
            log::debug!("Disposed {:?} particles of theme '{}'", instance.variant, instance.owner);
        }
    }

    pub fn active(&self) -> Option<&ParticleSystemInstance> {
        self.active.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::theme::get_theme;

    #[test]
    fn test_seed_zero_is_not_degenerate() {
        let mut rng = Rng::new(0);
        let values: Vec<f32> = (0..8).map(|_| rng.next_f32()).collect();
        assert!(values.iter().any(|&v| v > 0.0));
        assert!(values.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_rng_is_deterministic() {
        let mut a = Rng::new(42);
        let mut b = Rng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_unit_vectors_have_unit_length() {
        let mut rng = Rng::new(7);
        for _ in 0..100 {
            let [x, y, z] = rng.unit_vector();
            assert!(((x * x + y * y + z * z).sqrt() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_vertex_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<ParticleVertex>(), 32);
    }

    #[test]
    fn test_activate_replaces_previous_instance() {
        let mut backend = NullBackend::new();
        let mut manager = ParticleManager::new(1.0, 1);

        manager.activate(get_theme("matrix").unwrap(), &mut backend).unwrap();
        manager.activate(get_theme("neural").unwrap(), &mut backend).unwrap();

        assert_eq!(backend.live_buffer_count(), 1);
        assert_eq!(backend.released_buffer_count(), 1);
        let active = manager.active().unwrap();
        assert_eq!(active.owner, "neural");
        assert_eq!(active.variant, ParticleVariant::SynapticLinks);
    }

    #[test]
    fn test_budget_scale_shrinks_count() {
        let theme = get_theme("matrix").unwrap();
        let full = ParticleManager::new(1.0, 1).budget_for(theme);
        let half = ParticleManager::new(0.5, 1).budget_for(theme);
        assert_eq!(full, 1200);
        assert_eq!(half, 600);
    }

    #[test]
    fn test_update_keeps_buffer_size() {
        let mut backend = NullBackend::new();
        let mut manager = ParticleManager::new(1.0, 9);
        manager.activate(get_theme("cyberpunk").unwrap(), &mut backend).unwrap();
        let before = manager.active().unwrap().points.len();
        let frame = ParticleFrame { time: 1.0, dt: 1.0 / 60.0, audio_level: 0.8, intensity: 1.0, speed: 2.0 };
        for _ in 0..10 {
            manager.update(&frame, &mut backend).unwrap();
        }
        assert_eq!(manager.active().unwrap().points.len(), before);
        assert!(manager.active().unwrap().rotation != 0.0);
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut backend = NullBackend::new();
        let mut manager = ParticleManager::new(1.0, 3);
        manager.activate(get_theme("default").unwrap(), &mut backend).unwrap();
        manager.deactivate(&mut backend);
        manager.deactivate(&mut backend);
        assert_eq!(backend.released_buffer_count(), 1);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
