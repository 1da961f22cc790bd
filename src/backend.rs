//! Rendering backend seam.
//!
//! The render loop talks to the GPU only through [`RenderBackend`]. The wgpu
//! implementation lives in `gpu::renderer`; [`NullBackend`] validates programs
//! and records every call so the loop can be stepped frame by frame in tests
//! and headless simulations.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::error::EngineError;
use crate::gpu_profile::{AdapterIdentity, GpuProfile, GpuTier, ToneMapping};
use crate::particle::ParticleVertex;
use crate::post_processing::{PassParams, PostPass, PostPassKind};
use crate::shader_check;
use crate::theme::{BlendMode, ThemeDescriptor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ProgramId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BufferId(pub u64);

/// Uniform block shared by every theme program. Must match `Uniforms` in
/// `common.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SphereUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub emotion_color: [f32; 4],
    pub base_color: [f32; 4],
    pub palette: [[f32; 4]; 4],
    pub time: f32,
    pub audio_level: f32,
    pub emotion_intensity: f32,
    pub emotion_speed: f32,
    /// Pulse scale factor, 1.0 when idle.
    pub pulse: f32,
    /// 1.0 enables terminator self-shadowing.
    pub shadows: f32,
    /// Procedural detail multiplier, reduced on low tier adapters.
    pub detail: f32,
    pub _pad: f32,
}

/// Uniform block of the particle billboard program.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
    /// time, audio level, intensity, size scale.
    pub params: [f32; 4],
}

/// Everything the backend needs to draw one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameSubmission<'a> {
    pub program: ProgramId,
    /// `None` draws the sphere alone.
    pub particles: Option<BufferId>,
    pub particle_count: u32,
    pub particle_blend: BlendMode,
    pub post: &'a [PostPass],
    pub tone_mapping: ToneMapping,
    pub clear_color: [f32; 3],
}

pub trait RenderBackend {
    /// Adapter identification for tier profiling; `None` when the context
    /// cannot be introspected.
    fn adapter_identity(&self) -> Option<AdapterIdentity>;

    /// Size render targets and mesh detail for the engine's profile. Called
    /// once before the first program is compiled.
    fn configure(&mut self, profile: &GpuProfile);

    fn compile_program(&mut self, theme: &'static ThemeDescriptor) -> Result<ProgramId, EngineError>;

    fn release_program(&mut self, program: ProgramId);

    /// Allocate a particle buffer with room for `capacity` points.
    fn create_particle_buffer(&mut self, owner: &'static str, capacity: usize) -> Result<BufferId, EngineError>;

    fn write_particles(&mut self, buffer: BufferId, points: &[ParticleVertex]) -> Result<(), EngineError>;

    fn release_buffer(&mut self, buffer: BufferId);

    fn write_uniforms(
        &mut self,
        program: ProgramId,
        sphere: &SphereUniforms,
        particles: &ParticleUniforms,
    ) -> Result<(), EngineError>;

    fn present(&mut self, frame: &FrameSubmission<'_>) -> Result<(), EngineError>;

    fn resize(&mut self, width: u32, height: u32);

    /// Drop scene, post-processing and depth targets.
    fn release_render_targets(&mut self);

    fn live_buffer_count(&self) -> usize;
}

/// Recorded backend call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BackendOp {
    Configure { tier: GpuTier },
    CompileProgram { theme: &'static str },
    ReleaseProgram { theme: &'static str },
    CreateBuffer { owner: &'static str, capacity: usize },
    ReleaseBuffer { owner: &'static str },
    WriteUniforms { theme: &'static str },
    Present { theme: &'static str },
    Resize { width: u32, height: u32 },
    ReleaseRenderTargets,
}

/// Summary of one presented frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedFrame {
    pub program_theme: &'static str,
    pub particle_theme: Option<&'static str>,
    pub particle_count: u32,
    /// Enabled passes, in order.
    pub passes: Vec<PostPassKind>,
    pub bloom_strength: f32,
    pub audio_level: f32,
    pub emotion_intensity: f32,
    pub emotion_speed: f32,
    pub pulse: f32,
}

struct NullBuffer {
    owner: &'static str,
    capacity: usize,
}

/// Headless backend: validates WGSL with naga and records every call.
#[derive(Default)]
pub struct NullBackend {
    adapter: Option<AdapterIdentity>,
    next_id: u64,
    programs: HashMap<ProgramId, &'static str>,
    buffers: HashMap<BufferId, NullBuffer>,
    fail_compile: Vec<String>,
    fail_present: bool,
    pub ops: Vec<BackendOp>,
    pub frames: Vec<PresentedFrame>,
    pub last_uniforms: Option<(SphereUniforms, ParticleUniforms)>,
    released_buffers: usize,
    released_programs: usize,
    render_target_releases: usize,
    size: (u32, u32),
}

impl NullBackend {
    /// A backend whose adapter cannot be introspected.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(adapter: AdapterIdentity) -> Self {
        Self {
            adapter: Some(adapter),
            ..Self::default()
        }
    }

    /// Make `compile_program` fail for `theme_id`.
    pub fn fail_compile_for(&mut self, theme_id: &str) {
        self.fail_compile.push(theme_id.to_string());
    }

    /// Make every `present` fail until reset.
    pub fn set_fail_present(&mut self, fail: bool) {
        self.fail_present = fail;
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn released_buffer_count(&self) -> usize {
        self.released_buffers
    }

    pub fn released_program_count(&self) -> usize {
        self.released_programs
    }

    pub fn render_target_releases(&self) -> usize {
        self.render_target_releases
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn program_theme(&self, program: ProgramId) -> Option<&'static str> {
        self.programs.get(&program).copied()
    }
}

impl RenderBackend for NullBackend {
    fn adapter_identity(&self) -> Option<AdapterIdentity> {
        self.adapter.clone()
    }

    fn configure(&mut self, profile: &GpuProfile) {
        self.ops.push(BackendOp::Configure { tier: profile.tier });
    }

    fn compile_program(&mut self, theme: &'static ThemeDescriptor) -> Result<ProgramId, EngineError> {
        if self.fail_compile.iter().any(|id| id == theme.id) {
            return Err(EngineError::ShaderCompile {
                theme: theme.id.to_string(),
                message: "injected compile failure".to_string(),
            });
        }
        shader_check::validate_theme(theme)?;
        let id = ProgramId(self.next());
        self.programs.insert(id, theme.id);
        self.ops.push(BackendOp::CompileProgram { theme: theme.id });
        Ok(id)
    }

    fn release_program(&mut self, program: ProgramId) {
        if let Some(theme) = self.programs.remove(&program) {
            self.released_programs += 1;
            self.ops.push(BackendOp::ReleaseProgram { theme });
        }
    }

    fn create_particle_buffer(&mut self, owner: &'static str, capacity: usize) -> Result<BufferId, EngineError> {
        let id = BufferId(self.next());
        self.buffers.insert(id, NullBuffer { owner, capacity });
        self.ops.push(BackendOp::CreateBuffer { owner, capacity });
        Ok(id)
    }

    fn write_particles(&mut self, buffer: BufferId, points: &[ParticleVertex]) -> Result<(), EngineError> {
        let Some(slot) = self.buffers.get(&buffer) else {
            return Err(EngineError::Frame(format!("write to released buffer {:?}", buffer)));
        };
        if points.len() > slot.capacity {
            return Err(EngineError::Frame(format!(
                "{} points exceed buffer capacity {}",
                points.len(),
                slot.capacity
            )));
        }
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if let Some(slot) = self.buffers.remove(&buffer) {
            self.released_buffers += 1;
            self.ops.push(BackendOp::ReleaseBuffer { owner: slot.owner });
        }
    }

    fn write_uniforms(
        &mut self,
        program: ProgramId,
        sphere: &SphereUniforms,
        particles: &ParticleUniforms,
    ) -> Result<(), EngineError> {
        let theme = self
            .program_theme(program)
            .ok_or_else(|| EngineError::Frame(format!("uniforms for unknown program {:?}", program)))?;
        self.last_uniforms = Some((*sphere, *particles));
        self.ops.push(BackendOp::WriteUniforms { theme });
        Ok(())
    }

    fn present(&mut self, frame: &FrameSubmission<'_>) -> Result<(), EngineError> {
        if self.fail_present {
            return Err(EngineError::Frame("injected present failure".to_string()));
        }
        let theme = self
            .program_theme(frame.program)
            .ok_or_else(|| EngineError::Frame(format!("present with unknown program {:?}", frame.program)))?;
        let particle_theme = match frame.particles {
            Some(id) => Some(
                self.buffers
                    .get(&id)
                    .map(|b| b.owner)
                    .ok_or_else(|| EngineError::Frame(format!("present with released buffer {:?}", id)))?,
            ),
            None => None,
        };
        let bloom_strength = frame
            .post
            .iter()
            .find_map(|p| match p.params {
                PassParams::Bloom { strength, .. } if p.enabled => Some(strength),
                _ => None,
            })
            .unwrap_or(0.0);
        let sphere = self.last_uniforms.map(|(s, _)| s);

        self.frames.push(PresentedFrame {
            program_theme: theme,
            particle_theme,
            particle_count: frame.particle_count,
            passes: frame.post.iter().filter(|p| p.enabled).map(|p| p.kind).collect(),
            bloom_strength,
            audio_level: sphere.map_or(0.0, |s| s.audio_level),
            emotion_intensity: sphere.map_or(0.0, |s| s.emotion_intensity),
            emotion_speed: sphere.map_or(0.0, |s| s.emotion_speed),
            pulse: sphere.map_or(1.0, |s| s.pulse),
        });
        self.ops.push(BackendOp::Present { theme });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.ops.push(BackendOp::Resize { width, height });
    }

    fn release_render_targets(&mut self) {
        self.render_target_releases += 1;
        self.ops.push(BackendOp::ReleaseRenderTargets);
    }

    fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::get_theme;

    #[test]
    fn test_uniform_sizes_match_shaders() {
        assert_eq!(std::mem::size_of::<SphereUniforms>(), 256);
        assert_eq!(std::mem::size_of::<ParticleUniforms>(), 176);
    }

    #[test]
    fn test_null_backend_tracks_programs() {
        let mut backend = NullBackend::new();
        let program = backend.compile_program(get_theme("quantum").unwrap()).unwrap();
        assert_eq!(backend.program_theme(program), Some("quantum"));
        backend.release_program(program);
        backend.release_program(program);
        assert_eq!(backend.released_program_count(), 1);
        assert_eq!(backend.live_program_count(), 0);
    }

    #[test]
    fn test_injected_compile_failure() {
        let mut backend = NullBackend::new();
        backend.fail_compile_for("matrix");
        let err = backend.compile_program(get_theme("matrix").unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::ShaderCompile { .. }));
    }

    #[test]
    fn test_overflowing_write_is_rejected() {
        let mut backend = NullBackend::new();
        let buffer = backend.create_particle_buffer("default", 2).unwrap();
        let points = vec![ParticleVertex::default(); 3];
        assert!(backend.write_particles(buffer, &points).is_err());
        assert!(backend.write_particles(buffer, &points[..2]).is_ok());
    }
}
