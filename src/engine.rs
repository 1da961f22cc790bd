//! Render loop orchestrator.
//!
//! [`Engine`] owns every piece of mutable visual state through one
//! `EngineContext` and drives it one tick at a time from the host's frame
//! callback. External requests (theme, emotion, pulse, glitch) are validated
//! when they are made and applied at the start of the next tick, so a frame
//! never observes a half-applied change.
//!
//! Lifecycle: `Uninitialized -> Ready -> Running -> Disposed`.

use std::collections::VecDeque;

use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use crate::audio::{AudioBridge, CaptureDevice};
use crate::backend::{FrameSubmission, ParticleUniforms, ProgramId, RenderBackend, SphereUniforms};
use crate::camera::OrbCamera;
use crate::config::{EngineConfig, VisualizationMode};
use crate::emotion::{get_emotion, EmotionSample, EmotionStateMachine, DEFAULT_EMOTION};
use crate::error::EngineError;
use crate::frame::FrameState;
use crate::gpu_profile::{GpuProfile, GpuProfiler};
use crate::particle::{ParticleFrame, ParticleManager};
use crate::post_processing::{PostPassKind, PostPipeline};
use crate::scheduler::{FrameHandle, FrameScheduler};
use crate::theme::{default_theme, get_theme, ThemeDescriptor, DEFAULT_THEME};

/// Base rotation of the sphere in radians per second at emotion speed 1.
const SPHERE_SPIN: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Ready,
    Running,
    Disposed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Signals delivered to the collaborator's listener.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// The imperative API is usable.
    Ready,
    /// Audio could not be acquired; visuals continue silent.
    AudioUnavailable(EngineError),
    /// `requested` failed to compile and the default theme was activated instead.
    ShaderFallback { requested: String, error: EngineError },
    /// A frame was partially skipped. Sent once per run of bad frames.
    FrameDegraded(EngineError),
    Disposed,
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Ready => "ready",
            EngineEvent::AudioUnavailable(_) => "audioUnavailable",
            EngineEvent::ShaderFallback { .. } => "shaderFallback",
            EngineEvent::FrameDegraded(_) => "frameDegraded",
            EngineEvent::Disposed => "disposed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            EngineEvent::Ready | EngineEvent::Disposed => String::new(),
            EngineEvent::AudioUnavailable(e) | EngineEvent::FrameDegraded(e) => e.to_string(),
            EngineEvent::ShaderFallback { requested, error } => format!("{requested}: {error}"),
        }
    }
}

/// Result of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Part of the frame failed; whatever could be presented was.
    Degraded,
    /// The engine is not running.
    Skipped,
}

/// One-shot scale pulse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    pub intensity: f32,
    pub duration_ms: f64,
    pub start_ms: f64,
}

impl Pulse {
    /// Scale factor at `now_ms`, or `None` once the pulse has finished.
    pub fn scale_at(&self, now_ms: f64) -> Option<f32> {
        let progress = (now_ms - self.start_ms) / self.duration_ms;
        if progress >= 1.0 {
            return None;
        }
        let p = progress.max(0.0) as f32;
        Some(1.0 + self.intensity * (std::f32::consts::PI * p).sin())
    }
}

#[derive(Clone, Copy, Debug)]
enum Command {
    ChangeTheme(&'static ThemeDescriptor),
    SetEmotion { id: &'static str, duration_ms: f64 },
    Pulse { intensity: f32, duration_ms: f64 },
    Glitch { duration_ms: f64 },
}

/// All mutable visual state, owned by the engine and lent to each step.
struct EngineContext {
    pub theme: &'static ThemeDescriptor,
    pub program: ProgramId,
    pub particles: ParticleManager,
    pub emotion: EmotionStateMachine,
    pub post: PostPipeline,
    pub frame: FrameState,
    pub camera: OrbCamera,
    pub pulse: Option<Pulse>,
    /// Externally driven level combined with the microphone.
    pub glow: f32,
    pub base_color: [f32; 3],
    pub mode: VisualizationMode,
    /// Sphere rotation around the vertical axis.
    pub rotation: f32,
    degraded_streak: u32,
}

struct EventSink {
    listener: Option<Box<dyn FnMut(&EngineEvent)>>,
}

impl EventSink {
    fn emit(&mut self, event: EngineEvent) {
        match &event {
            EngineEvent::Ready | EngineEvent::Disposed => log::info!("Engine event: {}", event.name()),
            _ => log::warn!("Engine event: {} ({})", event.name(), event.message()),
        }
        if let Some(listener) = self.listener.as_mut() {
            listener(&event);
        }
    }
}

pub struct Engine<B: RenderBackend, S: FrameScheduler> {
    config: EngineConfig,
    profile: GpuProfile,
    backend: B,
    scheduler: S,
    audio: AudioBridge,
    ctx: Option<EngineContext>,
    commands: VecDeque<Command>,
    state: EngineState,
    pending_frame: Option<FrameHandle>,
    events: EventSink,
}

impl<B: RenderBackend, S: FrameScheduler> Engine<B, S> {
    /// Create an engine, profiling the backend's adapter with the default
    /// vendor-string classifier.
    pub fn new(config: EngineConfig, backend: B, scheduler: S) -> Self {
        Self::with_profiler(config, &GpuProfiler::default(), backend, scheduler)
    }

    pub fn with_profiler(config: EngineConfig, profiler: &GpuProfiler, backend: B, scheduler: S) -> Self {
        let profile = profiler.profile(backend.adapter_identity().as_ref());
        let audio = AudioBridge::new(config.audio_gain);
        Self {
            config,
            profile,
            backend,
            scheduler,
            audio,
            ctx: None,
            commands: VecDeque::new(),
            state: EngineState::Uninitialized,
            pending_frame: None,
            events: EventSink { listener: None },
        }
    }

    /// Register the collaborator's event sink. If the engine is already
    /// usable, `Ready` is delivered immediately.
    pub fn set_event_listener(&mut self, listener: impl FnMut(&EngineEvent) + 'static) {
        self.events.listener = Some(Box::new(listener));
        if matches!(self.state, EngineState::Ready | EngineState::Running) {
            self.events.emit(EngineEvent::Ready);
        }
    }

    /// Compile the initial theme, build its particles and configure
    /// post-processing. Fails only when no theme at all can be compiled.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Uninitialized {
            return Err(self.invalid_state("initialize"));
        }

        let requested = get_theme(&self.config.theme).unwrap_or_else(|e| {
            log::warn!("{}, using '{}'", e, DEFAULT_THEME);
            default_theme()
        });
        let emotion = get_emotion(&self.config.emotion).unwrap_or_else(|e| {
            log::warn!("{}, using '{}'", e, DEFAULT_EMOTION);
            &crate::emotion::EMOTIONS[0]
        });

        self.backend.configure(&self.profile);
        let (theme, program) = compile_with_fallback(&mut self.backend, &mut self.events, requested)
            .map_err(|e| EngineError::RenderContextUnavailable(e.to_string()))?;

        let mut particles = ParticleManager::new(self.profile.particle_budget_scale, self.config.seed);
        if let Err(e) = particles.activate(theme, &mut self.backend) {
            self.backend.release_program(program);
            return Err(EngineError::RenderContextUnavailable(e.to_string()));
        }

        let (width, height) = self.config.surface_size();
        let mut camera = OrbCamera::default();
        camera.set_viewport(width, height);
        self.backend.resize(width, height);

        self.ctx = Some(EngineContext {
            theme,
            program,
            particles,
            emotion: EmotionStateMachine::new(emotion),
            post: PostPipeline::configure(&self.profile),
            frame: FrameState::default(),
            camera,
            pulse: None,
            glow: 0.0,
            base_color: self.config.base_color,
            mode: self.config.mode,
            rotation: 0.0,
            degraded_streak: 0,
        });
        self.state = EngineState::Ready;
        log::info!(
            "Engine ready: theme='{}' emotion='{}' tier={:?} size={}x{}",
            theme.id,
            emotion.id,
            self.profile.tier,
            width,
            height
        );
        self.events.emit(EngineEvent::Ready);
        Ok(())
    }

    /// Acquire audio. Never fails: on error the engine keeps rendering with
    /// the level pinned at zero and reports `AudioUnavailable`.
    pub fn attach_audio(&mut self, device: Box<dyn CaptureDevice>) {
        if self.state == EngineState::Disposed {
            log::warn!("Ignoring audio device attached after dispose");
            return;
        }
        if let Err(e) = self.audio.start(device) {
            let e = if e.is_audio() {
                e
            } else {
                EngineError::DeviceUnavailable(e.to_string())
            };
            self.events.emit(EngineEvent::AudioUnavailable(e));
        }
    }

    /// Enter the running state and schedule the first tick.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Running => Ok(()),
            EngineState::Ready => {
                self.state = EngineState::Running;
                self.pending_frame = Some(self.scheduler.request_frame());
                Ok(())
            }
            _ => Err(self.invalid_state("start")),
        }
    }

    /// Run one frame. Called from the host's frame callback.
    pub fn tick(&mut self, now_ms: f64) -> FrameOutcome {
        if self.state != EngineState::Running {
            return FrameOutcome::Skipped;
        }
        self.pending_frame = None;
        let Some(ctx) = self.ctx.as_mut() else {
            return FrameOutcome::Skipped;
        };
        let backend = &mut self.backend;
        let events = &mut self.events;

        while let Some(command) = self.commands.pop_front() {
            apply_command(ctx, backend, events, command, now_ms);
        }

        let sampled = self.audio.sample();
        ctx.frame.advance(now_ms, sampled);
        let emotion = ctx.emotion.tick(now_ms);
        let audio_level = ctx.frame.audio_level.max(ctx.glow);

        let mut failure: Option<EngineError> = None;

        let (sphere, particles) = build_uniforms(ctx, &self.profile, &emotion, audio_level, now_ms);
        if let Err(e) = backend.write_uniforms(ctx.program, &sphere, &particles) {
            failure.get_or_insert(e);
        }

        let particle_frame = ParticleFrame {
            time: ctx.frame.elapsed_s as f32,
            dt: ctx.frame.dt,
            audio_level,
            intensity: emotion.intensity,
            speed: emotion.speed,
        };
        if let Err(e) = ctx.particles.update(&particle_frame, backend) {
            failure.get_or_insert(e);
        }

        let tone_mapping = ctx.post.tone_mapping();
        let draw_particles = ctx.mode.draws_particles();
        let frame_view = ctx.frame.with_audio_level(audio_level);
        let passes = ctx.post.apply(&frame_view, emotion.intensity, now_ms);
        let drawn = ctx
            .particles
            .active()
            .filter(|_| draw_particles)
            .map(|instance| (instance.buffer, instance.points.len() as u32));
        let submission = FrameSubmission {
            program: ctx.program,
            particles: drawn.map(|(buffer, _)| buffer),
            particle_count: drawn.map_or(0, |(_, count)| count),
            particle_blend: ctx.theme.particle_blend,
            post: passes,
            tone_mapping,
            clear_color: ctx.theme.clear_color,
        };
        if let Err(e) = backend.present(&submission) {
            failure.get_or_insert(e);
        }

        self.pending_frame = Some(self.scheduler.request_frame());

        match failure {
            None => {
                ctx.degraded_streak = 0;
                FrameOutcome::Presented
            }
            Some(e) => {
                ctx.degraded_streak += 1;
                if ctx.degraded_streak == 1 {
                    events.emit(EngineEvent::FrameDegraded(e));
                } else {
                    log::debug!("Frame {} degraded: {}", ctx.frame.frame_index, e);
                }
                FrameOutcome::Degraded
            }
        }
    }

    /// Halt the loop and release audio, particles, programs and render
    /// targets. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        if let Some(handle) = self.pending_frame.take() {
            self.scheduler.cancel_frame(handle);
        }
        self.audio.stop();
        if let Some(mut ctx) = self.ctx.take() {
            ctx.particles.deactivate(&mut self.backend);
            self.backend.release_program(ctx.program);
        }
        self.backend.release_render_targets();
        self.commands.clear();
        self.state = EngineState::Disposed;
        self.events.emit(EngineEvent::Disposed);
    }

    /// Queue a theme swap for the next tick. Unknown ids are rejected and
    /// leave the active theme in place.
    pub fn change_theme(&mut self, theme_id: &str) -> Result<(), EngineError> {
        self.ensure_live("changeTheme")?;
        let theme = get_theme(theme_id).inspect_err(|e| log::warn!("Rejected theme change: {}", e))?;
        // Only the latest switch survives until the next tick.
        self.commands.retain(|c| !matches!(c, Command::ChangeTheme(_)));
        self.commands.push_back(Command::ChangeTheme(theme));
        Ok(())
    }

    /// Queue an emotion transition for the next tick.
    pub fn set_emotion(&mut self, emotion_id: &str, duration_ms: f64) -> Result<(), EngineError> {
        self.ensure_live("setEmotion")?;
        let emotion = get_emotion(emotion_id).inspect_err(|e| log::warn!("Rejected emotion change: {}", e))?;
        self.commands.push_back(Command::SetEmotion {
            id: emotion.id,
            duration_ms,
        });
        Ok(())
    }

    /// Trigger a one-shot scale pulse starting at the next tick.
    pub fn pulse(&mut self, intensity: f32, duration_ms: f64) -> Result<(), EngineError> {
        self.ensure_live("pulse")?;
        if !intensity.is_finite() || duration_ms.is_nan() || duration_ms <= 0.0 {
            log::debug!("Ignoring pulse({}, {})", intensity, duration_ms);
            return Ok(());
        }
        self.commands.push_back(Command::Pulse { intensity, duration_ms });
        Ok(())
    }

    /// Drive the audio uniform from an external level.
    pub fn set_glow(&mut self, intensity: f32) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.glow = if intensity.is_nan() { 0.0 } else { intensity.clamp(0.0, 1.0) };
        }
    }

    /// Enable the glitch pass for `duration_ms`. Returns `false` when the
    /// tier has no glitch pass.
    pub fn activate_glitch(&mut self, duration_ms: f64) -> bool {
        if self.ensure_live("activateGlitch").is_err() || !self.profile.has_pass(PostPassKind::Glitch) {
            return false;
        }
        self.commands.push_back(Command::Glitch { duration_ms });
        true
    }

    pub fn set_visualization_mode(&mut self, mode: VisualizationMode) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.mode = mode;
        }
    }

    pub fn set_base_color(&mut self, rgb: [f32; 3]) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.base_color = rgb.map(|c| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 });
        }
    }

    /// Resize the frame surface. Zero dimensions are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.state == EngineState::Disposed {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.backend.resize(width, height);
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.camera.set_viewport(width, height);
        }
    }

    /// Active theme id.
    pub fn current_theme(&self) -> &'static str {
        self.ctx.as_ref().map_or(DEFAULT_THEME, |ctx| ctx.theme.id)
    }

    /// Settled emotion, or the target of the running transition.
    pub fn current_emotion(&self) -> &'static str {
        self.ctx.as_ref().map_or(DEFAULT_EMOTION, |ctx| ctx.emotion.current_id())
    }

    /// Latest microphone level in [0, 1]. Glow is not included.
    pub fn audio_level(&self) -> f32 {
        self.audio.level()
    }

    pub fn frame_state(&self) -> FrameState {
        self.ctx.as_ref().map(|ctx| ctx.frame).unwrap_or_default()
    }

    pub fn gpu_profile(&self) -> &GpuProfile {
        &self.profile
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    fn ensure_live(&self, op: &'static str) -> Result<(), EngineError> {
        match self.state {
            EngineState::Ready | EngineState::Running => Ok(()),
            _ => Err(self.invalid_state(op)),
        }
    }

    fn invalid_state(&self, op: &'static str) -> EngineError {
        EngineError::InvalidState {
            op,
            state: self.state.to_string(),
        }
    }
}

impl<B: RenderBackend, S: FrameScheduler> Drop for Engine<B, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Compile `requested`, falling back to the default theme on a compile error.
fn compile_with_fallback<B: RenderBackend>(
    backend: &mut B,
    events: &mut EventSink,
    requested: &'static ThemeDescriptor,
) -> Result<(&'static ThemeDescriptor, ProgramId), EngineError> {
    match backend.compile_program(requested) {
        Ok(program) => Ok((requested, program)),
        Err(error) if requested.id != DEFAULT_THEME => {
            events.emit(EngineEvent::ShaderFallback {
                requested: requested.id.to_string(),
                error,
            });
            let fallback = default_theme();
            backend.compile_program(fallback).map(|program| (fallback, program))
        }
        Err(error) => Err(error),
    }
}

fn apply_command<B: RenderBackend>(
    ctx: &mut EngineContext,
    backend: &mut B,
    events: &mut EventSink,
    command: Command,
    now_ms: f64,
) {
    match command {
        Command::ChangeTheme(theme) => swap_theme(ctx, backend, events, theme),
        Command::SetEmotion { id, duration_ms } => match ctx.emotion.set_emotion(id, duration_ms, now_ms) {
            Ok(outcome) => log::debug!("setEmotion('{}', {}ms): {:?}", id, duration_ms, outcome),
            Err(e) => log::warn!("setEmotion failed: {}", e),
        },
        Command::Pulse { intensity, duration_ms } => {
            ctx.pulse = Some(Pulse {
                intensity,
                duration_ms,
                start_ms: now_ms,
            });
        }
        Command::Glitch { duration_ms } => {
            ctx.post.activate_glitch(duration_ms, now_ms);
        }
    }
}

/// Replace program and particles together. On any failure the previous
/// theme stays fully active.
fn swap_theme<B: RenderBackend>(
    ctx: &mut EngineContext,
    backend: &mut B,
    events: &mut EventSink,
    requested: &'static ThemeDescriptor,
) {
    if requested.id == ctx.theme.id {
        log::debug!("Theme '{}' already active", requested.id);
        return;
    }

    let (theme, program) = match compile_with_fallback(backend, events, requested) {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("Keeping theme '{}': {}", ctx.theme.id, e);
            return;
        }
    };
    if theme.id == ctx.theme.id {
        backend.release_program(program);
        return;
    }

    if let Err(e) = ctx.particles.activate(theme, backend) {
        log::warn!("Particles for theme '{}' failed: {}; keeping '{}'", theme.id, e, ctx.theme.id);
        backend.release_program(program);
        if let Err(e) = ctx.particles.activate(ctx.theme, backend) {
            log::error!("Could not restore particles for '{}': {}", ctx.theme.id, e);
        }
        return;
    }

    backend.release_program(ctx.program);
    ctx.program = program;
    ctx.theme = theme;
    log::info!("Theme switched to '{}'", theme.id);
}

fn build_uniforms(
    ctx: &mut EngineContext,
    profile: &GpuProfile,
    emotion: &EmotionSample,
    audio_level: f32,
    now_ms: f64,
) -> (SphereUniforms, ParticleUniforms) {
    let pulse = match ctx.pulse.and_then(|p| p.scale_at(now_ms)) {
        Some(scale) => scale,
        None => {
            ctx.pulse = None;
            1.0
        }
    };
    ctx.rotation = (ctx.rotation + SPHERE_SPIN * emotion.speed * ctx.frame.dt) % std::f32::consts::TAU;

    let view_proj = ctx.camera.view_projection_matrix().to_cols_array_2d();
    let scale = Vec3::splat(pulse);
    let sphere_model = Mat4::from_scale_rotation_translation(scale, Quat::from_rotation_y(ctx.rotation), Vec3::ZERO);
    let particle_rotation = ctx.particles.active().map_or(0.0, |p| p.rotation);
    let particle_model =
        Mat4::from_scale_rotation_translation(scale, Quat::from_rotation_y(particle_rotation), Vec3::ZERO);
    let time = ctx.frame.elapsed_s as f32;
    let right = ctx.camera.right();
    let up = ctx.camera.camera_up();

    let sphere = SphereUniforms {
        view_proj,
        model: sphere_model.to_cols_array_2d(),
        emotion_color: [emotion.color[0], emotion.color[1], emotion.color[2], 1.0],
        base_color: [ctx.base_color[0], ctx.base_color[1], ctx.base_color[2], 1.0],
        palette: ctx.theme.palette_slots(),
        time,
        audio_level,
        emotion_intensity: emotion.intensity,
        emotion_speed: emotion.speed,
        pulse,
        shadows: if profile.shadows_enabled() { 1.0 } else { 0.0 },
        detail: if profile.is_high_tier() { 1.0 } else { 0.6 },
        _pad: 0.0,
    };
    let particles = ParticleUniforms {
        view_proj,
        model: particle_model.to_cols_array_2d(),
        camera_right: [right.x, right.y, right.z, 0.0],
        camera_up: [up.x, up.y, up.z, 0.0],
        params: [time, audio_level, emotion.intensity, 1.0],
    };
    (sphere, particles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, NullBackend};
    use crate::gpu_profile::AdapterIdentity;
    use crate::scheduler::ManualScheduler;

    fn engine(theme: &str) -> Engine<NullBackend, ManualScheduler> {
        let config = EngineConfig {
            theme: theme.to_string(),
            ..Default::default()
        };
        let mut engine = Engine::new(config, NullBackend::new(), ManualScheduler::new());
        engine.initialize().unwrap();
        engine.start().unwrap();
        engine
    }

    #[test]
    fn test_pulse_shape() {
        let pulse = Pulse { intensity: 0.5, duration_ms: 200.0, start_ms: 100.0 };
        assert_eq!(pulse.scale_at(100.0), Some(1.0));
        assert!((pulse.scale_at(200.0).unwrap() - 1.5).abs() < 1e-6);
        assert_eq!(pulse.scale_at(300.0), None);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut engine = Engine::new(EngineConfig::default(), NullBackend::new(), ManualScheduler::new());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.start().is_err());
        assert_eq!(engine.tick(0.0), FrameOutcome::Skipped);

        engine.initialize().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.initialize().is_err());

        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert!(engine.scheduler().has_pending());

        engine.stop();
        assert_eq!(engine.state(), EngineState::Disposed);
        assert!(!engine.scheduler().has_pending());
        assert_eq!(engine.tick(16.0), FrameOutcome::Skipped);
    }

    #[test]
    fn test_each_tick_requests_the_next() {
        let mut engine = engine("default");
        for i in 0..5 {
            engine.scheduler_mut().take_pending();
            assert_eq!(engine.tick(i as f64 * 16.0), FrameOutcome::Presented);
            assert!(engine.scheduler().has_pending());
        }
        assert_eq!(engine.scheduler().requested, 6);
    }

    #[test]
    fn test_invalid_config_ids_fall_back() {
        let config = EngineConfig {
            theme: "vaporwave".into(),
            emotion: "bored".into(),
            ..Default::default()
        };
        let mut engine = Engine::new(config, NullBackend::new(), ManualScheduler::new());
        engine.initialize().unwrap();
        assert_eq!(engine.current_theme(), DEFAULT_THEME);
        assert_eq!(engine.current_emotion(), DEFAULT_EMOTION);
    }

    #[test]
    fn test_default_compile_failure_is_fatal() {
        let mut backend = NullBackend::new();
        backend.fail_compile_for(DEFAULT_THEME);
        let mut engine = Engine::new(EngineConfig::default(), backend, ManualScheduler::new());
        assert!(matches!(engine.initialize(), Err(EngineError::RenderContextUnavailable(_))));
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_theme_change_applies_next_tick() {
        let mut engine = engine("default");
        engine.tick(0.0);
        engine.change_theme("matrix").unwrap();
        assert_eq!(engine.current_theme(), "default");
        engine.tick(16.0);
        assert_eq!(engine.current_theme(), "matrix");
        let last = engine.backend().frames.last().unwrap();
        assert_eq!(last.program_theme, "matrix");
        assert_eq!(last.particle_theme, Some("matrix"));
    }

    #[test]
    fn test_tick_order() {
        let mut engine = engine("default");
        engine.tick(0.0);
        let ops: Vec<_> = engine
            .backend()
            .ops
            .iter()
            .rev()
            .take(2)
            .cloned()
            .collect();
        assert_eq!(
            ops,
            vec![BackendOp::Present { theme: "default" }, BackendOp::WriteUniforms { theme: "default" }]
        );
    }

    #[test]
    fn test_glow_drives_audio_uniform_only() {
        let mut engine = engine("default");
        engine.set_glow(0.7);
        engine.tick(0.0);
        assert_eq!(engine.audio_level(), 0.0);
        assert!((engine.backend().frames[0].audio_level - 0.7).abs() < 1e-6);
        engine.set_glow(f32::NAN);
        engine.tick(16.0);
        assert_eq!(engine.backend().frames[1].audio_level, 0.0);
    }

    #[test]
    fn test_pulse_reaches_presented_frames() {
        let mut engine = engine("default");
        engine.pulse(0.4, 100.0).unwrap();
        engine.tick(0.0);
        engine.tick(50.0);
        engine.tick(150.0);
        let pulses: Vec<f32> = engine.backend().frames.iter().map(|f| f.pulse).collect();
        assert_eq!(pulses[0], 1.0);
        assert!((pulses[1] - 1.4).abs() < 1e-5);
        assert_eq!(pulses[2], 1.0);
    }

    #[test]
    fn test_sphere_only_mode_hides_particles() {
        let mut engine = engine("cyberpunk");
        engine.set_visualization_mode(VisualizationMode::SphereOnly);
        engine.tick(0.0);
        let frame = &engine.backend().frames[0];
        assert_eq!(frame.particle_theme, None);
        assert_eq!(engine.backend().live_buffer_count(), 1);
    }

    #[test]
    fn test_glitch_on_high_tier() {
        let backend = NullBackend::with_adapter(
            AdapterIdentity::new("NVIDIA", "NVIDIA GeForce RTX 4090").with_device_type("discrete"),
        );
        let mut engine = Engine::new(EngineConfig::default(), backend, ManualScheduler::new());
        engine.initialize().unwrap();
        engine.start().unwrap();

        assert!(engine.activate_glitch(100.0));
        engine.tick(0.0);
        engine.tick(50.0);
        engine.tick(200.0);
        let frames = &engine.backend().frames;
        assert!(frames[0].passes.contains(&PostPassKind::Glitch));
        assert!(frames[1].passes.contains(&PostPassKind::Glitch));
        assert!(!frames[2].passes.contains(&PostPassKind::Glitch));
        assert!(frames[2].passes.contains(&PostPassKind::Film));
    }

    #[test]
    fn test_glitch_unavailable_on_low_tier() {
        let mut engine = engine("default");
        assert!(!engine.activate_glitch(500.0));
        engine.tick(0.0);
        assert_eq!(engine.backend().frames[0].passes, vec![PostPassKind::Bloom]);
    }

    #[test]
    fn test_present_failures_degrade_and_report_once() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut engine = engine("default");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        engine.set_event_listener(move |event| sink.borrow_mut().push(event.name()));

        engine.backend_mut().set_fail_present(true);
        assert_eq!(engine.tick(0.0), FrameOutcome::Degraded);
        assert_eq!(engine.tick(16.0), FrameOutcome::Degraded);
        assert!(engine.scheduler().has_pending());
        engine.backend_mut().set_fail_present(false);
        assert_eq!(engine.tick(32.0), FrameOutcome::Presented);

        let names = seen.borrow();
        assert_eq!(names.iter().filter(|n| **n == "frameDegraded").count(), 1);
        assert_eq!(names[0], "ready");
    }

    #[test]
    fn test_calls_after_stop_are_rejected() {
        let mut engine = engine("default");
        engine.stop();
        assert!(matches!(engine.change_theme("matrix"), Err(EngineError::InvalidState { .. })));
        assert!(engine.set_emotion("happy", 100.0).is_err());
        assert!(!engine.activate_glitch(100.0));
    }

    #[test]
    fn test_resize_ignores_zero() {
        let mut engine = engine("default");
        engine.resize(0, 300);
        assert_eq!(engine.backend().size(), (512, 512));
        engine.resize(800, 600);
        assert_eq!(engine.backend().size(), (800, 600));
    }
}
