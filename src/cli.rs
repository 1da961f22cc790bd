use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::audio::SyntheticCapture;
use crate::backend::{NullBackend, PresentedFrame, RenderBackend};
use crate::config::{EngineConfig, VisualizationMode};
use crate::emotion::EMOTIONS;
use crate::engine::Engine;
use crate::gpu::renderer::WgpuBackend;
use crate::gpu_profile::{AdapterIdentity, GpuProfile, GpuProfiler};
use crate::microphone::CpalMicrophone;
use crate::scheduler::{FrameHandle, FrameScheduler, ManualScheduler};
use crate::theme::THEMES;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that builds an engine.
#[derive(Args, Clone, Debug)]
struct EngineArgs {
    /// JSON configuration file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    theme: Option<String>,

    #[arg(long)]
    emotion: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Hide the particle system
    #[arg(long)]
    sphere_only: bool,

    /// Seed for particle layouts
    #[arg(long)]
    seed: Option<u64>,
}

impl EngineArgs {
    fn load(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(theme) = &self.theme {
            config.theme = theme.clone();
        }
        if let Some(emotion) = &self.emotion {
            config.emotion = emotion.clone();
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.sphere_only {
            config.mode = VisualizationMode::SphereOnly;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Open a window and react to the microphone
    Run {
        #[command(flatten)]
        engine: EngineArgs,

        /// Input device name (defaults to the system input)
        #[arg(long)]
        device: Option<String>,

        /// Print input device names and exit
        #[arg(long)]
        list_devices: bool,
    },

    /// Render frames to PNG files with a synthetic audio envelope
    Render {
        #[command(flatten)]
        engine: EngineArgs,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Number of frames to render
        #[arg(long, default_value_t = 120)]
        frames: u32,
    },

    /// Step the engine without a GPU and print a JSON frame trace
    Simulate {
        #[command(flatten)]
        engine: EngineArgs,

        #[arg(long, default_value_t = 120)]
        frames: u32,

        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Switch to this theme halfway through
        #[arg(long)]
        switch_theme: Option<String>,

        /// Start a transition to this emotion halfway through
        #[arg(long)]
        switch_emotion: Option<String>,

        /// Profile as a discrete high tier adapter instead of an unknown one
        #[arg(long)]
        high_tier: bool,

        /// Write the trace here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the adapter identity and derived GPU profile
    Profile,

    /// Print registered themes and emotions
    List,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            engine,
            device,
            list_devices,
        } => {
            if list_devices {
                for name in CpalMicrophone::list_devices() {
                    println!("{}", name);
                }
                return Ok(());
            }
            run_window(engine.load()?, device)
        }
        Commands::Render {
            engine,
            out,
            fps,
            frames,
        } => pollster::block_on(render_offline(engine.load()?, &out, fps, frames)),
        Commands::Simulate {
            engine,
            frames,
            fps,
            switch_theme,
            switch_emotion,
            high_tier,
            out,
        } => {
            let plan = SimulationPlan {
                frames,
                fps,
                switch_theme,
                switch_emotion,
                high_tier,
            };
            let trace = simulate(engine.load()?, &plan)?;
            let json = serde_json::to_string_pretty(&trace)?;
            match out {
                Some(path) => std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Profile => pollster::block_on(print_profile()),
        Commands::List => {
            println!("Themes:");
            for theme in THEMES.iter() {
                println!(
                    "  {:<10} {:<10} particles: {:?} x{}",
                    theme.id, theme.name, theme.particle_variant, theme.particle_count
                );
            }
            println!("Emotions:");
            for emotion in EMOTIONS.iter() {
                println!(
                    "  {:<10} intensity {:.2}  speed {:.2}",
                    emotion.id, emotion.intensity, emotion.speed
                );
            }
            Ok(())
        }
    }
}

/// Frame scheduler backed by winit redraw requests.
///
/// winit cannot retract a redraw request, so a cancelled frame may still
/// arrive; the engine skips ticks once it is stopped.
struct WindowScheduler {
    window: Arc<Window>,
    next_id: u64,
}

impl FrameScheduler for WindowScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        self.window.request_redraw();
        FrameHandle(self.next_id)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        log::debug!("Cancelled frame {:?}", handle);
    }
}

fn run_window(config: EngineConfig, device: Option<String>) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let (width, height) = config.surface_size();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Orb Visualiser")
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)?,
    );

    let backend = pollster::block_on(WgpuBackend::new_windowed(window.clone()))?;
    let scheduler = WindowScheduler {
        window: window.clone(),
        next_id: 0,
    };
    let transition_ms = config.emotion_transition_ms;
    let mut engine = Engine::new(config, backend, scheduler);
    engine.initialize()?;
    engine.attach_audio(Box::new(CpalMicrophone::new(device)));
    engine.start()?;

    let start = Instant::now();
    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        if let Event::WindowEvent { event, .. } = event {
            match event {
                WindowEvent::CloseRequested => {
                    engine.stop();
                    elwt.exit();
                }
                WindowEvent::Resized(size) => engine.resize(size.width, size.height),
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key,
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => handle_key(&mut engine, &logical_key, transition_ms, elwt),
                WindowEvent::RedrawRequested => {
                    engine.tick(start.elapsed().as_secs_f64() * 1000.0);
                }
                _ => {}
            }
        }
    })?;
    Ok(())
}

fn handle_key(
    engine: &mut Engine<WgpuBackend, WindowScheduler>,
    key: &Key,
    transition_ms: f64,
    elwt: &EventLoopWindowTarget<()>,
) {
    let result = match key {
        Key::Named(NamedKey::Escape) => {
            engine.stop();
            elwt.exit();
            Ok(())
        }
        Key::Character(c) => match c.to_lowercase().as_str() {
            digit @ ("1" | "2" | "3" | "4" | "5" | "6" | "7" | "8") => {
                let index = digit.parse::<usize>().unwrap_or(1) - 1;
                engine.change_theme(THEMES[index].id)
            }
            "e" => engine.set_emotion("excited", transition_ms),
            "c" => engine.set_emotion("calm", transition_ms),
            "h" => engine.set_emotion("happy", transition_ms),
            "s" => engine.set_emotion("sad", transition_ms),
            "i" => engine.set_emotion("idle", transition_ms),
            "g" => {
                if !engine.activate_glitch(600.0) {
                    log::info!("Glitch pass not available on this adapter");
                }
                Ok(())
            }
            "p" => engine.pulse(0.35, 400.0),
            _ => Ok(()),
        },
        _ => Ok(()),
    };
    if let Err(e) = result {
        log::warn!("{}", e);
    }
}

async fn render_offline(config: EngineConfig, out_dir: &Path, fps: f32, frames: u32) -> Result<()> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;
    let (width, height) = config.surface_size();
    let backend = WgpuBackend::new_offscreen(width, height).await?;

    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 60.0 };
    let mut engine = Engine::new(config, backend, ManualScheduler::new());
    engine.initialize()?;
    // Two seconds per envelope cycle.
    engine.attach_audio(Box::new(SyntheticCapture::new((fps * 2.0) as u32)));
    engine.start()?;

    println!("Rendering {} frames to {:?}...", frames, out_dir);
    let frame_ms = 1000.0 / fps as f64;
    for i in 0..frames {
        engine.scheduler_mut().take_pending();
        engine.tick(i as f64 * frame_ms);

        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        engine
            .backend()
            .save_png(&frame_path)
            .with_context(|| format!("failed to save {}", frame_path.display()))?;

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }
    engine.stop();
    println!("\nDone.");
    Ok(())
}

struct SimulationPlan {
    frames: u32,
    fps: f32,
    switch_theme: Option<String>,
    switch_emotion: Option<String>,
    high_tier: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationTrace {
    profile: GpuProfile,
    events: Vec<String>,
    frames: Vec<PresentedFrame>,
    live_buffers: usize,
}

fn simulate(config: EngineConfig, plan: &SimulationPlan) -> Result<SimulationTrace> {
    let backend = if plan.high_tier {
        NullBackend::with_adapter(AdapterIdentity::new("NVIDIA", "NVIDIA GeForce RTX 4090").with_device_type("discrete"))
    } else {
        NullBackend::new()
    };
    let transition_ms = config.emotion_transition_ms;
    let fps = if plan.fps.is_finite() && plan.fps > 0.0 { plan.fps } else { 60.0 };
    let mut engine = Engine::new(config, backend, ManualScheduler::new());

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    engine.set_event_listener(move |event| sink.borrow_mut().push(format!("{}: {}", event.name(), event.message())));

    engine.initialize()?;
    engine.attach_audio(Box::new(SyntheticCapture::new((fps * 2.0) as u32)));
    engine.start()?;

    let frame_ms = 1000.0 / fps as f64;
    for i in 0..plan.frames {
        if i == plan.frames / 2 {
            if let Some(theme) = &plan.switch_theme {
                engine.change_theme(theme)?;
            }
            if let Some(emotion) = &plan.switch_emotion {
                engine.set_emotion(emotion, transition_ms)?;
            }
        }
        engine.scheduler_mut().take_pending();
        engine.tick(i as f64 * frame_ms);
    }

    let profile = engine.gpu_profile().clone();
    let frames = engine.backend().frames.clone();
    engine.stop();
    let live_buffers = engine.backend().live_buffer_count();
    let events = events.borrow().clone();

    Ok(SimulationTrace {
        profile,
        events,
        frames,
        live_buffers,
    })
}

async fn print_profile() -> Result<()> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await;

    let identity = adapter.map(|a| AdapterIdentity::from_adapter_info(&a.get_info()));
    let profile = GpuProfiler::default().profile(identity.as_ref());

    #[derive(Serialize)]
    struct Report {
        adapter: Option<AdapterIdentity>,
        profile: GpuProfile,
    }
    let report = Report {
        adapter: identity,
        profile,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EngineArgs {
        EngineArgs {
            config: None,
            theme: None,
            emotion: None,
            width: None,
            height: None,
            sphere_only: false,
            seed: None,
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = EngineArgs {
            theme: Some("matrix".into()),
            width: Some(300),
            sphere_only: true,
            ..args()
        }
        .load()
        .unwrap();
        assert_eq!(config.theme, "matrix");
        assert_eq!(config.width, 300);
        assert_eq!(config.height, EngineConfig::default().height);
        assert_eq!(config.mode, VisualizationMode::SphereOnly);
    }

    #[test]
    fn test_simulation_switches_theme_midway() {
        let plan = SimulationPlan {
            frames: 10,
            fps: 60.0,
            switch_theme: Some("hologram".into()),
            switch_emotion: Some("excited".into()),
            high_tier: false,
        };
        let trace = simulate(EngineConfig::default(), &plan).unwrap();
        assert_eq!(trace.frames.len(), 10);
        assert_eq!(trace.frames[0].program_theme, "default");
        assert_eq!(trace.frames[9].program_theme, "hologram");
        assert_eq!(trace.live_buffers, 0);
        assert!(trace.events.iter().any(|e| e.starts_with("disposed")));
    }

    #[test]
    fn test_simulation_rejects_unknown_theme() {
        let plan = SimulationPlan {
            frames: 4,
            fps: 60.0,
            switch_theme: Some("vaporwave".into()),
            switch_emotion: None,
            high_tier: true,
        };
        assert!(simulate(EngineConfig::default(), &plan).is_err());
    }
}
