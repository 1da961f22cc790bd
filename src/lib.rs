pub mod audio;
pub mod backend;
pub mod camera;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod gpu_profile;
pub mod particle;
pub mod particle_variants;
pub mod post_processing;
pub mod scheduler;
pub mod shader_check;
pub mod theme;

#[cfg(not(target_arch = "wasm32"))]
pub mod microphone;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use audio::{CaptureDevice, SyntheticCapture};
pub use backend::{NullBackend, RenderBackend};
pub use config::{EngineConfig, VisualizationMode};
pub use engine::{Engine, EngineEvent, EngineState, FrameOutcome};
pub use error::EngineError;
pub use gpu_profile::{GpuProfile, GpuProfiler, GpuTier};
pub use scheduler::{FrameScheduler, ManualScheduler};
