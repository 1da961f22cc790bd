//! wgpu implementation of [`RenderBackend`].
//!
//! The backend draws into either a window/canvas surface or an offscreen
//! texture that can be read back for PNG export. Per frame it renders the
//! sphere and the particle instances into the scene target, runs the post
//! chain and tone-maps into the presentation target.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::backend::{BufferId, FrameSubmission, ParticleUniforms, ProgramId, RenderBackend, SphereUniforms};
use crate::error::EngineError;
use crate::gpu::mesh::{create_sphere_geometry, SPHERE_DETAIL_HIGH, SPHERE_DETAIL_LOW};
use crate::gpu::particle_pipeline::ParticlePipeline;
use crate::gpu::post_processor::PostProcessor;
use crate::gpu::theme_pipeline::{self, ThemeProgram};
use crate::gpu_profile::{AdapterIdentity, GpuProfile, GpuProfiler};
use crate::particle::ParticleVertex;
use crate::shader_check;
use crate::theme::ThemeDescriptor;

/// Format of the offscreen presentation texture.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

enum PresentTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

struct SphereMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl SphereMesh {
    fn new(device: &wgpu::Device, (lat, lon): (u32, u32)) -> Self {
        let (vertices, indices) = create_sphere_geometry(lat, lon);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }
}

/// Profile-dependent GPU state, built on [`RenderBackend::configure`].
struct SceneResources {
    post: PostProcessor,
    theme_layout: wgpu::BindGroupLayout,
    particles: ParticlePipeline,
    sphere: SphereMesh,
}

impl SceneResources {
    fn new(device: &wgpu::Device, profile: &GpuProfile, output_format: wgpu::TextureFormat, size: (u32, u32)) -> Self {
        let post = PostProcessor::new(device, profile, output_format, size.0, size.1);
        let scene_format = post.scene_format();
        let detail = if profile.is_high_tier() {
            SPHERE_DETAIL_HIGH
        } else {
            SPHERE_DETAIL_LOW
        };
        Self {
            theme_layout: theme_pipeline::uniform_layout(device),
            particles: ParticlePipeline::new(device, scene_format),
            sphere: SphereMesh::new(device, detail),
            post,
        }
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    target: PresentTarget,
    width: u32,
    height: u32,
    scene: Option<SceneResources>,
    programs: HashMap<ProgramId, ThemeProgram>,
    next_id: u64,
}

impl WgpuBackend {
    async fn request_device(
        adapter: &wgpu::Adapter,
        limits: wgpu::Limits,
    ) -> Result<(wgpu::Device, wgpu::Queue), EngineError> {
        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Orb Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| EngineError::RenderContextUnavailable(format!("failed to create device: {}", e)))
    }

    fn with_surface(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Result<Self, EngineError> {
        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| EngineError::RenderContextUnavailable("surface reports no formats".into()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            device,
            queue,
            adapter_info: adapter.get_info(),
            target: PresentTarget::Surface { surface, config },
            width: width.max(1),
            height: height.max(1),
            scene: None,
            programs: HashMap::new(),
            next_id: 0,
        })
    }

    /// Backend presenting into a native window.
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn new_windowed(window: std::sync::Arc<winit::window::Window>) -> Result<Self, EngineError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(|e| EngineError::RenderContextUnavailable(format!("failed to create surface: {}", e)))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EngineError::RenderContextUnavailable("no suitable adapter".into()))?;
        let (device, queue) = Self::request_device(&adapter, wgpu::Limits::default()).await?;
        Self::with_surface(surface, &adapter, device, queue, size.width, size.height)
    }

    /// Backend presenting into a browser canvas.
    #[cfg(target_arch = "wasm32")]
    pub async fn new_canvas(canvas: web_sys::HtmlCanvasElement) -> Result<Self, EngineError> {
        let (width, height) = (canvas.width(), canvas.height());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(wgpu::SurfaceTarget::Canvas(canvas))
            .map_err(|e| EngineError::RenderContextUnavailable(format!("failed to create surface: {}", e)))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::None,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EngineError::RenderContextUnavailable("no suitable adapter".into()))?;
        let (device, queue) = Self::request_device(&adapter, wgpu::Limits::downlevel_webgl2_defaults()).await?;
        Self::with_surface(surface, &adapter, device, queue, width, height)
    }

    /// Headless backend rendering into a readable texture.
    pub async fn new_offscreen(width: u32, height: u32) -> Result<Self, EngineError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EngineError::RenderContextUnavailable("no adapter found".into()))?;
        let (device, queue) = Self::request_device(&adapter, wgpu::Limits::default()).await?;
        let (texture, view) = Self::offscreen_texture(&device, width.max(1), height.max(1));

        Ok(Self {
            adapter_info: adapter.get_info(),
            device,
            queue,
            target: PresentTarget::Offscreen { texture, view },
            width: width.max(1),
            height: height.max(1),
            scene: None,
            programs: HashMap::new(),
            next_id: 0,
        })
    }

    fn offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn output_format(&self) -> wgpu::TextureFormat {
        match &self.target {
            PresentTarget::Surface { config, .. } => config.format,
            PresentTarget::Offscreen { .. } => OFFSCREEN_FORMAT,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Build scene resources with the default profiler if the engine has
    /// not configured the backend yet.
    fn ensure_scene(&mut self) {
        if self.scene.is_none() {
            let profile = GpuProfiler::default().profile(self.adapter_identity().as_ref());
            self.configure(&profile);
        }
    }

    /// Read the last presented offscreen frame as tightly packed RGBA8 rows.
    pub fn read_frame_rgba(&self) -> anyhow::Result<Vec<u8>> {
        let PresentTarget::Offscreen { texture, .. } = &self.target else {
            anyhow::bail!("frame readback requires an offscreen backend");
        };

        let unpadded_bytes_per_row = 4 * self.width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * self.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * self.height) as usize);
        for row in 0..self.height {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        output_buffer.unmap();
        Ok(pixels)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_png(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let pixels = self.read_frame_rgba()?;
        image::save_buffer(path, &pixels, self.width, self.height, image::ColorType::Rgba8)?;
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn adapter_identity(&self) -> Option<AdapterIdentity> {
        Some(AdapterIdentity::from_adapter_info(&self.adapter_info))
    }

    fn configure(&mut self, profile: &GpuProfile) {
        let format = self.output_format();
        self.scene = Some(SceneResources::new(&self.device, profile, format, (self.width, self.height)));
    }

    fn compile_program(&mut self, theme: &'static ThemeDescriptor) -> Result<ProgramId, EngineError> {
        shader_check::validate_theme(theme)?;
        self.ensure_scene();
        let scene = self
            .scene
            .as_ref()
            .ok_or_else(|| EngineError::RenderContextUnavailable("render targets unavailable".into()))?;
        let program = ThemeProgram::new(&self.device, &scene.theme_layout, theme, scene.post.scene_format());
        let id = ProgramId(self.next());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn release_program(&mut self, program: ProgramId) {
        if let Some(program) = self.programs.remove(&program) {
            program.uniform_buffer.destroy();
            log::debug!("Released theme pipeline '{}'", program.theme_id);
        }
    }

    fn create_particle_buffer(&mut self, owner: &'static str, capacity: usize) -> Result<BufferId, EngineError> {
        self.ensure_scene();
        let id = BufferId(self.next());
        let scene = self
            .scene
            .as_mut()
            .ok_or_else(|| EngineError::RenderContextUnavailable("render targets unavailable".into()))?;
        scene.particles.create_buffer(&self.device, id, owner, capacity);
        Ok(id)
    }

    fn write_particles(&mut self, buffer: BufferId, points: &[ParticleVertex]) -> Result<(), EngineError> {
        match self.scene.as_ref() {
            Some(scene) => scene.particles.write(&self.queue, buffer, points),
            None => Err(EngineError::Frame(format!("write to released buffer {:?}", buffer))),
        }
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if let Some(scene) = self.scene.as_mut() {
            scene.particles.release(buffer);
        }
    }

    fn write_uniforms(
        &mut self,
        program: ProgramId,
        sphere: &SphereUniforms,
        particles: &ParticleUniforms,
    ) -> Result<(), EngineError> {
        let theme_program = self
            .programs
            .get(&program)
            .ok_or_else(|| EngineError::Frame(format!("uniforms for unknown program {:?}", program)))?;
        theme_program.write_uniforms(&self.queue, sphere);
        if let Some(scene) = self.scene.as_ref() {
            scene.particles.write_uniforms(&self.queue, particles);
        }
        Ok(())
    }

    fn present(&mut self, frame: &FrameSubmission<'_>) -> Result<(), EngineError> {
        self.ensure_scene();
        let Self {
            device,
            queue,
            target,
            scene,
            programs,
            ..
        } = self;
        let Some(scene) = scene.as_mut() else {
            return Err(EngineError::Frame("render targets unavailable".into()));
        };
        let program = programs
            .get(&frame.program)
            .ok_or_else(|| EngineError::Frame(format!("present with unknown program {:?}", frame.program)))?;

        let surface_texture = match target {
            PresentTarget::Surface { surface, config } => match surface.get_current_texture() {
                Ok(texture) => Some(texture),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    surface.configure(device, config);
                    return Err(EngineError::Frame("surface lost, reconfigured".into()));
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    return Err(EngineError::Frame("surface out of memory".into()));
                }
                Err(e) => return Err(EngineError::Frame(e.to_string())),
            },
            PresentTarget::Offscreen { .. } => None,
        };
        let surface_view = surface_texture
            .as_ref()
            .map(|t| t.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let output_view = match (&surface_view, &*target) {
            (Some(view), _) => view,
            (None, PresentTarget::Offscreen { view, .. }) => view,
            (None, PresentTarget::Surface { .. }) => {
                return Err(EngineError::Frame("no surface texture".into()));
            }
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Orb Frame") });
        {
            let (scene_view, depth_view) = scene.post.scene_targets(device);
            let [r, g, b] = frame.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: scene_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &program.bind_group, &[]);
            pass.set_vertex_buffer(0, scene.sphere.vertex_buffer.slice(..));
            pass.set_index_buffer(scene.sphere.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..scene.sphere.index_count, 0, 0..1);

            if let Some(buffer) = frame.particles {
                scene
                    .particles
                    .draw(&mut pass, buffer, frame.particle_count, frame.particle_blend);
            }
        }

        scene
            .post
            .process(device, queue, &mut encoder, frame.post, frame.tone_mapping, output_view);
        queue.submit(Some(encoder.finish()));
        if let Some(texture) = surface_texture {
            texture.present();
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.width = width;
        self.height = height;
        match &mut self.target {
            PresentTarget::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            PresentTarget::Offscreen { texture, view } => {
                let (new_texture, new_view) = Self::offscreen_texture(&self.device, width, height);
                *texture = new_texture;
                *view = new_view;
            }
        }
        if let Some(scene) = self.scene.as_mut() {
            scene.post.resize(&self.device, width, height);
        }
    }

    fn release_render_targets(&mut self) {
        if let Some(scene) = self.scene.as_mut() {
            scene.post.release();
        }
        self.device.poll(wgpu::Maintain::Poll);
    }

    fn live_buffer_count(&self) -> usize {
        self.scene.as_ref().map_or(0, |s| s.particles.live_count())
    }
}
