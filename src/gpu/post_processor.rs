//! GPU post-processing pipeline.
//!
//! Owns the scene and depth targets the orb is drawn into, the ping-pong
//! intermediates and one GPU pass per effect the profile allows. The chain
//! walks the [`PostPass`] list produced by `post_processing::PostPipeline`,
//! skipping disabled passes, and ends with a tone-mapping pass into the
//! presentation target.

use crate::gpu::bloom_processor::BloomProcessor;
use crate::gpu::fullscreen::{EffectPass, Fullscreen};
use crate::gpu::shaders;
use crate::gpu_profile::{GpuProfile, ToneMapping};
use crate::post_processing::{PassParams, PostPass, PostPassKind};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const EXPOSURE: f32 = 1.0;

struct Targets {
    scene_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    /// Ping-pong intermediates.
    intermediate_views: [wgpu::TextureView; 2],
}

impl Targets {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = |label: &str| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        let depth_view = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Depth Texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            scene_view: color("Scene Texture"),
            depth_view,
            intermediate_views: [color("Post Intermediate A"), color("Post Intermediate B")],
        }
    }
}

pub struct PostProcessor {
    fullscreen: Fullscreen,
    /// `None` after [`PostProcessor::release`] until the next resize.
    targets: Option<Targets>,
    bloom: BloomProcessor,
    glitch: Option<EffectPass>,
    film: Option<EffectPass>,
    output: EffectPass,
    scene_format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl PostProcessor {
    /// `output_format` is the presentation format; the scene format follows
    /// the profile (floating point on high tier adapters).
    pub fn new(
        device: &wgpu::Device,
        profile: &GpuProfile,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let scene_format = if profile.hdr_scene {
            wgpu::TextureFormat::Rgba16Float
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let fullscreen = Fullscreen::new(device);
        let bloom = BloomProcessor::new(device, &fullscreen, scene_format, width, height);
        let glitch = profile.has_pass(PostPassKind::Glitch).then(|| {
            EffectPass::new(device, &fullscreen, "Glitch", shaders::GLITCH, scene_format)
        });
        let film = profile.has_pass(PostPassKind::Film).then(|| {
            EffectPass::new(device, &fullscreen, "Film", shaders::FILM, scene_format)
        });
        let output = EffectPass::new(device, &fullscreen, "Tone Map Output", shaders::OUTPUT, output_format);

        log::debug!(
            "Post processor: scene {:?}, output {:?}, {}x{}",
            scene_format,
            output_format,
            width,
            height
        );

        Self {
            targets: Some(Targets::new(device, scene_format, width, height)),
            fullscreen,
            bloom,
            glitch,
            film,
            output,
            scene_format,
            width,
            height,
        }
    }

    pub fn scene_format(&self) -> wgpu::TextureFormat {
        self.scene_format
    }

    fn targets(&mut self, device: &wgpu::Device) -> &Targets {
        let (format, width, height) = (self.scene_format, self.width, self.height);
        self.targets
            .get_or_insert_with(|| Targets::new(device, format, width, height))
    }

    /// Scene color and depth views, recreating released targets on demand.
    pub fn scene_targets(&mut self, device: &wgpu::Device) -> (&wgpu::TextureView, &wgpu::TextureView) {
        let targets = self.targets(device);
        (&targets.scene_view, &targets.depth_view)
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if self.targets.is_some() && width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.targets = Some(Targets::new(device, self.scene_format, width, height));
        self.bloom.resize(device, width, height);
    }

    /// Drop the size-dependent targets.
    pub fn release(&mut self) {
        self.targets = None;
    }

    /// Run the enabled passes over the scene target and tone-map into `output`.
    pub fn process(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        passes: &[PostPass],
        tone_mapping: ToneMapping,
        output: &wgpu::TextureView,
    ) {
        self.targets(device);
        let Some(targets) = self.targets.as_ref() else {
            return;
        };

        // Index into `intermediate_views`; `None` reads the scene target.
        let mut current: Option<usize> = None;
        for pass in passes.iter().filter(|p| p.enabled) {
            let next = current.map_or(0, |i| 1 - i);
            let input = current.map_or(&targets.scene_view, |i| &targets.intermediate_views[i]);
            let target = &targets.intermediate_views[next];

            match pass.params {
                PassParams::Bloom { threshold, strength, radius } => {
                    self.bloom.process(
                        device,
                        queue,
                        encoder,
                        &self.fullscreen,
                        input,
                        target,
                        threshold,
                        strength,
                        radius,
                    );
                }
                PassParams::Glitch { .. } => {
                    let Some(glitch) = &self.glitch else { continue };
                    glitch.run(device, queue, encoder, &self.fullscreen, input, target, pass.params.to_uniform());
                }
                PassParams::Film { .. } => {
                    let Some(film) = &self.film else { continue };
                    film.run(device, queue, encoder, &self.fullscreen, input, target, pass.params.to_uniform());
                }
            }
            current = Some(next);
        }

        let input = current.map_or(&targets.scene_view, |i| &targets.intermediate_views[i]);
        self.output.run(
            device,
            queue,
            encoder,
            &self.fullscreen,
            input,
            output,
            [tone_mapping.shader_mode(), EXPOSURE, 0.0, 0.0],
        );
    }
}
