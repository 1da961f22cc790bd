//! Multi-pass bloom processor.
//!
//! 1. Threshold pass - extract bright pixels into a downsampled target
//! 2. Separable blur - horizontal then vertical
//! 3. Composite - add the blurred glow back onto the scene
//!
//! Each pass owns its uniform buffer: all writes land before the encoder is
//! submitted, so two passes sharing one buffer would both see the last write.

use crate::gpu::fullscreen::{sampler_entry, texture_entry, EffectPass, Fullscreen, PassUniforms};
use crate::gpu::shaders;

/// Maximum blur radius in texels of the downsampled target.
pub const MAX_BLOOM_RADIUS: f32 = 32.0;

/// Bloom runs at half resolution.
pub const DOWNSAMPLE: u32 = 2;

/// Texels of blur per unit of the normalized bloom radius.
const RADIUS_TEXELS: f32 = 8.0;

/// Soft knee below the threshold.
const SOFT_KNEE: f32 = 0.5;

pub struct BloomProcessor {
    bloom_view_a: wgpu::TextureView,
    bloom_view_b: wgpu::TextureView,

    threshold: EffectPass,
    blur_horizontal: EffectPass,
    blur_vertical: EffectPass,

    composite_pipeline: wgpu::RenderPipeline,
    composite_layout: wgpu::BindGroupLayout,
    composite_uniform_buffer: wgpu::Buffer,
    composite_uniform_bind_group: wgpu::BindGroup,

    bloom_width: u32,
    bloom_height: u32,
    format: wgpu::TextureFormat,
}

impl BloomProcessor {
    pub fn new(
        device: &wgpu::Device,
        fullscreen: &Fullscreen,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let bloom_width = (width / DOWNSAMPLE).max(1);
        let bloom_height = (height / DOWNSAMPLE).max(1);
        let bloom_view_a = Self::create_bloom_texture(device, format, bloom_width, bloom_height, "Bloom A");
        let bloom_view_b = Self::create_bloom_texture(device, format, bloom_width, bloom_height, "Bloom B");

        let threshold = EffectPass::new(device, fullscreen, "Bloom Threshold", shaders::BLOOM_THRESHOLD, format);
        let blur_horizontal = EffectPass::new(device, fullscreen, "Bloom Blur H", shaders::BLOOM_BLUR, format);
        let blur_vertical = EffectPass::new(device, fullscreen, "Bloom Blur V", shaders::BLOOM_BLUR, format);

        // Composite samples both the scene and the blurred glow.
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Composite Layout"),
            entries: &[texture_entry(0), sampler_entry(1), texture_entry(2), sampler_entry(3)],
        });
        let composite_pipeline = fullscreen.pipeline(
            device,
            "Bloom Composite",
            shaders::BLOOM_COMPOSITE,
            format,
            Some(&composite_layout),
        );
        let (composite_uniform_buffer, composite_uniform_bind_group) =
            fullscreen.uniform(device, "Bloom Composite Uniforms");

        Self {
            bloom_view_a,
            bloom_view_b,
            threshold,
            blur_horizontal,
            blur_vertical,
            composite_pipeline,
            composite_layout,
            composite_uniform_buffer,
            composite_uniform_bind_group,
            bloom_width,
            bloom_height,
            format,
        }
    }

    fn create_bloom_texture(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        label: &str,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let bloom_w = (width / DOWNSAMPLE).max(1);
        let bloom_h = (height / DOWNSAMPLE).max(1);
        if bloom_w == self.bloom_width && bloom_h == self.bloom_height {
            return;
        }
        self.bloom_width = bloom_w;
        self.bloom_height = bloom_h;
        self.bloom_view_a = Self::create_bloom_texture(device, self.format, bloom_w, bloom_h, "Bloom A");
        self.bloom_view_b = Self::create_bloom_texture(device, self.format, bloom_w, bloom_h, "Bloom B");
    }

    /// Render `input` plus its glow into `output`.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        fullscreen: &Fullscreen,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        threshold: f32,
        strength: f32,
        radius: f32,
    ) {
        let radius = (radius * RADIUS_TEXELS).clamp(0.0, MAX_BLOOM_RADIUS);
        let texel = [1.0 / self.bloom_width as f32, 1.0 / self.bloom_height as f32];

        self.threshold.run(
            device,
            queue,
            encoder,
            fullscreen,
            input,
            &self.bloom_view_a,
            [threshold.max(0.0), SOFT_KNEE, 0.0, 0.0],
        );
        self.blur_horizontal.run(
            device,
            queue,
            encoder,
            fullscreen,
            &self.bloom_view_a,
            &self.bloom_view_b,
            [texel[0], 0.0, radius, 0.0],
        );
        self.blur_vertical.run(
            device,
            queue,
            encoder,
            fullscreen,
            &self.bloom_view_b,
            &self.bloom_view_a,
            [0.0, texel[1], radius, 0.0],
        );

        queue.write_buffer(
            &self.composite_uniform_buffer,
            0,
            bytemuck::bytes_of(&PassUniforms {
                params: [strength.max(0.0), 0.0, 0.0, 0.0],
            }),
        );
        let textures = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Composite Textures"),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&fullscreen.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.bloom_view_a),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&fullscreen.sampler),
                },
            ],
        });
        fullscreen.draw(
            encoder,
            "Bloom Composite Pass",
            output,
            &self.composite_pipeline,
            &textures,
            &self.composite_uniform_bind_group,
        );
    }
}
