//! Instanced billboard rendering of particle buffers.
//!
//! Each point is one instance; the vertex shader expands it into a camera
//! facing quad from `vertex_index`, so no per-vertex buffer is bound. Depth is
//! tested against the sphere but never written.

use std::collections::HashMap;

use crate::backend::{BufferId, ParticleUniforms};
use crate::error::EngineError;
use crate::gpu::post_processor::DEPTH_FORMAT;
use crate::gpu::shaders;
use crate::particle::ParticleVertex;
use crate::theme::BlendMode;

struct ParticleBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
}

pub struct ParticlePipeline {
    additive: wgpu::RenderPipeline,
    alpha: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    buffers: HashMap<BufferId, ParticleBuffer>,
}

impl ParticlePipeline {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Uniform Buffer"),
            size: std::mem::size_of::<ParticleUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::PARTICLES.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let build = |blend: BlendMode, label: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[ParticleVertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend.to_blend_state()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        Self {
            additive: build(BlendMode::Additive, "Particle Pipeline (Additive)"),
            alpha: build(BlendMode::AlphaBlend, "Particle Pipeline (Alpha)"),
            uniform_buffer,
            bind_group,
            buffers: HashMap::new(),
        }
    }

    pub fn create_buffer(&mut self, device: &wgpu::Device, id: BufferId, owner: &str, capacity: usize) {
        let size = (capacity.max(1) * std::mem::size_of::<ParticleVertex>()) as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Particle Buffer: {}", owner)),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers.insert(id, ParticleBuffer { buffer, capacity });
    }

    pub fn write(&self, queue: &wgpu::Queue, id: BufferId, points: &[ParticleVertex]) -> Result<(), EngineError> {
        let slot = self
            .buffers
            .get(&id)
            .ok_or_else(|| EngineError::Frame(format!("write to released buffer {:?}", id)))?;
        if points.len() > slot.capacity {
            return Err(EngineError::Frame(format!(
                "{} points exceed buffer capacity {}",
                points.len(),
                slot.capacity
            )));
        }
        if !points.is_empty() {
            queue.write_buffer(&slot.buffer, 0, bytemuck::cast_slice(points));
        }
        Ok(())
    }

    /// Returns `true` if the buffer existed.
    pub fn release(&mut self, id: BufferId) -> bool {
        match self.buffers.remove(&id) {
            Some(slot) => {
                slot.buffer.destroy();
                true
            }
            None => false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &ParticleUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Record the draw into an open scene pass.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, id: BufferId, count: u32, blend: BlendMode) {
        let Some(slot) = self.buffers.get(&id) else {
            return;
        };
        let count = count.min(slot.capacity as u32);
        if count == 0 {
            return;
        }
        pass.set_pipeline(match blend {
            BlendMode::Additive => &self.additive,
            BlendMode::AlphaBlend => &self.alpha,
        });
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, slot.buffer.slice(..));
        pass.draw(0..6, 0..count);
    }
}
