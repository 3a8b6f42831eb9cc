use std::path::Path;

use bytemuck::{Pod, Zeroable};
use flurry_render::{
    AlphaSource, BlendFactor, BlendState, BufferHandle, GraphicsDevice, LockMode, ParticleVertex,
    RenderError, RenderState, Segment, TextureHandle,
};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::shaders;
use crate::view::ParticleView;

/// Quad corners emitted per particle instance.
const CORNERS_PER_SPRITE: u32 = 6;
const VERTEX_SIZE: u64 = std::mem::size_of::<ParticleVertex>() as u64;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
    sprite: [f32; 4],
    scale: [f32; 4],
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            eye: [0.0; 4],
            sprite: [1.0, 0.0, 1.0, 1.0],
            scale: [0.0, 1.0, 6.0, 0.0],
        }
    }
}

struct RingBuffer {
    buffer: wgpu::Buffer,
    capacity: u32,
}

struct Pipeline {
    blend: Option<BlendState>,
    pipeline: wgpu::RenderPipeline,
}

#[derive(Debug, Clone, Copy)]
struct PendingDraw {
    pipeline: usize,
    buffer: usize,
    texture: usize,
    first: u32,
    count: u32,
}

struct FrameTarget {
    view: wgpu::TextureView,
    clear: Option<wgpu::Color>,
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn wgpu_blend(blend: Option<BlendState>) -> Option<wgpu::BlendState> {
    blend.map(|b| wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(b.src),
            dst_factor: blend_factor(b.dst),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent::OVER,
    })
}

/// [`GraphicsDevice`] backed by a borrowed wgpu device and queue.
///
/// Draws are queued and submitted in one render pass per flush. A flush
/// happens on every discard lock and at [`end_frame`](Self::end_frame).
/// Draws require a target set by [`begin_frame`](Self::begin_frame).
pub struct WgpuParticleDevice<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    target_format: wgpu::TextureFormat,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Vec<Pipeline>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    buffers: Vec<RingBuffer>,
    textures: Vec<wgpu::BindGroup>,
    uniforms: Uniforms,
    active_pipeline: Option<usize>,
    open: Option<(BufferHandle, Segment)>,
    pending: Vec<PendingDraw>,
    target: Option<FrameTarget>,
    submissions: u64,
}

impl<'a> WgpuParticleDevice<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let uniforms = Uniforms::default();
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particle_uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("particle_uniform_layout"),
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

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("particle_uniform_bind_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("particle_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SPRITE_SHADER.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            target_format,
            shader,
            pipeline_layout,
            pipelines: Vec::new(),
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            sampler,
            buffers: Vec::new(),
            textures: Vec::new(),
            uniforms,
            active_pipeline: None,
            open: None,
            pending: Vec::new(),
            target: None,
            submissions: 0,
        }
    }

    /// Start drawing into `target` as seen from `view`. `clear` is applied by
    /// the first pass of the frame.
    pub fn begin_frame(
        &mut self,
        target: wgpu::TextureView,
        view: &ParticleView,
        clear: Option<wgpu::Color>,
    ) {
        if !self.pending.is_empty() {
            tracing::warn!(pending = self.pending.len(), "begin_frame without end_frame");
            self.flush();
        }
        self.uniforms.view_proj = view.view_projection().to_cols_array_2d();
        self.uniforms.eye = view.eye.extend(1.0).to_array();
        self.uniforms.sprite[2] = view.aspect;
        self.write_uniforms();
        self.target = Some(FrameTarget {
            view: target,
            clear,
        });
    }

    /// Submit every queued draw and release the frame target.
    pub fn end_frame(&mut self) {
        self.flush();
        self.target = None;
    }

    /// Queue submissions made so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Draws queued but not yet submitted.
    pub fn pending_draws(&self) -> usize {
        self.pending.len()
    }

    fn write_uniforms(&self) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
    }

    fn pipeline_for(&mut self, blend: Option<BlendState>) -> usize {
        if let Some(index) = self.pipelines.iter().position(|p| p.blend == blend) {
            return index;
        }
        tracing::debug!(?blend, "creating sprite pipeline");
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("sprite_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_sprite"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: VERTEX_SIZE,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x4,
                        ],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_sprite"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: wgpu_blend(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            });
        self.pipelines.push(Pipeline { blend, pipeline });
        self.pipelines.len() - 1
    }

    /// Encode and submit queued draws in a single pass.
    fn flush(&mut self) {
        let Some(target) = self.target.as_mut() else {
            if !self.pending.is_empty() {
                tracing::warn!(
                    dropped = self.pending.len(),
                    "draws issued outside begin_frame/end_frame"
                );
                self.pending.clear();
            }
            return;
        };
        if self.pending.is_empty() && target.clear.is_none() {
            return;
        }

        let load = match target.clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("particle_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("particle_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });

            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            for draw in &self.pending {
                let (Some(pipeline), Some(ring), Some(texture)) = (
                    self.pipelines.get(draw.pipeline),
                    self.buffers.get(draw.buffer),
                    self.textures.get(draw.texture),
                ) else {
                    continue;
                };
                let start = u64::from(draw.first) * VERTEX_SIZE;
                let end = start + u64::from(draw.count) * VERTEX_SIZE;
                pass.set_pipeline(&pipeline.pipeline);
                pass.set_bind_group(1, texture, &[]);
                pass.set_vertex_buffer(0, ring.buffer.slice(start..end));
                pass.draw(0..CORNERS_PER_SPRITE, 0..draw.count);
            }
        }

        tracing::trace!(draws = self.pending.len(), "submitting particle pass");
        self.queue.submit(std::iter::once(encoder.finish()));
        self.pending.clear();
        self.submissions += 1;
    }

    fn lock_error(segment: Segment, reason: impl Into<String>) -> RenderError {
        RenderError::SegmentLock {
            offset: segment.offset,
            reason: reason.into(),
        }
    }
}

impl GraphicsDevice for WgpuParticleDevice<'_> {
    fn create_vertex_buffer(&mut self, capacity: u32) -> Result<BufferHandle, RenderError> {
        let size = u64::from(capacity) * VERTEX_SIZE;
        let max = self.device.limits().max_buffer_size;
        if capacity == 0 || size > max {
            return Err(RenderError::BufferCreation(format!(
                "{capacity} vertices ({size} bytes) outside device limit of {max} bytes"
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle_ring"),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::BufferCreation(err.to_string()));
        }

        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(RingBuffer { buffer, capacity });
        tracing::debug!(?handle, capacity, "created particle ring buffer");
        Ok(handle)
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureHandle, RenderError> {
        let texture_error = |reason: String| RenderError::TextureLoad {
            path: path.to_path_buf(),
            reason,
        };

        let image = image::open(path)
            .map_err(|e| texture_error(e.to_string()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(texture_error(err.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite_texture_bind_group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(bind_group);
        tracing::debug!(?handle, width, height, path = %path.display(), "loaded sprite texture");
        Ok(handle)
    }

    fn set_render_state(&mut self, state: &RenderState) {
        let Some(sprite) = state.point_sprite else {
            self.active_pipeline = None;
            return;
        };

        let alpha_from_texture = match state.alpha_source {
            AlphaSource::Texture => 1.0,
            AlphaSource::Diffuse => 0.0,
        };
        let sprite_uniform = [
            sprite.size,
            sprite.min_size,
            self.uniforms.sprite[2],
            alpha_from_texture,
        ];
        let scale_uniform = [sprite.scale_a, sprite.scale_b, sprite.scale_c, 0.0];
        if sprite_uniform != self.uniforms.sprite || scale_uniform != self.uniforms.scale {
            // Queued draws read the uniform buffer at submit time.
            if !self.pending.is_empty() {
                self.flush();
            }
            self.uniforms.sprite = sprite_uniform;
            self.uniforms.scale = scale_uniform;
            self.write_uniforms();
        }

        self.active_pipeline = Some(self.pipeline_for(state.blend));
    }

    fn lock(&mut self, buffer: BufferHandle, segment: Segment) -> Result<(), RenderError> {
        if self.open.is_some() {
            return Err(Self::lock_error(segment, "another segment is already locked"));
        }
        let Some(capacity) = self.buffers.get(buffer.0 as usize).map(|r| r.capacity) else {
            return Err(Self::lock_error(segment, format!("unknown buffer {buffer:?}")));
        };
        if segment.end() > capacity {
            return Err(Self::lock_error(segment, "segment exceeds buffer capacity"));
        }

        if segment.mode == LockMode::Discard && !self.pending.is_empty() {
            self.flush();
        }
        self.open = Some((buffer, segment));
        Ok(())
    }

    fn unlock(&mut self, buffer: BufferHandle, segment: Segment, vertices: &[ParticleVertex]) {
        if self.open != Some((buffer, segment)) {
            tracing::warn!(?segment, "unlock does not match the open segment");
        }
        self.open = None;

        let written = vertices.len().min(segment.len as usize);
        if written == 0 {
            return;
        }
        let Some(ring) = self.buffers.get(buffer.0 as usize) else {
            return;
        };
        if segment.offset as usize + written > ring.capacity as usize {
            tracing::warn!(?segment, "unlock writes past the end of the ring");
            return;
        }
        self.queue.write_buffer(
            &ring.buffer,
            u64::from(segment.offset) * VERTEX_SIZE,
            bytemuck::cast_slice(&vertices[..written]),
        );
    }

    fn draw_points(&mut self, buffer: BufferHandle, texture: TextureHandle, first: u32, count: u32) {
        let Some(pipeline) = self.active_pipeline else {
            tracing::warn!(first, count, "point draw without a sprite render state");
            return;
        };
        if count == 0 {
            return;
        }
        let in_range = self
            .buffers
            .get(buffer.0 as usize)
            .is_some_and(|r| u64::from(first) + u64::from(count) <= u64::from(r.capacity));
        if !in_range || texture.0 as usize >= self.textures.len() {
            tracing::warn!(?buffer, ?texture, first, count, "draw references invalid data");
            return;
        }
        self.pending.push(PendingDraw {
            pipeline,
            buffer: buffer.0 as usize,
            texture: texture.0 as usize,
            first,
            count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flurry_particles::{ParticleSystem, Snow};
    use flurry_render::{RendererConfig, StreamingRenderer};

    fn headless() -> (wgpu::Device, wgpu::Queue) {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .expect("needs a GPU adapter");
        pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("flurry_test_device"),
                required_limits: adapter.limits(),
                ..Default::default()
            },
            None,
        ))
        .expect("adapter refused a device")
    }

    #[test]
    fn uniforms_match_shader_layout() {
        assert_eq!(std::mem::size_of::<Uniforms>(), 112);
        assert_eq!(std::mem::size_of::<Uniforms>() % 16, 0);
    }

    #[test]
    fn blend_factors_map_to_wgpu() {
        let alpha = wgpu_blend(Some(BlendState::ALPHA)).unwrap();
        assert_eq!(alpha.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(alpha.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(wgpu_blend(None), None);

        let additive = wgpu_blend(Some(BlendState {
            src: BlendFactor::One,
            dst: BlendFactor::One,
        }))
        .unwrap();
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
    }

    #[test]
    #[ignore = "needs a GPU adapter"]
    fn renders_snow_offscreen() {
        let (device, queue) = headless();
        let dir = tempfile::tempdir().unwrap();
        let texture_path = dir.path().join("flake.png");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([255, 255, 255, 255]))
            .save(&texture_path)
            .unwrap();

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("test_target"),
            size: wgpu::Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let mut gpu = WgpuParticleDevice::new(&device, &queue, format);
        let mut renderer =
            StreamingRenderer::init(&mut gpu, &texture_path, RendererConfig::default()).unwrap();
        let mut snow = ParticleSystem::with_seed(Snow::default(), 1300, 123);
        let view = ParticleView::default();

        for _ in 0..4 {
            snow.update(1.0 / 60.0);
            gpu.begin_frame(
                target.create_view(&Default::default()),
                &view,
                Some(wgpu::Color::BLACK),
            );
            let stats = renderer.render(&mut gpu, snow.particles()).unwrap();
            gpu.end_frame();
            assert_eq!(stats.particles_drawn, 1300);
            assert_eq!(gpu.pending_draws(), 0);
        }
        assert!(gpu.submissions() >= 4);
    }

    #[test]
    #[ignore = "needs a GPU adapter"]
    fn missing_texture_is_reported() {
        let (device, queue) = headless();
        let mut gpu = WgpuParticleDevice::new(&device, &queue, wgpu::TextureFormat::Rgba8UnormSrgb);
        let err = gpu.load_texture(Path::new("no/such/flake.png")).unwrap_err();
        assert!(matches!(err, RenderError::TextureLoad { .. }));

        let result =
            StreamingRenderer::init(&mut gpu, "no/such/flake.png", RendererConfig::default());
        assert!(result.is_err());
    }
}
