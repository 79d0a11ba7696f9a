use super::encoding::{FieldUniforms, ParticleStateTexture, PingPong, ScreenUniforms, WindTexture};
use super::shader;
use crate::config::GpuConfig;
use crate::error::{FieldError, FieldResult};
use crate::field::VectorField;
use crate::grid::GridHeader;
use crate::palette::IntensityRamp;
use crate::viewport::GeoExtent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const RAMP_WIDTH: u32 = 256;

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        Self {
            texture,
            view,
        }
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn upload_rgba8(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, pixels: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        extent(width, height),
    );
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    topology: wgpu::PrimitiveTopology,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn begin_pass<'a>(
    encoder: &'a mut wgpu::CommandEncoder,
    label: &str,
    view: &'a wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'a> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// Shader-based wind animation: particle state lives in ping-pong textures and every
/// frame runs fade+draw, present and update passes.
pub struct GpuWindRenderer {
    config: GpuConfig,
    header: GridHeader,
    wind: WindTexture,
    size: (u32, u32),
    rng: StdRng,

    field_uniforms: wgpu::Buffer,
    fade_uniforms: wgpu::Buffer,
    present_uniforms: wgpu::Buffer,

    wind_texture: wgpu::Texture,
    wind_view: wgpu::TextureView,
    ramp_texture: wgpu::Texture,
    ramp_view: wgpu::TextureView,
    state: PingPong<RenderTarget>,
    screen: PingPong<RenderTarget>,

    field_layout: wgpu::BindGroupLayout,
    screen_layout: wgpu::BindGroupLayout,
    /// Indexed by the state texture being read.
    field_binds: Vec<wgpu::BindGroup>,
    /// Indexed by the screen texture being sampled.
    fade_binds: Vec<wgpu::BindGroup>,
    present_binds: Vec<wgpu::BindGroup>,

    update_pipeline: wgpu::RenderPipeline,
    draw_pipeline: wgpu::RenderPipeline,
    fade_pipeline: wgpu::RenderPipeline,
    present_pipeline: wgpu::RenderPipeline,
}

impl GpuWindRenderer {
    /// Fails with `ResourceUnavailable` when a shader does not validate or the device
    /// cannot hold the required textures; callers fall back to the canvas animator.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        field: &VectorField,
        ramp: &IntensityRamp,
        config: GpuConfig,
        target_format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> FieldResult<Self> {
        config.validate()?;
        shader::validate_all()?;

        let wind = WindTexture::encode(field);
        let side = config.state_texture_side;
        let limit = device.limits().max_texture_dimension_2d;
        let needed = [wind.width, wind.height, side, size.0, size.1]
            .into_iter()
            .max()
            .unwrap_or(0);
        if needed > limit {
            return Err(FieldError::ResourceUnavailable(format!(
                "device supports {limit}px textures, {needed}px required"
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);

        let field_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wind field uniforms"),
            size: std::mem::size_of::<FieldUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let fade_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("wind fade uniforms"),
            contents: bytemuck::bytes_of(&ScreenUniforms::new(config.fade_opacity)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let present_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("wind present uniforms"),
            contents: bytemuck::bytes_of(&ScreenUniforms::new(1.0)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let wind_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("wind texture"),
            size: extent(wind.width, wind.height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        upload_rgba8(queue, &wind_texture, wind.width, wind.height, &wind.pixels);
        let wind_view = wind_texture.create_view(&Default::default());

        let ramp_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("wind colour ramp"),
            size: extent(RAMP_WIDTH, 1),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        upload_rgba8(queue, &ramp_texture, RAMP_WIDTH, 1, &ramp.to_texture_bytes(RAMP_WIDTH as usize));
        let ramp_view = ramp_texture.create_view(&Default::default());

        let initial = ParticleStateTexture::random(side, &mut rng);
        let state = PingPong::new(
            RenderTarget::new(device, "particle state A", side, side),
            RenderTarget::new(device, "particle state B", side, side),
        );
        upload_rgba8(queue, &state.read().texture, side, side, &initial.pixels);

        let (width, height) = (size.0.max(1), size.1.max(1));
        let screen = PingPong::new(
            RenderTarget::new(device, "wind screen A", width, height),
            RenderTarget::new(device, "wind screen B", width, height),
        );

        let field_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wind field layout"),
            entries: &[uniform_entry(0), texture_entry(1), texture_entry(2), texture_entry(3)],
        });
        let screen_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wind screen layout"),
            entries: &[uniform_entry(0), texture_entry(1)],
        });

        let field_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("wind field pipeline layout"),
            bind_group_layouts: &[&field_layout],
            push_constant_ranges: &[],
        });
        let screen_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("wind screen pipeline layout"),
            bind_group_layouts: &[&screen_layout],
            push_constant_ranges: &[],
        });

        let update_module = shader::create_module(device, "update.wgsl", shader::UPDATE_SHADER);
        let draw_module = shader::create_module(device, "draw.wgsl", shader::DRAW_SHADER);
        let screen_module = shader::create_module(device, "screen.wgsl", shader::SCREEN_SHADER);

        let update_pipeline = fullscreen_pipeline(
            device,
            "wind update pipeline",
            &field_pipeline_layout,
            &update_module,
            wgpu::PrimitiveTopology::TriangleList,
            STATE_FORMAT,
            None,
        );
        let draw_pipeline = fullscreen_pipeline(
            device,
            "wind draw pipeline",
            &field_pipeline_layout,
            &draw_module,
            wgpu::PrimitiveTopology::PointList,
            STATE_FORMAT,
            None,
        );
        let fade_pipeline = fullscreen_pipeline(
            device,
            "wind fade pipeline",
            &screen_pipeline_layout,
            &screen_module,
            wgpu::PrimitiveTopology::TriangleList,
            STATE_FORMAT,
            None,
        );
        let present_pipeline = fullscreen_pipeline(
            device,
            "wind present pipeline",
            &screen_pipeline_layout,
            &screen_module,
            wgpu::PrimitiveTopology::TriangleList,
            target_format,
            Some(wgpu::BlendState::ALPHA_BLENDING),
        );

        let mut renderer = Self {
            config,
            header: *field.header(),
            wind,
            size: (width, height),
            rng,
            field_uniforms,
            fade_uniforms,
            present_uniforms,
            wind_texture,
            wind_view,
            ramp_texture,
            ramp_view,
            state,
            screen,
            field_layout,
            screen_layout,
            field_binds: Vec::new(),
            fade_binds: Vec::new(),
            present_binds: Vec::new(),
            update_pipeline,
            draw_pipeline,
            fade_pipeline,
            present_pipeline,
        };
        renderer.rebind_field(device);
        renderer.rebind_screen(device);
        log::info!(
            "GPU wind renderer ready: {} particles, {}x{} wind texture",
            renderer.particle_count(),
            renderer.wind.width,
            renderer.wind.height
        );
        Ok(renderer)
    }

    pub fn particle_count(&self) -> usize {
        self.config.particle_count()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Which of the two particle-state textures the next frame reads.
    pub fn state_read_index(&self) -> usize {
        self.state.read_index()
    }

    /// Copies the current particle state back to the host. Blocks until the GPU is done.
    pub fn read_state(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> FieldResult<ParticleStateTexture> {
        let side = self.config.state_texture_side;
        let unpadded = side * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wind state readback"),
            size: padded as u64 * side as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("wind state readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.state.read().texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(side),
                },
            },
            extent(side, side),
        );
        queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| FieldError::ResourceUnavailable(format!("device poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| FieldError::ResourceUnavailable(format!("state readback dropped: {e}")))?
            .map_err(|e| FieldError::ResourceUnavailable(format!("state readback failed: {e}")))?;

        let pixels = {
            let data = slice.get_mapped_range();
            let mut pixels = Vec::with_capacity((unpadded * side) as usize);
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
            pixels
        };
        buffer.unmap();
        Ok(ParticleStateTexture { side, pixels })
    }

    fn rebind_field(&mut self, device: &wgpu::Device) {
        self.field_binds = (0..2)
            .map(|i| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("wind field bind group"),
                    layout: &self.field_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: self.field_uniforms.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&self.wind_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&self.state.get(i).view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&self.ramp_view),
                        },
                    ],
                })
            })
            .collect();
    }

    fn rebind_screen(&mut self, device: &wgpu::Device) {
        let bind = |uniforms: &wgpu::Buffer, i: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("wind screen bind group"),
                layout: &self.screen_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&self.screen.get(i).view),
                    },
                ],
            })
        };
        let fade_binds = (0..2).map(|i| bind(&self.fade_uniforms, i)).collect();
        let present_binds = (0..2).map(|i| bind(&self.present_uniforms, i)).collect();
        self.fade_binds = fade_binds;
        self.present_binds = present_binds;
    }

    /// Reallocates the trail textures; accumulated trails are dropped.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> FieldResult<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == self.size {
            return Ok(());
        }
        let limit = device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(FieldError::ResourceUnavailable(format!(
                "{width}x{height} exceeds the {limit}px texture limit"
            )));
        }
        self.screen = PingPong::new(
            RenderTarget::new(device, "wind screen A", width, height),
            RenderTarget::new(device, "wind screen B", width, height),
        );
        self.size = (width, height);
        self.rebind_screen(device);
        Ok(())
    }

    /// Swaps in a new field. Same-sized grids reuse the wind texture.
    pub fn set_field(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, field: &VectorField) {
        let wind = WindTexture::encode(field);
        if (wind.width, wind.height) != (self.wind.width, self.wind.height) {
            self.wind_texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("wind texture"),
                size: extent(wind.width, wind.height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: STATE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            self.wind_view = self.wind_texture.create_view(&Default::default());
        }
        upload_rgba8(queue, &self.wind_texture, wind.width, wind.height, &wind.pixels);
        self.wind = wind;
        self.header = *field.header();
        self.rebind_field(device);
    }

    pub fn set_ramp(&self, queue: &wgpu::Queue, ramp: &IntensityRamp) {
        upload_rgba8(queue, &self.ramp_texture, RAMP_WIDTH, 1, &ramp.to_texture_bytes(RAMP_WIDTH as usize));
    }

    pub fn set_fade_opacity(&mut self, queue: &wgpu::Queue, opacity: f32) {
        self.config.fade_opacity = opacity;
        queue.write_buffer(&self.fade_uniforms, 0, bytemuck::bytes_of(&ScreenUniforms::new(opacity)));
    }

    /// One frame: fade the previous trails and draw particles into the write screen,
    /// blend it onto `target`, then advance particle state.
    pub fn render(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, target: &wgpu::TextureView, view_extent: &GeoExtent) {
        let uniforms = FieldUniforms::new(
            &self.wind,
            &self.header,
            view_extent,
            self.size,
            &self.config,
            self.config.state_texture_side,
            self.rng.random(),
        );
        queue.write_buffer(&self.field_uniforms, 0, bytemuck::bytes_of(&uniforms));

        let state_read = self.state.read_index();
        let screen_read = self.screen.read_index();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("wind frame"),
        });

        {
            let mut pass = begin_pass(
                &mut encoder,
                "wind trail pass",
                &self.screen.write().view,
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            );
            pass.set_pipeline(&self.fade_pipeline);
            pass.set_bind_group(0, &self.fade_binds[screen_read], &[]);
            pass.draw(0..3, 0..1);
            pass.set_pipeline(&self.draw_pipeline);
            pass.set_bind_group(0, &self.field_binds[state_read], &[]);
            pass.draw(0..self.particle_count() as u32, 0..1);
        }
        {
            let mut pass = begin_pass(&mut encoder, "wind present pass", target, wgpu::LoadOp::Load);
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, &self.present_binds[1 - screen_read], &[]);
            pass.draw(0..3, 0..1);
        }
        {
            let mut pass = begin_pass(
                &mut encoder,
                "wind update pass",
                &self.state.write().view,
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            );
            pass.set_pipeline(&self.update_pipeline);
            pass.set_bind_group(0, &self.field_binds[state_read], &[]);
            pass.draw(0..3, 0..1);
        }

        queue.submit(Some(encoder.finish()));
        self.screen.swap();
        self.state.swap();
    }
}
