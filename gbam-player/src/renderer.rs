//! Plain texture-blit renderer: uploads one decoded 240x160 RGB555 frame
//! per `present` call and draws it as a single full-viewport quad.
//!
//! The teacher's renderer pipeline (bind group layout, sampler, fullscreen
//! quad shader) is kept; its prescale pass, which sized an intermediate
//! texture to an arbitrary emulator display resolution, is dropped since
//! this player always blits a fixed 240x160 source.

use anyhow::anyhow;
use gbam_core::api::{FrameSink, FRAME_HEIGHT, FRAME_WIDTH};
use std::iter;
use wgpu::rwh::{HasDisplayHandle, HasWindowHandle};
use wgpu::{
    Backends, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendState,
    Color, ColorTargetState, ColorWrites, CommandEncoderDescriptor, CompositeAlphaMode, Device,
    DeviceDescriptor, Extent3d, FilterMode, FragmentState, FrontFace, Instance,
    InstanceDescriptor, LoadOp, MultisampleState, Operations, PipelineCompilationOptions,
    PipelineLayoutDescriptor, PolygonMode, PowerPreference, PresentMode, PrimitiveState,
    PrimitiveTopology, Queue, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, RequestAdapterOptions, Sampler, SamplerBindingType,
    SamplerDescriptor, ShaderStages, StoreOp, Surface, SurfaceConfiguration, SurfaceTargetUnsafe,
    Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType,
    TextureUsages, TextureViewDescriptor, TextureViewDimension, VertexState,
};

const SHADER_SOURCE: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(1.0, -1.0),
    );
    var uvs = array<vec2<f32>, 4>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );

    var out: VertexOutput;
    out.position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    out.uv = uvs[vertex_index];
    return out;
}

@group(0) @binding(0) var frame_texture: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(frame_texture, frame_sampler, in.uv);
}
"#;

pub struct WgpuRenderer {
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    device: Device,
    queue: Queue,
    frame_texture: Texture,
    bind_group: BindGroup,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
    pipeline: RenderPipeline,
    rgba_scratch: Vec<u8>,
}

impl WgpuRenderer {
    /// # Safety
    ///
    /// The value referenced by `window` must live at least as long as the returned `WgpuRenderer`.
    pub async unsafe fn new<W>(window: &W, window_size: (u32, u32)) -> anyhow::Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let instance =
            Instance::new(InstanceDescriptor { backends: Backends::PRIMARY, ..Default::default() });

        let surface = instance.create_surface_unsafe(SurfaceTargetUnsafe::from_window(window)?)?;

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or_else(|| anyhow!("Failed to obtain wgpu adapter"))?;

        let (device, queue) =
            adapter.request_device(&DeviceDescriptor { label: "device".into(), ..Default::default() }, None).await?;

        let surface_formats = &surface.get_capabilities(&adapter).formats;
        let surface_format =
            surface_formats.iter().copied().find(TextureFormat::is_srgb).unwrap_or_else(|| {
                log::warn!(
                    "Surface does not support any SRGB formats, using format {:?}",
                    surface_formats[0]
                );
                surface_formats[0]
            });

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: window_size.0,
            height: window_size.1,
            present_mode: PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: CompositeAlphaMode::default(),
            view_formats: vec![],
        };
        surface.configure(&device, &surface_config);

        let frame_texture = device.create_texture(&TextureDescriptor {
            label: "gba_frame_texture".into(),
            size: Extent3d {
                width: FRAME_WIDTH as u32,
                height: FRAME_HEIGHT as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: "frame_sampler".into(),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: "frame_bind_group_layout".into(),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let bind_group =
            create_bind_group(&device, &bind_group_layout, &frame_texture, &sampler);

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: "frame_shader".into(),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: "frame_pipeline_layout".into(),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: "frame_pipeline".into(),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader_module,
                entry_point: "vs_main",
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &[],
            },
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                module: &shader_module,
                entry_point: "fs_main",
                compilation_options: PipelineCompilationOptions::default(),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            frame_texture,
            bind_group,
            bind_group_layout,
            sampler,
            pipeline,
            rgba_scratch: vec![0u8; FRAME_WIDTH * FRAME_HEIGHT * 4],
        })
    }

    pub fn handle_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }
}

impl FrameSink for WgpuRenderer {
    fn present(&mut self, frame: &[u8; gbam_core::api::FRAME_BYTES]) {
        rgb555_to_rgba8(frame, &mut self.rgba_scratch);

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.frame_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.rgba_scratch,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some((FRAME_WIDTH * 4) as u32),
                rows_per_image: Some(FRAME_HEIGHT as u32),
            },
            Extent3d { width: FRAME_WIDTH as u32, height: FRAME_HEIGHT as u32, depth_or_array_layers: 1 },
        );

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                log::warn!("failed to acquire surface texture: {err}");
                return;
            }
        };
        let output_view = output.texture.create_view(&TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: "frame_encoder".into() });

        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: "frame_render_pass".into(),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: Operations { load: LoadOp::Clear(Color::BLACK), store: StoreOp::Store },
                })],
                ..Default::default()
            });

            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_pipeline(&self.pipeline);
            render_pass.draw(0..4, 0..1);
        }

        self.queue.submit(iter::once(encoder.finish()));
        output.present();
    }
}

fn create_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    texture: &Texture,
    sampler: &Sampler,
) -> BindGroup {
    let view = texture.create_view(&TextureViewDescriptor::default());
    device.create_bind_group(&BindGroupDescriptor {
        label: "frame_bind_group".into(),
        layout,
        entries: &[
            BindGroupEntry { binding: 0, resource: BindingResource::TextureView(&view) },
            BindGroupEntry { binding: 1, resource: BindingResource::Sampler(sampler) },
        ],
    })
}

/// Unpacks the GBA movie frame buffer's little-endian RGB555 pixels
/// (spec.md §3 "frame buffer") into tightly packed RGBA8 for upload.
fn rgb555_to_rgba8(frame: &[u8], out: &mut [u8]) {
    for (pixel_idx, raw) in frame.chunks_exact(2).enumerate() {
        let color = u16::from_le_bytes([raw[0], raw[1]]);
        let r = (color & 0x1F) as u8;
        let g = ((color >> 5) & 0x1F) as u8;
        let b = ((color >> 10) & 0x1F) as u8;

        let out_idx = pixel_idx * 4;
        out[out_idx] = (r << 3) | (r >> 2);
        out[out_idx + 1] = (g << 3) | (g >> 2);
        out[out_idx + 2] = (b << 3) | (b >> 2);
        out[out_idx + 3] = 0xFF;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb555_unpacks_pure_red_to_full_red_channel() {
        let frame = [0x1F, 0x00]; // R=31, G=0, B=0 little-endian
        let mut out = [0u8; 4];
        rgb555_to_rgba8(&frame, &mut out);
        assert_eq!(out, [0xFF, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn rgb555_unpacks_black_to_opaque_black() {
        let frame = [0x00, 0x00];
        let mut out = [0u8; 4];
        rgb555_to_rgba8(&frame, &mut out);
        assert_eq!(out, [0x00, 0x00, 0x00, 0xFF]);
    }
}
