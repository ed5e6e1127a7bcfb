//! [`SkyBackend`] on top of a headless wgpu device.
//!
//! Renders into an offscreen `Rgba8Unorm` colour target with a `Depth32Float`
//! depth buffer. Pipelines are created lazily, one per [`RenderState`], and
//! dropped whenever the program is rebuilt.

use std::num::NonZeroU64;

use aether_atmosphere::{LookupTables, TableResolution};
use aether_render::{GpuContext, LookupTextures, ShaderLibrary, create_lookup_sampler};
use rustc_hash::FxHashMap;

use crate::backend::{BlendFactor, DepthCompare, RenderState, SkyBackend};
use crate::error::SkyError;
use crate::uniforms::{SkyUniforms, UniformValue};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VERTEX_SHADER: &str = "sky.vert";
const FRAGMENT_SHADER: &str = "sky.frag";

pub struct WgpuBackend {
    gpu: GpuContext,
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    uniforms: SkyUniforms,
    textures: Option<LookupTextures>,
    bind_group: Option<wgpu::BindGroup>,
    shaders: ShaderLibrary,
    pipelines: FxHashMap<RenderState, wgpu::RenderPipeline>,
    state: RenderState,
}

impl WgpuBackend {
    /// Create a backend drawing into a `width` x `height` offscreen target.
    pub fn new(gpu: GpuContext, width: u32, height: u32) -> Result<Self, SkyError> {
        if width == 0 || height == 0 {
            return Err(SkyError::Backend(format!(
                "render target must be non-zero, got {width}x{height}"
            )));
        }
        let device = &gpu.device;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sky-color-target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sky-depth-target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let filterable = gpu.float32_filterable;
        let sampler = create_lookup_sampler(device, filterable);
        let bind_group_layout = create_bind_group_layout(device, filterable);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sky-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let uniforms = SkyUniforms::default();
        let uniform_buffer = wgpu::util::DeviceExt::create_buffer_init(
            device,
            &wgpu::util::BufferInitDescriptor {
                label: Some("sky-uniforms"),
                contents: uniforms.as_bytes(),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            },
        );

        log::info!("Created sky backend with {width}x{height} offscreen target");

        Ok(Self {
            gpu,
            width,
            height,
            color,
            color_view,
            depth_view,
            sampler,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            uniforms,
            textures: None,
            bind_group: None,
            shaders: ShaderLibrary::new(),
            pipelines: FxHashMap::default(),
            state: RenderState::DEFAULT,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// CPU copy of the uniform block as it will be uploaded on the next draw.
    pub fn uniforms(&self) -> &SkyUniforms {
        &self.uniforms
    }

    /// Clear colour to `color` and depth to the far plane.
    pub fn clear(&mut self, color: wgpu::Color) {
        self.clear_with_depth(color, 1.0);
    }

    /// Clear colour to `color` and depth to `depth`, as if geometry covered the target.
    pub fn clear_with_depth(&mut self, color: wgpu::Color, depth: f32) {
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sky-clear-encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sky-clear-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.gpu.queue.submit([encoder.finish()]);
    }

    /// Read the colour target back as tightly packed RGBA8 rows.
    pub fn read_color(&self) -> Result<Vec<u8>, SkyError> {
        let device = &self.gpu.device;
        let bytes_per_pixel = 4u32;
        let unpadded = self.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sky-readback"),
            size: u64::from(padded * self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sky-readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit([encoder.finish()]);

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SkyError::Backend(format!("readback failed: {e}"))),
            Err(_) => return Err(SkyError::Backend("readback was never mapped".to_string())),
        }

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        for row in 0..self.height {
            let start = (row * padded) as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(pixels)
    }

    fn create_pipeline(&self, state: RenderState) -> Result<wgpu::RenderPipeline, SkyError> {
        let vertex = self.shaders.require(VERTEX_SHADER)?;
        let fragment = self.shaders.require(FRAGMENT_SHADER)?;
        log::debug!("Creating sky pipeline for {state:?}");

        let pipeline = self
            .gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("sky-pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: state.depth_write,
                    depth_compare: depth_compare(state),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: state.blend.map(|func| {
                            let component = wgpu::BlendComponent {
                                src_factor: blend_factor(func.src),
                                dst_factor: blend_factor(func.dst),
                                operation: wgpu::BlendOperation::Add,
                            };
                            wgpu::BlendState {
                                color: component,
                                alpha: component,
                            }
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            });
        Ok(pipeline)
    }
}

impl SkyBackend for WgpuBackend {
    fn create_textures(&mut self, resolution: &TableResolution) -> Result<(), SkyError> {
        let textures = LookupTextures::new(&self.gpu.device, resolution)?;
        let [transmittance, irradiance, inscatter] = textures.in_binding_order();
        let bind_group = self
            .gpu
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sky-bind-group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&transmittance.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&irradiance.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&inscatter.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                ],
            });
        self.bind_group = Some(bind_group);
        self.textures = Some(textures);
        Ok(())
    }

    fn upload_tables(&mut self, tables: &LookupTables) -> Result<(), SkyError> {
        let textures = self
            .textures
            .as_ref()
            .ok_or_else(|| SkyError::Backend("lookup textures not created".to_string()))?;
        textures.upload(&self.gpu.queue, tables)?;
        Ok(())
    }

    fn build_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<(), SkyError> {
        // A failed build leaves no program behind, so draws fail until a rebuild succeeds.
        self.pipelines.clear();
        self.shaders.remove(VERTEX_SHADER);
        self.shaders.remove(FRAGMENT_SHADER);
        self.shaders
            .load_from_source(&self.gpu.device, VERTEX_SHADER, vertex_source)?;
        self.shaders
            .load_from_source(&self.gpu.device, FRAGMENT_SHADER, fragment_source)?;
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), SkyError> {
        self.uniforms.set(name, value)
    }

    fn render_state(&self) -> RenderState {
        self.state
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.state = state;
    }

    fn draw_fullscreen_triangle(&mut self) -> Result<(), SkyError> {
        let state = self.state;
        if !self.pipelines.contains_key(&state) {
            let pipeline = self.create_pipeline(state)?;
            self.pipelines.insert(state, pipeline);
        }
        let pipeline = self
            .pipelines
            .get(&state)
            .ok_or_else(|| SkyError::Backend("sky pipeline missing".to_string()))?;
        let bind_group = self
            .bind_group
            .as_ref()
            .ok_or_else(|| SkyError::Backend("lookup textures not bound".to_string()))?;

        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, self.uniforms.as_bytes());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sky-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sky-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit([encoder.finish()]);
        Ok(())
    }
}

fn create_bind_group_layout(device: &wgpu::Device, filterable: bool) -> wgpu::BindGroupLayout {
    let texture = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension,
            multisampled: false,
        },
        count: None,
    };
    let sampler_type = if filterable {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("sky-bgl"),
        entries: &[
            texture(0, wgpu::TextureViewDimension::D2),
            texture(1, wgpu::TextureViewDimension::D2),
            texture(2, wgpu::TextureViewDimension::D3),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<SkyUniforms>() as u64),
                },
                count: None,
            },
        ],
    })
}

fn depth_compare(state: RenderState) -> wgpu::CompareFunction {
    if !state.depth_test {
        return wgpu::CompareFunction::Always;
    }
    match state.depth_compare {
        DepthCompare::Less => wgpu::CompareFunction::Less,
        DepthCompare::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthCompare::Always => wgpu::CompareFunction::Always,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

/// Create a headless GPU context and a backend drawing into a `width` x `height` target.
pub fn init_wgpu_backend(width: u32, height: u32) -> Result<WgpuBackend, SkyError> {
    let gpu = aether_render::init_headless_blocking()
        .map_err(|e| SkyError::Backend(e.to_string()))?;
    WgpuBackend::new(gpu, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{BuildOptions, SkyProgram, macro_set};
    use aether_atmosphere::{ModelConfig, PrecomputeEngine, SampleCounts};
    use glam::{Mat4, Vec3, Vec4};

    fn test_backend() -> Option<WgpuBackend> {
        init_wgpu_backend(8, 8).ok()
    }

    #[test]
    fn test_zero_sized_target_is_rejected() {
        let Ok(gpu) = aether_render::init_headless_blocking() else {
            return;
        };
        assert!(matches!(
            WgpuBackend::new(gpu, 0, 8),
            Err(SkyError::Backend(_))
        ));
    }

    #[test]
    fn test_draw_without_program_fails() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        backend
            .create_textures(&TableResolution::preview())
            .unwrap();
        let err = backend.draw_fullscreen_triangle().unwrap_err();
        assert!(matches!(err, SkyError::Shader(_)));
    }

    #[test]
    fn test_upload_before_create_fails() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        let mut engine = PrecomputeEngine::with_resolution(
            ModelConfig::earth(),
            TableResolution::preview(),
            SampleCounts {
                scattering_orders: 1,
                ..SampleCounts::preview()
            },
        )
        .unwrap();
        engine.compute().unwrap();
        let err = backend.upload_tables(engine.tables().unwrap()).unwrap_err();
        assert!(matches!(err, SkyError::Backend(_)));
    }

    /// A backend with tables, program and a high sun, ready to draw.
    fn prepared_backend() -> Option<WgpuBackend> {
        let mut backend = test_backend()?;
        let mut engine = PrecomputeEngine::with_resolution(
            ModelConfig::earth(),
            TableResolution::preview(),
            SampleCounts::preview(),
        )
        .unwrap();
        engine.compute().unwrap();

        let program = SkyProgram::new(BuildOptions {
            dither: false,
            ..Default::default()
        });
        let vertex = program.build_vertex_source().unwrap();
        let fragment = program
            .build_fragment_source(&macro_set(&engine.macro_params()))
            .unwrap();

        backend.create_textures(engine.resolution()).unwrap();
        backend.upload_tables(engine.tables().unwrap()).unwrap();
        backend.build_program(&vertex, &fragment).unwrap();
        let sun = Vec3::new(0.0, 0.5, 0.866);
        for (name, value) in [
            ("inverseViewProjection", UniformValue::Mat4(Mat4::IDENTITY)),
            ("sun", UniformValue::Vec3(sun)),
            ("sunr", UniformValue::Vec3(sun)),
            ("cmn", UniformValue::Vec4(Vec4::new(0.2, 6360.0, 6420.0, 0.0))),
            ("sunScale", UniformValue::Float(0.01)),
            ("exposure", UniformValue::Float(0.22)),
        ] {
            backend.set_uniform(name, value).unwrap();
        }
        Some(backend)
    }

    #[test]
    fn test_zenith_sky_renders_blue() {
        let Some(mut backend) = prepared_backend() else {
            return;
        };
        backend.clear(wgpu::Color::BLACK);
        backend.set_render_state(RenderState::SKY);
        backend.draw_fullscreen_triangle().unwrap();

        let pixels = backend.read_color().unwrap();
        assert_eq!(pixels.len(), 8 * 8 * 4);
        let center = &pixels[(4 * 8 + 4) * 4..][..4];
        assert!(center[2] > center[0], "pixel = {center:?}");
    }

    #[test]
    fn test_sky_does_not_cover_nearer_geometry() {
        let Some(mut backend) = prepared_backend() else {
            return;
        };
        backend.clear_with_depth(wgpu::Color::BLACK, 0.5);
        backend.set_render_state(RenderState::SKY);
        backend.draw_fullscreen_triangle().unwrap();

        let pixels = backend.read_color().unwrap();
        assert!(
            pixels.chunks(4).all(|p| p == [0, 0, 0, 255]),
            "sky was drawn in front of depth 0.5"
        );
    }
}
