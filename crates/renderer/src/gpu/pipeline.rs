use crate::compile::{compile_fragment_shader, compile_vertex_shader};
use crate::error::EngineError;
use crate::types::{ChannelTextureKind, CHANNEL_COUNT};

/// Format of every buffer render target.
pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub vertex_module: wgpu::ShaderModule,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Result<Self, EngineError> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let vertex_module = compile_vertex_shader(device)?;

        Ok(Self {
            uniform_layout,
            vertex_module,
        })
    }
}

/// Compiled program of one buffer for a given channel layout.
pub(crate) struct BufferPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub channel_layout: wgpu::BindGroupLayout,
    pub kinds: [ChannelTextureKind; CHANNEL_COUNT],
}

impl BufferPipeline {
    pub fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        buffer: &str,
        glsl: String,
        kinds: [ChannelTextureKind; CHANNEL_COUNT],
    ) -> Result<Self, EngineError> {
        let fragment_module = compile_fragment_shader(device, buffer, glsl)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("channel layout"),
            entries: &build_channel_layout_entries(&kinds),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("buffer pipeline layout"),
            bind_group_layouts: &[&layouts.uniform_layout, &channel_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(buffer),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &layouts.vertex_module,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(EngineError::Compile {
                buffer: buffer.to_string(),
                log: format!("program link error: {error}"),
            });
        }

        Ok(Self {
            pipeline,
            channel_layout,
            kinds,
        })
    }
}

pub(crate) fn build_channel_layout_entries(
    kinds: &[ChannelTextureKind; CHANNEL_COUNT],
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for (index, kind) in kinds.iter().enumerate() {
        let dimension = match kind {
            ChannelTextureKind::Texture2d => wgpu::TextureViewDimension::D2,
            ChannelTextureKind::Cubemap => wgpu::TextureViewDimension::Cube,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_layout_interleaves_textures_and_samplers() {
        let mut kinds = [ChannelTextureKind::Texture2d; CHANNEL_COUNT];
        kinds[3] = ChannelTextureKind::Cubemap;
        let entries = build_channel_layout_entries(&kinds);
        assert_eq!(entries.len(), CHANNEL_COUNT * 2);
        assert_eq!(entries[7].binding, 7);
        assert!(matches!(entries[1].ty, wgpu::BindingType::Sampler(_)));
        assert!(matches!(
            entries[6].ty,
            wgpu::BindingType::Texture {
                view_dimension: wgpu::TextureViewDimension::Cube,
                ..
            }
        ));
    }
}
