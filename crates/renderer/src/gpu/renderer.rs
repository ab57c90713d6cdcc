use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::compile::BufferTemplate;
use crate::error::EngineError;
use crate::types::{
    ChannelTextureKind, FrameStats, FrameUniforms, GpuOptions, InputSource, PassPlan, PixelFormat,
    SamplerOptions, CHANNEL_COUNT,
};
use crate::{Backend, FrameRenderer};

use super::channels::ChannelCache;
use super::context::{AdapterProfile, GpuContext};
use super::pipeline::{BufferPipeline, PipelineLayouts};
use super::readback::{convert_rows, read_target};
use super::targets::PingPong;
use super::timing::PassTimer;
use super::uniforms::ShadertoyUniforms;

/// Headless `wgpu` device shared by every renderer it creates.
pub struct GpuBackend {
    gpu: Arc<GpuContext>,
}

impl GpuBackend {
    pub fn new(options: &GpuOptions) -> Result<Self, EngineError> {
        let gpu = GpuContext::new(options)?;
        tracing::info!(adapter = %gpu.adapter_profile.name, "GPU backend ready");
        Ok(Self { gpu: Arc::new(gpu) })
    }

    pub fn adapter(&self) -> &AdapterProfile {
        &self.gpu.adapter_profile
    }
}

impl Backend for GpuBackend {
    fn create_renderer(&self) -> Result<Box<dyn FrameRenderer>, EngineError> {
        Ok(Box::new(GpuRenderer::new(Arc::clone(&self.gpu))?))
    }
}

struct CompiledPass {
    name: String,
    code: String,
    pipeline: BufferPipeline,
    targets: PingPong,
}

/// Multi-pass renderer drawing every buffer into its own ping-pong targets.
pub struct GpuRenderer {
    gpu: Arc<GpuContext>,
    layouts: PipelineLayouts,
    template: BufferTemplate,
    uniforms: ShadertoyUniforms,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    channels: ChannelCache,
    timer: Option<PassTimer>,
    passes: Vec<CompiledPass>,
    width: u32,
    height: u32,
}

impl GpuRenderer {
    pub(crate) fn new(gpu: Arc<GpuContext>) -> Result<Self, EngineError> {
        let layouts = PipelineLayouts::new(&gpu.device)?;
        let uniforms = ShadertoyUniforms::new(1, 1);
        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadertoy uniforms"),
            size: std::mem::size_of::<ShadertoyUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let channels = ChannelCache::new(&gpu.device, &gpu.queue, gpu.max_dimension);
        let timer = PassTimer::new(&gpu);

        Ok(Self {
            gpu,
            layouts,
            template: BufferTemplate::default(),
            uniforms,
            uniform_buffer,
            uniform_bind_group,
            channels,
            timer,
            passes: Vec::new(),
            width: 1,
            height: 1,
        })
    }

    fn compile(
        &self,
        name: &str,
        code: &str,
        kinds: [ChannelTextureKind; CHANNEL_COUNT],
    ) -> Result<BufferPipeline, EngineError> {
        let glsl = self.template.specialize(&kinds, code);
        BufferPipeline::new(&self.gpu.device, &self.layouts, name, glsl, kinds)
    }

    /// Resolves the texture, sampler and resolution bound to each channel of `plan`.
    fn bind_channels(
        &mut self,
        plan: &PassPlan,
        kinds: &[ChannelTextureKind; CHANNEL_COUNT],
        live_images: &mut HashSet<u64>,
    ) -> Result<Vec<(wgpu::TextureView, wgpu::Sampler, [f32; 4])>, EngineError> {
        let device = &self.gpu.device;
        let queue = &self.gpu.queue;
        let mut bound = Vec::with_capacity(CHANNEL_COUNT);

        for (index, input) in plan.inputs.iter().enumerate() {
            let Some(input) = input else {
                let placeholder = match kinds[index] {
                    ChannelTextureKind::Cubemap => self.channels.placeholder_cube(),
                    ChannelTextureKind::Texture2d => self.channels.placeholder(),
                };
                let sampler = self.channels.sampler(device, &SamplerOptions::default());
                bound.push((placeholder.view.clone(), sampler, placeholder.resolution));
                continue;
            };

            let sampler = self.channels.sampler(device, &input.sampler);
            match &input.source {
                InputSource::Texture(path) => {
                    let texture = self.channels.texture(device, queue, path, input.sampler.vflip)?;
                    bound.push((texture.view.clone(), sampler, texture.resolution));
                }
                InputSource::Cubemap(path) => {
                    let texture = self.channels.cubemap(device, queue, path, input.sampler.vflip)?;
                    bound.push((texture.view.clone(), sampler, texture.resolution));
                }
                InputSource::Image(data) => {
                    live_images.insert(data.id());
                    let texture = self.channels.image(device, queue, data)?;
                    bound.push((texture.view.clone(), sampler, texture.resolution));
                }
                InputSource::Buffer(name) => {
                    let source = self
                        .passes
                        .iter()
                        .find(|pass| pass.name == *name)
                        .ok_or_else(|| EngineError::MissingBuffer(name.clone()))?;
                    bound.push((
                        source.targets.front_view().clone(),
                        sampler,
                        [self.width as f32, self.height as f32, 1.0, 0.0],
                    ));
                }
            }
        }
        Ok(bound)
    }

    /// Encodes one draw; `timed` adds timestamp writes when the device has them.
    fn encode_pass(
        &self,
        index: usize,
        channel_group: &wgpu::BindGroup,
        timed: bool,
    ) -> wgpu::CommandBuffer {
        let pass = &self.passes[index];
        let timer = self.timer.as_ref().filter(|_| timed);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&pass.name),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pass.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: pass.targets.back_view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: timer.map(PassTimer::writes),
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&pass.pipeline.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, channel_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        if let Some(timer) = timer {
            timer.resolve(&mut encoder);
        }
        encoder.finish()
    }

    /// Submits the terminal pass and returns how long it took, from GPU
    /// timestamps when available and wall-clock time around an idle queue
    /// otherwise.
    fn submit_timed(&self, commands: wgpu::CommandBuffer) -> Result<u64, EngineError> {
        if let Some(timer) = &self.timer {
            self.gpu.queue.submit(Some(commands));
            return timer.read_elapsed_ns(&self.gpu);
        }
        self.gpu.wait_idle()?;
        let started = Instant::now();
        self.gpu.queue.submit(Some(commands));
        self.gpu.wait_idle()?;
        Ok(started.elapsed().as_nanos() as u64)
    }
}

impl FrameRenderer for GpuRenderer {
    fn init(
        &mut self,
        template: &BufferTemplate,
        passes: &[PassPlan],
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        self.gpu.check_size(width, height)?;
        self.template = template.clone();
        self.width = width;
        self.height = height;

        let mut compiled = Vec::with_capacity(passes.len());
        for plan in passes {
            let code = std::fs::read_to_string(&plan.source).map_err(|source| EngineError::Io {
                path: plan.source.clone(),
                source,
            })?;
            let pipeline = self.compile(&plan.name, &code, plan.layout_signature())?;
            tracing::debug!(buffer = %plan.name, "compiled buffer");
            compiled.push(CompiledPass {
                name: plan.name.clone(),
                code,
                pipeline,
                targets: PingPong::new(&self.gpu.device, &plan.name, width, height),
            });
        }
        self.passes = compiled;
        self.uniforms.set_resolution(width, height);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.gpu.check_size(width, height)?;
        for pass in &mut self.passes {
            pass.targets = PingPong::new(&self.gpu.device, &pass.name, width, height);
        }
        self.width = width;
        self.height = height;
        self.uniforms.set_resolution(width, height);
        Ok(())
    }

    fn render(
        &mut self,
        passes: &[PassPlan],
        uniforms: &FrameUniforms,
    ) -> Result<FrameStats, EngineError> {
        if let Some(plan) = passes
            .iter()
            .find(|plan| !self.passes.iter().any(|pass| pass.name == plan.name))
        {
            return Err(EngineError::MissingBuffer(plan.name.clone()));
        }

        self.uniforms.apply_frame(uniforms);
        let mut live_images = HashSet::new();
        let mut stats = FrameStats::default();

        for (position, plan) in passes.iter().enumerate() {
            let index = self
                .passes
                .iter()
                .position(|pass| pass.name == plan.name)
                .ok_or_else(|| EngineError::MissingBuffer(plan.name.clone()))?;

            let kinds = plan.layout_signature();
            if self.passes[index].pipeline.kinds != kinds {
                tracing::debug!(buffer = %plan.name, "channel kinds changed; recompiling");
                let pipeline = self.compile(&plan.name, &self.passes[index].code, kinds)?;
                self.passes[index].pipeline = pipeline;
            }

            let bound = self.bind_channels(plan, &kinds, &mut live_images)?;
            for (channel, (_, _, resolution)) in bound.iter().enumerate() {
                self.uniforms.set_channel_resolution(channel, *resolution);
            }
            let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
            for (channel, (view, sampler, _)) in bound.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: (channel as u32) * 2,
                    resource: wgpu::BindingResource::TextureView(view),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: (channel as u32) * 2 + 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                });
            }
            let channel_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("channel bind group"),
                layout: &self.passes[index].pipeline.channel_layout,
                entries: &entries,
            });

            self.gpu.queue.write_buffer(
                &self.uniform_buffer,
                0,
                bytemuck::bytes_of(&self.uniforms),
            );
            let terminal = position + 1 == passes.len();
            let commands = self.encode_pass(index, &channel_group, terminal);

            if terminal {
                stats.elapsed_ns = self.submit_timed(commands)?;
            } else {
                self.gpu.queue.submit(Some(commands));
            }
            self.passes[index].targets.swap();
        }

        self.channels.retain_images(&live_images);
        Ok(stats)
    }

    fn read_output(&mut self, format: PixelFormat, out: &mut [f32]) -> Result<(), EngineError> {
        let terminal = self
            .passes
            .last()
            .ok_or_else(|| EngineError::Readback("no buffers have been initialised".to_string()))?;
        let (raw, padded_bytes_per_row) = read_target(
            &self.gpu,
            terminal.targets.front_texture(),
            self.width,
            self.height,
        )?;
        convert_rows(
            &raw,
            padded_bytes_per_row,
            self.width,
            self.height,
            format,
            out,
        )
    }
}
