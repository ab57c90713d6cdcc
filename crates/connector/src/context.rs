use std::sync::Arc;

use renderer::{
    FrameRenderer, FrameUniforms, InputSource, MinFilter, PixelFormat, CHANNEL_COUNT,
};

use crate::error::{Error, Result};
use crate::graph::BufferGraph;
use crate::image::Image;
use crate::input::{Channel, InputValue};

/// Depth of the image allocated before the first render.
const INITIAL_DEPTH: u32 = 3;

/// One renderable buffer graph with its frame counter and latest output.
pub struct RenderContext {
    id: String,
    graph: BufferGraph,
    renderer: Box<dyn FrameRenderer>,
    width: u32,
    height: u32,
    frame_count: i32,
    current_image: Image,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Compiles `graph` with `renderer` at the given size.
    pub fn new(
        id: impl Into<String>,
        graph: BufferGraph,
        mut renderer: Box<dyn FrameRenderer>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        graph.validate()?;
        renderer.init(graph.template(), &graph.plan(), width, height)?;
        let id = id.into();
        tracing::info!(id = %id, buffers = graph.len(), width, height, "created render context");
        Ok(Self {
            id,
            graph,
            renderer,
            width,
            height,
            frame_count: 0,
            current_image: Image::new([height, width, INITIAL_DEPTH])?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Frame rendered when the caller does not name one.
    pub fn frame_count(&self) -> i32 {
        self.frame_count
    }

    pub fn render_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn image(&self) -> &Image {
        &self.current_image
    }

    /// Hands out the latest image and clears its `changed` flag.
    pub fn take_image(&mut self) -> Image {
        let image = self.current_image.clone();
        self.current_image.set_changed(false);
        image
    }

    pub fn graph(&self) -> &BufferGraph {
        &self.graph
    }

    /// Renders `frame` at the requested size and reads the image back in `format`.
    pub fn perform_render(
        &mut self,
        frame: i32,
        width: u32,
        height: u32,
        mouse: [f32; 4],
        format: u32,
    ) -> Result<()> {
        let format = PixelFormat::from_gl(format)
            .ok_or_else(|| Error::InvalidFormat("Invalid format".to_string()))?;
        let depth = format.depth() as u32;

        if width != self.width || height != self.height || depth != self.current_image.depth() {
            if width != self.width || height != self.height {
                self.renderer.resize(width, height)?;
                self.width = width;
                self.height = height;
            }
            self.current_image.alloc([height, width, depth])?;
        }

        let uniforms = FrameUniforms::for_frame(frame, mouse);
        let stats = self.renderer.render(&self.graph.plan(), &uniforms)?;

        self.renderer
            .read_output(format, self.current_image.data_mut())?;
        self.current_image.flip_vertical();
        self.current_image.set_frame_timing(stats.elapsed_ns);
        self.current_image.set_changed(true);

        self.frame_count = frame.saturating_add(1);
        Ok(())
    }

    /// Overrides `buffer.channel` with another buffer's output or a static image.
    pub fn set_input(&mut self, buffer: &str, channel: usize, value: InputValue) -> Result<()> {
        let source = match value {
            InputValue::Buffer(target) => {
                let target = target.to_lowercase();
                if !self.graph.contains(&target) {
                    return Err(Error::NotFound(format!(
                        "Buffer {target} was not found to override {buffer}.{channel}"
                    )));
                }
                InputSource::Buffer(target)
            }
            InputValue::Image(image) => InputSource::Image(Arc::new(image.to_texture_data()?)),
        };
        self.channel_mut(buffer, channel)?.override_with(source);
        tracing::debug!(id = %self.id, buffer, channel, "input overridden");
        Ok(())
    }

    /// Sets the minification filter of the input bound to `buffer.channel`.
    pub fn set_input_filter(&mut self, buffer: &str, channel: usize, min_filter: i32) -> Result<()> {
        let input = self.channel_mut(buffer, channel)?.current_mut().ok_or_else(|| {
            Error::NotInitialized(format!(
                "Input {buffer}.{channel} has not been yet initialized, so its filter cannot be set"
            ))
        })?;
        let filter = MinFilter::from_gl(min_filter)
            .ok_or_else(|| Error::InvalidFormat(format!("Invalid filter value {min_filter:#x}")))?;
        input.sampler = input.sampler.with_min_filter(filter);
        Ok(())
    }

    /// Restores the configured input of `buffer.channel`.
    pub fn reset_input(&mut self, buffer: &str, channel: usize) -> Result<()> {
        self.channel_mut(buffer, channel)?.reset();
        Ok(())
    }

    fn channel_mut(&mut self, buffer: &str, channel: usize) -> Result<&mut Channel> {
        let id = &self.id;
        let toy_buffer = self.graph.buffer_mut(buffer).ok_or_else(|| {
            Error::NotFound(format!("Buffer \"{buffer}\" was not found in {id}"))
        })?;
        if channel >= CHANNEL_COUNT {
            return Err(Error::NotFound(format!(
                "Channel {channel} is not available on {buffer}"
            )));
        }
        toy_buffer
            .channel_mut(channel)
            .ok_or_else(|| Error::NotFound(format!("Channel {channel} is not available on {buffer}")))
    }
}
