//! Hosts own a rendering surface and the contexts drawn on it.
//!
//! [`LocalHost`] renders in-process on the GPU; [`NetHost`](crate::NetHost)
//! forwards the same calls to a remote `stc serve` process.

mod local;

pub use local::{BackendFactory, LocalHost, LocalHostOptions, SurfaceGuard, LOCAL_ID_PREFIX};

use renderer::gl;

use crate::error::Result;
use crate::image::Image;
use crate::input::InputValue;

/// Operations every host supports, whether local or remote.
pub trait Host: Send + Sync {
    /// Prepares the rendering surface or connection. Repeated calls are no-ops.
    fn allocate(&self) -> Result<()>;

    /// Renders one frame of a context, creating remote contexts on first use.
    fn render(&self, request: &RenderRequest) -> Result<Image>;

    /// Forgets a remote context so the next render fetches it again.
    fn reset(&self, id: &str) -> Result<()>;

    /// Compiles a context from `(name, source)` pairs and returns its id.
    fn create_local(&self, sources: &[(String, String)]) -> Result<String>;

    fn get_context(&self, id: &str) -> Result<Box<dyn ContextHandle + '_>>;
}

/// Input overrides on one context of a host.
pub trait ContextHandle {
    fn id(&self) -> &str;

    fn set_input(&self, buffer: &str, channel: usize, value: InputValue) -> Result<()>;

    fn set_input_filter(&self, buffer: &str, channel: usize, min_filter: i32) -> Result<()>;

    fn reset_input(&self, buffer: &str, channel: usize) -> Result<()>;
}

/// Arguments of [`Host::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub id: String,
    /// Frame to draw; `None` continues from the context's frame counter.
    pub frame: Option<i32>,
    pub width: u32,
    pub height: u32,
    pub mouse: [f32; 4],
    /// GL pixel format (`RGBA`, `RGB` or `LUMINANCE`).
    pub format: u32,
}

impl RenderRequest {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            frame: None,
            width,
            height,
            mouse: [0.0; 4],
            format: gl::RGBA,
        }
    }

    pub fn with_frame(mut self, frame: i32) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_mouse(mut self, mouse: [f32; 4]) -> Self {
        self.mouse = mouse;
        self
    }

    pub fn with_format(mut self, format: u32) -> Self {
        self.format = format;
        self
    }
}
