//! Headless multi-pass Shadertoy engine.
//!
//! Callers describe a shader as an ordered list of buffers ([`PassPlan`]) and
//! hand them to a [`FrameRenderer`] obtained from a [`Backend`]:
//!
//! ```text
//!   BufferTemplate + PassPlan[]
//!          │ init()
//!          ▼
//!   FrameRenderer ──render()──▶ one pipeline per buffer ──▶ ping-pong targets
//!          │                                                    │
//!          └──read_output()◀── terminal buffer (last in order) ─┘
//! ```
//!
//! The GPU implementation lives in [`gpu`]; tests elsewhere substitute their
//! own `Backend` so orchestration code can run without a device.

mod compile;
mod error;
pub mod gpu;
mod types;

pub use compile::{
    BufferTemplate, PART_CHANNELS, PART_GLSL_DEFINES, PART_GLSL_HEADER, PART_SHADERTOY_FOOTER,
    PART_SHADERTOY_HEADER, PART_SOURCES,
};
pub use error::EngineError;
pub use gpu::{AdapterProfile, GpuBackend, GpuRenderer};
pub use types::{
    gl, ChannelInput, ChannelTextureKind, FrameStats, FrameUniforms, GpuOptions,
    GpuPowerPreference, InputSource, MagFilter, MinFilter, PassPlan, PixelFormat, SamplerOptions,
    TextureData, Wrap, CHANNEL_COUNT, TARGET_FRAME_RATE,
};

/// A compiled buffer graph able to draw frames and read back the terminal output.
pub trait FrameRenderer: Send {
    /// Compiles every buffer of `passes` and allocates targets of the given size.
    fn init(
        &mut self,
        template: &BufferTemplate,
        passes: &[PassPlan],
        width: u32,
        height: u32,
    ) -> Result<(), EngineError>;

    /// Reallocates the targets; buffer contents restart from black.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError>;

    /// Draws every buffer in order with the given channel inputs.
    fn render(
        &mut self,
        passes: &[PassPlan],
        uniforms: &FrameUniforms,
    ) -> Result<FrameStats, EngineError>;

    /// Copies the last buffer's output into `out`, row 0 at the bottom.
    fn read_output(&mut self, format: PixelFormat, out: &mut [f32]) -> Result<(), EngineError>;
}

pub trait Backend: Send + Sync {
    fn create_renderer(&self) -> Result<Box<dyn FrameRenderer>, EngineError>;
}
