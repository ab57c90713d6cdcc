//! Headless GPU implementation of the engine.
//!
//! - `context` owns the wgpu instance, adapter, device and queue; there is no
//!   surface, every target is an offscreen texture.
//! - `channels` materialises channel resources (file textures, cubemaps,
//!   caller images) and caches samplers.
//! - `pipeline` compiles specialized GLSL into one render pipeline per buffer.
//! - `targets` holds the ping-pong texture pair of each buffer.
//! - `uniforms` mirrors the injected Shadertoy uniform block.
//! - `timing` measures the terminal pass with GPU timestamps when the
//!   device supports them.
//! - `readback` copies the terminal target back into host floats.
//! - `renderer` glues everything together behind `FrameRenderer`.

mod channels;
mod context;
mod pipeline;
mod readback;
mod renderer;
mod targets;
mod timing;
mod uniforms;

pub use context::AdapterProfile;
pub use renderer::{GpuBackend, GpuRenderer};
