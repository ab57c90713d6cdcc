//! Orchestration of Shadertoy render contexts.
//!
//! A [`Host`] owns a rendering surface and a registry of [`RenderContext`]s,
//! each a buffer graph loaded either from caller-supplied GLSL or from the
//! Shadertoy catalog. [`LocalHost`] renders in-process; [`NetHost`] forwards
//! every call to a [`HostServer`] over a websocket. A [`Session`] keeps one
//! host per target and tracks the current one.

mod context;
mod error;
mod graph;
mod host;
mod image;
mod input;
mod loader;
pub mod net;
mod session;

#[cfg(test)]
mod testing;

pub use context::RenderContext;
pub use error::{Error, Result};
pub use graph::{BufferGraph, ToyBuffer, IMAGE_BUFFER};
pub use host::{
    BackendFactory, ContextHandle, Host, LocalHost, LocalHostOptions, RenderRequest, SurfaceGuard,
    LOCAL_ID_PREFIX,
};
pub use image::Image;
pub use input::{Channel, InputSpec, InputValue};
pub use loader::{load_local, load_remote};
pub use net::{HostServer, NetHost, DEFAULT_PORT};
pub use session::{normalize_target, HostFactory, Session, LOCAL_TARGET};
