//! Client for the Shadertoy catalog: shader documents, media downloads and the
//! on-disk asset cache they land in.

mod cache;
mod glsl;
mod remote;

pub use cache::AssetCache;
pub use glsl::rename_reserved_words;
pub use remote::{
    parse_shader_response, resolve_media_url, RenderInput, RenderOutput, RenderPass,
    SamplerSpec, ShaderCatalog, ShaderInfo, ShaderPayload, ShadertoyClient, ShadertoyConfig,
    DEFAULT_API_BASE, DEFAULT_API_KEY, DEFAULT_MEDIA_BASE,
};
