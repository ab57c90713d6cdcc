use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::error::EngineError;
use crate::types::{ChannelTextureKind, CHANNEL_COUNT};

pub const PART_GLSL_HEADER: &str = "glsl:header";
pub const PART_GLSL_DEFINES: &str = "glsl:defines";
pub const PART_SHADERTOY_HEADER: &str = "shadertoy:header";
pub const PART_CHANNELS: &str = "shadertoy:channels";
pub const PART_SOURCES: &str = "buffer:sources";
pub const PART_SHADERTOY_FOOTER: &str = "shadertoy:footer";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PartBody {
    Text(String),
    /// Filled in per buffer by [`BufferTemplate::specialize`].
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TemplatePart {
    name: String,
    body: PartBody,
}

/// Ordered GLSL fragments assembled around every buffer's code.
///
/// Text parts may be swapped out by callers (for instance to inject
/// `#define`s into every buffer); generated parts are owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferTemplate {
    parts: Vec<TemplatePart>,
}

impl BufferTemplate {
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|part| part.name.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match &part.body {
            PartBody::Text(text) if part.name == name => Some(text.as_str()),
            _ => None,
        })
    }

    /// Replaces the contents of an existing text part.
    pub fn replace(&mut self, name: &str, contents: impl Into<String>) -> Result<(), EngineError> {
        let part = self
            .parts
            .iter_mut()
            .find(|part| part.name == name)
            .ok_or_else(|| EngineError::Template(format!("unknown template part '{name}'")))?;
        if part.body == PartBody::Generated {
            return Err(EngineError::Template(format!(
                "template part '{name}' is generated and cannot be replaced"
            )));
        }
        part.body = PartBody::Text(contents.into());
        Ok(())
    }

    /// Produces a self-contained GLSL fragment shader from raw ShaderToy code.
    pub fn specialize(&self, kinds: &[ChannelTextureKind; CHANNEL_COUNT], source: &str) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match (&part.body, part.name.as_str()) {
                (PartBody::Text(text), _) => {
                    out.push_str(text);
                    if !text.ends_with('\n') {
                        out.push('\n');
                    }
                }
                (PartBody::Generated, PART_CHANNELS) => out.push_str(&channel_declarations(kinds)),
                (PartBody::Generated, _) => {
                    out.push_str("#line 1\n");
                    out.push_str(&sanitize_source(source));
                }
            }
        }
        out
    }
}

impl Default for BufferTemplate {
    fn default() -> Self {
        let text = |name: &str, body: &str| TemplatePart {
            name: name.to_string(),
            body: PartBody::Text(body.to_string()),
        };
        let generated = |name: &str| TemplatePart {
            name: name.to_string(),
            body: PartBody::Generated,
        };
        Self {
            parts: vec![
                text(PART_GLSL_HEADER, GLSL_HEADER),
                text(PART_GLSL_DEFINES, ""),
                text(PART_SHADERTOY_HEADER, SHADERTOY_HEADER),
                generated(PART_CHANNELS),
                generated(PART_SOURCES),
                text(PART_SHADERTOY_FOOTER, SHADERTOY_FOOTER),
            ],
        }
    }
}

/// Strips `#version` directives and ShaderToy uniform declarations so the
/// template's own definitions win.
fn sanitize_source(source: &str) -> String {
    let mut sanitized = String::with_capacity(source.len());
    let mut skipped_version = false;
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            continue;
        }
        let should_skip_uniform = trimmed.starts_with("uniform ")
            && SHADERTOY_UNIFORMS.iter().any(|name| trimmed.contains(name));
        if should_skip_uniform {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }
    sanitized
}

const SHADERTOY_UNIFORMS: [&str; 14] = [
    "iResolution",
    "iTimeDelta",
    "iTime",
    "iFrameRate",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
    "iChannelTime",
    "iChannelResolution",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
];

fn channel_declarations(kinds: &[ChannelTextureKind; CHANNEL_COUNT]) -> String {
    let mut out = String::new();
    for (index, kind) in kinds.iter().enumerate() {
        let (texture_type, sampler_type) = match kind {
            ChannelTextureKind::Texture2d => ("texture2D", "sampler2D"),
            ChannelTextureKind::Cubemap => ("textureCube", "samplerCube"),
        };
        let texture_binding = index * 2;
        let sampler_binding = texture_binding + 1;
        out.push_str(&format!(
            "layout(set = 1, binding = {texture_binding}) uniform {texture_type} stc_channel{index}_texture;\n\
             layout(set = 1, binding = {sampler_binding}) uniform sampler stc_channel{index}_sampler;\n\
             #define iChannel{index} {sampler_type}(stc_channel{index}_texture, stc_channel{index}_sampler)\n"
        ));
    }
    out
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule, EngineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(EngineError::Compile {
            buffer: "<vertex>".to_string(),
            log: error.to_string(),
        }),
        None => Ok(module),
    }
}

/// Compiles one specialized buffer; validation failures carry the compiler log.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    buffer: &str,
    glsl: String,
) -> Result<wgpu::ShaderModule, EngineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(buffer),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(glsl),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(EngineError::Compile {
            buffer: buffer.to_string(),
            log: error.to_string(),
        }),
        None => Ok(module),
    }
}

const GLSL_HEADER: &str = "#version 450\n";

/// The uniform block layout must match `ShadertoyUniforms` in `gpu/uniforms.rs`.
const SHADERTOY_HEADER: &str = r"layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 stc_out_color;

layout(std140, set = 0, binding = 0) uniform ShadertoyInputs {
    vec4 _iResolution;
    vec4 _iMouse;
    vec4 _iDate;
    float _iTime;
    float _iTimeDelta;
    float _iFrameRate;
    int _iFrame;
    float _iSampleRate;
    float _padding0;
    float _padding1;
    float _padding2;
    vec4 _iChannelTime;
    vec4 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution.xyz
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrameRate ubo._iFrameRate
#define iFrame ubo._iFrame
#define iSampleRate ubo._iSampleRate
#define iChannelTime ubo._iChannelTime
#define iChannelResolution ubo._iChannelResolution
";

/// Render targets keep row 0 at the bottom, so `gl_FragCoord` is already in
/// ShaderToy's bottom-left convention.
const SHADERTOY_FOOTER: &str = r"void main() {
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, gl_FragCoord.xy);
    stc_out_color = color;
}
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
