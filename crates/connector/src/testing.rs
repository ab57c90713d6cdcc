//! Deterministic stand-ins for the GPU engine and the shader catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use renderer::{
    Backend, BufferTemplate, EngineError, FrameRenderer, FrameStats, FrameUniforms, InputSource,
    PassPlan, PixelFormat,
};
use shadertoy::ShaderCatalog;

/// Terminal pass duration reported by [`FakeRenderer`].
pub(crate) const FAKE_ELAPSED_NS: u64 = 1234;

#[derive(Debug, Default)]
struct Counters {
    renderers: usize,
    inits: usize,
    resizes: usize,
    renders: usize,
}

/// Call counters shared by a backend and every renderer it created.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeLog(Arc<Mutex<Counters>>);

impl FakeLog {
    fn update(&self, f: impl FnOnce(&mut Counters)) {
        f(&mut self.0.lock().unwrap());
    }

    pub fn renderers(&self) -> usize {
        self.0.lock().unwrap().renderers
    }

    pub fn inits(&self) -> usize {
        self.0.lock().unwrap().inits
    }

    pub fn resizes(&self) -> usize {
        self.0.lock().unwrap().resizes
    }

    pub fn renders(&self) -> usize {
        self.0.lock().unwrap().renders
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    log: FakeLog,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }
}

impl Backend for FakeBackend {
    fn create_renderer(&self) -> Result<Box<dyn FrameRenderer>, EngineError> {
        self.log.update(|counters| counters.renderers += 1);
        Ok(Box::new(FakeRenderer {
            log: self.log.clone(),
            buffers: Vec::new(),
            width: 0,
            height: 0,
            frame: 0,
            alpha: 1.0,
        }))
    }
}

/// Writes `r = (x + 0.5) / w`, `g = (y + 0.5) / h` (row 0 at the bottom),
/// `b = frame` and `a` = first texel of an image bound to channel 0 of the
/// terminal buffer, or 1.
pub(crate) struct FakeRenderer {
    log: FakeLog,
    buffers: Vec<String>,
    width: u32,
    height: u32,
    frame: i32,
    alpha: f32,
}

impl FrameRenderer for FakeRenderer {
    fn init(
        &mut self,
        _template: &BufferTemplate,
        passes: &[PassPlan],
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        for plan in passes {
            if let Ok(code) = std::fs::read_to_string(&plan.source) {
                if code.contains("#error") {
                    return Err(EngineError::Compile {
                        buffer: plan.name.clone(),
                        log: "0:1: '#error' : user error".to_string(),
                    });
                }
            }
        }
        self.log.update(|counters| counters.inits += 1);
        self.buffers = passes.iter().map(|plan| plan.name.clone()).collect();
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.log.update(|counters| counters.resizes += 1);
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn render(
        &mut self,
        passes: &[PassPlan],
        uniforms: &FrameUniforms,
    ) -> Result<FrameStats, EngineError> {
        for input in passes.iter().flat_map(|plan| plan.inputs.iter().flatten()) {
            if let InputSource::Buffer(name) = &input.source {
                if !self.buffers.contains(name) {
                    return Err(EngineError::MissingBuffer(name.clone()));
                }
            }
        }
        self.alpha = passes
            .last()
            .and_then(|plan| plan.inputs[0].as_ref())
            .and_then(|input| match &input.source {
                InputSource::Image(data) => data.texels().first().copied(),
                _ => None,
            })
            .unwrap_or(1.0);
        self.frame = uniforms.frame;
        self.log.update(|counters| counters.renders += 1);
        Ok(FrameStats {
            elapsed_ns: FAKE_ELAPSED_NS,
        })
    }

    fn read_output(&mut self, format: PixelFormat, out: &mut [f32]) -> Result<(), EngineError> {
        let (width, height) = (self.width as usize, self.height as usize);
        let depth = format.depth();
        if out.len() != width * height * depth {
            return Err(EngineError::Readback(format!(
                "output holds {} values, {} required",
                out.len(),
                width * height * depth
            )));
        }
        for y in 0..height {
            for x in 0..width {
                let rgba = [
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                    self.frame as f32,
                    self.alpha,
                ];
                let start = (y * width + x) * depth;
                match format {
                    PixelFormat::Rgba => out[start..start + 4].copy_from_slice(&rgba),
                    PixelFormat::Rgb => out[start..start + 3].copy_from_slice(&rgba[..3]),
                    PixelFormat::Luminance => out[start] = rgba[0] + rgba[1] + rgba[2],
                }
            }
        }
        Ok(())
    }
}

/// In-memory catalog serving canned shader documents.
#[derive(Debug, Default)]
pub(crate) struct FakeCatalog {
    documents: HashMap<String, String>,
    fetches: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, id: &str, json: &str) -> Self {
        self.documents.insert(id.to_string(), json.to_string());
        self
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl ShaderCatalog for FakeCatalog {
    fn fetch_shader_json(&self, shader_id: &str) -> anyhow::Result<String> {
        self.fetches.lock().unwrap().push(shader_id.to_string());
        match self.documents.get(shader_id) {
            Some(document) => Ok(document.clone()),
            None => Ok(r#"{"Error": "Shader not found"}"#.to_string()),
        }
    }

    fn download_asset(&self, src: &str, destination: &Path) -> anyhow::Result<()> {
        if src.contains("missing") {
            bail!("404 for {src}");
        }
        self.downloads.lock().unwrap().push(src.to_string());
        std::fs::write(destination, src.as_bytes())?;
        Ok(())
    }
}

/// Shader document with a buffer pass feeding the image pass.
pub(crate) const TWO_PASS_DOCUMENT: &str = r#"
{
    "Shader": {
        "info": { "id": "tst001", "name": "two pass" },
        "renderpass": [
            {
                "name": "Image",
                "type": "image",
                "code": "void mainImage(out vec4 c, in vec2 f) { char x; c = texture(iChannel0, f); }",
                "inputs": [
                    { "id": 257, "channel": 0, "ctype": "buffer",
                      "sampler": { "filter": "nearest", "wrap": "clamp", "vflip": "false" } },
                    { "id": 30, "channel": 1, "ctype": "texture", "src": "/media/a/noise.png",
                      "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" } },
                    { "id": 31, "channel": 2, "ctype": "keyboard" }
                ],
                "outputs": [{ "id": 37, "channel": 0 }]
            },
            {
                "name": "Buffer A",
                "type": "buffer",
                "code": "void mainImage(out vec4 c, in vec2 f) { c = texture(iChannel0, f); }",
                "inputs": [
                    { "id": 257, "channel": 0, "ctype": "buffer",
                      "sampler": { "filter": "linear", "wrap": "clamp", "vflip": "true" } },
                    { "id": 40, "channel": 3, "ctype": "cubemap", "src": "/media/a/cube.jpg" }
                ],
                "outputs": [{ "id": 257, "channel": 0 }]
            },
            {
                "name": "Sound",
                "type": "sound",
                "code": "vec2 mainSound(float t) { return vec2(0.0); }",
                "inputs": [],
                "outputs": []
            }
        ]
    }
}
"#;
