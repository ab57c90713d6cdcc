use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Public API key used when none is configured.
pub const DEFAULT_API_KEY: &str = "fdnKWn";
pub const DEFAULT_API_BASE: &str = "https://www.shadertoy.com/api/v1/";
pub const DEFAULT_MEDIA_BASE: &str = "https://www.shadertoy.com/";

#[derive(Debug, Clone)]
pub struct ShadertoyConfig {
    pub api_key: String,
    pub api_base: Url,
    pub media_base: Url,
}

impl ShadertoyConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("Shadertoy API key must not be empty");
        }
        Ok(Self {
            api_key,
            api_base: Url::parse(DEFAULT_API_BASE)?,
            media_base: Url::parse(DEFAULT_MEDIA_BASE)?,
        })
    }

    /// Overrides the API and media endpoints, e.g. for a mirror.
    pub fn with_bases(mut self, api_base: &str, media_base: &str) -> Result<Self> {
        self.api_base = parse_base(api_base).context("invalid Shadertoy API base url")?;
        self.media_base = parse_base(media_base).context("invalid Shadertoy media base url")?;
        Ok(self)
    }
}

/// Parses a base url, making sure relative joins append to its path.
fn parse_base(input: &str) -> Result<Url> {
    let mut url = Url::parse(input)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Source of shader documents and media files.
pub trait ShaderCatalog: Send + Sync {
    /// Returns the raw JSON document describing `shader_id`.
    fn fetch_shader_json(&self, shader_id: &str) -> Result<String>;

    /// Downloads the media file referenced by `src` into `destination`.
    fn download_asset(&self, src: &str, destination: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ShadertoyClient {
    http: Client,
    config: ShadertoyConfig,
}

impl ShadertoyClient {
    pub fn new(config: ShadertoyConfig) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ShadertoyConfig {
        &self.config
    }

    pub fn fetch_shader(&self, shader_id: &str) -> Result<ShaderPayload> {
        let body = self.fetch_shader_json(shader_id)?;
        parse_shader_response(&body)
    }

    fn shader_url(&self, shader_id: &str) -> Result<Url> {
        let mut url = self.config.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("invalid Shadertoy API base url"))?;
            segments.pop_if_empty();
            segments.push("shaders");
            segments.push(shader_id);
        }
        url.set_query(Some(&format!("key={}", self.config.api_key)));
        Ok(url)
    }
}

impl ShaderCatalog for ShadertoyClient {
    fn fetch_shader_json(&self, shader_id: &str) -> Result<String> {
        if shader_id.trim().is_empty() {
            bail!("shader id must not be empty");
        }
        let url = self.shader_url(shader_id)?;
        debug!(shader = shader_id, "requesting shader document");
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("requesting shader {shader_id}"))?
            .error_for_status()
            .context("Shadertoy API returned an error status")?;
        Ok(response.text()?)
    }

    fn download_asset(&self, src: &str, destination: &Path) -> Result<()> {
        let url = resolve_media_url(&self.config.media_base, src)
            .with_context(|| format!("resolving asset url '{src}'"))?;
        debug!(%url, path = %destination.display(), "downloading shadertoy asset");
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("requesting asset {url}"))?
            .error_for_status()
            .context("Shadertoy asset request failed")?;
        let bytes = response.bytes()?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, &bytes)
            .with_context(|| format!("writing {}", destination.display()))?;
        Ok(())
    }
}

/// Resolves a media reference from a shader document against `media_base`.
pub fn resolve_media_url(media_base: &Url, src: &str) -> Result<Url> {
    if src.starts_with("http://") || src.starts_with("https://") {
        return Ok(Url::parse(src)?);
    }
    if src.starts_with("//") {
        return Ok(Url::parse(&format!("https:{src}"))?);
    }
    let trimmed = src.trim_start_matches('/');
    media_base.join(trimmed).context("joining media url")
}

/// Decodes a shader document, turning catalog-reported errors into failures.
pub fn parse_shader_response(body: &str) -> Result<ShaderPayload> {
    let document: serde_json::Value =
        serde_json::from_str(body).context("Shadertoy API response is not valid JSON")?;
    if let Some(error) = document.get("Error").filter(|value| !value.is_null()) {
        let message = match error {
            serde_json::Value::String(message) => message.clone(),
            other => other.to_string(),
        };
        bail!("{message}");
    }
    let Some(shader) = document.get("Shader") else {
        let snippet = body.chars().take(200).collect::<String>();
        bail!(
            "unexpected Shadertoy API response; could not find 'Shader' field. First 200 bytes: {snippet}"
        );
    };
    ShaderPayload::deserialize(shader).context("malformed shader document")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShaderPayload {
    #[serde(default)]
    pub info: ShaderInfo,
    #[serde(rename = "renderpass", default)]
    pub render_passes: Vec<RenderPass>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ShaderInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenderPass {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub pass_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub inputs: Vec<RenderInput>,
    #[serde(default)]
    pub outputs: Vec<RenderOutput>,
}

impl RenderPass {
    /// Lowercased pass name, or the pass type when the name is empty.
    pub fn buffer_name(&self) -> String {
        let name = if self.name.trim().is_empty() {
            &self.pass_type
        } else {
            &self.name
        };
        name.to_lowercase()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenderInput {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(rename = "ctype")]
    pub channel_type: String,
    #[serde(default)]
    pub sampler: SamplerSpec,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenderOutput {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub channel: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SamplerSpec {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub wrap: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub vflip: bool,
}

/// Ids show up both as JSON numbers and as strings depending on the API version.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(number)) => Ok(Some(number.to_string())),
        Some(serde_json::Value::String(text)) => Ok(Some(text.trim().to_string())),
        Some(other) => Err(de::Error::custom(format!("unexpected id value {other}"))),
    }
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Bool(flag)) => Ok(flag),
        Some(serde_json::Value::String(text)) => Ok(text == "true"),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "Shader": {
            "info": { "id": "XsBSRG", "name": "Sample Shader", "tags": ["demo"] },
            "renderpass": [
                {
                    "name": "Buffer A",
                    "type": "buffer",
                    "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(0.0); }",
                    "inputs": [
                        {
                            "id": "17",
                            "channel": 0,
                            "ctype": "texture",
                            "src": "/media/a/tex0.png",
                            "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" }
                        }
                    ],
                    "outputs": [{ "id": 257, "channel": 0 }]
                },
                {
                    "name": "",
                    "type": "image",
                    "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(1.0); }",
                    "inputs": [{ "id": 257, "channel": 0, "ctype": "buffer" }],
                    "outputs": []
                }
            ]
        }
    }
    "#;

    #[test]
    fn parses_payload_with_mixed_id_types() {
        let payload = parse_shader_response(SAMPLE).unwrap();
        assert_eq!(payload.info.name, "Sample Shader");
        assert_eq!(payload.render_passes.len(), 2);

        let buffer = &payload.render_passes[0];
        assert_eq!(buffer.buffer_name(), "buffer a");
        assert_eq!(buffer.outputs[0].id.as_deref(), Some("257"));
        assert_eq!(buffer.inputs[0].id.as_deref(), Some("17"));
        assert_eq!(
            buffer.inputs[0].sampler,
            SamplerSpec {
                filter: Some("mipmap".into()),
                wrap: Some("repeat".into()),
                vflip: true,
            }
        );

        let image = &payload.render_passes[1];
        assert_eq!(image.buffer_name(), "image");
        assert_eq!(image.inputs[0].id.as_deref(), Some("257"));
        assert!(!image.inputs[0].sampler.vflip);
    }

    #[test]
    fn catalog_errors_carry_message() {
        let err = parse_shader_response(r#"{"Error": "Shader not found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Shader not found");
    }

    #[test]
    fn rejects_documents_without_shader() {
        let err = parse_shader_response(r#"{"Something": 1}"#).unwrap_err();
        assert!(err.to_string().contains("could not find 'Shader'"));
        assert!(parse_shader_response("not json").is_err());
    }

    #[test]
    fn resolves_media_urls() {
        let base = Url::parse(DEFAULT_MEDIA_BASE).unwrap();
        assert_eq!(
            resolve_media_url(&base, "/media/a/tex.png").unwrap().as_str(),
            "https://www.shadertoy.com/media/a/tex.png"
        );
        assert_eq!(
            resolve_media_url(&base, "//cdn.example.com/x.jpg").unwrap().as_str(),
            "https://cdn.example.com/x.jpg"
        );
        assert_eq!(
            resolve_media_url(&base, "http://other.example/y.png").unwrap().as_str(),
            "http://other.example/y.png"
        );
    }

    #[test]
    fn shader_url_includes_key() {
        let config = ShadertoyConfig::new("abc")
            .unwrap()
            .with_bases("https://mirror.example/api/v1", "https://mirror.example")
            .unwrap();
        let client = ShadertoyClient::new(config).unwrap();
        assert_eq!(
            client.shader_url("XsBSRG").unwrap().as_str(),
            "https://mirror.example/api/v1/shaders/XsBSRG?key=abc"
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(ShadertoyConfig::new("  ").is_err());
        assert_eq!(
            ShadertoyConfig::new(DEFAULT_API_KEY).unwrap().api_base.as_str(),
            DEFAULT_API_BASE
        );
    }
}
