use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Local, Timelike};

/// ShaderToy exposes four optional input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Frame rate used to derive `iTime` and `iTimeDelta` from a frame index.
pub const TARGET_FRAME_RATE: f32 = 60.0;

/// OpenGL enum values accepted at the API boundary.
pub mod gl {
    pub const RGBA: u32 = 0x1908;
    pub const RGB: u32 = 0x1907;
    pub const LUMINANCE: u32 = 0x1909;

    pub const NEAREST: i32 = 0x2600;
    pub const LINEAR: i32 = 0x2601;
    pub const NEAREST_MIPMAP_NEAREST: i32 = 0x2700;
    pub const LINEAR_MIPMAP_NEAREST: i32 = 0x2701;
    pub const NEAREST_MIPMAP_LINEAR: i32 = 0x2702;
    pub const LINEAR_MIPMAP_LINEAR: i32 = 0x2703;

    pub const REPEAT: i32 = 0x2901;
    pub const CLAMP_TO_EDGE: i32 = 0x812F;
    pub const MIRRORED_REPEAT: i32 = 0x8370;
}

/// Pixel layout requested when reading back the terminal buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba,
    Rgb,
    Luminance,
}

impl PixelFormat {
    pub fn from_gl(value: u32) -> Option<Self> {
        match value {
            gl::RGBA => Some(Self::Rgba),
            gl::RGB => Some(Self::Rgb),
            gl::LUMINANCE => Some(Self::Luminance),
            _ => None,
        }
    }

    pub fn to_gl(self) -> u32 {
        match self {
            Self::Rgba => gl::RGBA,
            Self::Rgb => gl::RGB,
            Self::Luminance => gl::LUMINANCE,
        }
    }

    /// Number of float components per pixel.
    pub fn depth(self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Rgb => 3,
            Self::Luminance => 1,
        }
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgba" => Ok(Self::Rgba),
            "rgb" => Ok(Self::Rgb),
            "luminance" | "lum" | "gray" => Ok(Self::Luminance),
            other => Err(format!(
                "unknown pixel format '{other}' (expected rgba, rgb or luminance)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl MinFilter {
    pub fn from_gl(value: i32) -> Option<Self> {
        match value {
            gl::NEAREST => Some(Self::Nearest),
            gl::LINEAR => Some(Self::Linear),
            gl::NEAREST_MIPMAP_NEAREST => Some(Self::NearestMipmapNearest),
            gl::LINEAR_MIPMAP_NEAREST => Some(Self::LinearMipmapNearest),
            gl::NEAREST_MIPMAP_LINEAR => Some(Self::NearestMipmapLinear),
            gl::LINEAR_MIPMAP_LINEAR => Some(Self::LinearMipmapLinear),
            _ => None,
        }
    }

    pub fn to_gl(self) -> i32 {
        match self {
            Self::Nearest => gl::NEAREST,
            Self::Linear => gl::LINEAR,
            Self::NearestMipmapNearest => gl::NEAREST_MIPMAP_NEAREST,
            Self::LinearMipmapNearest => gl::LINEAR_MIPMAP_NEAREST,
            Self::NearestMipmapLinear => gl::NEAREST_MIPMAP_LINEAR,
            Self::LinearMipmapLinear => gl::LINEAR_MIPMAP_LINEAR,
        }
    }

    fn texel_filter(self) -> wgpu::FilterMode {
        match self {
            Self::Nearest | Self::NearestMipmapNearest | Self::NearestMipmapLinear => {
                wgpu::FilterMode::Nearest
            }
            Self::Linear | Self::LinearMipmapNearest | Self::LinearMipmapLinear => {
                wgpu::FilterMode::Linear
            }
        }
    }

    fn mipmap_filter(self) -> wgpu::FilterMode {
        match self {
            Self::NearestMipmapLinear | Self::LinearMipmapLinear => wgpu::FilterMode::Linear,
            _ => wgpu::FilterMode::Nearest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl Wrap {
    pub fn from_gl(value: i32) -> Option<Self> {
        match value {
            gl::REPEAT => Some(Self::Repeat),
            gl::CLAMP_TO_EDGE => Some(Self::ClampToEdge),
            gl::MIRRORED_REPEAT => Some(Self::MirroredRepeat),
            _ => None,
        }
    }

    fn address_mode(self) -> wgpu::AddressMode {
        match self {
            Self::Repeat => wgpu::AddressMode::Repeat,
            Self::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            Self::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

/// Sampling state attached to a channel input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerOptions {
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub wrap: Wrap,
    /// Flip file-backed textures so row 0 is the bottom of the picture.
    pub vflip: bool,
}

impl SamplerOptions {
    /// Sets the minification filter and the matching magnification filter.
    pub fn with_min_filter(mut self, min_filter: MinFilter) -> Self {
        self.min_filter = min_filter;
        self.mag_filter = if min_filter == MinFilter::Nearest {
            MagFilter::Nearest
        } else {
            MagFilter::Linear
        };
        self
    }

    pub fn with_wrap(mut self, wrap: Wrap) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_vflip(mut self, vflip: bool) -> Self {
        self.vflip = vflip;
        self
    }

    pub(crate) fn descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        let address_mode = self.wrap.address_mode();
        wgpu::SamplerDescriptor {
            label: Some("channel sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: match self.mag_filter {
                MagFilter::Nearest => wgpu::FilterMode::Nearest,
                MagFilter::Linear => wgpu::FilterMode::Linear,
            },
            min_filter: self.min_filter.texel_filter(),
            mipmap_filter: self.min_filter.mipmap_filter(),
            ..Default::default()
        }
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            min_filter: MinFilter::Linear,
            mag_filter: MagFilter::Linear,
            wrap: Wrap::Repeat,
            vflip: false,
        }
    }
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Static float image fed to a channel, stored bottom-up as the GPU expects.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    id: u64,
    width: u32,
    height: u32,
    channels: u32,
    texels: Vec<f32>,
}

impl TextureData {
    /// `texels` must hold `width * height * channels` values with row 0 at the bottom.
    pub fn new(width: u32, height: u32, channels: u32, texels: Vec<f32>) -> Option<Self> {
        if width == 0 || height == 0 || !(1..=4).contains(&channels) {
            return None;
        }
        let expected = width as usize * height as usize * channels as usize;
        if texels.len() != expected {
            return None;
        }
        Some(Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            channels,
            texels,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    /// Expands the texels to RGBA; missing colour components read as 0, alpha as 1.
    pub fn to_rgba(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        let mut rgba = Vec::with_capacity(self.texels.len() / channels * 4);
        for texel in self.texels.chunks_exact(channels) {
            let mut pixel = [0.0, 0.0, 0.0, 1.0];
            pixel[..channels].copy_from_slice(texel);
            rgba.extend_from_slice(&pixel);
        }
        rgba
    }
}

/// Where a channel takes its texels from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Texture(PathBuf),
    /// Face 0 lives at the path; faces 1-5 at `<stem>_<n>.<ext>` beside it.
    Cubemap(PathBuf),
    Buffer(String),
    Image(Arc<TextureData>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInput {
    pub source: InputSource,
    pub sampler: SamplerOptions,
}

impl ChannelInput {
    pub fn new(source: InputSource) -> Self {
        Self {
            source,
            sampler: SamplerOptions::default(),
        }
    }

    pub fn with_sampler(mut self, sampler: SamplerOptions) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn kind(&self) -> ChannelTextureKind {
        match self.source {
            InputSource::Cubemap(_) => ChannelTextureKind::Cubemap,
            _ => ChannelTextureKind::Texture2d,
        }
    }
}

/// Enumerates the texture dimensionality requirements for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelTextureKind {
    Texture2d,
    Cubemap,
}

/// One buffer of the graph, with the inputs it sees for the next frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PassPlan {
    pub name: String,
    pub source: PathBuf,
    pub inputs: [Option<ChannelInput>; CHANNEL_COUNT],
}

impl PassPlan {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            inputs: std::array::from_fn(|_| None),
        }
    }

    /// Returns the required texture dimensionality for each channel.
    pub fn layout_signature(&self) -> [ChannelTextureKind; CHANNEL_COUNT] {
        std::array::from_fn(|index| {
            self.inputs[index]
                .as_ref()
                .map(ChannelInput::kind)
                .unwrap_or(ChannelTextureKind::Texture2d)
        })
    }
}

/// Per-frame Shadertoy uniform values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
}

impl FrameUniforms {
    /// Derives time from the frame index at [`TARGET_FRAME_RATE`] and stamps the local date.
    pub fn for_frame(frame: i32, mouse: [f32; 4]) -> Self {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        Self {
            time: frame as f32 / TARGET_FRAME_RATE,
            time_delta: 1.0 / TARGET_FRAME_RATE,
            frame_rate: TARGET_FRAME_RATE,
            frame,
            mouse,
            date: [
                local_now.year() as f32,
                local_now.month() as f32,
                local_now.day() as f32,
                seconds_since_midnight,
            ],
        }
    }
}

/// Timing of the last rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Execution time of the terminal pass in nanoseconds.
    pub elapsed_ns: u64,
}

/// Adapter selection knobs for the headless device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    High,
    Low,
}

#[derive(Debug, Clone, Default)]
pub struct GpuOptions {
    pub power: GpuPowerPreference,
    /// Fall back to a software adapter when no hardware one is available.
    pub allow_software: bool,
}
