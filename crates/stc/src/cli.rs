use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use connector::InputSpec;
use renderer::{gl, PixelFormat};

#[derive(Parser, Debug)]
#[command(
    name = "stc",
    author,
    version,
    about = "Render Shadertoy shaders headlessly, locally or on a remote host"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the local GPU host to remote clients.
    Serve(ServeArgs),
    /// Render one frame of a shader and report the result.
    Render(RenderArgs),
    /// Print resolved directories for config and cache.
    Where,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// Shadertoy API key; can also be supplied via the `SHADERTOY_API_KEY` env var.
    #[arg(long, env = "SHADERTOY_API_KEY", hide_env_values = true)]
    pub shadertoy_api_key: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. `0.0.0.0:13710`).
    #[arg(long, short, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Sleep between polls of an idle socket.
    #[arg(long, value_name = "MILLISECONDS")]
    pub poll_interval_ms: Option<u64>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long)]
    pub debug: bool,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// `local`, or the address of an `stc serve` instance.
    #[arg(long, default_value = "local")]
    pub target: String,

    /// Shadertoy shader id to fetch.
    #[arg(long, value_name = "ID", conflicts_with = "source", required_unless_present = "source")]
    pub shader: Option<String>,

    /// GLSL file for the image buffer of a local shader.
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Additional buffer of a local shader, rendered before the image buffer.
    #[arg(
        long = "buffer",
        value_name = "NAME=FILE",
        value_parser = parse_buffer_source,
        requires = "source"
    )]
    pub buffers: Vec<(String, PathBuf)>,

    /// Render resolution (e.g. `640x360`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Frame to render; continues from the context's counter when omitted.
    #[arg(long, allow_negative_numbers = true)]
    pub frame: Option<i32>,

    #[arg(long, default_value = "rgba", value_parser = parse_format)]
    pub format: PixelFormat,

    /// Mouse uniform as `x,y,z,w`.
    #[arg(long, value_name = "X,Y,Z,W", value_parser = parse_mouse, allow_negative_numbers = true)]
    pub mouse: Option<[f32; 4]>,

    /// Feed a picture to a channel (e.g. `image.0=noise.png`).
    #[arg(long = "input", value_name = "BUFFER.CHANNEL=FILE", value_parser = parse_input)]
    pub inputs: Vec<(InputSpec, PathBuf)>,

    /// Set a channel's filter after inputs are applied (`nearest`, `linear` or `mipmap`).
    #[arg(long = "filter", value_name = "BUFFER.CHANNEL=FILTER", value_parser = parse_filter)]
    pub filters: Vec<(InputSpec, i32)>,

    /// Write the rendered frame as a PNG.
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 640x360".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;
    if width == 0 || height == 0 {
        return Err("render dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_format(value: &str) -> Result<PixelFormat, String> {
    value.parse()
}

pub fn parse_mouse(value: &str) -> Result<[f32; 4], String> {
    let components = value
        .split(',')
        .map(|component| component.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid mouse value '{value}'"))?;
    components
        .try_into()
        .map_err(|_| "mouse expects four comma-separated values".to_string())
}

fn split_assignment(value: &str) -> Result<(&str, &str), String> {
    value
        .split_once('=')
        .filter(|(name, rhs)| !name.trim().is_empty() && !rhs.trim().is_empty())
        .map(|(name, rhs)| (name.trim(), rhs.trim()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{value}'"))
}

pub fn parse_buffer_source(value: &str) -> Result<(String, PathBuf), String> {
    let (name, file) = split_assignment(value)?;
    Ok((name.to_string(), PathBuf::from(file)))
}

pub fn parse_input(value: &str) -> Result<(InputSpec, PathBuf), String> {
    let (spec, file) = split_assignment(value)?;
    let spec = InputSpec::parse(spec).map_err(|err| err.to_string())?;
    Ok((spec, PathBuf::from(file)))
}

pub fn parse_filter(value: &str) -> Result<(InputSpec, i32), String> {
    let (spec, filter) = split_assignment(value)?;
    let spec = InputSpec::parse(spec).map_err(|err| err.to_string())?;
    let filter = match filter.to_ascii_lowercase().as_str() {
        "nearest" => gl::NEAREST,
        "linear" => gl::LINEAR,
        "mipmap" => gl::LINEAR_MIPMAP_LINEAR,
        other => {
            return Err(format!(
                "unknown filter '{other}'; expected nearest, linear, or mipmap"
            ))
        }
    };
    Ok((spec, filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("640x360"), Ok((640, 360)));
        assert_eq!(parse_size(" 8 X 4 "), Ok((8, 4)));
        assert!(parse_size("0x4").is_err());
        assert!(parse_size("640").is_err());
    }

    #[test]
    fn parses_mouse_and_format() {
        assert_eq!(parse_mouse("1, 2,-3,4.5"), Ok([1.0, 2.0, -3.0, 4.5]));
        assert!(parse_mouse("1,2,3").is_err());
        assert_eq!(parse_format("luminance"), Ok(PixelFormat::Luminance));
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_buffer_source("Buffer A=a.glsl"),
            Ok(("Buffer A".to_string(), PathBuf::from("a.glsl")))
        );
        let (spec, path) = parse_input("image.1=noise.png").unwrap();
        assert_eq!(spec.to_string(), "image.1");
        assert_eq!(path, PathBuf::from("noise.png"));

        let (spec, filter) = parse_filter("Buffer A.0=nearest").unwrap();
        assert_eq!(spec.buffer, "buffer a");
        assert_eq!(filter, gl::NEAREST);
        assert!(parse_filter("image.0=cubic").is_err());
        assert!(parse_input("image.7=x.png").is_err());
        assert!(parse_input("=x.png").is_err());
    }

    #[test]
    fn render_requires_a_shader_or_source() {
        assert!(Cli::try_parse_from(["stc", "render"]).is_err());
        assert!(Cli::try_parse_from(["stc", "render", "--shader", "a", "--source", "b"]).is_err());
        assert!(Cli::try_parse_from(["stc", "render", "--buffer", "a=b"]).is_err());

        let cli = Cli::try_parse_from([
            "stc", "render", "--source", "image.glsl", "--buffer", "buffer a=a.glsl",
            "--size", "32x16", "--frame", "-1", "--format", "rgb",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.size, Some((32, 16)));
        assert_eq!(args.frame, Some(-1));
        assert_eq!(args.format, PixelFormat::Rgb);
        assert_eq!(args.buffers.len(), 1);
        assert_eq!(args.target, "local");
    }
}
