use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use renderer::{ChannelInput, InputSource, MinFilter, SamplerOptions, Wrap, CHANNEL_COUNT};
use shadertoy::{
    parse_shader_response, rename_reserved_words, AssetCache, RenderInput, RenderPass,
    SamplerSpec, ShaderCatalog,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::graph::{BufferGraph, IMAGE_BUFFER};
use crate::input::Channel;

/// First output id of the `Buf A`..`Buf D` series.
const FIRST_BUFFER_OUTPUT: u32 = 257;

fn load_error(err: anyhow::Error) -> Error {
    Error::Load(format!("{err:#}"))
}

/// Fetches shader `id` from `catalog` and builds its buffer graph.
///
/// Media inputs are resolved through `cache`; GLSL units and a copy of the
/// document are written to `scratch_dir`.
pub fn load_remote(
    id: &str,
    catalog: &dyn ShaderCatalog,
    cache: &AssetCache,
    scratch_dir: &Path,
) -> Result<BufferGraph> {
    let body = catalog.fetch_shader_json(id).map_err(load_error)?;
    let payload = parse_shader_response(&body).map_err(load_error)?;

    fs::create_dir_all(scratch_dir).map_err(|source| Error::io(scratch_dir, source))?;
    let dump = scratch_dir.join(format!("{id}.json"));
    fs::write(&dump, &body).map_err(|source| Error::io(&dump, source))?;

    let common: String = payload
        .render_passes
        .iter()
        .filter(|pass| pass.pass_type == "common")
        .map(|pass| format!("{}\n", pass.code))
        .collect();

    let mut passes = Vec::new();
    for (index, pass) in payload.render_passes.iter().enumerate() {
        match pass.pass_type.as_str() {
            "sound" => {
                warn!("Skipping unsupported sound shader.");
                continue;
            }
            "common" => continue,
            _ => {}
        }
        let path = unit_path(scratch_dir, id, index);
        if !path.exists() {
            let code = rename_reserved_words(&format!("{common}{}", pass.code));
            fs::write(&path, code).map_err(|source| Error::io(&path, source))?;
        }
        passes.push((index, pass, path));
    }

    let outputs: HashMap<&str, String> = payload
        .render_passes
        .iter()
        .filter(|pass| !matches!(pass.pass_type.as_str(), "sound" | "common"))
        .flat_map(|pass| {
            let name = pass.buffer_name();
            pass.outputs
                .iter()
                .filter_map(|output| output.id.as_deref())
                .map(move |output| (output, name.clone()))
        })
        .collect();

    // Buffers render in document order, the image buffer last.
    let (image, mut ordered): (Vec<_>, Vec<_>) = passes
        .into_iter()
        .partition(|(_, pass, _)| pass.buffer_name() == IMAGE_BUFFER);
    if image.is_empty() {
        return Err(Error::Load(format!("Shader {id} has no image pass")));
    }
    ordered.extend(image);

    let mut graph = BufferGraph::new();
    for (_, pass, path) in &ordered {
        graph
            .push(&pass.buffer_name(), path.clone())
            .map_err(|err| Error::Load(err.to_string()))?;
    }

    for (index, pass, _) in &ordered {
        let wiring = wire_inputs(*index, pass, &graph, &outputs, catalog, cache)?;
        let Some(buffer) = graph.buffer_mut(&pass.buffer_name()) else {
            continue;
        };
        for (channel, input) in wiring {
            if let Some(slot) = buffer.channel_mut(channel) {
                *slot = Channel::new(Some(input));
            }
        }
    }

    info!(id, buffers = graph.len(), "loaded remote shader");
    Ok(graph)
}

fn wire_inputs(
    index: usize,
    pass: &RenderPass,
    graph: &BufferGraph,
    outputs: &HashMap<&str, String>,
    catalog: &dyn ShaderCatalog,
    cache: &AssetCache,
) -> Result<Vec<(usize, ChannelInput)>> {
    let mut wiring = Vec::new();
    for input in &pass.inputs {
        let channel = input.channel as usize;
        if channel >= CHANNEL_COUNT {
            return Err(Error::Load(format!(
                "Invalid channel {channel} for pass {index}"
            )));
        }
        let source = match input.channel_type.as_str() {
            "texture" => InputSource::Texture(
                cache
                    .ensure(catalog, media_src(index, input)?)
                    .map_err(load_error)?,
            ),
            "cubemap" => InputSource::Cubemap(
                cache
                    .ensure_cubemap(catalog, media_src(index, input)?)
                    .map_err(load_error)?,
            ),
            "buffer" => {
                let target = buffer_target(input, outputs).ok_or_else(|| {
                    Error::Load(format!(
                        "Pass {index}, input {channel}: buffer input has no usable id"
                    ))
                })?;
                if !graph.contains(&target) {
                    return Err(Error::Load(format!(
                        "Pass {index}, input {channel}: unknown buffer {target}"
                    )));
                }
                debug!(pass = index, channel, buffer = %target, "binding buffer input");
                InputSource::Buffer(target)
            }
            other => {
                warn!("Unsupported input {other} for pass {index}, input {channel}");
                continue;
            }
        };
        wiring.push((
            channel,
            ChannelInput::new(source).with_sampler(sampler_options(&input.sampler)),
        ));
    }
    Ok(wiring)
}

fn media_src(index: usize, input: &RenderInput) -> Result<&str> {
    input.src.as_deref().ok_or_else(|| {
        Error::Load(format!(
            "Pass {index}, input {}: {} input has no source",
            input.channel, input.channel_type
        ))
    })
}

/// Name of the buffer producing `input`: by declared output id, else the
/// `257 + n` numbering of `buf a`..`buf d`.
fn buffer_target(input: &RenderInput, outputs: &HashMap<&str, String>) -> Option<String> {
    let id = input.id.as_deref()?;
    if let Some(name) = outputs.get(id) {
        return Some(name.clone());
    }
    let offset = id.parse::<u32>().ok()?.checked_sub(FIRST_BUFFER_OUTPUT)?;
    let letter = char::from_u32('a' as u32 + offset).filter(char::is_ascii_lowercase)?;
    Some(format!("buf {letter}"))
}

fn sampler_options(spec: &SamplerSpec) -> SamplerOptions {
    let mut options = SamplerOptions::default();
    options = match spec.filter.as_deref() {
        Some("mipmap") => options.with_min_filter(MinFilter::LinearMipmapLinear),
        Some("linear") => options.with_min_filter(MinFilter::Linear),
        Some("nearest") => options.with_min_filter(MinFilter::Nearest),
        _ => options,
    };
    options = match spec.wrap.as_deref() {
        Some("repeat") => options.with_wrap(Wrap::Repeat),
        Some("clamp") => options.with_wrap(Wrap::ClampToEdge),
        _ => options,
    };
    options.with_vflip(spec.vflip)
}

fn unit_path(scratch_dir: &Path, id: &str, index: usize) -> PathBuf {
    scratch_dir.join(format!(
        "stcode_remoteshader-{}-{id}-{index}.glsl",
        std::process::id()
    ))
}
