use std::fs;
use std::path::Path;

use renderer::EngineError;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::BufferGraph;

/// Builds a graph from caller-supplied `(name, source)` pairs.
///
/// Names containing `:` replace the template part of that name; every other
/// entry becomes a buffer, in the order given, backed by
/// `<scratch_dir>/stcode_<id>-<name>.glsl`.
pub fn load_local(id: &str, sources: &[(String, String)], scratch_dir: &Path) -> Result<BufferGraph> {
    let mut graph = BufferGraph::new();

    for (name, source) in sources.iter().filter(|(name, _)| name.contains(':')) {
        let mut contents = source.clone();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        graph
            .template_mut()
            .replace(name, contents)
            .map_err(|err| match err {
                EngineError::Template(message) => Error::Config(message),
                other => Error::Engine(other),
            })?;
        debug!(id, part = %name, "template part overridden");
    }

    fs::create_dir_all(scratch_dir).map_err(|source| Error::io(scratch_dir, source))?;
    for (name, source) in sources.iter().filter(|(name, _)| !name.contains(':')) {
        let lower = name.to_lowercase();
        if graph.contains(&lower) {
            return Err(Error::Config(format!("Duplicate buffer name {lower}")));
        }
        let path = scratch_dir.join(format!("stcode_{id}-{lower}.glsl"));
        fs::write(&path, source).map_err(|source| Error::io(&path, source))?;
        graph.push(&lower, path)?;
    }

    graph.validate()?;
    Ok(graph)
}
