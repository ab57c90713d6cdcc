use std::path::PathBuf;

/// Failures raised by the rendering engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("GPU device error: {0}")]
    Device(String),
    #[error("Shader compilation error in buffer {buffer}:\n{log}")]
    Compile { buffer: String, log: String },
    #[error("template error: {0}")]
    Template(String),
    #[error("failed to load texture {}: {source}", path.display())]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture readback failed: {0}")]
    Readback(String),
    #[error("buffer \"{0}\" is not part of the compiled graph")]
    MissingBuffer(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
