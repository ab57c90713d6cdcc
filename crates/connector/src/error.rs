use std::path::PathBuf;

use renderer::EngineError;

/// Failures surfaced by contexts, hosts and the wire protocol.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Surface or connection setup failed; the host cannot be used.
    #[error("{0}")]
    Allocation(String),
    /// Remote catalog fetch or parse failure, unsupported input.
    #[error("{0}")]
    Load(String),
    /// Malformed buffer graph definition.
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidFormat(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("{0}")]
    NotInitialized(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// `ERROR` response received from a remote host.
    #[error("{0}")]
    Remote(String),
    /// Malformed request or response frame.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
