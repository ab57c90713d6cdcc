use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of `config.toml`; every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub shadertoy: ShadertoySettings,
    pub host: HostSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ShadertoySettings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub media_base: String,
}

impl Default for ShadertoySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: shadertoy::DEFAULT_API_BASE.to_string(),
            media_base: shadertoy::DEFAULT_MEDIA_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HostSettings {
    /// Size of a context before its first render.
    pub width: u32,
    pub height: u32,
    /// Defaults to the system temporary directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind: String,
    pub poll_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", connector::DEFAULT_PORT),
            poll_interval_ms: 100,
        }
    }
}

impl Settings {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.width == 0 || self.host.height == 0 {
            return Err(ConfigError::Invalid(
                "host width and height must be greater than zero".to_string(),
            ));
        }
        if self.server.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "server poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server bind must not be empty".to_string()));
        }
        if matches!(&self.shadertoy.api_key, Some(key) if key.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "shadertoy api_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// API key from the command line, else the file, else the public default.
    pub fn api_key(&self, cli_key: Option<&str>) -> String {
        cli_key
            .map(str::to_string)
            .or_else(|| self.shadertoy.api_key.clone())
            .unwrap_or_else(|| shadertoy::DEFAULT_API_KEY.to_string())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.host
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
