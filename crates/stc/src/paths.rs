use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "STC_CONFIG_DIR";
pub const ENV_CACHE_DIR: &str = "STC_CACHE_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Shadertoy Connector";
const APPLICATION: &str = "stc";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    cache_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let overrides = (env_override(ENV_CONFIG_DIR), env_override(ENV_CACHE_DIR));
        if let (Some(config_dir), Some(cache_dir)) = overrides.clone() {
            return Ok(Self {
                config_dir,
                cache_dir,
            });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        let (config_dir, cache_dir) = overrides;
        Ok(Self {
            config_dir: config_dir.unwrap_or_else(|| project_dirs.config_dir().to_path_buf()),
            cache_dir: cache_dir.unwrap_or_else(|| project_dirs.cache_dir().to_path_buf()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Downloaded textures and cubemap faces.
    pub fn asset_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("assets")
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
