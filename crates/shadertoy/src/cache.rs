use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use reqwest::Url;
use tracing::info;

use crate::remote::ShaderCatalog;

/// Number of faces fetched for a cubemap input.
const CUBEMAP_FACES: usize = 6;

/// Flat directory of downloaded media, keyed by file name.
#[derive(Debug, Clone)]
pub struct AssetCache {
    root: PathBuf,
}

impl AssetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location `src` is cached at.
    pub fn path_for(&self, src: &str) -> Result<PathBuf> {
        Ok(self.root.join(asset_filename(src)?))
    }

    /// Returns the local copy of `src`, downloading it on first use.
    pub fn ensure(&self, catalog: &dyn ShaderCatalog, src: &str) -> Result<PathBuf> {
        let destination = self.path_for(src)?;
        if destination.exists() {
            info!("Using cache for {src}");
            return Ok(destination);
        }

        info!("Downloading {src}");
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating asset cache {}", self.root.display()))?;
        let mut partial = destination.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        catalog
            .download_asset(src, &partial)
            .with_context(|| format!("downloading {src}"))?;
        fs::rename(&partial, &destination)
            .with_context(|| format!("moving download into {}", destination.display()))?;
        Ok(destination)
    }

    /// Caches the six faces of a cubemap; returns the path of face 0.
    ///
    /// Face `n > 0` of `a/b.jpg` lives at `a/b_n.jpg`, both remotely and on disk.
    pub fn ensure_cubemap(&self, catalog: &dyn ShaderCatalog, src: &str) -> Result<PathBuf> {
        let first = self.ensure(catalog, src)?;
        for face in 1..CUBEMAP_FACES {
            self.ensure(catalog, &cubemap_face_src(src, face))?;
        }
        Ok(first)
    }
}

fn asset_filename(src: &str) -> Result<String> {
    let trimmed = src.split(&['?', '#'][..]).next().unwrap_or(src);
    let path_owned = match Url::parse(trimmed) {
        Ok(url) => url.path().to_string(),
        Err(_) => trimmed.to_string(),
    };
    match Path::new(&path_owned).file_name() {
        Some(name) if !name.is_empty() => Ok(name.to_string_lossy().to_string()),
        _ => bail!("asset reference '{src}' has no file name"),
    }
}

fn cubemap_face_src(src: &str, face: usize) -> String {
    let (path, suffix) = match src.find(['?', '#']) {
        Some(index) => src.split_at(index),
        None => (src, ""),
    };
    let name_start = path.rfind('/').map_or(0, |index| index + 1);
    match path[name_start..].rfind('.') {
        Some(dot) => {
            let dot = name_start + dot;
            format!("{}_{face}{}{suffix}", &path[..dot], &path[dot..])
        }
        None => format!("{path}_{face}{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingCatalog {
        downloads: Mutex<Vec<String>>,
    }

    impl ShaderCatalog for RecordingCatalog {
        fn fetch_shader_json(&self, _shader_id: &str) -> Result<String> {
            bail!("not used")
        }

        fn download_asset(&self, src: &str, destination: &Path) -> Result<()> {
            self.downloads.lock().unwrap().push(src.to_string());
            fs::write(destination, src.as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn downloads_once_then_serves_from_cache() {
        let temp = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(temp.path().join("assets"));
        let catalog = RecordingCatalog::default();

        let first = cache.ensure(&catalog, "/media/a/tex0.png").unwrap();
        let second = cache.ensure(&catalog, "/media/a/tex0.png").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, temp.path().join("assets").join("tex0.png"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "/media/a/tex0.png");
        assert_eq!(catalog.downloads.lock().unwrap().len(), 1);
        assert!(!temp.path().join("assets").join("tex0.png.part").exists());
    }

    #[test]
    fn cubemaps_fetch_six_faces() {
        let temp = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(temp.path());
        let catalog = RecordingCatalog::default();

        let face0 = cache.ensure_cubemap(&catalog, "/media/a/cube.jpg").unwrap();
        assert_eq!(face0, temp.path().join("cube.jpg"));
        assert!(temp.path().join("cube_5.jpg").exists());
        let downloads = catalog.downloads.lock().unwrap();
        assert_eq!(downloads.len(), 6);
        assert_eq!(downloads[1], "/media/a/cube_1.jpg");
    }

    #[test]
    fn face_names_keep_extension_and_query() {
        assert_eq!(cubemap_face_src("/m/x.png?v=2", 3), "/m/x_3.png?v=2");
        assert_eq!(cubemap_face_src("/m.d/x", 1), "/m.d/x_1");
    }

    #[test]
    fn filenames_ignore_query_and_host() {
        assert_eq!(
            asset_filename("https://www.shadertoy.com/media/a/t.png?x=1").unwrap(),
            "t.png"
        );
        assert!(asset_filename("/").is_err());
    }
}
