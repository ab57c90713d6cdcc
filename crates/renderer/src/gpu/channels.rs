use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::flip_vertical_in_place;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::EngineError;
use crate::types::{SamplerOptions, TextureData};

/// Number of faces in a cubemap texture.
const CUBEMAP_FACES: u32 = 6;

/// A texture view ready to be bound to a channel slot.
pub(crate) struct ChannelTexture {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub resolution: [f32; 4],
}

/// Uploaded channel textures and samplers, reused across frames.
pub(crate) struct ChannelCache {
    files: HashMap<(PathBuf, bool), Arc<ChannelTexture>>,
    cubemaps: HashMap<(PathBuf, bool), Arc<ChannelTexture>>,
    images: HashMap<u64, Arc<ChannelTexture>>,
    samplers: HashMap<SamplerOptions, wgpu::Sampler>,
    placeholder: Arc<ChannelTexture>,
    placeholder_cube: Arc<ChannelTexture>,
    max_dimension: u32,
}

impl ChannelCache {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, max_dimension: u32) -> Self {
        Self {
            files: HashMap::new(),
            cubemaps: HashMap::new(),
            images: HashMap::new(),
            samplers: HashMap::new(),
            placeholder: Arc::new(create_placeholder_texture(device, queue, 1)),
            placeholder_cube: Arc::new(create_placeholder_texture(device, queue, CUBEMAP_FACES)),
            max_dimension,
        }
    }

    pub fn placeholder(&self) -> Arc<ChannelTexture> {
        Arc::clone(&self.placeholder)
    }

    pub fn placeholder_cube(&self) -> Arc<ChannelTexture> {
        Arc::clone(&self.placeholder_cube)
    }

    pub fn sampler(&mut self, device: &wgpu::Device, options: &SamplerOptions) -> wgpu::Sampler {
        self.samplers
            .entry(*options)
            .or_insert_with(|| device.create_sampler(&options.descriptor()))
            .clone()
    }

    pub fn texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        vflip: bool,
    ) -> Result<Arc<ChannelTexture>, EngineError> {
        let key = (path.to_path_buf(), vflip);
        if let Some(texture) = self.files.get(&key) {
            return Ok(Arc::clone(texture));
        }
        let texture = Arc::new(load_texture(device, queue, path, vflip, self.max_dimension)?);
        tracing::debug!(path = %path.display(), vflip, "uploaded channel texture");
        self.files.insert(key, Arc::clone(&texture));
        Ok(texture)
    }

    pub fn cubemap(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        vflip: bool,
    ) -> Result<Arc<ChannelTexture>, EngineError> {
        let key = (path.to_path_buf(), vflip);
        if let Some(texture) = self.cubemaps.get(&key) {
            return Ok(Arc::clone(texture));
        }
        let texture = Arc::new(load_cubemap(device, queue, path, vflip, self.max_dimension)?);
        tracing::debug!(path = %path.display(), "uploaded cubemap");
        self.cubemaps.insert(key, Arc::clone(&texture));
        Ok(texture)
    }

    pub fn image(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &TextureData,
    ) -> Result<Arc<ChannelTexture>, EngineError> {
        if let Some(texture) = self.images.get(&data.id()) {
            return Ok(Arc::clone(texture));
        }
        check_texture_size(
            self.max_dimension,
            data.width(),
            data.height(),
            "input image",
        )?;
        let texture = Arc::new(upload_image(device, queue, data));
        self.images.insert(data.id(), Arc::clone(&texture));
        Ok(texture)
    }

    /// Drops uploaded images that no channel references anymore.
    pub fn retain_images(&mut self, live: &HashSet<u64>) {
        self.images.retain(|id, _| live.contains(id));
    }
}

fn create_placeholder_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layers: u32,
) -> ChannelTexture {
    let data: Vec<u8> = (0..layers).flat_map(|_| [0u8, 0, 0, 255]).collect();
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("placeholder channel texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = if layers == CUBEMAP_FACES {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("placeholder cubemap view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(CUBEMAP_FACES),
            ..Default::default()
        })
    } else {
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    };
    ChannelTexture {
        _texture: texture,
        view,
        resolution: [1.0, 1.0, layers as f32, 0.0],
    }
}

/// Rejects textures the device cannot create, before wgpu sees them.
pub(crate) fn check_texture_size(
    max_dimension: u32,
    width: u32,
    height: u32,
    what: &str,
) -> Result<(), EngineError> {
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(EngineError::Device(format!(
            "{what} is {width}x{height}, GPU textures must be between 1 and {max_dimension} texels per side"
        )));
    }
    Ok(())
}

fn open_rgba(path: &Path, vflip: bool) -> Result<image::RgbaImage, EngineError> {
    let image = image::open(path).map_err(|source| EngineError::Texture {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rgba = image.to_rgba8();
    if vflip {
        flip_vertical_in_place(&mut rgba);
    }
    Ok(rgba)
}

fn load_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
    vflip: bool,
    max_dimension: u32,
) -> Result<ChannelTexture, EngineError> {
    let rgba = open_rgba(path, vflip)?;
    let (width, height) = rgba.dimensions();
    check_texture_size(max_dimension, width, height, &path.display().to_string())?;
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("channel texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(ChannelTexture {
        _texture: texture,
        view,
        resolution: [width as f32, height as f32, 1.0, 0.0],
    })
}

/// Paths of the six cubemap faces; face 0 is `path` itself.
pub(crate) fn cubemap_face_paths(path: &Path) -> Vec<PathBuf> {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut faces = vec![path.to_path_buf()];
    for face in 1..CUBEMAP_FACES {
        faces.push(path.with_file_name(format!("{stem}_{face}{extension}")));
    }
    faces
}

fn load_cubemap(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
    vflip: bool,
    max_dimension: u32,
) -> Result<ChannelTexture, EngineError> {
    let mut faces = Vec::with_capacity(CUBEMAP_FACES as usize);
    for face_path in cubemap_face_paths(path) {
        faces.push((open_rgba(&face_path, vflip)?, face_path));
    }

    let (width, height) = faces[0].0.dimensions();
    check_texture_size(max_dimension, width, height, &path.display().to_string())?;
    if let Some((_, face_path)) = faces
        .iter()
        .find(|(face, _)| face.dimensions() != (width, width))
    {
        return Err(EngineError::Device(format!(
            "cubemap face {} is not a {width}x{width} square",
            face_path.display()
        )));
    }

    let mut data = Vec::with_capacity((width * height * 4 * CUBEMAP_FACES) as usize);
    for (face, _) in &faces {
        data.extend_from_slice(face);
    }

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("cubemap texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: CUBEMAP_FACES,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("cubemap view"),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        array_layer_count: Some(CUBEMAP_FACES),
        ..Default::default()
    });
    Ok(ChannelTexture {
        _texture: texture,
        view,
        resolution: [width as f32, height as f32, CUBEMAP_FACES as f32, 0.0],
    })
}

fn upload_image(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> ChannelTexture {
    let texels: Vec<u16> = data
        .to_rgba()
        .into_iter()
        .map(|value| half::f16::from_f32(value).to_bits())
        .collect();
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("image channel texture"),
            size: wgpu::Extent3d {
                width: data.width(),
                height: data.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(&texels),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    ChannelTexture {
        _texture: texture,
        view,
        resolution: [data.width() as f32, data.height() as f32, 1.0, 0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubemap_faces_follow_suffix_convention() {
        let faces = cubemap_face_paths(Path::new("/cache/abc.jpg"));
        assert_eq!(faces.len(), 6);
        assert_eq!(faces[0], PathBuf::from("/cache/abc.jpg"));
        assert_eq!(faces[1], PathBuf::from("/cache/abc_1.jpg"));
        assert_eq!(faces[5], PathBuf::from("/cache/abc_5.jpg"));
    }

    #[test]
    fn texture_sizes_are_checked_against_the_device_limit() {
        assert!(check_texture_size(8192, 1, 8192, "input image").is_ok());

        let err = check_texture_size(8192, 1, 20000, "input image").unwrap_err();
        assert!(matches!(err, EngineError::Device(_)));
        assert!(err.to_string().contains("input image is 1x20000"), "{err}");

        assert!(check_texture_size(8192, 0, 4, "noise.png").is_err());
    }
}
