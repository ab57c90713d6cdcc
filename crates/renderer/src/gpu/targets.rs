use super::pipeline::TARGET_FORMAT;

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Double-buffered output of one buffer: passes draw into the back target and
/// readers sample the front one.
pub(crate) struct PingPong {
    targets: [Target; 2],
    front: usize,
}

impl PingPong {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let make = |suffix: &str| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label} target {suffix}")),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Target { texture, view }
        };
        Self {
            targets: [make("a"), make("b")],
            front: 0,
        }
    }

    /// Latest completed output.
    pub fn front_view(&self) -> &wgpu::TextureView {
        &self.targets[self.front].view
    }

    pub fn front_texture(&self) -> &wgpu::Texture {
        &self.targets[self.front].texture
    }

    pub fn back_view(&self) -> &wgpu::TextureView {
        &self.targets[1 - self.front].view
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}
