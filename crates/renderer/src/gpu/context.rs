use crate::error::EngineError;
use crate::types::{GpuOptions, GpuPowerPreference};

/// Summary of the adapter picked for rendering.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    fn from_info(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Device and queue shared by every renderer of a host.
///
/// There is no surface: all targets are offscreen textures read back on demand.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
    pub max_dimension: u32,
    /// Whether render passes can carry GPU timestamp writes.
    pub timestamps: bool,
}

impl GpuContext {
    pub(crate) fn new(options: &GpuOptions) -> Result<Self, EngineError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .or_else(|err| {
            if !options.allow_software {
                return Err(err);
            }
            tracing::warn!(error = %err, "no hardware adapter available; trying fallback adapter");
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: true,
            }))
        })
        .map_err(|err| EngineError::Device(format!("failed to find a suitable GPU adapter: {err}")))?;

        let adapter_profile = AdapterProfile::from_info(&adapter.get_info());
        let limits = adapter.limits();
        let timestamps = adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            timestamps,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("stc device"),
            required_features,
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| EngineError::Device(format!("failed to create GPU device: {err}")))?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_profile,
            max_dimension: limits.max_texture_dimension_2d,
            timestamps,
        })
    }

    pub(crate) fn check_size(&self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::Device(format!(
                "render size {width}x{height} must be non-zero"
            )));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(EngineError::Device(format!(
                "GPU max texture dimension is {}, requested target is {width}x{height}",
                self.max_dimension
            )));
        }
        Ok(())
    }

    /// Blocks until every submitted command buffer has finished.
    pub(crate) fn wait_idle(&self) -> Result<(), EngineError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|err| EngineError::Device(format!("device poll failed: {err}")))
    }
}
