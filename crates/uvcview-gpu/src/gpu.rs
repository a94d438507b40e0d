//! GPU Context - wgpu initialization and management
//!
//! Brings up instance, adapter, device and queue for one render thread.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uvcview_core::RenderError;
use wgpu::{
    Adapter, Backends, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits,
    MemoryHints, PowerPreference, Queue, RequestAdapterOptions,
};

/// GPU context errors
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Surface lost: {0}")]
    SurfaceLost(String),
}

impl From<GpuError> for RenderError {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::NoAdapter | GpuError::DeviceCreation(_) => {
                RenderError::ContextCreation(err.to_string())
            }
            GpuError::SurfaceLost(msg) => RenderError::SurfaceLost(msg),
            GpuError::Surface(msg) => RenderError::Backend(msg),
        }
    }
}

/// GPU configuration
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Prefer low-power GPU (integrated) over high-performance (discrete)
    pub low_power: bool,
    /// Maximum texture dimension
    pub max_texture_dimension: u32,
    /// Wait for vertical blank when presenting
    pub vsync: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            low_power: true,
            max_texture_dimension: 8192,
            vsync: true,
        }
    }
}

/// GPU context holding wgpu device and queue
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub config: GpuConfig,
}

/// Smallest texture size a camera preview can work with.
const MIN_TEXTURE_DIMENSION: u32 = 2048;

impl GpuConfig {
    fn power_preference(&self) -> PowerPreference {
        if self.low_power {
            PowerPreference::LowPower
        } else {
            PowerPreference::HighPerformance
        }
    }

    /// Uncapped presentation favours latency over footprint.
    fn memory_hints(&self) -> MemoryHints {
        if self.vsync {
            MemoryHints::MemoryUsage
        } else {
            MemoryHints::Performance
        }
    }

    /// Device limits for the requested texture size, clamped to what the
    /// adapter supports.
    fn device_limits(&self, supported: &Limits) -> Limits {
        let ceiling = supported.max_texture_dimension_2d.max(MIN_TEXTURE_DIMENSION);
        let max_texture = self
            .max_texture_dimension
            .clamp(MIN_TEXTURE_DIMENSION, ceiling);
        Limits {
            max_texture_dimension_2d: max_texture,
            ..Limits::downlevel_webgl2_defaults().using_resolution(supported.clone())
        }
    }
}

impl GpuContext {
    /// Bring up instance, adapter, device and queue.
    pub async fn new(config: GpuConfig) -> Result<Self, GpuError> {
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: config.power_preference(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        info!("Adapter {} on {:?} ({:?})", info.name, info.backend, info.device_type);
        debug!("Driver {} {}", info.driver, info.driver_info);

        let limits = config.device_limits(&adapter.limits());
        if limits.max_texture_dimension_2d != config.max_texture_dimension {
            warn!(
                "Max texture dimension {} not usable, requesting {}",
                config.max_texture_dimension, limits.max_texture_dimension_2d
            );
        }

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("uvcview preview device"),
                    required_features: Features::empty(),
                    required_limits: limits,
                    memory_hints: config.memory_hints(),
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            warn!("Uncaptured wgpu error: {}", error);
        }));

        info!(
            "Preview device ready (vsync: {}, max texture: {})",
            config.vsync,
            device.limits().max_texture_dimension_2d
        );

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
        })
    }

    /// Blocking bring-up for the render thread.
    pub fn new_blocking(config: GpuConfig) -> Result<Self, GpuError> {
        pollster::block_on(Self::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GpuConfig::default();
        assert!(config.low_power);
        assert!(config.vsync);
        assert_eq!(config.max_texture_dimension, 8192);
    }

    #[test]
    fn test_error_conversion() {
        assert!(matches!(
            RenderError::from(GpuError::NoAdapter),
            RenderError::ContextCreation(_)
        ));
        assert!(RenderError::from(GpuError::SurfaceLost("gone".into())).is_surface_lost());
        assert!(matches!(
            RenderError::from(GpuError::Surface("timeout".into())),
            RenderError::Backend(_)
        ));
    }

    #[test]
    fn test_device_limits_follow_config() {
        let supported = Limits {
            max_texture_dimension_2d: 16384,
            ..Limits::default()
        };
        let config = GpuConfig {
            max_texture_dimension: 4096,
            ..GpuConfig::default()
        };
        assert_eq!(config.device_limits(&supported).max_texture_dimension_2d, 4096);

        let oversized = GpuConfig {
            max_texture_dimension: 32768,
            ..GpuConfig::default()
        };
        assert_eq!(oversized.device_limits(&supported).max_texture_dimension_2d, 16384);

        let tiny = GpuConfig {
            max_texture_dimension: 16,
            ..GpuConfig::default()
        };
        assert_eq!(
            tiny.device_limits(&supported).max_texture_dimension_2d,
            MIN_TEXTURE_DIMENSION
        );
    }

    #[test]
    fn test_vsync_selects_memory_hints() {
        let config = GpuConfig::default();
        assert!(matches!(config.memory_hints(), MemoryHints::MemoryUsage));
        let uncapped = GpuConfig {
            vsync: false,
            ..GpuConfig::default()
        };
        assert!(matches!(uncapped.memory_hints(), MemoryHints::Performance));
        assert!(matches!(uncapped.power_preference(), PowerPreference::LowPower));
    }

    // GPU tests require actual hardware, skip in CI
    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_context_creation() {
        let ctx = GpuContext::new_blocking(GpuConfig::default());
        assert!(ctx.is_ok());
    }
}
