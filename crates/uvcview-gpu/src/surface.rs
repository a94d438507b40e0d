//! Window surface - the preview's draw target
//!
//! Wraps a wgpu surface configured for a winit window. A frame is acquired
//! when drawing starts and handed back to the compositor on present.

use crate::gpu::{GpuContext, GpuError};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgpu::{
    Device, Surface, SurfaceConfiguration, SurfaceError, SurfaceTexture, TextureFormat,
    TextureUsages, TextureView,
};
use winit::window::Window;

/// Surface configuration
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl SurfaceConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vsync: true,
        }
    }

    fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }
}

/// Acquired swapchain image
pub(crate) struct AcquiredFrame {
    output: SurfaceTexture,
    pub(crate) view: TextureView,
}

/// Render surface for a window
pub struct WindowSurface {
    // Dropped in order: image, surface, then the window it borrows from.
    frame: Option<AcquiredFrame>,
    surface: Surface<'static>,
    window: Arc<Window>,
    config: SurfaceConfiguration,
    format: TextureFormat,
    device: Arc<Device>,
}

impl WindowSurface {
    pub fn new(gpu: &GpuContext, window: Arc<Window>, config: SurfaceConfig) -> Result<Self, GpuError> {
        info!("Creating window surface ({}x{})", config.width, config.height);

        let surface = gpu
            .instance
            .create_surface(window.clone())
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        let caps = surface.get_capabilities(&gpu.adapter);
        let Some(&fallback) = caps.formats.first() else {
            return Err(GpuError::Surface(
                "surface is not supported by the adapter".into(),
            ));
        };
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(fallback);
        debug!("Surface format: {:?}", format);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: config.width.max(1),
            height: config.height.max(1),
            present_mode: config.present_mode(),
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&gpu.device, &surface_config);

        Ok(Self {
            frame: None,
            surface,
            window,
            config: surface_config,
            format,
            device: gpu.device.clone(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.config.width, self.config.height) {
            return;
        }
        // A pending image belongs to the old configuration.
        self.frame = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        debug!("Surface resized to {}x{}", width, height);
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Acquire the next swapchain image, reconfiguring once if it went stale.
    pub(crate) fn acquire(&mut self) -> Result<&AcquiredFrame, GpuError> {
        if self.frame.is_none() {
            let output = match self.surface.get_current_texture() {
                Ok(output) => output,
                Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                    warn!("Surface outdated, reconfiguring");
                    self.surface.configure(&self.device, &self.config);
                    self.surface
                        .get_current_texture()
                        .map_err(|e| GpuError::SurfaceLost(e.to_string()))?
                }
                Err(e) => return Err(GpuError::Surface(e.to_string())),
            };
            let view = output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.frame = Some(AcquiredFrame { output, view });
        }
        self.frame
            .as_ref()
            .ok_or_else(|| GpuError::Surface("no frame acquired".into()))
    }

    /// Hand the acquired image to the compositor.
    pub(crate) fn present(&mut self) -> Result<(), GpuError> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| GpuError::Surface("present without draw".into()))?;
        self.window.pre_present_notify();
        frame.output.present();
        Ok(())
    }
}
