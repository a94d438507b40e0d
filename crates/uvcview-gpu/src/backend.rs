//! wgpu implementation of the graphics backend seam

use crate::color::Color;
use crate::drawer::FrameDrawer;
use crate::gpu::{GpuConfig, GpuContext};
use crate::surface::{SurfaceConfig, WindowSurface};
use crate::texture::{FrameTexture, TextureRegistry};
use glam::Mat4;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uvcview_core::{
    Frame, GraphicsBackend, GraphicsContext, InputTexture, RenderError, RenderResult,
};
use wgpu::{Device, Queue, TextureFormat};
use winit::window::Window;

/// Creates one wgpu context per render thread.
#[derive(Debug, Clone, Default)]
pub struct WgpuBackend {
    config: GpuConfig,
    clear_color: Color,
}

impl WgpuBackend {
    pub fn new(config: GpuConfig) -> Self {
        Self {
            config,
            clear_color: Color::BLACK,
        }
    }

    pub fn with_clear_color(mut self, color: impl Into<Color>) -> Self {
        self.clear_color = color.into();
        self
    }
}

impl GraphicsBackend for WgpuBackend {
    type Context = WgpuContext;

    fn create_context(&mut self) -> RenderResult<WgpuContext> {
        let gpu = GpuContext::new_blocking(self.config.clone())?;
        Ok(WgpuContext {
            gpu,
            textures: TextureRegistry::default(),
            clear_color: self.clear_color,
            current_format: None,
        })
    }
}

/// Device handles an encoder needs to read the input texture.
#[derive(Clone)]
pub struct WgpuShared {
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub textures: TextureRegistry,
}

impl fmt::Debug for WgpuShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuShared")
            .field("textures", &self.textures)
            .finish_non_exhaustive()
    }
}

/// Per-thread wgpu state.
pub struct WgpuContext {
    gpu: GpuContext,
    textures: TextureRegistry,
    clear_color: Color,
    current_format: Option<TextureFormat>,
}

impl WgpuContext {
    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }
}

impl GraphicsContext for WgpuContext {
    type Target = Arc<Window>;
    type Surface = WindowSurface;
    type Texture = FrameTexture;
    type Drawer = FrameDrawer;
    type Shared = WgpuShared;

    fn create_surface(
        &mut self,
        target: &Arc<Window>,
        width: u32,
        height: u32,
    ) -> RenderResult<WindowSurface> {
        let config = SurfaceConfig {
            vsync: self.gpu.config.vsync,
            ..SurfaceConfig::new(width, height)
        };
        Ok(WindowSurface::new(&self.gpu, target.clone(), config)?)
    }

    fn resize_surface(
        &mut self,
        surface: &mut WindowSurface,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        surface.resize(width, height);
        Ok(())
    }

    fn make_current(&mut self, surface: &mut WindowSurface) -> RenderResult<()> {
        self.current_format = Some(surface.format());
        Ok(())
    }

    fn create_drawer(&mut self) -> RenderResult<FrameDrawer> {
        let format = self
            .current_format
            .ok_or_else(|| RenderError::backend("no current surface"))?;
        debug!("Creating frame drawer for {:?}", format);
        Ok(FrameDrawer::new(&self.gpu.device, format, self.clear_color))
    }

    fn create_texture(&mut self, width: u32, height: u32) -> RenderResult<FrameTexture> {
        let texture = FrameTexture::new(&self.gpu.device, width, height)?;
        self.textures.insert(&texture);
        Ok(texture)
    }

    fn upload(&mut self, texture: &mut FrameTexture, frame: &Frame) -> RenderResult<()> {
        texture.upload(&self.gpu.queue, frame)
    }

    fn draw(
        &mut self,
        drawer: &mut FrameDrawer,
        surface: &mut WindowSurface,
        texture: &FrameTexture,
        transform: &Mat4,
    ) -> RenderResult<()> {
        let frame = surface.acquire()?;
        drawer.draw(
            &self.gpu.device,
            &self.gpu.queue,
            &frame.view,
            texture,
            transform,
        );
        Ok(())
    }

    fn present(&mut self, surface: &mut WindowSurface) -> RenderResult<()> {
        Ok(surface.present()?)
    }

    fn release_drawer(&mut self, drawer: FrameDrawer) {
        drop(drawer);
    }

    fn release_texture(&mut self, texture: FrameTexture) {
        self.textures.remove(texture.id());
    }

    fn release_surface(&mut self, surface: WindowSurface) {
        drop(surface);
    }

    fn shared(&self) -> WgpuShared {
        WgpuShared {
            device: self.gpu.device.clone(),
            queue: self.gpu.queue.clone(),
            textures: self.textures.clone(),
        }
    }

    fn release(&mut self) {
        self.textures.clear();
        let _ = self.gpu.device.poll(wgpu::Maintain::Wait);
        info!("GPU context released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires GPU"]
    fn test_texture_registry_tracks_input_textures() {
        let mut backend = WgpuBackend::default();
        let mut context = backend.create_context().unwrap();
        let shared = context.shared();

        let mut texture = context.create_texture(4, 2).unwrap();
        assert!(shared.textures.get(texture.id()).is_some());

        let frame = Frame::solid(4, 2, [255, 0, 0, 255]);
        context.upload(&mut texture, &frame).unwrap();

        let id = texture.id();
        context.release_texture(texture);
        assert!(shared.textures.get(id).is_none());
        context.release();
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_upload_rejects_wrong_size() {
        let mut context = WgpuBackend::default().create_context().unwrap();
        let mut texture = context.create_texture(4, 4).unwrap();
        let err = context
            .upload(&mut texture, &Frame::solid(2, 2, [0; 4]))
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidDimensions { .. }));
        context.release();
    }

    #[test]
    fn test_clear_color_from_config() {
        let backend =
            WgpuBackend::new(GpuConfig::default()).with_clear_color([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(backend.clear_color, Color::rgba(0.1, 0.2, 0.3, 1.0));
    }
}
