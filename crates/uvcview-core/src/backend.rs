//! Graphics backend seam.
//!
//! The render session only talks to the graphics API through these traits.
//! Every method of [`GraphicsContext`] is called on the render thread that
//! created the context.

use crate::error::RenderResult;
use crate::frame::{Frame, TextureId};
use glam::Mat4;

/// Factory for graphics contexts.
pub trait GraphicsBackend: Send + 'static {
    type Context: GraphicsContext;

    /// Create a context for the calling thread.
    ///
    /// Failure must be reported as `RenderError::ContextCreation`.
    fn create_context(&mut self) -> RenderResult<Self::Context>;
}

/// Texture the camera image is streamed into.
pub trait InputTexture {
    fn id(&self) -> TextureId;
    fn size(&self) -> (u32, u32);
}

/// A graphics context bound to one thread.
pub trait GraphicsContext: 'static {
    /// Native surface the preview draws into (a window, a view surface).
    type Target: Clone + Send + 'static;
    /// Draw target created from a [`Self::Target`]
    type Surface;
    type Texture: InputTexture;
    /// Program that samples the input texture onto the surface
    type Drawer;
    /// Context capability handed to encoders that share GPU resources.
    type Shared: Clone + Send + Sync + 'static;

    fn create_surface(
        &mut self,
        target: &Self::Target,
        width: u32,
        height: u32,
    ) -> RenderResult<Self::Surface>;

    fn resize_surface(
        &mut self,
        surface: &mut Self::Surface,
        width: u32,
        height: u32,
    ) -> RenderResult<()>;

    /// Bind the context to the surface for subsequent calls.
    fn make_current(&mut self, surface: &mut Self::Surface) -> RenderResult<()>;

    fn create_drawer(&mut self) -> RenderResult<Self::Drawer>;

    fn create_texture(&mut self, width: u32, height: u32) -> RenderResult<Self::Texture>;

    /// Copy a frame into the texture. The frame already has the texture's size.
    fn upload(&mut self, texture: &mut Self::Texture, frame: &Frame) -> RenderResult<()>;

    /// Draw the texture onto the surface through a texture-coordinate transform.
    fn draw(
        &mut self,
        drawer: &mut Self::Drawer,
        surface: &mut Self::Surface,
        texture: &Self::Texture,
        transform: &Mat4,
    ) -> RenderResult<()>;

    /// Present the drawn frame (buffer swap).
    fn present(&mut self, surface: &mut Self::Surface) -> RenderResult<()>;

    fn release_drawer(&mut self, drawer: Self::Drawer);
    fn release_texture(&mut self, texture: Self::Texture);
    fn release_surface(&mut self, surface: Self::Surface);

    fn shared(&self) -> Self::Shared;

    /// Destroy the context. Nothing else is called afterwards.
    fn release(&mut self);
}

/// Shared context type of a backend.
pub type SharedOf<B> = <<B as GraphicsBackend>::Context as GraphicsContext>::Shared;

/// Target type of a backend.
pub type TargetOf<B> = <<B as GraphicsBackend>::Context as GraphicsContext>::Target;
