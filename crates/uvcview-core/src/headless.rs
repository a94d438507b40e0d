//! Headless software backend.
//!
//! Renders on the CPU into an RGBA framebuffer owned by a [`HeadlessTarget`].
//! The target stands in for a native window: it can be destroyed, after
//! which drawing into it reports `SurfaceLost`.

use crate::backend::{GraphicsBackend, GraphicsContext, InputTexture};
use crate::error::{RenderError, RenderResult};
use crate::frame::{Frame, TextureId};
use glam::{Mat4, Vec4};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct TargetInner {
    alive: AtomicBool,
    presents: AtomicU64,
    presented: Mutex<Option<Frame>>,
}

/// An offscreen "window" that receives presented frames.
#[derive(Clone)]
pub struct HeadlessTarget {
    inner: Arc<TargetInner>,
}

impl HeadlessTarget {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TargetInner {
                alive: AtomicBool::new(true),
                presents: AtomicU64::new(0),
                presented: Mutex::new(None),
            }),
        }
    }

    /// Destroy the native surface.
    pub fn destroy(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Number of frames presented to this target.
    pub fn present_count(&self) -> u64 {
        self.inner.presents.load(Ordering::SeqCst)
    }

    /// The most recently presented framebuffer.
    pub fn last_presented(&self) -> Option<Frame> {
        self.inner
            .presented
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for HeadlessTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// Software backend configuration and factory.
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    clear_color: [u8; 4],
    available: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            clear_color: [0, 0, 0, 255],
            available: true,
        }
    }

    /// A backend whose driver cannot produce a context.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        self
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for HeadlessBackend {
    type Context = HeadlessContext;

    fn create_context(&mut self) -> RenderResult<HeadlessContext> {
        if !self.available {
            return Err(RenderError::context("no software renderer available"));
        }
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Headless context {} created", id);
        Ok(HeadlessContext {
            id,
            clear_color: self.clear_color,
            live_textures: 0,
            released: false,
        })
    }
}

/// Context capability handed to encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessShared {
    pub context_id: u64,
}

pub struct HeadlessSurface {
    target: HeadlessTarget,
    width: u32,
    height: u32,
    framebuffer: Vec<u8>,
}

pub struct HeadlessTexture {
    id: TextureId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl InputTexture for HeadlessTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct HeadlessDrawer {
    clear_color: [u8; 4],
}

/// CPU rendering context.
pub struct HeadlessContext {
    id: u64,
    clear_color: [u8; 4],
    live_textures: usize,
    released: bool,
}

impl HeadlessContext {
    /// Textures created and not yet released.
    pub fn live_textures(&self) -> usize {
        self.live_textures
    }

    fn check_surface(surface: &HeadlessSurface) -> RenderResult<()> {
        if surface.target.is_alive() {
            Ok(())
        } else {
            Err(RenderError::surface_lost("headless target destroyed"))
        }
    }
}

impl GraphicsContext for HeadlessContext {
    type Target = HeadlessTarget;
    type Surface = HeadlessSurface;
    type Texture = HeadlessTexture;
    type Drawer = HeadlessDrawer;
    type Shared = HeadlessShared;

    fn create_surface(
        &mut self,
        target: &HeadlessTarget,
        width: u32,
        height: u32,
    ) -> RenderResult<HeadlessSurface> {
        if !target.is_alive() {
            return Err(RenderError::surface_lost("headless target destroyed"));
        }
        Ok(HeadlessSurface {
            target: target.clone(),
            width,
            height,
            framebuffer: vec![0; (width as usize) * (height as usize) * 4],
        })
    }

    fn resize_surface(
        &mut self,
        surface: &mut HeadlessSurface,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        surface.width = width;
        surface.height = height;
        surface.framebuffer = vec![0; (width as usize) * (height as usize) * 4];
        Ok(())
    }

    fn make_current(&mut self, surface: &mut HeadlessSurface) -> RenderResult<()> {
        Self::check_surface(surface)
    }

    fn create_drawer(&mut self) -> RenderResult<HeadlessDrawer> {
        Ok(HeadlessDrawer {
            clear_color: self.clear_color,
        })
    }

    fn create_texture(&mut self, width: u32, height: u32) -> RenderResult<HeadlessTexture> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        self.live_textures += 1;
        Ok(HeadlessTexture {
            id: TextureId::next(),
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        })
    }

    fn upload(&mut self, texture: &mut HeadlessTexture, frame: &Frame) -> RenderResult<()> {
        if frame.size() != texture.size() {
            return Err(RenderError::backend(format!(
                "frame {}x{} does not match texture {}x{}",
                frame.width, frame.height, texture.width, texture.height
            )));
        }
        texture.pixels.copy_from_slice(&frame.data);
        Ok(())
    }

    fn draw(
        &mut self,
        drawer: &mut HeadlessDrawer,
        surface: &mut HeadlessSurface,
        texture: &HeadlessTexture,
        transform: &Mat4,
    ) -> RenderResult<()> {
        Self::check_surface(surface)?;

        let (w, h) = (surface.width, surface.height);
        for y in 0..h {
            for x in 0..w {
                let uv = Vec4::new(
                    (x as f32 + 0.5) / w as f32,
                    (y as f32 + 0.5) / h as f32,
                    0.0,
                    1.0,
                );
                let st = *transform * uv;
                let rgba = if (0.0..1.0).contains(&st.x) && (0.0..1.0).contains(&st.y) {
                    let tx = (st.x * texture.width as f32) as usize;
                    let ty = (st.y * texture.height as f32) as usize;
                    let i = (ty * texture.width as usize + tx) * 4;
                    [
                        texture.pixels[i],
                        texture.pixels[i + 1],
                        texture.pixels[i + 2],
                        texture.pixels[i + 3],
                    ]
                } else {
                    drawer.clear_color
                };
                let o = ((y as usize) * (w as usize) + x as usize) * 4;
                surface.framebuffer[o..o + 4].copy_from_slice(&rgba);
            }
        }
        Ok(())
    }

    fn present(&mut self, surface: &mut HeadlessSurface) -> RenderResult<()> {
        Self::check_surface(surface)?;

        let frame = Frame::rgba(surface.width, surface.height, surface.framebuffer.clone())
            .ok_or_else(|| RenderError::backend("framebuffer size mismatch"))?;
        let target = &surface.target.inner;
        *target
            .presented
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame);
        target.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_drawer(&mut self, _drawer: HeadlessDrawer) {}

    fn release_texture(&mut self, _texture: HeadlessTexture) {
        self.live_textures = self.live_textures.saturating_sub(1);
    }

    fn release_surface(&mut self, _surface: HeadlessSurface) {}

    fn shared(&self) -> HeadlessShared {
        HeadlessShared {
            context_id: self.id,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!("Headless context {} released", self.id);
        }
    }
}
