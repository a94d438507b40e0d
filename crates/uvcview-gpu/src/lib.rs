//! uvcview GPU - wgpu backend for the preview renderer
//!
//! Renders the camera texture straight into a window surface:
//! - Device bring-up per render thread
//! - `Rgba8Unorm` input textures written from camera frames
//! - A single textured-quad pipeline applying the frame transform

mod backend;
mod color;
mod drawer;
mod gpu;
mod surface;
mod texture;

pub use backend::{WgpuBackend, WgpuContext, WgpuShared};
pub use color::Color;
pub use drawer::{FrameDrawer, FrameUniform};
pub use gpu::{GpuConfig, GpuContext, GpuError};
pub use surface::{SurfaceConfig, WindowSurface};
pub use texture::{FrameTexture, TextureRegistry};
