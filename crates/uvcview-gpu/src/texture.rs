//! Input texture the camera image is streamed into

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;
use uvcview_core::{Frame, InputTexture, RenderError, RenderResult, TextureId};
use wgpu::{Device, Queue, TextureFormat, TextureView};

pub(crate) const INPUT_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// RGBA texture fed by an image source.
pub struct FrameTexture {
    id: TextureId,
    texture: Arc<wgpu::Texture>,
    view: TextureView,
    width: u32,
    height: u32,
}

impl FrameTexture {
    pub fn new(device: &Device, width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        let limit = device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        let id = TextureId::next();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Input Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: INPUT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            id,
            texture: Arc::new(texture),
            view,
            width,
            height,
        })
    }

    /// Copy a frame of the texture's size into it.
    pub fn upload(&self, queue: &Queue, frame: &Frame) -> RenderResult<()> {
        if frame.size() != (self.width, self.height) {
            let (width, height) = frame.size();
            return Err(RenderError::InvalidDimensions { width, height });
        }
        trace!("Uploading {}x{} frame to {}", self.width, self.height, self.id);

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    pub fn texture(&self) -> &Arc<wgpu::Texture> {
        &self.texture
    }
}

impl InputTexture for FrameTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Live input textures by id, visible to encoders sharing the device.
#[derive(Clone, Default)]
pub struct TextureRegistry {
    textures: Arc<RwLock<HashMap<TextureId, Arc<wgpu::Texture>>>>,
}

impl TextureRegistry {
    pub fn get(&self, id: TextureId) -> Option<Arc<wgpu::Texture>> {
        self.textures
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.textures
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn insert(&self, texture: &FrameTexture) {
        self.textures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(texture.id, texture.texture.clone());
    }

    pub(crate) fn remove(&self, id: TextureId) {
        self.textures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }

    pub(crate) fn clear(&self) {
        self.textures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl std::fmt::Debug for TextureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureRegistry")
            .field("textures", &self.len())
            .finish()
    }
}
