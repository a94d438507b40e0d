//! Frame data handed from the camera to the renderer.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Identifier of an input texture.
///
/// Texture ids are never reused within a process, so a changed id means
/// the texture was recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Global texture id counter
static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

impl TextureId {
    /// Allocate a fresh texture id.
    pub fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tex({})", self.0)
    }
}

/// Display orientation applied on top of each frame's own transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map a degree value to the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            45..=134 => Self::Deg90,
            135..=224 => Self::Deg180,
            225..=314 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Deg90,
            2 => Self::Deg180,
            3 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    /// Rotation about the texture centre, in texture coordinates.
    pub fn matrix(self) -> Mat4 {
        if self == Self::Deg0 {
            return Mat4::IDENTITY;
        }
        let center = Vec3::new(0.5, 0.5, 0.0);
        let angle = (self.degrees() as f32).to_radians();
        Mat4::from_translation(center)
            * Mat4::from_quat(Quat::from_rotation_z(angle))
            * Mat4::from_translation(-center)
    }
}

/// One RGBA8 camera frame.
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows
    pub data: Arc<[u8]>,
    /// Texture-coordinate transform supplied by the producer
    pub transform: Option<Mat4>,
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap tightly packed RGBA8 pixels.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn rgba(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Option<Self> {
        let data = data.into();
        if width == 0 || height == 0 || data.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            transform: None,
            captured_at: Instant::now(),
        })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data: data.into(),
            transform: None,
            captured_at: Instant::now(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Non-empty, with exactly `width * height` RGBA8 pixels.
    pub fn is_valid(&self) -> bool {
        self.width != 0
            && self.height != 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// RGBA value at a pixel.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Nearest-neighbour rescale to the given buffer size.
    pub fn scaled(&self, width: u32, height: u32) -> Self {
        if self.size() == (width, height) {
            return self.clone();
        }

        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height as u64) as u32;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width as u64) as u32;
                data.extend_from_slice(&self.pixel(sx, sy));
            }
        }

        Self {
            width,
            height,
            data: data.into(),
            transform: self.transform,
            captured_at: self.captured_at,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
