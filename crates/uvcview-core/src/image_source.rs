//! Image source - the camera-facing half of the input texture.
//!
//! A producer thread pushes frames into the source; the render thread
//! consumes at most one pending frame per draw and uploads it into the
//! texture the source feeds.

use crate::error::RenderResult;
use crate::frame::{Frame, TextureId};
use glam::Mat4;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{trace, warn};

/// Callback fired once per frame pushed into a source.
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier of an image source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source({})", self.0)
    }
}

struct Consumed {
    transform: Mat4,
    frame: Option<Frame>,
}

struct Inner {
    id: SourceId,
    texture: TextureId,
    width: u32,
    height: u32,
    released: AtomicBool,
    pending: Mutex<Option<Frame>>,
    listener: Mutex<Option<FrameListener>>,
    consumed: Mutex<Consumed>,
    frames_pushed: AtomicU64,
    frames_replaced: AtomicU64,
}

/// Handle to the stream feeding one input texture.
///
/// Clones share the same stream. Two handles are equal when they refer to
/// the same source.
#[derive(Clone)]
pub struct ImageSource {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ImageSource {
    /// Create a source feeding `texture` with the given default buffer size.
    pub fn new(texture: TextureId, width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)),
                texture,
                width,
                height,
                released: AtomicBool::new(false),
                pending: Mutex::new(None),
                listener: Mutex::new(None),
                consumed: Mutex::new(Consumed {
                    transform: Mat4::IDENTITY,
                    frame: None,
                }),
                frames_pushed: AtomicU64::new(0),
                frames_replaced: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Texture this source feeds.
    pub fn texture_id(&self) -> TextureId {
        self.inner.texture
    }

    /// Default buffer size; pushed frames are scaled to it.
    pub fn buffer_size(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Install the callback fired for each pushed frame.
    pub fn set_frame_listener(&self, listener: Option<FrameListener>) {
        *lock(&self.inner.listener) = listener;
    }

    /// Push a new camera frame.
    ///
    /// The frame replaces any frame not yet consumed. Returns `false` if the
    /// source has been released, or if the frame is empty or its buffer does
    /// not match its dimensions; the frame is dropped in both cases.
    pub fn push_frame(&self, frame: Frame) -> bool {
        if self.is_released() {
            return false;
        }
        if !frame.is_valid() {
            warn!(
                "Dropping malformed {}x{} frame ({} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            );
            return false;
        }

        let frame = frame.scaled(self.inner.width, self.inner.height);
        if lock(&self.inner.pending).replace(frame).is_some() {
            self.inner.frames_replaced.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.frames_pushed.fetch_add(1, Ordering::Relaxed);

        let listener = lock(&self.inner.listener).clone();
        if let Some(listener) = listener {
            listener();
        }
        true
    }

    /// Consume the pending frame, if any, through `upload`.
    ///
    /// Returns `Ok(false)` when no frame was pending; the last consumed
    /// frame and transform stay current in that case.
    pub fn update_tex_image<F>(&self, upload: F) -> RenderResult<bool>
    where
        F: FnOnce(&Frame) -> RenderResult<()>,
    {
        let Some(frame) = lock(&self.inner.pending).take() else {
            return Ok(false);
        };

        upload(&frame)?;

        let mut consumed = lock(&self.inner.consumed);
        consumed.transform = frame.transform.unwrap_or(Mat4::IDENTITY);
        consumed.frame = Some(frame);
        trace!("{} consumed a frame", self.inner.id);
        Ok(true)
    }

    /// Transform of the most recently consumed frame.
    pub fn transform_matrix(&self) -> Mat4 {
        lock(&self.inner.consumed).transform
    }

    /// Most recently consumed frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        lock(&self.inner.consumed).frame.clone()
    }

    pub fn has_pending_frame(&self) -> bool {
        lock(&self.inner.pending).is_some()
    }

    /// Total frames accepted by this source.
    pub fn frames_pushed(&self) -> u64 {
        self.inner.frames_pushed.load(Ordering::Relaxed)
    }

    /// Frames overwritten before the renderer consumed them.
    pub fn frames_replaced(&self) -> u64 {
        self.inner.frames_replaced.load(Ordering::Relaxed)
    }

    /// Detach the listener and reject further frames.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        *lock(&self.inner.listener) = None;
        lock(&self.inner.pending).take();
    }
}

impl PartialEq for ImageSource {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ImageSource {}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("id", &self.inner.id)
            .field("texture", &self.inner.texture)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("released", &self.is_released())
            .finish()
    }
}
