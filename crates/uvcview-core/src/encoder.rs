//! Encoder hand-off.
//!
//! The renderer never owns an encoder. It keeps a weak reference in an
//! [`EncoderSlot`] shared between caller threads and the render thread, and
//! notifies the installed encoder once per drawn frame.

use crate::error::{EncoderError, RenderError, RenderResult};
use crate::frame::TextureId;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use glam::Mat4;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tracing::debug;

/// Which notification an encoder expects per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderInput {
    /// Encoder redraws the shared texture and needs the texture transform
    Transformed,
    /// Encoder samples the shared texture as-is
    Direct,
}

/// Video encoder fed from the preview's input texture.
///
/// `S` is the backend's shareable context capability. Notifications are
/// issued on the render thread; implementations must return quickly and must
/// not call back into the render handle from inside them.
pub trait VideoEncoder<S>: Send + Sync {
    fn input_kind(&self) -> EncoderInput;

    /// Receive the shared context and the texture to sample.
    /// Called on the render thread before any notification.
    fn attach(&self, shared: S, texture: TextureId) -> Result<(), EncoderError>;

    /// A frame was drawn; `transform` is its texture transform.
    fn frame_available(&self, transform: &Mat4);

    /// A frame was drawn.
    fn frame_available_direct(&self);

    /// The encoder was removed from the renderer.
    fn detached(&self) {}
}

/// Shared reference to an encoder.
pub type EncoderRef<S> = Arc<dyn VideoEncoder<S>>;

struct Installed<S> {
    epoch: u64,
    encoder: Option<Weak<dyn VideoEncoder<S>>>,
}

/// Lock-guarded encoder reference with last-write-wins epochs.
///
/// Every attach or detach request takes a new epoch. An attach is only
/// installed if no later request was made in the meantime.
pub struct EncoderSlot<S> {
    requested: AtomicU64,
    installed: RwLock<Installed<S>>,
}

impl<S> EncoderSlot<S> {
    pub fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
            installed: RwLock::new(Installed {
                epoch: 0,
                encoder: None,
            }),
        }
    }

    /// Reserve the epoch for a new attach request.
    pub fn begin_attach(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether `epoch` is still the latest request.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.requested.load(Ordering::Acquire) == epoch
    }

    /// Install an attached encoder. Returns `false` if the request was
    /// superseded by a later attach or detach.
    pub fn install(&self, encoder: &EncoderRef<S>, epoch: u64) -> bool {
        let previous = {
            let mut installed = self.write();
            if self.requested.load(Ordering::Acquire) != epoch {
                return false;
            }
            installed.epoch = epoch;
            installed.encoder.replace(Arc::downgrade(encoder))
        };

        if let Some(previous) = previous.and_then(|w| w.upgrade()) {
            if !Arc::ptr_eq(&previous, encoder) {
                previous.detached();
            }
        }
        true
    }

    /// Remove the encoder.
    ///
    /// Waits for an in-flight notification to finish, so the encoder is not
    /// called after this returns.
    pub fn detach(&self) {
        let previous = {
            let mut installed = self.write();
            let epoch = self.requested.fetch_add(1, Ordering::AcqRel) + 1;
            installed.epoch = epoch;
            installed.encoder.take()
        };

        if let Some(previous) = previous.and_then(|w| w.upgrade()) {
            debug!("Encoder detached");
            previous.detached();
        }
    }

    /// Notify the installed encoder of a drawn frame.
    /// Returns `true` if an encoder was notified.
    pub fn notify(&self, transform: &Mat4) -> bool {
        let installed = self
            .installed
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(encoder) = installed.encoder.as_ref().and_then(Weak::upgrade) else {
            return false;
        };

        match encoder.input_kind() {
            EncoderInput::Transformed => encoder.frame_available(transform),
            EncoderInput::Direct => encoder.frame_available_direct(),
        }
        true
    }

    /// Whether a live encoder is installed.
    pub fn is_attached(&self) -> bool {
        self.installed
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .encoder
            .as_ref()
            .is_some_and(|w| w.strong_count() > 0)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Installed<S>> {
        self.installed
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S> Default for EncoderSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of an asynchronous encoder attach.
///
/// Dropping the ticket ignores the outcome.
#[derive(Debug)]
pub struct AttachTicket {
    rx: Receiver<RenderResult<()>>,
}

impl AttachTicket {
    pub(crate) fn new(rx: Receiver<RenderResult<()>>) -> Self {
        Self { rx }
    }

    /// Block until the render thread has handled the attach.
    pub fn wait(self) -> RenderResult<()> {
        self.rx.recv()?
    }

    /// Like [`wait`](Self::wait) with an upper bound.
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RenderResult<()>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(RenderError::ActorTerminated)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingEncoder {
        direct: bool,
        transformed: AtomicUsize,
        plain: AtomicUsize,
        detached: AtomicUsize,
    }

    impl VideoEncoder<()> for CountingEncoder {
        fn input_kind(&self) -> EncoderInput {
            if self.direct {
                EncoderInput::Direct
            } else {
                EncoderInput::Transformed
            }
        }

        fn attach(&self, _shared: (), _texture: TextureId) -> Result<(), EncoderError> {
            Ok(())
        }

        fn frame_available(&self, _transform: &Mat4) {
            self.transformed.fetch_add(1, Ordering::SeqCst);
        }

        fn frame_available_direct(&self) {
            self.plain.fetch_add(1, Ordering::SeqCst);
        }

        fn detached(&self) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notification_shape_follows_input_kind() {
        let slot = EncoderSlot::new();
        let transformed = Arc::new(CountingEncoder::default());
        let encoder: EncoderRef<()> = transformed.clone();
        let epoch = slot.begin_attach();
        assert!(slot.install(&encoder, epoch));
        assert!(slot.notify(&Mat4::IDENTITY));
        assert_eq!(transformed.transformed.load(Ordering::SeqCst), 1);
        assert_eq!(transformed.plain.load(Ordering::SeqCst), 0);

        let direct = Arc::new(CountingEncoder {
            direct: true,
            ..Default::default()
        });
        let encoder: EncoderRef<()> = direct.clone();
        let epoch = slot.begin_attach();
        assert!(slot.install(&encoder, epoch));
        assert_eq!(transformed.detached.load(Ordering::SeqCst), 1);
        slot.notify(&Mat4::IDENTITY);
        assert_eq!(direct.plain.load(Ordering::SeqCst), 1);
        assert_eq!(transformed.transformed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detach_supersedes_pending_attach() {
        let slot = EncoderSlot::new();
        let counting = Arc::new(CountingEncoder::default());
        let encoder: EncoderRef<()> = counting.clone();

        let epoch = slot.begin_attach();
        slot.detach();
        assert!(!slot.is_current(epoch));
        assert!(!slot.install(&encoder, epoch));
        assert!(!slot.notify(&Mat4::IDENTITY));
        assert!(!slot.is_attached());
    }

    #[test]
    fn test_dropped_encoder_is_skipped() {
        let slot = EncoderSlot::new();
        let encoder: EncoderRef<()> = Arc::new(CountingEncoder::default());
        let epoch = slot.begin_attach();
        assert!(slot.install(&encoder, epoch));
        assert!(slot.is_attached());

        drop(encoder);
        assert!(!slot.is_attached());
        assert!(!slot.notify(&Mat4::IDENTITY));
    }

    #[test]
    fn test_detach_notifies_encoder() {
        let slot = EncoderSlot::new();
        let counting = Arc::new(CountingEncoder::default());
        let encoder: EncoderRef<()> = counting.clone();
        let epoch = slot.begin_attach();
        slot.install(&encoder, epoch);

        slot.detach();
        slot.detach();
        assert_eq!(counting.detached.load(Ordering::SeqCst), 1);
    }
}
