//! Render handle - thread-safe front end of the render actor.

use crate::actor::{request_draw, spawn_actor, ActorShared};
use crate::backend::{GraphicsBackend, SharedOf, TargetOf};
use crate::config::RenderConfig;
use crate::encoder::{AttachTicket, EncoderRef};
use crate::error::{RenderError, RenderResult};
use crate::fps::FpsCounter;
use crate::frame::{Frame, Rotation};
use crate::image_source::ImageSource;
use crate::message::{ActorState, RenderEvent, RenderMessage, RenderStats};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

struct HandleInner<B: GraphicsBackend> {
    tx: Sender<RenderMessage<B::Context>>,
    shared: Arc<ActorShared<SharedOf<B>>>,
    events: Receiver<RenderEvent>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running render actor.
///
/// Clones refer to the same actor and may be used from any thread.
/// Dropping the last clone shuts the actor down.
pub struct RenderHandle<B: GraphicsBackend> {
    inner: Arc<HandleInner<B>>,
}

impl<B: GraphicsBackend> Clone for RenderHandle<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: GraphicsBackend> RenderHandle<B> {
    /// Start a render thread drawing into `target`.
    ///
    /// Blocks until the thread has created its context and draw surface.
    /// A zero `width` or `height` falls back to the configured initial size.
    pub fn start(
        backend: B,
        target: TargetOf<B>,
        width: u32,
        height: u32,
        config: &RenderConfig,
    ) -> RenderResult<Self> {
        config.validate()?;
        let spawned = spawn_actor(backend, target, width, height, config)?;
        info!("Render actor running on thread '{}'", config.thread_name);

        Ok(Self {
            inner: Arc::new(HandleInner {
                tx: spawned.tx,
                shared: spawned.shared,
                events: spawned.events,
                thread: Mutex::new(Some(spawned.thread)),
            }),
        })
    }

    /// Ask for the latest frame to be drawn. Never blocks.
    ///
    /// Safe to call once per camera frame; repeated calls while a draw is
    /// queued are folded into that draw.
    pub fn request_draw(&self) {
        request_draw(&self.inner.shared, &self.inner.tx);
    }

    /// Resize the view. Returns once the render thread has applied it.
    ///
    /// Draws already queued may still use the old size for one frame.
    pub fn request_resize(&self, width: u32, height: u32) -> RenderResult<()> {
        self.call(|reply| RenderMessage::Resize {
            width,
            height,
            reply,
        })
    }

    /// The image source to wire into the camera as its output target.
    ///
    /// Creates the input texture on first use; after a resize a new source
    /// is returned.
    pub fn input_surface(&self) -> RenderResult<ImageSource> {
        self.call(|reply| RenderMessage::CreateInputSurface { reply })
    }

    /// Attach an encoder. Never blocks.
    ///
    /// The render thread hands the encoder the shared context and the current
    /// texture id, then notifies it once per drawn frame. The last attach or
    /// detach call wins. The encoder is held weakly: keep it alive.
    pub fn attach_encoder(&self, encoder: EncoderRef<SharedOf<B>>) -> AttachTicket {
        let epoch = self.inner.shared.encoder.begin_attach();
        let (reply, rx) = bounded(1);
        if !self.inner.shared.is_closed() {
            let _ = self.inner.tx.send(RenderMessage::SetEncoder {
                encoder,
                epoch,
                reply,
            });
        }
        AttachTicket::new(rx)
    }

    /// Remove the encoder. It receives no notification after this returns.
    pub fn detach_encoder(&self) {
        self.inner.shared.encoder.detach();
    }

    pub fn is_encoder_attached(&self) -> bool {
        self.inner.shared.encoder.is_attached()
    }

    /// Set the display orientation, applied from the next draw on.
    pub fn set_rotation(&self, rotation: Rotation) {
        self.inner.shared.set_rotation(rotation);
    }

    pub fn rotation(&self) -> Rotation {
        self.inner.shared.rotation()
    }

    /// The most recently drawn camera frame.
    pub fn capture_still(&self) -> RenderResult<Option<Frame>> {
        self.call(|reply| RenderMessage::CaptureStill { reply })
    }

    /// Rebuild the session on a new native surface after the old one was lost.
    pub fn reactivate(&self, target: TargetOf<B>) -> RenderResult<()> {
        self.call(|reply| RenderMessage::Activate { target, reply })
    }

    /// Stop the actor and wait for its resources to be released.
    ///
    /// Later calls return immediately. Requests still queued fail with
    /// `ActorTerminated`.
    pub fn shutdown(&self) -> RenderResult<()> {
        shutdown(&self.inner)
    }

    pub fn state(&self) -> ActorState {
        self.inner.shared.state()
    }

    /// Diagnostic events from the render thread.
    pub fn events(&self) -> Receiver<RenderEvent> {
        self.inner.events.clone()
    }

    pub fn stats(&self) -> RenderStats {
        self.inner.shared.stats()
    }

    /// Frame rate of frame-available signals.
    pub fn fps(&self) -> &FpsCounter {
        &self.inner.shared.fps
    }

    /// Messages waiting for the render thread.
    pub fn queued_messages(&self) -> usize {
        self.inner.tx.len()
    }

    /// Post a request and block on its reply.
    fn call<T, F>(&self, make: F) -> RenderResult<T>
    where
        F: FnOnce(Sender<RenderResult<T>>) -> RenderMessage<B::Context>,
    {
        let shared = &self.inner.shared;
        if shared.is_closed() {
            return Err(RenderError::ActorTerminated);
        }
        if shared.on_render_thread() {
            return Err(RenderError::Reentrant);
        }

        let (reply, rx) = bounded(1);
        self.inner.tx.send(make(reply))?;
        rx.recv()?
    }
}

fn shutdown<B: GraphicsBackend>(inner: &HandleInner<B>) -> RenderResult<()> {
    let mut thread = inner
        .thread
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if inner.shared.close() {
        debug!("Posting terminate to render thread");
        let _ = inner.tx.send(RenderMessage::Terminate);
    }

    if inner.shared.on_render_thread() {
        // Cannot join ourselves; the loop exits after this message.
        return Ok(());
    }

    if let Some(handle) = thread.take() {
        if handle.join().is_err() {
            error!("Render thread panicked during shutdown");
            return Err(RenderError::ActorTerminated);
        }
        info!("Render actor shut down");
    }
    Ok(())
}

impl<B: GraphicsBackend> Drop for HandleInner<B> {
    fn drop(&mut self) {
        let _ = shutdown(self);
    }
}
