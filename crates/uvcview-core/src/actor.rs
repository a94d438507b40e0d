//! Render thread implementation with panic isolation.

use crate::backend::{GraphicsBackend, GraphicsContext, SharedOf, TargetOf};
use crate::config::RenderConfig;
use crate::encoder::EncoderSlot;
use crate::error::{EncoderError, RenderError, RenderResult};
use crate::fps::FpsCounter;
use crate::frame::Rotation;
use crate::message::{ActorState, RenderEvent, RenderMessage, RenderStats};
use crate::session::{DrawOutcome, RenderSession};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct Counters {
    frames_signalled: AtomicU64,
    draws_posted: AtomicU64,
    draws_coalesced: AtomicU64,
    frames_drawn: AtomicU64,
    encoder_notifications: AtomicU64,
}

/// State shared between the render thread and every caller thread.
pub(crate) struct ActorShared<S> {
    state: AtomicU8,
    closed: AtomicBool,
    draw_pending: AtomicBool,
    rotation: AtomicU8,
    thread_id: Mutex<Option<ThreadId>>,
    pub(crate) encoder: EncoderSlot<S>,
    pub(crate) fps: FpsCounter,
    counters: Counters,
    events: Sender<RenderEvent>,
}

impl<S> ActorShared<S> {
    fn new(rotation: Rotation, events: Sender<RenderEvent>) -> Self {
        Self {
            state: AtomicU8::new(ActorState::Stopped.as_u8()),
            closed: AtomicBool::new(false),
            draw_pending: AtomicBool::new(false),
            rotation: AtomicU8::new(rotation.as_u8()),
            thread_id: Mutex::new(None),
            encoder: EncoderSlot::new(),
            fps: FpsCounter::new(),
            counters: Counters::default(),
            events,
        }
    }

    pub(crate) fn state(&self) -> ActorState {
        ActorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ActorState) {
        debug!("Render actor -> {}", state);
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Stop accepting requests. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn rotation(&self) -> Rotation {
        Rotation::from_u8(self.rotation.load(Ordering::Relaxed))
    }

    pub(crate) fn set_rotation(&self, rotation: Rotation) {
        self.rotation.store(rotation.as_u8(), Ordering::Relaxed);
    }

    /// Whether the caller is the render thread itself.
    pub(crate) fn on_render_thread(&self) -> bool {
        let id = *self
            .thread_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        id == Some(thread::current().id())
    }

    pub(crate) fn stats(&self) -> RenderStats {
        let c = &self.counters;
        RenderStats {
            frames_signalled: c.frames_signalled.load(Ordering::Relaxed),
            draws_posted: c.draws_posted.load(Ordering::Relaxed),
            draws_coalesced: c.draws_coalesced.load(Ordering::Relaxed),
            frames_drawn: c.frames_drawn.load(Ordering::Relaxed),
            encoder_notifications: c.encoder_notifications.load(Ordering::Relaxed),
        }
    }

    fn emit(&self, event: RenderEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            trace!("Diagnostic channel full, dropping {:?}", event);
        }
    }
}

/// Post a coalesced draw request.
///
/// Only the caller that flips the pending flag enqueues a message, so at
/// most one draw is ever queued.
pub(crate) fn request_draw<C: GraphicsContext>(
    shared: &ActorShared<C::Shared>,
    tx: &Sender<RenderMessage<C>>,
) {
    if shared.is_closed() {
        return;
    }
    shared.fps.count();
    shared
        .counters
        .frames_signalled
        .fetch_add(1, Ordering::Relaxed);

    if shared.draw_pending.swap(true, Ordering::AcqRel) {
        shared.counters.draws_coalesced.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if tx.send(RenderMessage::Draw).is_ok() {
        shared.counters.draws_posted.fetch_add(1, Ordering::Relaxed);
    } else {
        shared.draw_pending.store(false, Ordering::Release);
    }
}

/// Running render thread.
pub(crate) struct Spawned<B: GraphicsBackend> {
    pub(crate) tx: Sender<RenderMessage<B::Context>>,
    pub(crate) shared: Arc<ActorShared<SharedOf<B>>>,
    pub(crate) events: Receiver<RenderEvent>,
    pub(crate) thread: JoinHandle<()>,
}

/// Spawn the render thread and wait until its session is up.
pub(crate) fn spawn_actor<B: GraphicsBackend>(
    mut backend: B,
    target: TargetOf<B>,
    width: u32,
    height: u32,
    config: &RenderConfig,
) -> RenderResult<Spawned<B>> {
    let (tx, rx) = crossbeam_channel::unbounded::<RenderMessage<B::Context>>();
    let (event_tx, events) = bounded(config.event_capacity.max(1));
    let shared = Arc::new(ActorShared::new(config.rotation, event_tx));
    let (ready_tx, ready_rx) = bounded::<RenderResult<()>>(1);
    let (width, height) = config.effective_size(width, height);

    shared.set_state(ActorState::Starting);

    let thread = {
        let shared = shared.clone();
        let listener_tx = tx.clone();
        thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                *shared
                    .thread_id
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(thread::current().id());

                let mut session = RenderSession::<B::Context>::new(width, height);
                {
                    let shared = shared.clone();
                    let tx = listener_tx;
                    session.set_frame_listener(Arc::new(move || request_draw(&shared, &tx)));
                }

                if let Err(e) = session.activate(&mut backend, &target) {
                    error!("Render session bring-up failed: {}", e);
                    shared.set_state(ActorState::Stopped);
                    let _ = ready_tx.send(Err(e));
                    return;
                }

                shared.set_state(ActorState::Running);
                let _ = ready_tx.send(Ok(()));
                info!("Render thread started ({}x{})", width, height);
                shared.emit(RenderEvent::Started);

                run_actor_loop(&mut backend, &mut session, &rx, &shared);

                shared.set_state(ActorState::Stopping);
                drain(&rx);
                session.release();
                drop(session);
                drain(&rx);

                shared.set_state(ActorState::Stopped);
                shared.emit(RenderEvent::Stopped);
                info!("Render thread stopped");
            })?
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(Spawned {
            tx,
            shared,
            events,
            thread,
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            // Bring-up panicked before reporting.
            let _ = thread.join();
            shared.set_state(ActorState::Stopped);
            Err(RenderError::ActorTerminated)
        }
    }
}

/// Answer every queued request with `ActorTerminated`.
fn drain<C: GraphicsContext>(rx: &Receiver<RenderMessage<C>>) {
    let mut dropped = 0usize;
    while let Ok(msg) = rx.try_recv() {
        msg.abort();
        dropped += 1;
    }
    if dropped > 0 {
        debug!("Dropped {} queued render messages", dropped);
    }
}

/// Main loop: one message fully handled before the next is received.
fn run_actor_loop<B: GraphicsBackend>(
    backend: &mut B,
    session: &mut RenderSession<B::Context>,
    rx: &Receiver<RenderMessage<B::Context>>,
    shared: &ActorShared<SharedOf<B>>,
) {
    loop {
        let msg = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => {
                debug!("Render channel closed, shutting down");
                break;
            }
        };

        if matches!(msg, RenderMessage::Terminate) {
            debug!("Render thread received terminate");
            break;
        }

        trace!("Processing {}", msg.kind());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            process_message(backend, session, msg, shared)
        }));

        if let Ok(ControlFlow::Break(())) = result {
            shared.close();
            break;
        }
        if let Err(panic_info) = result {
            let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!("Render thread panicked: {}", message);
            shared.emit(RenderEvent::Panicked { message });
        }
    }
}

/// Handle one message. `Break` ends the actor.
fn process_message<B: GraphicsBackend>(
    backend: &mut B,
    session: &mut RenderSession<B::Context>,
    msg: RenderMessage<B::Context>,
    shared: &ActorShared<SharedOf<B>>,
) -> ControlFlow<()> {
    match msg {
        RenderMessage::Draw => {
            // Signals arriving from here on queue the next draw.
            shared.draw_pending.store(false, Ordering::Release);
            draw(session, shared);
        }

        RenderMessage::SetEncoder {
            encoder,
            epoch,
            reply,
        } => {
            if !shared.encoder.is_current(epoch) {
                debug!("Encoder attach superseded");
                let _ = reply.send(Ok(()));
                return ControlFlow::Continue(());
            }

            let result = match (session.shared(), session.texture_id()) {
                (Some(ctx), Some(texture)) => encoder
                    .attach(ctx, texture)
                    .map(|()| texture)
                    .map_err(RenderError::from),
                (None, _) => Err(RenderError::surface_lost("render session is not active")),
                (_, None) => Err(RenderError::from(EncoderError::NoTexture)),
            };

            match result {
                Ok(texture) => {
                    if shared.encoder.install(&encoder, epoch) {
                        info!("Encoder attached to {}", texture);
                        shared.emit(RenderEvent::EncoderAttached { texture });
                    }
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    warn!("Encoder attach failed: {}", e);
                    shared.emit(RenderEvent::EncoderAttachFailed {
                        error: e.to_string(),
                    });
                    let _ = reply.send(Err(e));
                }
            }
        }

        RenderMessage::CreateInputSurface { reply } => {
            let _ = reply.send(session.ensure_input_surface());
        }

        RenderMessage::Resize {
            width,
            height,
            reply,
        } => {
            let result = session.resize(width, height).map(|changed| {
                if changed {
                    debug!("Resized to {}x{}", width, height);
                }
            });
            let _ = reply.send(result);
        }

        RenderMessage::Activate { target, reply } => {
            let result = session.activate(backend, &target);
            let fatal = matches!(result, Err(RenderError::ContextCreation(_)));
            if let Err(e) = &result {
                warn!("Render session reactivation failed: {}", e);
            }
            let _ = reply.send(result);
            if fatal {
                error!("No graphics context, stopping render actor");
                return ControlFlow::Break(());
            }
        }

        RenderMessage::CaptureStill { reply } => {
            let frame = session.input_source().and_then(|source| source.latest_frame());
            let _ = reply.send(Ok(frame));
        }

        RenderMessage::Terminate => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn draw<C: GraphicsContext>(session: &mut RenderSession<C>, shared: &ActorShared<C::Shared>) {
    if !session.is_active() {
        trace!("Draw skipped: no active session");
        return;
    }

    match session.draw_frame(shared.rotation(), &shared.encoder) {
        Ok(DrawOutcome::Drawn { encoder_notified }) => {
            shared.counters.frames_drawn.fetch_add(1, Ordering::Relaxed);
            if encoder_notified {
                shared
                    .counters
                    .encoder_notifications
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(DrawOutcome::Skipped) => {
            trace!("Draw skipped: no input surface");
        }
        Err(e) if e.is_surface_lost() => {
            warn!("Draw surface lost, releasing session: {}", e);
            session.release();
            shared.emit(RenderEvent::SurfaceLost);
        }
        Err(e) => {
            warn!("Draw failed: {}", e);
            shared.emit(RenderEvent::DrawFailed {
                error: e.to_string(),
            });
        }
    }
}
