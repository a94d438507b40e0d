//! End-to-end behaviour of the render actor on the headless backend.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use glam::Mat4;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uvcview_core::{
    ActorState, EncoderError, EncoderInput, EncoderRef, Frame, HeadlessBackend, HeadlessShared,
    HeadlessTarget, RenderConfig, RenderError, RenderEvent, RenderHandle, Rotation, TextureId,
    VideoEncoder,
};

type Handle = RenderHandle<HeadlessBackend>;

const TIMEOUT: Duration = Duration::from_secs(5);

fn start(width: u32, height: u32) -> (Handle, HeadlessTarget) {
    let target = HeadlessTarget::new();
    let handle = RenderHandle::start(
        HeadlessBackend::new(),
        target.clone(),
        width,
        height,
        &RenderConfig::default(),
    )
    .unwrap();
    (handle, target)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Every posted draw has been processed.
fn wait_idle(handle: &Handle) -> bool {
    wait_until(|| {
        let stats = handle.stats();
        handle.queued_messages() == 0 && stats.frames_drawn >= stats.draws_posted
    })
}

fn wait_for_event(events: &Receiver<RenderEvent>, want: impl Fn(&RenderEvent) -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(left) {
            Ok(event) if want(&event) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

#[derive(Default)]
struct CountingEncoder {
    notifications: AtomicUsize,
    attached_to: std::sync::Mutex<Option<TextureId>>,
}

impl VideoEncoder<HeadlessShared> for CountingEncoder {
    fn input_kind(&self) -> EncoderInput {
        EncoderInput::Transformed
    }

    fn attach(&self, _shared: HeadlessShared, texture: TextureId) -> Result<(), EncoderError> {
        *self.attached_to.lock().unwrap() = Some(texture);
        Ok(())
    }

    fn frame_available(&self, _transform: &Mat4) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }

    fn frame_available_direct(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks inside its first notification until released.
struct GateEncoder {
    first: AtomicBool,
    entered: Sender<()>,
    release: Receiver<()>,
    notifications: AtomicUsize,
}

impl VideoEncoder<HeadlessShared> for GateEncoder {
    fn input_kind(&self) -> EncoderInput {
        EncoderInput::Direct
    }

    fn attach(&self, _shared: HeadlessShared, _texture: TextureId) -> Result<(), EncoderError> {
        Ok(())
    }

    fn frame_available(&self, _transform: &Mat4) {
        self.frame_available_direct();
    }

    fn frame_available_direct(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        if self.first.swap(false, Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(TIMEOUT);
        }
    }
}

struct RejectingEncoder;

impl VideoEncoder<HeadlessShared> for RejectingEncoder {
    fn input_kind(&self) -> EncoderInput {
        EncoderInput::Direct
    }

    fn attach(&self, _shared: HeadlessShared, _texture: TextureId) -> Result<(), EncoderError> {
        Err(EncoderError::Rejected("no codec".into()))
    }

    fn frame_available(&self, _transform: &Mat4) {
        panic!("rejected encoder must not be notified");
    }

    fn frame_available_direct(&self) {
        panic!("rejected encoder must not be notified");
    }
}

#[test]
fn test_draw_backlog_never_exceeds_one() {
    let (handle, _target) = start(8, 8);
    handle.input_surface().unwrap();

    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let gate = Arc::new(GateEncoder {
        first: AtomicBool::new(true),
        entered: entered_tx,
        release: release_rx,
        notifications: AtomicUsize::new(0),
    });
    let encoder: EncoderRef<HeadlessShared> = gate.clone();
    handle.attach_encoder(encoder).wait().unwrap();

    // Park the render thread inside a draw.
    handle.request_draw();
    entered_rx.recv_timeout(TIMEOUT).unwrap();

    let max_backlog = Arc::new(AtomicUsize::new(0));
    let producers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            let max_backlog = max_backlog.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    handle.request_draw();
                    max_backlog.fetch_max(handle.queued_messages(), Ordering::SeqCst);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(max_backlog.load(Ordering::SeqCst) <= 1);
    let stats = handle.stats();
    assert_eq!(stats.draws_posted, 2);
    assert_eq!(stats.draws_coalesced, 1999);
    assert_eq!(stats.frames_signalled, 2001);

    release_tx.send(()).unwrap();
    assert!(wait_idle(&handle));
    assert_eq!(handle.stats().frames_drawn, 2);
    assert_eq!(gate.notifications.load(Ordering::SeqCst), 2);
    handle.shutdown().unwrap();
}

#[test]
fn test_resize_then_input_surface_sees_new_size() {
    let (handle, _target) = start(32, 24);
    let before = handle.input_surface().unwrap();
    assert_eq!(before.buffer_size(), (32, 24));

    for (w, h) in [(64, 48), (10, 10), (640, 480)] {
        handle.request_resize(w, h).unwrap();
        assert_eq!(handle.input_surface().unwrap().buffer_size(), (w, h));
    }
    handle.shutdown().unwrap();
}

#[test]
fn test_resize_invalidates_input_surface_handle() {
    let (handle, _target) = start(320, 240);
    let h1 = handle.input_surface().unwrap();
    assert_eq!(handle.input_surface().unwrap(), h1);

    handle.request_resize(640, 480).unwrap();
    let h2 = handle.input_surface().unwrap();
    assert_ne!(h1, h2);
    assert_ne!(h1.texture_id(), h2.texture_id());
    assert!(h1.is_released());
    assert!(!h1.push_frame(Frame::solid(320, 240, [0, 0, 0, 255])));
    handle.shutdown().unwrap();
}

#[test]
fn test_encoder_notified_once_per_drawn_frame() {
    let (handle, _target) = start(8, 8);
    let source = handle.input_surface().unwrap();
    let counting = Arc::new(CountingEncoder::default());
    let encoder: EncoderRef<HeadlessShared> = counting.clone();
    handle.attach_encoder(encoder).wait().unwrap();
    assert_eq!(*counting.attached_to.lock().unwrap(), Some(source.texture_id()));

    for i in 0..5u8 {
        source.push_frame(Frame::solid(8, 8, [i, i, i, 255]));
        assert!(wait_until(|| handle.stats().frames_drawn == u64::from(i) + 1));
        assert_eq!(counting.notifications.load(Ordering::SeqCst), usize::from(i) + 1);
    }
    assert_eq!(handle.stats().encoder_notifications, 5);
    handle.shutdown().unwrap();
}

#[test]
fn test_rapid_fire_draws_are_bounded() {
    let (handle, _target) = start(16, 16);
    handle.input_surface().unwrap();
    let counting = Arc::new(CountingEncoder::default());
    let encoder: EncoderRef<HeadlessShared> = counting.clone();
    handle.attach_encoder(encoder).wait().unwrap();

    let producer = {
        let handle = handle.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                handle.request_draw();
            }
        })
    };
    producer.join().unwrap();
    assert!(wait_idle(&handle));

    let drawn = handle.stats().frames_drawn;
    assert!((1..=10).contains(&drawn));
    let notified = counting.notifications.load(Ordering::SeqCst) as u64;
    assert_eq!(notified, drawn);
    handle.shutdown().unwrap();
}

#[test]
fn test_shutdown_is_idempotent() {
    let (handle, _target) = start(8, 8);
    let source = handle.input_surface().unwrap();
    let events = handle.events();

    handle.shutdown().unwrap();
    handle.shutdown().unwrap();
    assert_eq!(handle.state(), ActorState::Stopped);
    assert!(source.is_released());

    assert!(matches!(
        handle.request_resize(10, 10),
        Err(RenderError::ActorTerminated)
    ));
    assert!(matches!(handle.input_surface(), Err(RenderError::ActorTerminated)));
    handle.request_draw();
    assert!(matches!(
        handle.attach_encoder(Arc::new(CountingEncoder::default())).wait(),
        Err(RenderError::ActorTerminated)
    ));

    let stopped = events
        .try_iter()
        .filter(|e| matches!(e, RenderEvent::Stopped))
        .count();
    assert_eq!(stopped, 1);
}

#[test]
fn test_shutdown_during_resize_never_hangs() {
    for _ in 0..10 {
        let (handle, _target) = start(8, 8);
        let (done_tx, done_rx) = unbounded();

        let resizer = {
            let handle = handle.clone();
            thread::spawn(move || {
                let mut size = 8;
                loop {
                    size = if size == 8 { 12 } else { 8 };
                    match handle.request_resize(size, size) {
                        Ok(()) => continue,
                        Err(e) => {
                            let _ = done_tx.send(e);
                            break;
                        }
                    }
                }
            })
        };

        thread::sleep(Duration::from_millis(5));
        handle.shutdown().unwrap();

        let err = done_rx.recv_timeout(TIMEOUT).expect("resize caller hung");
        assert!(matches!(err, RenderError::ActorTerminated));
        resizer.join().unwrap();
    }
}

#[test]
fn test_context_creation_failure_is_returned_from_start() {
    let result = RenderHandle::start(
        HeadlessBackend::unavailable(),
        HeadlessTarget::new(),
        8,
        8,
        &RenderConfig::default(),
    );
    assert!(matches!(result, Err(RenderError::ContextCreation(_))));
}

#[test]
fn test_surface_lost_then_reactivated() {
    let (handle, target) = start(8, 8);
    let events = handle.events();
    let source = handle.input_surface().unwrap();

    target.destroy();
    source.push_frame(Frame::solid(8, 8, [1, 1, 1, 255]));
    assert!(wait_for_event(&events, |e| matches!(e, RenderEvent::SurfaceLost)));
    assert_eq!(handle.state(), ActorState::Running);

    assert!(handle.input_surface().unwrap_err().is_surface_lost());
    assert!(handle.request_resize(16, 16).unwrap_err().is_surface_lost());

    let fresh = HeadlessTarget::new();
    handle.reactivate(fresh.clone()).unwrap();
    let source = handle.input_surface().unwrap();
    source.push_frame(Frame::solid(8, 8, [9, 8, 7, 255]));
    assert!(wait_until(|| fresh.present_count() > 0));
    assert_eq!(fresh.last_presented().unwrap().pixel(0, 0), [9, 8, 7, 255]);
    handle.shutdown().unwrap();
}

#[test]
fn test_encoder_attach_error_goes_to_caller_only() {
    let (handle, target) = start(8, 8);
    let source = handle.input_surface().unwrap();
    let encoder: EncoderRef<HeadlessShared> = Arc::new(RejectingEncoder);

    let err = handle.attach_encoder(encoder.clone()).wait().unwrap_err();
    assert!(matches!(err, RenderError::EncoderAttach(EncoderError::Rejected(_))));
    assert!(!handle.is_encoder_attached());

    source.push_frame(Frame::solid(8, 8, [3, 3, 3, 255]));
    assert!(wait_until(|| target.present_count() == 1));
    handle.shutdown().unwrap();
}

#[test]
fn test_attach_before_input_surface_fails() {
    let (handle, _target) = start(8, 8);
    let encoder: EncoderRef<HeadlessShared> = Arc::new(CountingEncoder::default());
    let err = handle.attach_encoder(encoder).wait().unwrap_err();
    assert!(matches!(err, RenderError::EncoderAttach(EncoderError::NoTexture)));
    handle.shutdown().unwrap();
}

#[test]
fn test_detached_encoder_is_not_notified() {
    let (handle, _target) = start(8, 8);
    let source = handle.input_surface().unwrap();
    let counting = Arc::new(CountingEncoder::default());
    let encoder: EncoderRef<HeadlessShared> = counting.clone();
    handle.attach_encoder(encoder).wait().unwrap();

    source.push_frame(Frame::solid(8, 8, [0, 0, 0, 255]));
    assert!(wait_until(|| handle.stats().frames_drawn == 1));
    handle.detach_encoder();
    assert!(!handle.is_encoder_attached());

    source.push_frame(Frame::solid(8, 8, [0, 0, 0, 255]));
    assert!(wait_until(|| handle.stats().frames_drawn == 2));
    assert_eq!(counting.notifications.load(Ordering::SeqCst), 1);
    handle.shutdown().unwrap();
}

#[test]
fn test_rotation_is_applied_at_draw_time() {
    let (handle, target) = start(2, 2);
    let source = handle.input_surface().unwrap();
    let frame = Frame::rgba(
        2,
        2,
        vec![
            255, 0, 0, 255, 0, 255, 0, 255, // top row
            0, 0, 255, 255, 255, 255, 255, 255, // bottom row
        ],
    )
    .unwrap();

    handle.set_rotation(Rotation::Deg180);
    assert_eq!(handle.rotation(), Rotation::Deg180);
    source.push_frame(frame.clone());
    assert!(wait_until(|| target.present_count() == 1));

    let shown = target.last_presented().unwrap();
    assert_eq!(shown.pixel(0, 0), frame.pixel(1, 1));
    assert_eq!(shown.pixel(1, 0), frame.pixel(0, 1));
    handle.shutdown().unwrap();
}

#[test]
fn test_capture_still_returns_last_drawn_frame() {
    let (handle, _target) = start(4, 4);
    assert!(handle.capture_still().unwrap().is_none());

    let source = handle.input_surface().unwrap();
    source.push_frame(Frame::solid(8, 8, [42, 0, 0, 255]));
    assert!(wait_until(|| handle.stats().frames_drawn == 1));

    let still = handle.capture_still().unwrap().unwrap();
    assert_eq!(still.size(), (4, 4));
    assert_eq!(still.pixel(2, 2), [42, 0, 0, 255]);
    handle.shutdown().unwrap();
}

#[test]
fn test_dropping_last_handle_stops_actor() {
    let (handle, _target) = start(4, 4);
    let source = handle.input_surface().unwrap();
    let clone = handle.clone();
    drop(handle);
    assert_eq!(clone.state(), ActorState::Running);
    drop(clone);
    assert!(source.is_released());
}

/// Calls back into the renderer from its notification.
#[derive(Default)]
struct ReentrantEncoder {
    handle: std::sync::Mutex<Option<Handle>>,
    saw_reentrant: AtomicBool,
}

impl VideoEncoder<HeadlessShared> for ReentrantEncoder {
    fn input_kind(&self) -> EncoderInput {
        EncoderInput::Direct
    }

    fn attach(&self, _shared: HeadlessShared, _texture: TextureId) -> Result<(), EncoderError> {
        Ok(())
    }

    fn frame_available(&self, _transform: &Mat4) {
        self.frame_available_direct();
    }

    fn frame_available_direct(&self) {
        let handle = self.handle.lock().unwrap().clone();
        if let Some(handle) = handle {
            if matches!(handle.input_surface(), Err(RenderError::Reentrant)) {
                self.saw_reentrant.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[test]
fn test_blocking_call_from_render_thread_is_rejected() {
    let (handle, _target) = start(4, 4);
    handle.input_surface().unwrap();
    let reentrant = Arc::new(ReentrantEncoder::default());
    *reentrant.handle.lock().unwrap() = Some(handle.clone());
    let encoder: EncoderRef<HeadlessShared> = reentrant.clone();
    handle.attach_encoder(encoder).wait().unwrap();

    handle.request_draw();
    assert!(wait_until(|| reentrant.saw_reentrant.load(Ordering::SeqCst)));
    assert_eq!(handle.state(), ActorState::Running);

    reentrant.handle.lock().unwrap().take();
    handle.shutdown().unwrap();
}
