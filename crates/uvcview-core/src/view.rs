//! Preview view - ties the render actor to a native surface's lifecycle.
//!
//! The hosting UI layer reports surface and visibility changes; the view
//! starts, resizes and stops the render actor accordingly and keeps the
//! camera's output target up to date.

use crate::backend::{GraphicsBackend, SharedOf, TargetOf};
use crate::config::RenderConfig;
use crate::encoder::{AttachTicket, EncoderRef};
use crate::error::{RenderError, RenderResult};
use crate::frame::{Frame, Rotation};
use crate::frame_source::FrameSource;
use crate::handle::RenderHandle;
use crate::image_source::ImageSource;
use tracing::{debug, warn};

/// Notifications about the preview's input surface.
pub trait ViewCallback: Send {
    fn on_surface_created(&self, _surface: &ImageSource) {}
    fn on_surface_changed(&self, _surface: &ImageSource, _width: u32, _height: u32) {}
    fn on_surface_destroyed(&self, _surface: Option<&ImageSource>) {}
}

/// What a presentation surface offers to the hosting UI layer.
pub trait PreviewSurface {
    type Target;

    /// Hand a camera frame to the preview. Returns `false` if dropped.
    fn deliver_frame(&mut self, frame: Frame) -> bool;

    fn on_surface_available(
        &mut self,
        target: Self::Target,
        width: u32,
        height: u32,
    ) -> RenderResult<()>;

    fn on_surface_size_changed(&mut self, width: u32, height: u32) -> RenderResult<()>;

    fn on_surface_destroyed(&mut self);
}

/// Camera preview bound to one native surface at a time.
pub struct PreviewView<B: GraphicsBackend + Clone> {
    backend: B,
    config: RenderConfig,
    renderer: Option<RenderHandle<B>>,
    target: Option<TargetOf<B>>,
    width: u32,
    height: u32,
    has_surface: bool,
    input: Option<ImageSource>,
    rotation: Rotation,
    callback: Option<Box<dyn ViewCallback>>,
}

impl<B: GraphicsBackend + Clone> PreviewView<B> {
    pub fn new(backend: B, config: RenderConfig) -> Self {
        let rotation = config.rotation;
        Self {
            backend,
            config,
            renderer: None,
            target: None,
            width: 0,
            height: 0,
            has_surface: false,
            input: None,
            rotation,
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: Option<Box<dyn ViewCallback>>) {
        self.callback = callback;
    }

    pub fn has_surface(&self) -> bool {
        self.has_surface
    }

    /// The running renderer, if any.
    pub fn renderer(&self) -> Option<&RenderHandle<B>> {
        self.renderer.as_ref()
    }

    /// Restart rendering after [`pause`](Self::pause).
    pub fn resume(&mut self) -> RenderResult<()> {
        debug!("Preview resume");
        if self.has_surface && self.renderer.is_none() {
            if let Some(target) = self.target.clone() {
                self.start_renderer(target)?;
            }
        }
        Ok(())
    }

    /// Stop rendering; the surface stays remembered.
    pub fn pause(&mut self) {
        debug!("Preview pause");
        self.stop_renderer();
    }

    /// The image source the camera should render into.
    ///
    /// Cached until the surface changes.
    pub fn input_surface(&mut self) -> RenderResult<ImageSource> {
        if let Some(input) = &self.input {
            if !input.is_released() {
                return Ok(input.clone());
            }
        }
        let renderer = self.renderer.as_ref().ok_or(RenderError::NoInputSurface)?;
        let input = renderer.input_surface()?;
        self.input = Some(input.clone());
        Ok(input)
    }

    /// Point a frame producer at this preview's input surface.
    pub fn connect_source(&mut self, source: &mut dyn FrameSource) -> RenderResult<()> {
        let input = self.input_surface()?;
        source.set_output(Some(input));
        Ok(())
    }

    pub fn set_video_encoder(&self, encoder: Option<EncoderRef<SharedOf<B>>>) -> Option<AttachTicket> {
        let renderer = self.renderer.as_ref()?;
        match encoder {
            Some(encoder) => Some(renderer.attach_encoder(encoder)),
            None => {
                renderer.detach_encoder();
                None
            }
        }
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
        if let Some(renderer) = &self.renderer {
            renderer.set_rotation(rotation);
        }
    }

    pub fn capture_still(&self) -> RenderResult<Option<Frame>> {
        self.renderer
            .as_ref()
            .ok_or(RenderError::ActorTerminated)?
            .capture_still()
    }

    pub fn update_fps(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.fps().update();
        }
    }

    pub fn reset_fps(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.fps().reset();
        }
    }

    pub fn fps(&self) -> f32 {
        self.renderer.as_ref().map_or(0.0, |r| r.fps().fps())
    }

    pub fn total_fps(&self) -> f32 {
        self.renderer.as_ref().map_or(0.0, |r| r.fps().total_fps())
    }

    fn start_renderer(&mut self, target: TargetOf<B>) -> RenderResult<()> {
        let renderer = RenderHandle::start(
            self.backend.clone(),
            target,
            self.width,
            self.height,
            &self.config,
        )?;
        renderer.set_rotation(self.rotation);
        self.renderer = Some(renderer);
        self.input = None;
        Ok(())
    }

    fn stop_renderer(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                warn!("Renderer shutdown failed: {}", e);
            }
        }
        self.input = None;
    }
}

impl<B: GraphicsBackend + Clone> PreviewSurface for PreviewView<B> {
    type Target = TargetOf<B>;

    fn deliver_frame(&mut self, frame: Frame) -> bool {
        match self.input_surface() {
            Ok(input) => input.push_frame(frame),
            Err(_) => false,
        }
    }

    fn on_surface_available(
        &mut self,
        target: TargetOf<B>,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        debug!("Surface available ({}x{})", width, height);
        self.width = width;
        self.height = height;
        self.target = Some(target.clone());

        match &self.renderer {
            Some(renderer) => {
                renderer.request_resize(width, height)?;
                self.input = None;
            }
            None => self.start_renderer(target)?,
        }
        self.has_surface = true;

        if self.callback.is_some() {
            let input = self.input_surface()?;
            if let Some(callback) = &self.callback {
                callback.on_surface_created(&input);
            }
        }
        Ok(())
    }

    fn on_surface_size_changed(&mut self, width: u32, height: u32) -> RenderResult<()> {
        debug!("Surface size changed ({}x{})", width, height);
        self.width = width;
        self.height = height;
        if let Some(renderer) = &self.renderer {
            renderer.request_resize(width, height)?;
            self.input = None;
        }

        if self.callback.is_some() && self.renderer.is_some() {
            let input = self.input_surface()?;
            if let Some(callback) = &self.callback {
                callback.on_surface_changed(&input, width, height);
            }
        }
        Ok(())
    }

    fn on_surface_destroyed(&mut self) {
        debug!("Surface destroyed");
        let input = self.input.clone();
        self.stop_renderer();
        self.has_surface = false;
        self.target = None;
        if let Some(callback) = &self.callback {
            callback.on_surface_destroyed(input.as_ref());
        }
    }
}

impl<B: GraphicsBackend + Clone> Drop for PreviewView<B> {
    fn drop(&mut self) {
        self.stop_renderer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessBackend, HeadlessTarget};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl ViewCallback for Log {
        fn on_surface_created(&self, surface: &ImageSource) {
            self.0.lock().unwrap().push(format!("created {:?}", surface.buffer_size()));
        }
        fn on_surface_changed(&self, _surface: &ImageSource, width: u32, height: u32) {
            self.0.lock().unwrap().push(format!("changed {}x{}", width, height));
        }
        fn on_surface_destroyed(&self, _surface: Option<&ImageSource>) {
            self.0.lock().unwrap().push("destroyed".to_string());
        }
    }

    #[derive(Default)]
    struct Camera {
        output: Option<ImageSource>,
    }

    impl FrameSource for Camera {
        fn set_output(&mut self, output: Option<ImageSource>) {
            self.output = output;
        }
    }

    fn view() -> PreviewView<HeadlessBackend> {
        PreviewView::new(HeadlessBackend::new(), RenderConfig::default())
    }

    #[test]
    fn test_surface_lifecycle_callbacks() {
        let log = Log::default();
        let mut view = view();
        view.set_callback(Some(Box::new(log.clone())));

        view.on_surface_available(HeadlessTarget::new(), 32, 24).unwrap();
        assert!(view.has_surface());
        view.on_surface_size_changed(16, 12).unwrap();
        view.on_surface_destroyed();
        assert!(!view.has_surface());
        assert!(view.renderer().is_none());

        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["created (32, 24)", "changed 16x12", "destroyed"]
        );
    }

    #[test]
    fn test_pause_and_resume_restart_renderer() {
        let mut view = view();
        view.on_surface_available(HeadlessTarget::new(), 8, 8).unwrap();
        let first = view.input_surface().unwrap();

        view.pause();
        assert!(view.renderer().is_none());
        assert!(first.is_released());

        view.resume().unwrap();
        let second = view.input_surface().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_deliver_frame_and_connect_source() {
        let target = HeadlessTarget::new();
        let mut view = view();
        view.on_surface_available(target.clone(), 8, 8).unwrap();

        let mut camera = Camera::default();
        view.connect_source(&mut camera).unwrap();
        assert_eq!(camera.output, Some(view.input_surface().unwrap()));

        assert!(view.deliver_frame(Frame::solid(8, 8, [7, 7, 7, 255])));
        let frame = (0..200)
            .find_map(|_| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                view.capture_still().unwrap()
            })
            .expect("frame drawn");
        assert_eq!(frame.pixel(0, 0), [7, 7, 7, 255]);
    }

    #[test]
    fn test_input_surface_without_renderer() {
        let mut view = view();
        assert!(matches!(
            view.input_surface().unwrap_err(),
            RenderError::NoInputSurface
        ));
        assert!(!view.deliver_frame(Frame::solid(1, 1, [0, 0, 0, 255])));
    }
}
