//! Preview window
//!
//! Drives a [`PreviewView`] from winit's window lifecycle:
//! 1. Window creation makes the surface available and starts the renderer
//! 2. Resizes reconfigure the renderer and rewire the camera
//! 3. Suspend/resume pause and restart rendering

use crate::pattern::TestPatternSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uvcview_core::{
    FrameSource, PreviewSurface, PreviewView, RenderConfig, RenderResult, Rotation,
};
use uvcview_gpu::{GpuConfig, WgpuBackend};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

const FPS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Preview application state
pub struct PreviewApp {
    window: Option<Arc<Window>>,
    view: PreviewView<WgpuBackend>,
    camera: TestPatternSource,
    config: RenderConfig,
    next_fps_log: Instant,
}

impl PreviewApp {
    pub fn new(config: RenderConfig, gpu: GpuConfig, camera: TestPatternSource) -> Self {
        let backend = WgpuBackend::new(gpu).with_clear_color(config.clear_color);
        Self {
            window: None,
            view: PreviewView::new(backend, config.clone()),
            camera,
            config,
            next_fps_log: Instant::now() + FPS_LOG_INTERVAL,
        }
    }

    /// Point the camera at the current input surface.
    fn rewire_camera(&mut self) -> RenderResult<()> {
        self.view.connect_source(&mut self.camera)
    }

    fn surface_available(&mut self, window: Arc<Window>) -> RenderResult<()> {
        let PhysicalSize { width, height } = window.inner_size();
        self.view.on_surface_available(window, width, height)?;
        self.view.reset_fps();
        self.rewire_camera()
    }

    fn handle_key(&mut self, event: &KeyEvent, event_loop: &ActiveEventLoop) {
        if event.state != ElementState::Pressed {
            return;
        }
        match event.logical_key.as_ref() {
            Key::Named(NamedKey::Escape) => self.close(event_loop),
            Key::Character("r") => {
                let next = Rotation::from_degrees(self.view_rotation().degrees() as i32 + 90);
                info!("Rotation -> {} degrees", next.degrees());
                self.view.set_rotation(next);
            }
            Key::Character("c") => match self.view.capture_still() {
                Ok(Some(frame)) => {
                    let (w, h) = frame.size();
                    info!("Captured still {}x{}", w, h);
                }
                Ok(None) => info!("No frame drawn yet"),
                Err(e) => warn!("Still capture failed: {}", e),
            },
            _ => {}
        }
    }

    fn view_rotation(&self) -> Rotation {
        self.view
            .renderer()
            .map_or(self.config.rotation, |renderer| renderer.rotation())
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        self.camera.set_output(None);
        self.view.on_surface_destroyed();
        self.window = None;
        event_loop.exit();
    }

    fn log_fps(&mut self) {
        let now = Instant::now();
        if now < self.next_fps_log {
            return;
        }
        self.next_fps_log = now + FPS_LOG_INTERVAL;
        self.view.update_fps();
        if let Some(renderer) = self.view.renderer() {
            let stats = renderer.stats();
            info!(
                "fps {:.1} (avg {:.1}), drawn {}, coalesced {}",
                self.view.fps(),
                self.view.total_fps(),
                stats.frames_drawn,
                stats.draws_coalesced
            );
        }
    }
}

impl ApplicationHandler for PreviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            // Returning from suspend
            if let Err(e) = self.view.resume().and_then(|()| self.rewire_camera()) {
                error!("Failed to resume preview: {}", e);
                self.close(event_loop);
            }
            return;
        }

        let attrs = WindowAttributes::default()
            .with_title("uvcview")
            .with_inner_size(LogicalSize::new(
                self.config.initial_width,
                self.config.initial_height,
            ));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        info!("Window created");
        self.window = Some(window.clone());

        if let Err(e) = self.surface_available(window) {
            error!("Failed to start preview: {}", e);
            self.close(event_loop);
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        debug!("Suspended");
        self.camera.set_output(None);
        self.view.pause();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                self.close(event_loop);
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if width == 0 || height == 0 {
                    return;
                }
                debug!("Window resized: {}x{}", width, height);
                let result = self
                    .view
                    .on_surface_size_changed(width, height)
                    .and_then(|()| self.rewire_camera());
                if let Err(e) = result {
                    warn!("Resize failed: {}", e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event, event_loop),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.log_fps();
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_fps_log));
    }
}

/// Open the preview window and run until it is closed.
pub fn run(config: RenderConfig, gpu: GpuConfig, camera: TestPatternSource) -> anyhow::Result<()> {
    info!("Starting preview window");

    let event_loop = EventLoop::new()?;
    let mut app = PreviewApp::new(config, gpu, camera);
    event_loop.run_app(&mut app)?;

    Ok(())
}
