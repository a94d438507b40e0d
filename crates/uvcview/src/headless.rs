//! Windowless preview on the CPU renderer
//!
//! Runs the full pipeline against a headless target for a fixed number of
//! presented frames, then reports what the actor did.

use crate::pattern::TestPatternSource;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uvcview_core::{
    FrameSource, HeadlessBackend, HeadlessTarget, PreviewSurface, PreviewView, RenderConfig,
    RenderEvent,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Present `frames` frames, or give up after `timeout`.
pub fn run(
    config: RenderConfig,
    mut camera: TestPatternSource,
    frames: u64,
    timeout: Duration,
) -> anyhow::Result<()> {
    let backend = HeadlessBackend::new().with_clear_color(config.clear_color);
    let target = HeadlessTarget::new();
    let (width, height) = (config.initial_width, config.initial_height);

    let mut view = PreviewView::new(backend, config);
    view.on_surface_available(target.clone(), width, height)?;
    view.connect_source(&mut camera)?;

    let events = view
        .renderer()
        .map(|renderer| renderer.events())
        .ok_or_else(|| anyhow::anyhow!("renderer did not start"))?;

    let deadline = Instant::now() + timeout;
    while target.present_count() < frames && Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
    }
    view.update_fps();

    if let Some(renderer) = view.renderer() {
        let stats = renderer.stats();
        info!(
            "Presented {} frames: signalled {}, posted {}, coalesced {}, {:.1} fps",
            target.present_count(),
            stats.frames_signalled,
            stats.draws_posted,
            stats.draws_coalesced,
            view.total_fps()
        );
    }

    camera.set_output(None);
    view.on_surface_destroyed();

    for event in events.try_iter() {
        match event {
            RenderEvent::DrawFailed { error } => warn!("Draw failed: {}", error),
            RenderEvent::Panicked { message } => warn!("Render thread panicked: {}", message),
            other => info!("Render event: {:?}", other),
        }
    }

    if target.present_count() < frames {
        anyhow::bail!(
            "only {} of {} frames presented within {:?}",
            target.present_count(),
            frames,
            timeout
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_run_presents_frames() {
        let config = RenderConfig {
            initial_width: 32,
            initial_height: 24,
            ..RenderConfig::default()
        };
        let camera = TestPatternSource::start(64, 48, 120).unwrap();
        run(config, camera, 5, Duration::from_secs(10)).unwrap();
    }
}
