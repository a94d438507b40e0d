//! Test pattern camera
//!
//! Stands in for a UVC device: a producer thread pushes scrolling colour
//! bars into whatever image source it is currently wired to.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};
use uvcview_core::{Frame, FrameSource, ImageSource};

const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

/// Colour bars shifted left by `offset` pixels.
pub fn color_bars(width: u32, height: u32, offset: u32) -> Frame {
    let bar_width = (width / BARS.len() as u32).max(1);
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for x in 0..width {
            let bar = ((x + offset) / bar_width) as usize % BARS.len();
            data.extend_from_slice(&BARS[bar]);
        }
    }
    Frame::rgba(width, height, data).unwrap_or_else(|| Frame::solid(width, height, BARS[0]))
}

/// Synthetic frame producer running at a fixed rate.
pub struct TestPatternSource {
    output: Arc<Mutex<Option<ImageSource>>>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestPatternSource {
    pub fn start(width: u32, height: u32, fps: u32) -> std::io::Result<Self> {
        let output = Arc::new(Mutex::new(None::<ImageSource>));
        let (stop, stopped) = bounded::<()>(1);
        let interval = Duration::from_secs(1) / fps.max(1);

        let thread = {
            let output = output.clone();
            thread::Builder::new()
                .name("TestPattern".to_string())
                .spawn(move || {
                    info!("Test pattern {}x{} @ {} fps", width, height, fps);
                    let mut offset = 0u32;
                    loop {
                        match stopped.recv_timeout(interval) {
                            Err(RecvTimeoutError::Timeout) => {}
                            _ => break,
                        }
                        let target = output
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .clone();
                        if let Some(target) = target {
                            if !target.push_frame(color_bars(width, height, offset)) {
                                debug!("Output released, waiting for a new one");
                            }
                        }
                        offset = offset.wrapping_add(4);
                    }
                    debug!("Test pattern stopped");
                })?
        };

        Ok(Self {
            output,
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

impl FrameSource for TestPatternSource {
    fn set_output(&mut self, output: Option<ImageSource>) {
        *self
            .output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = output;
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uvcview_core::TextureId;

    #[test]
    fn test_color_bars_scroll() {
        let frame = color_bars(14, 1, 0);
        assert_eq!(frame.pixel(0, 0), BARS[0]);
        assert_eq!(frame.pixel(2, 0), BARS[1]);
        assert_eq!(frame.pixel(13, 0), BARS[6]);

        let shifted = color_bars(14, 1, 2);
        assert_eq!(shifted.pixel(0, 0), BARS[1]);
    }

    #[test]
    fn test_pushes_into_output() {
        let source = ImageSource::new(TextureId::next(), 8, 8);
        let mut pattern = TestPatternSource::start(8, 8, 200).unwrap();
        pattern.set_output(Some(source.clone()));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while source.frames_pushed() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(source.frames_pushed() > 0);

        pattern.set_output(None);
        drop(pattern);
    }
}
