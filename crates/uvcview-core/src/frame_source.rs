//! Producer-side interface of the camera pipeline.

use crate::image_source::ImageSource;

pub use crate::image_source::FrameListener;

/// A camera (or any frame producer) that renders into an [`ImageSource`].
///
/// Implementations push frames with [`ImageSource::push_frame`] from their
/// own thread; the source's listener turns each push into a draw request.
pub trait FrameSource {
    /// Wire the producer to a new output, or unwire it with `None`.
    fn set_output(&mut self, output: Option<ImageSource>);
}
