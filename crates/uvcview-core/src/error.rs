//! Error types for the preview renderer.

use thiserror::Error;

/// Errors reported by the render core.
///
/// Synchronous requests (`CreateInputSurface`, `Resize`, `Activate`,
/// `CaptureStill`) return these to the blocked caller. Errors raised while
/// handling asynchronous requests never cross the thread boundary; they are
/// logged and published on the diagnostic event channel instead.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to create graphics context: {0}")]
    ContextCreation(String),

    #[error("Draw surface lost: {0}")]
    SurfaceLost(String),

    #[error("Render actor has terminated")]
    ActorTerminated,

    #[error("Blocking render request issued from the render thread")]
    Reentrant,

    #[error("Encoder attach failed: {0}")]
    EncoderAttach(#[from] EncoderError),

    #[error("No input surface has been created")]
    NoInputSurface,

    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Graphics backend error: {0}")]
    Backend(String),

    #[error("Failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using RenderError.
pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub fn context(msg: impl Into<String>) -> Self {
        Self::ContextCreation(msg.into())
    }

    pub fn surface_lost(msg: impl Into<String>) -> Self {
        Self::SurfaceLost(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether the error means the draw target is gone.
    pub fn is_surface_lost(&self) -> bool {
        matches!(self, Self::SurfaceLost(_))
    }
}

/// Errors an encoder may report when it is handed the shared context.
#[derive(Debug, Clone, Error)]
pub enum EncoderError {
    #[error("Encoder rejected the shared context: {0}")]
    Rejected(String),

    #[error("Encoder is not running")]
    NotRunning,

    #[error("No input texture to attach to")]
    NoTexture,
}

impl<T> From<crossbeam_channel::SendError<T>> for RenderError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::ActorTerminated
    }
}

impl From<crossbeam_channel::RecvError> for RenderError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        Self::ActorTerminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_channel_maps_to_terminated() {
        let (tx, rx) = crossbeam_channel::bounded::<u32>(1);
        drop(rx);
        let err: RenderError = tx.send(1).unwrap_err().into();
        assert!(matches!(err, RenderError::ActorTerminated));
    }

    #[test]
    fn test_surface_lost_predicate() {
        assert!(RenderError::surface_lost("gone").is_surface_lost());
        assert!(!RenderError::ActorTerminated.is_surface_lost());
    }
}
