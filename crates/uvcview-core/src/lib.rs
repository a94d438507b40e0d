//! uvcview core - dedicated-thread camera preview renderer
//!
//! Implements the render pipeline between "a camera frame became available"
//! and "the frame was drawn and, if requested, handed to an encoder":
//! - One render thread per preview, owning the graphics context
//! - Coalesced draw requests from the camera callback thread
//! - Blocking reconfiguration requests with explicit termination semantics
//! - Weakly held encoder notified once per drawn frame

mod actor;
mod backend;
mod config;
mod encoder;
mod error;
mod fps;
mod frame;
mod frame_source;
mod handle;
mod headless;
mod image_source;
mod message;
mod session;
mod view;

pub use backend::{GraphicsBackend, GraphicsContext, InputTexture, SharedOf, TargetOf};
pub use config::RenderConfig;
pub use encoder::{AttachTicket, EncoderInput, EncoderRef, EncoderSlot, VideoEncoder};
pub use error::{EncoderError, RenderError, RenderResult};
pub use fps::FpsCounter;
pub use frame::{Frame, Rotation, TextureId};
pub use frame_source::{FrameListener, FrameSource};
pub use handle::RenderHandle;
pub use headless::{
    HeadlessBackend, HeadlessContext, HeadlessDrawer, HeadlessShared, HeadlessSurface,
    HeadlessTarget, HeadlessTexture,
};
pub use image_source::{ImageSource, SourceId};
pub use message::{ActorState, RenderEvent, RenderStats};
pub use session::{DrawOutcome, RenderSession};
pub use view::{PreviewSurface, PreviewView, ViewCallback};
