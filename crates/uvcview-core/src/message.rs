//! Message types for communication between caller threads and the render
//! thread.

use crate::backend::GraphicsContext;
use crate::encoder::EncoderRef;
use crate::error::{RenderError, RenderResult};
use crate::frame::{Frame, TextureId};
use crate::image_source::ImageSource;
use crossbeam_channel::Sender;
use std::fmt;

/// Requests processed by the render thread, in post order per sender.
pub(crate) enum RenderMessage<C: GraphicsContext> {
    /// Draw the latest frame. At most one is queued at a time.
    Draw,
    /// Hand the context to an encoder and install it
    SetEncoder {
        encoder: EncoderRef<C::Shared>,
        epoch: u64,
        reply: Sender<RenderResult<()>>,
    },
    /// Create (or return) the input texture and its image source
    CreateInputSurface {
        reply: Sender<RenderResult<ImageSource>>,
    },
    /// Change the view size
    Resize {
        width: u32,
        height: u32,
        reply: Sender<RenderResult<()>>,
    },
    /// Rebuild the session on a new native surface
    Activate {
        target: C::Target,
        reply: Sender<RenderResult<()>>,
    },
    /// Fetch the most recently drawn camera frame
    CaptureStill {
        reply: Sender<RenderResult<Option<Frame>>>,
    },
    /// Release the session and leave the loop
    Terminate,
}

impl<C: GraphicsContext> RenderMessage<C> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Draw => "Draw",
            Self::SetEncoder { .. } => "SetEncoder",
            Self::CreateInputSurface { .. } => "CreateInputSurface",
            Self::Resize { .. } => "Resize",
            Self::Activate { .. } => "Activate",
            Self::CaptureStill { .. } => "CaptureStill",
            Self::Terminate => "Terminate",
        }
    }

    /// Answer a request that will never be processed.
    pub(crate) fn abort(self) {
        match self {
            Self::SetEncoder { reply, .. }
            | Self::Resize { reply, .. }
            | Self::Activate { reply, .. } => {
                let _ = reply.send(Err(RenderError::ActorTerminated));
            }
            Self::CreateInputSurface { reply } => {
                let _ = reply.send(Err(RenderError::ActorTerminated));
            }
            Self::CaptureStill { reply } => {
                let _ = reply.send(Err(RenderError::ActorTerminated));
            }
            Self::Draw | Self::Terminate => {}
        }
    }
}

/// Diagnostics published by the render thread.
///
/// Errors from asynchronous requests are only reported here.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// Session is up and the loop is running
    Started,
    /// A draw failed; the loop keeps running
    DrawFailed { error: String },
    /// The draw target went away; the view stays blank until reactivated
    SurfaceLost,
    /// An encoder received the shared context
    EncoderAttached { texture: TextureId },
    /// An encoder rejected the shared context
    EncoderAttachFailed { error: String },
    /// Message processing panicked
    Panicked { message: String },
    /// Session released and thread exiting
    Stopped,
}

/// Lifecycle of the render actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ActorState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Stopping => 3,
        }
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Snapshot of render counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frame-available signals received
    pub frames_signalled: u64,
    /// Draw messages actually queued
    pub draws_posted: u64,
    /// Signals folded into an already queued draw
    pub draws_coalesced: u64,
    /// Frames drawn and presented
    pub frames_drawn: u64,
    /// Encoder notifications issued
    pub encoder_notifications: u64,
}
