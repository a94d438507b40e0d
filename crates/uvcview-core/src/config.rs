//! Render configuration
//!
//! Settings for the render thread, loadable from JSON.

use crate::error::{RenderError, RenderResult};
use crate::frame::Rotation;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Render actor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Name of the dedicated render thread
    pub thread_name: String,

    /// Fallback width when the surface reports zero
    pub initial_width: u32,

    /// Fallback height when the surface reports zero
    pub initial_height: u32,

    /// Color the draw surface is cleared to before each frame
    pub clear_color: [f32; 4],

    /// Capacity of the diagnostic event channel.
    /// Events are dropped when the channel is full.
    pub event_capacity: usize,

    /// Initial display orientation
    pub rotation: Rotation,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            thread_name: String::from("RenderThread"),
            initial_width: 640,
            initial_height: 480,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            event_capacity: 64,
            rotation: Rotation::Deg0,
        }
    }
}

impl RenderConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> RenderResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Check value ranges.
    pub fn validate(&self) -> RenderResult<()> {
        if self.initial_width == 0 || self.initial_height == 0 {
            return Err(RenderError::InvalidDimensions {
                width: self.initial_width,
                height: self.initial_height,
            });
        }
        if self.event_capacity == 0 {
            return Err(RenderError::Config("event_capacity must be non-zero".into()));
        }
        if self.thread_name.is_empty() {
            return Err(RenderError::Config("thread_name must not be empty".into()));
        }
        Ok(())
    }

    /// Replace zero dimensions with the configured fallback.
    pub fn effective_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            if width == 0 { self.initial_width } else { width },
            if height == 0 { self.initial_height } else { height },
        )
    }
}
