//! uvcview: camera preview renderer
//!
//! Initializes the global allocator, sets up logging, and shows a test
//! pattern camera through the render actor, in a window or headless.
//!
//! Usage: `uvcview [--headless] [--frames N] [--fps N] [config.json]`

mod app;
mod headless;
mod pattern;

use anyhow::{Context, Result};
use clap::Parser;
use pattern::TestPatternSource;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uvcview_core::RenderConfig;
use uvcview_gpu::GpuConfig;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const HEADLESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Command line options
#[derive(Debug, Parser)]
#[command(name = "uvcview")]
#[command(about = "Camera preview renderer")]
#[command(version)]
struct Options {
    /// Render offscreen instead of opening a window
    #[arg(long)]
    headless: bool,

    /// Frames to render before exiting (headless only)
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Test pattern frame rate
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,

    /// JSON render configuration
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let options = Options::parse();
    let config = match &options.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RenderConfig::default(),
    };

    info!("uvcview starting...");
    info!("Using mimalloc allocator");

    let camera = TestPatternSource::start(config.initial_width, config.initial_height, options.fps)?;

    if options.headless {
        headless::run(config, camera, options.frames, HEADLESS_TIMEOUT)?;
    } else {
        app::run(config, GpuConfig::default(), camera)?;
    }

    info!("uvcview shutting down");
    Ok(())
}
