//! Render session - the graphics resources owned by one render thread.

use crate::backend::{GraphicsBackend, GraphicsContext, InputTexture};
use crate::encoder::EncoderSlot;
use crate::error::{RenderError, RenderResult};
use crate::frame::{Rotation, TextureId};
use crate::image_source::{FrameListener, ImageSource};
use tracing::{debug, info};

/// Texture and the image source feeding it. Always created and released
/// together.
struct InputSurface<T> {
    texture: T,
    source: ImageSource,
}

/// Result of a draw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A frame was drawn and presented
    Drawn { encoder_notified: bool },
    /// Nothing to draw into or nothing to draw from
    Skipped,
}

/// Graphics context, draw surface, drawer and input texture of one preview.
///
/// Not thread-safe: every method runs on the render thread.
pub struct RenderSession<C: GraphicsContext> {
    context: Option<C>,
    surface: Option<C::Surface>,
    drawer: Option<C::Drawer>,
    input: Option<InputSurface<C::Texture>>,
    view_width: u32,
    view_height: u32,
    frame_listener: Option<FrameListener>,
}

impl<C: GraphicsContext> RenderSession<C> {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context: None,
            surface: None,
            drawer: None,
            input: None,
            view_width: width,
            view_height: height,
            frame_listener: None,
        }
    }

    /// Listener installed on every image source this session creates.
    pub fn set_frame_listener(&mut self, listener: FrameListener) {
        self.frame_listener = Some(listener);
    }

    /// Create the context and the draw surface for `target`.
    ///
    /// Any previous resources are released first.
    pub fn activate<B>(&mut self, backend: &mut B, target: &C::Target) -> RenderResult<()>
    where
        B: GraphicsBackend<Context = C>,
    {
        self.release();

        let mut context = backend.create_context()?;
        let mut surface =
            match context.create_surface(target, self.view_width, self.view_height) {
                Ok(surface) => surface,
                Err(e) => {
                    context.release();
                    return Err(e);
                }
            };

        let drawer = context
            .make_current(&mut surface)
            .and_then(|()| context.create_drawer());
        let drawer = match drawer {
            Ok(drawer) => drawer,
            Err(e) => {
                context.release_surface(surface);
                context.release();
                return Err(e);
            }
        };

        self.context = Some(context);
        self.surface = Some(surface);
        self.drawer = Some(drawer);
        info!(
            "Render session activated ({}x{})",
            self.view_width, self.view_height
        );
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.view_width, self.view_height)
    }

    /// Id of the current input texture.
    pub fn texture_id(&self) -> Option<TextureId> {
        self.input.as_ref().map(|input| input.texture.id())
    }

    /// The current image source.
    pub fn input_source(&self) -> Option<&ImageSource> {
        self.input.as_ref().map(|input| &input.source)
    }

    /// Shareable context capability.
    pub fn shared(&self) -> Option<C::Shared> {
        self.context.as_ref().map(|context| context.shared())
    }

    /// Make sure an input texture of the current view size exists and return
    /// the image source feeding it.
    pub fn ensure_input_surface(&mut self) -> RenderResult<ImageSource> {
        let (width, height) = (self.view_width, self.view_height);
        let (Some(context), Some(surface)) = (self.context.as_mut(), self.surface.as_mut()) else {
            return Err(RenderError::surface_lost("render session is not active"));
        };

        if let Some(input) = &self.input {
            if input.texture.size() == (width, height) {
                return Ok(input.source.clone());
            }
        }

        context.make_current(surface)?;
        if let Some(old) = self.input.take() {
            debug!("Releasing input texture {}", old.texture.id());
            old.source.release();
            context.release_texture(old.texture);
        }

        let texture = context.create_texture(width, height)?;
        let source = ImageSource::new(texture.id(), width, height);
        source.set_frame_listener(self.frame_listener.clone());
        debug!(
            "Created input texture {} ({}x{}) for {}",
            texture.id(),
            width,
            height,
            source.id()
        );

        self.input = Some(InputSurface {
            texture,
            source: source.clone(),
        });
        Ok(source)
    }

    /// Draw the latest frame and present it.
    ///
    /// Consumes at most one pending frame; with none pending the last frame
    /// is drawn again. The encoder is notified once the frame is drawn and
    /// before the swap.
    pub fn draw_frame(
        &mut self,
        rotation: Rotation,
        encoder: &EncoderSlot<C::Shared>,
    ) -> RenderResult<DrawOutcome> {
        let (Some(context), Some(surface), Some(drawer), Some(input)) = (
            self.context.as_mut(),
            self.surface.as_mut(),
            self.drawer.as_mut(),
            self.input.as_mut(),
        ) else {
            return Ok(DrawOutcome::Skipped);
        };

        context.make_current(surface)?;

        let texture = &mut input.texture;
        input
            .source
            .update_tex_image(|frame| context.upload(texture, frame))?;
        let transform = input.source.transform_matrix();

        context.draw(
            drawer,
            surface,
            &input.texture,
            &(transform * rotation.matrix()),
        )?;

        // Only a frame that made it into the swapchain reaches the encoder.
        let encoder_notified = encoder.notify(&transform);
        context.present(surface)?;

        Ok(DrawOutcome::Drawn { encoder_notified })
    }

    /// Change the view size and recreate the input texture at the new size.
    ///
    /// Zero components keep their current value. Returns `false` when the
    /// size did not change. The texture id changes on every effective resize.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<bool> {
        let width = if width > 0 { width } else { self.view_width };
        let height = if height > 0 { height } else { self.view_height };
        if (width, height) == (self.view_width, self.view_height) {
            return Ok(false);
        }

        let (Some(context), Some(surface)) = (self.context.as_mut(), self.surface.as_mut()) else {
            return Err(RenderError::surface_lost("render session is not active"));
        };
        context.resize_surface(surface, width, height)?;

        self.view_width = width;
        self.view_height = height;
        self.ensure_input_surface()?;
        Ok(true)
    }

    /// Tear everything down: drawer, image source, texture, surface, context.
    ///
    /// Safe to call more than once.
    pub fn release(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };

        if let Some(drawer) = self.drawer.take() {
            context.release_drawer(drawer);
        }
        if let Some(input) = self.input.take() {
            input.source.release();
            context.release_texture(input.texture);
        }
        if let Some(surface) = self.surface.take() {
            context.release_surface(surface);
        }
        context.release();
        info!("Render session released");
    }
}

impl<C: GraphicsContext> Drop for RenderSession<C> {
    fn drop(&mut self) {
        self.release();
    }
}
