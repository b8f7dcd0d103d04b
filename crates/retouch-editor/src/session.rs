//! The active editor session: one loaded image with its viewport,
//! strokes and mask surface.

use crate::descriptor::ImageDescriptor;
use crate::gesture::{GestureAction, GestureTracker, PointerEvent};
use crate::raster::MaskRasterizer;
use crate::stroke::{Brush, BrushWidth, Stroke, StrokeLog};
use crate::types::{EditTool, EditorError, GrayImage, Rect, RgbaImage};
use crate::viewport::{Viewport, ViewportLimits};

/// Owns everything the user edits for one image.
///
/// Pointer events go in through [`handle_pointer`](Self::handle_pointer);
/// the session converts positions to canvas space, updates the stroke
/// log and viewport, and keeps the mask surface current.
#[derive(Debug, Clone)]
pub struct EditorSession {
    descriptor: ImageDescriptor,
    viewport: Viewport,
    strokes: StrokeLog,
    raster: MaskRasterizer,
    gestures: GestureTracker,
    tool: EditTool,
    brush_width: BrushWidth,
}

impl EditorSession {
    /// Start a session for a loaded image.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Surface`] if the mask surface cannot be
    /// allocated at the display size.
    pub fn new(descriptor: ImageDescriptor, limits: ViewportLimits) -> Result<Self, EditorError> {
        let size = descriptor.display();
        let raster = MaskRasterizer::new(size)?;
        tracing::debug!(
            width = size.width,
            height = size.height,
            "editor session started"
        );
        Ok(Self {
            viewport: Viewport::new(size.as_size(), limits),
            descriptor,
            strokes: StrokeLog::new(),
            raster,
            gestures: GestureTracker::new(),
            tool: EditTool::default(),
            brush_width: BrushWidth::DEFAULT,
        })
    }

    /// Start a session with previously saved strokes.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_strokes(
        descriptor: ImageDescriptor,
        limits: ViewportLimits,
        strokes: StrokeLog,
    ) -> Result<Self, EditorError> {
        let mut session = Self::new(descriptor, limits)?;
        session.restore(strokes);
        Ok(session)
    }

    /// Feed one pointer event. `container` is the canvas container's
    /// current screen rectangle. Returns the action that was applied.
    pub fn handle_pointer(&mut self, event: PointerEvent, container: Rect) -> GestureAction {
        let action = self.gestures.handle(event, self.tool);
        match action {
            GestureAction::None => {}
            GestureAction::StrokeBegin(screen) => {
                let p = self.viewport.screen_to_canvas(screen, container);
                self.strokes.begin(p);
            }
            GestureAction::StrokeExtend(screen) => {
                let p = self.viewport.screen_to_canvas(screen, container);
                self.strokes.append(p);
            }
            GestureAction::StrokeEnd => self.commit(),
            GestureAction::StrokeCancel => self.strokes.cancel(),
            GestureAction::Pan { dx, dy } => self.viewport.pan(dx, dy),
            GestureAction::Pinch {
                previous_distance,
                distance,
            } => {
                self.viewport.pinch(previous_distance, distance);
            }
        }
        action
    }

    fn commit(&mut self) {
        // Switching to Move mid-stroke leaves nothing to commit with.
        let Some(tool) = self.tool.stroke_tool() else {
            self.strokes.cancel();
            return;
        };
        if let Some(stroke) = self.strokes.commit(Brush::new(tool, self.brush_width)) {
            self.raster.apply(stroke);
        }
    }

    /// The loaded image.
    #[must_use]
    pub const fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    /// Current pan/zoom state.
    #[must_use]
    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Committed strokes.
    #[must_use]
    pub const fn strokes(&self) -> &StrokeLog {
        &self.strokes
    }

    /// The mask surface.
    #[must_use]
    pub const fn rasterizer(&self) -> &MaskRasterizer {
        &self.raster
    }

    /// Selected tool.
    #[must_use]
    pub const fn tool(&self) -> EditTool {
        self.tool
    }

    /// Select a tool. Takes effect for the stroke committed next.
    pub const fn set_tool(&mut self, tool: EditTool) {
        self.tool = tool;
    }

    /// Current brush width.
    #[must_use]
    pub const fn brush_width(&self) -> BrushWidth {
        self.brush_width
    }

    /// Change the brush width. Strokes already committed keep theirs.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidBrushWidth`] for a non-positive or
    /// non-finite width; the previous width stays in effect.
    pub fn set_brush_width(&mut self, width: f64) -> Result<(), EditorError> {
        self.brush_width = BrushWidth::new(width)?;
        Ok(())
    }

    /// Remove the last committed stroke and redraw the surface.
    pub fn undo(&mut self) -> Option<Stroke> {
        let undone = self.strokes.undo()?;
        self.raster.render(&self.strokes);
        Some(undone)
    }

    /// Remove every stroke.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.raster.clear();
    }

    /// Return the viewport to its initial state.
    pub fn reset_viewport(&mut self) {
        self.viewport.reset();
    }

    /// Replace the stroke log (e.g. from a saved draft) and redraw.
    pub fn restore(&mut self, strokes: StrokeLog) {
        self.strokes = strokes;
        self.raster.render(&self.strokes);
    }

    /// Binary mask of the current strokes.
    #[must_use]
    pub fn mask_image(&self) -> GrayImage {
        self.raster.mask_image()
    }

    /// Straight-alpha preview of the current strokes.
    #[must_use]
    pub fn overlay_image(&self) -> RgbaImage {
        self.raster.overlay_image()
    }

    /// Encode the current mask as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Image`] if encoding fails.
    pub fn export_mask_png(&self) -> Result<Vec<u8>, EditorError> {
        self.raster.export_png()
    }
}
