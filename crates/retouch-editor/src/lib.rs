//! retouch-editor: Pure mask-editing core (sans-IO).
//!
//! Marks a region of an image for repair:
//! pointer events -> gesture classification -> viewport transform ->
//! stroke log -> mask rasterization -> PNG export.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! data and returns structured values. All network and filesystem
//! interaction lives in `retouch-io` and the `retouch` binary.

pub mod descriptor;
pub mod gesture;
pub mod raster;
pub mod session;
pub mod stroke;
pub mod types;
pub mod viewport;

pub use descriptor::{ImageDescriptor, ImageLimits};
pub use gesture::{GestureAction, GestureTracker, PointerEvent, PointerId};
pub use raster::MaskRasterizer;
pub use session::EditorSession;
pub use stroke::{Brush, BrushWidth, Stroke, StrokeLog, StrokeTool};
pub use types::{Dimensions, EditTool, EditorError, GrayImage, Point, Rect, RgbaImage, Size};
pub use viewport::{Viewport, ViewportLimits, ViewportState};

/// Rasterize a stroke log at the given size and encode the binary mask
/// as PNG.
///
/// # Errors
///
/// Returns [`EditorError::Surface`] for an empty size and
/// [`EditorError::Image`] if encoding fails.
pub fn render_mask_png(strokes: &StrokeLog, size: Dimensions) -> Result<Vec<u8>, EditorError> {
    let mut raster = MaskRasterizer::new(size)?;
    raster.render(strokes);
    raster.export_png()
}
