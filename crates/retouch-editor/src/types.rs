//! Shared types for the retouch editor core.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference the
/// exported mask without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference the
/// overlay preview without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point.
///
/// Canvas logical space unless a function documents otherwise (pointer
/// events carry screen-space points).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A width/height pair in logical (fractional) units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// The center point of a box of this size anchored at the origin.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// An axis-aligned rectangle in screen space.
///
/// Used for the bounding box of the canvas container, as reported by
/// the host's layout query.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Screen x of the left edge.
    pub left: f64,
    /// Screen y of the top edge.
    pub top: f64,
    /// Width of the rectangle.
    pub width: f64,
    /// Height of the rectangle.
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Screen-space center of the rectangle.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The same extent as a fractional [`Size`].
    #[must_use]
    pub fn as_size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

/// The tool currently selected in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditTool {
    /// Paint the repair region.
    #[default]
    Brush,
    /// Remove previously painted coverage.
    Eraser,
    /// Pan the viewport with a single pointer. Draws nothing.
    Move,
}

impl EditTool {
    /// The stroke tool this edit tool draws with, if any.
    #[must_use]
    pub const fn stroke_tool(self) -> Option<crate::stroke::StrokeTool> {
        match self {
            Self::Brush => Some(crate::stroke::StrokeTool::Brush),
            Self::Eraser => Some(crate::stroke::StrokeTool::Eraser),
            Self::Move => None,
        }
    }
}

/// Errors produced by the editor core.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// A brush width was zero, negative, or not finite.
    #[error("brush width must be a positive finite number, got {0}")]
    InvalidBrushWidth(f64),

    /// Viewport scale limits were not `0 < min <= max`.
    #[error("invalid viewport limits: min {min}, max {max}")]
    InvalidViewportLimits {
        /// Requested minimum scale.
        min: f64,
        /// Requested maximum scale.
        max: f64,
    },

    /// An image had a zero-sized side.
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    InvalidDimensions {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
    },

    /// The container to fit the image into was empty or not finite.
    #[error("invalid container size {width}x{height}")]
    InvalidContainer {
        /// Container width.
        width: f64,
        /// Container height.
        height: f64,
    },

    /// The source image file extension is not an accepted format.
    #[error("unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    /// The source image exceeds the upload size limit.
    #[error("image is too large: {size} bytes (max {max})")]
    ImageTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed size in bytes.
        max: u64,
    },

    /// The drawing surface could not be allocated.
    #[error("failed to create a {width}x{height} drawing surface")]
    Surface {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Encoding or probing an image failed.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

impl EditorError {
    /// Whether the error describes bad input rather than a rendering
    /// failure. Validation errors are reported to the user as-is.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidBrushWidth(_)
                | Self::InvalidViewportLimits { .. }
                | Self::InvalidDimensions { .. }
                | Self::InvalidContainer { .. }
                | Self::UnsupportedFormat(_)
                | Self::ImageTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_is_finite() {
        assert!(Point::new(1.0, 2.0).is_finite());
        assert!(!Point::new(f64::NAN, 2.0).is_finite());
        assert!(!Point::new(1.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn rect_center_accounts_for_offset() {
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(rect.center(), Point::new(60.0, 45.0));
    }

    #[test]
    fn dimensions_as_size() {
        let d = Dimensions::new(640, 480);
        assert_eq!(d.as_size(), Size::new(640.0, 480.0));
        assert!(!d.is_empty());
        assert!(Dimensions::new(0, 10).is_empty());
    }

    #[test]
    fn move_tool_draws_nothing() {
        assert_eq!(EditTool::Move.stroke_tool(), None);
        assert_eq!(
            EditTool::Eraser.stroke_tool(),
            Some(crate::stroke::StrokeTool::Eraser)
        );
    }

    #[test]
    fn validation_errors_are_classified() {
        assert!(EditorError::InvalidBrushWidth(0.0).is_validation());
        assert!(EditorError::UnsupportedFormat("gif".into()).is_validation());
        assert!(
            !EditorError::Surface {
                width: 0,
                height: 0
            }
            .is_validation()
        );
    }

    #[test]
    fn error_display() {
        let err = EditorError::ImageTooLarge { size: 20, max: 10 };
        assert_eq!(err.to_string(), "image is too large: 20 bytes (max 10)");
    }
}
