//! Viewport transform engine: pan/zoom state and the mapping between
//! screen space and canvas logical space.
//!
//! The canvas is laid out centered in its container, then scaled about
//! its own center, then translated:
//!
//! ```text
//! screen = container_center + translate + scale * (canvas - canvas_center)
//! canvas = canvas_center + (screen - container_center - translate) / scale
//! ```
//!
//! For a fixed [`ViewportState`] the two directions are exact inverses
//! up to floating-point rounding.
//!
//! Pinch zoom always expands from the canvas center. It does not anchor
//! on the midpoint between the fingers, so content under the fingers
//! drifts while zooming. This matches the behavior users of the editor
//! already know.

use serde::{Deserialize, Serialize};

use crate::types::{EditorError, Point, Rect, Size};

/// Bounds on the zoom factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LimitsRepr", into = "LimitsRepr")]
pub struct ViewportLimits {
    min_scale: f64,
    max_scale: f64,
}

impl ViewportLimits {
    /// Default smallest zoom factor.
    pub const DEFAULT_MIN_SCALE: f64 = 0.5;
    /// Default largest zoom factor.
    pub const DEFAULT_MAX_SCALE: f64 = 3.0;

    /// Create limits, checking `0 < min <= max` and that both are finite.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidViewportLimits`] otherwise.
    pub fn new(min_scale: f64, max_scale: f64) -> Result<Self, EditorError> {
        let valid = min_scale.is_finite()
            && max_scale.is_finite()
            && min_scale > 0.0
            && min_scale <= max_scale;
        if !valid {
            return Err(EditorError::InvalidViewportLimits {
                min: min_scale,
                max: max_scale,
            });
        }
        Ok(Self {
            min_scale,
            max_scale,
        })
    }

    /// Smallest allowed zoom factor.
    #[must_use]
    pub const fn min_scale(&self) -> f64 {
        self.min_scale
    }

    /// Largest allowed zoom factor.
    #[must_use]
    pub const fn max_scale(&self) -> f64 {
        self.max_scale
    }

    /// Clamp a zoom factor into `[min_scale, max_scale]`.
    #[must_use]
    pub const fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

impl Default for ViewportLimits {
    fn default() -> Self {
        Self {
            min_scale: Self::DEFAULT_MIN_SCALE,
            max_scale: Self::DEFAULT_MAX_SCALE,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct LimitsRepr {
    min_scale: f64,
    max_scale: f64,
}

impl TryFrom<LimitsRepr> for ViewportLimits {
    type Error = EditorError;

    fn try_from(repr: LimitsRepr) -> Result<Self, Self::Error> {
        Self::new(repr.min_scale, repr.max_scale)
    }
}

impl From<ViewportLimits> for LimitsRepr {
    fn from(limits: ViewportLimits) -> Self {
        Self {
            min_scale: limits.min_scale,
            max_scale: limits.max_scale,
        }
    }
}

/// A snapshot of the pan/zoom state.
///
/// The transform functions live on the snapshot so that a caller can
/// hold one fixed state while converting a batch of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Zoom factor, always within the owning viewport's limits.
    pub scale: f64,
    /// Horizontal pan in screen pixels.
    pub translate_x: f64,
    /// Vertical pan in screen pixels.
    pub translate_y: f64,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }
}

impl ViewportState {
    /// Map a canvas-space point to screen space.
    #[must_use]
    pub fn canvas_to_screen(&self, point: Point, canvas: Size, container: Rect) -> Point {
        let origin = container.center();
        let pivot = canvas.center();
        Point::new(
            self.scale.mul_add(point.x - pivot.x, origin.x + self.translate_x),
            self.scale.mul_add(point.y - pivot.y, origin.y + self.translate_y),
        )
    }

    /// Map a screen-space point to canvas space without clamping.
    #[must_use]
    pub fn screen_to_canvas(&self, point: Point, canvas: Size, container: Rect) -> Point {
        let origin = container.center();
        let pivot = canvas.center();
        Point::new(
            pivot.x + (point.x - origin.x - self.translate_x) / self.scale,
            pivot.y + (point.y - origin.y - self.translate_y) / self.scale,
        )
    }
}

/// Pan/zoom state for one canvas.
///
/// Mutated only through the gesture operations ([`pan`](Self::pan),
/// [`pinch`](Self::pinch), [`reset`](Self::reset)); the scale can never
/// leave the configured [`ViewportLimits`].
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    canvas: Size,
    limits: ViewportLimits,
    state: ViewportState,
}

impl Viewport {
    /// Create a viewport for a canvas of the given logical size.
    #[must_use]
    pub fn new(canvas: Size, limits: ViewportLimits) -> Self {
        Self {
            canvas,
            limits,
            state: ViewportState {
                scale: limits.clamp(1.0),
                ..ViewportState::default()
            },
        }
    }

    /// The current pan/zoom snapshot.
    #[must_use]
    pub const fn state(&self) -> ViewportState {
        self.state
    }

    /// Logical canvas size.
    #[must_use]
    pub const fn canvas(&self) -> Size {
        self.canvas
    }

    /// Zoom limits.
    #[must_use]
    pub const fn limits(&self) -> ViewportLimits {
        self.limits
    }

    /// Current zoom factor.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.state.scale
    }

    /// Map a screen-space touch point into canvas coordinates, clamped
    /// to the canvas bounds.
    ///
    /// Points outside the image land on its nearest edge rather than
    /// being rejected, so a stroke that wanders off the image still
    /// paints along the border.
    #[must_use]
    pub fn screen_to_canvas(&self, screen: Point, container: Rect) -> Point {
        let p = self.screen_to_canvas_unclamped(screen, container);
        Point::new(
            p.x.clamp(0.0, self.canvas.width),
            p.y.clamp(0.0, self.canvas.height),
        )
    }

    /// Map a screen-space point into canvas coordinates without clamping.
    #[must_use]
    pub fn screen_to_canvas_unclamped(&self, screen: Point, container: Rect) -> Point {
        self.state.screen_to_canvas(screen, self.canvas, container)
    }

    /// Map a canvas point to screen space.
    #[must_use]
    pub fn canvas_to_screen(&self, canvas: Point, container: Rect) -> Point {
        self.state.canvas_to_screen(canvas, self.canvas, container)
    }

    /// Pan by a screen-space delta. The delta is not divided by the
    /// zoom factor. Non-finite deltas are ignored.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }
        self.state.translate_x += dx;
        self.state.translate_y += dy;
    }

    /// Apply one pinch step and return the resulting zoom factor.
    ///
    /// The scale is multiplied by `new_distance / old_distance` and
    /// clamped. The update is skipped when `old_distance` is not
    /// positive (the two pointers coincided) or when either distance is
    /// not finite.
    pub fn pinch(&mut self, old_distance: f64, new_distance: f64) -> f64 {
        let usable = old_distance > 0.0
            && old_distance.is_finite()
            && new_distance.is_finite()
            && new_distance >= 0.0;
        if usable {
            let ratio = new_distance / old_distance;
            self.state.scale = self.limits.clamp(self.state.scale * ratio);
        }
        self.state.scale
    }

    /// Return to scale 1 (clamped) with no translation.
    pub fn reset(&mut self) {
        self.state = ViewportState {
            scale: self.limits.clamp(1.0),
            ..ViewportState::default()
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn assert_close(a: Point, b: Point) {
        assert!(
            (a.x - b.x).abs() < TOLERANCE && (a.y - b.y).abs() < TOLERANCE,
            "expected {b:?}, got {a:?}"
        );
    }

    fn viewport() -> Viewport {
        Viewport::new(Size::new(300.0, 200.0), ViewportLimits::default())
    }

    #[test]
    fn identity_maps_container_center_to_canvas_center() {
        let vp = viewport();
        let container = Rect::new(24.0, 100.0, 300.0, 200.0);
        let p = vp.screen_to_canvas(Point::new(174.0, 200.0), container);
        assert_close(p, Point::new(150.0, 100.0));
    }

    #[test]
    fn identity_maps_top_left_corner() {
        let vp = viewport();
        let container = Rect::new(24.0, 100.0, 300.0, 200.0);
        let p = vp.screen_to_canvas(Point::new(24.0, 100.0), container);
        assert_close(p, Point::new(0.0, 0.0));
    }

    #[test]
    fn forward_then_inverse_is_identity() {
        let containers = [
            Rect::new(0.0, 0.0, 300.0, 200.0),
            Rect::new(13.5, -40.0, 420.0, 380.0),
        ];
        let states = [
            ViewportState::default(),
            ViewportState {
                scale: 2.5,
                translate_x: -31.0,
                translate_y: 12.25,
            },
            ViewportState {
                scale: 0.5,
                translate_x: 1e3,
                translate_y: -7.0,
            },
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(150.0, 100.0),
            Point::new(299.9, 0.1),
            Point::new(-50.0, 412.0),
        ];
        let canvas = Size::new(300.0, 200.0);
        for container in containers {
            for state in states {
                for p in points {
                    let screen = state.canvas_to_screen(p, canvas, container);
                    let back = state.screen_to_canvas(screen, canvas, container);
                    assert_close(back, p);
                }
            }
        }
    }

    #[test]
    fn out_of_bounds_points_are_clamped() {
        let vp = viewport();
        let container = Rect::new(0.0, 0.0, 300.0, 200.0);
        assert_close(
            vp.screen_to_canvas(Point::new(-40.0, 500.0), container),
            Point::new(0.0, 200.0),
        );
        assert_close(
            vp.screen_to_canvas_unclamped(Point::new(-40.0, 500.0), container),
            Point::new(-40.0, 500.0),
        );
    }

    #[test]
    fn pan_adds_screen_delta_unscaled() {
        let mut vp = viewport();
        vp.pinch(100.0, 200.0);
        vp.pan(10.0, -4.0);
        let state = vp.state();
        assert!((state.translate_x - 10.0).abs() < TOLERANCE);
        assert!((state.translate_y + 4.0).abs() < TOLERANCE);
    }

    #[test]
    fn pan_shifts_mapping_by_delta_over_scale() {
        let mut vp = viewport();
        let container = Rect::new(0.0, 0.0, 300.0, 200.0);
        vp.pinch(1.0, 2.0);
        vp.pan(20.0, 0.0);
        // Screen center now shows the canvas point 20 / 2 = 10 px left of center.
        let p = vp.screen_to_canvas(Point::new(150.0, 100.0), container);
        assert_close(p, Point::new(140.0, 100.0));
    }

    #[test]
    fn pan_ignores_non_finite_delta() {
        let mut vp = viewport();
        vp.pan(f64::NAN, 3.0);
        assert_eq!(vp.state(), ViewportState::default());
    }

    #[test]
    fn pinch_scenario_doubles_then_clamps_to_min() {
        let mut vp = viewport();
        assert!((vp.pinch(100.0, 200.0) - 2.0).abs() < TOLERANCE);
        let expected = (2.0 * 0.1_f64).max(ViewportLimits::DEFAULT_MIN_SCALE);
        assert!((vp.pinch(100.0, 10.0) - expected).abs() < TOLERANCE);
    }

    #[test]
    fn pinch_clamps_to_max() {
        let mut vp = viewport();
        let scale = vp.pinch(10.0, 1000.0);
        assert!((scale - ViewportLimits::DEFAULT_MAX_SCALE).abs() < TOLERANCE);
    }

    #[test]
    fn pinch_with_zero_previous_distance_is_ignored() {
        let mut vp = viewport();
        assert!((vp.pinch(0.0, 50.0) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn pinch_degenerate_inputs_stay_within_limits() {
        let limits = ViewportLimits::default();
        let inputs = [
            (0.0, 0.0),
            (5.0, 5.0),
            (5.0, 0.0),
            (-1.0, 3.0),
            (3.0, -1.0),
            (f64::NAN, 1.0),
            (1.0, f64::INFINITY),
            (1e-300, 1e300),
        ];
        let mut vp = viewport();
        for (old, new) in inputs {
            let scale = vp.pinch(old, new);
            assert!(
                scale >= limits.min_scale() && scale <= limits.max_scale(),
                "scale {scale} escaped limits for pinch({old}, {new})"
            );
        }
    }

    #[test]
    fn reset_restores_identity() {
        let mut vp = viewport();
        vp.pinch(1.0, 2.0);
        vp.pan(5.0, 5.0);
        vp.reset();
        assert_eq!(vp.state(), ViewportState::default());
    }

    #[test]
    fn limits_reject_invalid_ranges() {
        assert!(ViewportLimits::new(0.0, 1.0).is_err());
        assert!(ViewportLimits::new(2.0, 1.0).is_err());
        assert!(ViewportLimits::new(0.5, f64::INFINITY).is_err());
        assert!(ViewportLimits::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn limits_deserialize_validates() {
        let ok: ViewportLimits =
            serde_json::from_str(r#"{"min_scale":0.25,"max_scale":4.0}"#).unwrap();
        assert!((ok.max_scale() - 4.0).abs() < TOLERANCE);
        let bad = serde_json::from_str::<ViewportLimits>(r#"{"min_scale":4.0,"max_scale":1.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn initial_scale_respects_limits() {
        let limits = ViewportLimits::new(1.5, 2.0).unwrap();
        let vp = Viewport::new(Size::new(10.0, 10.0), limits);
        assert!((vp.scale() - 1.5).abs() < TOLERANCE);
    }
}
