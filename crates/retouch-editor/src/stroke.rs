//! Stroke model: committed strokes, the in-progress stroke, and undo.
//!
//! A [`Stroke`] is immutable once committed. Its tool and width are a
//! snapshot of the [`Brush`] at commit time, so later changes to the
//! brush never alter strokes already in the [`StrokeLog`].

use serde::{Deserialize, Serialize};

use crate::types::{EditorError, Point};

/// What a stroke does to the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    /// Paint coverage.
    #[default]
    Brush,
    /// Remove coverage painted by earlier strokes.
    Eraser,
}

/// A validated stroke width in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct BrushWidth(f64);

impl BrushWidth {
    /// Width used when the editor starts.
    pub const DEFAULT: Self = Self(10.0);

    /// Validate a width.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidBrushWidth`] if `width` is zero,
    /// negative, or not finite.
    pub fn new(width: f64) -> Result<Self, EditorError> {
        if width.is_finite() && width > 0.0 {
            Ok(Self(width))
        } else {
            Err(EditorError::InvalidBrushWidth(width))
        }
    }

    /// The width as a plain number.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl Default for BrushWidth {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for BrushWidth {
    type Error = EditorError;

    fn try_from(width: f64) -> Result<Self, Self::Error> {
        Self::new(width)
    }
}

impl From<BrushWidth> for f64 {
    fn from(width: BrushWidth) -> Self {
        width.0
    }
}

/// Tool and width applied to the next committed stroke.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Brush {
    /// Paint or erase.
    pub tool: StrokeTool,
    /// Stroke width.
    pub width: BrushWidth,
}

impl Brush {
    /// Create a brush.
    #[must_use]
    pub const fn new(tool: StrokeTool, width: BrushWidth) -> Self {
        Self { tool, width }
    }
}

/// One committed drawing gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrokeRepr")]
pub struct Stroke {
    tool: StrokeTool,
    width: BrushWidth,
    points: Vec<Point>,
}

impl Stroke {
    /// Build a stroke from its parts. Returns `None` when `points` is
    /// empty.
    #[must_use]
    pub fn new(brush: Brush, points: Vec<Point>) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self {
            tool: brush.tool,
            width: brush.width,
            points,
        })
    }

    /// The tool this stroke was committed with.
    #[must_use]
    pub const fn tool(&self) -> StrokeTool {
        self.tool
    }

    /// The width this stroke was committed with.
    #[must_use]
    pub const fn width(&self) -> BrushWidth {
        self.width
    }

    /// The stroke's points in drawing order. Never empty.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Whether the stroke is a single dot (all points coincide).
    #[must_use]
    pub fn is_dot(&self) -> bool {
        match self.points.split_first() {
            Some((first, rest)) => rest.iter().all(|p| p == first),
            None => true,
        }
    }
}

#[derive(Deserialize)]
struct StrokeRepr {
    tool: StrokeTool,
    width: BrushWidth,
    points: Vec<Point>,
}

/// Error returned when a deserialized stroke has no points.
#[derive(Debug, thiserror::Error)]
#[error("a stroke must contain at least one point")]
pub struct EmptyStrokeError;

impl TryFrom<StrokeRepr> for Stroke {
    type Error = EmptyStrokeError;

    fn try_from(repr: StrokeRepr) -> Result<Self, Self::Error> {
        Self::new(Brush::new(repr.tool, repr.width), repr.points).ok_or(EmptyStrokeError)
    }
}

/// Ordered list of committed strokes plus at most one in-progress
/// stroke.
///
/// Insertion order is drawing order and undo order. Only the committed
/// strokes are serialized; an in-progress stroke is transient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeLog {
    strokes: Vec<Stroke>,
    #[serde(skip)]
    pending: Option<Vec<Point>>,
}

impl StrokeLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            strokes: Vec::new(),
            pending: None,
        }
    }

    /// Start a new in-progress stroke, discarding any previous one.
    pub fn begin(&mut self, point: Point) {
        self.pending = Some(vec![point]);
    }

    /// Extend the in-progress stroke, starting one if none exists.
    pub fn append(&mut self, point: Point) {
        self.pending.get_or_insert_with(Vec::new).push(point);
    }

    /// Finalize the in-progress stroke with `brush` and push it onto
    /// the log. Returns the committed stroke, or `None` when nothing
    /// was in progress.
    pub fn commit(&mut self, brush: Brush) -> Option<&Stroke> {
        let points = self.pending.take()?;
        let stroke = Stroke::new(brush, points)?;
        self.strokes.push(stroke);
        self.strokes.last()
    }

    /// Discard the in-progress stroke.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Whether a stroke is in progress.
    #[must_use]
    pub const fn is_drawing(&self) -> bool {
        self.pending.is_some()
    }

    /// Points of the in-progress stroke, if any.
    #[must_use]
    pub fn pending_points(&self) -> Option<&[Point]> {
        self.pending.as_deref()
    }

    /// Remove and return the most recently committed stroke.
    pub fn undo(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    /// Remove every stroke, including one in progress.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.pending = None;
    }

    /// Committed strokes in drawing order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Number of committed strokes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.strokes.len()
    }

    /// Whether no stroke has been committed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Iterate over committed strokes in drawing order.
    pub fn iter(&self) -> std::slice::Iter<'_, Stroke> {
        self.strokes.iter()
    }
}

impl<'a> IntoIterator for &'a StrokeLog {
    type Item = &'a Stroke;
    type IntoIter = std::slice::Iter<'a, Stroke>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Stroke> for StrokeLog {
    fn from_iter<I: IntoIterator<Item = Stroke>>(iter: I) -> Self {
        Self {
            strokes: iter.into_iter().collect(),
            pending: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn brush(width: f64) -> Brush {
        Brush::new(StrokeTool::Brush, BrushWidth::new(width).unwrap())
    }

    #[test]
    fn brush_width_rejects_bad_values() {
        assert!(BrushWidth::new(0.0).is_err());
        assert!(BrushWidth::new(-3.0).is_err());
        assert!(BrushWidth::new(f64::NAN).is_err());
        assert!(BrushWidth::new(f64::INFINITY).is_err());
        assert!((BrushWidth::new(0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn commit_without_begin_is_none() {
        let mut log = StrokeLog::new();
        assert!(log.commit(brush(10.0)).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn begin_append_commit() {
        let mut log = StrokeLog::new();
        log.begin(Point::new(1.0, 1.0));
        log.append(Point::new(2.0, 2.0));
        assert!(log.is_drawing());
        assert_eq!(log.pending_points().unwrap().len(), 2);

        let stroke = log.commit(brush(10.0)).unwrap();
        assert_eq!(stroke.points().len(), 2);
        assert_eq!(stroke.tool(), StrokeTool::Brush);
        assert!(!log.is_drawing());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn append_without_begin_starts_a_stroke() {
        let mut log = StrokeLog::new();
        log.append(Point::new(4.0, 4.0));
        assert_eq!(log.commit(brush(1.0)).unwrap().points(), &[Point::new(4.0, 4.0)]);
    }

    #[test]
    fn width_is_snapshotted_at_commit() {
        let mut log = StrokeLog::new();
        let mut current = brush(10.0);
        log.begin(Point::new(0.0, 0.0));
        log.commit(current);
        current.width = BrushWidth::new(40.0).unwrap();
        log.begin(Point::new(5.0, 5.0));
        log.commit(current);

        let widths: Vec<f64> = log.iter().map(|s| s.width().get()).collect();
        assert_eq!(widths, vec![10.0, 40.0]);
    }

    #[test]
    fn cancel_discards_pending() {
        let mut log = StrokeLog::new();
        log.begin(Point::new(0.0, 0.0));
        log.cancel();
        assert!(log.commit(brush(10.0)).is_none());
    }

    #[test]
    fn undo_is_lifo_and_noop_when_empty() {
        let mut log = StrokeLog::new();
        assert!(log.undo().is_none());

        for x in [1.0, 2.0, 3.0] {
            log.begin(Point::new(x, 0.0));
            log.commit(brush(x));
        }
        let undone = log.undo().unwrap();
        assert_eq!(undone.points()[0], Point::new(3.0, 0.0));
        assert_eq!(log.len(), 2);
        assert_eq!(log.strokes()[1].points()[0], Point::new(2.0, 0.0));
    }

    #[test]
    fn clear_empties_everything() {
        let mut log = StrokeLog::new();
        log.begin(Point::new(0.0, 0.0));
        log.commit(brush(1.0));
        log.begin(Point::new(1.0, 0.0));
        log.clear();
        assert!(log.is_empty());
        assert!(!log.is_drawing());
    }

    #[test]
    fn dot_detection() {
        let p = Point::new(3.0, 3.0);
        assert!(Stroke::new(brush(1.0), vec![p, p]).unwrap().is_dot());
        assert!(
            !Stroke::new(brush(1.0), vec![p, Point::new(4.0, 3.0)])
                .unwrap()
                .is_dot()
        );
        assert!(Stroke::new(brush(1.0), vec![]).is_none());
    }

    #[test]
    fn serialized_log_omits_pending_stroke() {
        let mut log = StrokeLog::new();
        log.begin(Point::new(1.0, 2.0));
        log.commit(Brush::new(StrokeTool::Eraser, BrushWidth::new(20.0).unwrap()));
        log.begin(Point::new(9.0, 9.0));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "strokes": [
                    {"tool": "eraser", "width": 20.0, "points": [{"x": 1.0, "y": 2.0}]}
                ]
            })
        );

        let back: StrokeLog = serde_json::from_value(json).unwrap();
        assert_eq!(back.strokes(), log.strokes());
        assert!(!back.is_drawing());
    }

    #[test]
    fn deserialize_rejects_empty_stroke_and_bad_width() {
        let empty = r#"{"strokes":[{"tool":"brush","width":5.0,"points":[]}]}"#;
        assert!(serde_json::from_str::<StrokeLog>(empty).is_err());
        let bad_width = r#"{"strokes":[{"tool":"brush","width":0.0,"points":[{"x":0,"y":0}]}]}"#;
        assert!(serde_json::from_str::<StrokeLog>(bad_width).is_err());
    }
}
