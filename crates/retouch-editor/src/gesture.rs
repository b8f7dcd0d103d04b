//! Pointer-event classification.
//!
//! [`GestureTracker`] turns raw pointer events into [`GestureAction`]s.
//! All positions stay in screen space; converting to canvas coordinates
//! is the session's job, since it owns the viewport.
//!
//! | Pointers | Tool          | Result                                   |
//! |----------|---------------|------------------------------------------|
//! | 1        | Brush, Eraser | stroke begin / extend / end              |
//! | 1        | Move          | pan by successive deltas                 |
//! | 2        | any           | pinch; an in-progress stroke is cancelled |
//!
//! After a pinch, the gesture stays inert until every pointer is lifted
//! so that the finger left on the screen does not start a stroke.

use crate::types::{EditTool, Point};

/// Host-assigned pointer identifier.
pub type PointerId = u64;

/// A raw pointer event in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// A pointer touched down.
    Down {
        /// Pointer identifier.
        id: PointerId,
        /// Screen position.
        position: Point,
    },
    /// A pointer moved.
    Move {
        /// Pointer identifier.
        id: PointerId,
        /// Screen position.
        position: Point,
    },
    /// A pointer lifted.
    Up {
        /// Pointer identifier.
        id: PointerId,
        /// Screen position.
        position: Point,
    },
    /// The host aborted the pointer (e.g. a system gesture took over).
    Cancel {
        /// Pointer identifier.
        id: PointerId,
    },
}

/// What the session should do in response to a pointer event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureAction {
    /// Nothing to do.
    None,
    /// Start a stroke at a screen position.
    StrokeBegin(Point),
    /// Extend the current stroke to a screen position.
    StrokeExtend(Point),
    /// Commit the current stroke.
    StrokeEnd,
    /// Discard the current stroke.
    StrokeCancel,
    /// Pan the viewport by a screen-space delta.
    Pan {
        /// Horizontal delta.
        dx: f64,
        /// Vertical delta.
        dy: f64,
    },
    /// Zoom by the ratio of two successive pinch distances.
    Pinch {
        /// Distance between the two pointers before this event.
        previous_distance: f64,
        /// Distance between the two pointers now.
        distance: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Idle,
    Drawing(PointerId),
    Panning(PointerId),
    Pinching {
        first: PointerId,
        second: PointerId,
        distance: f64,
    },
    /// A multi-pointer gesture ended; wait for every pointer to lift.
    Settling,
}

/// Stateful pointer-event classifier.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    pointers: Vec<(PointerId, Point)>,
    mode: Mode,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureTracker {
    /// Create an idle tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pointers: Vec::new(),
            mode: Mode::Idle,
        }
    }

    /// Number of pointers currently down.
    #[must_use]
    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// Whether a single-pointer stroke is in progress.
    #[must_use]
    pub const fn is_drawing(&self) -> bool {
        matches!(self.mode, Mode::Drawing(_))
    }

    /// Whether a two-pointer pinch is in progress.
    #[must_use]
    pub const fn is_pinching(&self) -> bool {
        matches!(self.mode, Mode::Pinching { .. })
    }

    /// Drop all tracked pointers and return to idle.
    pub fn reset(&mut self) {
        self.pointers.clear();
        self.mode = Mode::Idle;
    }

    /// Classify one event. `tool` decides what a single pointer does.
    pub fn handle(&mut self, event: PointerEvent, tool: EditTool) -> GestureAction {
        match event {
            PointerEvent::Down { id, position } => self.down(id, position, tool),
            PointerEvent::Move { id, position } => self.moved(id, position),
            PointerEvent::Up { id, position } => {
                self.set_position(id, position);
                self.lifted(id, false)
            }
            PointerEvent::Cancel { id } => self.lifted(id, true),
        }
    }

    fn position(&self, id: PointerId) -> Option<Point> {
        self.pointers
            .iter()
            .find_map(|&(pid, p)| (pid == id).then_some(p))
    }

    /// Update a pointer's position, returning the previous one.
    fn set_position(&mut self, id: PointerId, position: Point) -> Option<Point> {
        self.pointers
            .iter_mut()
            .find(|(pid, _)| *pid == id)
            .map(|(_, p)| std::mem::replace(p, position))
    }

    fn pinch_distance(&self, first: PointerId, second: PointerId) -> Option<f64> {
        Some(self.position(first)?.distance(self.position(second)?))
    }

    fn down(&mut self, id: PointerId, position: Point, tool: EditTool) -> GestureAction {
        if self.set_position(id, position).is_none() {
            self.pointers.push((id, position));
        }

        match self.mode {
            Mode::Idle if self.pointers.len() == 1 => {
                if tool.stroke_tool().is_some() {
                    self.mode = Mode::Drawing(id);
                    GestureAction::StrokeBegin(position)
                } else {
                    self.mode = Mode::Panning(id);
                    GestureAction::None
                }
            }
            Mode::Drawing(first) | Mode::Panning(first) if first != id => {
                let was_drawing = matches!(self.mode, Mode::Drawing(_));
                let distance = self.pinch_distance(first, id).unwrap_or(0.0);
                self.mode = Mode::Pinching {
                    first,
                    second: id,
                    distance,
                };
                if was_drawing {
                    GestureAction::StrokeCancel
                } else {
                    GestureAction::None
                }
            }
            _ => GestureAction::None,
        }
    }

    fn moved(&mut self, id: PointerId, position: Point) -> GestureAction {
        let Some(previous) = self.set_position(id, position) else {
            return GestureAction::None;
        };

        match self.mode {
            Mode::Drawing(active) if active == id => GestureAction::StrokeExtend(position),
            Mode::Panning(active) if active == id => GestureAction::Pan {
                dx: position.x - previous.x,
                dy: position.y - previous.y,
            },
            Mode::Pinching {
                first,
                second,
                distance: previous_distance,
            } if id == first || id == second => {
                let Some(distance) = self.pinch_distance(first, second) else {
                    return GestureAction::None;
                };
                self.mode = Mode::Pinching {
                    first,
                    second,
                    distance,
                };
                GestureAction::Pinch {
                    previous_distance,
                    distance,
                }
            }
            _ => GestureAction::None,
        }
    }

    fn lifted(&mut self, id: PointerId, cancelled: bool) -> GestureAction {
        self.pointers.retain(|&(pid, _)| pid != id);
        let none_left = self.pointers.is_empty();

        let action = match self.mode {
            Mode::Drawing(active) if active == id => {
                self.mode = Mode::Idle;
                if cancelled {
                    GestureAction::StrokeCancel
                } else {
                    GestureAction::StrokeEnd
                }
            }
            Mode::Panning(active) if active == id => {
                self.mode = Mode::Idle;
                GestureAction::None
            }
            Mode::Pinching { first, second, .. } if id == first || id == second => {
                self.mode = Mode::Settling;
                GestureAction::None
            }
            _ => GestureAction::None,
        };

        if none_left {
            self.mode = Mode::Idle;
        }
        action
    }
}
