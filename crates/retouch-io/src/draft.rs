//! Saved editing state: source image, strokes and model choice.

use std::path::PathBuf;

use retouch_editor::StrokeLog;
use serde::{Deserialize, Serialize};

use crate::api::InpaintModel;

/// An editing session that can be written out and resumed later.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Draft {
    /// The image being edited.
    pub source_path: PathBuf,
    /// Committed strokes, in canvas space of the displayed image.
    pub strokes: StrokeLog,
    /// Model to submit with.
    #[serde(default)]
    pub model: InpaintModel,
}

impl Draft {
    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a draft, validating every stroke.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] for malformed JSON, empty
    /// strokes or invalid widths.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use retouch_editor::{Brush, BrushWidth, Point, Stroke, StrokeTool};

    use super::*;

    #[test]
    fn round_trip() {
        let stroke = Stroke::new(
            Brush::new(StrokeTool::Brush, BrushWidth::new(12.0).unwrap()),
            vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)],
        )
        .unwrap();
        let draft = Draft {
            source_path: "beach.jpg".into(),
            strokes: std::iter::once(stroke).collect(),
            model: InpaintModel::Ldm,
        };
        let back = Draft::from_json(&draft.to_json().unwrap()).unwrap();
        assert_eq!(back, draft);
    }

    #[test]
    fn model_defaults_to_lama() {
        let draft =
            Draft::from_json(r#"{"source_path": "a.png", "strokes": {"strokes": []}}"#).unwrap();
        assert_eq!(draft.model, InpaintModel::Lama);
        assert!(draft.strokes.is_empty());
    }
}
