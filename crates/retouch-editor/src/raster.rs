//! Mask rasterization: render committed strokes onto an RGBA surface
//! and derive the binary mask from it.
//!
//! Two drawing modes share the same primitive ([`MaskRasterizer::apply`]):
//!
//! - **incremental**: composite each stroke as it is committed;
//! - **full**: clear and replay the whole [`StrokeLog`] in order.
//!
//! Both issue identical draw calls in identical order, so they produce
//! byte-identical surfaces. Eraser strokes composite destination-out,
//! which cannot be undone incrementally: after `undo` or `clear` the
//! caller must [`render`](MaskRasterizer::render) again.
//!
//! Strokes are drawn without anti-aliasing. Coverage is then all or
//! nothing per pixel, so an eraser retracing a brush stroke at the same
//! width clears exactly the pixels the brush set and leaves no partial
//! edge for the binary mask to pick up.

use image::{ImageEncoder, Rgba};
use tiny_skia::{
    BlendMode, Color, FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Transform,
};

use crate::stroke::{Stroke, StrokeLog, StrokeTool};
use crate::types::{Dimensions, EditorError, GrayImage, RgbaImage};

/// Color of brush strokes: `rgba(239, 68, 68, 0.8)`.
pub const BRUSH_COLOR: [u8; 4] = [239, 68, 68, 204];

/// Value of marked pixels in the exported mask.
pub const MASK_ON: u8 = 255;

/// An RGBA drawing surface sized to the displayed image.
#[derive(Debug, Clone)]
pub struct MaskRasterizer {
    surface: Pixmap,
    dimensions: Dimensions,
}

impl MaskRasterizer {
    /// Allocate a transparent surface.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Surface`] if either side is zero or the
    /// surface is too large to allocate.
    pub fn new(dimensions: Dimensions) -> Result<Self, EditorError> {
        let surface =
            Pixmap::new(dimensions.width, dimensions.height).ok_or(EditorError::Surface {
                width: dimensions.width,
                height: dimensions.height,
            })?;
        Ok(Self {
            surface,
            dimensions,
        })
    }

    /// Surface size in pixels.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Erase everything.
    pub fn clear(&mut self) {
        self.surface.fill(Color::TRANSPARENT);
    }

    /// Full mode: clear, then replay every committed stroke in order.
    pub fn render(&mut self, log: &StrokeLog) {
        self.clear();
        for stroke in log {
            self.apply(stroke);
        }
        tracing::debug!(
            strokes = log.len(),
            width = self.dimensions.width,
            height = self.dimensions.height,
            "rendered stroke log"
        );
    }

    /// Incremental mode: composite one committed stroke onto the
    /// current surface.
    ///
    /// A stroke whose points all coincide paints a round dot with the
    /// stroke's width as diameter. Any other stroke is a polyline with
    /// round caps and joins.
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(&mut self, stroke: &Stroke) {
        let paint = paint_for(stroke.tool());
        let width = stroke.width().get() as f32;

        if stroke.is_dot() {
            let Some(center) = stroke.points().first() else {
                return;
            };
            if let Some(dot) = PathBuilder::from_circle(center.x as f32, center.y as f32, width / 2.0)
            {
                self.surface.fill_path(
                    &dot,
                    &paint,
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
            return;
        }

        let Some(path) = polyline(stroke) else {
            return;
        };
        let pen = tiny_skia::Stroke {
            width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..tiny_skia::Stroke::default()
        };
        self.surface
            .stroke_path(&path, &paint, &pen, Transform::identity(), None);
    }

    /// Number of pixels with any remaining coverage.
    #[must_use]
    pub fn coverage(&self) -> usize {
        self.surface
            .pixels()
            .iter()
            .filter(|p| p.alpha() > 0)
            .count()
    }

    /// Whether no pixel carries coverage.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.surface.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Binary mask: [`MASK_ON`] where any coverage remains, 0 elsewhere.
    #[must_use]
    pub fn mask_image(&self) -> GrayImage {
        let raw = self
            .surface
            .pixels()
            .iter()
            .map(|p| if p.alpha() > 0 { MASK_ON } else { 0 })
            .collect();
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }

    /// Straight-alpha RGBA copy of the surface, for previews.
    #[must_use]
    pub fn overlay_image(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.dimensions.width, self.dimensions.height);
        for (out, px) in img.pixels_mut().zip(self.surface.pixels()) {
            let c = px.demultiply();
            *out = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        img
    }

    /// Encode the binary mask as an 8-bit grayscale PNG.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Image`] if PNG encoding fails.
    pub fn export_png(&self) -> Result<Vec<u8>, EditorError> {
        let mask = self.mask_image();
        let mut png_bytes = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder.write_image(
            mask.as_raw(),
            mask.width(),
            mask.height(),
            image::ExtendedColorType::L8,
        )?;
        Ok(png_bytes)
    }
}

fn paint_for(tool: StrokeTool) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.anti_alias = false;
    match tool {
        StrokeTool::Brush => {
            let [r, g, b, a] = BRUSH_COLOR;
            paint.set_color_rgba8(r, g, b, a);
            paint.blend_mode = BlendMode::SourceOver;
        }
        StrokeTool::Eraser => {
            paint.set_color_rgba8(0, 0, 0, 255);
            paint.blend_mode = BlendMode::DestinationOut;
        }
    }
    paint
}

#[allow(clippy::cast_possible_truncation)]
fn polyline(stroke: &Stroke) -> Option<Path> {
    let (first, rest) = stroke.points().split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stroke::{Brush, BrushWidth};
    use crate::types::Point;

    fn stroke(tool: StrokeTool, width: f64, points: &[(f64, f64)]) -> Stroke {
        Stroke::new(
            Brush::new(tool, BrushWidth::new(width).unwrap()),
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        )
        .unwrap()
    }

    fn surface() -> MaskRasterizer {
        MaskRasterizer::new(Dimensions::new(64, 48)).unwrap()
    }

    #[test]
    fn zero_sized_surface_is_an_error() {
        assert!(matches!(
            MaskRasterizer::new(Dimensions::new(0, 10)),
            Err(EditorError::Surface { .. })
        ));
    }

    #[test]
    fn new_surface_is_blank() {
        let r = surface();
        assert!(r.is_blank());
        assert_eq!(r.coverage(), 0);
    }

    #[test]
    fn brush_paints_translucent_red() {
        let mut r = surface();
        r.apply(&stroke(StrokeTool::Brush, 10.0, &[(10.0, 20.0), (50.0, 20.0)]));
        let overlay = r.overlay_image();
        let px = overlay.get_pixel(30, 20);
        assert!(px[3].abs_diff(BRUSH_COLOR[3]) <= 1);
        assert!(px[0].abs_diff(BRUSH_COLOR[0]) <= 1);
        assert!(px[1].abs_diff(BRUSH_COLOR[1]) <= 1);
        assert_eq!(overlay.get_pixel(30, 40)[3], 0);
    }

    #[test]
    fn single_point_paints_a_dot() {
        let mut r = surface();
        r.apply(&stroke(StrokeTool::Brush, 10.0, &[(20.0, 20.0)]));
        let mask = r.mask_image();
        assert_eq!(mask.get_pixel(20, 20)[0], MASK_ON);
        assert_eq!(mask.get_pixel(23, 20)[0], MASK_ON);
        assert_eq!(mask.get_pixel(30, 20)[0], 0);
    }

    #[test]
    fn eraser_removes_coverage() {
        let points = [(10.0, 10.0), (40.0, 30.0)];
        let mut r = surface();
        r.apply(&stroke(StrokeTool::Brush, 10.0, &points));
        assert!(!r.is_blank());
        r.apply(&stroke(StrokeTool::Eraser, 20.0, &points));
        assert!(r.is_blank());
    }

    #[test]
    fn same_width_eraser_clears_its_brush_stroke() {
        let paths: [&[(f64, f64)]; 3] = [
            &[(10.0, 10.0), (50.0, 10.0)],
            &[(10.3, 10.7), (50.2, 30.9)],
            &[(20.0, 20.0)],
        ];
        for points in paths {
            let brush = stroke(StrokeTool::Brush, 10.0, points);
            let eraser = stroke(StrokeTool::Eraser, 10.0, points);

            let mut incremental = surface();
            incremental.apply(&brush);
            assert!(incremental.coverage() > 0, "{points:?}");
            incremental.apply(&eraser);
            assert!(incremental.is_blank(), "{points:?}");
            assert!(incremental.mask_image().pixels().all(|p| p[0] == 0));

            let log: StrokeLog = [brush, eraser].into_iter().collect();
            let mut replayed = surface();
            replayed.render(&log);
            assert!(replayed.is_blank(), "{points:?}");
            assert!(replayed.mask_image().pixels().all(|p| p[0] == 0));
        }
    }

    #[test]
    fn surface_alpha_is_all_or_nothing() {
        let mut r = surface();
        r.apply(&stroke(StrokeTool::Brush, 7.5, &[(3.3, 4.4), (50.1, 30.7)]));
        assert!(
            r.surface
                .pixels()
                .iter()
                .all(|p| p.alpha() == 0 || p.alpha() == BRUSH_COLOR[3])
        );
    }

    #[test]
    fn replay_matches_incremental() {
        let strokes = [
            stroke(StrokeTool::Brush, 8.0, &[(5.0, 5.0), (30.0, 12.0), (60.0, 40.0)]),
            stroke(StrokeTool::Eraser, 6.0, &[(0.0, 10.0), (64.0, 10.0)]),
            stroke(StrokeTool::Brush, 3.0, &[(32.0, 24.0)]),
            stroke(StrokeTool::Brush, 12.0, &[(50.0, 5.0), (10.0, 45.0)]),
        ];
        let mut incremental = surface();
        for s in &strokes {
            incremental.apply(s);
        }
        let log: StrokeLog = strokes.into_iter().collect();
        let mut replayed = surface();
        replayed.render(&log);
        assert_eq!(incremental.surface.data(), replayed.surface.data());
    }

    #[test]
    fn render_after_undo_matches_surface_without_stroke() {
        let a = stroke(StrokeTool::Brush, 10.0, &[(5.0, 5.0), (40.0, 5.0)]);
        let b = stroke(StrokeTool::Eraser, 10.0, &[(20.0, 0.0), (20.0, 40.0)]);
        let mut log: StrokeLog = [a.clone(), b].into_iter().collect();
        log.undo();

        let mut after_undo = surface();
        after_undo.render(&log);
        let mut only_a = surface();
        only_a.apply(&a);
        assert_eq!(after_undo.surface.data(), only_a.surface.data());
    }

    #[test]
    fn mask_is_binary() {
        let mut r = surface();
        r.apply(&stroke(StrokeTool::Brush, 7.5, &[(3.3, 4.4), (50.1, 30.7)]));
        assert!(r.mask_image().pixels().all(|p| p[0] == 0 || p[0] == MASK_ON));
    }

    #[test]
    fn export_png_round_trips_dimensions() {
        let mut r = surface();
        r.apply(&stroke(StrokeTool::Brush, 10.0, &[(10.0, 10.0)]));
        let png = r.export_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(decoded, r.mask_image());
    }
}
