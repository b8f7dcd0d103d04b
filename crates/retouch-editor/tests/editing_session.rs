//! Integration test: drive an editor session with pointer events, then
//! check that the exported mask matches a replay of the saved strokes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use retouch_editor::{
    Dimensions, EditTool, EditorSession, ImageDescriptor, Point, PointerEvent, Rect, Size,
    StrokeLog, ViewportLimits,
};

const CONTAINER: Rect = Rect::new(24.0, 120.0, 327.0, 327.0);

fn touch(session: &mut EditorSession, id: u64, path: &[(f64, f64)]) {
    let mut points = path.iter().map(|&(x, y)| Point::new(x, y));
    let first = points.next().unwrap();
    session.handle_pointer(PointerEvent::Down { id, position: first }, CONTAINER);
    let mut last = first;
    for p in points {
        session.handle_pointer(PointerEvent::Move { id, position: p }, CONTAINER);
        last = p;
    }
    session.handle_pointer(PointerEvent::Up { id, position: last }, CONTAINER);
}

#[test]
fn mask_survives_draft_round_trip() {
    let descriptor = ImageDescriptor::contain(
        "holiday.jpg",
        Dimensions::new(4000, 3000),
        Size::new(CONTAINER.width, CONTAINER.height),
    )
    .unwrap();
    assert_eq!(descriptor.display(), Dimensions::new(327, 245));

    let mut session = EditorSession::new(descriptor.clone(), ViewportLimits::default()).unwrap();

    touch(&mut session, 1, &[(60.0, 200.0), (120.0, 240.0), (200.0, 260.0)]);
    session.set_brush_width(24.0).unwrap();
    touch(&mut session, 2, &[(150.0, 300.0), (300.0, 310.0)]);
    session.set_tool(EditTool::Eraser);
    session.set_brush_width(8.0).unwrap();
    touch(&mut session, 3, &[(100.0, 180.0), (100.0, 340.0)]);
    // A tap paints a dot.
    session.set_tool(EditTool::Brush);
    touch(&mut session, 4, &[(250.0, 200.0)]);

    assert_eq!(session.strokes().len(), 4);
    let exported = session.export_mask_png().unwrap();

    let json = serde_json::to_string(session.strokes()).unwrap();
    let restored: StrokeLog = serde_json::from_str(&json).unwrap();
    let replayed = retouch_editor::render_mask_png(&restored, descriptor.display()).unwrap();
    assert_eq!(exported, replayed);

    let mask = image::load_from_memory(&exported).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (327, 245));
    assert!(mask.pixels().any(|p| p[0] == 255));
}

#[test]
fn pinch_then_draw_lands_inside_the_canvas() {
    let descriptor =
        ImageDescriptor::contain("wide.png", Dimensions::new(800, 400), Size::new(327.0, 327.0))
            .unwrap();
    let mut session = EditorSession::new(descriptor, ViewportLimits::default()).unwrap();

    let a = Point::new(150.0, 280.0);
    session.handle_pointer(PointerEvent::Down { id: 1, position: a }, CONTAINER);
    session.handle_pointer(
        PointerEvent::Down {
            id: 2,
            position: Point::new(200.0, 280.0),
        },
        CONTAINER,
    );
    session.handle_pointer(
        PointerEvent::Move {
            id: 2,
            position: Point::new(400.0, 280.0),
        },
        CONTAINER,
    );
    assert!((session.viewport().scale() - 3.0).abs() < 1e-9);
    session.handle_pointer(PointerEvent::Cancel { id: 1 }, CONTAINER);
    session.handle_pointer(PointerEvent::Cancel { id: 2 }, CONTAINER);
    assert!(session.strokes().is_empty());

    // Drag far outside the container: the points clamp to the canvas edge.
    touch(&mut session, 3, &[(0.0, 0.0), (2000.0, 2000.0)]);
    let stroke = &session.strokes().strokes()[0];
    let display = session.descriptor().display().as_size();
    for p in stroke.points() {
        assert!(p.x >= 0.0 && p.x <= display.width);
        assert!(p.y >= 0.0 && p.y <= display.height);
    }
    assert_eq!(*stroke.points().last().unwrap(), Point::new(display.width, display.height));
}
