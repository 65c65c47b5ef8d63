//! Lowering of element kinds into the geometry the encoder writes.

use kurbo::{Point, Rect};
use tracing::warn;

use crate::error::Result;
use crate::path::{self, Primitive};
use crate::style::Diagnostics;
use crate::tree::{Document, NodeId, NodeKind};

/// Radii below this are treated as square corners
const RADIUS_EPSILON: f64 = 1e-6;

/// Distance of a corner curve's control points from its end points, relative to the radius
const CORNER_CONTROL: f64 = 0.5;

/// Drawable outline of one node, in document space
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Axis-aligned rectangle with square corners
    Rectangle(Rect),
    /// Absolute path primitives
    Path(Vec<Primitive>),
    /// Closed point list
    Polygon(Vec<Point>),
    /// Open point list
    Polyline(Vec<Point>),
}

/// Builds the geometry of `id`, or `None` when the node draws nothing
pub fn lower(
    document: &Document,
    id: NodeId,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Geometry>> {
    let geometry = match &document.node(id).kind {
        NodeKind::Group { .. } | NodeKind::StyleBlock { .. } => None,
        NodeKind::Path { data } => Some(Geometry::Path(path::parse(data)?)),
        &NodeKind::Rectangle {
            x,
            y,
            width,
            height,
            radius_x,
            radius_y,
        } => Some(rectangle(
            Rect::new(x, y, x + width, y + height),
            radius_x,
            radius_y,
            diagnostics,
        )),
        &NodeKind::Circle { cx, cy, radius } => ellipse(Point::new(cx, cy), radius, radius),
        &NodeKind::Ellipse {
            cx,
            cy,
            radius_x,
            radius_y,
        } => ellipse(Point::new(cx, cy), radius_x, radius_y),
        NodeKind::Polygon { points } => {
            let points = path::parse_points(points)?;
            (!points.is_empty()).then(|| Geometry::Polygon(points))
        }
        NodeKind::Polyline { points } => {
            let points = path::parse_points(points)?;
            (!points.is_empty()).then(|| Geometry::Polyline(points))
        }
    };

    Ok(geometry)
}

/// Square rectangles stay native; rounded ones become a closed path when the radii fit
pub fn rectangle(
    rect: Rect,
    radius_x: f64,
    radius_y: f64,
    diagnostics: &mut Diagnostics,
) -> Geometry {
    if radius_x.abs() < RADIUS_EPSILON && radius_y.abs() < RADIUS_EPSILON {
        return Geometry::Rectangle(rect);
    }

    if rect.width() < 2.0 * radius_x || rect.height() < 2.0 * radius_y {
        warn!(
            "corner radius {}x{} too large for {}x{} rectangle, dropping rounded corners",
            radius_x,
            radius_y,
            rect.width(),
            rect.height()
        );
        diagnostics.warnings += 1;
        return Geometry::Rectangle(rect);
    }

    Geometry::Path(rounded_rectangle(rect, radius_x, radius_y))
}

fn rounded_rectangle(rect: Rect, rx: f64, ry: f64) -> Vec<Primitive> {
    let (left, top, right, bottom) = (rect.x0, rect.y0, rect.x1, rect.y1);
    let (cx, cy) = (CORNER_CONTROL * rx, CORNER_CONTROL * ry);

    let corner = |from: Point, control_0: (f64, f64), control_1: (f64, f64), end: Point| {
        Primitive::CubicTo {
            control_0: Point::new(from.x + control_0.0, from.y + control_0.1),
            control_1: Point::new(end.x + control_1.0, end.y + control_1.1),
            end,
        }
    };

    vec![
        Primitive::MoveTo(Point::new(left + rx, top)),
        Primitive::HorizontalTo(right - rx),
        corner(
            Point::new(right - rx, top),
            (cx, 0.0),
            (0.0, -cy),
            Point::new(right, top + ry),
        ),
        Primitive::VerticalTo(bottom - ry),
        corner(
            Point::new(right, bottom - ry),
            (0.0, cy),
            (cx, 0.0),
            Point::new(right - rx, bottom),
        ),
        Primitive::HorizontalTo(left + rx),
        corner(
            Point::new(left + rx, bottom),
            (-cx, 0.0),
            (0.0, cy),
            Point::new(left, bottom - ry),
        ),
        Primitive::VerticalTo(top + ry),
        corner(
            Point::new(left, top + ry),
            (0.0, -cy),
            (-cx, 0.0),
            Point::new(left + rx, top),
        ),
        Primitive::ClosePath,
    ]
}

/// Closed path of two half-ellipse arcs
fn ellipse(center: Point, radius_x: f64, radius_y: f64) -> Option<Geometry> {
    if radius_x <= 0.0 || radius_y <= 0.0 {
        return None;
    }

    let right = Point::new(center.x + radius_x, center.y);
    let left = Point::new(center.x - radius_x, center.y);
    let half = |end: Point| Primitive::ArcTo {
        radius_x,
        radius_y,
        rotation: 0.0,
        large_arc: false,
        sweep: true,
        end,
    };

    Some(Geometry::Path(vec![
        Primitive::MoveTo(right),
        half(left),
        half(right),
        Primitive::ClosePath,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Attributes;
    use similar_asserts::assert_eq;

    fn lower_kind(kind: NodeKind) -> (Option<Geometry>, Diagnostics) {
        let mut doc = Document::new(100, 100);
        let root = doc.root();
        let id = doc.append(root, Attributes::default(), kind).unwrap();
        let mut diagnostics = Diagnostics::default();
        let geometry = lower(&doc, id, &mut diagnostics).unwrap();

        (geometry, diagnostics)
    }

    #[test]
    fn square_rectangle_stays_native() {
        let (geometry, _) = lower_kind(NodeKind::rectangle(1.0, 2.0, 3.0, 4.0));

        assert_eq!(geometry, Some(Geometry::Rectangle(Rect::new(1.0, 2.0, 4.0, 6.0))));
    }

    #[test]
    fn rounded_rectangle_becomes_path() {
        let (geometry, diagnostics) = lower_kind(NodeKind::Rectangle {
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 10.0,
            radius_x: 4.0,
            radius_y: 2.0,
        });

        let primitives = match geometry {
            Some(Geometry::Path(primitives)) => primitives,
            other => panic!("expected path, got {:?}", other),
        };

        assert_eq!(primitives.len(), 10);
        assert_eq!(primitives[0], Primitive::MoveTo(Point::new(4.0, 0.0)));
        assert_eq!(primitives[1], Primitive::HorizontalTo(16.0));
        assert_eq!(
            primitives[2],
            Primitive::CubicTo {
                control_0: Point::new(18.0, 0.0),
                control_1: Point::new(20.0, 1.0),
                end: Point::new(20.0, 2.0),
            }
        );
        assert_eq!(primitives[9], Primitive::ClosePath);
        assert_eq!(
            primitives[8],
            Primitive::CubicTo {
                control_0: Point::new(0.0, 1.0),
                control_1: Point::new(2.0, 0.0),
                end: Point::new(4.0, 0.0),
            }
        );
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn oversized_radius_falls_back_to_square_corners() {
        let (geometry, diagnostics) = lower_kind(NodeKind::Rectangle {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            radius_x: 60.0,
            radius_y: 60.0,
        });

        assert_eq!(
            geometry,
            Some(Geometry::Rectangle(Rect::new(0.0, 0.0, 100.0, 100.0)))
        );
        assert_eq!(diagnostics.warnings, 1);
    }

    #[test]
    fn circle_is_two_arcs() {
        let (geometry, _) = lower_kind(NodeKind::Circle {
            cx: 10.0,
            cy: 10.0,
            radius: 5.0,
        });

        match geometry {
            Some(Geometry::Path(primitives)) => {
                assert_eq!(primitives.len(), 4);
                assert_eq!(primitives[0], Primitive::MoveTo(Point::new(15.0, 10.0)));
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn degenerate_shapes_draw_nothing() {
        let (geometry, _) = lower_kind(NodeKind::Ellipse {
            cx: 0.0,
            cy: 0.0,
            radius_x: 0.0,
            radius_y: 3.0,
        });
        assert_eq!(geometry, None);

        let (geometry, _) = lower_kind(NodeKind::Polygon {
            points: " ".into(),
        });
        assert_eq!(geometry, None);
    }

    #[test]
    fn polyline_points() {
        let (geometry, _) = lower_kind(NodeKind::Polyline {
            points: "0,0 5,5 10,0".into(),
        });

        assert_eq!(
            geometry,
            Some(Geometry::Polyline(vec![
                Point::new(0.0, 0.0),
                Point::new(5.0, 5.0),
                Point::new(10.0, 0.0),
            ]))
        );
    }

    #[test]
    fn malformed_path_data_is_an_error() {
        let mut doc = Document::new(10, 10);
        let root = doc.root();
        let id = doc
            .append(root, Attributes::default(), NodeKind::path("M 0 0 L 1"))
            .unwrap();

        assert!(lower(&doc, id, &mut Diagnostics::default()).is_err());
    }
}
