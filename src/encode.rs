//! Binary encoder and the scale-fit retry loop.
//!
//! Coordinates are written as fixed-point signed 16 bit units. The encoder starts at
//! the finest scale the image size allows and, whenever a value does not fit, throws
//! the buffer away and starts over one scale step coarser.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use kurbo::{Point, Rect};
use packed_struct::prelude::*;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format::{
    CommandKind, CountAndStyle, ScaleProperties, SegmentOpcode, MAGIC, MAX_RECORD_LEN,
    MAX_SCALE, VERSION,
};
use crate::geometry::{self, Geometry};
use crate::path::{self, Primitive, SubPath};
use crate::style::{ClosedColorTable, Diagnostics, ResolvedStyle, StyleRef, StyleSheet};
use crate::tree::{Document, NodeId};

/// Per-document parameters of an encode attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Analysis {
    /// Canvas width in pixels
    pub width: u16,
    /// Canvas height in pixels
    pub height: u16,
    /// Document-space rectangle mapped onto `width` x `height`
    pub viewport: Rect,
    /// Scale exponent of the attempt
    pub scale: u8,
}

impl Analysis {
    /// Checks the canvas size and picks the initial scale
    pub fn new(document: &Document) -> Result<Self> {
        let too_large = || Error::DimensionsTooLarge {
            width: document.width,
            height: document.height,
        };
        let width = u16::try_from(document.width).map_err(|_| too_large())?;
        let height = u16::try_from(document.height).map_err(|_| too_large())?;

        let viewport = document.viewport();
        if viewport.width() <= 0.0 || viewport.height() <= 0.0 {
            return Err(Error::Schema(format!("empty viewport {:?}", viewport)));
        }

        Ok(Analysis {
            width,
            height,
            viewport,
            scale: initial_scale(width, height),
        })
    }

    /// Same parameters at another scale
    pub fn with_scale(self, scale: u8) -> Self {
        Analysis { scale, ..self }
    }

    fn factor_x(&self) -> f64 {
        self.width as f64 / self.viewport.width()
    }

    fn factor_y(&self) -> f64 {
        self.height as f64 / self.viewport.height()
    }

    /// Maps a document x coordinate onto the canvas
    pub fn map_x(&self, x: f64) -> f64 {
        (x - self.viewport.x0) * self.factor_x()
    }

    /// Maps a document y coordinate onto the canvas
    pub fn map_y(&self, y: f64) -> f64 {
        (y - self.viewport.y0) * self.factor_y()
    }

    /// Maps a point of document space into image space
    pub fn map_point(&self, point: Point) -> Point {
        Point::new(self.map_x(point.x), self.map_y(point.y))
    }
}

/// Finest scale exponent that keeps the larger image side inside the 16 bit range
pub fn initial_scale(width: u16, height: u16) -> u8 {
    let extent = u32::from(width.max(height));

    (0..=MAX_SCALE)
        .rev()
        .find(|&scale| extent << (scale + 1) < 32768)
        .unwrap_or(0)
}

/// A drawable node ready for encoding
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    /// Source node
    pub id: NodeId,
    /// Lowered geometry in document space
    pub geometry: Geometry,
    /// Inherited paints
    pub style: ResolvedStyle,
}

/// Lowers every painted node of `document`, in document order
pub fn collect_shapes(
    document: &Document,
    sheet: &StyleSheet,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Shape>> {
    let mut shapes = Vec::new();

    for id in document.descendants() {
        if !document.node(id).kind.is_drawable() {
            continue;
        }

        let style = sheet.resolved(document, id);
        if style.fill.is_none() && style.stroke.is_none() {
            continue;
        }

        let gradient = [&style.fill, &style.stroke].iter().any(|paint| {
            matches!(
                paint,
                Some(StyleRef::LinearGradient | StyleRef::RadialGradient)
            )
        });
        if gradient {
            warn!(node = id.index(), "gradient paints are not supported, skipping shape");
            diagnostics.skipped_shapes += 1;
            continue;
        }

        if let Some(geometry) = geometry::lower(document, id, diagnostics)? {
            shapes.push(Shape {
                id,
                geometry,
                style,
            });
        }
    }

    Ok(shapes)
}

/// Output of a successful encode
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// Complete file
    pub bytes: Vec<u8>,
    /// Scale exponent of the successful attempt
    pub scale: u8,
    /// Attempts made, the successful one included
    pub attempts: u32,
}

/// Encodes `shapes`, lowering the scale exponent until every coordinate fits
pub fn encode(analysis: &Analysis, table: &ClosedColorTable, shapes: &[Shape]) -> Result<Encoded> {
    let mut scale = analysis.scale;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match Encoder::new(analysis.with_scale(scale), table).encode(shapes) {
            Ok(bytes) => {
                return Ok(Encoded {
                    bytes,
                    scale,
                    attempts,
                })
            }
            Err(Error::RangeOverflow { value, .. }) if scale > 0 => {
                debug!(value, scale, "coordinate out of range, retrying at a coarser scale");
                scale -= 1;
            }
            Err(Error::RangeOverflow { value, .. }) => {
                return Err(Error::PrecisionExhausted { value })
            }
            Err(err) => return Err(err),
        }
    }
}

/// How a record is painted
#[derive(Debug, Clone, Copy)]
enum Paint<'s> {
    Fill(&'s StyleRef),
    Line(&'s StyleRef, f64),
    Outline(&'s StyleRef, &'s StyleRef, f64),
}

impl<'s> Paint<'s> {
    fn of(style: &'s ResolvedStyle) -> Option<Self> {
        match (&style.fill, &style.stroke) {
            (Some(fill), None) => Some(Paint::Fill(fill)),
            (None, Some(line)) => Some(Paint::Line(line, style.line_width)),
            (Some(fill), Some(line)) => Some(Paint::Outline(fill, line, style.line_width)),
            (None, None) => None,
        }
    }

    fn pick(self, fill: CommandKind, line: CommandKind, outline: CommandKind) -> CommandKind {
        match self {
            Paint::Fill(_) => fill,
            Paint::Line(..) => line,
            Paint::Outline(..) => outline,
        }
    }
}

/// A single encode attempt at a fixed scale
pub struct Encoder<'a> {
    analysis: Analysis,
    table: &'a ClosedColorTable,
    out: Vec<u8>,
}

impl<'a> Encoder<'a> {
    /// Encoder writing at `analysis.scale`
    pub fn new(analysis: Analysis, table: &'a ClosedColorTable) -> Self {
        Encoder {
            analysis,
            table,
            out: Vec::new(),
        }
    }

    /// Writes a complete file, failing with [`Error::RangeOverflow`] on the first value
    /// that does not fit
    pub fn encode(mut self, shapes: &[Shape]) -> Result<Vec<u8>> {
        self.write_header()?;

        for shape in shapes {
            self.write_shape(shape)?;
        }

        self.out.write_u8(CommandKind::EndOfDocument as u8)?;

        Ok(self.out)
    }

    fn write_header(&mut self) -> Result<()> {
        let [scale_properties] = ScaleProperties::new(self.analysis.scale).pack()?;
        let colors = self.table.colors();
        let color_count =
            u16::try_from(colors.len()).map_err(|_| Error::RecordTooLarge(colors.len()))?;

        self.out.write_all(&MAGIC)?;
        self.out.write_u8(VERSION)?;
        self.out.write_u8(scale_properties)?;
        self.out.write_u16::<LittleEndian>(self.analysis.width)?;
        self.out.write_u16::<LittleEndian>(self.analysis.height)?;
        self.out.write_u16::<LittleEndian>(color_count)?;

        for color in colors {
            let (r, g, b, a) = color.as_rgba8();
            self.out.write_all(&[r, g, b, a])?;
        }

        Ok(())
    }

    fn write_shape(&mut self, shape: &Shape) -> Result<()> {
        let paint = match Paint::of(&shape.style) {
            Some(paint) => paint,
            None => return Ok(()),
        };

        match &shape.geometry {
            Geometry::Rectangle(rect) => self.write_rectangle(paint, rect),
            Geometry::Polygon(points) if points.len() <= MAX_RECORD_LEN => {
                let kind = paint.pick(
                    CommandKind::FillPolygon,
                    CommandKind::DrawLineLoop,
                    CommandKind::OutlineFillPolygon,
                );
                self.write_point_record(kind, paint, points)
            }
            Geometry::Polyline(points)
                if points.len() <= MAX_RECORD_LEN && !matches!(paint, Paint::Outline(..)) =>
            {
                let kind = paint.pick(
                    CommandKind::FillPolygon,
                    CommandKind::DrawLineStrip,
                    CommandKind::OutlineFillPolygon,
                );
                self.write_point_record(kind, paint, points)
            }
            Geometry::Polygon(points) => self.write_path(paint, &polyline_path(points, true)),
            Geometry::Polyline(points) => self.write_path(paint, &polyline_path(points, false)),
            Geometry::Path(primitives) => self.write_path(paint, primitives),
        }
    }

    fn write_rectangle(&mut self, paint: Paint<'_>, rect: &Rect) -> Result<()> {
        if let Paint::Line(..) = paint {
            let corners = [
                Point::new(rect.x0, rect.y0),
                Point::new(rect.x1, rect.y0),
                Point::new(rect.x1, rect.y1),
                Point::new(rect.x0, rect.y1),
            ];
            return self.write_point_record(CommandKind::DrawLineLoop, paint, &corners);
        }

        let kind = paint.pick(
            CommandKind::FillRectangles,
            CommandKind::DrawLineLoop,
            CommandKind::OutlineFillRectangles,
        );
        self.begin_record(kind, 1, paint)?;
        self.write_x(rect.x0)?;
        self.write_y(rect.y0)?;
        self.write_width(rect.width())?;
        self.write_height(rect.height())
    }

    fn write_point_record(
        &mut self,
        kind: CommandKind,
        paint: Paint<'_>,
        points: &[Point],
    ) -> Result<()> {
        self.begin_record(kind, points.len(), paint)?;

        for point in points {
            self.write_point(*point)?;
        }

        Ok(())
    }

    fn write_path(&mut self, paint: Paint<'_>, primitives: &[Primitive]) -> Result<()> {
        let kind = paint.pick(
            CommandKind::FillPath,
            CommandKind::DrawLinePath,
            CommandKind::OutlineFillPath,
        );

        for chunk in path::subpaths(primitives).chunks(MAX_RECORD_LEN) {
            self.begin_record(kind, chunk.len(), paint)?;

            for subpath in chunk {
                self.write_var_uint(subpath.primitives.len() as u32)?;
            }
            for subpath in chunk {
                self.write_subpath(subpath)?;
            }
        }

        Ok(())
    }

    /// Opcode, count/style byte(s), style payloads and line width
    fn begin_record(&mut self, kind: CommandKind, count: usize, paint: Paint<'_>) -> Result<()> {
        self.out.write_u8(kind as u8)?;

        match paint {
            Paint::Fill(style) | Paint::Line(style, _) => {
                let [count_and_style] = CountAndStyle::new(count, style.style_type())?.pack()?;
                self.out.write_u8(count_and_style)?;
                self.write_style(style)?;
            }
            Paint::Outline(fill, line, _) => {
                let [count_and_style] = CountAndStyle::new(count, fill.style_type())?.pack()?;
                self.out.write_u8(count_and_style)?;
                self.out.write_u8((line.style_type() as u8) << 6)?;
                self.write_style(fill)?;
                self.write_style(line)?;
            }
        }

        match paint {
            Paint::Line(_, width) | Paint::Outline(_, _, width) => self.write_width(width),
            Paint::Fill(_) => Ok(()),
        }
    }

    fn write_style(&mut self, style: &StyleRef) -> Result<()> {
        match style {
            StyleRef::FlatColor(color) => {
                let index = self.table.index_of(color)?;
                self.write_var_uint(index as u32)
            }
            StyleRef::LinearGradient | StyleRef::RadialGradient => Err(
                Error::UnsupportedFeature("gradient paint".to_owned()),
            ),
        }
    }

    fn write_subpath(&mut self, subpath: &SubPath<'_>) -> Result<()> {
        self.write_point(subpath.start)?;

        for primitive in subpath.primitives {
            self.write_primitive(primitive)?;
        }

        Ok(())
    }

    fn write_primitive(&mut self, primitive: &Primitive) -> Result<()> {
        match *primitive {
            Primitive::MoveTo(_) => unreachable!("sub-paths never contain a move"),
            Primitive::LineTo(end) => {
                self.out.write_u8(SegmentOpcode::Line as u8)?;
                self.write_point(end)
            }
            Primitive::HorizontalTo(x) => {
                self.out.write_u8(SegmentOpcode::HorizontalLine as u8)?;
                self.write_x(x)
            }
            Primitive::VerticalTo(y) => {
                self.out.write_u8(SegmentOpcode::VerticalLine as u8)?;
                self.write_y(y)
            }
            Primitive::CubicTo {
                control_0,
                control_1,
                end,
            } => {
                self.out.write_u8(SegmentOpcode::CubicBezier as u8)?;
                self.write_point(control_0)?;
                self.write_point(control_1)?;
                self.write_point(end)
            }
            Primitive::QuadraticTo { control, end } => {
                self.out.write_u8(SegmentOpcode::QuadraticBezier as u8)?;
                self.write_point(control)?;
                self.write_point(end)
            }
            Primitive::ArcTo {
                radius_x,
                radius_y,
                rotation,
                large_arc,
                sweep,
                end,
            } => {
                let flags = (large_arc as u8) | ((sweep as u8) << 1);
                let (radius_x, radius_y, rotation) = fold_rotation(radius_x, radius_y, rotation);

                if radius_x == radius_y {
                    self.out.write_u8(SegmentOpcode::ArcCircle as u8)?;
                    self.out.write_u8(flags)?;
                    self.write_width(radius_x)?;
                } else {
                    self.out.write_u8(SegmentOpcode::ArcEllipse as u8)?;
                    self.out.write_u8(flags)?;
                    self.write_width(radius_x)?;
                    self.write_height(radius_y)?;
                    self.write_unit(rotation, rotation)?;
                }

                self.write_point(end)
            }
            Primitive::ClosePath => Ok(self.out.write_u8(SegmentOpcode::ClosePath as u8)?),
        }
    }

    /// Little-endian base-128 integer, 7 value bits per byte
    fn write_var_uint(&mut self, mut value: u32) -> Result<()> {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;

            if value == 0 {
                self.out.write_u8(byte)?;
                return Ok(());
            }

            self.out.write_u8(byte | 0x80)?;
        }
    }

    fn write_point(&mut self, point: Point) -> Result<()> {
        self.write_x(point.x)?;
        self.write_y(point.y)
    }

    fn write_x(&mut self, x: f64) -> Result<()> {
        let mapped = self.analysis.map_x(x);
        self.write_unit(x, mapped)
    }

    fn write_y(&mut self, y: f64) -> Result<()> {
        let mapped = self.analysis.map_y(y);
        self.write_unit(y, mapped)
    }

    fn write_width(&mut self, width: f64) -> Result<()> {
        let mapped = width * self.analysis.factor_x();
        self.write_unit(width, mapped)
    }

    fn write_height(&mut self, height: f64) -> Result<()> {
        let mapped = height * self.analysis.factor_y();
        self.write_unit(height, mapped)
    }

    /// Quantizes `value` at the current scale. `source` is the document-space value
    /// reported on overflow.
    fn write_unit(&mut self, source: f64, value: f64) -> Result<()> {
        let scale = self.analysis.scale;
        let scaled = (value * f64::from(1u32 << scale)).round();

        if !(f64::from(i16::MIN)..=f64::from(i16::MAX)).contains(&scaled) {
            return Err(Error::RangeOverflow {
                value: source,
                scale,
            });
        }

        self.out.write_i16::<LittleEndian>(scaled as i16)?;

        Ok(())
    }
}

/// Brings an ellipse rotation into `[-45, 45)` degrees. Turning an ellipse by 180
/// degrees changes nothing, and turning it by 90 degrees swaps its radii.
fn fold_rotation(radius_x: f64, radius_y: f64, rotation: f64) -> (f64, f64, f64) {
    let mut rotation = rotation.rem_euclid(180.0);
    if rotation >= 90.0 {
        rotation -= 180.0;
    }

    if rotation >= 45.0 {
        (radius_y, radius_x, rotation - 90.0)
    } else if rotation < -45.0 {
        (radius_y, radius_x, rotation + 90.0)
    } else {
        (radius_x, radius_y, rotation)
    }
}

fn polyline_path(points: &[Point], closed: bool) -> Vec<Primitive> {
    let mut primitives = Vec::with_capacity(points.len() + 1);
    let mut points = points.iter().copied();

    if let Some(first) = points.next() {
        primitives.push(Primitive::MoveTo(first));
        primitives.extend(points.map(Primitive::LineTo));
        if closed {
            primitives.push(Primitive::ClosePath);
        }
    }

    primitives
}
