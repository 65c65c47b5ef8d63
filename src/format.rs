//! Wire-level vocabulary of the TinyVG format: constants, opcodes, packed bytes and
//! the decoded image model.

pub use kurbo::{Point, Rect};
use packed_struct::prelude::*;
pub use piet::Color;

use crate::error::{Error, Result};

/// File magic, `rV`
pub const MAGIC: [u8; 2] = [0x72, 0x56];

/// Format version written into every header
pub const VERSION: u8 = 1;

/// Largest element count a single record can carry
pub const MAX_RECORD_LEN: usize = 64;

/// Largest scale exponent representable in the header nibble
pub const MAX_SCALE: u8 = 15;

/// Layout of the color table entries
#[derive(PrimitiveEnum_u8, Debug, PartialEq, Clone, Copy)]
pub enum ColorEncoding {
    /// 4 bytes per color, the only encoding this crate writes
    Rgba8888 = 0,
    /// 2 bytes per color
    Rgb565 = 1,
    /// 16 bytes per color
    RgbaF32 = 2,
}

/// Width of a coordinate unit
#[derive(PrimitiveEnum_u8, Debug, PartialEq, Clone, Copy)]
pub enum CoordinateRange {
    /// 16 bits
    Default = 0,

    /// 8 bits
    Reduced = 1,

    /// 32 bits
    Enhanced = 2,
}

/// 2-bit discriminator of a paint reference
#[derive(PrimitiveEnum_u8, Debug, PartialEq, Clone, Copy)]
pub enum StyleType {
    /// Single color table index
    FlatColor = 0,
    /// Two points and two color indices
    LinearGradient = 1,
    /// Two points and two color indices
    RadialGradient = 2,
}

/// Fourth header byte. Scale exponent in the low nibble.
#[derive(PackedStruct, Debug, PartialEq, Clone, Copy)]
#[packed_struct(bit_numbering = "msb0")]
pub struct ScaleProperties {
    /// Unit width, always [`CoordinateRange::Default`] when written
    #[packed_field(bits = "0..=1", ty = "enum")]
    pub coordinate_range: CoordinateRange,
    /// Color table layout
    #[packed_field(bits = "2..=3", ty = "enum")]
    pub color_encoding: ColorEncoding,
    /// Units are stored multiplied by `2^scale`
    #[packed_field(bits = "4..=7")]
    pub scale: Integer<u8, packed_bits::Bits<4>>,
}

impl ScaleProperties {
    /// Properties for RGBA8888 colors and 16 bit units at the given scale exponent
    pub fn new(scale: u8) -> Self {
        ScaleProperties {
            coordinate_range: CoordinateRange::Default,
            color_encoding: ColorEncoding::Rgba8888,
            scale: (scale & 0x0F).into(),
        }
    }
}

/// Style type in the top 2 bits, element count in the low 6 bits (64 stored as 0)
#[derive(PackedStruct, Debug, PartialEq, Clone, Copy)]
#[packed_struct(bit_numbering = "msb0")]
pub struct CountAndStyle {
    /// Paint kind of the record's first style
    #[packed_field(bits = "0..=1", ty = "enum")]
    pub style_type: StyleType,
    /// Raw 6 bit count, see [`CountAndStyle::len`]
    #[packed_field(bits = "2..=7")]
    pub count: Integer<u8, packed_bits::Bits<6>>,
}

impl CountAndStyle {
    /// Packs `count` elements, which must be in `1..=64`
    pub fn new(count: usize, style_type: StyleType) -> Result<Self> {
        let stored = match count {
            0 => return Err(Error::EmptyRecord),
            MAX_RECORD_LEN => 0,
            n if n > MAX_RECORD_LEN => return Err(Error::RecordTooLarge(n)),
            n => n as u8,
        };

        Ok(CountAndStyle {
            style_type,
            count: stored.into(),
        })
    }

    /// Logical element count, undoing the 64 => 0 folding
    pub fn len(&self) -> usize {
        match self.count.to_primitive() {
            0 => MAX_RECORD_LEN,
            n => n as usize,
        }
    }
}

/// Record opcodes of the command stream
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum CommandKind {
    /// Terminates the command stream
    EndOfDocument = 0,
    /// Filled closed point list
    FillPolygon = 1,
    /// Filled axis-aligned rectangles
    FillRectangles = 2,
    /// Filled sub-paths
    FillPath = 3,
    /// Unconnected line pairs, never written by the encoder
    DrawLines = 4,
    /// Stroked closed point list
    DrawLineLoop = 5,
    /// Stroked open point list
    DrawLineStrip = 6,
    /// Stroked sub-paths
    DrawLinePath = 7,
    /// Filled and stroked closed point list
    OutlineFillPolygon = 8,
    /// Filled and stroked rectangles
    OutlineFillRectangles = 9,
    /// Filled and stroked sub-paths
    OutlineFillPath = 10,
}

impl CommandKind {
    /// Opcode for `byte`, `None` for unknown values
    pub fn from_byte(byte: u8) -> Option<Self> {
        use CommandKind::*;

        Some(match byte {
            0 => EndOfDocument,
            1 => FillPolygon,
            2 => FillRectangles,
            3 => FillPath,
            4 => DrawLines,
            5 => DrawLineLoop,
            6 => DrawLineStrip,
            7 => DrawLinePath,
            8 => OutlineFillPolygon,
            9 => OutlineFillRectangles,
            10 => OutlineFillPath,
            _ => return None,
        })
    }
}

/// Opcodes of the primitives inside a path sub-path
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum SegmentOpcode {
    /// End point
    Line = 0,
    /// End x
    HorizontalLine = 1,
    /// End y
    VerticalLine = 2,
    /// Two control points and the end point
    CubicBezier = 3,
    /// Flags byte, radius and end point
    ArcCircle = 4,
    /// Flags byte, two radii, rotation and end point
    ArcEllipse = 5,
    /// No payload
    ClosePath = 6,
    /// Control point and end point
    QuadraticBezier = 7,
}

impl SegmentOpcode {
    /// Opcode in the low 3 bits of `byte`
    pub fn from_byte(byte: u8) -> Option<Self> {
        use SegmentOpcode::*;

        Some(match byte & 0x07 {
            0 => Line,
            1 => HorizontalLine,
            2 => VerticalLine,
            3 => CubicBezier,
            4 => ArcCircle,
            5 => ArcEllipse,
            6 => ClosePath,
            7 => QuadraticBezier,
            _ => return None,
        })
    }
}

/// A decoded file
#[derive(Debug, PartialEq, Clone)]
pub struct Image {
    /// Size, scale and encodings
    pub header: Header,
    /// Colors in table order, referenced by [`Style`] indices
    pub color_table: Vec<Color>,
    /// Records in file order, without the terminator
    pub commands: Vec<Command>,
}

/// Fixed-layout file header
#[derive(Debug, PartialEq, Clone)]
pub struct Header {
    /// Always [`VERSION`] for files this crate reads
    pub version: u8,
    /// Scale exponent, units are divided by `2^scale`
    pub scale: u8,
    /// Color table layout
    pub color_encoding: ColorEncoding,
    /// Unit width
    pub coordinate_range: CoordinateRange,
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Number of color table entries
    pub color_count: u32,
}

/// Paint of a decoded record
#[derive(Debug, PartialEq, Clone)]
pub enum Style {
    /// Single color
    FlatColor {
        /// Index into [`Image::color_table`]
        color_index: usize,
    },
    /// Linear blend between two colors along `point_0`..`point_1`
    LinearGradient {
        /// Position of the first color
        point_0: Point,
        /// Position of the second color
        point_1: Point,
        /// Color at `point_0`
        color_index_0: usize,
        /// Color at `point_1`
        color_index_1: usize,
    },
    /// Radial blend centered on `point_0`, reaching the second color at `point_1`
    RadialGradient {
        /// Center, drawn with the first color
        point_0: Point,
        /// Point on the outer edge
        point_1: Point,
        /// Color at the center
        color_index_0: usize,
        /// Color at the edge
        color_index_1: usize,
    },
}

/// A decoded record, coordinates already divided by the scale.
///
/// Every variant carries its paints first and its geometry last. `line_width` is in
/// canvas pixels.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    /// Filled closed point list
    FillPolygon {
        /// Fill paint
        fill_style: Style,
        /// Corners in drawing order
        polygon: Vec<Point>,
    },
    /// Filled rectangles
    FillRectangles {
        /// Fill paint
        fill_style: Style,
        /// Rectangles, each written as x, y, width, height
        rectangles: Vec<Rect>,
    },
    /// Filled sub-paths
    FillPath {
        /// Fill paint
        fill_style: Style,
        /// Sub-paths
        path: Vec<Segment>,
    },
    /// Stroked closed point list
    DrawLineLoop {
        /// Stroke paint
        line_style: Style,
        /// Stroke width
        line_width: f64,
        /// Corners in drawing order
        points: Vec<Point>,
    },
    /// Stroked open point list
    DrawLineStrip {
        /// Stroke paint
        line_style: Style,
        /// Stroke width
        line_width: f64,
        /// Points in drawing order
        points: Vec<Point>,
    },
    /// Stroked sub-paths
    DrawLinePath {
        /// Stroke paint
        line_style: Style,
        /// Stroke width
        line_width: f64,
        /// Sub-paths
        path: Vec<Segment>,
    },
    /// Filled and stroked closed point list
    OutlineFillPolygon {
        /// Fill paint
        fill_style: Style,
        /// Stroke paint
        line_style: Style,
        /// Stroke width
        line_width: f64,
        /// Corners in drawing order
        points: Vec<Point>,
    },
    /// Filled and stroked rectangles
    OutlineFillRectangles {
        /// Fill paint
        fill_style: Style,
        /// Stroke paint
        line_style: Style,
        /// Stroke width
        line_width: f64,
        /// Rectangles, each written as x, y, width, height
        rectangles: Vec<Rect>,
    },
    /// Filled and stroked sub-paths
    OutlineFillPath {
        /// Fill paint
        fill_style: Style,
        /// Stroke paint
        line_style: Style,
        /// Stroke width
        line_width: f64,
        /// Sub-paths
        path: Vec<Segment>,
    },
}

/// One sub-path of a path record
#[derive(Debug, PartialEq, Clone)]
pub struct Segment {
    /// Pen position before the first command
    pub start: Point,
    /// Primitives following the start point
    pub commands: Vec<SegmentCommandKind>,
}

/// Arc direction flag
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Sweep {
    /// Counter-clockwise, flag bit clear
    Left,
    /// Clockwise, flag bit set
    Right,
}

/// A decoded path primitive. Each one continues from the previous end point.
#[derive(Debug, PartialEq, Clone)]
pub enum SegmentCommandKind {
    /// Straight line
    Line {
        /// End point
        end: Point,
    },
    /// Horizontal line
    HorizontalLine {
        /// End x, y is unchanged
        x: f64,
    },
    /// Vertical line
    VerticalLine {
        /// End y, x is unchanged
        y: f64,
    },
    /// Cubic Bézier curve
    CubicBezier {
        /// Control point near the start
        control_0: Point,
        /// Control point near the end
        control_1: Point,
        /// End point
        point_1: Point,
    },
    /// Circular arc
    ArcCircle {
        /// Take the longer of the two possible arcs
        large: bool,
        /// Direction
        sweep: Sweep,
        /// Circle radius
        radius: f64,
        /// End point
        target: Point,
    },
    /// Elliptic arc
    ArcEllipse {
        /// Take the longer of the two possible arcs
        large: bool,
        /// Direction
        sweep: Sweep,
        /// Horizontal radius before rotation
        radius_x: f64,
        /// Vertical radius before rotation
        radius_y: f64,
        /// Rotation of the ellipse axes, in degrees
        rotation: f64,
        /// End point
        target: Point,
    },
    /// Line back to the sub-path start
    ClosePath,
    /// Quadratic Bézier curve
    QuadraticBezier {
        /// Control point
        control: Point,
        /// End point
        point_1: Point,
    },
}
