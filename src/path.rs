//! Parser for the path data mini-language (`d="M 0 0 L 10 0 Z"`) and for `points` lists.
//!
//! Parsing happens in two steps: a `nom` grammar turns the text into commands with
//! their raw argument tuples, then a [`Pen`] walks those commands, resolving relative
//! coordinates and smooth-curve reflections into absolute [`Primitive`]s.

use kurbo::Point;
use nom::{
    branch::alt,
    character::complete::{char, digit0, digit1, multispace0, multispace1, one_of},
    combinator::{all_consuming, cut, map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// A drawing primitive with absolute operands in document space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// Starts a new sub-path
    MoveTo(Point),
    /// Straight line to a point
    LineTo(Point),
    /// Horizontal line to an x coordinate
    HorizontalTo(f64),
    /// Vertical line to a y coordinate
    VerticalTo(f64),
    /// Cubic Bézier curve
    CubicTo {
        /// Control point near the start
        control_0: Point,
        /// Control point near the end
        control_1: Point,
        /// End point
        end: Point,
    },
    /// Quadratic Bézier curve
    QuadraticTo {
        /// Control point
        control: Point,
        /// End point
        end: Point,
    },
    /// Elliptic arc with non-zero radii
    ArcTo {
        /// Horizontal radius before rotation
        radius_x: f64,
        /// Vertical radius before rotation
        radius_y: f64,
        /// Axis rotation in degrees
        rotation: f64,
        /// Large-arc flag
        large_arc: bool,
        /// Sweep flag, set for clockwise arcs
        sweep: bool,
        /// End point
        end: Point,
    },
    /// Line back to the sub-path start
    ClosePath,
}

/// Run of primitives following a single `MoveTo`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPath<'a> {
    /// Target of the `MoveTo`
    pub start: Point,
    /// Primitives after the move, never empty
    pub primitives: &'a [Primitive],
}

/// Splits `primitives` at every `MoveTo`, dropping sub-paths that draw nothing
pub fn subpaths(primitives: &[Primitive]) -> Vec<SubPath<'_>> {
    fn flush<'a>(result: &mut Vec<SubPath<'a>>, start: Point, run: &'a [Primitive]) {
        if !run.is_empty() {
            result.push(SubPath {
                start,
                primitives: run,
            });
        }
    }

    let mut result = Vec::new();
    let mut start = Point::ZERO;
    let mut begin = 0;

    for (i, primitive) in primitives.iter().enumerate() {
        if let Primitive::MoveTo(point) = primitive {
            flush(&mut result, start, &primitives[begin..i]);
            start = *point;
            begin = i + 1;
        }
    }
    flush(&mut result, start, &primitives[begin..]);

    result
}

/// Parses path data into absolute primitives
pub fn parse(data: &str) -> Result<Vec<Primitive>> {
    let (_, commands) = all_consuming(path_data)(data).map_err(|e| syntax_error(data, e))?;

    let mut pen = Pen::new();
    for command in commands {
        pen.apply(command);
    }

    Ok(pen.primitives)
}

/// Parses a `points="x,y x,y ..."` list
pub fn parse_points(data: &str) -> Result<Vec<Point>> {
    all_consuming(delimited(
        multispace0,
        opt(sequence(coordinate_pair)),
        multispace0,
    ))(data)
    .map(|(_, points)| points.unwrap_or_default())
    .map_err(|e| syntax_error(data, e))
}

/// Parses a whitespace/comma separated list of numbers, e.g. a `viewBox`
pub fn parse_numbers(data: &str) -> Result<Vec<f64>> {
    all_consuming(delimited(multispace0, opt(sequence(number)), multispace0))(data)
        .map(|(_, numbers)| numbers.unwrap_or_default())
        .map_err(|e| syntax_error(data, e))
}

fn syntax_error(data: &str, err: nom::Err<nom::error::Error<&str>>) -> Error {
    let remaining = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => "",
    };

    Error::Syntax {
        offset: data.len() - remaining.len(),
        found: remaining.chars().take(12).collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ArcArgs {
    radius_x: f64,
    radius_y: f64,
    rotation: f64,
    large_arc: bool,
    sweep: bool,
    end: Point,
}

/// Command letter plus its argument tuples; `bool` is true for the relative form
#[derive(Debug, Clone, PartialEq)]
enum Raw {
    MoveTo(bool, Vec<Point>),
    ClosePath,
    LineTo(bool, Vec<Point>),
    Horizontal(bool, Vec<f64>),
    Vertical(bool, Vec<f64>),
    CurveTo(bool, Vec<(Point, Point, Point)>),
    SmoothCurveTo(bool, Vec<(Point, Point)>),
    QuadTo(bool, Vec<(Point, Point)>),
    SmoothQuadTo(bool, Vec<Point>),
    Arc(bool, Vec<ArcArgs>),
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(pair(
            opt(one_of("+-")),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
        )),
        str::parse::<f64>,
    )(input)
}

fn comma_wsp(input: &str) -> IResult<&str, ()> {
    value(
        (),
        alt((
            recognize(tuple((multispace1, opt(char(',')), multispace0))),
            recognize(pair(char(','), multispace0)),
        )),
    )(input)
}

fn flag(input: &str) -> IResult<&str, bool> {
    map(one_of("01"), |c| c == '1')(input)
}

/// Continuation of a tuple: once the tuple has started, a missing part is fatal
fn then<'a, O, F>(parser: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    cut(preceded(opt(comma_wsp), parser))
}

fn coordinate_pair(input: &str) -> IResult<&str, Point> {
    map(pair(number, then(number)), |(x, y)| Point::new(x, y))(input)
}

fn curve_args(input: &str) -> IResult<&str, (Point, Point, Point)> {
    tuple((coordinate_pair, then(coordinate_pair), then(coordinate_pair)))(input)
}

fn pair_args(input: &str) -> IResult<&str, (Point, Point)> {
    pair(coordinate_pair, then(coordinate_pair))(input)
}

fn arc_args(input: &str) -> IResult<&str, ArcArgs> {
    map(
        tuple((
            number,
            then(number),
            then(number),
            then(flag),
            then(flag),
            then(coordinate_pair),
        )),
        |(radius_x, radius_y, rotation, large_arc, sweep, end)| ArcArgs {
            radius_x,
            radius_y,
            rotation,
            large_arc,
            sweep,
            end,
        },
    )(input)
}

/// One or more tuples. A trailing tuple that fails to start ends the repetition and
/// leaves the input where the previous tuple ended.
fn sequence<'a, O, F>(mut item: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (mut rest, first) = item(input)?;
        let mut items = vec![first];

        loop {
            let checkpoint = rest;
            let (after_separator, _) = opt(comma_wsp)(checkpoint)?;

            match item(after_separator) {
                Ok((next, parsed)) => {
                    items.push(parsed);
                    rest = next;
                }
                Err(nom::Err::Error(_)) => return Ok((checkpoint, items)),
                Err(err) => return Err(err),
            }
        }
    }
}

fn command<'a, O, F>(
    letters: &'static str,
    args: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, (bool, Vec<O>)>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    map(
        pair(one_of(letters), preceded(multispace0, sequence(args))),
        |(letter, items)| (letter.is_ascii_lowercase(), items),
    )
}

fn moveto(input: &str) -> IResult<&str, Raw> {
    map(command("Mm", coordinate_pair), |(rel, points)| {
        Raw::MoveTo(rel, points)
    })(input)
}

fn drawto(input: &str) -> IResult<&str, Raw> {
    alt((
        map(one_of("Zz"), |_| Raw::ClosePath),
        moveto,
        map(command("Ll", coordinate_pair), |(rel, points)| {
            Raw::LineTo(rel, points)
        }),
        map(command("Hh", number), |(rel, xs)| Raw::Horizontal(rel, xs)),
        map(command("Vv", number), |(rel, ys)| Raw::Vertical(rel, ys)),
        map(command("Cc", curve_args), |(rel, curves)| {
            Raw::CurveTo(rel, curves)
        }),
        map(command("Ss", pair_args), |(rel, curves)| {
            Raw::SmoothCurveTo(rel, curves)
        }),
        map(command("Qq", pair_args), |(rel, curves)| {
            Raw::QuadTo(rel, curves)
        }),
        map(command("Tt", coordinate_pair), |(rel, points)| {
            Raw::SmoothQuadTo(rel, points)
        }),
        map(command("Aa", arc_args), |(rel, arcs)| Raw::Arc(rel, arcs)),
    ))(input)
}

fn path_data(input: &str) -> IResult<&str, Vec<Raw>> {
    map(
        delimited(
            multispace0,
            opt(pair(moveto, many0(preceded(multispace0, drawto)))),
            multispace0,
        ),
        |body| match body {
            Some((first, rest)) => std::iter::once(first).chain(rest).collect(),
            None => Vec::new(),
        },
    )(input)
}

/// Cursor state while turning commands into absolute primitives
struct Pen {
    cursor: Point,
    start: Point,
    cubic_control: Option<Point>,
    quad_control: Option<Point>,
    primitives: Vec<Primitive>,
}

impl Pen {
    fn new() -> Self {
        Pen {
            cursor: Point::ZERO,
            start: Point::ZERO,
            cubic_control: None,
            quad_control: None,
            primitives: Vec::new(),
        }
    }

    fn absolute(&self, relative: bool, point: Point) -> Point {
        if relative {
            self.cursor + point.to_vec2()
        } else {
            point
        }
    }

    /// Mirror of the previous control point through the cursor, or the cursor itself
    fn reflect(&self, control: Option<Point>) -> Point {
        match control {
            Some(control) => self.cursor + (self.cursor - control),
            None => self.cursor,
        }
    }

    fn push(&mut self, primitive: Primitive, cursor: Point) {
        self.primitives.push(primitive);
        self.cursor = cursor;
        self.cubic_control = None;
        self.quad_control = None;
    }

    fn apply(&mut self, command: Raw) {
        match command {
            Raw::MoveTo(rel, points) => {
                // every pair of a repeated moveto opens its own sub-path
                for point in points {
                    let point = self.absolute(rel, point);
                    self.start = point;
                    self.push(Primitive::MoveTo(point), point);
                }
            }
            Raw::ClosePath => {
                let start = self.start;
                self.push(Primitive::ClosePath, start);
            }
            Raw::LineTo(rel, points) => {
                for point in points {
                    let point = self.absolute(rel, point);
                    self.push(Primitive::LineTo(point), point);
                }
            }
            Raw::Horizontal(rel, xs) => {
                for x in xs {
                    let x = if rel { self.cursor.x + x } else { x };
                    let cursor = Point::new(x, self.cursor.y);
                    self.push(Primitive::HorizontalTo(x), cursor);
                }
            }
            Raw::Vertical(rel, ys) => {
                for y in ys {
                    let y = if rel { self.cursor.y + y } else { y };
                    let cursor = Point::new(self.cursor.x, y);
                    self.push(Primitive::VerticalTo(y), cursor);
                }
            }
            Raw::CurveTo(rel, curves) => {
                for (control_0, control_1, end) in curves {
                    let control_0 = self.absolute(rel, control_0);
                    let control_1 = self.absolute(rel, control_1);
                    let end = self.absolute(rel, end);
                    self.cubic(control_0, control_1, end);
                }
            }
            Raw::SmoothCurveTo(rel, curves) => {
                for (control_1, end) in curves {
                    let control_0 = self.reflect(self.cubic_control);
                    let control_1 = self.absolute(rel, control_1);
                    let end = self.absolute(rel, end);
                    self.cubic(control_0, control_1, end);
                }
            }
            Raw::QuadTo(rel, curves) => {
                for (control, end) in curves {
                    let control = self.absolute(rel, control);
                    let end = self.absolute(rel, end);
                    self.quadratic(control, end);
                }
            }
            Raw::SmoothQuadTo(rel, points) => {
                for end in points {
                    let control = self.reflect(self.quad_control);
                    let end = self.absolute(rel, end);
                    self.quadratic(control, end);
                }
            }
            Raw::Arc(rel, arcs) => {
                for arc in arcs {
                    let end = self.absolute(rel, arc.end);

                    if arc.radius_x == 0.0 || arc.radius_y == 0.0 {
                        self.push(Primitive::LineTo(end), end);
                    } else {
                        let primitive = Primitive::ArcTo {
                            radius_x: arc.radius_x.abs(),
                            radius_y: arc.radius_y.abs(),
                            rotation: arc.rotation,
                            large_arc: arc.large_arc,
                            sweep: arc.sweep,
                            end,
                        };
                        self.push(primitive, end);
                    }
                }
            }
        }
    }

    fn cubic(&mut self, control_0: Point, control_1: Point, end: Point) {
        let primitive = Primitive::CubicTo {
            control_0,
            control_1,
            end,
        };
        self.push(primitive, end);
        self.cubic_control = Some(control_1);
    }

    fn quadratic(&mut self, control: Point, end: Point) {
        self.push(Primitive::QuadraticTo { control, end }, end);
        self.quad_control = Some(control);
    }
}
