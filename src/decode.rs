//! Decoder for the produced binary format, used to inspect and verify encoder output.
//! Coordinates come back in image space, i.e. divided by `2^scale`.

use kurbo::{Point, Rect};
use nom::{
    bytes::complete::tag,
    combinator::{map, map_opt, map_res, verify},
    error::ErrorKind,
    multi::count,
    number::complete::{le_i16, le_u16, le_u8},
    sequence::tuple,
    IResult,
};
use packed_struct::prelude::*;

use crate::error::{Error, Result};
use crate::format::{
    Color, ColorEncoding, Command, CommandKind, CoordinateRange, CountAndStyle, Header, Image,
    ScaleProperties, Segment, SegmentCommandKind, SegmentOpcode, Style, StyleType, Sweep, MAGIC,
};

/// Decodes a complete file. Trailing bytes after the terminator are rejected.
pub fn decode(data: &[u8]) -> Result<Image> {
    let error = |e| decode_error(data, e);

    let (rest, header) = parse_header(data).map_err(error)?;
    let (mut rest, color_table) = count(color_8888, header.color_count as usize)(rest).map_err(error)?;

    let mut commands = Vec::new();
    loop {
        let (next, parsed) = command(header.scale)(rest).map_err(error)?;
        rest = next;

        match parsed {
            Some(command) => commands.push(command),
            None => break,
        }
    }

    if !rest.is_empty() {
        return Err(Error::Decode {
            offset: data.len() - rest.len(),
            reason: "trailing data after end of document".to_owned(),
        });
    }

    Ok(Image {
        header,
        color_table,
        commands,
    })
}

fn decode_error(data: &[u8], err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => Error::Decode {
            offset: data.len() - e.input.len(),
            reason: format!("{:?}", e.code),
        },
        nom::Err::Incomplete(_) => Error::Decode {
            offset: data.len(),
            reason: "incomplete".to_owned(),
        },
    }
}

fn magic_number(input: &[u8]) -> IResult<&[u8], ()> {
    map(tag(&MAGIC[..]), |_| ())(input)
}

fn scale_properties(input: &[u8]) -> IResult<&[u8], ScaleProperties> {
    verify(
        map_res(le_u8, |byte| ScaleProperties::unpack(&[byte])),
        |properties: &ScaleProperties| {
            properties.color_encoding == ColorEncoding::Rgba8888
                && properties.coordinate_range == CoordinateRange::Default
        },
    )(input)
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (rest, ((), version, scale_properties, width, height, color_count)) =
        tuple((magic_number, le_u8, scale_properties, le_u16, le_u16, le_u16))(input)?;

    Ok((
        rest,
        Header {
            version,
            scale: scale_properties.scale.to_primitive(),
            color_encoding: scale_properties.color_encoding,
            coordinate_range: scale_properties.coordinate_range,
            width: width.into(),
            height: height.into(),
            color_count: color_count.into(),
        },
    ))
}

fn color_8888(input: &[u8]) -> IResult<&[u8], Color> {
    map(
        tuple((le_u8, le_u8, le_u8, le_u8)),
        |(red, green, blue, alpha)| Color::rgba8(red, green, blue, alpha),
    )(input)
}

fn var_uint(input: &[u8]) -> IResult<&[u8], u32> {
    let mut value = 0u32;

    for (i, byte) in input.iter().take(5).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((&input[i + 1..], value));
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        ErrorKind::TooLarge,
    )))
}

fn unit(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], f64> {
    move |input| map(le_i16, |raw| f64::from(raw) / f64::from(1u32 << scale))(input)
}

fn point(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], Point> {
    move |input| map(tuple((unit(scale), unit(scale))), |(x, y)| Point::new(x, y))(input)
}

fn rect(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], Rect> {
    move |input| {
        map(
            tuple((unit(scale), unit(scale), unit(scale), unit(scale))),
            |(x, y, width, height)| Rect::new(x, y, x + width, y + height),
        )(input)
    }
}

fn count_and_style(input: &[u8]) -> IResult<&[u8], CountAndStyle> {
    map_res(le_u8, |byte| CountAndStyle::unpack(&[byte]))(input)
}

fn style(style_type: StyleType, scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], Style> {
    move |input| match style_type {
        StyleType::FlatColor => map(var_uint, |index| Style::FlatColor {
            color_index: index as usize,
        })(input),
        StyleType::LinearGradient => map(
            tuple((point(scale), point(scale), var_uint, var_uint)),
            |(point_0, point_1, color_index_0, color_index_1)| Style::LinearGradient {
                point_0,
                point_1,
                color_index_0: color_index_0 as usize,
                color_index_1: color_index_1 as usize,
            },
        )(input),
        StyleType::RadialGradient => map(
            tuple((point(scale), point(scale), var_uint, var_uint)),
            |(point_0, point_1, color_index_0, color_index_1)| Style::RadialGradient {
                point_0,
                point_1,
                color_index_0: color_index_0 as usize,
                color_index_1: color_index_1 as usize,
            },
        )(input),
    }
}

/// Element count and fill style
fn fill_header(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], (usize, Style)> {
    move |input| {
        let (rest, head) = count_and_style(input)?;
        let (rest, fill_style) = style(head.style_type, scale)(rest)?;

        Ok((rest, (head.len(), fill_style)))
    }
}

/// Element count, line style and line width
fn line_header(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], (usize, Style, f64)> {
    move |input| {
        let (rest, (len, line_style)) = fill_header(scale)(input)?;
        let (rest, line_width) = unit(scale)(rest)?;

        Ok((rest, (len, line_style, line_width)))
    }
}

/// Element count, fill style, line style and line width
fn outline_header(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], (usize, Style, Style, f64)> {
    move |input| {
        let (rest, head) = count_and_style(input)?;
        let (rest, line_type) = map_opt(le_u8, |byte| StyleType::from_primitive(byte >> 6))(rest)?;
        let (rest, fill_style) = style(head.style_type, scale)(rest)?;
        let (rest, line_style) = style(line_type, scale)(rest)?;
        let (rest, line_width) = unit(scale)(rest)?;

        Ok((rest, (head.len(), fill_style, line_style, line_width)))
    }
}

fn path(segment_count: usize, scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], Vec<Segment>> {
    move |input| {
        let (mut rest, lengths) = count(var_uint, segment_count)(input)?;
        let mut segments = Vec::with_capacity(segment_count);

        for length in lengths {
            let (next, start) = point(scale)(rest)?;
            let (next, commands) = count(segment_command(scale), length as usize)(next)?;
            segments.push(Segment { start, commands });
            rest = next;
        }

        Ok((rest, segments))
    }
}

fn sweep(flags: u8) -> Sweep {
    if flags & 0b10 != 0 {
        Sweep::Right
    } else {
        Sweep::Left
    }
}

fn segment_command(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], SegmentCommandKind> {
    move |input| {
        let (rest, opcode) = map_opt(le_u8, SegmentOpcode::from_byte)(input)?;

        match opcode {
            SegmentOpcode::Line => map(point(scale), |end| SegmentCommandKind::Line { end })(rest),
            SegmentOpcode::HorizontalLine => {
                map(unit(scale), |x| SegmentCommandKind::HorizontalLine { x })(rest)
            }
            SegmentOpcode::VerticalLine => {
                map(unit(scale), |y| SegmentCommandKind::VerticalLine { y })(rest)
            }
            SegmentOpcode::CubicBezier => map(
                tuple((point(scale), point(scale), point(scale))),
                |(control_0, control_1, point_1)| SegmentCommandKind::CubicBezier {
                    control_0,
                    control_1,
                    point_1,
                },
            )(rest),
            SegmentOpcode::ArcCircle => map(
                tuple((le_u8, unit(scale), point(scale))),
                |(flags, radius, target)| SegmentCommandKind::ArcCircle {
                    large: flags & 1 != 0,
                    sweep: sweep(flags),
                    radius,
                    target,
                },
            )(rest),
            SegmentOpcode::ArcEllipse => map(
                tuple((le_u8, unit(scale), unit(scale), unit(scale), point(scale))),
                |(flags, radius_x, radius_y, rotation, target)| SegmentCommandKind::ArcEllipse {
                    large: flags & 1 != 0,
                    sweep: sweep(flags),
                    radius_x,
                    radius_y,
                    rotation,
                    target,
                },
            )(rest),
            SegmentOpcode::ClosePath => Ok((rest, SegmentCommandKind::ClosePath)),
            SegmentOpcode::QuadraticBezier => map(
                tuple((point(scale), point(scale))),
                |(control, point_1)| SegmentCommandKind::QuadraticBezier { control, point_1 },
            )(rest),
        }
    }
}

/// `None` marks the end of the document
fn command(scale: u8) -> impl Fn(&[u8]) -> IResult<&[u8], Option<Command>> {
    move |input| {
        let (rest, kind) = map_opt(le_u8, CommandKind::from_byte)(input)?;

        let (rest, command) = match kind {
            CommandKind::EndOfDocument => return Ok((rest, None)),
            CommandKind::FillPolygon => {
                let (rest, (len, fill_style)) = fill_header(scale)(rest)?;
                let (rest, polygon) = count(point(scale), len)(rest)?;
                (rest, Command::FillPolygon { fill_style, polygon })
            }
            CommandKind::FillRectangles => {
                let (rest, (len, fill_style)) = fill_header(scale)(rest)?;
                let (rest, rectangles) = count(rect(scale), len)(rest)?;
                (
                    rest,
                    Command::FillRectangles {
                        fill_style,
                        rectangles,
                    },
                )
            }
            CommandKind::FillPath => {
                let (rest, (len, fill_style)) = fill_header(scale)(rest)?;
                let (rest, path) = path(len, scale)(rest)?;
                (rest, Command::FillPath { fill_style, path })
            }
            CommandKind::DrawLineLoop => {
                let (rest, (len, line_style, line_width)) = line_header(scale)(rest)?;
                let (rest, points) = count(point(scale), len)(rest)?;
                (
                    rest,
                    Command::DrawLineLoop {
                        line_style,
                        line_width,
                        points,
                    },
                )
            }
            CommandKind::DrawLineStrip => {
                let (rest, (len, line_style, line_width)) = line_header(scale)(rest)?;
                let (rest, points) = count(point(scale), len)(rest)?;
                (
                    rest,
                    Command::DrawLineStrip {
                        line_style,
                        line_width,
                        points,
                    },
                )
            }
            CommandKind::DrawLinePath => {
                let (rest, (len, line_style, line_width)) = line_header(scale)(rest)?;
                let (rest, path) = path(len, scale)(rest)?;
                (
                    rest,
                    Command::DrawLinePath {
                        line_style,
                        line_width,
                        path,
                    },
                )
            }
            CommandKind::OutlineFillPolygon => {
                let (rest, (len, fill_style, line_style, line_width)) =
                    outline_header(scale)(rest)?;
                let (rest, points) = count(point(scale), len)(rest)?;
                (
                    rest,
                    Command::OutlineFillPolygon {
                        fill_style,
                        line_style,
                        line_width,
                        points,
                    },
                )
            }
            CommandKind::OutlineFillRectangles => {
                let (rest, (len, fill_style, line_style, line_width)) =
                    outline_header(scale)(rest)?;
                let (rest, rectangles) = count(rect(scale), len)(rest)?;
                (
                    rest,
                    Command::OutlineFillRectangles {
                        fill_style,
                        line_style,
                        line_width,
                        rectangles,
                    },
                )
            }
            CommandKind::OutlineFillPath => {
                let (rest, (len, fill_style, line_style, line_width)) =
                    outline_header(scale)(rest)?;
                let (rest, path) = path(len, scale)(rest)?;
                (
                    rest,
                    Command::OutlineFillPath {
                        fill_style,
                        line_style,
                        line_width,
                        path,
                    },
                )
            }
            // never produced by the encoder
            CommandKind::DrawLines => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::Switch,
                )))
            }
        };

        Ok((rest, Some(command)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    const EMPTY: [u8; 15] = [
        0x72, 0x56, 0x01, 0x09, 24, 0, 24, 0, 1, 0, 0xff, 0, 0, 0xff, 0x00,
    ];

    #[test]
    fn header_fields() {
        let image = decode(&EMPTY).unwrap();

        assert_eq!(image.header.version, 1);
        assert_eq!(image.header.scale, 9);
        assert_eq!(image.header.width, 24);
        assert_eq!(image.header.color_count, 1);
        assert_eq!(image.color_table[0].as_rgba8(), (0xff, 0, 0, 0xff));
        assert!(image.commands.is_empty());
    }

    #[test]
    fn var_uint_continuation() {
        assert_eq!(var_uint(&[0xAC, 0x02, 0x07]).unwrap(), (&[0x07][..], 300));
        assert!(var_uint(&[0x80, 0x80]).is_err());
    }

    #[test]
    fn bad_magic() {
        let mut data = EMPTY;
        data[0] = 0;

        assert!(matches!(decode(&data), Err(Error::Decode { offset: 0, .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut data = EMPTY.to_vec();
        data.push(0);

        assert!(matches!(decode(&data), Err(Error::Decode { offset: 15, .. })));
    }

    #[test]
    fn fill_path_record() {
        let mut data = EMPTY[..14].to_vec();
        data[3] = 0;
        data.extend_from_slice(&[
            3, 0x01, 0x00, 2, // fill_path, one segment of two commands
            1, 0, 1, 0, // start
            7, 2, 0, 2, 0, 3, 0, 1, 0, // quadratic
            6, 0x00,
        ]);

        let image = decode(&data).unwrap();

        assert_eq!(
            image.commands,
            vec![Command::FillPath {
                fill_style: Style::FlatColor { color_index: 0 },
                path: vec![Segment {
                    start: Point::new(1.0, 1.0),
                    commands: vec![
                        SegmentCommandKind::QuadraticBezier {
                            control: Point::new(2.0, 2.0),
                            point_1: Point::new(3.0, 1.0),
                        },
                        SegmentCommandKind::ClosePath,
                    ],
                }],
            }]
        );
    }
}
