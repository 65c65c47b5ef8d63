//! S-expression dump of a decoded image, used by `--dump` and for eyeballing encoder output.

use std::fmt::{Display, Result, Write};

use crate::format::*;

impl Image {
    /// Writes the textual form of the image to `w`
    pub fn render_text(&self, w: &mut impl std::io::Write) -> crate::Result<()> {
        struct Writer<'a, W> {
            inner: &'a mut W,
            error: Option<std::io::Error>,
        }

        impl<'a, W> Write for Writer<'a, W>
        where
            W: std::io::Write,
        {
            fn write_str(&mut self, s: &str) -> Result {
                if self.error.is_some() {
                    return Err(std::fmt::Error);
                }

                if let Err(e) = self.inner.write_all(s.as_bytes()) {
                    self.error = Some(e);
                    return Err(std::fmt::Error);
                }

                Ok(())
            }
        }

        let mut writer = Writer {
            inner: w,
            error: None,
        };

        let formatted = self.to_text(&mut writer, 0);

        if let Some(e) = writer.error {
            return Err(e.into());
        }

        formatted.map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "formatting failed"))?;

        Ok(())
    }

    /// Textual form as a string
    pub fn to_text_string(&self) -> String {
        self.display().to_string()
    }
}

trait ToTextFormat: Sized {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result;

    fn display(&self) -> Wrap<'_, Self> {
        Wrap {
            inner: self,
            indent: 0,
        }
    }

    fn indent(&self, indent: usize) -> Wrap<'_, Self> {
        Wrap {
            inner: self,
            indent,
        }
    }
}

struct Indent(usize);

impl Display for Indent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        for _ in 0..self.0 {
            write!(f, "  ")?;
        }

        Ok(())
    }
}

struct Wrap<'a, T> {
    indent: usize,
    inner: &'a T,
}

impl<'a, T> Display for Wrap<'a, T>
where
    T: ToTextFormat,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result {
        self.inner.to_text(f, self.indent)
    }
}

impl ToTextFormat for Image {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        writeln!(w, "(tvg {}", self.header.version)?;

        self.header.to_text(w, indent + 1)?;
        NotNewlineSeparated(&self.color_table).to_text(w, indent + 1)?;
        NewlineSeparated(&self.commands).to_text(w, indent + 1)?;

        writeln!(w, ")")
    }
}

impl ToTextFormat for Header {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        let color_format = match self.color_encoding {
            ColorEncoding::Rgb565 => "rgb565",
            ColorEncoding::Rgba8888 => "u8888",
            ColorEncoding::RgbaF32 => "rgbaf32",
        };

        let range = match self.coordinate_range {
            CoordinateRange::Default => "default",
            CoordinateRange::Enhanced => "enhanced",
            CoordinateRange::Reduced => "reduced",
        };

        writeln!(
            w,
            "{}({width} {height} 1/{scale} {format} {range})",
            Indent(indent),
            width = self.width,
            height = self.height,
            scale = 1u32 << self.scale,
            format = color_format,
            range = range,
        )
    }
}

struct NotNewlineSeparated<'a, T>(&'a T);

impl<'a, T> ToTextFormat for NotNewlineSeparated<'a, Vec<T>>
where
    T: ToTextFormat,
{
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        writeln!(w, "{}(", Indent(indent))?;

        for c in self.0 {
            writeln!(w, "{}({})", Indent(indent + 1), c.indent(indent + 2))?;
        }

        writeln!(w, "{})", Indent(indent))
    }
}

struct NewlineSeparated<'a, T>(&'a T);

impl<'a, T> ToTextFormat for NewlineSeparated<'a, Vec<T>>
where
    T: ToTextFormat,
{
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        writeln!(w, "{}(", Indent(indent))?;

        for c in self.0 {
            writeln!(
                w,
                "{}(\n{}{})",
                Indent(indent + 1),
                c.indent(indent + 1),
                Indent(indent + 1)
            )?;
        }

        writeln!(w, "{})", Indent(indent))
    }
}

struct NewlineSeparatedNoExtraParens<'a, T>(&'a T);

impl<'a, T> ToTextFormat for NewlineSeparatedNoExtraParens<'a, Vec<T>>
where
    T: ToTextFormat,
{
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        writeln!(w, "{}(", Indent(indent))?;

        for c in self.0 {
            write!(w, "{}", c.indent(indent + 1))?;
        }

        writeln!(w, "{})", Indent(indent))
    }
}

/// A bare point on its own line, for point lists
struct PointLine(Point);

impl ToTextFormat for PointLine {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        writeln!(w, "{}({})", Indent(indent), self.0.display())
    }
}

fn points(list: &[Point]) -> Vec<PointLine> {
    list.iter().copied().map(PointLine).collect()
}

impl ToTextFormat for Color {
    fn to_text(&self, w: &mut impl Write, _indent: usize) -> Result {
        let (red, green, blue, alpha) = self.as_rgba();

        write!(w, "{:.3} {:.3} {:.3}", red, green, blue)?;
        if alpha < 1.0 {
            write!(w, " {:.3}", alpha)?;
        }

        Ok(())
    }
}

impl ToTextFormat for Command {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        let indent = indent + 1;

        match self {
            Command::FillPolygon {
                fill_style,
                polygon,
            } => {
                writeln!(w, "{}fill_polygon\n{}", Indent(indent), fill_style.indent(indent))?;
                NewlineSeparatedNoExtraParens(&points(polygon)).to_text(w, indent)
            }
            Command::FillRectangles {
                fill_style,
                rectangles,
            } => {
                writeln!(
                    w,
                    "{}fill_rectangles\n{}",
                    Indent(indent),
                    fill_style.indent(indent)
                )?;
                NotNewlineSeparated(rectangles).to_text(w, indent)
            }
            Command::FillPath { fill_style, path } => {
                writeln!(w, "{}fill_path\n{}", Indent(indent), fill_style.indent(indent))?;
                NewlineSeparatedNoExtraParens(path).to_text(w, indent)
            }
            Command::DrawLineLoop {
                line_style,
                line_width,
                points: list,
            } => {
                line_header(w, indent, "draw_line_loop", line_style, *line_width)?;
                NewlineSeparatedNoExtraParens(&points(list)).to_text(w, indent)
            }
            Command::DrawLineStrip {
                line_style,
                line_width,
                points: list,
            } => {
                line_header(w, indent, "draw_line_strip", line_style, *line_width)?;
                NewlineSeparatedNoExtraParens(&points(list)).to_text(w, indent)
            }
            Command::DrawLinePath {
                line_style,
                line_width,
                path,
            } => {
                line_header(w, indent, "draw_line_path", line_style, *line_width)?;
                NewlineSeparatedNoExtraParens(path).to_text(w, indent)
            }
            Command::OutlineFillPolygon {
                fill_style,
                line_style,
                line_width,
                points: list,
            } => {
                outline_header(w, indent, "outline_fill_polygon", fill_style, line_style, *line_width)?;
                NewlineSeparatedNoExtraParens(&points(list)).to_text(w, indent)
            }
            Command::OutlineFillRectangles {
                fill_style,
                line_style,
                line_width,
                rectangles,
            } => {
                outline_header(
                    w,
                    indent,
                    "outline_fill_rectangles",
                    fill_style,
                    line_style,
                    *line_width,
                )?;
                NotNewlineSeparated(rectangles).to_text(w, indent)
            }
            Command::OutlineFillPath {
                fill_style,
                line_style,
                line_width,
                path,
            } => {
                outline_header(w, indent, "outline_fill_path", fill_style, line_style, *line_width)?;
                NewlineSeparatedNoExtraParens(path).to_text(w, indent)
            }
        }
    }
}

fn line_header(
    w: &mut impl Write,
    indent: usize,
    name: &str,
    line_style: &Style,
    line_width: f64,
) -> Result {
    writeln!(
        w,
        "{indent}{name}\n{line_style}\n{indent}{line_width}",
        indent = Indent(indent),
        name = name,
        line_style = line_style.indent(indent),
        line_width = line_width,
    )
}

fn outline_header(
    w: &mut impl Write,
    indent: usize,
    name: &str,
    fill_style: &Style,
    line_style: &Style,
    line_width: f64,
) -> Result {
    writeln!(
        w,
        "{indent}{name}\n{fill_style}\n{line_style}\n{indent}{line_width}",
        indent = Indent(indent),
        name = name,
        fill_style = fill_style.indent(indent),
        line_style = line_style.indent(indent),
        line_width = line_width,
    )
}

impl ToTextFormat for Segment {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        writeln!(w, "{}({})", Indent(indent), self.start.display())?;

        NotNewlineSeparated(&self.commands).to_text(w, indent)
    }
}

impl ToTextFormat for Rect {
    fn to_text(&self, w: &mut impl Write, _indent: usize) -> Result {
        write!(w, "{} {} {} {}", self.x0, self.y0, self.width(), self.height())
    }
}

impl ToTextFormat for SegmentCommandKind {
    fn to_text(&self, w: &mut impl Write, _indent: usize) -> Result {
        match self {
            SegmentCommandKind::Line { end } => write!(w, "line ({})", end.display()),
            SegmentCommandKind::VerticalLine { y } => write!(w, "vert {}", y),
            SegmentCommandKind::HorizontalLine { x } => write!(w, "horiz {}", x),
            SegmentCommandKind::CubicBezier {
                control_0,
                control_1,
                point_1,
            } => write!(
                w,
                "bezier ({}) ({}) ({})",
                control_0.display(),
                control_1.display(),
                point_1.display()
            ),
            SegmentCommandKind::ArcCircle {
                large,
                sweep,
                radius,
                target,
            } => write!(
                w,
                "arc_circle {} {} {} ({})",
                radius,
                large,
                sweep.display(),
                target.display(),
            ),
            SegmentCommandKind::ArcEllipse {
                large,
                sweep,
                radius_x,
                radius_y,
                rotation,
                target,
            } => write!(
                w,
                "arc_ellipse {} {} {} {} {} ({})",
                radius_x,
                radius_y,
                rotation,
                large,
                sweep.display(),
                target.display(),
            ),
            SegmentCommandKind::ClosePath => write!(w, "close"),
            SegmentCommandKind::QuadraticBezier { control, point_1 } => write!(
                w,
                "quadratic_bezier ({}) ({})",
                control.display(),
                point_1.display()
            ),
        }
    }
}

impl ToTextFormat for Sweep {
    fn to_text(&self, w: &mut impl Write, _indent: usize) -> Result {
        let sweep = match self {
            Sweep::Left => "false",
            Sweep::Right => "true",
        };

        write!(w, "{}", sweep)
    }
}

impl ToTextFormat for Point {
    fn to_text(&self, w: &mut impl Write, _indent: usize) -> Result {
        write!(w, "{} {}", self.x, self.y)
    }
}

impl ToTextFormat for Style {
    fn to_text(&self, w: &mut impl Write, indent: usize) -> Result {
        write!(w, "{}(", Indent(indent))?;
        match self {
            Style::FlatColor { color_index } => write!(w, "flat {}", color_index)?,

            Style::LinearGradient {
                point_0,
                point_1,
                color_index_0,
                color_index_1,
            } => write!(
                w,
                "linear ({}) ({}) {} {}",
                point_0.display(),
                point_1.display(),
                color_index_0,
                color_index_1
            )?,

            Style::RadialGradient {
                point_0,
                point_1,
                color_index_0,
                color_index_1,
            } => write!(
                w,
                "radial ({}) ({}) {} {}",
                point_0.display(),
                point_1.display(),
                color_index_0,
                color_index_1
            )?,
        }
        write!(w, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(commands: Vec<Command>) -> Image {
        Image {
            header: Header {
                version: 1,
                scale: 2,
                color_encoding: ColorEncoding::Rgba8888,
                coordinate_range: CoordinateRange::Default,
                width: 16,
                height: 8,
                color_count: 1,
            },
            color_table: vec![Color::rgba8(255, 0, 0, 255)],
            commands,
        }
    }

    #[test]
    fn header_and_palette() {
        let text = image(vec![]).to_text_string();

        assert!(text.starts_with("(tvg 1\n"));
        assert!(text.contains("(16 8 1/4 u8888 default)"));
        assert!(text.contains("(1.000 0.000 0.000)"));
        assert!(text.trim_end().ends_with(')'));
    }

    #[test]
    fn commands_are_listed() {
        let text = image(vec![
            Command::FillRectangles {
                fill_style: Style::FlatColor { color_index: 0 },
                rectangles: vec![Rect::new(1.0, 2.0, 4.0, 6.0)],
            },
            Command::DrawLinePath {
                line_style: Style::FlatColor { color_index: 0 },
                line_width: 1.5,
                path: vec![Segment {
                    start: Point::new(0.0, 0.0),
                    commands: vec![SegmentCommandKind::ClosePath],
                }],
            },
        ])
        .to_text_string();

        assert!(text.contains("fill_rectangles"));
        assert!(text.contains("(flat 0)"));
        assert!(text.contains("(1 2 3 4)"));
        assert!(text.contains("draw_line_path"));
        assert!(text.contains("1.5"));
        assert!(text.contains("(close)"));
    }

    #[test]
    fn render_text_matches_display() {
        let image = image(vec![]);
        let mut out = Vec::new();
        image.render_text(&mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), image.to_text_string());
    }
}
