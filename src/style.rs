//! Resolution of fill/stroke paints and construction of the color table.

use std::collections::BTreeMap;

use piet::Color;
use tracing::warn;

use crate::error::{Error, Result};
use crate::format::StyleType;
use crate::tree::{Document, NodeId};

/// Color behind the `#dark` alias
pub const DARK: Color = Color::rgba8(0x20, 0x20, 0x20, 0xff);
/// Color behind the `#middle` alias
pub const MIDDLE: Color = Color::rgba8(0x80, 0x80, 0x80, 0xff);
/// Color behind the `#light` alias
pub const LIGHT: Color = Color::rgba8(0xe0, 0xe0, 0xe0, 0xff);

const BLACK: Color = Color::rgba8(0x00, 0x00, 0x00, 0xff);
const TRANSPARENT: Color = Color::rgba8(0x00, 0x00, 0x00, 0x00);

const DEFAULT_LINE_WIDTH: f64 = 1.0;

/// Paint attached to a shape. Only flat colors are produced by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleRef {
    /// Single color, opacity already applied
    FlatColor(Color),
    /// Never produced, only recognized by the encoder
    LinearGradient,
    /// Never produced, only recognized by the encoder
    RadialGradient,
}

impl StyleRef {
    /// Discriminator written into count/style bytes
    pub fn style_type(&self) -> StyleType {
        match self {
            StyleRef::FlatColor(_) => StyleType::FlatColor,
            StyleRef::LinearGradient => StyleType::LinearGradient,
            StyleRef::RadialGradient => StyleType::RadialGradient,
        }
    }
}

/// Fully inherited paint of a single node
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    /// `None` when the shape is not filled
    pub fill: Option<StyleRef>,
    /// `None` when the shape is not stroked
    pub stroke: Option<StyleRef>,
    /// Stroke width in document units
    pub line_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Paint {
    Inherit,
    None,
    Set(StyleRef),
}

#[derive(Debug, Clone)]
struct LocalStyle {
    fill: Paint,
    stroke: Paint,
    stroke_width: Option<f64>,
}

/// Color table that still accepts insertions
#[derive(Debug, Clone, Default)]
pub struct ColorTable {
    colors: Vec<Color>,
}

impl ColorTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `color` unless an identical value is present, returning its index
    pub fn insert(&mut self, color: Color) -> usize {
        let key = color.as_rgba_u32();

        match self.colors.iter().position(|c| c.as_rgba_u32() == key) {
            Some(index) => index,
            None => {
                self.colors.push(color);
                self.colors.len() - 1
            }
        }
    }

    /// Finalizes the table. An empty table gets a single transparent black entry.
    pub fn close(mut self) -> ClosedColorTable {
        if self.colors.is_empty() {
            self.colors.push(TRANSPARENT);
        }

        ClosedColorTable {
            colors: self.colors,
        }
    }
}

/// Finalized color table, only usable for lookups
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedColorTable {
    colors: Vec<Color>,
}

impl ClosedColorTable {
    /// Index of an exact RGBA match
    pub fn index_of(&self, color: &Color) -> Result<usize> {
        let key = color.as_rgba_u32();

        self.colors
            .iter()
            .position(|c| c.as_rgba_u32() == key)
            .ok_or(Error::ColorNotInTable(key))
    }

    /// Entries in index order
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }
}

/// Counters collected while converting; merged across a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Style declaration keys that were ignored, with occurrence counts
    pub unsupported_keys: BTreeMap<String, usize>,
    /// Paint and number values replaced by a default, with occurrence counts
    pub unsupported_values: BTreeMap<String, usize>,
    /// Recovered problems such as oversized corner radii
    pub warnings: usize,
    /// Shapes dropped because their paint cannot be encoded
    pub skipped_shapes: usize,
}

impl Diagnostics {
    /// Adds every counter of `other` to `self`
    pub fn merge(&mut self, other: &Diagnostics) {
        for (key, count) in &other.unsupported_keys {
            *self.unsupported_keys.entry(key.clone()).or_default() += count;
        }
        for (value, count) in &other.unsupported_values {
            *self.unsupported_values.entry(value.clone()).or_default() += count;
        }
        self.warnings += other.warnings;
        self.skipped_shapes += other.skipped_shapes;
    }

    /// True when nothing had to be ignored or substituted
    pub fn is_clean(&self) -> bool {
        self.unsupported_values.is_empty() && self.warnings == 0 && self.skipped_shapes == 0
    }

    pub(crate) fn unsupported_value(&mut self, value: &str) {
        *self.unsupported_values.entry(value.to_owned()).or_default() += 1;
    }
}

/// Per-node local paints; inherited values are looked up through the parent chain
#[derive(Debug, Clone)]
pub struct StyleSheet {
    locals: Vec<LocalStyle>,
}

impl StyleSheet {
    /// Resolves every node of `document` and returns the closed color table holding
    /// every color a drawable node can reference.
    pub fn resolve(
        document: &Document,
        diagnostics: &mut Diagnostics,
    ) -> (StyleSheet, ClosedColorTable) {
        let mut table = ColorTable::new();
        let mut locals = vec![
            LocalStyle {
                fill: Paint::Inherit,
                stroke: Paint::Inherit,
                stroke_width: None,
            };
            document.node_count()
        ];

        for id in document.descendants() {
            locals[id.index()] = resolve_local(document, id, &mut table, diagnostics);
        }

        let sheet = StyleSheet { locals };

        // picks up the implicit black fill of leaves without any fill in their chain
        for id in document.descendants() {
            if !document.node(id).kind.is_drawable() {
                continue;
            }
            if let Some(StyleRef::FlatColor(color)) = sheet.fill(document, id) {
                table.insert(color);
            }
        }

        (sheet, table.close())
    }

    /// Fill of `id`, falling back to the nearest ancestor that sets one, then to black
    pub fn fill(&self, document: &Document, id: NodeId) -> Option<StyleRef> {
        match self.inherited(document, id, |local| &local.fill) {
            Some(paint) => paint,
            None => Some(StyleRef::FlatColor(BLACK)),
        }
    }

    /// Stroke of `id`, falling back to the nearest ancestor that sets one
    pub fn stroke(&self, document: &Document, id: NodeId) -> Option<StyleRef> {
        self.inherited(document, id, |local| &local.stroke)
            .unwrap_or(None)
    }

    /// Stroke width of `id`, inherited, 1 when nothing sets it
    pub fn line_width(&self, document: &Document, id: NodeId) -> f64 {
        document
            .ancestors(id)
            .find_map(|id| self.locals[id.index()].stroke_width)
            .unwrap_or(DEFAULT_LINE_WIDTH)
    }

    /// Fill, stroke and width of `id` in one value
    pub fn resolved(&self, document: &Document, id: NodeId) -> ResolvedStyle {
        ResolvedStyle {
            fill: self.fill(document, id),
            stroke: self.stroke(document, id),
            line_width: self.line_width(document, id),
        }
    }

    /// Outer `None` means no node in the chain sets the paint at all
    fn inherited(
        &self,
        document: &Document,
        id: NodeId,
        select: impl Fn(&LocalStyle) -> &Paint,
    ) -> Option<Option<StyleRef>> {
        document
            .ancestors(id)
            .find_map(|id| match select(&self.locals[id.index()]) {
                Paint::Inherit => None,
                Paint::None => Some(None),
                Paint::Set(style) => Some(Some(style.clone())),
            })
    }
}

/// Splits `key:value;key:value` into a map with lowercase keys
pub fn parse_declarations(style: &str) -> BTreeMap<String, String> {
    style
        .split(';')
        .filter_map(|declaration| declaration.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Parses a `#` color constant, including the `#dark`, `#middle` and `#light` aliases
pub fn parse_color(value: &str) -> Result<Color> {
    match value {
        "#dark" => Ok(DARK),
        "#middle" => Ok(MIDDLE),
        "#light" => Ok(LIGHT),
        _ => Color::from_hex_str(value).map_err(|_| Error::UnsupportedStyle(value.to_owned())),
    }
}

/// Multiplies every channel, alpha included, by `opacity`
pub fn apply_opacity(color: &Color, opacity: f64) -> Color {
    let opacity = opacity.clamp(0.0, 1.0);
    let (r, g, b, a) = color.as_rgba8();
    let scale = |channel: u8| (channel as f64 * opacity).round() as u8;

    Color::rgba8(scale(r), scale(g), scale(b), scale(a))
}

fn resolve_local(
    document: &Document,
    id: NodeId,
    table: &mut ColorTable,
    diagnostics: &mut Diagnostics,
) -> LocalStyle {
    let attributes = &document.node(id).attributes;
    let mut declarations = attributes
        .style
        .as_deref()
        .map(parse_declarations)
        .unwrap_or_default();

    let mut number = |key: &str, attribute: Option<f64>| -> Option<f64> {
        let raw = declarations.remove(key);
        if attribute.is_some() {
            return attribute;
        }

        raw.and_then(|raw| match raw.trim_end_matches("px").parse::<f64>() {
            Ok(value) => Some(value),
            Err(_) => {
                diagnostics.unsupported_value(&raw);
                None
            }
        })
    };

    let opacity = number("opacity", attributes.opacity).unwrap_or(1.0);
    let fill_opacity = number("fill-opacity", attributes.fill_opacity).unwrap_or(1.0);
    let stroke_opacity = number("stroke-opacity", attributes.stroke_opacity).unwrap_or(1.0);
    let stroke_width = number("stroke-width", attributes.stroke_width);

    let fill_value = attributes.fill.clone().or_else(|| declarations.remove("fill"));
    let stroke_value = attributes
        .stroke
        .clone()
        .or_else(|| declarations.remove("stroke"));
    declarations.remove("fill");
    declarations.remove("stroke");

    for key in declarations.into_keys() {
        *diagnostics.unsupported_keys.entry(key).or_default() += 1;
    }

    LocalStyle {
        fill: resolve_paint(fill_value.as_deref(), opacity * fill_opacity, table, diagnostics),
        stroke: resolve_paint(
            stroke_value.as_deref(),
            opacity * stroke_opacity,
            table,
            diagnostics,
        ),
        stroke_width,
    }
}

fn resolve_paint(
    value: Option<&str>,
    opacity: f64,
    table: &mut ColorTable,
    diagnostics: &mut Diagnostics,
) -> Paint {
    let value = match value.map(str::trim) {
        None => return Paint::Inherit,
        Some("none") => return Paint::None,
        Some(value) => value,
    };

    let color = if value.starts_with('#') {
        parse_color(value)
    } else {
        Err(Error::UnsupportedStyle(value.to_owned()))
    };

    match color {
        Ok(color) => {
            let color = apply_opacity(&color, opacity);
            table.insert(color.clone());
            Paint::Set(StyleRef::FlatColor(color))
        }
        Err(err) => {
            warn!("{}, painting nothing instead", err);
            diagnostics.unsupported_value(value);
            Paint::None
        }
    }
}
