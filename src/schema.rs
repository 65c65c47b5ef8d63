//! Binds SVG markup onto the element tree, enforcing the element and attribute allow-lists.
//!
//! Three outcomes exist for anything the binder does not understand: a few elements and
//! attributes are tolerated and only mark the document as partially supported, a few
//! features fail fast as unsupported, and everything else is a schema violation.

use kurbo::Rect;
use roxmltree::ParsingOptions;
use tracing::debug;

use crate::error::{Error, Result};
use crate::path;
use crate::tree::{Attributes, Document, NodeId, NodeKind};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Accepted but ignored, the document is only partially supported
const TOLERATED_ATTRIBUTES: &[&str] = &[
    "class",
    "font-weight",
    "letter-spacing",
    "word-spacing",
    "vector-effect",
    "display",
    "preserveAspectRatio",
];

/// Accepted presentation attributes that do not affect the output
const IGNORED_ATTRIBUTES: &[&str] = &[
    "overflow",
    "stroke-miterlimit",
    "stroke-linecap",
    "stroke-linejoin",
];

const TOLERATED_ELEMENTS: &[&str] = &["defs", "use"];

const UNSUPPORTED_ELEMENTS: &[&str] = &[
    "linearGradient",
    "radialGradient",
    "clipPath",
    "mask",
    "pattern",
    "text",
];

const UNSUPPORTED_ATTRIBUTES: &[&str] = &["clip-path", "mask"];

/// How much of a bound document the converter can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// Everything in the markup was understood
    Full,
    /// Tolerated elements or attributes were dropped
    Partial,
}

/// Result of binding a markup document
#[derive(Debug, Clone)]
pub struct Bound {
    /// The bound element tree
    pub document: Document,
    /// Whether anything was dropped while binding
    pub support: Support,
    /// What made the document partial, in document order
    pub notes: Vec<String>,
}

/// Parses `text` and binds it onto a [`Document`]
pub fn parse_svg(text: &str) -> Result<Bound> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let xml = roxmltree::Document::parse_with_options(text, options)?;
    let root = xml.root_element();

    if root.tag_name().name() != "svg" {
        return Err(Error::Schema(format!(
            "root element must be <svg>, found <{}>",
            root.tag_name().name()
        )));
    }

    let view_box = match root.attribute("viewBox") {
        Some(value) => Some(view_box(value)?),
        None => None,
    };

    let width = dimension(root, "width", view_box.map(|b| b.width()))?;
    let height = dimension(root, "height", view_box.map(|b| b.height()))?;

    let mut binder = Binder {
        document: Document::new(width, height),
        notes: Vec::new(),
    };
    binder.document.view_box = view_box;

    let attributes = binder.attributes(root, &["version", "viewBox", "x", "y", "width", "height"])?;
    *binder.document.root_attributes_mut() = attributes;

    let parent = binder.document.root();
    binder.children(root, parent)?;

    let support = if binder.notes.is_empty() {
        Support::Full
    } else {
        Support::Partial
    };

    Ok(Bound {
        document: binder.document,
        support,
        notes: binder.notes,
    })
}

fn view_box(value: &str) -> Result<Rect> {
    match path::parse_numbers(value)?.as_slice() {
        &[x, y, width, height] if width >= 0.0 && height >= 0.0 => {
            Ok(Rect::new(x, y, x + width, y + height))
        }
        _ => Err(Error::Schema(format!("invalid viewBox {:?}", value))),
    }
}

/// Canvas extent in whole pixels, falling back to the viewBox extent
fn dimension(node: roxmltree::Node, name: &str, fallback: Option<f64>) -> Result<u32> {
    let value = match (number(node, name)?, fallback) {
        (Some(value), _) | (None, Some(value)) => value,
        (None, None) => {
            return Err(Error::Schema(format!(
                "document has neither {} nor viewBox",
                name
            )))
        }
    };

    if !value.is_finite() || value < 0.0 || value.ceil() > f64::from(u32::MAX) {
        return Err(Error::Schema(format!("invalid {} {}", name, value)));
    }

    Ok(value.ceil() as u32)
}

fn number(node: roxmltree::Node, name: &str) -> Result<Option<f64>> {
    let raw = match node.attribute(name) {
        Some(raw) => raw,
        None => return Ok(None),
    };

    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix("px").unwrap_or(trimmed);

    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| Error::Schema(format!("invalid number {:?} for attribute {}", raw, name)))
}

fn number_or_zero(node: roxmltree::Node, name: &str) -> Result<f64> {
    Ok(number(node, name)?.unwrap_or(0.0))
}

struct Binder {
    document: Document,
    notes: Vec<String>,
}

impl Binder {
    fn partial(&mut self, note: String) {
        debug!("partially supported: {}", note);
        self.notes.push(note);
    }

    fn children(&mut self, node: roxmltree::Node, parent: NodeId) -> Result<()> {
        for child in node.children().filter(|n| n.is_element()) {
            self.element(child, parent)?;
        }

        Ok(())
    }

    fn element(&mut self, node: roxmltree::Node, parent: NodeId) -> Result<()> {
        let name = node.tag_name().name();

        let kind = match name {
            "g" => NodeKind::Group {
                children: Vec::new(),
            },
            "path" => NodeKind::path(node.attribute("d").unwrap_or_default()),
            "rect" => {
                let (radius_x, radius_y) = match (number(node, "rx")?, number(node, "ry")?) {
                    (Some(rx), Some(ry)) => (rx, ry),
                    (Some(r), None) | (None, Some(r)) => (r, r),
                    (None, None) => (0.0, 0.0),
                };

                NodeKind::Rectangle {
                    x: number_or_zero(node, "x")?,
                    y: number_or_zero(node, "y")?,
                    width: number_or_zero(node, "width")?,
                    height: number_or_zero(node, "height")?,
                    radius_x,
                    radius_y,
                }
            }
            "circle" => NodeKind::Circle {
                cx: number_or_zero(node, "cx")?,
                cy: number_or_zero(node, "cy")?,
                radius: number_or_zero(node, "r")?,
            },
            "ellipse" => {
                let radius = number(node, "r")?;

                NodeKind::Ellipse {
                    cx: number_or_zero(node, "cx")?,
                    cy: number_or_zero(node, "cy")?,
                    radius_x: number(node, "rx")?.or(radius).unwrap_or(0.0),
                    radius_y: number(node, "ry")?.or(radius).unwrap_or(0.0),
                }
            }
            "polygon" => NodeKind::Polygon {
                points: node.attribute("points").unwrap_or_default().to_owned(),
            },
            "polyline" => NodeKind::Polyline {
                points: node.attribute("points").unwrap_or_default().to_owned(),
            },
            "style" => {
                let content: String = node
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect::<String>()
                    .trim()
                    .to_owned();

                if !content.is_empty() {
                    self.partial("style sheet rules are not applied".to_owned());
                }

                NodeKind::StyleBlock { content }
            }
            tolerated if TOLERATED_ELEMENTS.contains(&tolerated) => {
                self.partial(format!("<{}> skipped", tolerated));
                return Ok(());
            }
            unsupported if UNSUPPORTED_ELEMENTS.contains(&unsupported) => {
                return Err(Error::UnsupportedFeature(format!("<{}>", unsupported)));
            }
            unknown => return Err(Error::Schema(format!("unknown element <{}>", unknown))),
        };

        let attributes = self.attributes(node, element_attributes(name))?;
        let id = self.document.append(parent, attributes, kind)?;

        if name == "g" {
            self.children(node, id)?;
        }

        Ok(())
    }

    /// Validates every attribute of `node` and collects the shared ones
    fn attributes(&mut self, node: roxmltree::Node, specific: &[&str]) -> Result<Attributes> {
        let mut attributes = Attributes::default();
        let element = node.tag_name().name();

        for attribute in node.attributes() {
            if attribute.namespace() == Some(XML_NAMESPACE) {
                continue;
            }

            let name = attribute.name();
            let value = attribute.value();

            match name {
                "id" => attributes.id = Some(value.to_owned()),
                "style" => attributes.style = Some(value.to_owned()),
                "fill" => attributes.fill = Some(value.trim().to_owned()),
                "stroke" => attributes.stroke = Some(value.trim().to_owned()),
                "opacity" => attributes.opacity = number(node, name)?.map(unit_interval),
                "fill-opacity" => attributes.fill_opacity = number(node, name)?.map(unit_interval),
                "stroke-opacity" => {
                    attributes.stroke_opacity = number(node, name)?.map(unit_interval)
                }
                "stroke-width" => attributes.stroke_width = number(node, name)?,
                "transform" => self.partial(format!("transform on <{}> not applied", element)),
                ignored if IGNORED_ATTRIBUTES.contains(&ignored) => {}
                specific_name if specific.contains(&specific_name) => {}
                tolerated if TOLERATED_ATTRIBUTES.contains(&tolerated) => {
                    self.partial(format!("attribute {} on <{}> ignored", tolerated, element))
                }
                unsupported if UNSUPPORTED_ATTRIBUTES.contains(&unsupported) => {
                    return Err(Error::UnsupportedFeature(format!(
                        "attribute {} on <{}>",
                        unsupported, element
                    )))
                }
                unknown => {
                    return Err(Error::Schema(format!(
                        "unknown attribute {} on <{}>",
                        unknown, element
                    )))
                }
            }
        }

        Ok(attributes)
    }
}

/// Attributes read by the element itself rather than shared by all elements
fn element_attributes(element: &str) -> &'static [&'static str] {
    match element {
        "path" => &["d", "fill-rule"],
        "rect" => &["x", "y", "width", "height", "rx", "ry"],
        "circle" => &["cx", "cy", "r"],
        "ellipse" => &["cx", "cy", "r", "rx", "ry"],
        "polygon" | "polyline" => &["points"],
        "style" => &["type"],
        _ => &[],
    }
}

fn unit_interval(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn svg(body: &str) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24">{}</svg>"#,
            body
        )
    }

    #[test]
    fn binds_shapes_in_order() {
        let bound = parse_svg(&svg(
            r##"<g fill="#ff0000"><rect x="1" y="2" width="3" height="4"/><path d="M0 0 L1 1"/></g><circle cx="5" cy="5" r="2"/>"##,
        ))
        .unwrap();

        assert_eq!(bound.support, Support::Full);

        let doc = &bound.document;
        assert_eq!(doc.width, 24);
        assert_eq!(doc.view_box, Some(Rect::new(0.0, 0.0, 24.0, 24.0)));

        let kinds: Vec<_> = doc.descendants().map(|id| doc.node(id).kind.clone()).collect();
        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[2], NodeKind::rectangle(1.0, 2.0, 3.0, 4.0));
        assert_eq!(kinds[3], NodeKind::path("M0 0 L1 1"));

        let group = doc.children(doc.root())[0];
        assert_eq!(doc.node(group).attributes.fill.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn size_falls_back_to_view_box() {
        let bound = parse_svg(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10.5 7"></svg>"#,
        )
        .unwrap();

        assert_eq!((bound.document.width, bound.document.height), (11, 7));
    }

    #[test]
    fn missing_size_is_a_schema_error() {
        let err = parse_svg(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).unwrap_err();

        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn rounded_rect_radius_defaults_to_other_axis() {
        let bound = parse_svg(&svg(r#"<rect width="10" height="10" ry="3"/>"#)).unwrap();
        let doc = &bound.document;
        let rect = doc.children(doc.root())[0];

        match doc.node(rect).kind {
            NodeKind::Rectangle {
                radius_x, radius_y, ..
            } => assert_eq!((radius_x, radius_y), (3.0, 3.0)),
            ref other => panic!("expected rectangle, got {:?}", other),
        }
    }

    #[test]
    fn tolerated_markup_marks_partial() {
        let bound = parse_svg(&svg(
            r#"<defs><path d="M0 0"/></defs><path class="a" d="M0 0 L1 1" transform="scale(2)"/>"#,
        ))
        .unwrap();

        assert_eq!(bound.support, Support::Partial);
        assert_eq!(bound.notes.len(), 3);
        // defs content is not bound
        assert_eq!(bound.document.node_count(), 2);
    }

    #[test]
    fn xml_namespace_attributes_are_ignored() {
        let bound = parse_svg(&svg(r#"<g xml:space="preserve"/>"#)).unwrap();

        assert_eq!(bound.support, Support::Full);
    }

    #[test]
    fn unsupported_features_fail_fast() {
        let err = parse_svg(&svg(r#"<linearGradient id="g"/>"#)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));

        let err = parse_svg(&svg(r#"<path d="M0 0" clip-path="url(#c)"/>"#)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn unknown_markup_is_rejected() {
        let err = parse_svg(&svg(r#"<image href="x.png"/>"#)).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        let err = parse_svg(&svg(r#"<rect width="1" height="1" filter="blur"/>"#)).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        let err = parse_svg(r#"<html/>"#).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn malformed_xml() {
        assert!(matches!(parse_svg("<svg"), Err(Error::Xml(_))));
    }

    #[test]
    fn style_block_content() {
        let bound = parse_svg(&svg(r#"<style type="text/css">.a { fill: red }</style>"#)).unwrap();
        let doc = &bound.document;
        let style = doc.children(doc.root())[0];

        assert_eq!(
            doc.node(style).kind,
            NodeKind::StyleBlock {
                content: ".a { fill: red }".into()
            }
        );
        assert_eq!(bound.support, Support::Partial);
    }
}
