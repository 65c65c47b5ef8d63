//! Arena-backed element tree handed over by the markup binding layer.
//!
//! Nodes own their children through [`NodeKind::Group`]; the upward link is a plain
//! [`NodeId`] that is only ever used to look up inherited style.

use kurbo::Rect;

use crate::error::{Error, Result};

/// Handle of a node inside its [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena, usable to index per-node side tables
    pub fn index(self) -> usize {
        self.0
    }
}

/// Attributes shared by all element kinds
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    /// Element `id`, kept for log messages
    pub id: Option<String>,
    /// Raw `style="key:value;..."` declaration list
    pub style: Option<String>,
    /// `fill` presentation attribute, raw
    pub fill: Option<String>,
    /// `stroke` presentation attribute, raw
    pub stroke: Option<String>,
    /// Element opacity in `0..=1`
    pub opacity: Option<f64>,
    /// Fill opacity in `0..=1`
    pub fill_opacity: Option<f64>,
    /// Stroke opacity in `0..=1`
    pub stroke_opacity: Option<f64>,
    /// Stroke width in document units
    pub stroke_width: Option<f64>,
}

impl Attributes {
    /// Sets the `fill` attribute
    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    /// Sets the `stroke` attribute
    pub fn with_stroke(mut self, stroke: impl Into<String>) -> Self {
        self.stroke = Some(stroke.into());
        self
    }

    /// Sets the `style` declaration list
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Sets the element opacity, clamped to `0..=1`
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity.clamp(0.0, 1.0));
        self
    }
}

/// Element kind with its geometry attributes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `g` and the `svg` root
    Group {
        /// Children in document order
        children: Vec<NodeId>,
    },
    /// `path`
    Path {
        /// Unparsed path data
        data: String,
    },
    /// `rect`
    Rectangle {
        /// Left edge
        x: f64,
        /// Top edge
        y: f64,
        /// Horizontal extent
        width: f64,
        /// Vertical extent
        height: f64,
        /// Horizontal corner radius, 0 for square corners
        radius_x: f64,
        /// Vertical corner radius, 0 for square corners
        radius_y: f64,
    },
    /// `circle`
    Circle {
        /// Center x
        cx: f64,
        /// Center y
        cy: f64,
        /// Radius
        radius: f64,
    },
    /// `ellipse`
    Ellipse {
        /// Center x
        cx: f64,
        /// Center y
        cy: f64,
        /// Horizontal radius
        radius_x: f64,
        /// Vertical radius
        radius_y: f64,
    },
    /// `polygon`
    Polygon {
        /// Unparsed `points` list
        points: String,
    },
    /// `polyline`
    Polyline {
        /// Unparsed `points` list
        points: String,
    },
    /// `style`, kept but never drawn
    StyleBlock {
        /// Text content of the element
        content: String,
    },
}

impl NodeKind {
    /// Rectangle with square corners
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        NodeKind::Rectangle {
            x,
            y,
            width,
            height,
            radius_x: 0.0,
            radius_y: 0.0,
        }
    }

    /// Path from unparsed data
    pub fn path(data: impl Into<String>) -> Self {
        NodeKind::Path { data: data.into() }
    }

    /// Whether the node can produce geometry at all
    pub fn is_drawable(&self) -> bool {
        !matches!(self, NodeKind::Group { .. } | NodeKind::StyleBlock { .. })
    }
}

/// A node in the arena
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Common attributes
    pub attributes: Attributes,
    /// Element kind
    pub kind: NodeKind,
    parent: Option<NodeId>,
}

/// A complete source document: canvas size, optional viewBox and the node arena
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Output canvas width in pixels
    pub width: u32,
    /// Output canvas height in pixels
    pub height: u32,
    /// Document-space area shown on the canvas, the canvas itself when absent
    pub view_box: Option<Rect>,
    nodes: Vec<Node>,
}

impl Document {
    /// Creates a document whose root is an empty group
    pub fn new(width: u32, height: u32) -> Self {
        Document {
            width,
            height,
            view_box: None,
            nodes: vec![Node {
                attributes: Attributes::default(),
                kind: NodeKind::Group {
                    children: Vec::new(),
                },
                parent: None,
            }],
        }
    }

    /// The root group
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Attributes of the `svg` element itself
    pub fn root_attributes_mut(&mut self) -> &mut Attributes {
        &mut self.nodes[0].attributes
    }

    /// Appends a node as the last child of `parent`
    pub fn append(
        &mut self,
        parent: NodeId,
        attributes: Attributes,
        kind: NodeKind,
    ) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());

        match self.nodes.get_mut(parent.0).map(|n| &mut n.kind) {
            Some(NodeKind::Group { children }) => children.push(id),
            Some(_) => {
                return Err(Error::Schema(format!(
                    "node {} cannot have children",
                    parent.0
                )))
            }
            None => return Err(Error::Schema(format!("unknown parent node {}", parent.0))),
        }

        self.nodes.push(Node {
            attributes,
            kind,
            parent: Some(parent),
        });

        Ok(id)
    }

    /// Node behind `id`. Panics for handles of another document.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes, the root group included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Direct children of `id`, empty for anything but groups
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Group { children } => children,
            _ => &[],
        }
    }

    /// All nodes in document order (depth first, parents before children)
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            document: self,
            stack: vec![self.root()],
        }
    }

    /// Ancestors of `id` starting with `id` itself
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |id| self.nodes[id.0].parent)
    }

    /// Rectangle of document space mapped onto the output image
    pub fn viewport(&self) -> Rect {
        self.view_box
            .unwrap_or_else(|| Rect::new(0.0, 0.0, self.width as f64, self.height as f64))
    }
}

/// Pre-order iterator returned by [`Document::descendants`]
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.document.children(id).iter().rev().copied());

        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, [NodeId; 4]) {
        let mut doc = Document::new(24, 24);
        let root = doc.root();
        let group = doc
            .append(root, Attributes::default(), NodeKind::Group { children: vec![] })
            .unwrap();
        let a = doc
            .append(group, Attributes::default(), NodeKind::path("M0 0"))
            .unwrap();
        let b = doc
            .append(root, Attributes::default(), NodeKind::rectangle(0.0, 0.0, 1.0, 1.0))
            .unwrap();

        (doc, [root, group, a, b])
    }

    #[test]
    fn descendants_are_depth_first() {
        let (doc, [root, group, a, b]) = sample();
        let order: Vec<_> = doc.descendants().collect();

        assert_eq!(order, vec![root, group, a, b]);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let (doc, [root, group, a, _]) = sample();
        let chain: Vec<_> = doc.ancestors(a).collect();

        assert_eq!(chain, vec![a, group, root]);
    }

    #[test]
    fn leaves_cannot_adopt_children() {
        let (mut doc, [_, _, a, _]) = sample();
        let result = doc.append(a, Attributes::default(), NodeKind::path(""));

        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn viewport_defaults_to_canvas() {
        let doc = Document::new(48, 32);
        assert_eq!(doc.viewport(), Rect::new(0.0, 0.0, 48.0, 32.0));
    }
}
