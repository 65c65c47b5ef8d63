#![warn(missing_docs)]
//! Converter from SVG documents to the TinyVG binary vector graphics format.
//!
//! The pipeline runs in four stages: [`schema`] binds markup onto an element
//! [`Document`], [`style`] resolves paints and builds the color table, [`geometry`]
//! lowers elements into drawable shapes and [`encode`] writes the quantized command
//! stream. [`decode`] reads the produced format back for inspection.

pub mod decode;
pub mod encode;
pub mod error;
pub mod format;
pub mod geometry;
pub mod path;
pub mod schema;
pub mod style;
mod text_format;
pub mod tree;

pub use error::{Error, Result};
pub use format::Image;
pub use schema::{parse_svg, Bound, Support};
pub use style::Diagnostics;
pub use tree::Document;

use encode::Analysis;
use style::StyleSheet;
use tracing::debug;

/// Outcome of converting a single document
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Complete encoded file
    pub bytes: Vec<u8>,
    /// Scale exponent the file was written with
    pub scale: u8,
    /// Number of encode attempts, at least one
    pub attempts: u32,
    /// Recovered problems met along the way
    pub diagnostics: Diagnostics,
}

/// Converts a bound document into an encoded file
pub fn convert(document: &Document) -> Result<Conversion> {
    let mut diagnostics = Diagnostics::default();

    let analysis = Analysis::new(document)?;
    let (sheet, table) = StyleSheet::resolve(document, &mut diagnostics);
    let shapes = encode::collect_shapes(document, &sheet, &mut diagnostics)?;

    debug!(
        shapes = shapes.len(),
        colors = table.colors().len(),
        scale = analysis.scale,
        "encoding document"
    );

    let encoded = encode::encode(&analysis, &table, &shapes)?;

    Ok(Conversion {
        bytes: encoded.bytes,
        scale: encoded.scale,
        attempts: encoded.attempts,
        diagnostics,
    })
}

/// Parses and converts SVG markup in one step
pub fn convert_svg(text: &str) -> Result<(Conversion, Support)> {
    let bound = parse_svg(text)?;
    let conversion = convert(&bound.document)?;

    Ok((conversion, bound.support))
}
