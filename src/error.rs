//! Error taxonomy shared by every conversion stage

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while binding, resolving, encoding or decoding a document
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed path data or `points` list
    #[error("syntax error at offset {offset} near {found:?}")]
    Syntax {
        /// Byte offset into the parsed text
        offset: usize,
        /// Input at the offset, shortened
        found: String,
    },

    /// Markup that does not match the accepted element/attribute schema
    #[error("invalid document: {0}")]
    Schema(String),

    /// The input is not well-formed XML
    #[error("malformed markup")]
    Xml(#[from] roxmltree::Error),

    /// Features of the source language this format cannot express
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Paint value that is neither `none` nor a color constant
    #[error("unsupported style value {0:?}")]
    UnsupportedStyle(String),

    /// A coordinate does not fit into a signed 16 bit unit at the current scale
    #[error("value {value} out of range at scale exponent {scale}")]
    RangeOverflow {
        /// Offending document-space value
        value: f64,
        /// Scale exponent of the failed attempt
        scale: u8,
    },

    /// Retrying down to scale exponent 0 did not help
    #[error("value {value} does not fit even at scale exponent 0")]
    PrecisionExhausted {
        /// Offending document-space value
        value: f64,
    },

    /// Canvas sizes are stored as 16 bit values
    #[error("image size {width}x{height} exceeds 16 bit limits")]
    DimensionsTooLarge {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Internal: a record must hold at least one element
    #[error("attempted to write a record with zero elements")]
    EmptyRecord,

    /// Internal: a record holds at most 64 elements
    #[error("record with {0} elements exceeds the 64 element limit")]
    RecordTooLarge(usize),

    /// Internal: the resolver missed a color
    #[error("color {0:#010x} was never inserted into the color table")]
    ColorNotInTable(u32),

    /// Bytes that are not a valid encoded file
    #[error("invalid encoded data at offset {offset}: {reason}")]
    Decode {
        /// Byte offset of the failure
        offset: usize,
        /// Parser that rejected the input
        reason: String,
    },

    /// Internal: a packed byte could not be built
    #[error("bit packing failed")]
    Packing(#[from] packed_struct::PackingError),

    /// Failure of an underlying writer
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Contract violations that indicate a bug in the converter rather than a bad input
    /// document. A batch run must stop on these instead of skipping the document.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::EmptyRecord
                | Error::RecordTooLarge(_)
                | Error::ColorNotInTable(_)
                | Error::Packing(_)
                | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_classification() {
        assert!(Error::EmptyRecord.is_internal());
        assert!(Error::ColorNotInTable(0xff).is_internal());
        assert!(!Error::PrecisionExhausted { value: 1e9 }.is_internal());
        assert!(!Error::Syntax {
            offset: 3,
            found: "x".into()
        }
        .is_internal());
    }
}
