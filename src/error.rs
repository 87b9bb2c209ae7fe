//! Error types for the font engine.
//!
//! This module defines all error types that can occur while reading font
//! programs, metric files and while resolving fonts in the registry.

/// Result type alias for font engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during font processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unexpected end of the byte source
    #[error("End of font data reached unexpectedly")]
    UnexpectedEof,

    /// Bad signature or magic number
    #[error("Invalid font file: {0}")]
    InvalidFontFile(String),

    /// Requested collection member does not exist
    #[error("Font index {index} out of range (collection holds {count} fonts)")]
    FontIndexOutOfRange {
        /// Requested member index
        index: u32,
        /// Number of fonts in the collection
        count: u32,
    },

    /// A mandatory sfnt table is absent
    #[error("Required font table is missing: '{0}'")]
    MissingRequiredTable(String),

    /// A mandatory section of a font program is absent (e.g. `eexec`)
    #[error("Required section is missing: {0}")]
    MissingRequiredSection(String),

    /// Malformed PFB segment header
    #[error("Invalid PFB segment at byte {offset}: {reason}")]
    InvalidPfbSegment {
        /// Byte offset of the segment header
        offset: usize,
        /// What was wrong
        reason: String,
    },

    /// External encoding table could not be found
    #[error("Encoding map not found: {0}")]
    EncodingMapNotFound(String),

    /// AFM/PFM signature check failed
    #[error("Metrics file format mismatch: {0}")]
    MetricsFormatMismatch(String),

    /// Registry lookup failed
    #[error("Font not found: {0}")]
    FontNotFound(String),

    /// An alias is already bound to another family
    #[error("Font alias '{alias}' is already bound to family '{family}'")]
    AmbiguousFontAlias {
        /// The alias being registered
        alias: String,
        /// The family it already points to
        family: String,
    },

    /// Structurally invalid charstring program
    #[error("Invalid charstring: {0}")]
    InvalidCharstring(String),

    /// Subroutine nesting exceeded the configured limit
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(usize),

    /// Malformed XML metric document
    #[error("XML error: {0}")]
    Xml(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}
