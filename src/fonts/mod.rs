//! Font parsing, metrics and subsetting.
//!
//! Parsers for the supported font formats live in their own modules:
//! - [`truetype_parser`]: sfnt fonts and collections (`.ttf`, `.otf`, `.ttc`)
//! - [`cff`]: CFF tables of OpenType fonts, including the subset writer
//! - [`type1`]: PostScript Type1 programs (PFB, PFA, Mac resources) with AFM/PFM metrics
//! - [`metrics_xml`]: preprocessed metric documents
//!
//! [`charstring`] decodes Type1 and Type2 glyph programs for widths and
//! subroutine usage. [`font_data`] turns parsed fonts into the values the
//! document layer works with.

pub mod cff;
pub mod charstring;
pub mod cursor;
pub mod encoding;
pub mod font_data;
pub mod font_subsetter;
pub mod glyph_list;
pub mod metrics_xml;
pub mod reordering;
pub mod tounicode;
pub mod truetype_parser;
pub mod type1;

pub use cursor::ByteCursor;
pub use encoding::{CodePage, Encoding};
pub use font_data::{
    FontData, FontDescription, FontFileKind, FontFlags, FontKind, FontOps, FontProgram,
    FontStyle,
};
pub use font_subsetter::GlyphUsage;
pub use metrics_xml::{parse_metrics_xml, MetricsDocument};
pub use reordering::{ReorderRule, Reordering};
pub use truetype_parser::TrueTypeFont;
pub use type1::{Type1Font, Type1Metrics};
