//! Font data model.
//!
//! A [`FontData`] is the immutable, fully parsed form of a registered font.
//! It is one of five variants:
//!
//! - `TrueType`: simple font, 8-bit encoding, `glyf` outlines
//! - `TrueTypeUnicode`: CID font addressed by glyph index, `glyf` outlines
//! - `OpenTypeUnicode`: CID font with CFF outlines
//! - `Type0`: CJK font addressed through a code page or UCS-2 CMap, never embedded
//! - `Type1`: simple font with PostScript charstrings
//!
//! All variants answer the [`FontOps`] questions the document layer asks:
//! how wide a string is, which bytes to write in a content stream, the
//! width array of the font dictionary and, when embedding, the font
//! program and its ToUnicode map.
//!
//! Width, glyph and kerning tables are held in `Arc` so fonts built from
//! the same tables share them.

mod load;
mod truetype;
mod type0;
mod type1;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::Arc;

use bitflags::bitflags;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fonts::font_subsetter::GlyphUsage;
use crate::fonts::type1::Segments;

pub use truetype::{Outline, TrueTypeData, UnicodeData};
pub use type0::{Type0Data, Type0Encoding};
pub use type1::Type1Data;
pub(crate) use type1::style_from as type1_style;

/// Character code or CID to advance width in 1/1000 em.
pub type GlyphWidthMap = HashMap<u32, u16>;

/// Character code to glyph index.
pub type CharGlyphMap = HashMap<u32, u16>;

/// First code to second code to kerning adjustment in 1/1000 em.
pub type KernPairMap = HashMap<u32, HashMap<u32, i16>>;

bitflags! {
    /// Font descriptor flags (PDF 32000-1:2008 Table 123).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FontFlags: u32 {
        /// Bit 1: all glyphs have the same width
        const FIXED_PITCH = 1 << 0;
        /// Bit 2: glyphs have serifs
        const SERIF = 1 << 1;
        /// Bit 3: glyphs outside the Adobe standard Latin set
        const SYMBOLIC = 1 << 2;
        /// Bit 4: glyphs resemble cursive handwriting
        const SCRIPT = 1 << 3;
        /// Bit 6: uses the Adobe standard Latin set
        const NONSYMBOLIC = 1 << 5;
        /// Bit 7: dominant vertical strokes are slanted
        const ITALIC = 1 << 6;
        /// Bit 17: no lowercase letters
        const ALL_CAP = 1 << 16;
        /// Bit 18: lowercase letters are small capitals
        const SMALL_CAP = 1 << 17;
        /// Bit 19: embolden at small sizes
        const FORCE_BOLD = 1 << 18;
    }
}

bitflags! {
    /// Style of a font within its family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FontStyle: u8 {
        const REGULAR = 0;
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
    }
}

impl FontStyle {
    /// Parse a style string such as `"B"`, `"I"`, `"BI"` or `"bold italic"`.
    pub fn parse(style: &str) -> Self {
        let lower = style.to_ascii_lowercase();
        let mut result = FontStyle::REGULAR;
        if lower.contains("bold") || (lower.len() <= 2 && lower.contains('b')) {
            result |= FontStyle::BOLD;
        }
        if lower.contains("italic")
            || lower.contains("oblique")
            || (lower.len() <= 2 && lower.contains('i'))
        {
            result |= FontStyle::ITALIC;
        }
        result
    }
}

/// Font descriptor metrics in 1/1000 em.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FontDescription {
    pub ascent: i32,
    pub descent: i32,
    pub cap_height: i32,
    pub flags: FontFlags,
    pub font_bbox: [i32; 4],
    pub italic_angle: f64,
    pub stem_v: i32,
    pub missing_width: i32,
    pub x_height: i32,
    pub underline_position: i32,
    pub underline_thickness: i32,
}

/// Closed set of font kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontKind {
    TrueType,
    TrueTypeUnicode,
    OpenTypeUnicode,
    Type0,
    Type1,
}

impl FontKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontKind::TrueType => "TrueType",
            FontKind::TrueTypeUnicode => "TrueTypeUnicode",
            FontKind::OpenTypeUnicode => "OpenTypeUnicode",
            FontKind::Type0 => "Type0",
            FontKind::Type1 => "Type1",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "TrueType" => Some(FontKind::TrueType),
            "TrueTypeUnicode" => Some(FontKind::TrueTypeUnicode),
            "OpenTypeUnicode" => Some(FontKind::OpenTypeUnicode),
            "Type0" => Some(FontKind::Type0),
            "Type1" => Some(FontKind::Type1),
            _ => None,
        }
    }

    /// Whether text is written as 2-byte CIDs.
    pub fn is_cid_font(&self) -> bool {
        matches!(self, FontKind::TrueTypeUnicode | FontKind::OpenTypeUnicode | FontKind::Type0)
    }
}

/// How a font program is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFileKind {
    /// Type1 program, `/FontFile`
    Type1,
    /// TrueType program, `/FontFile2`
    TrueType,
    /// Bare CFF, `/FontFile3` with subtype `/CIDFontType0C`
    Cff,
}

impl FontFileKind {
    /// Font descriptor key of the stream.
    pub fn descriptor_key(&self) -> &'static str {
        match self {
            FontFileKind::Type1 => "FontFile",
            FontFileKind::TrueType => "FontFile2",
            FontFileKind::Cff => "FontFile3",
        }
    }

    /// Stream `/Subtype`, if any.
    pub fn subtype(&self) -> Option<&'static str> {
        match self {
            FontFileKind::Cff => Some("CIDFontType0C"),
            _ => None,
        }
    }
}

/// An embeddable font program stream.
#[derive(Debug, Clone)]
pub struct FontProgram {
    pub kind: FontFileKind,
    pub data: Vec<u8>,
    /// `/Length1`: whole program (TrueType) or cleartext part (Type1)
    pub length1: usize,
    /// `/Length2`: encrypted part of a Type1 program
    pub length2: usize,
    /// `/Length3`: trailer of a Type1 program
    pub length3: usize,
    /// Whether `data` is zlib compressed (`/Filter /FlateDecode`).
    pub compressed: bool,
}

impl FontProgram {
    pub fn new(kind: FontFileKind, data: Vec<u8>) -> Self {
        Self {
            kind,
            length1: data.len(),
            length2: 0,
            length3: 0,
            data,
            compressed: false,
        }
    }

    /// A Type1 program from its three parts.
    pub fn from_segments(segments: &Segments) -> Self {
        let mut data = Vec::with_capacity(
            segments.cleartext.len() + segments.encrypted.len() + segments.trailer.len(),
        );
        data.extend_from_slice(&segments.cleartext);
        data.extend_from_slice(&segments.encrypted);
        data.extend_from_slice(&segments.trailer);
        Self {
            kind: FontFileKind::Type1,
            data,
            length1: segments.cleartext.len(),
            length2: segments.encrypted.len(),
            length3: segments.trailer.len(),
            compressed: false,
        }
    }

    /// Zlib compress the stream. The lengths keep describing the
    /// uncompressed program.
    pub fn compress(mut self) -> Result<Self> {
        if self.compressed {
            return Ok(self);
        }
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.data)?;
        self.data = encoder.finish()?;
        self.compressed = true;
        Ok(self)
    }

    fn finish(self, config: &EngineConfig) -> Result<Self> {
        if config.compress_font_programs {
            self.compress()
        } else {
            Ok(self)
        }
    }
}

/// Properties every variant carries.
#[derive(Debug, Clone)]
pub struct FontInfo {
    /// PostScript (base font) name.
    pub name: String,
    pub family: String,
    pub style: FontStyle,
    pub description: FontDescription,
    /// Widths keyed by the variant's character code.
    pub widths: Arc<GlyphWidthMap>,
    pub kern_pairs: Option<Arc<KernPairMap>>,
    pub embed_allowed: bool,
    pub subset_allowed: bool,
    pub config: EngineConfig,
}

impl FontInfo {
    /// Width of a code; unknown codes are zero wide.
    fn code_width(&self, code: u32) -> u16 {
        self.widths.get(&code).copied().unwrap_or(0)
    }

    fn kern(&self, left: u32, right: u32) -> i16 {
        self.kern_pairs
            .as_ref()
            .and_then(|pairs| pairs.get(&left))
            .and_then(|row| row.get(&right))
            .copied()
            .unwrap_or(0)
    }

    fn measure(&self, codes: &[u32], kerning: bool) -> f64 {
        let mut width: f64 = codes.iter().map(|&c| self.code_width(c) as f64).sum();
        if kerning {
            width += codes
                .windows(2)
                .map(|pair| self.kern(pair[0], pair[1]) as f64)
                .sum::<f64>();
        }
        width
    }

    fn kerning_positions(&self, codes: &[u32]) -> Vec<(usize, i32)> {
        codes
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| match self.kern(pair[0], pair[1]) {
                0 => None,
                k => Some((i, -(k as i32))),
            })
            .collect()
    }
}

/// Operations the document layer performs on a font.
pub trait FontOps {
    /// Width of `text` in 1/1000 em, optionally with pair kerning.
    fn string_width(&self, text: &str, kerning: bool) -> f64;

    /// Bytes to write in a content stream string for `text`. Glyphs are
    /// recorded in `usage` when given.
    fn convert_code_to_glyph(&self, text: &str, usage: Option<&mut GlyphUsage>) -> Vec<u8>;

    /// The `/Widths` (simple fonts) or `/W` (CID fonts) array.
    fn widths_as_string(&self, usage: Option<&GlyphUsage>) -> String;

    /// The embeddable program, subset to `usage` in subset mode. `None`
    /// when the font is not embedded.
    fn write_font_program(&self, usage: Option<&GlyphUsage>) -> Result<Option<FontProgram>>;

    /// A ToUnicode CMap for the glyphs in `usage`.
    fn write_unicode_map(&self, usage: Option<&GlyphUsage>) -> Option<Vec<u8>>;
}

/// Fully parsed font.
#[derive(Debug)]
pub enum FontData {
    TrueType(TrueTypeData),
    TrueTypeUnicode(UnicodeData),
    OpenTypeUnicode(UnicodeData),
    Type0(Type0Data),
    Type1(Type1Data),
}

macro_rules! dispatch {
    ($self:expr, $font:ident => $body:expr) => {
        match $self {
            FontData::TrueType($font) => $body,
            FontData::TrueTypeUnicode($font) | FontData::OpenTypeUnicode($font) => $body,
            FontData::Type0($font) => $body,
            FontData::Type1($font) => $body,
        }
    };
}

impl FontData {
    pub fn kind(&self) -> FontKind {
        match self {
            FontData::TrueType(_) => FontKind::TrueType,
            FontData::TrueTypeUnicode(_) => FontKind::TrueTypeUnicode,
            FontData::OpenTypeUnicode(_) => FontKind::OpenTypeUnicode,
            FontData::Type0(_) => FontKind::Type0,
            FontData::Type1(_) => FontKind::Type1,
        }
    }

    pub fn info(&self) -> &FontInfo {
        dispatch!(self, font => &font.info)
    }

    /// PostScript name.
    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn family(&self) -> &str {
        &self.info().family
    }

    pub fn style(&self) -> FontStyle {
        self.info().style
    }

    pub fn description(&self) -> &FontDescription {
        &self.info().description
    }

    /// Whether the font program may and can be embedded.
    pub fn embed_supported(&self) -> bool {
        self.info().embed_allowed && dispatch!(self, font => font.has_program())
    }

    /// Whether an embedded program may and can be reduced to a subset.
    pub fn subset_supported(&self) -> bool {
        let capable = match self {
            FontData::TrueTypeUnicode(_) | FontData::OpenTypeUnicode(_) | FontData::Type1(_) => true,
            FontData::TrueType(_) | FontData::Type0(_) => false,
        };
        capable && self.embed_supported() && self.info().subset_allowed
    }

    /// A usage record for one document. Subsetting is only switched on
    /// when the font supports it.
    pub fn new_glyph_usage(&self, subset: bool) -> GlyphUsage {
        GlyphUsage::new(subset && self.subset_supported())
    }

    /// `/BaseFont` name: `ABCDEF+Name` for subsets.
    pub fn base_font_name(&self, usage: Option<&GlyphUsage>) -> String {
        match usage {
            Some(u) if u.is_subset() && self.embed_supported() => u.subset_font_name(self.name()),
            _ => self.name().to_string(),
        }
    }

    /// Positions and `TJ` adjustments of kerned pairs in `text`: `(i, a)`
    /// means adjustment `a` goes between characters `i` and `i + 1`.
    pub fn kerning_width_array(&self, text: &str) -> Vec<(usize, i32)> {
        dispatch!(self, font => {
            let codes = font.text_codes(text);
            font.info.kerning_positions(&codes)
        })
    }

    /// `/CIDToGIDMap` stream data: two bytes per CID holding the original
    /// glyph index. Only subset TrueType outline fonts need one.
    pub fn cid_to_gid_map(&self, usage: &GlyphUsage) -> Option<Vec<u8>> {
        match self {
            FontData::TrueTypeUnicode(font) => font.cid_to_gid_map(usage),
            _ => None,
        }
    }

    /// `/CIDSet` stream data for CID fonts.
    pub fn cid_set(&self, usage: &GlyphUsage) -> Option<Vec<u8>> {
        match self {
            FontData::TrueTypeUnicode(font) | FontData::OpenTypeUnicode(font) => {
                Some(font.cid_set(usage))
            },
            _ => None,
        }
    }

    /// `/Differences` array content of a simple font's encoding.
    pub fn diff(&self) -> Option<String> {
        match self {
            FontData::TrueType(font) => font.diff(),
            FontData::Type1(font) => font.diff(),
            _ => None,
        }
    }

    /// Name of the encoding (simple fonts) or CMap (Type0) used.
    pub fn encoding_name(&self) -> Option<&str> {
        match self {
            FontData::TrueType(font) => Some(font.encoding().name()),
            FontData::Type1(font) => Some(font.encoding().name()),
            FontData::Type0(font) => Some(font.cmap_name()),
            _ => None,
        }
    }
}

impl FontOps for FontData {
    fn string_width(&self, text: &str, kerning: bool) -> f64 {
        dispatch!(self, font => font.string_width(text, kerning))
    }

    fn convert_code_to_glyph(&self, text: &str, usage: Option<&mut GlyphUsage>) -> Vec<u8> {
        dispatch!(self, font => font.convert_code_to_glyph(text, usage))
    }

    fn widths_as_string(&self, usage: Option<&GlyphUsage>) -> String {
        dispatch!(self, font => font.widths_as_string(usage))
    }

    fn write_font_program(&self, usage: Option<&GlyphUsage>) -> Result<Option<FontProgram>> {
        if !self.info().embed_allowed {
            log::debug!("Font '{}' does not permit embedding", self.name());
            return Ok(None);
        }
        dispatch!(self, font => font.write_font_program(usage))
    }

    fn write_unicode_map(&self, usage: Option<&GlyphUsage>) -> Option<Vec<u8>> {
        dispatch!(self, font => font.write_unicode_map(usage))
    }
}

/// `[w w ...]` over `first..=last`, `missing` for codes without a width.
pub(crate) fn simple_widths_string(
    widths: &GlyphWidthMap,
    first: u8,
    last: u8,
    missing: u16,
) -> String {
    let mut s = String::from("[");
    for code in first..=last {
        if code != first {
            s.push(' ');
        }
        let w = widths.get(&(code as u32)).copied().unwrap_or(missing);
        let _ = write!(s, "{}", w);
    }
    s.push(']');
    s
}

/// `[c [w w] c [w]]`: runs of consecutive CIDs.
pub(crate) fn cid_widths_string(entries: &[(u16, u16)]) -> String {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|&(cid, _)| cid);
    sorted.dedup_by_key(|&mut (cid, _)| cid);

    let mut s = String::from("[");
    let mut prev: Option<u16> = None;
    for (cid, width) in sorted {
        match prev {
            Some(p) if p as u32 + 1 == cid as u32 => {
                let _ = write!(s, " {}", width);
            },
            Some(_) => {
                let _ = write!(s, "] {} [{}", cid, width);
            },
            None => {
                let _ = write!(s, "{} [{}", cid, width);
            },
        }
        prev = Some(cid);
    }
    if prev.is_some() {
        s.push(']');
    }
    s.push(']');
    s
}

/// One bit per CID, most significant bit first.
pub(crate) fn cid_set_bits(cids: impl IntoIterator<Item = u16>) -> Vec<u8> {
    let mut bits: Vec<u8> = Vec::new();
    for cid in cids {
        let byte = cid as usize / 8;
        if bits.len() <= byte {
            bits.resize(byte + 1, 0);
        }
        bits[byte] |= 0x80 >> (cid % 8);
    }
    bits
}

/// Kerning pairs keyed by code from pairs keyed by some other id.
pub(crate) fn kern_map<K, F>(pairs: impl IntoIterator<Item = (K, K, i16)>, codes_of: F) -> KernPairMap
where
    F: Fn(&K) -> Vec<u32>,
{
    let mut map = KernPairMap::new();
    for (left, right, value) in pairs {
        if value == 0 {
            continue;
        }
        let rights = codes_of(&right);
        for l in codes_of(&left) {
            let row = map.entry(l).or_default();
            for &r in &rights {
                row.insert(r, value);
            }
        }
    }
    map
}
