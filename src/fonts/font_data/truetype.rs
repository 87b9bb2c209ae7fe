//! Font data built from sfnt fonts: the simple `TrueType` variant and the
//! glyph-indexed `TrueTypeUnicode` / `OpenTypeUnicode` variants.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fonts::cff::CffFont;
use crate::fonts::encoding::Encoding;
use crate::fonts::font_subsetter::GlyphUsage;
use crate::fonts::reordering::Reordering;
use crate::fonts::tounicode::write_tounicode_cmap;
use crate::fonts::truetype_parser::TrueTypeFont;

use super::{
    cid_set_bits, cid_widths_string, kern_map, simple_widths_string, CharGlyphMap, FontFileKind,
    FontInfo, FontOps, FontProgram, GlyphWidthMap, KernPairMap,
};

/// Outline technology of a glyph-indexed font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outline {
    /// `glyf` outlines, embedded as `/FontFile2`
    TrueType,
    /// `CFF ` outlines, embedded as bare CFF
    Cff,
}

fn sfnt_info(
    font: &TrueTypeFont<'_>,
    widths: GlyphWidthMap,
    kern_pairs: KernPairMap,
    config: &EngineConfig,
) -> FontInfo {
    let name = font.postscript_name().unwrap_or_else(|| "Unknown".to_string());
    let family = font.family_name().unwrap_or_else(|| name.clone());
    let permissions = font.permissions();
    FontInfo {
        name,
        family,
        style: font.style(),
        description: font.description(),
        widths: Arc::new(widths),
        kern_pairs: (!kern_pairs.is_empty()).then(|| Arc::new(kern_pairs)),
        embed_allowed: permissions.embed,
        subset_allowed: permissions.subset,
        config: config.clone(),
    }
}

/// Kerning pairs by glyph index rekeyed by the codes mapping to each glyph.
fn kerning_by_code(font: &TrueTypeFont<'_>, glyphs: &CharGlyphMap) -> KernPairMap {
    let pairs = font.kerning();
    if pairs.is_empty() {
        return KernPairMap::new();
    }
    let mut codes_by_glyph: HashMap<u16, Vec<u32>> = HashMap::new();
    for (&code, &gid) in glyphs {
        codes_by_glyph.entry(gid).or_default().push(code);
    }
    kern_map(pairs.into_iter().map(|((l, r), v)| (l, r, v)), |gid| {
        codes_by_glyph.get(gid).cloned().unwrap_or_default()
    })
}

/// A TrueType font used with an 8-bit encoding.
#[derive(Debug)]
pub struct TrueTypeData {
    pub(super) info: FontInfo,
    encoding: Arc<Encoding>,
    /// Codes address a (3,0) symbol cmap directly.
    symbolic: bool,
    /// Code to glyph index.
    char_to_glyph: Arc<CharGlyphMap>,
    program: Option<Arc<Vec<u8>>>,
}

impl TrueTypeData {
    /// Build from a parsed font. `program` is the standalone sfnt to embed.
    pub fn from_sfnt(
        font: &TrueTypeFont<'_>,
        program: Option<Arc<Vec<u8>>>,
        encoding: Arc<Encoding>,
        config: &EngineConfig,
    ) -> Self {
        let symbolic = font.is_symbolic();
        let mut widths = GlyphWidthMap::new();
        let mut glyphs = CharGlyphMap::new();
        for code in 0u32..256 {
            let gid = if symbolic {
                font.glyph_id(code)
            } else {
                encoding.unicode(code as u8).and_then(|u| font.glyph_id(u))
            };
            if let Some(gid) = gid {
                glyphs.insert(code, gid);
                widths.insert(code, font.glyph_width(gid));
            }
        }
        let kern_pairs = kerning_by_code(font, &glyphs);

        log::debug!(
            "TrueType font '{}' with encoding {}: {} codes mapped",
            font.postscript_name().unwrap_or_default(),
            encoding.name(),
            glyphs.len()
        );

        Self {
            info: sfnt_info(font, widths, kern_pairs, config),
            encoding,
            symbolic,
            char_to_glyph: Arc::new(glyphs),
            program,
        }
    }

    /// Build from precomputed metrics.
    pub fn from_parts(
        info: FontInfo,
        encoding: Arc<Encoding>,
        char_to_glyph: Option<Arc<CharGlyphMap>>,
        program: Option<Arc<Vec<u8>>>,
    ) -> Self {
        Self {
            symbolic: info.description.flags.contains(super::FontFlags::SYMBOLIC),
            info,
            encoding,
            char_to_glyph: char_to_glyph.unwrap_or_default(),
            program,
        }
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn char_to_glyph(&self) -> &CharGlyphMap {
        &self.char_to_glyph
    }

    pub(super) fn has_program(&self) -> bool {
        self.program.is_some()
    }

    fn code_for(&self, ch: char) -> Option<u32> {
        let unicode = ch as u32;
        if self.symbolic {
            return match unicode {
                0..=0xFF => Some(unicode),
                0xF000..=0xF0FF => Some(unicode & 0xFF),
                _ => None,
            };
        }
        self.encoding.code_for_char(ch).map(u32::from)
    }

    pub(super) fn text_codes(&self, text: &str) -> Vec<u32> {
        text.chars()
            .filter_map(|ch| {
                let code = self.code_for(ch);
                if code.is_none() {
                    log::warn!(
                        "Character U+{:04X} is not in encoding {} of font '{}'",
                        ch as u32,
                        self.encoding.name(),
                        self.info.name
                    );
                }
                code
            })
            .collect()
    }

    pub(super) fn diff(&self) -> Option<String> {
        if self.symbolic {
            return None;
        }
        let diff = self.encoding.differences_from(&Encoding::win_ansi());
        (!diff.is_empty()).then_some(diff)
    }
}

impl FontOps for TrueTypeData {
    fn string_width(&self, text: &str, kerning: bool) -> f64 {
        self.info.measure(&self.text_codes(text), kerning)
    }

    fn convert_code_to_glyph(&self, text: &str, mut usage: Option<&mut GlyphUsage>) -> Vec<u8> {
        let codes = self.text_codes(text);
        if let Some(usage) = usage.as_mut() {
            for &code in &codes {
                match self.char_to_glyph.get(&code) {
                    Some(&gid) => {
                        usage.use_char(code, gid);
                    },
                    None => usage.use_code(code),
                }
            }
        }
        codes.into_iter().map(|c| c as u8).collect()
    }

    fn widths_as_string(&self, _usage: Option<&GlyphUsage>) -> String {
        let config = &self.info.config;
        let missing = self.info.description.missing_width.clamp(0, u16::MAX as i32) as u16;
        simple_widths_string(&self.info.widths, config.first_char, config.last_char, missing)
    }

    fn write_font_program(&self, _usage: Option<&GlyphUsage>) -> Result<Option<FontProgram>> {
        let Some(program) = &self.program else {
            return Ok(None);
        };
        FontProgram::new(FontFileKind::TrueType, program.to_vec())
            .finish(&self.info.config)
            .map(Some)
    }

    fn write_unicode_map(&self, _usage: Option<&GlyphUsage>) -> Option<Vec<u8>> {
        None
    }
}

/// A glyph-indexed (CID) font with TrueType or CFF outlines.
#[derive(Debug)]
pub struct UnicodeData {
    /// Widths keyed by Unicode code point.
    pub(super) info: FontInfo,
    outline: Outline,
    char_to_glyph: Arc<CharGlyphMap>,
    glyph_widths: Arc<HashMap<u16, u16>>,
    /// GID to CID of a CID-keyed CFF font.
    cids: Option<Arc<HashMap<u16, u16>>>,
    /// Whole sfnt (TrueType) or the `CFF ` table (CFF).
    program: Option<Arc<Vec<u8>>>,
    reordering: Option<Arc<Reordering>>,
}

impl UnicodeData {
    /// Build from a parsed font. `program` is the standalone sfnt; for CFF
    /// flavoured fonts the `CFF ` table is taken from the parsed font.
    pub fn from_sfnt(
        font: &TrueTypeFont<'_>,
        program: Option<Arc<Vec<u8>>>,
        reordering: Option<Arc<Reordering>>,
        config: &EngineConfig,
    ) -> Self {
        let char_to_glyph: CharGlyphMap = font.cmap().clone();
        let glyph_widths: HashMap<u16, u16> = (0..font.num_glyphs())
            .map(|gid| (gid, font.glyph_width(gid)))
            .collect();
        let widths: GlyphWidthMap = char_to_glyph
            .iter()
            .map(|(&code, gid)| (code, glyph_widths.get(gid).copied().unwrap_or(0)))
            .collect();
        let kern_pairs = kerning_by_code(font, &char_to_glyph);

        let mut info = sfnt_info(font, widths, kern_pairs, config);
        let (outline, program, cids) = match font.cff_table() {
            Some(table) => match cff_cids(table) {
                Ok(cids) => (Outline::Cff, program.map(|_| Arc::new(table.to_vec())), cids),
                Err(e) => {
                    log::warn!("Font '{}' has an unusable CFF table, not embedding: {}", info.name, e);
                    info.embed_allowed = false;
                    (Outline::Cff, None, None)
                },
            },
            None => (Outline::TrueType, program, None),
        };

        log::debug!(
            "{:?} outline font '{}': {} cmap entries, {} glyphs",
            outline,
            info.name,
            char_to_glyph.len(),
            glyph_widths.len()
        );

        Self {
            info,
            outline,
            char_to_glyph: Arc::new(char_to_glyph),
            glyph_widths: Arc::new(glyph_widths),
            cids,
            program,
            reordering,
        }
    }

    /// Build from precomputed metrics.
    pub fn from_parts(
        info: FontInfo,
        outline: Outline,
        char_to_glyph: Arc<CharGlyphMap>,
        glyph_widths: Arc<HashMap<u16, u16>>,
        program: Option<Arc<Vec<u8>>>,
        reordering: Option<Arc<Reordering>>,
    ) -> Self {
        let cids = match (outline, &program) {
            (Outline::Cff, Some(table)) => cff_cids(table).unwrap_or_else(|e| {
                log::warn!("Font '{}' has an unusable CFF program: {}", info.name, e);
                None
            }),
            _ => None,
        };
        Self {
            info,
            outline,
            char_to_glyph,
            glyph_widths,
            cids,
            program,
            reordering,
        }
    }

    pub fn outline(&self) -> Outline {
        self.outline
    }

    pub fn char_to_glyph(&self) -> &CharGlyphMap {
        &self.char_to_glyph
    }

    pub(super) fn has_program(&self) -> bool {
        self.program.is_some()
    }

    /// The CID addressing `gid` in the unmodified font.
    fn font_cid(&self, gid: u16) -> u16 {
        self.cids
            .as_ref()
            .and_then(|cids| cids.get(&gid))
            .copied()
            .unwrap_or(gid)
    }

    fn output_cid(&self, gid: u16, usage: &GlyphUsage) -> Option<u16> {
        if usage.is_subset() {
            usage.new_gid(gid)
        } else {
            Some(self.font_cid(gid))
        }
    }

    fn glyph_width(&self, gid: u16) -> u16 {
        match self.glyph_widths.get(&gid) {
            Some(&w) => w,
            None => self.info.description.missing_width.clamp(0, u16::MAX as i32) as u16,
        }
    }

    fn visual_text(&self, text: &str) -> String {
        match &self.reordering {
            Some(rules) if !rules.is_empty() => rules.apply(text),
            _ => text.to_string(),
        }
    }

    pub(super) fn text_codes(&self, text: &str) -> Vec<u32> {
        self.visual_text(text).chars().map(|c| c as u32).collect()
    }

    pub(super) fn cid_to_gid_map(&self, usage: &GlyphUsage) -> Option<Vec<u8>> {
        if !usage.is_subset() || self.outline != Outline::TrueType {
            return None;
        }
        Some(usage.glyph_order().iter().flat_map(|gid| gid.to_be_bytes()).collect())
    }

    pub(super) fn cid_set(&self, usage: &GlyphUsage) -> Vec<u8> {
        let order = usage.glyph_order();
        cid_set_bits(order.iter().filter_map(|&gid| self.output_cid(gid, usage)))
    }
}

fn cff_cids(table: &[u8]) -> Result<Option<Arc<HashMap<u16, u16>>>> {
    let cff = CffFont::parse(table)?;
    if !cff.is_cid_keyed() {
        return Ok(None);
    }
    let cids = (0..cff.glyph_count() as u16)
        .map(|gid| (gid, cff.cid_for_gid(gid)))
        .collect();
    Ok(Some(Arc::new(cids)))
}

impl FontOps for UnicodeData {
    fn string_width(&self, text: &str, kerning: bool) -> f64 {
        self.info.measure(&self.text_codes(text), kerning)
    }

    fn convert_code_to_glyph(&self, text: &str, mut usage: Option<&mut GlyphUsage>) -> Vec<u8> {
        let codes = self.text_codes(text);
        let mut out = Vec::with_capacity(codes.len() * 2);
        for code in codes {
            let Some(&gid) = self.char_to_glyph.get(&code) else {
                log::warn!("Font '{}' has no glyph for U+{:04X}", self.info.name, code);
                out.extend_from_slice(&[0, 0]);
                continue;
            };
            let cid = match usage.as_mut() {
                Some(usage) => {
                    let index = usage.use_char(code, gid);
                    if usage.is_subset() {
                        index
                    } else {
                        self.font_cid(gid)
                    }
                },
                None => self.font_cid(gid),
            };
            out.extend_from_slice(&cid.to_be_bytes());
        }
        out
    }

    fn widths_as_string(&self, usage: Option<&GlyphUsage>) -> String {
        let entries: Vec<(u16, u16)> = match usage {
            Some(usage) => usage
                .glyph_order()
                .into_iter()
                .filter_map(|gid| self.output_cid(gid, usage).map(|cid| (cid, self.glyph_width(gid))))
                .collect(),
            None => self
                .char_to_glyph
                .values()
                .map(|&gid| (self.font_cid(gid), self.glyph_width(gid)))
                .collect(),
        };
        cid_widths_string(&entries)
    }

    fn write_font_program(&self, usage: Option<&GlyphUsage>) -> Result<Option<FontProgram>> {
        let Some(program) = &self.program else {
            return Ok(None);
        };
        let font_program = match (self.outline, usage) {
            (Outline::Cff, Some(usage)) if usage.is_subset() => {
                let cff = CffFont::parse(program)?;
                let subset = cff.subset(&usage.glyph_order(), self.info.config.max_subr_depth)?;
                log::debug!(
                    "Subset CFF '{}': {} of {} glyphs, {} -> {} bytes",
                    self.info.name,
                    usage.glyph_count(),
                    cff.glyph_count(),
                    program.len(),
                    subset.len()
                );
                FontProgram::new(FontFileKind::Cff, subset)
            },
            (Outline::Cff, _) => FontProgram::new(FontFileKind::Cff, program.to_vec()),
            (Outline::TrueType, _) => FontProgram::new(FontFileKind::TrueType, program.to_vec()),
        };
        font_program.finish(&self.info.config).map(Some)
    }

    fn write_unicode_map(&self, usage: Option<&GlyphUsage>) -> Option<Vec<u8>> {
        let mappings: Vec<(u16, u32)> = match usage {
            Some(usage) => usage
                .used_chars()
                .iter()
                .filter_map(|(&code, &gid)| self.output_cid(gid, usage).map(|cid| (cid, code)))
                .collect(),
            None => {
                let mut all: Vec<(u16, u32)> = self
                    .char_to_glyph
                    .iter()
                    .map(|(&code, &gid)| (self.font_cid(gid), code))
                    .collect();
                // Lowest code wins for glyphs shared by several codes.
                all.sort();
                all
            },
        };
        Some(write_tounicode_cmap(&mappings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::font_data::{FontData, FontFlags};
    use crate::fonts::truetype_parser::tests::TestFont;

    fn unicode_font(test_font: &TestFont) -> FontData {
        let bytes = test_font.build();
        let font = TrueTypeFont::parse(&bytes, 0).unwrap();
        let data = UnicodeData::from_sfnt(&font, Some(Arc::new(bytes.clone())), None, &EngineConfig::default());
        FontData::TrueTypeUnicode(data)
    }

    fn simple_font(test_font: &TestFont) -> FontData {
        let bytes = test_font.build();
        let font = TrueTypeFont::parse(&bytes, 0).unwrap();
        let data = TrueTypeData::from_sfnt(
            &font,
            Some(Arc::new(bytes.clone())),
            Encoding::win_ansi(),
            &EngineConfig::default(),
        );
        FontData::TrueType(data)
    }

    #[test]
    fn test_string_width_matches_hmtx() {
        let font = unicode_font(&TestFont::default());
        // A = 600, B = 640, space = 250
        assert_eq!(font.string_width("AB A", false), 600.0 + 640.0 + 250.0 + 600.0);
        // Kern pair (A, B) = -80
        assert_eq!(font.string_width("AB", true), 600.0 + 640.0 - 80.0);
        assert_eq!(font.kerning_width_array("ABA"), vec![(0, 80)]);
    }

    #[test]
    fn test_missing_glyph_is_zero_width() {
        let font = unicode_font(&TestFont::default());
        assert_eq!(font.string_width("Z", false), 0.0);
        assert_eq!(font.convert_code_to_glyph("Z", None), vec![0, 0]);
    }

    #[test]
    fn test_unicode_conversion_without_subset() {
        let font = unicode_font(&TestFont::default());
        let mut usage = font.new_glyph_usage(false);
        assert_eq!(font.convert_code_to_glyph("BA", Some(&mut usage)), vec![0, 2, 0, 1]);
        assert_eq!(font.widths_as_string(Some(&usage)), "[0 [500 600 640]]");
        assert!(font.cid_to_gid_map(&usage).is_none());
    }

    #[test]
    fn test_unicode_subset_renumbers() {
        let font = unicode_font(&TestFont::default());
        let mut usage = font.new_glyph_usage(true);
        assert!(usage.is_subset());
        assert_eq!(font.convert_code_to_glyph("B A", Some(&mut usage)), vec![0, 1, 0, 2, 0, 3]);
        assert_eq!(font.widths_as_string(Some(&usage)), "[0 [500 640 250 600]]");
        // New CID n maps to the original glyph at position n
        assert_eq!(font.cid_to_gid_map(&usage).unwrap(), vec![0, 0, 0, 2, 0, 3, 0, 1]);
        assert_eq!(font.cid_set(&usage).unwrap(), vec![0xF0]);
        assert!(font.base_font_name(Some(&usage)).ends_with("+TestSans-Regular"));

        let program = font.write_font_program(Some(&usage)).unwrap().unwrap();
        assert_eq!(program.kind, FontFileKind::TrueType);
        assert_eq!(program.length1, program.data.len());

        let cmap = String::from_utf8(font.write_unicode_map(Some(&usage)).unwrap()).unwrap();
        assert!(cmap.contains("<0001> <0001> <0042>"));
        assert!(cmap.contains("<0003> <0003> <0041>"));
    }

    #[test]
    fn test_no_subsetting_flag_disables_subsets() {
        let font = unicode_font(&TestFont {
            fs_type: 0x0100,
            ..Default::default()
        });
        assert!(font.embed_supported());
        assert!(!font.subset_supported());
        assert!(!font.new_glyph_usage(true).is_subset());
    }

    #[test]
    fn test_restricted_font_is_not_embedded() {
        let font = unicode_font(&TestFont {
            fs_type: 0x0002,
            ..Default::default()
        });
        assert!(!font.embed_supported());
        assert!(font.write_font_program(None).unwrap().is_none());
    }

    #[test]
    fn test_simple_truetype() {
        let font = simple_font(&TestFont::default());
        assert_eq!(font.kind(), crate::fonts::font_data::FontKind::TrueType);
        assert_eq!(font.convert_code_to_glyph("AB", None), b"AB".to_vec());
        assert_eq!(font.string_width("AB", true), 600.0 + 640.0 - 80.0);

        let widths = font.widths_as_string(None);
        assert!(widths.starts_with("[250 500 500"));
        assert_eq!(widths.trim_matches(|c| c == '[' || c == ']').split(' ').count(), 224);
        assert!(font.diff().is_none());
        assert!(!font.subset_supported());
        assert!(font.write_unicode_map(None).is_none());
        assert!(font.description().flags.contains(FontFlags::NONSYMBOLIC));
    }

    #[test]
    fn test_simple_truetype_skips_unencodable() {
        let font = simple_font(&TestFont::default());
        assert_eq!(font.convert_code_to_glyph("A\u{4E00}B", None), b"AB".to_vec());
    }

    #[test]
    fn test_symbol_font_uses_low_byte() {
        let font = simple_font(&TestFont {
            symbol: true,
            cmap: vec![(0xF041, 1), (0xF042, 2)],
            ..Default::default()
        });
        assert_eq!(font.convert_code_to_glyph("A\u{F042}", None), b"AB".to_vec());
        assert_eq!(font.string_width("AB", false), 1240.0);
    }
}
