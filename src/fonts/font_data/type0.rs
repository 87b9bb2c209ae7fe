//! CJK fonts referenced by CMap and never embedded.
//!
//! Text is written either as UCS-2 (for `Uni*-UCS2-*` CMaps) or through a
//! code page giving 1-byte codes for ASCII and 2-byte codes otherwise.
//! Widths are known for the half-width ASCII range; everything else is
//! full width.

use std::sync::Arc;

use crate::error::Result;
use crate::fonts::encoding::CodePage;
use crate::fonts::font_subsetter::GlyphUsage;

use super::{cid_widths_string, FontInfo, FontOps, FontProgram};

const FULL_WIDTH: f64 = 1000.0;
/// Half-width ASCII `32..=126` are CIDs `1..=95` in the Adobe CJK collections.
const ASCII_CID_OFFSET: u32 = 31;

/// How characters become codes.
#[derive(Debug, Clone)]
pub enum Type0Encoding {
    /// Two bytes of UTF-16 per character.
    Ucs2,
    /// A double-byte code page.
    CodePage(Arc<CodePage>),
}

impl Type0Encoding {
    /// UCS-2 for `*UCS2*` CMaps, the code page otherwise.
    pub fn for_cmap(cmap: &str, code_page: impl FnOnce() -> Result<CodePage>) -> Result<Self> {
        if cmap.contains("UCS2") {
            Ok(Type0Encoding::Ucs2)
        } else {
            Ok(Type0Encoding::CodePage(Arc::new(code_page()?)))
        }
    }
}

/// A Type0 (CID) font with a predefined CMap.
#[derive(Debug)]
pub struct Type0Data {
    /// Widths keyed by Unicode code point (ASCII only).
    pub(super) info: FontInfo,
    registry: String,
    ordering: String,
    supplement: u32,
    cmap: String,
    encoding: Type0Encoding,
}

impl Type0Data {
    pub fn new(
        info: FontInfo,
        registry: String,
        ordering: String,
        supplement: u32,
        cmap: String,
        encoding: Type0Encoding,
    ) -> Self {
        Self {
            info,
            registry,
            ordering,
            supplement,
            cmap,
            encoding,
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn ordering(&self) -> &str {
        &self.ordering
    }

    pub fn supplement(&self) -> u32 {
        self.supplement
    }

    /// Name of the predefined CMap, e.g. `UniGB-UCS2-H`.
    pub fn cmap_name(&self) -> &str {
        &self.cmap
    }

    pub(super) fn has_program(&self) -> bool {
        false
    }

    pub(super) fn text_codes(&self, text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32).collect()
    }

    fn char_width(&self, code: u32) -> f64 {
        if code < 0x80 {
            self.info.code_width(code) as f64
        } else {
            FULL_WIDTH
        }
    }
}

impl FontOps for Type0Data {
    fn string_width(&self, text: &str, _kerning: bool) -> f64 {
        self.text_codes(text).into_iter().map(|c| self.char_width(c)).sum()
    }

    fn convert_code_to_glyph(&self, text: &str, mut usage: Option<&mut GlyphUsage>) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() * 2);
        for ch in text.chars() {
            let code = match &self.encoding {
                Type0Encoding::Ucs2 => u16::try_from(ch as u32).ok(),
                Type0Encoding::CodePage(page) => page.code_for_char(ch),
            };
            let Some(code) = code else {
                log::warn!(
                    "Character U+{:04X} cannot be written with CMap {}",
                    ch as u32,
                    self.cmap
                );
                continue;
            };
            if let Some(usage) = usage.as_mut() {
                usage.use_code(ch as u32);
            }
            match &self.encoding {
                Type0Encoding::CodePage(_) if code < 0x100 => out.push(code as u8),
                _ => out.extend_from_slice(&code.to_be_bytes()),
            }
        }
        out
    }

    fn widths_as_string(&self, _usage: Option<&GlyphUsage>) -> String {
        let entries: Vec<(u16, u16)> = (32u32..=126)
            .filter_map(|code| {
                self.info
                    .widths
                    .get(&code)
                    .map(|&w| ((code - ASCII_CID_OFFSET) as u16, w))
            })
            .collect();
        cid_widths_string(&entries)
    }

    fn write_font_program(&self, _usage: Option<&GlyphUsage>) -> Result<Option<FontProgram>> {
        Ok(None)
    }

    fn write_unicode_map(&self, _usage: Option<&GlyphUsage>) -> Option<Vec<u8>> {
        None
    }
}
