//! Type1 fonts: metrics from AFM/PFM files and/or the font program itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fonts::encoding::Encoding;
use crate::fonts::font_subsetter::GlyphUsage;
use crate::fonts::truetype_parser::permissions;
use crate::fonts::type1::{Type1Encoding, Type1Font, Type1Metrics};

use super::{
    kern_map, simple_widths_string, FontDescription, FontFlags, FontInfo, FontOps, FontProgram,
    FontStyle, GlyphWidthMap,
};

/// A Type1 font used with an 8-bit encoding.
#[derive(Debug)]
pub struct Type1Data {
    /// Widths keyed by code of the active encoding.
    pub(super) info: FontInfo,
    encoding: Arc<Encoding>,
    /// The active encoding is the font's own.
    builtin_encoding: bool,
    glyph_widths: Arc<HashMap<String, u16>>,
    /// The font file as registered (PFB, PFA or Mac resource).
    program: Option<Arc<Vec<u8>>>,
}

/// Style from the `Weight` entry, the italic angle and the font name.
pub(crate) fn style_from(weight: Option<&str>, name: &str, italic_angle: f64) -> FontStyle {
    let mut style = FontStyle::REGULAR;
    let weight = weight.unwrap_or_default().to_ascii_lowercase();
    if ["bold", "black", "heavy", "semibold", "demi"].iter().any(|w| weight.contains(w))
        || name.contains("Bold")
    {
        style |= FontStyle::BOLD;
    }
    if italic_angle != 0.0 || name.contains("Italic") || name.contains("Oblique") {
        style |= FontStyle::ITALIC;
    }
    style
}

/// Encoding made of the codes an AFM/PFM file assigns.
fn metrics_encoding(name: &str, metrics: &Type1Metrics) -> Encoding {
    let mut names = vec![".notdef".to_string(); 256];
    for c in &metrics.chars {
        if let (0..=255, Some(glyph)) = (c.code, &c.name) {
            names[c.code as usize] = glyph.clone();
        }
    }
    Encoding::from_glyph_names(name, names)
}

impl Type1Data {
    /// Combine a font program and/or metrics. Metrics take precedence;
    /// widths decoded from charstrings fill gaps. Without an explicit
    /// encoding, fonts with a font-specific encoding keep it and
    /// standard-encoded fonts are used with WinAnsi.
    pub fn new(
        program: Option<Arc<Vec<u8>>>,
        metrics: Option<&Type1Metrics>,
        encoding: Option<Arc<Encoding>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let font = program.as_deref().map(|p| Type1Font::parse(p)).transpose()?;
        let header = font.as_ref().map(|f| &f.header);
        let name = metrics
            .and_then(|m| m.font_name.clone())
            .or_else(|| header.map(|h| h.font_name.clone()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidFontFile("Type1 font without a name".to_string()))?;

        let mut glyph_widths: HashMap<String, u16> = metrics.map(|m| m.widths_by_name()).unwrap_or_default();
        if let Some(font) = &font {
            for (glyph, width) in font.glyph_widths(config.max_subr_depth) {
                glyph_widths.entry(glyph).or_insert(width);
            }
        }

        let font_specific = match (&font, metrics) {
            (Some(f), _) => matches!(f.header.encoding, Type1Encoding::Custom(_)),
            (None, Some(m)) => m.encoding_scheme.as_deref() == Some("FontSpecific"),
            (None, None) => false,
        };
        let (encoding, builtin_encoding) = match encoding {
            Some(encoding) => (encoding, false),
            None if font_specific => match (&font, metrics) {
                (Some(f), _) => (f.builtin_encoding(), true),
                (None, Some(m)) => (Arc::new(metrics_encoding(&name, m)), true),
                (None, None) => (Encoding::win_ansi(), false),
            },
            None => (Encoding::win_ansi(), false),
        };

        let mut widths = GlyphWidthMap::new();
        let mut codes_by_name: HashMap<&str, Vec<u32>> = HashMap::new();
        for (code, glyph) in encoding.glyph_names().iter().enumerate() {
            if glyph == ".notdef" {
                continue;
            }
            codes_by_name.entry(glyph.as_str()).or_default().push(code as u32);
            if let Some(&w) = glyph_widths.get(glyph) {
                widths.insert(code as u32, w);
            }
        }
        let kern_pairs = metrics
            .map(|m| {
                kern_map(m.kern_pairs.iter().map(|(l, r, v)| (l.as_str(), r.as_str(), *v)), |glyph| {
                    codes_by_name.get(glyph).cloned().unwrap_or_default()
                })
            })
            .unwrap_or_default();

        let italic_angle = metrics
            .map(|m| m.italic_angle)
            .or_else(|| header.map(|h| h.italic_angle))
            .unwrap_or(0.0);
        let weight = metrics
            .and_then(|m| m.weight.clone())
            .or_else(|| header.and_then(|h| h.weight.clone()));
        let style = style_from(weight.as_deref(), &name, italic_angle);

        let font_bbox = match (metrics, header) {
            (Some(m), _) if m.font_bbox != [0; 4] => m.font_bbox,
            (_, Some(h)) => h.font_bbox,
            (Some(m), None) => m.font_bbox,
            (None, None) => [0; 4],
        };
        let ascent = metrics.and_then(|m| m.ascender).unwrap_or(font_bbox[3]);
        let descent = metrics.and_then(|m| m.descender).unwrap_or(font_bbox[1]);

        let mut flags = if builtin_encoding {
            FontFlags::SYMBOLIC
        } else {
            FontFlags::NONSYMBOLIC
        };
        let fixed = metrics.map_or(false, |m| m.is_fixed_pitch) || header.map_or(false, |h| h.is_fixed_pitch);
        if fixed {
            flags |= FontFlags::FIXED_PITCH;
        }
        if metrics.map_or(false, |m| m.serif) {
            flags |= FontFlags::SERIF;
        }
        if metrics.map_or(false, |m| m.script) {
            flags |= FontFlags::SCRIPT;
        }
        if style.contains(FontStyle::ITALIC) {
            flags |= FontFlags::ITALIC;
        }
        if style.contains(FontStyle::BOLD) {
            flags |= FontFlags::FORCE_BOLD;
        }

        let (underline_position, underline_thickness) = match (metrics, header) {
            (Some(m), _) => (m.underline_position, m.underline_thickness),
            (None, Some(h)) => (h.underline_position, h.underline_thickness),
            (None, None) => (-100, 50),
        };
        let description = FontDescription {
            ascent,
            descent,
            cap_height: metrics.and_then(|m| m.cap_height).unwrap_or(ascent),
            flags,
            font_bbox,
            italic_angle,
            stem_v: metrics
                .and_then(|m| m.std_vw)
                .unwrap_or(if style.contains(FontStyle::BOLD) { 120 } else { 70 }),
            missing_width: glyph_widths
                .get(".notdef")
                .copied()
                .unwrap_or(config.default_missing_width) as i32,
            x_height: metrics.and_then(|m| m.x_height).unwrap_or(ascent / 2),
            underline_position,
            underline_thickness,
        };

        let rights = permissions(header.map_or(0, |h| h.fs_type));
        let family = metrics
            .and_then(|m| m.family_name.clone())
            .or_else(|| header.and_then(|h| h.family_name.clone()))
            .unwrap_or_else(|| name.clone());

        log::debug!(
            "Type1 font '{}': {} glyph widths, encoding {}, program {}",
            name,
            glyph_widths.len(),
            encoding.name(),
            if font.is_some() { "present" } else { "absent" }
        );

        Ok(Self {
            info: FontInfo {
                name,
                family,
                style,
                description,
                widths: Arc::new(widths),
                kern_pairs: (!kern_pairs.is_empty()).then(|| Arc::new(kern_pairs)),
                embed_allowed: rights.embed,
                subset_allowed: rights.subset,
                config: config.clone(),
            },
            encoding,
            builtin_encoding,
            glyph_widths: Arc::new(glyph_widths),
            program,
        })
    }

    /// Build from precomputed metrics.
    pub fn from_parts(
        info: FontInfo,
        encoding: Arc<Encoding>,
        builtin_encoding: bool,
        program: Option<Arc<Vec<u8>>>,
    ) -> Self {
        let glyph_widths = info
            .widths
            .iter()
            .filter_map(|(&code, &w)| {
                let glyph = encoding.glyph_name(u8::try_from(code).ok()?);
                (glyph != ".notdef").then(|| (glyph.to_string(), w))
            })
            .collect();
        Self {
            info,
            encoding,
            builtin_encoding,
            glyph_widths: Arc::new(glyph_widths),
            program,
        }
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// Advance width of a glyph by name.
    pub fn glyph_width(&self, glyph: &str) -> Option<u16> {
        self.glyph_widths.get(glyph).copied()
    }

    pub(super) fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub(super) fn text_codes(&self, text: &str) -> Vec<u32> {
        text.chars()
            .filter_map(|ch| {
                let code = self.encoding.code_for_char(ch).map(u32::from);
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
        if self.builtin_encoding {
            return None;
        }
        let diff = self.encoding.differences_from(&Encoding::win_ansi());
        (!diff.is_empty()).then_some(diff)
    }
}

impl FontOps for Type1Data {
    fn string_width(&self, text: &str, kerning: bool) -> f64 {
        self.info.measure(&self.text_codes(text), kerning)
    }

    fn convert_code_to_glyph(&self, text: &str, mut usage: Option<&mut GlyphUsage>) -> Vec<u8> {
        let codes = self.text_codes(text);
        if let Some(usage) = usage.as_mut() {
            for &code in &codes {
                usage.use_code(code);
            }
        }
        codes.into_iter().map(|c| c as u8).collect()
    }

    fn widths_as_string(&self, _usage: Option<&GlyphUsage>) -> String {
        let config = &self.info.config;
        let missing = self.info.description.missing_width.clamp(0, u16::MAX as i32) as u16;
        simple_widths_string(&self.info.widths, config.first_char, config.last_char, missing)
    }

    fn write_font_program(&self, usage: Option<&GlyphUsage>) -> Result<Option<FontProgram>> {
        let Some(program) = &self.program else {
            return Ok(None);
        };
        let font = Type1Font::parse(program)?;
        let program = match usage {
            Some(usage) if usage.is_subset() => {
                let used: HashSet<String> = usage
                    .used_chars()
                    .keys()
                    .filter_map(|&code| u8::try_from(code).ok())
                    .map(|code| self.encoding.glyph_name(code).to_string())
                    .filter(|glyph| glyph != ".notdef")
                    .collect();
                FontProgram::from_segments(&font.subset(&used, self.info.config.max_subr_depth))
            },
            _ => FontProgram::from_segments(font.segments()),
        };
        program.finish(&self.info.config).map(Some)
    }

    fn write_unicode_map(&self, _usage: Option<&GlyphUsage>) -> Option<Vec<u8>> {
        None
    }
}
