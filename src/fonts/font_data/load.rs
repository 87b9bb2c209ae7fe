//! Construction of [`FontData`] from font files and metrics documents.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fonts::encoding::{CodePage, Encoding};
use crate::fonts::metrics_xml::MetricsDocument;
use crate::fonts::reordering::Reordering;
use crate::fonts::truetype_parser::{extract_font, TrueTypeFont};
use crate::fonts::type1::Type1Metrics;

use super::{
    CharGlyphMap, FontData, FontInfo, FontKind, GlyphWidthMap, Outline,
    TrueTypeData, Type0Data, Type0Encoding, Type1Data, UnicodeData,
};

const DEFAULT_ENCODING: &str = "winansi";

impl FontData {
    /// Build from an sfnt file or collection. With an `encoding` a
    /// `glyf` font becomes a simple `TrueType` font; otherwise, and for all
    /// CFF flavoured fonts, a glyph-indexed Unicode font.
    pub fn from_sfnt(
        data: Arc<Vec<u8>>,
        index: u32,
        encoding: Option<Arc<Encoding>>,
        reordering: Option<Arc<Reordering>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let font = TrueTypeFont::parse(&data, index)?;
        let program = if data.starts_with(b"ttcf") {
            Arc::new(extract_font(&data, index)?)
        } else {
            Arc::clone(&data)
        };

        if font.is_cff() {
            if encoding.is_some() {
                log::warn!(
                    "CFF font '{}' is always used as a Unicode font",
                    font.postscript_name().unwrap_or_default()
                );
            }
            let unicode = UnicodeData::from_sfnt(&font, Some(program), reordering, config);
            return Ok(FontData::OpenTypeUnicode(unicode));
        }
        Ok(match encoding {
            Some(encoding) => {
                FontData::TrueType(TrueTypeData::from_sfnt(&font, Some(program), encoding, config))
            },
            None => FontData::TrueTypeUnicode(UnicodeData::from_sfnt(
                &font,
                Some(program),
                reordering,
                config,
            )),
        })
    }

    /// Build a Type1 font from its program and/or AFM/PFM metrics.
    pub fn from_type1(
        program: Option<Arc<Vec<u8>>>,
        metrics: Option<&Type1Metrics>,
        encoding: Option<Arc<Encoding>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        if program.is_none() && metrics.is_none() {
            return Err(Error::InvalidFontFile(
                "Type1 font needs a program or metrics".to_string(),
            ));
        }
        Type1Data::new(program, metrics, encoding, config).map(FontData::Type1)
    }

    /// Build from a metrics document. `program` is the decompressed font
    /// file it references and `ctg` the decompressed CID-to-GID map.
    pub fn from_metrics(
        doc: MetricsDocument,
        program: Option<Arc<Vec<u8>>>,
        ctg: Option<&[u8]>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let widths: GlyphWidthMap = doc.widths.iter().map(|w| (w.code, w.width)).collect();
        let info = FontInfo {
            family: doc.family().to_string(),
            style: doc.style(),
            description: doc.description.clone(),
            widths: Arc::new(widths),
            kern_pairs: None,
            embed_allowed: true,
            subset_allowed: doc.subsetting,
            config: config.clone(),
            name: doc.font_name.clone(),
        };

        match doc.kind {
            FontKind::TrueType => {
                let encoding = simple_encoding(&doc, config)?;
                let glyphs: CharGlyphMap = doc
                    .widths
                    .iter()
                    .filter_map(|w| w.glyph.map(|g| (w.code, g)))
                    .collect();
                let glyphs = (!glyphs.is_empty()).then(|| Arc::new(glyphs));
                Ok(FontData::TrueType(TrueTypeData::from_parts(info, encoding, glyphs, program)))
            },
            FontKind::Type1 => {
                // Without an encoding the font's own codes are used as is.
                let (encoding, builtin) = match doc.encoding.as_deref() {
                    Some(_) => (simple_encoding(&doc, config)?, false),
                    None => (Encoding::load("iso-8859-1", config)?, true),
                };
                Ok(FontData::Type1(Type1Data::from_parts(info, encoding, builtin, program)))
            },
            FontKind::TrueTypeUnicode | FontKind::OpenTypeUnicode => {
                let glyphs = unicode_glyphs(&doc, ctg)?;
                let glyph_widths: HashMap<u16, u16> = doc
                    .widths
                    .iter()
                    .filter_map(|w| glyphs.get(&w.code).map(|&gid| (gid, w.width)))
                    .collect();
                let reordering = (!doc.reorder_rules.is_empty()).then(|| {
                    Arc::new(Reordering::new(doc.reorder_rules.clone(), config.reordering_max_passes))
                });
                let (outline, wrap): (Outline, fn(UnicodeData) -> FontData) =
                    if doc.kind == FontKind::OpenTypeUnicode {
                        (Outline::Cff, FontData::OpenTypeUnicode)
                    } else {
                        (Outline::TrueType, FontData::TrueTypeUnicode)
                    };
                Ok(wrap(UnicodeData::from_parts(
                    info,
                    outline,
                    Arc::new(glyphs),
                    Arc::new(glyph_widths),
                    program,
                    reordering,
                )))
            },
            FontKind::Type0 => {
                let cmap = doc
                    .cmap
                    .clone()
                    .ok_or_else(|| Error::MetricsFormatMismatch("Type0 font without <cmap>".into()))?;
                let encoding = Type0Encoding::for_cmap(&cmap, || {
                    let name = doc
                        .encoding
                        .as_deref()
                        .ok_or_else(|| Error::EncodingMapNotFound(cmap.clone()))?;
                    CodePage::load(name, config)
                })?;
                Ok(FontData::Type0(Type0Data::new(
                    info,
                    doc.registry.clone().unwrap_or_else(|| "Adobe".to_string()),
                    doc.ordering.clone().unwrap_or_else(|| "Identity".to_string()),
                    doc.supplement.unwrap_or(0),
                    cmap,
                    encoding,
                )))
            },
        }
    }
}

fn simple_encoding(doc: &MetricsDocument, config: &EngineConfig) -> Result<Arc<Encoding>> {
    let base = Encoding::load(doc.encoding.as_deref().unwrap_or(DEFAULT_ENCODING), config)?;
    Ok(match &doc.diff {
        Some(diff) => Arc::new(base.with_differences(diff)),
        None => base,
    })
}

/// Unicode to glyph index from `gn` attributes, or from a CID-to-GID map
/// holding two bytes per code point.
fn unicode_glyphs(doc: &MetricsDocument, ctg: Option<&[u8]>) -> Result<CharGlyphMap> {
    let from_attributes: CharGlyphMap = doc
        .widths
        .iter()
        .filter_map(|w| w.glyph.map(|g| (w.code, g)))
        .collect();
    if !from_attributes.is_empty() {
        return Ok(from_attributes);
    }
    let ctg = ctg.ok_or_else(|| {
        Error::MetricsFormatMismatch(format!(
            "'{}' has neither glyph numbers nor a CID-to-GID map",
            doc.font_name
        ))
    })?;
    Ok(doc
        .widths
        .iter()
        .filter_map(|w| {
            let at = w.code as usize * 2;
            let gid = u16::from_be_bytes([*ctg.get(at)?, *ctg.get(at + 1)?]);
            // Code 0 maps to .notdef; other zeros are unmapped.
            (gid != 0 || w.code == 0).then_some((w.code, gid))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::font_data::{FontFileKind, FontOps, FontStyle};
    use crate::fonts::metrics_xml::parse_metrics_xml;
    use crate::fonts::truetype_parser::tests::TestFont;

    #[test]
    fn test_sfnt_dispatch() {
        let data = Arc::new(TestFont::default().build());
        let config = EngineConfig::default();

        let unicode = FontData::from_sfnt(Arc::clone(&data), 0, None, None, &config).unwrap();
        assert_eq!(unicode.kind(), FontKind::TrueTypeUnicode);

        let simple =
            FontData::from_sfnt(Arc::clone(&data), 0, Some(Encoding::win_ansi()), None, &config).unwrap();
        assert_eq!(simple.kind(), FontKind::TrueType);
        assert_eq!(simple.name(), "TestSans-Regular");
        assert_eq!(simple.family(), "Test Sans");
    }

    #[test]
    fn test_type1_requires_input() {
        let err = FontData::from_type1(None, None, None, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidFontFile(_)));
    }

    #[test]
    fn test_unicode_from_metrics_with_glyph_numbers() {
        let doc = parse_metrics_xml(
            r#"<wxpdfdoc-font-metrics type="TrueTypeUnicode">
  <font-name>TestSans-Bold</font-name>
  <description ascent="800" descent="-200" flags="262176" missing-width="500"/>
  <widths>
    <char id="32" width="250" gn="3"/>
    <char id="65" width="600" gn="1"/>
  </widths>
</wxpdfdoc-font-metrics>"#,
        )
        .unwrap();
        let program = Arc::new(TestFont::default().build());
        let font = FontData::from_metrics(doc, Some(program), None, &EngineConfig::default()).unwrap();
        assert_eq!(font.kind(), FontKind::TrueTypeUnicode);
        assert_eq!(font.style(), FontStyle::BOLD);
        assert_eq!(font.string_width("A A", false), 1450.0);
        assert_eq!(font.convert_code_to_glyph("A", None), vec![0, 1]);

        let mut usage = font.new_glyph_usage(true);
        font.convert_code_to_glyph("A", Some(&mut usage));
        assert_eq!(font.widths_as_string(Some(&usage)), "[0 [500 600]]");
        assert_eq!(font.cid_to_gid_map(&usage).unwrap(), vec![0, 0, 0, 1]);
        let program = font.write_font_program(Some(&usage)).unwrap().unwrap();
        assert_eq!(program.kind, FontFileKind::TrueType);
    }

    #[test]
    fn test_unicode_from_metrics_with_ctg() {
        let doc = parse_metrics_xml(
            r#"<wxpdfdoc-font-metrics type="TrueTypeUnicode">
  <font-name>TestSans</font-name>
  <widths><char id="65" width="600"/><char id="66" width="640"/></widths>
</wxpdfdoc-font-metrics>"#,
        )
        .unwrap();
        let mut ctg = vec![0u8; 2 * 0x100];
        ctg[0x41 * 2..0x41 * 2 + 2].copy_from_slice(&7u16.to_be_bytes());

        let err = FontData::from_metrics(doc.clone(), None, None, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MetricsFormatMismatch(_)));

        let font = FontData::from_metrics(doc, None, Some(&ctg), &EngineConfig::default()).unwrap();
        assert_eq!(font.convert_code_to_glyph("AB", None), vec![0, 7, 0, 0]);
        assert!(!font.embed_supported());
    }

    #[test]
    fn test_simple_from_metrics_with_diff() {
        let doc = parse_metrics_xml(
            r#"<wxpdfdoc-font-metrics type="TrueType">
  <font-name>TestSans</font-name>
  <encoding>winansi</encoding>
  <diff>128 /bullet</diff>
  <widths><char id="128" width="350"/></widths>
</wxpdfdoc-font-metrics>"#,
        )
        .unwrap();
        let font = FontData::from_metrics(doc, None, None, &EngineConfig::default()).unwrap();
        assert_eq!(font.diff().as_deref(), Some("128 /bullet"));
        assert_eq!(font.convert_code_to_glyph("\u{2022}", None), vec![0x80]);
        assert_eq!(font.string_width("\u{2022}", false), 350.0);
    }

    #[test]
    fn test_type0_from_metrics() {
        let doc = parse_metrics_xml(
            r#"<wxpdfdoc-font-metrics type="Type0">
  <font-name>STSong-Light</font-name>
  <registry>Adobe</registry><ordering>GB1</ordering><supplement>2</supplement>
  <cmap>UniGB-UCS2-H</cmap>
  <widths><char id="65" width="500"/></widths>
</wxpdfdoc-font-metrics>"#,
        )
        .unwrap();
        let font = FontData::from_metrics(doc, None, None, &EngineConfig::default()).unwrap();
        assert_eq!(font.kind(), FontKind::Type0);
        assert_eq!(font.encoding_name(), Some("UniGB-UCS2-H"));
        assert_eq!(font.string_width("A\u{4E2D}", false), 1500.0);
    }

    #[test]
    fn test_type0_code_page_needs_map() {
        let doc = parse_metrics_xml(
            r#"<wxpdfdoc-font-metrics type="Type0">
  <font-name>STSong-Light</font-name>
  <encoding>cp936</encoding>
  <cmap>GBK-EUC-H</cmap>
</wxpdfdoc-font-metrics>"#,
        )
        .unwrap();
        let err = FontData::from_metrics(doc, None, None, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EncodingMapNotFound(_)));
    }
}
