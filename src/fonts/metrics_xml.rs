//! Reader for font metric exchange documents.
//!
//! A preprocessing tool turns font files into an XML document holding the
//! font-level description, the width table and references to a (zlib
//! compressed) copy of the font program and, for Unicode TrueType fonts, a
//! CID-to-GID map. Loading such a document avoids parsing the font itself.
//!
//! ```xml
//! <wxpdfdoc-font-metrics type="TrueTypeUnicode" version="1.0">
//!   <font-name>DejaVuSans</font-name>
//!   <description ascent="928" descent="-236" cap-height="928" flags="32"
//!                font-bbox="[-1021 -415 1681 1167]" italic-angle="0" stemv="70"
//!                missing-width="600"/>
//!   <file name="DejaVuSans.z" originalsize="622280" ctg="DejaVuSans.ctg.z"/>
//!   <widths subsetting="enabled"><char id="32" width="318" gn="3"/></widths>
//! </wxpdfdoc-font-metrics>
//! ```

use std::io::Read;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::fonts::font_data::{FontDescription, FontFlags, FontKind, FontStyle};
use crate::fonts::reordering::ReorderRule;

const ROOT_ELEMENT: &str = "wxpdfdoc-font-metrics";

/// Reference to the font program file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontFileRef {
    /// File name, relative to the metrics document.
    pub name: String,
    /// Size of the decompressed program.
    pub original_size: Option<usize>,
    /// Cleartext size of a Type1 program.
    pub size1: Option<usize>,
    /// Encrypted size of a Type1 program.
    pub size2: Option<usize>,
    /// CID-to-GID map file.
    pub ctg: Option<String>,
}

/// One `<char>` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharWidth {
    pub code: u32,
    pub width: u16,
    /// Glyph number (`gn`), when given.
    pub glyph: Option<u16>,
}

/// Contents of a metrics document.
#[derive(Debug, Clone)]
pub struct MetricsDocument {
    pub kind: FontKind,
    pub font_name: String,
    pub encoding: Option<String>,
    pub description: FontDescription,
    /// `/Differences` content.
    pub diff: Option<String>,
    pub file: Option<FontFileRef>,
    pub registry: Option<String>,
    pub ordering: Option<String>,
    pub supplement: Option<u32>,
    pub cmap: Option<String>,
    pub widths: Vec<CharWidth>,
    /// Whether the width table allows subsetting.
    pub subsetting: bool,
    pub reorder_rules: Vec<ReorderRule>,
}

impl MetricsDocument {
    /// Style implied by the descriptor flags and the font name.
    pub fn style(&self) -> FontStyle {
        let mut style = FontStyle::REGULAR;
        let flags = self.description.flags;
        if flags.contains(FontFlags::FORCE_BOLD) || self.font_name.contains("Bold") {
            style |= FontStyle::BOLD;
        }
        if flags.contains(FontFlags::ITALIC)
            || self.font_name.contains("Italic")
            || self.font_name.contains("Oblique")
        {
            style |= FontStyle::ITALIC;
        }
        style
    }

    /// Family name: the font name up to its style suffix.
    pub fn family(&self) -> &str {
        self.font_name
            .split(['-', ','])
            .next()
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.font_name)
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return Some(match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).to_string(),
            });
        }
    }
    None
}

fn number<T: std::str::FromStr>(e: &BytesStart<'_>, name: &str) -> Option<T> {
    attribute(e, name).and_then(|v| v.trim().parse().ok())
}

/// An integer attribute that may be written as a real number.
fn int(e: &BytesStart<'_>, name: &str) -> Option<i32> {
    let value = attribute(e, name)?;
    let value = value.trim();
    value
        .parse::<i32>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|f| f.round() as i32))
}

fn parse_bbox(value: &str) -> Option<[i32; 4]> {
    let values: Vec<i32> = value
        .trim_matches(|c| c == '[' || c == ']')
        .split_whitespace()
        .filter_map(|v| v.parse::<f64>().ok().map(|f| f.round() as i32))
        .collect();
    values.get(..4).map(|v| [v[0], v[1], v[2], v[3]])
}

fn parse_description(e: &BytesStart<'_>) -> FontDescription {
    let ascent = int(e, "ascent").unwrap_or(0);
    FontDescription {
        ascent,
        descent: int(e, "descent").unwrap_or(0),
        cap_height: int(e, "cap-height").unwrap_or(ascent),
        flags: FontFlags::from_bits_truncate(number(e, "flags").unwrap_or(0)),
        font_bbox: attribute(e, "font-bbox")
            .as_deref()
            .and_then(parse_bbox)
            .unwrap_or_default(),
        italic_angle: number(e, "italic-angle").unwrap_or(0.0),
        stem_v: int(e, "stemv").unwrap_or(70),
        missing_width: int(e, "missing-width").unwrap_or(0),
        x_height: int(e, "x-height").unwrap_or(ascent / 2),
        underline_position: int(e, "underline-position").unwrap_or(-100),
        underline_thickness: int(e, "underline-thickness").unwrap_or(50),
    }
}

fn mismatch(reason: String) -> Error {
    Error::MetricsFormatMismatch(reason)
}

/// Parse a metrics document.
pub fn parse_metrics_xml(xml: &str) -> Result<MetricsDocument> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut kind: Option<FontKind> = None;
    let mut saw_root = false;
    let mut font_name = String::new();
    let mut encoding = None;
    let mut description = FontDescription::default();
    let mut diff = None;
    let mut file = None;
    let mut registry = None;
    let mut ordering = None;
    let mut supplement = None;
    let mut cmap = None;
    let mut widths = Vec::new();
    let mut subsetting = true;
    let mut reorder_rules = Vec::new();
    let mut current: Option<String> = None;

    loop {
        let event = reader.read_event();
        match event {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let opens_content = matches!(event, Ok(Event::Start(_)));
                let local_name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if !saw_root {
                    if local_name != ROOT_ELEMENT {
                        return Err(mismatch(format!("unexpected root element <{}>", local_name)));
                    }
                    saw_root = true;
                    let type_name = attribute(e, "type").unwrap_or_default();
                    kind = Some(FontKind::from_name(&type_name).ok_or_else(|| {
                        mismatch(format!("unsupported font type '{}'", type_name))
                    })?);
                    continue;
                }

                match local_name.as_str() {
                    "description" => description = parse_description(e),
                    "file" => {
                        file = Some(FontFileRef {
                            name: attribute(e, "name").unwrap_or_default(),
                            original_size: number(e, "originalsize"),
                            size1: number(e, "size1"),
                            size2: number(e, "size2"),
                            ctg: attribute(e, "ctg").filter(|c| !c.is_empty()),
                        });
                    },
                    "widths" => {
                        subsetting = attribute(e, "subsetting").map_or(true, |v| v != "disabled");
                    },
                    "char" => {
                        let (Some(code), Some(width)) = (number::<u32>(e, "id"), int(e, "width")) else {
                            log::warn!("Skipping <char> without id or width");
                            continue;
                        };
                        widths.push(CharWidth {
                            code,
                            width: width.clamp(0, u16::MAX as i32) as u16,
                            glyph: number(e, "gn"),
                        });
                    },
                    "rule" => {
                        let pattern = attribute(e, "match").unwrap_or_default();
                        let replacement = attribute(e, "replace").unwrap_or_default();
                        let repeat = attribute(e, "repeat").map_or(false, |v| v == "true");
                        reorder_rules.push(ReorderRule::new(&pattern, &replacement, repeat)?);
                    },
                    _ => {},
                }
                if opens_content {
                    current = Some(local_name);
                }
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                match current.as_deref() {
                    Some("font-name") => font_name = text,
                    Some("encoding") => encoding = Some(text),
                    Some("diff") => diff = Some(text),
                    Some("registry") => registry = Some(text),
                    Some("ordering") => ordering = Some(text),
                    Some("supplement") => supplement = text.parse().ok(),
                    Some("cmap") => cmap = Some(text),
                    _ => {},
                }
            },
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {},
        }
    }

    let kind = kind.ok_or_else(|| mismatch(format!("missing <{}> element", ROOT_ELEMENT)))?;
    if font_name.is_empty() {
        return Err(mismatch("missing <font-name>".to_string()));
    }
    if kind == FontKind::Type0 && cmap.is_none() {
        return Err(mismatch(format!("Type0 font '{}' without <cmap>", font_name)));
    }

    log::debug!(
        "Read {} metrics for '{}': {} widths, {} reordering rules",
        kind.as_str(),
        font_name,
        widths.len(),
        reorder_rules.len()
    );

    Ok(MetricsDocument {
        kind,
        font_name,
        encoding,
        description,
        diff: diff.filter(|d| !d.is_empty()),
        file,
        registry,
        ordering,
        supplement,
        cmap,
        widths,
        subsetting,
        reorder_rules,
    })
}

/// Inflate a zlib stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Decode the bytes of a file referenced by a metrics document. Files
/// ending in `.z` are zlib compressed.
pub fn decode_referenced_file(path: &Path, data: Vec<u8>) -> Result<Vec<u8>> {
    if path.extension().is_some_and(|ext| ext == "z") {
        inflate(&data)
    } else {
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wxpdfdoc-font-metrics type="TrueTypeUnicode" version="1.0">
  <font-name>TestSans-Regular</font-name>
  <description ascent="800" descent="-200" cap-height="700" flags="32"
               font-bbox="[-100 -200 1000 900]" italic-angle="-12.5" stemv="80"
               missing-width="500" x-height="450" underline-position="-75" underline-thickness="50"/>
  <file name="TestSans.z" originalsize="1234" ctg="TestSans.ctg.z"/>
  <widths subsetting="disabled">
    <char id="32" width="250" gn="3"/>
    <char id="65" width="600" gn="1"/>
    <char id="66" width="640.4"/>
  </widths>
  <volt>
    <ruleset>
      <rule repeat="false" match="(a)(b)" replace="$2$1"/>
    </ruleset>
  </volt>
</wxpdfdoc-font-metrics>
"#;

    #[test]
    fn test_parse_document() {
        let doc = parse_metrics_xml(DOC).unwrap();
        assert_eq!(doc.kind, FontKind::TrueTypeUnicode);
        assert_eq!(doc.font_name, "TestSans-Regular");
        assert_eq!(doc.description.ascent, 800);
        assert_eq!(doc.description.font_bbox, [-100, -200, 1000, 900]);
        assert_eq!(doc.description.italic_angle, -12.5);
        assert_eq!(doc.description.flags, FontFlags::NONSYMBOLIC);
        assert_eq!(doc.description.missing_width, 500);

        let file = doc.file.as_ref().unwrap();
        assert_eq!(file.name, "TestSans.z");
        assert_eq!(file.original_size, Some(1234));
        assert_eq!(file.ctg.as_deref(), Some("TestSans.ctg.z"));

        assert!(!doc.subsetting);
        assert_eq!(
            doc.widths,
            vec![
                CharWidth { code: 32, width: 250, glyph: Some(3) },
                CharWidth { code: 65, width: 600, glyph: Some(1) },
                CharWidth { code: 66, width: 640, glyph: None },
            ]
        );
        assert_eq!(doc.reorder_rules.len(), 1);
        assert_eq!(doc.reorder_rules[0].pattern(), "(a)(b)");
        assert_eq!(doc.family(), "TestSans");
        assert_eq!(doc.style(), FontStyle::REGULAR);
    }

    #[test]
    fn test_type0_document() {
        let xml = r#"<wxpdfdoc-font-metrics type="Type0">
  <font-name>STSong-Light</font-name>
  <encoding>cp936</encoding>
  <registry>Adobe</registry><ordering>GB1</ordering><supplement>2</supplement>
  <cmap>UniGB-UCS2-H</cmap>
  <widths><char id="32" width="207"/></widths>
</wxpdfdoc-font-metrics>"#;
        let doc = parse_metrics_xml(xml).unwrap();
        assert_eq!(doc.kind, FontKind::Type0);
        assert_eq!(doc.encoding.as_deref(), Some("cp936"));
        assert_eq!(doc.ordering.as_deref(), Some("GB1"));
        assert_eq!(doc.supplement, Some(2));
        assert_eq!(doc.cmap.as_deref(), Some("UniGB-UCS2-H"));
        assert!(doc.file.is_none());
        assert!(doc.subsetting);
    }

    #[test]
    fn test_diff_and_escaped_rule() {
        let xml = r#"<wxpdfdoc-font-metrics type="Type1">
  <font-name>Test</font-name>
  <diff>128 /Euro 130 /quotesinglbase</diff>
  <volt><ruleset><rule repeat="true" match="a&amp;b" replace="b"/></ruleset></volt>
</wxpdfdoc-font-metrics>"#;
        let doc = parse_metrics_xml(xml).unwrap();
        assert_eq!(doc.diff.as_deref(), Some("128 /Euro 130 /quotesinglbase"));
        assert_eq!(doc.reorder_rules[0].pattern(), "a&b");
        assert!(doc.reorder_rules[0].is_repeating());
    }

    #[test]
    fn test_rejects_other_documents() {
        assert!(matches!(
            parse_metrics_xml("<font><font-name>x</font-name></font>"),
            Err(Error::MetricsFormatMismatch(_))
        ));
        assert!(matches!(
            parse_metrics_xml(r#"<wxpdfdoc-font-metrics type="Type3"><font-name>x</font-name></wxpdfdoc-font-metrics>"#),
            Err(Error::MetricsFormatMismatch(_))
        ));
        assert!(matches!(
            parse_metrics_xml(r#"<wxpdfdoc-font-metrics type="Type1"></wxpdfdoc-font-metrics>"#),
            Err(Error::MetricsFormatMismatch(_))
        ));
    }

    #[test]
    fn test_compressed_reference() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.z");
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"font program").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(decode_referenced_file(&path, data).unwrap(), b"font program");

        let plain = dir.path().join("font.pfb");
        assert_eq!(decode_referenced_file(&plain, b"raw".to_vec()).unwrap(), b"raw");
    }
}
