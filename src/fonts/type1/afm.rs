//! Adobe Font Metrics (AFM) parser.
//!
//! AFM files are line oriented. The header holds `Key value` pairs, the
//! `StartCharMetrics` section holds one `;`-separated record per glyph
//! (`C 65 ; WX 722 ; N A ; B 14 0 706 674 ;`) and `StartKernPairs`
//! holds `KPX left right adjustment` records.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Metrics of one glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct CharMetric {
    /// Character code in the font's own encoding, -1 if unencoded.
    pub code: i32,
    /// Advance width.
    pub width: u16,
    /// Glyph name.
    pub name: Option<String>,
    /// Glyph bounding box.
    pub bbox: Option<[i32; 4]>,
}

/// Font-level and per-glyph metrics read from an AFM or PFM file.
#[derive(Debug, Clone, Default)]
pub struct Type1Metrics {
    pub font_name: Option<String>,
    pub full_name: Option<String>,
    pub family_name: Option<String>,
    pub weight: Option<String>,
    pub italic_angle: f64,
    pub is_fixed_pitch: bool,
    /// Serif face (PFM family information only)
    pub serif: bool,
    /// Script face (PFM family information only)
    pub script: bool,
    pub font_bbox: [i32; 4],
    pub underline_position: i32,
    pub underline_thickness: i32,
    pub cap_height: Option<i32>,
    pub x_height: Option<i32>,
    pub ascender: Option<i32>,
    pub descender: Option<i32>,
    pub std_vw: Option<i32>,
    pub encoding_scheme: Option<String>,
    pub chars: Vec<CharMetric>,
    /// Kerning pairs by glyph name.
    pub kern_pairs: Vec<(String, String, i16)>,
}

impl Type1Metrics {
    /// Widths keyed by glyph name.
    pub fn widths_by_name(&self) -> HashMap<String, u16> {
        self.chars
            .iter()
            .filter_map(|c| c.name.clone().map(|n| (n, c.width)))
            .collect()
    }

    /// Widths keyed by the font's own character codes.
    pub fn widths_by_code(&self) -> HashMap<u32, u16> {
        self.chars
            .iter()
            .filter(|c| (0..=255).contains(&c.code))
            .map(|c| (c.code as u32, c.width))
            .collect()
    }

    /// Glyph name at a code of the font's own encoding.
    pub fn glyph_at(&self, code: u8) -> Option<&str> {
        self.chars
            .iter()
            .find(|c| c.code == code as i32)
            .and_then(|c| c.name.as_deref())
    }

    fn bbox_top(&self, glyph: &str) -> Option<i32> {
        self.chars
            .iter()
            .find(|c| c.name.as_deref() == Some(glyph))
            .and_then(|c| c.bbox)
            .map(|b| b[3])
    }
}

/// Parse the text of an AFM file.
pub fn parse_afm(text: &str) -> Result<Type1Metrics> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some(first) if first.starts_with("StartFontMetrics") => {},
        _ => {
            return Err(Error::MetricsFormatMismatch(
                "AFM file must start with StartFontMetrics".to_string(),
            ))
        },
    }

    let mut metrics = Type1Metrics::default();
    let mut section = Section::Header;

    for line in lines {
        let (key, rest) = split_key(line);
        match key {
            "StartCharMetrics" => {
                section = Section::Chars;
                continue;
            },
            "StartKernPairs" | "StartKernPairs0" => {
                section = Section::Kern;
                continue;
            },
            "EndCharMetrics" | "EndKernPairs" | "EndKernData" => {
                section = Section::Header;
                continue;
            },
            "EndFontMetrics" => break,
            "Comment" => continue,
            _ => {},
        }

        match section {
            Section::Header => parse_header_line(&mut metrics, key, rest),
            Section::Chars => {
                if let Some(metric) = parse_char_metric(line) {
                    metrics.chars.push(metric);
                } else {
                    log::warn!("Skipping malformed AFM character record: {}", line);
                }
            },
            Section::Kern => {
                if let Some(pair) = parse_kern_pair(key, rest) {
                    metrics.kern_pairs.push(pair);
                }
            },
        }
    }

    if metrics.cap_height.is_none() {
        metrics.cap_height = metrics.bbox_top("X");
    }
    if metrics.x_height.is_none() {
        metrics.x_height = metrics.bbox_top("x");
    }

    log::debug!(
        "Parsed AFM for {:?}: {} glyphs, {} kern pairs",
        metrics.font_name,
        metrics.chars.len(),
        metrics.kern_pairs.len()
    );
    Ok(metrics)
}

enum Section {
    Header,
    Chars,
    Kern,
}

fn split_key(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((key, rest)) => (key, rest.trim()),
        None => (line, ""),
    }
}

fn parse_int(s: &str) -> Option<i32> {
    s.parse::<i32>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i32))
}

fn parse_bbox(s: &str) -> Option<[i32; 4]> {
    let values: Vec<i32> = s.split_whitespace().filter_map(parse_int).collect();
    values.get(..4).map(|v| [v[0], v[1], v[2], v[3]])
}

fn parse_header_line(metrics: &mut Type1Metrics, key: &str, value: &str) {
    match key {
        "FontName" => metrics.font_name = Some(value.to_string()),
        "FullName" => metrics.full_name = Some(value.to_string()),
        "FamilyName" => metrics.family_name = Some(value.to_string()),
        "Weight" => metrics.weight = Some(value.to_string()),
        "ItalicAngle" => metrics.italic_angle = value.parse().unwrap_or(0.0),
        "IsFixedPitch" => metrics.is_fixed_pitch = value.eq_ignore_ascii_case("true"),
        "FontBBox" => {
            if let Some(bbox) = parse_bbox(value) {
                metrics.font_bbox = bbox;
            }
        },
        "UnderlinePosition" => metrics.underline_position = parse_int(value).unwrap_or(-100),
        "UnderlineThickness" => metrics.underline_thickness = parse_int(value).unwrap_or(50),
        "CapHeight" => metrics.cap_height = parse_int(value),
        "XHeight" => metrics.x_height = parse_int(value),
        "Ascender" => metrics.ascender = parse_int(value),
        "Descender" => metrics.descender = parse_int(value),
        "StdVW" => metrics.std_vw = parse_int(value),
        "EncodingScheme" => metrics.encoding_scheme = Some(value.to_string()),
        _ => {},
    }
}

/// Parse `C 65 ; WX 722 ; N A ; B 14 0 706 674 ;`.
fn parse_char_metric(line: &str) -> Option<CharMetric> {
    let mut metric = CharMetric {
        code: -1,
        width: 0,
        name: None,
        bbox: None,
    };
    let mut has_code = false;

    for field in line.split(';').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = split_key(field);
        match key {
            "C" => {
                metric.code = parse_int(value)?;
                has_code = true;
            },
            "CH" => {
                let hex = value.trim_start_matches('<').trim_end_matches('>');
                metric.code = i32::from_str_radix(hex, 16).ok()?;
                has_code = true;
            },
            "WX" | "W0X" => metric.width = parse_int(value)?.clamp(0, u16::MAX as i32) as u16,
            "W" | "W0" => {
                let x = value.split_whitespace().next().and_then(parse_int)?;
                metric.width = x.clamp(0, u16::MAX as i32) as u16;
            },
            "N" => metric.name = Some(value.to_string()),
            "B" => metric.bbox = parse_bbox(value),
            _ => {},
        }
    }

    has_code.then_some(metric)
}

/// Parse `KPX A V -80` (or `KP A V -80 0`).
fn parse_kern_pair(key: &str, rest: &str) -> Option<(String, String, i16)> {
    if key != "KPX" && key != "KP" {
        return None;
    }
    let mut parts = rest.split_whitespace();
    let left = parts.next()?;
    let right = parts.next()?;
    let value = parse_int(parts.next()?)?;
    Some((left.to_string(), right.to_string(), value.clamp(i16::MIN as i32, i16::MAX as i32) as i16))
}
