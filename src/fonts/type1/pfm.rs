//! Printer Font Metrics (PFM) parser.
//!
//! PFM is the Windows binary metrics format for Type1 fonts: a fixed
//! little-endian header, an extension table pointing at the extended text
//! metrics, the width (extent) table, the driver info (PostScript name)
//! and an optional pair kerning table.

use crate::error::{Error, Result};
use crate::fonts::cursor::ByteCursor;
use crate::fonts::encoding::Encoding;

use super::afm::{CharMetric, Type1Metrics};

const PFM_VERSION: u16 = 0x0100;
const HEADER_SIZE: usize = 117;
const EXTENSION_SIZE: u16 = 30;
const ANSI_CHARSET: u8 = 0;

const FAMILY_ROMAN: u8 = 1;
const FAMILY_SCRIPT: u8 = 4;

/// Fields of the fixed header needed for metrics.
struct Header {
    ascent: u16,
    italic: bool,
    weight: u16,
    charset: u8,
    pitch_and_family: u8,
    max_width: u16,
    first_char: u8,
    last_char: u8,
    face_offset: u32,
}

fn read_header(cursor: &mut ByteCursor<'_>) -> Result<Header> {
    cursor.seek(74)?;
    let ascent = cursor.read_u16_le()?;
    cursor.seek(80)?;
    let italic = cursor.read_u8()? != 0;
    cursor.seek(83)?;
    let weight = cursor.read_u16_le()?;
    let charset = cursor.read_u8()?;
    cursor.seek(90)?;
    let pitch_and_family = cursor.read_u8()?;
    let _avg_width = cursor.read_u16_le()?;
    let max_width = cursor.read_u16_le()?;
    let first_char = cursor.read_u8()?;
    let last_char = cursor.read_u8()?;
    cursor.seek(105)?;
    let face_offset = cursor.read_u32_le()?;
    Ok(Header {
        ascent,
        italic,
        weight,
        charset,
        pitch_and_family,
        max_width,
        first_char,
        last_char,
        face_offset,
    })
}

fn cstring_at(data: &[u8], offset: u32) -> Option<String> {
    if offset == 0 {
        return None;
    }
    let mut cursor = ByteCursor::new(data);
    cursor.seek(offset as usize).ok()?;
    cursor.read_cstring().ok().filter(|s| !s.is_empty())
}

fn mismatch(reason: &str) -> Error {
    Error::MetricsFormatMismatch(format!("PFM: {}", reason))
}

/// Parse a PFM file.
pub fn parse_pfm(data: &[u8]) -> Result<Type1Metrics> {
    if data.len() < HEADER_SIZE + EXTENSION_SIZE as usize {
        return Err(mismatch("file too short"));
    }
    let mut cursor = ByteCursor::new(data);
    if cursor.read_u16_le()? != PFM_VERSION {
        return Err(mismatch("unsupported version"));
    }
    let declared_size = cursor.read_u32_le()? as usize;
    if declared_size > data.len() {
        return Err(mismatch("declared size exceeds file size"));
    }

    let header = read_header(&mut cursor)?;

    cursor.seek(HEADER_SIZE)?;
    if cursor.read_u16_le()? != EXTENSION_SIZE {
        return Err(mismatch("bad extension table size"));
    }
    let ext_metrics_offset = cursor.read_u32_le()?;
    let extent_offset = cursor.read_u32_le()?;
    let _origin_offset = cursor.read_u32_le()?;
    let kern_offset = cursor.read_u32_le()?;
    let _track_kern_offset = cursor.read_u32_le()?;
    let driver_info_offset = cursor.read_u32_le()?;

    let mut metrics = Type1Metrics {
        font_name: cstring_at(data, driver_info_offset),
        family_name: cstring_at(data, header.face_offset),
        weight: Some(if header.weight >= 600 { "Bold" } else { "Medium" }.to_string()),
        is_fixed_pitch: header.pitch_and_family & 1 == 0,
        serif: is_serif_family(header.pitch_and_family),
        script: is_script_family(header.pitch_and_family),
        underline_position: -100,
        underline_thickness: 50,
        ascender: Some(header.ascent as i32),
        ..Default::default()
    };

    if ext_metrics_offset != 0 {
        let mut ext = ByteCursor::new(data);
        ext.seek(ext_metrics_offset as usize + 14)?;
        let cap_height = ext.read_i16_le()?;
        let x_height = ext.read_i16_le()?;
        let _lower_ascent = ext.read_i16_le()?;
        let lower_descent = ext.read_i16_le()?;
        let slant = ext.read_i16_le()?;
        metrics.cap_height = Some(cap_height as i32);
        metrics.x_height = Some(x_height as i32);
        metrics.descender = Some(-(lower_descent as i32).abs());
        metrics.italic_angle = slant as f64 / 10.0;
        ext.seek(ext_metrics_offset as usize + 32)?;
        metrics.underline_position = -(ext.read_i16_le()? as i32).abs();
        metrics.underline_thickness = ext.read_i16_le()? as i32;
    }
    if header.italic && metrics.italic_angle == 0.0 {
        metrics.italic_angle = -12.0;
    }

    let descender = metrics.descender.unwrap_or(0);
    metrics.font_bbox = [0, descender, header.max_width as i32, header.ascent as i32];

    let ansi = header.charset == ANSI_CHARSET;
    let names = Encoding::win_ansi();
    if extent_offset != 0 {
        let mut extents = ByteCursor::new(data);
        extents.seek(extent_offset as usize)?;
        for code in header.first_char..=header.last_char {
            let width = extents.read_u16_le()?;
            let name = ansi
                .then(|| names.glyph_name(code))
                .filter(|n| *n != ".notdef")
                .map(str::to_string);
            metrics.chars.push(CharMetric {
                code: code as i32,
                width,
                name,
                bbox: None,
            });
        }
    }

    if kern_offset != 0 && ansi {
        let mut kern = ByteCursor::new(data);
        kern.seek(kern_offset as usize)?;
        let count = kern.read_u16_le()?;
        for _ in 0..count {
            let left = kern.read_u8()?;
            let right = kern.read_u8()?;
            let value = kern.read_i16_le()?;
            let (l, r) = (names.glyph_name(left), names.glyph_name(right));
            if l != ".notdef" && r != ".notdef" {
                metrics.kern_pairs.push((l.to_string(), r.to_string(), value));
            }
        }
    }

    log::debug!("Parsed PFM for {:?}: {} widths", metrics.font_name, metrics.chars.len());
    Ok(metrics)
}

fn is_serif_family(pitch_and_family: u8) -> bool {
    pitch_and_family >> 4 == FAMILY_ROMAN
}

fn is_script_family(pitch_and_family: u8) -> bool {
    pitch_and_family >> 4 == FAMILY_SCRIPT
}
