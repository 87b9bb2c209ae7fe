//! PFB segment handling and Macintosh font container conversion.
//!
//! A PFB file is a sequence of segments, each introduced by `0x80`, a type
//! byte (1 = ASCII, 2 = binary, 3 = end of file) and a little-endian
//! 32-bit length. Macintosh Type1 fonts keep the same data in `POST`
//! resources of a resource fork, which is converted to PFB here. The fork
//! may be bare or wrapped in AppleSingle, AppleDouble or MacBinary.

use crate::error::{Error, Result};
use crate::fonts::cursor::ByteCursor;

const SEGMENT_MARKER: u8 = 0x80;
const SEGMENT_ASCII: u8 = 1;
const SEGMENT_BINARY: u8 = 2;
const SEGMENT_EOF: u8 = 3;

const APPLE_SINGLE_MAGIC: u32 = 0x0005_1600;
const APPLE_DOUBLE_MAGIC: u32 = 0x0005_1607;
const APPLE_RESOURCE_FORK_ENTRY: u32 = 2;

/// The three parts of a Type1 font program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    /// Cleartext part up to and including `eexec`
    pub cleartext: Vec<u8>,
    /// Encrypted part (binary)
    pub encrypted: Vec<u8>,
    /// Trailer of zeros and `cleartomark`
    pub trailer: Vec<u8>,
}

/// Whether the data starts with a PFB segment header.
pub fn is_pfb(data: &[u8]) -> bool {
    data.len() >= 6 && data[0] == SEGMENT_MARKER && matches!(data[1], SEGMENT_ASCII | SEGMENT_BINARY)
}

/// Split a PFB file into its segments. ASCII segments before the first
/// binary segment form the cleartext; those after it form the trailer.
pub fn parse_pfb(data: &[u8]) -> Result<Segments> {
    let mut cursor = ByteCursor::new(data);
    let mut segments = Segments::default();
    let mut seen_binary = false;

    while cursor.remaining() > 0 {
        let offset = cursor.tell();
        let marker = cursor.read_u8()?;
        if marker != SEGMENT_MARKER {
            return Err(Error::InvalidPfbSegment {
                offset,
                reason: format!("expected marker 0x80, found 0x{:02X}", marker),
            });
        }
        let kind = cursor.read_u8()?;
        if kind == SEGMENT_EOF {
            break;
        }
        let length = cursor.read_u32_le()? as usize;
        let body = cursor.read_bytes(length).map_err(|_| Error::InvalidPfbSegment {
            offset,
            reason: format!("segment length {} exceeds file size", length),
        })?;
        match kind {
            SEGMENT_ASCII if seen_binary => segments.trailer.extend_from_slice(body),
            SEGMENT_ASCII => segments.cleartext.extend_from_slice(body),
            SEGMENT_BINARY => {
                seen_binary = true;
                segments.encrypted.extend_from_slice(body);
            },
            other => {
                return Err(Error::InvalidPfbSegment {
                    offset,
                    reason: format!("unknown segment type {}", other),
                })
            },
        }
    }

    if segments.cleartext.is_empty() {
        return Err(Error::InvalidPfbSegment {
            offset: 0,
            reason: "no ASCII segment".to_string(),
        });
    }
    Ok(segments)
}

fn push_segment(out: &mut Vec<u8>, kind: u8, body: &[u8]) {
    out.push(SEGMENT_MARKER);
    out.push(kind);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

/// Assemble a PFB file from its three parts.
pub fn write_pfb(segments: &Segments) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        segments.cleartext.len() + segments.encrypted.len() + segments.trailer.len() + 20,
    );
    push_segment(&mut out, SEGMENT_ASCII, &segments.cleartext);
    push_segment(&mut out, SEGMENT_BINARY, &segments.encrypted);
    if !segments.trailer.is_empty() {
        push_segment(&mut out, SEGMENT_ASCII, &segments.trailer);
    }
    out.push(SEGMENT_MARKER);
    out.push(SEGMENT_EOF);
    out
}

/// Locate the resource fork inside a Macintosh container, if the data is
/// one. Returns `None` for anything that is not a recognized container.
pub fn mac_resource_fork(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 16 {
        return None;
    }
    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if magic == APPLE_SINGLE_MAGIC || magic == APPLE_DOUBLE_MAGIC {
        return apple_single_fork(data);
    }
    if let Some(fork) = mac_binary_fork(data) {
        return Some(fork);
    }
    is_resource_fork(data).then_some(data)
}

fn apple_single_fork(data: &[u8]) -> Option<&[u8]> {
    let mut cursor = ByteCursor::new(data);
    cursor.seek(24).ok()?;
    let entries = cursor.read_u16_be().ok()?;
    for _ in 0..entries {
        let id = cursor.read_u32_be().ok()?;
        let offset = cursor.read_u32_be().ok()? as usize;
        let length = cursor.read_u32_be().ok()? as usize;
        if id == APPLE_RESOURCE_FORK_ENTRY {
            return data.get(offset..offset.checked_add(length)?);
        }
    }
    None
}

fn mac_binary_fork(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 128 || data[0] != 0 || data[74] != 0 || data[82] != 0 {
        return None;
    }
    let name_len = data[1] as usize;
    if !(1..=63).contains(&name_len) {
        return None;
    }
    let data_len = u32::from_be_bytes([data[83], data[84], data[85], data[86]]) as usize;
    let rsrc_len = u32::from_be_bytes([data[87], data[88], data[89], data[90]]) as usize;
    let rsrc_start = 128 + data_len.div_ceil(128) * 128;
    let fork = data.get(rsrc_start..rsrc_start.checked_add(rsrc_len)?)?;
    is_resource_fork(fork).then_some(fork)
}

/// Plausibility check of a bare resource fork header.
fn is_resource_fork(data: &[u8]) -> bool {
    let mut cursor = ByteCursor::new(data);
    let (Ok(data_offset), Ok(map_offset), Ok(data_len), Ok(map_len)) = (
        cursor.read_u32_be(),
        cursor.read_u32_be(),
        cursor.read_u32_be(),
        cursor.read_u32_be(),
    ) else {
        return false;
    };
    let (data_offset, map_offset) = (data_offset as usize, map_offset as usize);
    let (data_len, map_len) = (data_len as usize, map_len as usize);
    data_offset >= 16
        && map_len >= 30
        && data_offset.saturating_add(data_len) <= data.len()
        && map_offset.saturating_add(map_len) <= data.len()
}

/// Collect the `POST` resources of a resource fork in ID order.
fn post_resources(fork: &[u8]) -> Result<Vec<(u16, &[u8])>> {
    let mut cursor = ByteCursor::new(fork);
    let data_offset = cursor.read_u32_be()? as usize;
    let map_offset = cursor.read_u32_be()? as usize;

    cursor.seek(map_offset + 24)?;
    let type_list = map_offset + cursor.read_u16_be()? as usize;
    cursor.seek(type_list)?;
    let type_count = cursor.read_u16_be()? as usize + 1;

    let mut resources = Vec::new();
    for i in 0..type_count {
        cursor.seek(type_list + 2 + i * 8)?;
        let res_type = cursor.read_bytes(4)?;
        let count = cursor.read_u16_be()? as usize + 1;
        let ref_list = type_list + cursor.read_u16_be()? as usize;
        if res_type != b"POST" {
            continue;
        }
        for j in 0..count {
            cursor.seek(ref_list + j * 12)?;
            let id = cursor.read_u16_be()?;
            cursor.skip(3)?;
            let offset = data_offset + cursor.read_u24_be()? as usize;
            let mut body = ByteCursor::new(fork);
            body.seek(offset)?;
            let len = body.read_u32_be()? as usize;
            resources.push((id, body.read_bytes(len)?));
        }
    }
    resources.sort_by_key(|&(id, _)| id);
    Ok(resources)
}

/// Convert a Macintosh Type1 font (bare resource fork or wrapped) to PFB.
///
/// Each `POST` resource starts with a type byte (0 comment, 1 ASCII,
/// 2 binary, 3 end of file, 5 end of data) and a zero byte. Consecutive
/// resources of one type are merged into one PFB segment; ASCII line ends
/// are converted from CR to LF.
pub fn mac_to_pfb(data: &[u8]) -> Result<Vec<u8>> {
    let fork = mac_resource_fork(data)
        .ok_or_else(|| Error::InvalidFontFile("not a Macintosh resource file".to_string()))?;
    let resources = post_resources(fork)?;
    if resources.is_empty() {
        return Err(Error::MissingRequiredSection("POST resources".to_string()));
    }

    let mut out = Vec::new();
    let mut current: Option<(u8, Vec<u8>)> = None;
    for (id, resource) in resources {
        let Some((&kind, rest)) = resource.split_first() else {
            continue;
        };
        let body = rest.get(1..).unwrap_or_default();
        match kind {
            SEGMENT_ASCII | SEGMENT_BINARY => {
                if !matches!(current, Some((k, _)) if k == kind) {
                    if let Some((k, buf)) = current.take() {
                        push_segment(&mut out, k, &buf);
                    }
                    current = Some((kind, Vec::new()));
                }
                if let Some((_, buf)) = current.as_mut() {
                    append_body(buf, kind, body);
                }
            },
            SEGMENT_EOF | 5 => break,
            0 => {},
            other => log::warn!("Skipping POST resource {} of unknown type {}", id, other),
        }
    }
    if let Some((k, buf)) = current.take() {
        push_segment(&mut out, k, &buf);
    }
    out.push(SEGMENT_MARKER);
    out.push(SEGMENT_EOF);
    Ok(out)
}

fn append_body(buf: &mut Vec<u8>, kind: u8, body: &[u8]) {
    if kind == SEGMENT_ASCII {
        buf.extend(body.iter().map(|&b| if b == b'\r' { b'\n' } else { b }));
    } else {
        buf.extend_from_slice(body);
    }
}
