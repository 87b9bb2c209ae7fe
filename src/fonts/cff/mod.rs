//! Compact Font Format (CFF) reader and subset writer.
//!
//! Supports name-keyed fonts and CID-keyed fonts (ROS, FDArray, FDSelect).
//! Only the first font of a FontSet is used, which is all OpenType allows.

pub mod dict;
pub mod index;
mod standard_strings;
mod subset;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::fonts::charstring::{self, DecodeContext, GlyphInfo};
use crate::fonts::cursor::ByteCursor;
use crate::fonts::encoding::Encoding;

use dict::{op, Dict};
use index::Index;

pub(crate) use standard_strings::{standard_sid, STANDARD_STRINGS, STANDARD_STRING_COUNT};

/// Private DICT data for one font (or one FD of a CID-keyed font).
#[derive(Debug, Clone)]
pub(crate) struct PrivateData<'a> {
    dict: Dict,
    subrs: Index<'a>,
    default_width: f64,
    nominal_width: f64,
}

/// A parsed CFF font.
#[derive(Debug, Clone)]
pub struct CffFont<'a> {
    name: String,
    top_dict: Dict,
    strings: Index<'a>,
    global_subrs: Index<'a>,
    charstrings: Index<'a>,
    /// SID (name-keyed) or CID (CID-keyed) per glyph.
    charset: Vec<u16>,
    /// Font DICTs of a CID-keyed font.
    font_dicts: Vec<Dict>,
    /// FD index per glyph; empty for name-keyed fonts.
    fd_select: Vec<u8>,
    privates: Vec<PrivateData<'a>>,
}

impl<'a> CffFont<'a> {
    /// Parse a bare CFF table.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let major = cursor.read_u8()?;
        let _minor = cursor.read_u8()?;
        let header_size = cursor.read_u8()?;
        if major != 1 {
            return Err(Error::InvalidFontFile(format!("unsupported CFF version {}", major)));
        }
        cursor.seek(header_size as usize)?;

        let names = Index::parse(&mut cursor)?;
        let top_dicts = Index::parse(&mut cursor)?;
        let strings = Index::parse(&mut cursor)?;
        let global_subrs = Index::parse(&mut cursor)?;

        let name = names
            .get(0)
            .map(|n| n.iter().map(|&b| b as char).collect::<String>())
            .ok_or_else(|| Error::InvalidFontFile("CFF has no fonts".into()))?;
        let top_dict = Dict::parse(
            top_dicts
                .get(0)
                .ok_or_else(|| Error::InvalidFontFile("CFF has no Top DICT".into()))?,
        )?;

        let charstrings_offset = top_dict
            .get_int(op::CHAR_STRINGS)
            .ok_or_else(|| Error::MissingRequiredSection("CFF CharStrings".into()))?;
        let charstrings = Index::parse_at(data, charstrings_offset as usize)?;
        let glyph_count = charstrings.len();

        let charset = match top_dict.get_int(op::CHARSET).unwrap_or(0) {
            // ISOAdobe: GID n has SID n. Expert charsets are not mapped.
            0 => (0..glyph_count as u16).collect(),
            1 | 2 => vec![0; glyph_count],
            offset => parse_charset(data, offset as usize, glyph_count)?,
        };

        let mut font_dicts = Vec::new();
        let mut fd_select = Vec::new();
        let mut privates = Vec::new();

        if top_dict.contains(op::ROS) {
            let fd_array_offset = top_dict
                .get_int(op::FD_ARRAY)
                .ok_or_else(|| Error::MissingRequiredSection("CFF FDArray".into()))?;
            let fd_array = Index::parse_at(data, fd_array_offset as usize)?;
            for raw in fd_array.items() {
                let font_dict = Dict::parse(raw)?;
                privates.push(parse_private(data, &font_dict)?);
                font_dicts.push(font_dict);
            }
            if privates.is_empty() {
                return Err(Error::InvalidFontFile("CID-keyed CFF with empty FDArray".into()));
            }
            let fd_select_offset = top_dict
                .get_int(op::FD_SELECT)
                .ok_or_else(|| Error::MissingRequiredSection("CFF FDSelect".into()))?;
            fd_select = parse_fd_select(data, fd_select_offset as usize, glyph_count)?;
            if let Some(&bad) = fd_select.iter().find(|&&fd| fd as usize >= privates.len()) {
                return Err(Error::InvalidFontFile(format!("FDSelect refers to missing FD {}", bad)));
            }
        } else {
            privates.push(parse_private(data, &top_dict)?);
        }

        log::debug!(
            "CFF font '{}': {} glyphs, {} global subrs, cid-keyed={}",
            name,
            glyph_count,
            global_subrs.len(),
            !font_dicts.is_empty()
        );

        Ok(Self {
            name,
            top_dict,
            strings,
            global_subrs,
            charstrings,
            charset,
            font_dicts,
            fd_select,
            privates,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn glyph_count(&self) -> usize {
        self.charstrings.len()
    }

    pub fn is_cid_keyed(&self) -> bool {
        !self.font_dicts.is_empty()
    }

    /// CID of a glyph in a CID-keyed font, the GID itself otherwise.
    pub fn cid_for_gid(&self, gid: u16) -> u16 {
        if self.is_cid_keyed() {
            self.charset.get(gid as usize).copied().unwrap_or(gid)
        } else {
            gid
        }
    }

    /// Resolve a SID to its string.
    pub fn string(&self, sid: u16) -> Option<String> {
        let sid = sid as usize;
        if sid < STANDARD_STRING_COUNT {
            return Some(STANDARD_STRINGS[sid].to_string());
        }
        self.strings
            .get(sid - STANDARD_STRING_COUNT)
            .map(|s| s.iter().map(|&b| b as char).collect())
    }

    /// Glyph name of a name-keyed font.
    pub fn glyph_name(&self, gid: u16) -> Option<String> {
        if self.is_cid_keyed() {
            return None;
        }
        self.charset.get(gid as usize).and_then(|&sid| self.string(sid))
    }

    /// Find a glyph by name (name-keyed fonts only).
    pub fn gid_for_name(&self, name: &str) -> Option<u16> {
        if self.is_cid_keyed() {
            return None;
        }
        let sid = match standard_sid(name) {
            Some(sid) => sid,
            None => self
                .strings
                .items()
                .iter()
                .position(|s| s.iter().map(|&b| b as char).eq(name.chars()))
                .map(|p| (p + STANDARD_STRING_COUNT) as u16)?,
        };
        self.charset.iter().position(|&s| s == sid).map(|p| p as u16)
    }

    /// Map of glyph name to GID for name-keyed fonts.
    pub fn glyph_names(&self) -> HashMap<String, u16> {
        (0..self.glyph_count() as u16)
            .filter_map(|gid| self.glyph_name(gid).map(|n| (n, gid)))
            .collect()
    }

    pub(crate) fn private_for(&self, gid: u16) -> &PrivateData<'a> {
        let fd = self.fd_select.get(gid as usize).copied().unwrap_or(0) as usize;
        &self.privates[fd.min(self.privates.len() - 1)]
    }

    /// Run the charstring interpreter over one glyph.
    pub fn decode_glyph(&self, gid: u16, max_depth: usize) -> Result<GlyphInfo> {
        let code = self
            .charstrings
            .get(gid as usize)
            .ok_or_else(|| Error::InvalidCharstring(format!("glyph {} out of range", gid)))?;
        let private = self.private_for(gid);
        let ctx = DecodeContext::type2(private.subrs.items(), self.global_subrs.items())
            .with_widths(private.default_width, private.nominal_width)
            .with_max_depth(max_depth);
        charstring::decode(code, &ctx)
    }

    /// Glyphs referenced as `seac` components of `gid`.
    pub fn composite_components(&self, gid: u16, max_depth: usize) -> Vec<u16> {
        let info = match self.decode_glyph(gid, max_depth) {
            Ok(info) => info,
            Err(_) => return Vec::new(),
        };
        let Some(seac) = info.composite else {
            return Vec::new();
        };
        let standard = Encoding::standard();
        [seac.base, seac.accent]
            .iter()
            .filter_map(|&code| self.gid_for_name(standard.glyph_name(code)))
            .collect()
    }

    /// Write a subset containing `glyphs` (original GIDs in new order).
    pub fn subset(&self, glyphs: &[u16], max_depth: usize) -> Result<Vec<u8>> {
        subset::write_subset(self, glyphs, max_depth)
    }
}

fn parse_private<'a>(data: &'a [u8], owner: &Dict) -> Result<PrivateData<'a>> {
    let Some((size, offset)) = owner.get_pair(op::PRIVATE) else {
        return Ok(PrivateData {
            dict: Dict::default(),
            subrs: Index::default(),
            default_width: 0.0,
            nominal_width: 0.0,
        });
    };
    let end = offset.checked_add(size).ok_or(Error::UnexpectedEof)?;
    let bytes = data.get(offset..end).ok_or(Error::UnexpectedEof)?;
    let dict = Dict::parse(bytes)?;
    let subrs = match dict.get_int(op::SUBRS) {
        Some(rel) if rel > 0 => Index::parse_at(data, offset + rel as usize)?,
        _ => Index::default(),
    };
    Ok(PrivateData {
        default_width: dict.get_f64(op::DEFAULT_WIDTH_X).unwrap_or(0.0),
        nominal_width: dict.get_f64(op::NOMINAL_WIDTH_X).unwrap_or(0.0),
        dict,
        subrs,
    })
}

fn parse_charset(data: &[u8], offset: usize, glyph_count: usize) -> Result<Vec<u16>> {
    let mut cursor = ByteCursor::new(data);
    cursor.seek(offset)?;
    let mut charset = Vec::with_capacity(glyph_count);
    charset.push(0);
    let format = cursor.read_u8()?;
    match format {
        0 => {
            while charset.len() < glyph_count {
                charset.push(cursor.read_u16_be()?);
            }
        },
        1 | 2 => {
            while charset.len() < glyph_count {
                let first = cursor.read_u16_be()?;
                let left = if format == 1 {
                    cursor.read_u8()? as u16
                } else {
                    cursor.read_u16_be()?
                };
                for i in 0..=left {
                    if charset.len() == glyph_count {
                        break;
                    }
                    charset.push(first.wrapping_add(i));
                }
            }
        },
        _ => return Err(Error::InvalidFontFile(format!("charset format {}", format))),
    }
    charset.truncate(glyph_count);
    Ok(charset)
}

fn parse_fd_select(data: &[u8], offset: usize, glyph_count: usize) -> Result<Vec<u8>> {
    let mut cursor = ByteCursor::new(data);
    cursor.seek(offset)?;
    let format = cursor.read_u8()?;
    match format {
        0 => Ok(cursor.read_bytes(glyph_count)?.to_vec()),
        3 => {
            let ranges = cursor.read_u16_be()? as usize;
            let mut select = vec![0u8; glyph_count];
            let mut first = cursor.read_u16_be()? as usize;
            for _ in 0..ranges {
                let fd = cursor.read_u8()?;
                let next = cursor.read_u16_be()? as usize;
                for slot in select.iter_mut().take(next.min(glyph_count)).skip(first) {
                    *slot = fd;
                }
                first = next;
            }
            Ok(select)
        },
        _ => Err(Error::InvalidFontFile(format!("FDSelect format {}", format))),
    }
}
