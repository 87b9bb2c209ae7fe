//! TrueType/OpenType (sfnt) font parser.
//!
//! Reads the table directory (optionally inside a TrueType Collection) and
//! the tables needed to describe and embed a font:
//! `head`, `hhea`, `OS/2`, `post`, `hmtx`, `maxp`, `name`, `kern` and
//! `cmap` (formats 0, 4, 6 and 12). CFF-flavoured fonts expose their
//! `CFF ` table for subsetting.
//!
//! # Permissions
//!
//! `OS/2.fsType` controls embedding. Embedding is refused when the
//! restricted-license bit is set without preview/print or editable, or when
//! only bitmaps may be embedded. Subsetting is refused by the no-subsetting
//! bit.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::fonts::cursor::ByteCursor;
use crate::fonts::font_data::{FontDescription, FontFlags, FontStyle};

/// A four-byte table tag.
pub type Tag = [u8; 4];

const TTC_TAG: u32 = 0x7474_6366; // 'ttcf'
const OTTO_TAG: u32 = 0x4F54_544F; // 'OTTO'

const FS_TYPE_RESTRICTED: u16 = 0x0002;
const FS_TYPE_PREVIEW_PRINT: u16 = 0x0004;
const FS_TYPE_EDITABLE: u16 = 0x0008;
const FS_TYPE_NO_SUBSETTING: u16 = 0x0100;
const FS_TYPE_BITMAP_ONLY: u16 = 0x0200;

/// Embedding rights derived from `fsType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub embed: bool,
    pub subset: bool,
}

/// Derive embedding and subsetting rights from an `fsType` value.
pub fn permissions(fs_type: u16) -> Permissions {
    let restricted = fs_type & FS_TYPE_RESTRICTED != 0
        && fs_type & (FS_TYPE_PREVIEW_PRINT | FS_TYPE_EDITABLE) == 0;
    let bitmap_only = fs_type & FS_TYPE_BITMAP_ONLY != 0;
    Permissions {
        embed: !(restricted || bitmap_only),
        subset: fs_type & FS_TYPE_NO_SUBSETTING == 0,
    }
}

#[derive(Debug, Clone, Copy)]
struct TableRecord {
    checksum: u32,
    offset: usize,
    length: usize,
}

/// Number of fonts in a file: the member count for a collection, 1 otherwise.
pub fn collection_count(data: &[u8]) -> Result<u32> {
    let mut cursor = ByteCursor::new(data);
    if cursor.read_u32_be()? != TTC_TAG {
        return Ok(1);
    }
    cursor.skip(4)?;
    cursor.read_u32_be()
}

fn directory_offset(data: &[u8], index: u32) -> Result<usize> {
    let mut cursor = ByteCursor::new(data);
    let tag = cursor.read_u32_be()?;
    if tag != TTC_TAG {
        if index != 0 {
            return Err(Error::FontIndexOutOfRange { index, count: 1 });
        }
        return Ok(0);
    }
    cursor.skip(4)?;
    let count = cursor.read_u32_be()?;
    if index >= count {
        return Err(Error::FontIndexOutOfRange { index, count });
    }
    cursor.skip(index as usize * 4)?;
    Ok(cursor.read_u32_be()? as usize)
}

fn read_directory(data: &[u8], offset: usize) -> Result<(u32, BTreeMap<Tag, TableRecord>)> {
    let mut cursor = ByteCursor::new(data);
    cursor.seek(offset)?;
    let version = cursor.read_u32_be()?;
    if !matches!(version, 0x0001_0000 | OTTO_TAG | 0x7472_7565) {
        return Err(Error::InvalidFontFile(format!("unknown sfnt version 0x{:08X}", version)));
    }
    let num_tables = cursor.read_u16_be()?;
    cursor.skip(6)?;

    let mut tables = BTreeMap::new();
    for _ in 0..num_tables {
        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag)?;
        let checksum = cursor.read_u32_be()?;
        let table_offset = cursor.read_u32_be()? as usize;
        let length = cursor.read_u32_be()? as usize;
        if table_offset.checked_add(length).map_or(true, |end| end > data.len()) {
            log::warn!(
                "sfnt table '{}' lies outside the file, ignored",
                String::from_utf8_lossy(&tag)
            );
            continue;
        }
        tables.insert(
            tag,
            TableRecord {
                checksum,
                offset: table_offset,
                length,
            },
        );
    }
    Ok((version, tables))
}

/// Copy one member of a collection into a standalone sfnt file.
///
/// Tables are written in tag order, each padded to a 4-byte boundary.
/// A non-collection input with index 0 is returned unchanged.
pub fn extract_font(data: &[u8], index: u32) -> Result<Vec<u8>> {
    let offset = directory_offset(data, index)?;
    if offset == 0 {
        return Ok(data.to_vec());
    }
    let (version, tables) = read_directory(data, offset)?;

    let num_tables = tables.len().min(u16::MAX as usize) as u16;
    let mut entry_selector = 0u16;
    while (1u32 << (entry_selector + 1)) <= num_tables as u32 {
        entry_selector += 1;
    }
    let search_range = ((1u32 << entry_selector) * 16).min(u16::MAX as u32);
    let range_shift = (num_tables as u32 * 16)
        .saturating_sub(search_range)
        .min(u16::MAX as u32) as u16;
    let search_range = search_range as u16;

    let mut out = Vec::new();
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&range_shift.to_be_bytes());

    let mut table_offset = 12 + 16 * tables.len();
    for (tag, record) in &tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&record.checksum.to_be_bytes());
        out.extend_from_slice(&(table_offset as u32).to_be_bytes());
        out.extend_from_slice(&(record.length as u32).to_be_bytes());
        table_offset += (record.length + 3) & !3;
    }
    for record in tables.values() {
        out.extend_from_slice(&data[record.offset..record.offset + record.length]);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    log::debug!("Extracted collection member {} ({} tables, {} bytes)", index, tables.len(), out.len());
    Ok(out)
}

/// Names from the `name` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontNames {
    pub postscript: Option<String>,
    pub family: Option<String>,
    pub subfamily: Option<String>,
    pub full: Option<String>,
}

/// Result of a light registration-time scan.
#[derive(Debug, Clone)]
pub struct FontScan {
    pub names: FontNames,
    pub style: FontStyle,
    pub cff: bool,
    pub fs_type: u16,
}

#[derive(Debug, Clone, Copy, Default)]
struct Os2 {
    version: u16,
    weight_class: u16,
    fs_type: u16,
    family_class: i16,
    fs_selection: u16,
    typo_ascender: i16,
    typo_descender: i16,
    cap_height: Option<i16>,
    x_height: Option<i16>,
}

#[derive(Debug, Clone, Copy)]
struct Post {
    italic_angle: f64,
    underline_position: i16,
    underline_thickness: i16,
    is_fixed_pitch: bool,
}

/// A fully parsed sfnt font.
#[derive(Debug, Clone)]
pub struct TrueTypeFont<'a> {
    data: &'a [u8],
    tables: BTreeMap<Tag, TableRecord>,
    names: FontNames,
    units_per_em: u16,
    bbox: [i16; 4],
    mac_style: u16,
    ascender: i16,
    descender: i16,
    caret_slope: (i16, i16),
    os2: Os2,
    post: Option<Post>,
    advances: Vec<u16>,
    cmap: HashMap<u32, u16>,
    symbol_cmap: bool,
    kerning: HashMap<(u16, u16), i16>,
}

impl<'a> TrueTypeFont<'a> {
    /// Registration-time scan: names, style, flavour and `fsType` only.
    pub fn scan(data: &'a [u8], index: u32) -> Result<FontScan> {
        let offset = directory_offset(data, index)?;
        let (_, tables) = read_directory(data, offset)?;
        let table = |tag: &Tag| tables.get(tag).map(|r| &data[r.offset..r.offset + r.length]);

        let names = match table(b"name") {
            Some(t) => parse_names(t)?,
            None => FontNames::default(),
        };
        let mac_style = match table(b"head") {
            Some(t) => {
                let mut c = ByteCursor::new(t);
                c.seek(44)?;
                c.read_u16_be()?
            },
            None => return Err(Error::MissingRequiredTable("head".into())),
        };
        let os2 = table(b"OS/2").map(parse_os2).transpose()?.unwrap_or_default();

        Ok(FontScan {
            names,
            style: style_from(mac_style, os2.fs_selection),
            cff: tables.contains_key(b"CFF "),
            fs_type: os2.fs_type,
        })
    }

    /// Parse member `index` of `data` (0 for plain sfnt files).
    pub fn parse(data: &'a [u8], index: u32) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::UnexpectedEof);
        }
        let offset = directory_offset(data, index)?;
        let (_, tables) = read_directory(data, offset)?;

        let required = |tag: &'static str| -> Result<&'a [u8]> {
            let key: Tag = tag.as_bytes().try_into().map_err(|_| Error::MissingRequiredTable(tag.into()))?;
            tables
                .get(&key)
                .map(|r| &data[r.offset..r.offset + r.length])
                .ok_or_else(|| Error::MissingRequiredTable(tag.into()))
        };
        let optional = |tag: &Tag| tables.get(tag).map(|r| &data[r.offset..r.offset + r.length]);

        let head = required("head")?;
        let hhea = required("hhea")?;
        let os2_table = required("OS/2")?;
        let cmap_table = required("cmap")?;
        let hmtx = required("hmtx")?;

        // head
        let mut c = ByteCursor::new(head);
        c.seek(12)?;
        if c.read_u32_be()? != 0x5F0F_3CF5 {
            log::warn!("head table has a bad magic number");
        }
        c.seek(18)?;
        let units_per_em = match c.read_u16_be()? {
            0 => 1000,
            upem => upem,
        };
        c.seek(36)?;
        let bbox = [c.read_i16_be()?, c.read_i16_be()?, c.read_i16_be()?, c.read_i16_be()?];
        let mac_style = c.read_u16_be()?;

        // hhea
        let mut c = ByteCursor::new(hhea);
        c.seek(4)?;
        let ascender = c.read_i16_be()?;
        let descender = c.read_i16_be()?;
        c.seek(18)?;
        let caret_slope = (c.read_i16_be()?, c.read_i16_be()?);
        c.seek(34)?;
        let num_h_metrics = c.read_u16_be()? as usize;

        let os2 = parse_os2(os2_table)?;
        let post = optional(b"post").map(parse_post).transpose()?;
        let names = match optional(b"name") {
            Some(t) => parse_names(t)?,
            None => FontNames::default(),
        };

        let num_glyphs = match optional(b"maxp") {
            Some(t) => {
                let mut c = ByteCursor::new(t);
                c.seek(4)?;
                c.read_u16_be()? as usize
            },
            None => num_h_metrics,
        };
        let advances = parse_hmtx(hmtx, num_h_metrics, num_glyphs.max(num_h_metrics))?;
        let (cmap, symbol_cmap) = parse_cmap(cmap_table)?;
        let kerning = match optional(b"kern") {
            Some(t) => parse_kern(t).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed kern table: {}", e);
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        log::debug!(
            "Parsed sfnt '{}': {} glyphs, {} cmap entries, {} kern pairs",
            names.postscript.as_deref().unwrap_or("?"),
            advances.len(),
            cmap.len(),
            kerning.len()
        );

        Ok(Self {
            data,
            tables,
            names,
            units_per_em,
            bbox,
            mac_style,
            ascender,
            descender,
            caret_slope,
            os2,
            post,
            advances,
            cmap,
            symbol_cmap,
            kerning,
        })
    }

    pub fn names(&self) -> &FontNames {
        &self.names
    }

    /// PostScript name, falling back to the full name without spaces.
    pub fn postscript_name(&self) -> Option<String> {
        self.names
            .postscript
            .clone()
            .or_else(|| self.names.full.as_ref().map(|n| n.replace(' ', "")))
    }

    pub fn family_name(&self) -> Option<String> {
        self.names.family.clone()
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn style(&self) -> FontStyle {
        style_from(self.mac_style, self.os2.fs_selection)
    }

    pub fn fs_type(&self) -> u16 {
        self.os2.fs_type
    }

    pub fn permissions(&self) -> Permissions {
        permissions(self.os2.fs_type)
    }

    /// Whether outlines are CFF rather than `glyf`.
    pub fn is_cff(&self) -> bool {
        self.tables.contains_key(b"CFF ")
    }

    /// The raw `CFF ` table.
    pub fn cff_table(&self) -> Option<&'a [u8]> {
        self.tables
            .get(b"CFF ")
            .map(|r| &self.data[r.offset..r.offset + r.length])
    }

    /// Whether the code map came from a (3,0) symbol subtable.
    pub fn is_symbolic(&self) -> bool {
        self.symbol_cmap
    }

    pub fn num_glyphs(&self) -> u16 {
        self.advances.len() as u16
    }

    /// Character code to glyph index.
    pub fn cmap(&self) -> &HashMap<u32, u16> {
        &self.cmap
    }

    pub fn glyph_id(&self, code: u32) -> Option<u16> {
        self.cmap.get(&code).copied()
    }

    /// Convert a value from font units to 1/1000 em.
    pub fn to_pdf_units(&self, value: i32) -> i32 {
        value * 1000 / self.units_per_em as i32
    }

    /// Advance width of a glyph in 1/1000 em.
    pub fn glyph_width(&self, gid: u16) -> u16 {
        let advance = self.advances.get(gid as usize).copied().unwrap_or(0);
        (advance as u32 * 1000 / self.units_per_em as u32).min(u16::MAX as u32) as u16
    }

    /// Advance width of a character code in 1/1000 em.
    pub fn char_width(&self, code: u32) -> Option<u16> {
        self.glyph_id(code).map(|gid| self.glyph_width(gid))
    }

    /// Kerning pairs by glyph index, in 1/1000 em.
    pub fn kerning(&self) -> HashMap<(u16, u16), i16> {
        self.kerning
            .iter()
            .map(|(&pair, &v)| (pair, self.to_pdf_units(v as i32) as i16))
            .collect()
    }

    /// Italic angle from `post`, or estimated from the caret slope.
    pub fn italic_angle(&self) -> f64 {
        if let Some(post) = &self.post {
            return post.italic_angle;
        }
        let (rise, run) = self.caret_slope;
        if rise == 0 || run == 0 {
            0.0
        } else {
            -(run as f64 / rise as f64).atan().to_degrees()
        }
    }

    /// StemV estimated from the weight class.
    pub fn stem_v(&self) -> i32 {
        let w = self.os2.weight_class as i32 / 65;
        50 + w * w
    }

    pub fn font_flags(&self) -> FontFlags {
        let mut flags = FontFlags::empty();
        if self.post.map_or(false, |p| p.is_fixed_pitch) {
            flags |= FontFlags::FIXED_PITCH;
        }
        // sFamilyClass 1-7 are serif classes, 10 is script.
        match self.os2.family_class >> 8 {
            1..=7 => flags |= FontFlags::SERIF,
            10 => flags |= FontFlags::SCRIPT,
            _ => {},
        }
        if self.symbol_cmap {
            flags |= FontFlags::SYMBOLIC;
        } else {
            flags |= FontFlags::NONSYMBOLIC;
        }
        let style = self.style();
        if style.contains(FontStyle::ITALIC) || self.italic_angle() != 0.0 {
            flags |= FontFlags::ITALIC;
        }
        if style.contains(FontStyle::BOLD) {
            flags |= FontFlags::FORCE_BOLD;
        }
        flags
    }

    /// Font descriptor metrics in 1/1000 em.
    pub fn description(&self) -> FontDescription {
        let (ascent, descent) = if self.os2.typo_ascender != 0 || self.os2.typo_descender != 0 {
            (self.os2.typo_ascender, self.os2.typo_descender)
        } else {
            (self.ascender, self.descender)
        };
        let ascent = self.to_pdf_units(ascent as i32);
        let cap_height = match self.os2.cap_height {
            Some(v) if self.os2.version >= 2 => self.to_pdf_units(v as i32),
            _ => ascent,
        };
        let x_height = match self.os2.x_height {
            Some(v) if self.os2.version >= 2 => self.to_pdf_units(v as i32),
            _ => ascent / 2,
        };
        let (underline_position, underline_thickness) = match &self.post {
            Some(p) => (
                self.to_pdf_units(p.underline_position as i32),
                self.to_pdf_units(p.underline_thickness as i32),
            ),
            None => (-100, 50),
        };
        FontDescription {
            ascent,
            descent: self.to_pdf_units(descent as i32),
            cap_height,
            flags: self.font_flags(),
            font_bbox: [
                self.to_pdf_units(self.bbox[0] as i32),
                self.to_pdf_units(self.bbox[1] as i32),
                self.to_pdf_units(self.bbox[2] as i32),
                self.to_pdf_units(self.bbox[3] as i32),
            ],
            italic_angle: self.italic_angle(),
            stem_v: self.stem_v(),
            missing_width: self.glyph_width(0) as i32,
            x_height,
            underline_position,
            underline_thickness,
        }
    }

    /// The whole source buffer.
    pub fn raw_data(&self) -> &'a [u8] {
        self.data
    }
}

fn style_from(mac_style: u16, fs_selection: u16) -> FontStyle {
    let mut style = FontStyle::REGULAR;
    if mac_style & 0x01 != 0 || fs_selection & 0x20 != 0 {
        style |= FontStyle::BOLD;
    }
    if mac_style & 0x02 != 0 || fs_selection & 0x01 != 0 {
        style |= FontStyle::ITALIC;
    }
    style
}

fn parse_os2(table: &[u8]) -> Result<Os2> {
    let mut c = ByteCursor::new(table);
    let version = c.read_u16_be()?;
    c.seek(4)?;
    let weight_class = c.read_u16_be()?;
    c.seek(8)?;
    let fs_type = c.read_u16_be()?;
    c.seek(30)?;
    let family_class = c.read_i16_be()?;
    c.seek(62)?;
    let fs_selection = c.read_u16_be()?;
    c.seek(68)?;
    let typo_ascender = c.read_i16_be()?;
    let typo_descender = c.read_i16_be()?;

    let (mut x_height, mut cap_height) = (None, None);
    if version >= 2 && c.seek(86).is_ok() {
        x_height = c.read_i16_be().ok();
        cap_height = c.read_i16_be().ok();
    }
    Ok(Os2 {
        version,
        weight_class,
        fs_type,
        family_class,
        fs_selection,
        typo_ascender,
        typo_descender,
        cap_height,
        x_height,
    })
}

fn parse_post(table: &[u8]) -> Result<Post> {
    let mut c = ByteCursor::new(table);
    c.seek(4)?;
    let italic_angle = c.read_i32_be()? as f64 / 65536.0;
    let underline_position = c.read_i16_be()?;
    let underline_thickness = c.read_i16_be()?;
    let is_fixed_pitch = c.read_u32_be()? != 0;
    Ok(Post {
        italic_angle,
        underline_position,
        underline_thickness,
        is_fixed_pitch,
    })
}

fn parse_hmtx(table: &[u8], num_h_metrics: usize, num_glyphs: usize) -> Result<Vec<u16>> {
    if num_h_metrics == 0 {
        return Err(Error::InvalidFontFile("hhea declares no horizontal metrics".into()));
    }
    let mut c = ByteCursor::new(table);
    let mut advances = Vec::with_capacity(num_glyphs);
    for _ in 0..num_h_metrics {
        advances.push(c.read_u16_be()?);
        c.skip(2)?;
    }
    // Glyphs past numberOfHMetrics repeat the last advance.
    let last = advances[num_h_metrics - 1];
    advances.resize(num_glyphs, last);
    Ok(advances)
}

fn parse_names(table: &[u8]) -> Result<FontNames> {
    let mut c = ByteCursor::new(table);
    c.skip(2)?;
    let count = c.read_u16_be()?;
    let string_offset = c.read_u16_be()? as usize;

    // (name id) -> (score, value); higher score wins.
    let mut best: HashMap<u16, (u8, String)> = HashMap::new();
    for _ in 0..count {
        let platform = c.read_u16_be()?;
        let encoding = c.read_u16_be()?;
        let language = c.read_u16_be()?;
        let name_id = c.read_u16_be()?;
        let length = c.read_u16_be()? as usize;
        let offset = c.read_u16_be()? as usize;
        if !matches!(name_id, 1 | 2 | 4 | 6) {
            continue;
        }

        let mut sc = ByteCursor::new(table);
        if sc.seek(string_offset + offset).is_err() {
            continue;
        }
        let (score, value) = match (platform, encoding) {
            (3, 0) | (3, 1) | (3, 10) | (0, _) => {
                let score = if language == 0x409 { 4 } else { 3 };
                match sc.read_utf16be_string(length) {
                    Ok(v) => (score, v),
                    Err(_) => continue,
                }
            },
            (1, 0) => match sc.read_fixed_string(length) {
                Ok(v) => (if language == 0 { 2 } else { 1 }, v),
                Err(_) => continue,
            },
            _ => continue,
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        match best.get(&name_id) {
            Some((existing, _)) if *existing >= score => {},
            _ => {
                best.insert(name_id, (score, value));
            },
        }
    }

    let mut take = |id: u16| best.remove(&id).map(|(_, v)| v);
    Ok(FontNames {
        family: take(1),
        subfamily: take(2),
        full: take(4),
        postscript: take(6).map(|n| n.replace(' ', "")),
    })
}

/// Decode the preferred `cmap` subtable. Returns the map and whether it is
/// a (3,0) symbol map.
fn parse_cmap(table: &[u8]) -> Result<(HashMap<u32, u16>, bool)> {
    let mut c = ByteCursor::new(table);
    c.skip(2)?;
    let num_subtables = c.read_u16_be()?;

    let mut subtables: HashMap<(u16, u16), usize> = HashMap::new();
    for _ in 0..num_subtables {
        let platform = c.read_u16_be()?;
        let encoding = c.read_u16_be()?;
        let offset = c.read_u32_be()? as usize;
        subtables.entry((platform, encoding)).or_insert(offset);
    }

    let unicode_full = subtables.get(&(3, 10)).or_else(|| subtables.get(&(0, 4)));
    let unicode_bmp = subtables
        .get(&(3, 1))
        .or_else(|| subtables.get(&(0, 3)))
        .or_else(|| subtables.get(&(0, 0)));
    let (offset, symbol) = if let Some(&o) = unicode_full.or(unicode_bmp) {
        (o, false)
    } else if let Some(&o) = subtables.get(&(3, 0)) {
        (o, true)
    } else if let Some(&o) = subtables.get(&(1, 0)) {
        (o, false)
    } else {
        return Err(Error::InvalidFontFile("no usable cmap subtable".into()));
    };

    let mut map = parse_cmap_subtable(table, offset)?;

    // Full-range maps may be format 4 in older fonts; merge the BMP map too.
    if let (Some(&full), Some(&bmp)) = (unicode_full, unicode_bmp) {
        if full != bmp {
            for (code, gid) in parse_cmap_subtable(table, bmp)? {
                map.entry(code).or_insert(gid);
            }
        }
    }

    if symbol {
        let low: Vec<(u32, u16)> = map
            .iter()
            .filter(|(&code, _)| (0xF000..=0xF0FF).contains(&code))
            .map(|(&code, &gid)| (code & 0xFF, gid))
            .collect();
        for (code, gid) in low {
            map.entry(code).or_insert(gid);
        }
    }
    Ok((map, symbol))
}

/// Upper bound on codes taken from a single format 12 group.
const MAX_GROUP_SPAN: u32 = 0x1_0000;

fn parse_cmap_subtable(table: &[u8], offset: usize) -> Result<HashMap<u32, u16>> {
    let mut c = ByteCursor::new(table);
    c.seek(offset)?;
    let format = c.read_u16_be()?;
    let mut map = HashMap::new();

    match format {
        0 => {
            c.skip(4)?;
            let glyphs = c.read_bytes(256)?;
            for (code, &gid) in glyphs.iter().enumerate() {
                if gid != 0 {
                    map.insert(code as u32, gid as u16);
                }
            }
        },
        4 => {
            c.skip(4)?;
            let seg_count = (c.read_u16_be()? / 2) as usize;
            c.skip(6)?;
            let mut ends = Vec::with_capacity(seg_count);
            for _ in 0..seg_count {
                ends.push(c.read_u16_be()?);
            }
            c.skip(2)?;
            let mut starts = Vec::with_capacity(seg_count);
            for _ in 0..seg_count {
                starts.push(c.read_u16_be()?);
            }
            let mut deltas = Vec::with_capacity(seg_count);
            for _ in 0..seg_count {
                deltas.push(c.read_u16_be()?);
            }
            let range_offsets_pos = c.tell();
            let mut range_offsets = Vec::with_capacity(seg_count);
            for _ in 0..seg_count {
                range_offsets.push(c.read_u16_be()?);
            }

            for i in 0..seg_count {
                let (start, end) = (starts[i], ends[i]);
                if start > end {
                    continue;
                }
                for code in start..=end {
                    if code == 0xFFFF {
                        break;
                    }
                    let gid = if range_offsets[i] == 0 {
                        code.wrapping_add(deltas[i])
                    } else {
                        let addr = range_offsets_pos
                            + i * 2
                            + range_offsets[i] as usize
                            + (code - start) as usize * 2;
                        let mut g = ByteCursor::new(table);
                        match g.seek(addr).and_then(|_| g.read_u16_be()) {
                            Ok(0) | Err(_) => 0,
                            Ok(raw) => raw.wrapping_add(deltas[i]),
                        }
                    };
                    if gid != 0 {
                        map.insert(code as u32, gid);
                    }
                }
            }
        },
        6 => {
            c.skip(4)?;
            let first = c.read_u16_be()? as u32;
            let count = c.read_u16_be()? as u32;
            for i in 0..count {
                let gid = c.read_u16_be()?;
                if gid != 0 {
                    map.insert(first + i, gid);
                }
            }
        },
        12 => {
            c.skip(10)?;
            let groups = c.read_u32_be()?;
            for _ in 0..groups {
                let start = c.read_u32_be()?;
                let end = c.read_u32_be()?.min(0x10_FFFF);
                let start_gid = c.read_u32_be()?;
                if start > end || end - start >= MAX_GROUP_SPAN {
                    log::warn!("Skipping cmap group {:X}..{:X}", start, end);
                    continue;
                }
                for code in start..=end {
                    match start_gid.checked_add(code - start) {
                        Some(gid) if gid != 0 && gid <= u16::MAX as u32 => {
                            map.insert(code, gid as u16);
                        },
                        Some(_) => {},
                        None => {
                            log::warn!("cmap group {:X}..{:X} overflows glyph ids", start, end);
                            break;
                        },
                    }
                }
            }
        },
        other => {
            return Err(Error::InvalidFontFile(format!("unsupported cmap format {}", other)));
        },
    }
    Ok(map)
}

fn parse_kern(table: &[u8]) -> Result<HashMap<(u16, u16), i16>> {
    let mut c = ByteCursor::new(table);
    let version = c.read_u16_be()?;
    if version != 0 {
        // Apple's 'kern' v1 layout is not read.
        return Ok(HashMap::new());
    }
    let count = c.read_u16_be()?;
    let mut pairs = HashMap::new();
    for _ in 0..count {
        let start = c.tell();
        c.skip(2)?;
        let length = c.read_u16_be()? as usize;
        let coverage = c.read_u16_be()?;
        let format = coverage >> 8;
        let horizontal = coverage & 0x1 != 0;
        let minimum = coverage & 0x2 != 0;
        let cross_stream = coverage & 0x4 != 0;
        if format == 0 && horizontal && !minimum && !cross_stream {
            let n = c.read_u16_be()?;
            c.skip(6)?;
            for _ in 0..n {
                let left = c.read_u16_be()?;
                let right = c.read_u16_be()?;
                let value = c.read_i16_be()?;
                pairs.insert((left, right), value);
            }
        }
        c.seek(start + length.max(6))?;
    }
    Ok(pairs)
}
