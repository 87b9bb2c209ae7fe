//! Type1 (PostScript) font programs and their metric files.
//!
//! A Type1 font is a PostScript program in three parts: a cleartext header
//! dictionary, an `eexec`-encrypted private dictionary holding the
//! subroutines and charstrings, and a trailer of zeros. The program may come
//! as PFB (binary segments), PFA (plain text, encrypted part usually hex)
//! or a Macintosh resource file. Metrics come separately from AFM or PFM
//! files.

pub mod afm;
pub mod eexec;
pub mod pfb;
pub mod pfm;
pub mod tokenizer;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::fonts::charstring::{self, DecodeContext, GlyphInfo};
use crate::fonts::encoding::Encoding;

pub use afm::{parse_afm, CharMetric, Type1Metrics};
pub use pfb::Segments;
pub use pfm::parse_pfm;

use tokenizer::{literal_text, Lexer, Token};

/// Subroutines 0 to 3 implement flex and hint replacement and are always
/// kept.
const RESERVED_SUBRS: usize = 4;
const DEFAULT_LEN_IV: i32 = 4;
/// Decrypted bytes of random padding at the start of the private section.
const EEXEC_PADDING: usize = 4;
const TRAILER_ZEROS: usize = 512;

/// The `/Encoding` of a Type1 font.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Type1Encoding {
    /// `StandardEncoding`
    #[default]
    Standard,
    /// Font-specific array of 256 glyph names
    Custom(Vec<String>),
}

/// Values of the cleartext header dictionary.
#[derive(Debug, Clone, Default)]
pub struct Type1Header {
    pub font_name: String,
    pub full_name: Option<String>,
    pub family_name: Option<String>,
    pub weight: Option<String>,
    pub italic_angle: f64,
    pub is_fixed_pitch: bool,
    pub font_bbox: [i32; 4],
    pub underline_position: i32,
    pub underline_thickness: i32,
    /// Embedding restrictions, same bits as OS/2 `fsType`.
    pub fs_type: u16,
    pub encoding: Type1Encoding,
}

#[derive(Debug, Clone)]
struct Entry {
    /// Whole entry, `dup 5 23 RD <bytes> NP` or `/A 23 RD <bytes> ND`.
    span: Range<usize>,
    /// Encrypted charstring bytes.
    data: Range<usize>,
}

/// A parsed Type1 font program.
#[derive(Debug, Clone)]
pub struct Type1Font {
    pub header: Type1Header,
    segments: Segments,
    /// Decrypted private section, padding included.
    private: Vec<u8>,
    len_iv: i32,
    rd_op: String,
    np_op: String,
    subrs: Vec<Option<Entry>>,
    charstrings: IndexMap<String, Entry>,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Split a PFA (plain text) program at `eexec` and the zero trailer.
fn split_pfa(data: &[u8]) -> Result<Segments> {
    let eexec = find(data, b"eexec").ok_or_else(|| Error::MissingRequiredSection("eexec".to_string()))?;
    let mut body_start = eexec + b"eexec".len();
    while data.get(body_start).is_some_and(|&b| matches!(b, b'\r' | b'\n' | b' ' | b'\t')) {
        body_start += 1;
    }

    let mut trailer_start = data.len();
    if let Some(mark) = rfind(data, b"cleartomark") {
        trailer_start = mark;
        let mut zeros = 0;
        while trailer_start > body_start
            && matches!(data[trailer_start - 1], b'0' | b'\r' | b'\n' | b' ' | b'\t')
        {
            trailer_start -= 1;
            if data[trailer_start] == b'0' {
                zeros += 1;
            }
        }
        // Hex digits of the last encrypted line may also be zeros.
        while zeros > TRAILER_ZEROS {
            if data[trailer_start] == b'0' {
                zeros -= 1;
            }
            trailer_start += 1;
        }
    }

    let body = &data[body_start..trailer_start];
    let encrypted = if eexec::is_hex_section(body) {
        eexec::hex_to_binary(body)
    } else {
        body.to_vec()
    };
    let mut trailer = &data[trailer_start..];
    while let Some((&first, rest)) = trailer.split_first() {
        if !matches!(first, b'\r' | b'\n') {
            break;
        }
        trailer = rest;
    }

    Ok(Segments {
        cleartext: data[..body_start].to_vec(),
        encrypted,
        trailer: trailer.to_vec(),
    })
}

/// Locate the three parts of a font program in any supported container.
pub fn read_segments(data: &[u8]) -> Result<Segments> {
    if data.starts_with(b"%!") {
        let mut segments = split_pfa(data)?;
        if segments.trailer.is_empty() {
            segments.trailer = default_trailer();
        }
        return Ok(segments);
    }

    let mut segments = if pfb::is_pfb(data) {
        pfb::parse_pfb(data)?
    } else if pfb::mac_resource_fork(data).is_some() {
        pfb::parse_pfb(&pfb::mac_to_pfb(data)?)?
    } else {
        return Err(Error::InvalidFontFile("not a Type1 font program".to_string()));
    };

    if find(&segments.cleartext, b"eexec").is_none() {
        return Err(Error::MissingRequiredSection("eexec".to_string()));
    }
    // Some PFB files carry the encrypted part as hex text
    if eexec::is_hex_section(&segments.encrypted) {
        segments.encrypted = eexec::hex_to_binary(&segments.encrypted);
    }
    if segments.trailer.is_empty() {
        segments.trailer = default_trailer();
    }
    Ok(segments)
}

/// 512 zeros and `cleartomark`.
fn default_trailer() -> Vec<u8> {
    let mut trailer = Vec::with_capacity(8 * 65 + 12);
    for _ in 0..8 {
        trailer.extend_from_slice(&[b'0'; 64]);
        trailer.push(b'\n');
    }
    trailer.extend_from_slice(b"cleartomark\n");
    trailer
}

fn next_number(lexer: &mut Lexer<'_>) -> Option<f64> {
    lexer.next_token().and_then(|t| t.as_f64())
}

fn next_text(lexer: &mut Lexer<'_>) -> Option<String> {
    match lexer.next_token()? {
        Token::LiteralString(raw) => Some(literal_text(raw)),
        Token::Name(name) => Some(name.to_string()),
        _ => None,
    }
}

fn parse_bbox(lexer: &mut Lexer<'_>) -> Option<[i32; 4]> {
    let mut values = Vec::with_capacity(4);
    while let Some(tok) = lexer.next_token() {
        match tok {
            Token::ArrayStart | Token::ProcStart => continue,
            Token::ArrayEnd | Token::ProcEnd => break,
            other => values.push(other.as_f64()?.round() as i32),
        }
    }
    (values.len() == 4).then(|| [values[0], values[1], values[2], values[3]])
}

/// `/Encoding StandardEncoding def`, `/Encoding [/a /b ...] def` or
/// `/Encoding 256 array ... dup 65 /A put ... readonly def`.
fn parse_encoding(lexer: &mut Lexer<'_>) -> Type1Encoding {
    let mut names = vec![".notdef".to_string(); 256];
    match lexer.next_token() {
        Some(Token::Operator("StandardEncoding")) => return Type1Encoding::Standard,
        Some(Token::ArrayStart) => {
            let mut code = 0;
            while let Some(tok) = lexer.next_token() {
                match tok {
                    Token::Name(name) if code < 256 => {
                        names[code] = name.to_string();
                        code += 1;
                    },
                    Token::ArrayEnd => break,
                    _ => {},
                }
            }
        },
        Some(Token::Integer(_)) => {
            let mut window: Vec<Token<'_>> = Vec::with_capacity(4);
            while let Some(tok) = lexer.next_token() {
                if tok.is_operator("def") {
                    break;
                }
                if window.len() == 4 {
                    window.remove(0);
                }
                window.push(tok);
                if let [Token::Operator("dup"), Token::Integer(code), Token::Name(name), Token::Operator("put")] =
                    window.as_slice()
                {
                    if (0..256).contains(code) {
                        names[*code as usize] = name.to_string();
                    }
                    window.clear();
                }
            }
        },
        _ => return Type1Encoding::Standard,
    }
    Type1Encoding::Custom(names)
}

fn parse_header(cleartext: &[u8]) -> Result<Type1Header> {
    let mut header = Type1Header {
        underline_position: -100,
        underline_thickness: 50,
        ..Default::default()
    };
    let end = find(cleartext, b"eexec").unwrap_or(cleartext.len());
    let mut lexer = Lexer::new(&cleartext[..end]);

    while let Some(tok) = lexer.next_token() {
        let Token::Name(key) = tok else {
            continue;
        };
        match key {
            "FontName" => {
                if let Some(Token::Name(name)) = lexer.next_token() {
                    header.font_name = name.to_string();
                }
            },
            "FullName" => header.full_name = next_text(&mut lexer),
            "FamilyName" => header.family_name = next_text(&mut lexer),
            "Weight" => header.weight = next_text(&mut lexer),
            "ItalicAngle" => header.italic_angle = next_number(&mut lexer).unwrap_or(0.0),
            "isFixedPitch" => {
                header.is_fixed_pitch = lexer.next_token().is_some_and(|t| t.is_operator("true"))
            },
            "UnderlinePosition" => {
                header.underline_position = next_number(&mut lexer).unwrap_or(-100.0) as i32
            },
            "UnderlineThickness" => {
                header.underline_thickness = next_number(&mut lexer).unwrap_or(50.0) as i32
            },
            "FSType" => header.fs_type = next_number(&mut lexer).unwrap_or(0.0) as u16,
            "FontBBox" => {
                if let Some(bbox) = parse_bbox(&mut lexer) {
                    header.font_bbox = bbox;
                }
            },
            "Encoding" => header.encoding = parse_encoding(&mut lexer),
            _ => {},
        }
    }

    if header.font_name.is_empty() {
        return Err(Error::InvalidFontFile("Type1 font without /FontName".to_string()));
    }
    Ok(header)
}

/// Consume the terminator after an entry's binary data: `NP`, `|`,
/// `ND`, `|-` or the two-token forms `noaccess put` / `noaccess def`.
fn skip_terminator(lexer: &mut Lexer<'_>) -> Option<String> {
    let Token::Operator(op) = lexer.next_token()? else {
        return None;
    };
    if op == "noaccess" || op == "readonly" {
        if let Some(Token::Operator(next)) = lexer.next_token() {
            return Some(format!("{} {}", op, next));
        }
    }
    Some(op.to_string())
}

/// Read `<len> RD <bytes>` and return the data range and the RD operator.
fn read_charstring(lexer: &mut Lexer<'_>) -> Option<(Range<usize>, String)> {
    let len = lexer.next_token()?.as_i64().filter(|&l| l >= 0)? as usize;
    let Token::Operator(rd) = lexer.next_token()? else {
        return None;
    };
    lexer.read_binary(len)?;
    let end = lexer.offset();
    Some((end - len..end, rd.to_string()))
}

#[derive(Default)]
struct PrivateEntries {
    len_iv: Option<i32>,
    rd_op: Option<String>,
    np_op: Option<String>,
    subrs: Vec<Option<Entry>>,
    charstrings: IndexMap<String, Entry>,
}

fn parse_subrs(lexer: &mut Lexer<'_>, out: &mut PrivateEntries) {
    let count = lexer.next_token().and_then(|t| t.as_i64()).unwrap_or(0).clamp(0, 65535) as usize;
    out.subrs = vec![None; count];
    if lexer.peek().is_some_and(|t| t.is_operator("array")) {
        lexer.next_token();
    }

    while lexer.peek().is_some_and(|t| t.is_operator("dup")) {
        let start = lexer.next_token_start();
        lexer.next_token();
        let Some(index) = lexer.next_token().and_then(|t| t.as_i64()) else {
            return;
        };
        let Some((data, rd)) = read_charstring(lexer) else {
            log::warn!("Truncated Type1 subroutine {}", index);
            return;
        };
        let np = skip_terminator(lexer);
        out.rd_op.get_or_insert(rd);
        if let Some(np) = np {
            out.np_op.get_or_insert(np);
        }
        let entry = Entry {
            span: start..lexer.offset(),
            data,
        };
        match out.subrs.get_mut(index as usize) {
            Some(slot) if index >= 0 => *slot = Some(entry),
            _ => log::warn!("Type1 subroutine index {} outside 0..{}", index, count),
        }
    }
}

fn parse_charstrings(lexer: &mut Lexer<'_>, out: &mut PrivateEntries) {
    // `200 dict dup begin`
    while let Some(tok) = lexer.peek() {
        if matches!(tok, Token::Name(_)) {
            break;
        }
        lexer.next_token();
        if tok.is_operator("begin") {
            break;
        }
    }

    while let Some(Token::Name(name)) = lexer.peek() {
        let start = lexer.next_token_start();
        lexer.next_token();
        let Some((data, rd)) = read_charstring(lexer) else {
            log::warn!("Truncated Type1 charstring /{}", name);
            return;
        };
        skip_terminator(lexer);
        out.rd_op.get_or_insert(rd);
        out.charstrings.insert(
            name.to_string(),
            Entry {
                span: start..lexer.offset(),
                data,
            },
        );
    }
}

fn parse_private(private: &[u8]) -> PrivateEntries {
    let mut out = PrivateEntries::default();
    let mut lexer = Lexer::with_offset(private, EEXEC_PADDING);

    while let Some(tok) = lexer.next_token() {
        match tok {
            Token::Name("lenIV") => {
                out.len_iv = lexer.next_token().and_then(|t| t.as_i64()).map(|v| v as i32);
            },
            Token::Name("Subrs") if out.subrs.is_empty() => parse_subrs(&mut lexer, &mut out),
            Token::Name("CharStrings") => {
                parse_charstrings(&mut lexer, &mut out);
                break;
            },
            _ => {},
        }
    }
    out
}

impl Type1Font {
    /// Read only the cleartext header (names, bbox, encoding).
    pub fn scan(data: &[u8]) -> Result<Type1Header> {
        let segments = read_segments(data)?;
        parse_header(&segments.cleartext)
    }

    /// Parse a complete font program.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let segments = read_segments(data)?;
        let header = parse_header(&segments.cleartext)?;
        let private = eexec::decrypt(&segments.encrypted, eexec::EEXEC_KEY);
        let entries = parse_private(&private);

        if entries.charstrings.is_empty() {
            return Err(Error::MissingRequiredSection("CharStrings".to_string()));
        }
        log::debug!(
            "Parsed Type1 font {}: {} charstrings, {} subrs",
            header.font_name,
            entries.charstrings.len(),
            entries.subrs.len()
        );

        Ok(Self {
            header,
            segments,
            private,
            len_iv: entries.len_iv.unwrap_or(DEFAULT_LEN_IV),
            rd_op: entries.rd_op.unwrap_or_else(|| "RD".to_string()),
            np_op: entries.np_op.unwrap_or_else(|| "NP".to_string()),
            subrs: entries.subrs,
            charstrings: entries.charstrings,
        })
    }

    pub fn font_name(&self) -> &str {
        &self.header.font_name
    }

    pub fn len_iv(&self) -> i32 {
        self.len_iv
    }

    /// Glyph names in program order.
    pub fn glyph_names(&self) -> impl Iterator<Item = &str> {
        self.charstrings.keys().map(String::as_str)
    }

    pub fn has_glyph(&self, name: &str) -> bool {
        self.charstrings.contains_key(name)
    }

    pub fn subr_count(&self) -> usize {
        self.subrs.len()
    }

    /// The font's built-in encoding.
    pub fn builtin_encoding(&self) -> Arc<Encoding> {
        match &self.header.encoding {
            Type1Encoding::Standard => Encoding::standard(),
            Type1Encoding::Custom(names) => {
                Arc::new(Encoding::from_glyph_names(&self.header.font_name, names.clone()))
            },
        }
    }

    /// Decrypted charstring of a glyph, `lenIV` bytes removed.
    pub fn charstring(&self, name: &str) -> Option<Vec<u8>> {
        let entry = self.charstrings.get(name)?;
        Some(eexec::decrypt_charstring(&self.private[entry.data.clone()], self.len_iv))
    }

    fn decrypted_subrs(&self) -> Vec<Vec<u8>> {
        self.subrs
            .iter()
            .map(|entry| match entry {
                Some(e) => eexec::decrypt_charstring(&self.private[e.data.clone()], self.len_iv),
                None => Vec::new(),
            })
            .collect()
    }

    /// Run the charstring interpreter over every glyph.
    pub fn glyph_infos(&self, max_depth: usize) -> HashMap<String, Result<GlyphInfo>> {
        let subrs = self.decrypted_subrs();
        let refs: Vec<&[u8]> = subrs.iter().map(Vec::as_slice).collect();
        let ctx = DecodeContext::type1(&refs).with_max_depth(max_depth);
        self.charstrings
            .iter()
            .map(|(name, entry)| {
                let code = eexec::decrypt_charstring(&self.private[entry.data.clone()], self.len_iv);
                (name.clone(), charstring::decode(&code, &ctx))
            })
            .collect()
    }

    /// Advance widths from the `hsbw`/`sbw` of each charstring. Glyphs
    /// whose program fails to decode are left out.
    pub fn glyph_widths(&self, max_depth: usize) -> HashMap<String, u16> {
        self.glyph_infos(max_depth)
            .into_iter()
            .filter_map(|(name, info)| match info {
                Ok(GlyphInfo { width: Some(w), .. }) => Some((name, w.round().clamp(0.0, 65535.0) as u16)),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Type1 glyph /{} failed to decode: {}", name, e);
                    None
                },
            })
            .collect()
    }

    /// The unmodified program as cleartext, binary and trailer parts.
    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    /// A program holding only `used` glyphs, `.notdef` and the `seac`
    /// components of kept glyphs. Subroutines no kept glyph reaches
    /// (other than 0 to 3) are replaced by a bare `return`.
    pub fn subset(&self, used: &HashSet<String>, max_depth: usize) -> Segments {
        let subrs = self.decrypted_subrs();
        let refs: Vec<&[u8]> = subrs.iter().map(Vec::as_slice).collect();
        let ctx = DecodeContext::type1(&refs).with_max_depth(max_depth);
        let standard = Encoding::standard();

        let mut keep: BTreeSet<&str> = BTreeSet::new();
        let mut pending: Vec<&str> = vec![".notdef"];
        pending.extend(used.iter().map(String::as_str));
        let mut kept_subrs: BTreeSet<usize> = (0..RESERVED_SUBRS).collect();
        let mut keep_all_subrs = false;

        while let Some(name) = pending.pop() {
            let Some((name, entry)) = self.charstrings.get_key_value(name) else {
                continue;
            };
            if !keep.insert(name.as_str()) {
                continue;
            }
            let code = eexec::decrypt_charstring(&self.private[entry.data.clone()], self.len_iv);
            match charstring::decode(&code, &ctx) {
                Ok(info) => {
                    kept_subrs.extend(info.local_subrs.iter().copied());
                    if let Some(seac) = info.composite {
                        pending.push(standard.glyph_name(seac.base));
                        pending.push(standard.glyph_name(seac.accent));
                    }
                },
                Err(e) => {
                    log::warn!("Keeping all subroutines, /{} failed to decode: {}", name, e);
                    keep_all_subrs = true;
                },
            }
        }

        let mut edits: Vec<(&Entry, Option<Vec<u8>>)> = Vec::new();
        for (index, entry) in self.subrs.iter().enumerate() {
            let Some(entry) = entry else {
                continue;
            };
            if keep_all_subrs || kept_subrs.contains(&index) {
                edits.push((entry, Some(self.private[entry.span.clone()].to_vec())));
            } else {
                edits.push((entry, Some(self.return_subr(index))));
            }
        }
        for (name, entry) in &self.charstrings {
            if keep.contains(name.as_str()) {
                edits.push((entry, Some(self.private[entry.span.clone()].to_vec())));
            } else {
                edits.push((entry, None));
            }
        }
        edits.sort_by_key(|(entry, _)| entry.span.start);

        let mut private = Vec::with_capacity(self.private.len());
        let mut pos = 0;
        for (entry, replacement) in edits {
            private.extend_from_slice(&self.private[pos..entry.span.start]);
            if let Some(bytes) = replacement {
                private.extend_from_slice(&bytes);
            }
            pos = entry.span.end;
        }
        private.extend_from_slice(&self.private[pos..]);

        log::debug!(
            "Type1 subset of {}: {} of {} glyphs",
            self.header.font_name,
            keep.len(),
            self.charstrings.len()
        );

        Segments {
            cleartext: self.segments.cleartext.clone(),
            encrypted: eexec::encrypt(&private, eexec::EEXEC_KEY),
            trailer: self.segments.trailer.clone(),
        }
    }

    /// `dup <index> <len> RD <return> NP`
    fn return_subr(&self, index: usize) -> Vec<u8> {
        let code = eexec::encrypt_charstring(&[11], self.len_iv);
        let mut out = format!("dup {} {} {} ", index, code.len(), self.rd_op).into_bytes();
        out.extend_from_slice(&code);
        out.push(b' ');
        out.extend_from_slice(self.np_op.as_bytes());
        out
    }
}
