//! Builders for synthetic fonts used by the integration tests.

#![allow(dead_code)]

use pdf_font_engine::fonts::cff::dict::{op, Dict, Operand};
use pdf_font_engine::fonts::cff::index::write_index;
use pdf_font_engine::fonts::type1::pfb::{write_pfb, Segments};
use pdf_font_engine::fonts::type1::eexec;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn be16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn be32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// An sfnt font with `head`, `hhea`, `maxp`, `hmtx`, `OS/2`, `post`,
/// a format 4 `cmap`, `name` and optionally `kern` and `CFF `.
#[derive(Debug, Clone)]
pub struct SfntBuilder {
    pub family: String,
    pub postscript: String,
    pub units_per_em: u16,
    pub advances: Vec<u16>,
    pub cmap: Vec<(u16, u16)>,
    pub fs_type: u16,
    pub mac_style: u16,
    pub kern: Vec<(u16, u16, i16)>,
    pub cff: Option<Vec<u8>>,
}

impl SfntBuilder {
    /// Glyphs: .notdef 500, A 600, B 700, space 250, C 650 at 1000 units/em.
    pub fn new(family: &str, postscript: &str) -> Self {
        Self {
            family: family.to_string(),
            postscript: postscript.to_string(),
            units_per_em: 1000,
            advances: vec![500, 600, 700, 250, 650],
            cmap: vec![(0x41, 1), (0x42, 2), (0x20, 3), (0x43, 4)],
            fs_type: 0,
            mac_style: 0,
            kern: vec![(1, 2, -50)],
            cff: None,
        }
    }

    pub fn fs_type(mut self, fs_type: u16) -> Self {
        self.fs_type = fs_type;
        self
    }

    pub fn bold(mut self) -> Self {
        self.mac_style |= 1;
        self
    }

    pub fn cff(mut self, cff: Vec<u8>) -> Self {
        self.cff = Some(cff);
        self
    }

    fn tables(&self) -> Vec<([u8; 4], Vec<u8>)> {
        let mut tables = Vec::new();

        let mut head = vec![0u8; 54];
        head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
        head[18..20].copy_from_slice(&self.units_per_em.to_be_bytes());
        for (i, v) in [-50i16, -200, 1000, 900].iter().enumerate() {
            head[36 + i * 2..38 + i * 2].copy_from_slice(&v.to_be_bytes());
        }
        head[44..46].copy_from_slice(&self.mac_style.to_be_bytes());
        tables.push((*b"head", head));

        let mut hhea = vec![0u8; 36];
        hhea[4..6].copy_from_slice(&900i16.to_be_bytes());
        hhea[6..8].copy_from_slice(&(-200i16).to_be_bytes());
        hhea[18..20].copy_from_slice(&1i16.to_be_bytes());
        hhea[34..36].copy_from_slice(&(self.advances.len() as u16).to_be_bytes());
        tables.push((*b"hhea", hhea));

        let mut maxp = vec![0u8; 6];
        maxp[0..4].copy_from_slice(&0x0000_5000u32.to_be_bytes());
        maxp[4..6].copy_from_slice(&(self.advances.len() as u16).to_be_bytes());
        tables.push((*b"maxp", maxp));

        let mut hmtx = Vec::new();
        for &advance in &self.advances {
            be16(&mut hmtx, advance);
            be16(&mut hmtx, 0);
        }
        tables.push((*b"hmtx", hmtx));

        let mut os2 = vec![0u8; 96];
        os2[0..2].copy_from_slice(&4u16.to_be_bytes());
        os2[4..6].copy_from_slice(&400u16.to_be_bytes());
        os2[8..10].copy_from_slice(&self.fs_type.to_be_bytes());
        os2[68..70].copy_from_slice(&800i16.to_be_bytes());
        os2[70..72].copy_from_slice(&(-200i16).to_be_bytes());
        os2[86..88].copy_from_slice(&500i16.to_be_bytes());
        os2[88..90].copy_from_slice(&700i16.to_be_bytes());
        tables.push((*b"OS/2", os2));

        let mut post = vec![0u8; 32];
        post[0..4].copy_from_slice(&0x0003_0000u32.to_be_bytes());
        post[8..10].copy_from_slice(&(-100i16).to_be_bytes());
        post[10..12].copy_from_slice(&50i16.to_be_bytes());
        tables.push((*b"post", post));

        let mut cmap = Vec::new();
        be16(&mut cmap, 0);
        be16(&mut cmap, 1);
        be16(&mut cmap, 3);
        be16(&mut cmap, 1);
        be32(&mut cmap, 12);
        cmap.extend_from_slice(&format4(&self.cmap));
        tables.push((*b"cmap", cmap));

        let records = [(1u16, self.family.as_str()), (2, "Regular"), (6, self.postscript.as_str())];
        let mut name = Vec::new();
        be16(&mut name, 0);
        be16(&mut name, records.len() as u16);
        be16(&mut name, (6 + records.len() * 12) as u16);
        let mut strings = Vec::new();
        for (id, text) in records {
            let encoded: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
            be16(&mut name, 3);
            be16(&mut name, 1);
            be16(&mut name, 0x409);
            be16(&mut name, id);
            be16(&mut name, encoded.len() as u16);
            be16(&mut name, strings.len() as u16);
            strings.extend_from_slice(&encoded);
        }
        name.extend_from_slice(&strings);
        tables.push((*b"name", name));

        if !self.kern.is_empty() {
            let mut kern = Vec::new();
            be16(&mut kern, 0);
            be16(&mut kern, 1);
            be16(&mut kern, 0);
            be16(&mut kern, (14 + self.kern.len() * 6) as u16);
            be16(&mut kern, 0x0001);
            be16(&mut kern, self.kern.len() as u16);
            kern.extend_from_slice(&[0; 6]);
            for &(left, right, value) in &self.kern {
                be16(&mut kern, left);
                be16(&mut kern, right);
                kern.extend_from_slice(&value.to_be_bytes());
            }
            tables.push((*b"kern", kern));
        }

        if let Some(cff) = &self.cff {
            tables.push((*b"CFF ", cff.clone()));
        }
        tables.sort_by_key(|(tag, _)| *tag);
        tables
    }

    /// The font as written at `base` in a larger file.
    fn assemble(&self, base: usize) -> Vec<u8> {
        let tables = self.tables();
        let version = if self.cff.is_some() { u32::from_be_bytes(*b"OTTO") } else { 0x0001_0000 };
        let mut out = Vec::new();
        be32(&mut out, version);
        be16(&mut out, tables.len() as u16);
        out.extend_from_slice(&[0; 6]);

        let mut offset = base + 12 + tables.len() * 16;
        let mut body = Vec::new();
        for (tag, data) in &tables {
            out.extend_from_slice(tag);
            be32(&mut out, 0);
            be32(&mut out, offset as u32);
            be32(&mut out, data.len() as u32);
            body.extend_from_slice(data);
            let padded = (data.len() + 3) & !3;
            body.resize(body.len() + padded - data.len(), 0);
            offset += padded;
        }
        out.extend_from_slice(&body);
        out
    }

    pub fn build(&self) -> Vec<u8> {
        self.assemble(0)
    }
}

fn format4(entries: &[(u16, u16)]) -> Vec<u8> {
    let mut sorted = entries.to_vec();
    sorted.sort();
    let seg_count = sorted.len() + 1;
    let mut sub = Vec::new();
    be16(&mut sub, 4);
    be16(&mut sub, (16 + seg_count * 8) as u16);
    be16(&mut sub, 0);
    be16(&mut sub, (seg_count * 2) as u16);
    sub.extend_from_slice(&[0; 6]);
    for (code, _) in &sorted {
        be16(&mut sub, *code);
    }
    be16(&mut sub, 0xFFFF);
    be16(&mut sub, 0);
    for (code, _) in &sorted {
        be16(&mut sub, *code);
    }
    be16(&mut sub, 0xFFFF);
    for (code, gid) in &sorted {
        be16(&mut sub, gid.wrapping_sub(*code));
    }
    be16(&mut sub, 1);
    for _ in 0..seg_count {
        be16(&mut sub, 0);
    }
    sub
}

/// A TrueType collection of `fonts`.
pub fn collection(fonts: &[SfntBuilder]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"ttcf");
    be32(&mut out, 0x0001_0000);
    be32(&mut out, fonts.len() as u32);

    let mut base = 12 + fonts.len() * 4;
    let mut members = Vec::new();
    for font in fonts {
        be32(&mut out, base as u32);
        let data = font.assemble(base);
        base += data.len();
        members.push(data);
    }
    for member in members {
        out.extend_from_slice(&member);
    }
    out
}

/// Type1/Type2 charstring number.
pub fn cs_num(v: i32, type1: bool) -> Vec<u8> {
    match v {
        -107..=107 => vec![(v + 139) as u8],
        108..=1131 => {
            let w = v - 108;
            vec![(w / 256 + 247) as u8, (w % 256) as u8]
        },
        -1131..=-108 => {
            let w = -v - 108;
            vec![(w / 256 + 251) as u8, (w % 256) as u8]
        },
        _ if type1 => {
            let mut out = vec![255];
            out.extend_from_slice(&v.to_be_bytes());
            out
        },
        _ => {
            let mut out = vec![28];
            out.extend_from_slice(&(v as i16).to_be_bytes());
            out
        },
    }
}

/// Type2 `<width> 0 hmoveto endchar`.
pub fn t2_glyph(width: i32) -> Vec<u8> {
    [cs_num(width, false), cs_num(0, false), vec![22, 14]].concat()
}

/// Type2 glyph that calls local subroutine `subr` (unbiased, fewer than
/// 1240 subroutines).
pub fn t2_glyph_calling(width: i32, subr: i32) -> Vec<u8> {
    [cs_num(width, false), cs_num(0, false), vec![22], cs_num(subr - 107, false), vec![10, 14]].concat()
}

/// Type2 subroutine drawing a line, optionally calling another subroutine.
pub fn t2_subr(calls: Option<i32>) -> Vec<u8> {
    let mut code = [cs_num(10, false), cs_num(20, false), vec![5]].concat();
    if let Some(subr) = calls {
        code.extend(cs_num(subr - 107, false));
        code.push(10);
    }
    code.push(11);
    code
}

/// A name-keyed CFF. Glyph 0 must be `.notdef`; every other glyph name is
/// stored in the String INDEX.
pub fn cff_font(name: &str, glyphs: &[(&str, Vec<u8>)], subrs: &[Vec<u8>]) -> Vec<u8> {
    let header = [1u8, 0, 4, 4];
    let name_index = write_index(&[name.as_bytes()]);
    let custom: Vec<&[u8]> = glyphs.iter().skip(1).map(|(n, _)| n.as_bytes()).collect();
    let string_index = write_index(&custom);
    let gsubr_index = write_index::<&[u8]>(&[]);

    let mut charset = vec![0u8];
    for i in 0..custom.len() {
        charset.extend_from_slice(&(391 + i as u16).to_be_bytes());
    }
    let charstrings = write_index(&glyphs.iter().map(|(_, c)| c.as_slice()).collect::<Vec<_>>());

    let mut private = Dict::default();
    private.set(op::DEFAULT_WIDTH_X, vec![Operand::Integer(500)]);
    private.set(op::NOMINAL_WIDTH_X, vec![Operand::Integer(0)]);
    if !subrs.is_empty() {
        private.set(op::SUBRS, vec![Operand::Integer(0)]);
        let len = private.write(&[op::SUBRS]).len();
        private.set(op::SUBRS, vec![Operand::Integer(len as i32)]);
    }
    let private_bytes = private.write(&[op::SUBRS]);
    let subr_index = if subrs.is_empty() { Vec::new() } else { write_index(subrs) };

    let fixed = [op::CHARSET, op::CHAR_STRINGS, op::PRIVATE];
    let mut top = Dict::default();
    top.set(op::CHARSET, vec![Operand::Integer(0)]);
    top.set(op::CHAR_STRINGS, vec![Operand::Integer(0)]);
    top.set(op::PRIVATE, vec![Operand::Integer(0), Operand::Integer(0)]);
    let top_len = write_index(&[top.write(&fixed)]).len();

    let charset_offset = header.len() + name_index.len() + top_len + string_index.len() + gsubr_index.len();
    let charstrings_offset = charset_offset + charset.len();
    let private_offset = charstrings_offset + charstrings.len();
    top.set(op::CHARSET, vec![Operand::Integer(charset_offset as i32)]);
    top.set(op::CHAR_STRINGS, vec![Operand::Integer(charstrings_offset as i32)]);
    top.set(
        op::PRIVATE,
        vec![
            Operand::Integer(private_bytes.len() as i32),
            Operand::Integer(private_offset as i32),
        ],
    );
    let top_index = write_index(&[top.write(&fixed)]);

    [
        header.as_slice(),
        name_index.as_slice(),
        top_index.as_slice(),
        string_index.as_slice(),
        gsubr_index.as_slice(),
        charset.as_slice(),
        charstrings.as_slice(),
        private_bytes.as_slice(),
        subr_index.as_slice(),
    ]
    .concat()
}

/// Type1 `0 <width> hsbw endchar`.
pub fn t1_glyph(width: i32) -> Vec<u8> {
    [cs_num(0, true), cs_num(width, true), vec![13, 14]].concat()
}

/// Type1 `0 <width> hsbw <subr> callsubr endchar`.
pub fn t1_glyph_calling(width: i32, subr: i32) -> Vec<u8> {
    [cs_num(0, true), cs_num(width, true), vec![13], cs_num(subr, true), vec![10, 14]].concat()
}

/// A Type1 program in PFB form using StandardEncoding. Subrs 0-3 are
/// plain `return`s followed by `extra_subrs`.
pub fn type1_font(
    font_name: &str,
    family: &str,
    glyphs: &[(&str, Vec<u8>)],
    extra_subrs: &[Vec<u8>],
) -> Vec<u8> {
    let clear = format!(
        "%!PS-AdobeFont-1.0: {name} 001.000\n\
         11 dict begin\n\
         /FontInfo 8 dict dup begin\n\
         /FullName ({name}) readonly def\n\
         /FamilyName ({family}) readonly def\n\
         /Weight (Medium) readonly def\n\
         /ItalicAngle 0 def\n\
         /isFixedPitch false def\n\
         /UnderlinePosition -100 def\n\
         /UnderlineThickness 50 def\n\
         end readonly def\n\
         /FontName /{name} def\n\
         /PaintType 0 def\n\
         /FontMatrix [0.001 0 0 0.001 0 0] readonly def\n\
         /FontBBox {{-50 -200 1000 900}} readonly def\n\
         /Encoding StandardEncoding def\n\
         currentdict end\n\
         currentfile eexec\n",
        name = font_name,
        family = family
    );

    let mut subrs: Vec<Vec<u8>> = vec![vec![11]; 4];
    subrs.extend(extra_subrs.iter().cloned());

    let mut private: Vec<u8> = vec![0x5A, 0x5A, 0x5A, 0x5A];
    private.extend_from_slice(
        b"dup /Private 8 dict dup begin\n\
          /RD{string currentfile exch readstring pop}executeonly def\n\
          /ND{noaccess def}executeonly def\n\
          /NP{noaccess put}executeonly def\n\
          /lenIV 4 def\n",
    );
    private.extend_from_slice(format!("/Subrs {} array\n", subrs.len()).as_bytes());
    for (i, subr) in subrs.iter().enumerate() {
        let encrypted = eexec::encrypt_charstring(subr, 4);
        private.extend_from_slice(format!("dup {} {} RD ", i, encrypted.len()).as_bytes());
        private.extend_from_slice(&encrypted);
        private.extend_from_slice(b" NP\n");
    }
    private.extend_from_slice(b"ND\n2 index /CharStrings ");
    private.extend_from_slice(format!("{} dict dup begin\n", glyphs.len()).as_bytes());
    for (name, code) in glyphs {
        let encrypted = eexec::encrypt_charstring(code, 4);
        private.extend_from_slice(format!("/{} {} RD ", name, encrypted.len()).as_bytes());
        private.extend_from_slice(&encrypted);
        private.extend_from_slice(b" ND\n");
    }
    private.extend_from_slice(
        b"end\nend\nreadonly put\nnoaccess put\ndup /FontName get exch definefont pop\nmark currentfile closefile\n",
    );

    let mut trailer = Vec::new();
    for _ in 0..8 {
        trailer.extend_from_slice(&[b'0'; 64]);
        trailer.push(b'\n');
    }
    trailer.extend_from_slice(b"cleartomark\n");

    write_pfb(&Segments {
        cleartext: clear.into_bytes(),
        encrypted: eexec::encrypt(&private, eexec::EEXEC_KEY),
        trailer,
    })
}

/// AFM text for `chars` given as `(code, width, name)`; code -1 for
/// unencoded glyphs.
pub fn afm(font_name: &str, family: &str, weight: &str, chars: &[(i32, u16, &str)], kern: &[(&str, &str, i16)]) -> String {
    let mut text = format!(
        "StartFontMetrics 4.1\n\
         FontName {font_name}\n\
         FullName {font_name}\n\
         FamilyName {family}\n\
         Weight {weight}\n\
         ItalicAngle 0\n\
         IsFixedPitch false\n\
         FontBBox -50 -200 1000 900\n\
         UnderlinePosition -100\n\
         UnderlineThickness 50\n\
         EncodingScheme AdobeStandardEncoding\n\
         CapHeight 700\n\
         XHeight 500\n\
         Ascender 750\n\
         Descender -250\n\
         StdVW 80\n"
    );
    text.push_str(&format!("StartCharMetrics {}\n", chars.len()));
    for (code, width, name) in chars {
        text.push_str(&format!("C {} ; WX {} ; N {} ; B 0 0 {} 700 ;\n", code, width, name, width));
    }
    text.push_str("EndCharMetrics\n");
    if !kern.is_empty() {
        text.push_str(&format!("StartKernData\nStartKernPairs {}\n", kern.len()));
        for (left, right, value) in kern {
            text.push_str(&format!("KPX {} {} {}\n", left, right, value));
        }
        text.push_str("EndKernPairs\nEndKernData\n");
    }
    text.push_str("EndFontMetrics\n");
    text
}
