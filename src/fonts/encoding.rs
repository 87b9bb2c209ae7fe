//! Single-byte encodings and double-byte code pages.
//!
//! An [`Encoding`] assigns a glyph name and a Unicode value to each of the
//! 256 codes of a simple font. `standard`, `winansi` and `iso-8859-1` are
//! built in; other encodings are read from `<encoding_dir>/<name>.map`
//! files whose lines look like:
//!
//! ```text
//! !80 U+20AC Euro
//! ```
//!
//! The same file format with two-byte codes describes the code pages used
//! by Type0 (CJK) fonts, see [`CodePage`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fonts::glyph_list::glyph_name_to_unicode;

const ASCII_NAMES: [&str; 95] = [
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand",
    "quotesingle", "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period",
    "slash", "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "colon", "semicolon", "less", "equal", "greater", "question", "at", "A", "B", "C", "D", "E",
    "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W",
    "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum", "underscore",
    "grave", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p",
    "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "braceleft", "bar", "braceright",
    "asciitilde",
];

const LATIN1_UPPER_NAMES: [&str; 96] = [
    "space", "exclamdown", "cent", "sterling", "currency", "yen", "brokenbar", "section",
    "dieresis", "copyright", "ordfeminine", "guillemotleft", "logicalnot", "hyphen",
    "registered", "macron", "degree", "plusminus", "twosuperior", "threesuperior", "acute", "mu",
    "paragraph", "periodcentered", "cedilla", "onesuperior", "ordmasculine", "guillemotright",
    "onequarter", "onehalf", "threequarters", "questiondown", "Agrave", "Aacute", "Acircumflex",
    "Atilde", "Adieresis", "Aring", "AE", "Ccedilla", "Egrave", "Eacute", "Ecircumflex",
    "Edieresis", "Igrave", "Iacute", "Icircumflex", "Idieresis", "Eth", "Ntilde", "Ograve",
    "Oacute", "Ocircumflex", "Otilde", "Odieresis", "multiply", "Oslash", "Ugrave", "Uacute",
    "Ucircumflex", "Udieresis", "Yacute", "Thorn", "germandbls", "agrave", "aacute",
    "acircumflex", "atilde", "adieresis", "aring", "ae", "ccedilla", "egrave", "eacute",
    "ecircumflex", "edieresis", "igrave", "iacute", "icircumflex", "idieresis", "eth", "ntilde",
    "ograve", "oacute", "ocircumflex", "otilde", "odieresis", "divide", "oslash", "ugrave",
    "uacute", "ucircumflex", "udieresis", "yacute", "thorn", "ydieresis",
];

/// Windows-1252 names for 0x80..=0x9F ("" = undefined).
const WIN_ANSI_C1_NAMES: [&str; 32] = [
    "Euro", "", "quotesinglbase", "florin", "quotedblbase", "ellipsis", "dagger", "daggerdbl",
    "circumflex", "perthousand", "Scaron", "guilsinglleft", "OE", "", "Zcaron", "", "",
    "quoteleft", "quoteright", "quotedblleft", "quotedblright", "bullet", "endash", "emdash",
    "tilde", "trademark", "scaron", "guilsinglright", "oe", "", "zcaron", "Ydieresis",
];

/// Adobe StandardEncoding above 0xA0 (code, glyph name).
const STANDARD_UPPER: &[(u8, &str)] = &[
    (0xA1, "exclamdown"), (0xA2, "cent"), (0xA3, "sterling"), (0xA4, "fraction"),
    (0xA5, "yen"), (0xA6, "florin"), (0xA7, "section"), (0xA8, "currency"),
    (0xA9, "quotesingle"), (0xAA, "quotedblleft"), (0xAB, "guillemotleft"),
    (0xAC, "guilsinglleft"), (0xAD, "guilsinglright"), (0xAE, "fi"), (0xAF, "fl"),
    (0xB1, "endash"), (0xB2, "dagger"), (0xB3, "daggerdbl"), (0xB4, "periodcentered"),
    (0xB6, "paragraph"), (0xB7, "bullet"), (0xB8, "quotesinglbase"), (0xB9, "quotedblbase"),
    (0xBA, "quotedblright"), (0xBB, "guillemotright"), (0xBC, "ellipsis"),
    (0xBD, "perthousand"), (0xBF, "questiondown"), (0xC1, "grave"), (0xC2, "acute"),
    (0xC3, "circumflex"), (0xC4, "tilde"), (0xC5, "macron"), (0xC6, "breve"),
    (0xC7, "dotaccent"), (0xC8, "dieresis"), (0xCA, "ring"), (0xCB, "cedilla"),
    (0xCD, "hungarumlaut"), (0xCE, "ogonek"), (0xCF, "caron"), (0xD0, "emdash"),
    (0xE1, "AE"), (0xE3, "ordfeminine"), (0xE8, "Lslash"), (0xE9, "Oslash"), (0xEA, "OE"),
    (0xEB, "ordmasculine"), (0xF1, "ae"), (0xF5, "dotlessi"), (0xF8, "lslash"),
    (0xF9, "oslash"), (0xFA, "oe"), (0xFB, "germandbls"),
];

lazy_static! {
    static ref STANDARD: Arc<Encoding> = Arc::new(build_standard());
    static ref WIN_ANSI: Arc<Encoding> = Arc::new(build_win_ansi());
    static ref ISO_8859_1: Arc<Encoding> = Arc::new(build_iso_8859_1());
    static ref MAP_LINE: Regex =
        Regex::new(r"^!([0-9A-Fa-f]{2,4})\s+U\+([0-9A-Fa-f]{4,6})(?:\s+(\S+))?").unwrap();
}

fn ascii_names() -> Vec<String> {
    let mut names = vec![".notdef".to_string(); 256];
    for (i, name) in ASCII_NAMES.iter().enumerate() {
        names[32 + i] = name.to_string();
    }
    names
}

fn build_standard() -> Encoding {
    let mut names = ascii_names();
    names[0x27] = "quoteright".to_string();
    names[0x60] = "quoteleft".to_string();
    for &(code, name) in STANDARD_UPPER {
        names[code as usize] = name.to_string();
    }
    Encoding::from_glyph_names("standard", names)
}

fn build_win_ansi() -> Encoding {
    let mut names = ascii_names();
    for (i, name) in WIN_ANSI_C1_NAMES.iter().enumerate() {
        if !name.is_empty() {
            names[0x80 + i] = name.to_string();
        }
    }
    for (i, name) in LATIN1_UPPER_NAMES.iter().enumerate() {
        names[0xA0 + i] = name.to_string();
    }
    Encoding::from_glyph_names("winansi", names)
}

fn build_iso_8859_1() -> Encoding {
    let mut names = ascii_names();
    for (i, name) in LATIN1_UPPER_NAMES.iter().enumerate() {
        names[0xA0 + i] = name.to_string();
    }
    let mut encoding = Encoding::from_glyph_names("iso-8859-1", names);
    // Latin-1 codes are their own code points, including NBSP and SHY.
    for code in 0xA0..=0xFFu32 {
        encoding.set_unicode(code as u8, code);
    }
    encoding
}

/// A single-byte encoding: glyph name and Unicode value per code.
#[derive(Debug, Clone)]
pub struct Encoding {
    name: String,
    glyph_names: Vec<String>,
    unicodes: Vec<u32>,
    reverse: HashMap<u32, u8>,
}

impl Encoding {
    /// Build an encoding from 256 glyph names. Unicode values are derived
    /// from the glyph names.
    pub fn from_glyph_names(name: &str, mut glyph_names: Vec<String>) -> Self {
        glyph_names.resize(256, ".notdef".to_string());

        let mut encoding = Self {
            name: name.to_string(),
            unicodes: vec![0; 256],
            reverse: HashMap::new(),
            glyph_names,
        };
        for code in 0..256usize {
            let unicode = match encoding.glyph_names[code].as_str() {
                ".notdef" => None,
                glyph => glyph_name_to_unicode(glyph),
            };
            if let Some(c) = unicode {
                encoding.set_unicode(code as u8, c as u32);
            }
        }
        encoding
    }

    fn set_unicode(&mut self, code: u8, unicode: u32) {
        self.unicodes[code as usize] = unicode;
        // First code wins (e.g. WinAnsi maps both 0x20 and 0xA0 to space names).
        self.reverse.entry(unicode).or_insert(code);
    }

    /// Parse the text of a `.map` file.
    pub fn from_map_text(name: &str, text: &str) -> Self {
        let mut names = vec![".notdef".to_string(); 256];
        let mut unicodes = Vec::new();
        for line in text.lines() {
            let Some(caps) = MAP_LINE.captures(line.trim()) else {
                continue;
            };
            let (Ok(code), Ok(unicode)) = (
                u32::from_str_radix(&caps[1], 16),
                u32::from_str_radix(&caps[2], 16),
            ) else {
                continue;
            };
            if code > 0xFF {
                continue;
            }
            if let Some(glyph) = caps.get(3) {
                names[code as usize] = glyph.as_str().to_string();
            }
            unicodes.push((code as u8, unicode));
        }

        let mut encoding = Self::from_glyph_names(name, names);
        for (code, unicode) in unicodes {
            encoding.set_unicode(code, unicode);
        }
        encoding
    }

    /// A built-in encoding by (case-insensitive) name.
    pub fn builtin(name: &str) -> Option<Arc<Encoding>> {
        match name.to_ascii_lowercase().as_str() {
            "standard" | "standardencoding" => Some(STANDARD.clone()),
            "winansi" | "winansiencoding" | "cp1252" => Some(WIN_ANSI.clone()),
            "iso-8859-1" | "iso8859-1" | "latin1" => Some(ISO_8859_1.clone()),
            _ => None,
        }
    }

    /// Adobe StandardEncoding.
    pub fn standard() -> Arc<Encoding> {
        STANDARD.clone()
    }

    /// Windows ANSI (code page 1252).
    pub fn win_ansi() -> Arc<Encoding> {
        WIN_ANSI.clone()
    }

    /// Resolve an encoding: built-ins first, then `<encoding_dir>/<name>.map`.
    pub fn load(name: &str, config: &EngineConfig) -> Result<Arc<Encoding>> {
        if let Some(encoding) = Self::builtin(name) {
            return Ok(encoding);
        }
        let text = read_map_file(name, config)?;
        log::debug!("Loaded encoding map '{}'", name);
        Ok(Arc::new(Self::from_map_text(&name.to_ascii_lowercase(), &text)))
    }

    /// Encoding name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Glyph name of a code (`.notdef` when unassigned).
    pub fn glyph_name(&self, code: u8) -> &str {
        &self.glyph_names[code as usize]
    }

    /// All 256 glyph names.
    pub fn glyph_names(&self) -> &[String] {
        &self.glyph_names
    }

    /// Unicode value of a code.
    pub fn unicode(&self, code: u8) -> Option<u32> {
        match self.unicodes[code as usize] {
            0 => None,
            u => Some(u),
        }
    }

    /// Code assigned to a character.
    pub fn code_for_char(&self, ch: char) -> Option<u8> {
        self.reverse.get(&(ch as u32)).copied()
    }

    /// This encoding with a `/Differences` string (`128 /Euro /bullet`)
    /// applied.
    pub fn with_differences(&self, diff: &str) -> Encoding {
        let mut names = self.glyph_names.clone();
        let mut code: Option<usize> = None;
        for token in diff.split_whitespace() {
            if let Some(glyph) = token.strip_prefix('/') {
                if let Some(c) = code.filter(|&c| c < 256) {
                    names[c] = glyph.to_string();
                    code = Some(c + 1);
                }
            } else if let Ok(c) = token.parse::<usize>() {
                code = Some(c);
            }
        }
        Encoding::from_glyph_names(&self.name, names)
    }

    /// The PDF `/Differences` string of this encoding relative to `base`.
    pub fn differences_from(&self, base: &Encoding) -> String {
        let mut diff = String::new();
        let mut last: Option<usize> = None;
        for code in 0..256usize {
            let name = &self.glyph_names[code];
            if name == ".notdef" || *name == base.glyph_names[code] {
                continue;
            }
            if last != Some(code.wrapping_sub(1)) {
                if !diff.is_empty() {
                    diff.push(' ');
                }
                diff.push_str(&code.to_string());
            }
            diff.push_str(" /");
            diff.push_str(name);
            last = Some(code);
        }
        diff
    }
}

/// A double-byte code page mapping Unicode to 1- or 2-byte codes.
#[derive(Debug, Clone)]
pub struct CodePage {
    name: String,
    to_code: HashMap<u32, u16>,
}

impl CodePage {
    /// Parse the text of a `.map` file with 2-byte codes.
    pub fn from_map_text(name: &str, text: &str) -> Self {
        let mut to_code = HashMap::new();
        for line in text.lines() {
            if let Some(caps) = MAP_LINE.captures(line.trim()) {
                if let (Ok(code), Ok(unicode)) = (
                    u16::from_str_radix(&caps[1], 16),
                    u32::from_str_radix(&caps[2], 16),
                ) {
                    to_code.entry(unicode).or_insert(code);
                }
            }
        }
        Self {
            name: name.to_string(),
            to_code,
        }
    }

    /// Load `<encoding_dir>/<name>.map`.
    pub fn load(name: &str, config: &EngineConfig) -> Result<Self> {
        let text = read_map_file(name, config)?;
        Ok(Self::from_map_text(name, &text))
    }

    /// Code page name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Code of a character, if the code page covers it.
    pub fn code_for_char(&self, ch: char) -> Option<u16> {
        self.to_code.get(&(ch as u32)).copied()
    }
}

fn read_map_file(name: &str, config: &EngineConfig) -> Result<String> {
    let dir = config
        .encoding_dir
        .as_deref()
        .ok_or_else(|| Error::EncodingMapNotFound(name.to_string()))?;
    let path = map_path(dir, name);
    std::fs::read_to_string(&path)
        .map_err(|_| Error::EncodingMapNotFound(path.display().to_string()))
}

fn map_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}.map", name.to_ascii_lowercase()))
}
