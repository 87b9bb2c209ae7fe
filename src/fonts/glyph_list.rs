//! Glyph name to Unicode lookup.
//!
//! Covers the glyph names of the Latin text encodings (StandardEncoding,
//! WinAnsi, ISO Latin-1) plus the `uniXXXX` / `uXXXX[XX]` conventions.

use phf::phf_map;

static GLYPH_NAMES: phf::Map<&'static str, char> = phf_map! {
    "space" => ' ', "exclam" => '!', "quotedbl" => '"', "numbersign" => '#',
    "dollar" => '$', "percent" => '%', "ampersand" => '&', "quotesingle" => '\'',
    "parenleft" => '(', "parenright" => ')', "asterisk" => '*', "plus" => '+',
    "comma" => ',', "hyphen" => '-', "period" => '.', "slash" => '/',
    "zero" => '0', "one" => '1', "two" => '2', "three" => '3', "four" => '4',
    "five" => '5', "six" => '6', "seven" => '7', "eight" => '8', "nine" => '9',
    "colon" => ':', "semicolon" => ';', "less" => '<', "equal" => '=',
    "greater" => '>', "question" => '?', "at" => '@',
    "A" => 'A', "B" => 'B', "C" => 'C', "D" => 'D', "E" => 'E', "F" => 'F',
    "G" => 'G', "H" => 'H', "I" => 'I', "J" => 'J', "K" => 'K', "L" => 'L',
    "M" => 'M', "N" => 'N', "O" => 'O', "P" => 'P', "Q" => 'Q', "R" => 'R',
    "S" => 'S', "T" => 'T', "U" => 'U', "V" => 'V', "W" => 'W', "X" => 'X',
    "Y" => 'Y', "Z" => 'Z',
    "bracketleft" => '[', "backslash" => '\\', "bracketright" => ']',
    "asciicircum" => '^', "underscore" => '_', "grave" => '`',
    "a" => 'a', "b" => 'b', "c" => 'c', "d" => 'd', "e" => 'e', "f" => 'f',
    "g" => 'g', "h" => 'h', "i" => 'i', "j" => 'j', "k" => 'k', "l" => 'l',
    "m" => 'm', "n" => 'n', "o" => 'o', "p" => 'p', "q" => 'q', "r" => 'r',
    "s" => 's', "t" => 't', "u" => 'u', "v" => 'v', "w" => 'w', "x" => 'x',
    "y" => 'y', "z" => 'z',
    "braceleft" => '{', "bar" => '|', "braceright" => '}', "asciitilde" => '~',
    "nbspace" => '\u{00A0}', "exclamdown" => '\u{00A1}', "cent" => '\u{00A2}',
    "sterling" => '\u{00A3}', "currency" => '\u{00A4}', "yen" => '\u{00A5}',
    "brokenbar" => '\u{00A6}', "section" => '\u{00A7}', "dieresis" => '\u{00A8}',
    "copyright" => '\u{00A9}', "ordfeminine" => '\u{00AA}', "guillemotleft" => '\u{00AB}',
    "logicalnot" => '\u{00AC}', "sfthyphen" => '\u{00AD}', "registered" => '\u{00AE}',
    "macron" => '\u{00AF}', "degree" => '\u{00B0}', "plusminus" => '\u{00B1}',
    "twosuperior" => '\u{00B2}', "threesuperior" => '\u{00B3}', "acute" => '\u{00B4}',
    "mu" => '\u{00B5}', "paragraph" => '\u{00B6}', "periodcentered" => '\u{00B7}',
    "cedilla" => '\u{00B8}', "onesuperior" => '\u{00B9}', "ordmasculine" => '\u{00BA}',
    "guillemotright" => '\u{00BB}', "onequarter" => '\u{00BC}', "onehalf" => '\u{00BD}',
    "threequarters" => '\u{00BE}', "questiondown" => '\u{00BF}',
    "Agrave" => '\u{00C0}', "Aacute" => '\u{00C1}', "Acircumflex" => '\u{00C2}',
    "Atilde" => '\u{00C3}', "Adieresis" => '\u{00C4}', "Aring" => '\u{00C5}',
    "AE" => '\u{00C6}', "Ccedilla" => '\u{00C7}', "Egrave" => '\u{00C8}',
    "Eacute" => '\u{00C9}', "Ecircumflex" => '\u{00CA}', "Edieresis" => '\u{00CB}',
    "Igrave" => '\u{00CC}', "Iacute" => '\u{00CD}', "Icircumflex" => '\u{00CE}',
    "Idieresis" => '\u{00CF}', "Eth" => '\u{00D0}', "Ntilde" => '\u{00D1}',
    "Ograve" => '\u{00D2}', "Oacute" => '\u{00D3}', "Ocircumflex" => '\u{00D4}',
    "Otilde" => '\u{00D5}', "Odieresis" => '\u{00D6}', "multiply" => '\u{00D7}',
    "Oslash" => '\u{00D8}', "Ugrave" => '\u{00D9}', "Uacute" => '\u{00DA}',
    "Ucircumflex" => '\u{00DB}', "Udieresis" => '\u{00DC}', "Yacute" => '\u{00DD}',
    "Thorn" => '\u{00DE}', "germandbls" => '\u{00DF}',
    "agrave" => '\u{00E0}', "aacute" => '\u{00E1}', "acircumflex" => '\u{00E2}',
    "atilde" => '\u{00E3}', "adieresis" => '\u{00E4}', "aring" => '\u{00E5}',
    "ae" => '\u{00E6}', "ccedilla" => '\u{00E7}', "egrave" => '\u{00E8}',
    "eacute" => '\u{00E9}', "ecircumflex" => '\u{00EA}', "edieresis" => '\u{00EB}',
    "igrave" => '\u{00EC}', "iacute" => '\u{00ED}', "icircumflex" => '\u{00EE}',
    "idieresis" => '\u{00EF}', "eth" => '\u{00F0}', "ntilde" => '\u{00F1}',
    "ograve" => '\u{00F2}', "oacute" => '\u{00F3}', "ocircumflex" => '\u{00F4}',
    "otilde" => '\u{00F5}', "odieresis" => '\u{00F6}', "divide" => '\u{00F7}',
    "oslash" => '\u{00F8}', "ugrave" => '\u{00F9}', "uacute" => '\u{00FA}',
    "ucircumflex" => '\u{00FB}', "udieresis" => '\u{00FC}', "yacute" => '\u{00FD}',
    "thorn" => '\u{00FE}', "ydieresis" => '\u{00FF}',
    "dotlessi" => '\u{0131}', "Lslash" => '\u{0141}', "lslash" => '\u{0142}',
    "OE" => '\u{0152}', "oe" => '\u{0153}', "Scaron" => '\u{0160}',
    "scaron" => '\u{0161}', "Ydieresis" => '\u{0178}', "Zcaron" => '\u{017D}',
    "zcaron" => '\u{017E}', "florin" => '\u{0192}', "circumflex" => '\u{02C6}',
    "caron" => '\u{02C7}', "breve" => '\u{02D8}', "dotaccent" => '\u{02D9}',
    "ring" => '\u{02DA}', "ogonek" => '\u{02DB}', "tilde" => '\u{02DC}',
    "hungarumlaut" => '\u{02DD}', "endash" => '\u{2013}', "emdash" => '\u{2014}',
    "quoteleft" => '\u{2018}', "quoteright" => '\u{2019}', "quotesinglbase" => '\u{201A}',
    "quotedblleft" => '\u{201C}', "quotedblright" => '\u{201D}', "quotedblbase" => '\u{201E}',
    "dagger" => '\u{2020}', "daggerdbl" => '\u{2021}', "bullet" => '\u{2022}',
    "ellipsis" => '\u{2026}', "perthousand" => '\u{2030}', "guilsinglleft" => '\u{2039}',
    "guilsinglright" => '\u{203A}', "fraction" => '\u{2044}', "Euro" => '\u{20AC}',
    "trademark" => '\u{2122}', "minus" => '\u{2212}', "fi" => '\u{FB01}', "fl" => '\u{FB02}',
};

/// Map a glyph name to its Unicode character.
pub fn glyph_name_to_unicode(glyph_name: &str) -> Option<char> {
    if let Some(&c) = GLYPH_NAMES.get(glyph_name) {
        return Some(c);
    }

    if let Some(hex) = glyph_name.strip_prefix("uni") {
        if hex.len() == 4 {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }

    if let Some(hex) = glyph_name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }

    log::trace!("Unknown glyph name: '{}'", glyph_name);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_names() {
        assert_eq!(glyph_name_to_unicode("A"), Some('A'));
        assert_eq!(glyph_name_to_unicode("space"), Some(' '));
        assert_eq!(glyph_name_to_unicode("Euro"), Some('€'));
        assert_eq!(glyph_name_to_unicode("fi"), Some('\u{FB01}'));
    }

    #[test]
    fn test_uni_conventions() {
        assert_eq!(glyph_name_to_unicode("uni0041"), Some('A'));
        assert_eq!(glyph_name_to_unicode("u1F600"), Some('\u{1F600}'));
        assert_eq!(glyph_name_to_unicode("uniZZZZ"), None);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(glyph_name_to_unicode("no.such.glyph"), None);
    }
}
