//! CID-to-Unicode (ToUnicode) CMap writer.
//!
//! Mappings are written as `beginbfrange` blocks. Runs of consecutive CIDs
//! that map to consecutive code points collapse into one range; a range
//! never crosses a 256-CID row. Each block holds at most 100 entries.

use std::fmt::Write;

const MAX_BLOCK_ENTRIES: usize = 100;

fn utf16_hex(unicode: u32) -> String {
    match char::from_u32(unicode) {
        Some(ch) => {
            let mut buf = [0u16; 2];
            ch.encode_utf16(&mut buf)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect()
        },
        None => "FFFD".to_string(),
    }
}

/// Collapse `(cid, unicode)` pairs into `(first, last, unicode of first)`.
fn ranges(mappings: &[(u16, u32)]) -> Vec<(u16, u16, u32)> {
    let mut sorted = mappings.to_vec();
    sorted.sort_by_key(|&(cid, _)| cid);
    sorted.dedup_by_key(|&mut (cid, _)| cid);

    let mut out: Vec<(u16, u16, u32)> = Vec::new();
    for (cid, unicode) in sorted {
        if let Some(last) = out.last_mut() {
            let next_cid = last.1 as u32 + 1;
            let offset = (cid - last.0) as u32;
            if cid as u32 == next_cid
                && cid >> 8 == last.0 >> 8
                && unicode == last.2 + offset
                && unicode <= 0xFFFF
            {
                last.1 = cid;
                continue;
            }
        }
        out.push((cid, cid, unicode));
    }
    out
}

/// Write a ToUnicode CMap for `(cid, unicode)` pairs.
pub fn write_tounicode_cmap(mappings: &[(u16, u32)]) -> Vec<u8> {
    let mut cmap = String::new();

    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo <<\n");
    cmap.push_str("  /Registry (Adobe)\n");
    cmap.push_str("  /Ordering (UCS)\n");
    cmap.push_str("  /Supplement 0\n");
    cmap.push_str(">> def\n");
    cmap.push_str("/CMapName /Adobe-Identity-UCS def\n");
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n");
    cmap.push_str("<0000> <FFFF>\n");
    cmap.push_str("endcodespacerange\n");

    for block in ranges(mappings).chunks(MAX_BLOCK_ENTRIES) {
        let _ = writeln!(cmap, "{} beginbfrange", block.len());
        for &(first, last, unicode) in block {
            let _ = writeln!(cmap, "<{:04X}> <{:04X}> <{}>", first, last, utf16_hex(unicode));
        }
        cmap.push_str("endbfrange\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\n");
    cmap.push_str("end\n");

    cmap.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_consecutive_runs_collapse() {
        let out = text(write_tounicode_cmap(&[(1, 0x41), (2, 0x42), (3, 0x43), (5, 0x20)]));
        assert!(out.contains("2 beginbfrange"));
        assert!(out.contains("<0001> <0003> <0041>"));
        assert!(out.contains("<0005> <0005> <0020>"));
        assert!(out.ends_with("end\nend\n"));
    }

    #[test]
    fn test_supplementary_plane_uses_surrogates() {
        let out = text(write_tounicode_cmap(&[(7, 0x1F600)]));
        assert!(out.contains("<0007> <0007> <D83DDE00>"));
    }

    #[test]
    fn test_blocks_hold_at_most_100_entries() {
        // Every other CID, so nothing collapses.
        let mappings: Vec<(u16, u32)> = (0..250u16).map(|i| (i * 2, 0x4E00 + i as u32 * 7)).collect();
        let out = text(write_tounicode_cmap(&mappings));
        let counts: Vec<usize> = out
            .lines()
            .filter_map(|l| l.strip_suffix(" beginbfrange"))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(counts, vec![100, 100, 50]);
        assert!(counts.iter().all(|&c| c <= 100));
    }

    #[test]
    fn test_ranges_do_not_cross_rows() {
        let out = text(write_tounicode_cmap(&[(0xFF, 0x100), (0x100, 0x101)]));
        assert!(out.contains("<00FF> <00FF> <0100>"));
        assert!(out.contains("<0100> <0100> <0101>"));
    }
}
