//! CFF subset writer.
//!
//! Output keeps the String INDEX and the subroutine INDEX sizes of the
//! source font so subroutine numbers inside retained charstrings stay
//! valid. Subroutines no retained glyph reaches are reduced to `return`.

use std::collections::{BTreeSet, HashSet};

use super::dict::{op, Dict, Operand};
use super::index::{write_index, Index};
use super::CffFont;
use crate::error::Result;

const RETURN: &[u8] = &[11];

/// Operators whose operands are offsets and are written in fixed width.
const OFFSET_OPS: [u16; 6] = [
    op::CHARSET,
    op::CHAR_STRINGS,
    op::PRIVATE,
    op::FD_ARRAY,
    op::FD_SELECT,
    op::SUBRS,
];

fn reduce_subrs<'a>(index: &Index<'a>, used: &BTreeSet<usize>, keep_all: bool) -> Vec<&'a [u8]> {
    index
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| if keep_all || used.contains(&i) { *item } else { RETURN })
        .collect()
}

fn int(v: usize) -> Operand {
    Operand::Integer(v as i32)
}

pub(super) fn write_subset(font: &CffFont<'_>, glyphs: &[u16], max_depth: usize) -> Result<Vec<u8>> {
    let glyph_count = font.glyph_count();

    // Final glyph order: .notdef first, requested glyphs, then seac parts.
    let mut order: Vec<u16> = Vec::with_capacity(glyphs.len() + 1);
    let mut seen = HashSet::new();
    for &gid in std::iter::once(&0u16).chain(glyphs) {
        if (gid as usize) >= glyph_count {
            log::warn!("CFF subset: glyph {} out of range, skipped", gid);
            continue;
        }
        if seen.insert(gid) {
            order.push(gid);
        }
    }
    let mut i = 0;
    while i < order.len() {
        for part in font.composite_components(order[i], max_depth) {
            if seen.insert(part) {
                order.push(part);
            }
        }
        i += 1;
    }

    // Subroutine closure.
    let mut used_global = BTreeSet::new();
    let mut used_local = vec![BTreeSet::new(); font.privates.len()];
    let mut keep_all_local = vec![false; font.privates.len()];
    let mut keep_all_global = false;
    for &gid in &order {
        let fd = font.fd_select.get(gid as usize).copied().unwrap_or(0) as usize;
        match font.decode_glyph(gid, max_depth) {
            Ok(info) => {
                used_global.extend(info.global_subrs);
                used_local[fd].extend(info.local_subrs);
            },
            Err(e) => {
                log::warn!("CFF subset: glyph {} not decodable ({}), keeping its subroutines", gid, e);
                keep_all_local[fd] = true;
                keep_all_global = true;
            },
        }
    }
    log::debug!(
        "CFF subset of '{}': {} of {} glyphs, {} global subrs used",
        font.name,
        order.len(),
        glyph_count,
        used_global.len()
    );

    let cid_keyed = font.is_cid_keyed();
    let n = order.len();

    let gsubr_index = write_index(&reduce_subrs(&font.global_subrs, &used_global, keep_all_global));

    let mut charset = vec![0u8];
    for (new_gid, &old_gid) in order.iter().enumerate().skip(1) {
        let id = if cid_keyed {
            new_gid as u16
        } else {
            font.charset.get(old_gid as usize).copied().unwrap_or(0)
        };
        charset.extend_from_slice(&id.to_be_bytes());
    }

    let fd_select: Vec<u8> = if cid_keyed {
        std::iter::once(0u8)
            .chain(order.iter().map(|&gid| font.fd_select[gid as usize]))
            .collect()
    } else {
        Vec::new()
    };

    let charstring_items: Vec<&[u8]> = order
        .iter()
        .filter_map(|&gid| font.charstrings.get(gid as usize))
        .collect();
    let charstrings = write_index(&charstring_items);

    // Private DICTs followed by their local subroutines.
    let mut private_blocks: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(font.privates.len());
    for (fd, private) in font.privates.iter().enumerate() {
        let mut dict = private.dict.clone();
        let subrs = if private.subrs.is_empty() {
            dict.remove(op::SUBRS);
            Vec::new()
        } else {
            dict.set(op::SUBRS, vec![int(0)]);
            let size = dict.write(&OFFSET_OPS).len();
            dict.set(op::SUBRS, vec![int(size)]);
            write_index(&reduce_subrs(&private.subrs, &used_local[fd], keep_all_local[fd]))
        };
        private_blocks.push((dict.write(&OFFSET_OPS), subrs));
    }

    let mut top = font.top_dict.clone();
    top.remove(op::ENCODING);
    top.set(op::CHARSET, vec![int(0)]);
    top.set(op::CHAR_STRINGS, vec![int(0)]);
    if cid_keyed {
        top.remove(op::PRIVATE);
        top.set(op::FD_ARRAY, vec![int(0)]);
        top.set(op::FD_SELECT, vec![int(0)]);
        top.set(op::CID_COUNT, vec![int(n)]);
    } else {
        top.set(op::PRIVATE, vec![int(0), int(0)]);
    }

    let mut font_dicts: Vec<Dict> = font.font_dicts.clone();
    for fd in &mut font_dicts {
        fd.set(op::PRIVATE, vec![int(0), int(0)]);
    }
    let write_fd_array = |dicts: &[Dict]| {
        let items: Vec<Vec<u8>> = dicts.iter().map(|d| d.write(&OFFSET_OPS)).collect();
        write_index(&items)
    };

    let header = [1u8, 0, 4, 4];
    let name_index = write_index(&[font.name.as_bytes()]);
    let top_len = write_index(&[top.write(&OFFSET_OPS)]).len();
    let strings = font.strings.raw();

    let mut offset = header.len() + name_index.len() + top_len + strings.len() + gsubr_index.len();
    let charset_offset = offset;
    offset += charset.len();
    let fd_select_offset = offset;
    offset += fd_select.len();
    let charstrings_offset = offset;
    offset += charstrings.len();
    let fd_array_offset = offset;
    if cid_keyed {
        offset += write_fd_array(&font_dicts).len();
    }
    let mut private_offsets = Vec::with_capacity(private_blocks.len());
    for (dict, subrs) in &private_blocks {
        private_offsets.push((dict.len(), offset));
        offset += dict.len() + subrs.len();
    }

    top.set(op::CHARSET, vec![int(charset_offset)]);
    top.set(op::CHAR_STRINGS, vec![int(charstrings_offset)]);
    let fd_array = if cid_keyed {
        top.set(op::FD_ARRAY, vec![int(fd_array_offset)]);
        top.set(op::FD_SELECT, vec![int(fd_select_offset)]);
        for (fd, (size, at)) in font_dicts.iter_mut().zip(&private_offsets) {
            fd.set(op::PRIVATE, vec![int(*size), int(*at)]);
        }
        write_fd_array(&font_dicts)
    } else {
        let (size, at) = private_offsets[0];
        top.set(op::PRIVATE, vec![int(size), int(at)]);
        Vec::new()
    };
    let top_index = write_index(&[top.write(&OFFSET_OPS)]);

    let mut out = Vec::with_capacity(offset);
    out.extend_from_slice(&header);
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&top_index);
    out.extend_from_slice(strings);
    out.extend_from_slice(&gsubr_index);
    out.extend_from_slice(&charset);
    out.extend_from_slice(&fd_select);
    out.extend_from_slice(&charstrings);
    out.extend_from_slice(&fd_array);
    for (dict, subrs) in &private_blocks {
        out.extend_from_slice(dict);
        out.extend_from_slice(subrs);
    }
    debug_assert_eq!(out.len(), offset);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{build_cff, cs_num, simple_glyph};
    use super::*;

    fn font_with_subrs() -> Vec<u8> {
        // A calls subr 1, which calls subr 0. B calls subr 2.
        let subr0 = vec![11];
        let subr1 = [cs_num(-107), vec![10], vec![11]].concat();
        let subr2 = [cs_num(5), cs_num(5), vec![21], vec![11]].concat();
        let call = |biased: i32| [cs_num(biased), vec![10]].concat();
        let glyphs = vec![
            (".notdef", simple_glyph(0)),
            ("A", [cs_num(600), cs_num(0), vec![22], call(-106), vec![14]].concat()),
            ("B", [cs_num(650), cs_num(0), vec![22], call(-105), vec![14]].concat()),
            ("C", simple_glyph(700)),
        ];
        build_cff(&glyphs, &[subr0, subr1, subr2], &[])
    }

    #[test]
    fn test_subset_keeps_requested_glyphs() {
        let data = font_with_subrs();
        let font = CffFont::parse(&data).unwrap();
        let out = font.subset(&[0, 3, 1], 10).unwrap();
        let sub = CffFont::parse(&out).unwrap();

        assert_eq!(sub.glyph_count(), 3);
        assert_eq!(sub.glyph_name(1).as_deref(), Some("C"));
        assert_eq!(sub.glyph_name(2).as_deref(), Some("A"));
        assert_eq!(sub.decode_glyph(1, 10).unwrap().width, Some(700.0));
        assert_eq!(sub.decode_glyph(2, 10).unwrap().width, Some(600.0));
    }

    #[test]
    fn test_unused_subrs_become_return() {
        let data = font_with_subrs();
        let font = CffFont::parse(&data).unwrap();
        let out = font.subset(&[1], 10).unwrap();
        let sub = CffFont::parse(&out).unwrap();

        let subrs = &sub.privates[0].subrs;
        assert_eq!(subrs.len(), 3);
        // A reaches subr 1 and, through it, subr 0.
        assert_eq!(subrs.get(1), font.privates[0].subrs.get(1));
        assert_eq!(subrs.get(2), Some(RETURN));
    }

    #[test]
    fn test_subset_is_stable() {
        let data = font_with_subrs();
        let font = CffFont::parse(&data).unwrap();
        let once = font.subset(&[2], 10).unwrap();
        let sub = CffFont::parse(&once).unwrap();
        let twice = sub.subset(&[1], 10).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_composite_parts_added() {
        let agrave = [cs_num(600), cs_num(0), cs_num(0), cs_num(65), cs_num(193), vec![14]].concat();
        let glyphs = vec![
            (".notdef", simple_glyph(0)),
            ("A", simple_glyph(600)),
            ("grave", simple_glyph(300)),
            ("Agrave", agrave),
        ];
        let data = build_cff(&glyphs, &[], &[]);
        let font = CffFont::parse(&data).unwrap();
        let out = font.subset(&[3], 10).unwrap();
        let sub = CffFont::parse(&out).unwrap();
        assert_eq!(sub.glyph_count(), 4);
        assert_eq!(sub.gid_for_name("Agrave"), Some(1));
        assert!(sub.gid_for_name("A").is_some());
        assert!(sub.gid_for_name("grave").is_some());
    }

    #[test]
    fn test_cid_keyed_subset() {
        let glyphs: Vec<Vec<u8>> = vec![simple_glyph(0), simple_glyph(1000), simple_glyph(500)];
        let data = build_cid_cff(&glyphs);
        let font = CffFont::parse(&data).unwrap();
        assert!(font.is_cid_keyed());
        assert_eq!(font.decode_glyph(2, 10).unwrap().width, Some(500.0));

        let out = font.subset(&[2], 10).unwrap();
        let sub = CffFont::parse(&out).unwrap();
        assert!(sub.is_cid_keyed());
        assert_eq!(sub.glyph_count(), 2);
        assert_eq!(sub.charset, vec![0, 1]);
        assert_eq!(sub.top_dict.get_int(op::CID_COUNT), Some(2));
        assert_eq!(sub.decode_glyph(1, 10).unwrap().width, Some(500.0));
    }

    fn build_cid_cff(glyphs: &[Vec<u8>]) -> Vec<u8> {
        let header = [1u8, 0, 4, 4];
        let name_index = write_index(&[b"CIDTest".as_slice()]);
        let string_index = write_index(&[b"Adobe".as_slice(), b"Identity".as_slice()]);
        let gsubr_index = write_index::<&[u8]>(&[]);

        let mut charset = vec![0u8];
        for cid in 1..glyphs.len() as u16 {
            charset.extend_from_slice(&cid.to_be_bytes());
        }
        let mut fd_select = vec![0u8];
        fd_select.extend(std::iter::repeat(0u8).take(glyphs.len()));
        let charstrings = write_index(glyphs);
        let private = Dict::default().write(&[]);

        let mut top = Dict::default();
        top.set(op::ROS, vec![int(391), int(392), int(0)]);
        for o in [op::CHARSET, op::CHAR_STRINGS, op::FD_ARRAY, op::FD_SELECT] {
            top.set(o, vec![int(0)]);
        }
        let mut fd = Dict::default();
        fd.set(op::PRIVATE, vec![int(0), int(0)]);
        let top_len = write_index(&[top.write(&OFFSET_OPS)]).len();
        let fd_array_len = write_index(&[fd.write(&OFFSET_OPS)]).len();

        let charset_off = header.len() + name_index.len() + top_len + string_index.len() + gsubr_index.len();
        let fd_select_off = charset_off + charset.len();
        let charstrings_off = fd_select_off + fd_select.len();
        let fd_array_off = charstrings_off + charstrings.len();
        let private_off = fd_array_off + fd_array_len;

        top.set(op::CHARSET, vec![int(charset_off)]);
        top.set(op::FD_SELECT, vec![int(fd_select_off)]);
        top.set(op::CHAR_STRINGS, vec![int(charstrings_off)]);
        top.set(op::FD_ARRAY, vec![int(fd_array_off)]);
        fd.set(op::PRIVATE, vec![int(private.len()), int(private_off)]);

        let top_index = write_index(&[top.write(&OFFSET_OPS)]);
        let fd_array = write_index(&[fd.write(&OFFSET_OPS)]);
        [
            header.as_slice(),
            name_index.as_slice(),
            top_index.as_slice(),
            string_index.as_slice(),
            gsubr_index.as_slice(),
            charset.as_slice(),
            fd_select.as_slice(),
            charstrings.as_slice(),
            fd_array.as_slice(),
            private.as_slice(),
        ]
        .concat()
    }
}
