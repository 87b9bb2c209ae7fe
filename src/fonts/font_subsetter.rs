//! Glyph usage tracking and renumbering for font subsets.
//!
//! A [`GlyphUsage`] belongs to one font in one document. It records every
//! character code written with the font and the glyphs those codes use.
//! In subset mode each glyph receives a dense new index in first-seen
//! order, with glyph 0 (`.notdef`) always first. Width arrays, CID-to-GID
//! maps and the reduced font program are all written from the same usage,
//! so they agree on numbering.
//!
//! Subset fonts are named `ABCDEF+FontName`, where the tag is derived from
//! the used glyphs so the same subset always gets the same tag.

use std::collections::BTreeMap;

use indexmap::IndexSet;

/// Glyphs and character codes used with one font.
#[derive(Debug, Clone)]
pub struct GlyphUsage {
    subset: bool,
    /// Original GIDs; the position of a GID is its new index.
    glyphs: IndexSet<u16>,
    /// Character code to original GID.
    used_chars: BTreeMap<u32, u16>,
}

impl GlyphUsage {
    /// Create a usage record. Glyph 0 is always included.
    pub fn new(subset: bool) -> Self {
        let mut glyphs = IndexSet::new();
        glyphs.insert(0);
        Self {
            subset,
            glyphs,
            used_chars: BTreeMap::new(),
        }
    }

    /// Whether glyphs are renumbered.
    pub fn is_subset(&self) -> bool {
        self.subset
    }

    /// Record a glyph and return the index that addresses it in output:
    /// the new dense index in subset mode, the original GID otherwise.
    pub fn add_glyph(&mut self, gid: u16) -> u16 {
        let (new_gid, _) = self.glyphs.insert_full(gid);
        if self.subset {
            new_gid as u16
        } else {
            gid
        }
    }

    /// Record a character code with the glyph it maps to.
    pub fn use_char(&mut self, code: u32, gid: u16) -> u16 {
        self.used_chars.insert(code, gid);
        self.add_glyph(gid)
    }

    /// Record a character code that has no glyph of its own (code-addressed
    /// fonts such as Type1).
    pub fn use_code(&mut self, code: u32) {
        self.used_chars.entry(code).or_insert(0);
    }

    /// New index of an original glyph.
    pub fn new_gid(&self, gid: u16) -> Option<u16> {
        self.glyphs.get_index_of(&gid).map(|i| i as u16)
    }

    /// Original glyph at a new index.
    pub fn original_gid(&self, new_gid: u16) -> Option<u16> {
        self.glyphs.get_index(new_gid as usize).copied()
    }

    /// Output index of an original glyph, if it is used.
    pub fn cid_for(&self, gid: u16) -> Option<u16> {
        if self.subset {
            self.new_gid(gid)
        } else {
            self.glyphs.contains(&gid).then_some(gid)
        }
    }

    /// Original GIDs in new-index order.
    pub fn glyph_order(&self) -> Vec<u16> {
        self.glyphs.iter().copied().collect()
    }

    /// Number of glyphs, `.notdef` included.
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Character codes used, with their original GIDs.
    pub fn used_chars(&self) -> &BTreeMap<u32, u16> {
        &self.used_chars
    }

    /// Whether any character has been recorded.
    pub fn is_empty(&self) -> bool {
        self.used_chars.is_empty()
    }

    /// Deterministic six-letter subset tag.
    pub fn subset_tag(&self) -> String {
        hash_to_tag(self.compute_subset_hash())
    }

    /// Name of the subset font, e.g. `ABCDEF+Arial`.
    pub fn subset_font_name(&self, base_name: &str) -> String {
        format!("{}+{}", self.subset_tag(), base_name)
    }

    fn compute_subset_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for glyph in &self.glyphs {
            glyph.hash(&mut hasher);
        }
        for code in self.used_chars.keys() {
            code.hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn hash_to_tag(hash: u64) -> String {
    let mut tag = String::with_capacity(6);
    let mut h = hash;
    for _ in 0..6 {
        tag.push(((h % 26) as u8 + b'A') as char);
        h /= 26;
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_notdef_always_first() {
        let usage = GlyphUsage::new(true);
        assert_eq!(usage.glyph_count(), 1);
        assert_eq!(usage.original_gid(0), Some(0));
        assert!(usage.is_empty());
    }

    #[test]
    fn test_first_seen_order() {
        let mut usage = GlyphUsage::new(true);
        assert_eq!(usage.use_char(0x42, 37), 1);
        assert_eq!(usage.use_char(0x41, 12), 2);
        assert_eq!(usage.use_char(0x43, 37), 1);
        assert_eq!(usage.glyph_order(), vec![0, 37, 12]);
        assert_eq!(usage.used_chars().len(), 3);
    }

    #[test]
    fn test_identity_without_subsetting() {
        let mut usage = GlyphUsage::new(false);
        assert_eq!(usage.use_char(0x41, 12), 12);
        assert_eq!(usage.cid_for(12), Some(12));
        assert_eq!(usage.cid_for(13), None);
    }

    #[test]
    fn test_subset_tag_generation() {
        let mut usage = GlyphUsage::new(true);
        usage.use_char(0x41, 1);

        let tag = usage.subset_tag();
        assert_eq!(tag.len(), 6);
        assert!(tag.chars().all(|c| c.is_ascii_uppercase()));
        assert_eq!(tag, usage.subset_tag());
    }

    #[test]
    fn test_subset_font_name() {
        let mut usage = GlyphUsage::new(true);
        usage.use_char(0x41, 1);
        let name = usage.subset_font_name("Arial");
        assert!(name.ends_with("+Arial"));
        assert_eq!(name.split('+').next().map(str::len), Some(6));
    }

    proptest! {
        #[test]
        fn renumbering_is_a_bijection(gids in proptest::collection::vec(0u16..500, 0..200)) {
            let mut usage = GlyphUsage::new(true);
            for (i, gid) in gids.iter().enumerate() {
                usage.use_char(i as u32, *gid);
            }
            let order = usage.glyph_order();
            let n = order.len();
            for (new_gid, old_gid) in order.iter().enumerate() {
                prop_assert_eq!(usage.new_gid(*old_gid), Some(new_gid as u16));
                prop_assert_eq!(usage.original_gid(new_gid as u16), Some(*old_gid));
            }
            for gid in &gids {
                let new_gid = usage.new_gid(*gid).unwrap();
                prop_assert!((new_gid as usize) < n);
            }
        }
    }
}
