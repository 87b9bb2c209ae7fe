//! CFF INDEX structures.

use crate::error::{Error, Result};
use crate::fonts::cursor::ByteCursor;

/// A parsed CFF INDEX: a counted array of variable-length objects.
#[derive(Debug, Clone, Default)]
pub struct Index<'a> {
    items: Vec<&'a [u8]>,
    /// The INDEX exactly as stored, header included.
    raw: &'a [u8],
}

impl<'a> Index<'a> {
    /// Parse an INDEX starting at the cursor position. The cursor ends up
    /// just past the INDEX.
    pub fn parse(cursor: &mut ByteCursor<'a>) -> Result<Self> {
        let start = cursor.tell();
        let count = cursor.read_u16_be()? as usize;
        if count == 0 {
            return Ok(Self {
                items: Vec::new(),
                raw: &cursor.data()[start..cursor.tell()],
            });
        }

        let off_size = cursor.read_u8()?;
        if !(1..=4).contains(&off_size) {
            return Err(Error::InvalidFontFile(format!("CFF INDEX offset size {}", off_size)));
        }
        let mut offsets = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            offsets.push(cursor.read_offset(off_size)? as usize);
        }
        // Offsets are 1-based relative to the byte before the data.
        let base = cursor.tell() - 1;
        let data = cursor.data();

        let mut items = Vec::with_capacity(count);
        for pair in offsets.windows(2) {
            let (s, e) = (base + pair[0], base + pair[1]);
            if pair[0] == 0 || s > e || e > data.len() {
                return Err(Error::InvalidFontFile("CFF INDEX offsets out of order".into()));
            }
            items.push(&data[s..e]);
        }

        let end = base + offsets[count];
        cursor.seek(end)?;
        Ok(Self {
            items,
            raw: &data[start..end],
        })
    }

    /// Parse an INDEX located at `offset` in `data`.
    pub fn parse_at(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        cursor.seek(offset)?;
        Self::parse(&mut cursor)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.items.get(index).copied()
    }

    pub fn items(&self) -> &[&'a [u8]] {
        &self.items
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

/// Serialize objects as a CFF INDEX using the smallest offset size.
pub fn write_index<T: AsRef<[u8]>>(items: &[T]) -> Vec<u8> {
    let count = items.len();
    let mut out = Vec::new();
    out.extend_from_slice(&(count as u16).to_be_bytes());
    if count == 0 {
        return out;
    }

    let data_len: usize = items.iter().map(|i| i.as_ref().len()).sum();
    let last = data_len + 1;
    let off_size: u8 = match last {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    out.push(off_size);

    let mut offset = 1usize;
    let push_offset = |out: &mut Vec<u8>, value: usize| {
        let bytes = (value as u32).to_be_bytes();
        out.extend_from_slice(&bytes[4 - off_size as usize..]);
    };
    push_offset(&mut out, offset);
    for item in items {
        offset += item.as_ref().len();
        push_offset(&mut out, offset);
    }
    for item in items {
        out.extend_from_slice(item.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let bytes = write_index::<&[u8]>(&[]);
        assert_eq!(bytes, vec![0, 0]);
        let idx = Index::parse_at(&bytes, 0).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.raw().len(), 2);
    }

    #[test]
    fn test_parse_written_index() {
        let items: Vec<&[u8]> = vec![&b"abc"[..], &b""[..], &b"de"[..]];
        let bytes = write_index(&items);
        // count, offSize=1, 4 offsets, 5 data bytes
        assert_eq!(bytes.len(), 2 + 1 + 4 + 5);

        let mut cursor = ByteCursor::new(&bytes);
        let idx = Index::parse(&mut cursor).unwrap();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.get(0), Some(&b"abc"[..]));
        assert_eq!(idx.get(1), Some(&b""[..]));
        assert_eq!(idx.get(2), Some(&b"de"[..]));
        assert_eq!(cursor.tell(), bytes.len());
    }

    #[test]
    fn test_large_offsets() {
        let big = vec![7u8; 300];
        let bytes = write_index(&[big.as_slice()]);
        assert_eq!(bytes[2], 2);
        let idx = Index::parse_at(&bytes, 0).unwrap();
        assert_eq!(idx.get(0).map(|s| s.len()), Some(300));
    }

    #[test]
    fn test_truncated_index() {
        let bytes = [0u8, 2, 1, 1, 3];
        assert!(Index::parse_at(&bytes, 0).is_err());
    }
}
