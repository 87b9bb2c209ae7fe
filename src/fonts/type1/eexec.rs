//! The Type1 `eexec` and charstring ciphers.
//!
//! Both use the same running-key stream cipher and differ only in seed:
//! 55665 for the private section, 4330 for charstrings.

pub const EEXEC_KEY: u16 = 55665;
pub const CHARSTRING_KEY: u16 = 4330;

const C1: u16 = 52845;
const C2: u16 = 22719;

/// Decrypt a buffer with the given seed.
pub fn decrypt(data: &[u8], key: u16) -> Vec<u8> {
    let mut r = key;
    data.iter()
        .map(|&c| {
            let p = c ^ (r >> 8) as u8;
            r = (c as u16).wrapping_add(r).wrapping_mul(C1).wrapping_add(C2);
            p
        })
        .collect()
}

/// Encrypt a buffer with the given seed.
pub fn encrypt(plain: &[u8], key: u16) -> Vec<u8> {
    let mut r = key;
    plain
        .iter()
        .map(|&p| {
            let c = p ^ (r >> 8) as u8;
            r = (c as u16).wrapping_add(r).wrapping_mul(C1).wrapping_add(C2);
            c
        })
        .collect()
}

/// Decrypt a charstring and drop its `len_iv` leading bytes. A negative
/// `len_iv` means charstrings are stored in the clear.
pub fn decrypt_charstring(data: &[u8], len_iv: i32) -> Vec<u8> {
    if len_iv < 0 {
        return data.to_vec();
    }
    let plain = decrypt(data, CHARSTRING_KEY);
    plain.get(len_iv as usize..).map(<[u8]>::to_vec).unwrap_or_default()
}

/// Encrypt a charstring, prefixing `len_iv` zero bytes.
pub fn encrypt_charstring(plain: &[u8], len_iv: i32) -> Vec<u8> {
    if len_iv < 0 {
        return plain.to_vec();
    }
    let mut buf = vec![0u8; len_iv as usize];
    buf.extend_from_slice(plain);
    encrypt(&buf, CHARSTRING_KEY)
}

/// Whether an encrypted section is hex-encoded (its first four bytes are
/// hex digits).
pub fn is_hex_section(data: &[u8]) -> bool {
    let digits = data
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .take(4)
        .collect::<Vec<_>>();
    digits.len() == 4 && digits.iter().all(|b| b.is_ascii_hexdigit())
}

/// Convert hex text to bytes, skipping whitespace. Stops at the first
/// byte that is neither.
pub fn hex_to_binary(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &b in data {
        let nibble = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ if b.is_ascii_whitespace() => continue,
            _ => break,
        };
        match high.take() {
            Some(h) => out.push(h << 4 | nibble),
            None => high = Some(nibble),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // First byte: 0x00 ^ (55665 >> 8) = 0xD9
        assert_eq!(encrypt(&[0], EEXEC_KEY), vec![0xD9]);
        assert_eq!(decrypt(&[0xD9], EEXEC_KEY), vec![0]);
    }

    #[test]
    fn test_charstring_len_iv() {
        let plain = [139u8, 14];
        let enc = encrypt_charstring(&plain, 4);
        assert_eq!(enc.len(), 6);
        assert_eq!(decrypt_charstring(&enc, 4), plain.to_vec());
        assert_eq!(decrypt_charstring(&plain, -1), plain.to_vec());
    }

    #[test]
    fn test_hex_detection() {
        assert!(is_hex_section(b"d9d6 6f63"));
        assert!(!is_hex_section(&[0x80, 0x01, 0x02, 0x03]));
        assert_eq!(hex_to_binary(b"0a 1B\nff zz"), vec![0x0A, 0x1B, 0xFF]);
    }

    proptest! {
        #[test]
        fn eexec_round_trip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(decrypt(&encrypt(&data, EEXEC_KEY), EEXEC_KEY), data.clone());
            prop_assert_eq!(encrypt(&decrypt(&data, CHARSTRING_KEY), CHARSTRING_KEY), data);
        }
    }
}
