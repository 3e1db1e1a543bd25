//! Key to filename mapping
//!
//! Every stored key lives in its own file named `_<encoded>.json`.
//! Characters outside `[A-Za-z0-9_\- ]` are replaced by the `%XX`
//! (uppercase hex) form of each of their UTF-8 bytes, so arbitrary
//! Unicode keys produce names that are safe on common filesystems.
//!
//! Decoding only accepts names that `encode_key` could have produced.
//! Anything else found in the directory is an unmanaged file.

const PREFIX: char = '_';
const SUFFIX: &str = ".json";
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Encode a key into the filename that stores it
pub fn encode_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + PREFIX.len_utf8() + SUFFIX.len());
    name.push(PREFIX);

    let mut buf = [0u8; 4];
    for ch in key.chars() {
        if is_allowed(ch) {
            name.push(ch);
            continue;
        }
        for byte in ch.encode_utf8(&mut buf).bytes() {
            name.push('%');
            name.push(hex_digit(byte >> 4));
            name.push(hex_digit(byte & 0x0F));
        }
    }

    name.push_str(SUFFIX);
    name
}

/// Decode a filename back into its key
///
/// Returns `None` for any name that is not the exact output of
/// [`encode_key`] for some non-empty key (wrong shape, lowercase hex,
/// needlessly escaped characters, invalid UTF-8).
pub fn decode_filename(filename: &str) -> Option<String> {
    let body = filename.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if body.is_empty() || !body.chars().all(|c| is_allowed(c) || c == '%') {
        return None;
    }

    let raw = body.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hi = from_hex(*raw.get(i + 1)?)?;
            let lo = from_hex(*raw.get(i + 2)?)?;
            bytes.push(hi << 4 | lo);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    let key = String::from_utf8(bytes).ok()?;

    // Reject alternative spellings so decode stays the exact inverse
    if encode_key(&key) != filename {
        return None;
    }
    Some(key)
}

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ' ')
}

/// `nibble` is always below 16
fn hex_digit(nibble: u8) -> char {
    char::from(HEX_DIGITS[usize::from(nibble & 0x0F)])
}

fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
