//! Text normalization to UTF-8.
//!
//! Every converter writes into a caller-supplied `String` (cleared first),
//! never produces more than `limit` bytes of output, stops at the first NUL
//! terminator, and returns the number of bytes written. A return value of
//! `0` means there is nothing to emit and the field must be treated as
//! absent.
//!
//! Truncation always happens on a character boundary, so the output is valid
//! UTF-8 even when the limit cuts a multi-byte sequence.

/// Convert ISO-8859-1 bytes to UTF-8.
///
/// Each Latin-1 byte maps directly onto the Unicode code point of the same
/// value.
pub fn latin1_to_utf8(out: &mut String, src: &[u8], limit: usize) -> usize {
    out.clear();
    for &b in src.iter().take_while(|&&b| b != 0) {
        if !push_bounded(out, b as char, limit) {
            break;
        }
    }
    out.len()
}

/// Convert UTF-16 to UTF-8.
///
/// A leading byte-order mark selects the endianness (`FF FE` little endian,
/// `FE FF` big endian). Without one the input is read as big endian. An odd
/// trailing byte is ignored; unpaired surrogates become U+FFFD.
pub fn utf16_to_utf8(out: &mut String, src: &[u8], limit: usize) -> usize {
    let (le, body) = match src {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, src),
    };
    let units = body
        .chunks_exact(2)
        .map(|p| {
            if le {
                u16::from_le_bytes([p[0], p[1]])
            } else {
                u16::from_be_bytes([p[0], p[1]])
            }
        })
        .take_while(|&u| u != 0);

    out.clear();
    for c in char::decode_utf16(units) {
        if !push_bounded(out, c.unwrap_or(char::REPLACEMENT_CHARACTER), limit) {
            break;
        }
    }
    out.len()
}

/// Copy UTF-8 bytes, replacing invalid sequences with U+FFFD.
pub fn utf8_bounded(out: &mut String, src: &[u8], limit: usize) -> usize {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    out.clear();
    for c in String::from_utf8_lossy(&src[..end]).chars() {
        if !push_bounded(out, c, limit) {
            break;
        }
    }
    out.len()
}

/// Append `c` unless doing so would exceed `limit` bytes.
fn push_bounded(out: &mut String, c: char, limit: usize) -> bool {
    if out.len() + c.len_utf8() > limit {
        return false;
    }
    out.push(c);
    true
}
