//! Opaque challenge identifiers.
//!
//! An internal id is written as a big-endian `u32`, leading zero bytes are
//! dropped, and the rest is base32 encoded (lowercase RFC 4648 alphabet,
//! unpadded). Encoded ids are 2, 4, 5 or 7 characters long.

use thiserror::Error;

const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0:?} is not a valid challenge id")]
pub struct InvalidChallengeId(pub String);

/// Whether `id` can be encoded.
pub fn in_domain(id: u32) -> bool {
    id != 0 && id != u32::MAX
}

/// Encode an internal challenge id.
///
/// # Panics
///
/// If `id` is 0 or `u32::MAX`. Both indicate a bug in the caller.
pub fn encode(id: u32) -> String {
    assert!(in_domain(id), "challenge id {id} out of bounds");

    let bytes = id.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    let bytes = &bytes[first..];

    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &b in bytes {
        buffer = (buffer << 8) | u32::from(b);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Decode an opaque challenge id back to the internal id.
///
/// Only strings produced by [`encode`] are accepted, so decoding is the exact
/// inverse of encoding.
pub fn decode(encoded: &str) -> Result<u32, InvalidChallengeId> {
    let invalid = || InvalidChallengeId(encoded.to_string());

    let byte_len: u32 = match encoded.len() {
        2 => 1,
        4 => 2,
        5 => 3,
        7 => 4,
        _ => return Err(invalid()),
    };

    let mut value: u64 = 0;
    for c in encoded.bytes() {
        let symbol = symbol_value(c).ok_or_else(invalid)?;
        value = (value << 5) | u64::from(symbol);
    }

    let trailing = encoded.len() as u32 * 5 - byte_len * 8;
    if value & ((1 << trailing) - 1) != 0 {
        return Err(invalid());
    }
    let id = u32::try_from(value >> trailing).map_err(|_| invalid())?;

    // A zero leading byte would have been stripped by the encoder.
    if id >> ((byte_len - 1) * 8) == 0 || !in_domain(id) {
        return Err(invalid());
    }
    Ok(id)
}

fn symbol_value(c: u8) -> Option<u8> {
    match c {
        b'a'..=b'z' => Some(c - b'a'),
        b'2'..=b'7' => Some(c - b'2' + 26),
        _ => None,
    }
}
