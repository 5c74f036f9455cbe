//! BER length octet encoding/decoding (X.690 §8.1.3).

use crate::error::{DecodeErrorKind, Error, Result};

/// Encode a BER length into its reversed-for-prepending form.
///
/// Returns a fixed-size array holding the bytes in the order
/// [`EncodeBuf`](super::encode::EncodeBuf) expects to push them (i.e.
/// reversed relative to the forward wire order, since the buffer is
/// globally reversed once at `finish()`), and the number of valid bytes
/// at the front of the array.
///
/// Short form (length < 128) is a single byte. Long form is `0x80 | n`
/// followed by `n` big-endian length octets; only definite-length
/// encoding is produced (indefinite length is never used by this codec).
pub fn encode_length(len: usize) -> ([u8; 5], usize) {
    if len < 0x80 {
        return ([len as u8, 0, 0, 0, 0], 1);
    }
    let full = (len as u64).to_be_bytes();
    let first_significant = full.iter().position(|&b| b != 0).unwrap_or(7);
    let octets = &full[first_significant..];
    let n = octets.len();
    let mut out = [0u8; 5];
    // Reversed: least-significant length byte first, then up to the
    // most-significant, then the `0x80 | n` leading byte last.
    for (i, &b) in octets.iter().rev().enumerate() {
        out[i] = b;
    }
    out[n] = 0x80 | (n as u8);
    (out, n + 1)
}

/// Decode a BER length field starting at `data[0]`.
///
/// Returns the decoded length and the number of octets consumed from
/// `data` (including the initial length-of-length byte in the long form).
pub fn decode_length(data: &[u8], offset: usize) -> Result<(usize, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| Error::decode(offset, DecodeErrorKind::TruncatedData))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let n = (first & 0x7F) as usize;
    if n == 0 {
        return Err(Error::decode(offset, DecodeErrorKind::IndefiniteLength));
    }
    if n > std::mem::size_of::<usize>() {
        return Err(Error::decode(offset, DecodeErrorKind::LengthTooLong { octets: n }));
    }
    let octets = data
        .get(1..1 + n)
        .ok_or_else(|| Error::decode(offset, DecodeErrorKind::TruncatedData))?;
    let mut value: usize = 0;
    for &b in octets {
        value = (value << 8) | b as usize;
    }
    Ok((value, 1 + n))
}
