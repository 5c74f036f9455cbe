//! BER decoding.

use bytes::Bytes;

use super::length::decode_length;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// Cursor-based BER decoder over a shared [`Bytes`] buffer.
///
/// `read_sequence` returns a new `Decoder` scoped to the sequence's content
/// octets, so nested structures are decoded by recursing into sub-decoders
/// rather than tracking an explicit end offset.
pub struct Decoder {
    data: Bytes,
    pos: usize,
}

impl Decoder {
    /// Create a decoder over the given bytes.
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// True if there is no more data to read.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Number of bytes not yet consumed.
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Read one TLV, returning its tag and content bytes, and advance past it.
    pub(crate) fn read_tlv(&mut self) -> Result<(u8, Bytes)> {
        let base = self.pos;
        let tag = *self
            .remaining()
            .first()
            .ok_or_else(|| Error::decode(base, DecodeErrorKind::TruncatedData))?;
        let (len, len_size) = decode_length(&self.remaining()[1..], base + 1)?;
        let header = 1 + len_size;
        let content_start = base + header;
        let content_end = content_start
            .checked_add(len)
            .ok_or_else(|| Error::decode(base, DecodeErrorKind::InvalidLength))?;
        if content_end > self.data.len() {
            return Err(Error::decode(base, DecodeErrorKind::TruncatedData));
        }
        let content = self.data.slice(content_start..content_end);
        self.pos = content_end;
        Ok((tag, content))
    }

    /// Peek the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<u8> {
        self.remaining()
            .first()
            .copied()
            .ok_or_else(|| Error::decode(self.pos, DecodeErrorKind::TruncatedData))
    }

    /// Read a TLV, requiring it to carry the given tag.
    pub(crate) fn expect_tag(&mut self, expected: u8) -> Result<Bytes> {
        let base = self.pos;
        let (tag, content) = self.read_tlv()?;
        if tag != expected {
            return Err(Error::decode(
                base,
                DecodeErrorKind::UnexpectedTag {
                    expected,
                    actual: tag,
                },
            ));
        }
        Ok(content)
    }

    /// Read a SEQUENCE, returning a sub-decoder over its content.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        let content = self.expect_tag(tag::universal::SEQUENCE)?;
        Ok(Decoder::new(content))
    }

    /// Read any constructed value by tag, returning a sub-decoder over its
    /// content (used for PDU bodies, which use context-specific
    /// application tags rather than the universal SEQUENCE tag).
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let content = self.expect_tag(expected_tag)?;
        Ok(Decoder::new(content))
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        let content = self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        Oid::from_ber(&content)
    }

    /// Read a signed 32-bit INTEGER.
    pub fn read_integer(&mut self) -> Result<i32> {
        let base = self.pos;
        let content = self.expect_tag(tag::universal::INTEGER)?;
        decode_signed(&content, base)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let base = self.pos;
        let (t, content) = self.read_tlv()?;
        match t {
            tag::universal::OCTET_STRING => Ok(content),
            tag::universal::OCTET_STRING_CONSTRUCTED => {
                Err(Error::decode(base, DecodeErrorKind::ConstructedOctetString))
            }
            other => Err(Error::decode(
                base,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::OCTET_STRING,
                    actual: other,
                },
            )),
        }
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<()> {
        let base = self.pos;
        let content = self.expect_tag(tag::universal::NULL)?;
        if !content.is_empty() {
            return Err(Error::decode(base, DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an IpAddress (APPLICATION 0).
    pub fn read_ip_address(&mut self) -> Result<[u8; 4]> {
        let base = self.pos;
        let content = self.expect_tag(tag::application::IP_ADDRESS)?;
        if content.len() != 4 {
            return Err(Error::decode(
                base,
                DecodeErrorKind::InvalidIpAddressLength {
                    length: content.len(),
                },
            ));
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&content);
        Ok(out)
    }

    /// Read an unsigned value tagged `expected` (Counter32/Gauge32/TimeTicks).
    pub fn read_unsigned32(&mut self, expected: u8) -> Result<u32> {
        let base = self.pos;
        let content = self.expect_tag(expected)?;
        decode_unsigned(&content, base, u32::MAX as u64).map(|v| v as u32)
    }

    /// Read an unsigned 64-bit value (Counter64).
    pub fn read_integer64(&mut self) -> Result<u64> {
        let base = self.pos;
        let content = self.expect_tag(tag::application::COUNTER64)?;
        decode_unsigned(&content, base, u64::MAX)
    }
}

/// Decode a signed INTEGER's content octets directly (no tag check).
///
/// Exposed for [`crate::value::Value::decode`], which has already peeked
/// and consumed the tag itself to dispatch on it.
pub(crate) fn decode_signed(bytes: &[u8], offset: usize) -> Result<i32> {
    if bytes.is_empty() {
        return Err(Error::decode(offset, DecodeErrorKind::ZeroLengthInteger));
    }
    if bytes.len() > 8 {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | i64::from(b);
    }
    if value > i64::from(i32::MAX) || value < i64::from(i32::MIN) {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    Ok(value as i32)
}

/// Decode an unsigned integer's content octets directly (no tag check).
pub(crate) fn decode_unsigned(bytes: &[u8], offset: usize, max: u64) -> Result<u64> {
    if bytes.is_empty() {
        return Err(Error::decode(offset, DecodeErrorKind::ZeroLengthInteger));
    }
    if bytes.len() > 9 {
        return Err(Error::decode(
            offset,
            DecodeErrorKind::Integer64TooLong { length: bytes.len() },
        ));
    }
    let mut value: u64 = 0;
    for &b in bytes {
        value = (value << 8) | u64::from(b);
    }
    if value > max {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::encode::EncodeBuf;

    #[test]
    fn decode_integer_roundtrip() {
        for value in [0, 1, -1, 127, 128, -128, -129, i32::MAX, i32::MIN] {
            let mut buf = EncodeBuf::new();
            buf.push_integer(value);
            let bytes = buf.finish();
            let mut d = Decoder::new(bytes);
            assert_eq!(d.read_integer().unwrap(), value);
        }
    }

    #[test]
    fn decode_octet_string() {
        let mut buf = EncodeBuf::new();
        buf.push_octet_string(b"hello");
        let bytes = buf.finish();
        let mut d = Decoder::new(bytes);
        assert_eq!(&d.read_octet_string().unwrap()[..], b"hello");
    }

    #[test]
    fn decode_null() {
        let mut buf = EncodeBuf::new();
        buf.push_null();
        let bytes = buf.finish();
        let mut d = Decoder::new(bytes);
        d.read_null().unwrap();
    }

    #[test]
    fn decode_ip_address() {
        let mut buf = EncodeBuf::new();
        buf.push_ip_address([10, 0, 0, 1]);
        let bytes = buf.finish();
        let mut d = Decoder::new(bytes);
        assert_eq!(d.read_ip_address().unwrap(), [10, 0, 0, 1]);
    }

    #[test]
    fn decode_rejects_wrong_tag() {
        let mut buf = EncodeBuf::new();
        buf.push_null();
        let bytes = buf.finish();
        let mut d = Decoder::new(bytes);
        assert!(d.read_integer().is_err());
    }

    #[test]
    fn decode_counter64() {
        let mut buf = EncodeBuf::new();
        buf.push_integer64(u64::MAX);
        let bytes = buf.finish();
        let mut d = Decoder::new(bytes);
        assert_eq!(d.read_integer64().unwrap(), u64::MAX);
    }

    #[test]
    fn decode_sequence_scoping() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|b| {
            b.push_integer(2);
            b.push_integer(1);
        });
        let bytes = buf.finish();
        let mut d = Decoder::new(bytes);
        let mut seq = d.read_sequence().unwrap();
        assert_eq!(seq.read_integer().unwrap(), 1);
        assert_eq!(seq.read_integer().unwrap(), 2);
        assert!(seq.is_empty());
        assert!(d.is_empty());
    }
}
