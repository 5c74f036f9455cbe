//! The outermost SNMP message envelope: version, community, and PDU.

use bytes::Bytes;

use crate::ber::{tag, Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::version::Version;

/// A full SNMPv1/v2c datagram: `SEQUENCE { version, community, pdu }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub version: Version,
    pub community: Bytes,
    pub pdu: Pdu,
}

impl Message {
    pub fn new(version: Version, community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            version,
            community: community.into(),
            pdu,
        }
    }

    /// Encode the full datagram, ready to hand to a transport.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });
        buf.finish()
    }

    /// Decode a full datagram from raw bytes.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;
        let raw_version = seq.read_integer()?;
        let version = Version::from_i32(raw_version)
            .ok_or_else(|| Error::decode(0, DecodeErrorKind::UnknownVersion(raw_version)))?;
        let community = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;
        Ok(Self {
            version,
            community,
            pdu,
        })
    }

    /// Peek just the request-id out of a raw datagram, without fully
    /// decoding the varbind list. Used by the shared transport to demux
    /// incoming packets against pending requests.
    pub fn peek_request_id(data: &[u8]) -> Result<i32> {
        let mut decoder = Decoder::new(Bytes::copy_from_slice(data));
        let mut seq = decoder.read_sequence()?;
        let _version = seq.read_integer()?;
        let _community = seq.read_octet_string()?;
        let base = seq.peek_tag()?;
        let pdu_type = crate::pdu::PduType::from_tag(base)
            .ok_or_else(|| Error::decode(0, DecodeErrorKind::UnknownPduType(base)))?;
        let mut body = seq.read_constructed(pdu_type.tag())?;
        body.read_integer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::value::Value;
    use crate::varbind::VarBind;

    #[test]
    fn message_roundtrip() {
        let pdu = Pdu::get_request(42, &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);
        let msg = Message::new(Version::V2c, Bytes::from_static(b"public"), pdu);
        let bytes = msg.encode();
        let decoded = Message::decode(bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn peek_request_id_matches_full_decode() {
        let pdu = Pdu::response(
            7,
            vec![VarBind::new(oid!(1, 3, 6, 1), Value::Integer(1))],
        );
        let msg = Message::new(Version::V1, Bytes::from_static(b"public"), pdu);
        let bytes = msg.encode();
        assert_eq!(Message::peek_request_id(&bytes).unwrap(), 7);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(b"public");
            buf.push_integer(9);
        });
        let bytes = buf.finish();
        assert!(Message::decode(bytes).is_err());
    }
}
