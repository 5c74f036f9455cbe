//! SNMP protocol data units.

use crate::ber::{tag, Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::varbind::{decode_varbind_list, encode_null_varbinds, encode_varbind_list, VarBind};

/// The operation a PDU carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    Response,
    SetRequest,
    GetBulkRequest,
}

impl PduType {
    /// BER application tag for this PDU type.
    pub const fn tag(self) -> u8 {
        match self {
            Self::GetRequest => tag::pdu::GET_REQUEST,
            Self::GetNextRequest => tag::pdu::GET_NEXT_REQUEST,
            Self::Response => tag::pdu::RESPONSE,
            Self::SetRequest => tag::pdu::SET_REQUEST,
            Self::GetBulkRequest => tag::pdu::GET_BULK_REQUEST,
        }
    }

    /// Decode a PDU type from its BER application tag.
    pub fn from_tag(t: u8) -> Option<Self> {
        match t {
            tag::pdu::GET_REQUEST => Some(Self::GetRequest),
            tag::pdu::GET_NEXT_REQUEST => Some(Self::GetNextRequest),
            tag::pdu::RESPONSE => Some(Self::Response),
            tag::pdu::SET_REQUEST => Some(Self::SetRequest),
            tag::pdu::GET_BULK_REQUEST => Some(Self::GetBulkRequest),
            _ => None,
        }
    }
}

/// A protocol data unit.
///
/// The third and fourth integer fields are reused across PDU types exactly
/// as the wire format does: for `Response` they hold `error_status` and
/// `error_index`; for `GetBulkRequest` they hold `non_repeaters` and
/// `max_repetitions`. Accessors are named for both readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Build a GET request for the given OIDs (NULL-valued varbinds).
    pub fn get_request(request_id: i32, oids: &[crate::oid::Oid]) -> Self {
        Self {
            pdu_type: PduType::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().cloned().map(VarBind::null).collect(),
        }
    }

    /// Build a GETNEXT request for the given OIDs.
    pub fn get_next_request(request_id: i32, oids: &[crate::oid::Oid]) -> Self {
        Self {
            pdu_type: PduType::GetNextRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().cloned().map(VarBind::null).collect(),
        }
    }

    /// Build a GETBULK request.
    pub fn get_bulk_request(
        request_id: i32,
        non_repeaters: i32,
        max_repetitions: i32,
        oids: &[crate::oid::Oid],
    ) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: non_repeaters,
            error_index: max_repetitions,
            varbinds: oids.iter().cloned().map(VarBind::null).collect(),
        }
    }

    /// Build a SET request.
    pub fn set_request(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::SetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Build a success Response echoing the given varbinds.
    pub fn response(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Build an error Response.
    pub fn error_response(
        request_id: i32,
        error_status: crate::error::ErrorStatus,
        error_index: i32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status: error_status.as_i32(),
            error_index,
            varbinds,
        }
    }

    /// `non_repeaters`, valid for `GetBulkRequest`.
    pub fn non_repeaters(&self) -> i32 {
        self.error_status
    }

    /// `max_repetitions`, valid for `GetBulkRequest`.
    pub fn max_repetitions(&self) -> i32 {
        self.error_index
    }

    /// `error_status` as a typed [`ErrorStatus`](crate::error::ErrorStatus), valid for `Response`.
    pub fn status(&self) -> crate::error::ErrorStatus {
        crate::error::ErrorStatus::from_i32(self.error_status)
    }

    /// Encode the PDU body (not including the enclosing Message SEQUENCE).
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            match self.pdu_type {
                PduType::GetRequest | PduType::GetNextRequest => {
                    let oids: Vec<_> = self.varbinds.iter().map(|vb| vb.oid.clone()).collect();
                    encode_null_varbinds(buf, &oids);
                }
                _ => encode_varbind_list(buf, &self.varbinds),
            }
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    /// Decode a PDU from the Message's remaining content.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let base = decoder.peek_tag()?;
        let pdu_type = PduType::from_tag(base)
            .ok_or_else(|| Error::decode(0, DecodeErrorKind::UnknownPduType(base)))?;
        let mut body = decoder.read_constructed(pdu_type.tag())?;
        let request_id = body.read_integer()?;
        let error_status = body.read_integer()?;
        let error_index = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;
        if pdu_type == PduType::Response && error_index < 0 {
            return Err(Error::decode(
                0,
                DecodeErrorKind::NegativeErrorIndex { value: error_index },
            ));
        }
        if pdu_type == PduType::GetBulkRequest {
            if error_status < 0 {
                return Err(Error::decode(
                    0,
                    DecodeErrorKind::NegativeNonRepeaters { value: error_status },
                ));
            }
            if error_index < 0 {
                return Err(Error::decode(
                    0,
                    DecodeErrorKind::NegativeMaxRepetitions { value: error_index },
                ));
            }
        }
        Ok(Self {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::value::Value;

    #[test]
    fn get_request_roundtrip() {
        let pdu = Pdu::get_request(7, &[oid!(1, 3, 6, 1), oid!(1, 3, 6, 2)]);
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert_eq!(decoded, pdu);
        assert_eq!(decoded.pdu_type, PduType::GetRequest);
    }

    #[test]
    fn get_bulk_roundtrip_preserves_repeater_fields() {
        let pdu = Pdu::get_bulk_request(9, 1, 10, &[oid!(1, 3, 6, 1)]);
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert_eq!(decoded.non_repeaters(), 1);
        assert_eq!(decoded.max_repetitions(), 10);
    }

    #[test]
    fn error_response_roundtrip() {
        let pdu = Pdu::error_response(
            3,
            crate::error::ErrorStatus::NoSuchName,
            2,
            vec![VarBind::new(oid!(1, 3, 6, 1), Value::Null)],
        );
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert_eq!(decoded.status(), crate::error::ErrorStatus::NoSuchName);
        assert_eq!(decoded.error_index, 2);
    }

    #[test]
    fn set_request_roundtrip() {
        let pdu = Pdu::set_request(
            5,
            vec![VarBind::new(oid!(1, 3, 6, 1, 4, 1), Value::Integer(99))],
        );
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert_eq!(decoded, pdu);
    }
}
