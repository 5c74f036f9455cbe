//! SNMP value types.

use bytes::Bytes;

use crate::ber::{tag, Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use crate::version::Version;

/// Opaque identifier for a dynamically-computed value.
///
/// Looked up in a per-store registry at read time, so a single OID entry
/// can expose a value derived from live state (e.g. uptime, a counter)
/// rather than a fixed stored value.
pub type ProducerId = u32;

/// An SNMP variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// INTEGER.
    Integer(i32),
    /// OCTET STRING.
    OctetString(Bytes),
    /// NULL.
    Null,
    /// OBJECT IDENTIFIER.
    ObjectIdentifier(Oid),
    /// IpAddress (APPLICATION 0).
    IpAddress([u8; 4]),
    /// Counter32 (APPLICATION 1): wraps at 2^32, monotonic.
    Counter32(u32),
    /// Gauge32 / Unsigned32 (APPLICATION 2): bounded, may go up or down.
    Gauge32(u32),
    /// TimeTicks (APPLICATION 3): hundredths of a second since some epoch.
    TimeTicks(u32),
    /// Opaque (APPLICATION 4): arbitrary encoding wrapped for transparency.
    Opaque(Bytes),
    /// Counter64 (APPLICATION 6): wraps at 2^64, v2c+ only.
    Counter64(u64),
    /// noSuchObject exception value.
    NoSuchObject,
    /// noSuchInstance exception value.
    NoSuchInstance,
    /// endOfMibView exception value.
    EndOfMibView,
    /// A value computed at read time rather than stored.
    ///
    /// Never appears on the wire; resolved to a concrete `Value` by the
    /// store before a response is built.
    Dynamic(ProducerId),
}

impl Value {
    /// True if this is one of the three SNMPv2 exception values.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// True if this value requires SNMPv2c or later to encode.
    ///
    /// `Counter64` and the three exception values don't exist in the
    /// SNMPv1 PDU grammar (RFC 1157); an agent must coerce or reject them
    /// when replying to a v1 request.
    pub fn requires_v2c(&self) -> bool {
        matches!(
            self,
            Self::Counter64(_) | Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// Coerce a value for encoding under the given protocol version.
    ///
    /// SNMPv1 has no Counter64 and no exception values; noSuchObject and
    /// noSuchInstance fold into a noSuchName error on the agent side
    /// before a varbind is ever built this way, but a bare Counter64
    /// stored under a v1-served OID is downgraded to its low 32 bits
    /// rather than refused outright, matching common agent behavior.
    pub fn type_coerce(self, version: Version) -> Self {
        match (version, self) {
            (Version::V1, Self::Counter64(v)) => Self::Gauge32(v as u32),
            (_, other) => other,
        }
    }

    /// Encode this value's TLV.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Self::Integer(v) => buf.push_integer(*v),
            Self::OctetString(bytes) => buf.push_octet_string(bytes),
            Self::Null => buf.push_null(),
            Self::ObjectIdentifier(oid) => buf.push_oid(oid),
            Self::IpAddress(addr) => buf.push_ip_address(*addr),
            Self::Counter32(v) => buf.push_unsigned32(tag::application::COUNTER32, *v),
            Self::Gauge32(v) => buf.push_unsigned32(tag::application::GAUGE32, *v),
            Self::TimeTicks(v) => buf.push_unsigned32(tag::application::TIMETICKS, *v),
            Self::Opaque(bytes) => {
                buf.push_bytes(bytes);
                buf.push_length(bytes.len());
                buf.push_tag(tag::application::OPAQUE);
            }
            Self::Counter64(v) => buf.push_integer64(*v),
            Self::NoSuchObject => {
                buf.push_length(0);
                buf.push_tag(tag::context::NO_SUCH_OBJECT);
            }
            Self::NoSuchInstance => {
                buf.push_length(0);
                buf.push_tag(tag::context::NO_SUCH_INSTANCE);
            }
            Self::EndOfMibView => {
                buf.push_length(0);
                buf.push_tag(tag::context::END_OF_MIB_VIEW);
            }
            Self::Dynamic(_) => {
                // Resolved by the store before this point is ever reached;
                // encoding one directly is a programming error upstream.
                buf.push_null();
            }
        }
    }

    /// Decode a value from the next TLV.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let (t, content) = decoder.read_tlv()?;
        match t {
            tag::universal::INTEGER => Ok(Self::Integer(crate::ber::decode_signed(&content, 0)?)),
            tag::universal::OCTET_STRING => Ok(Self::OctetString(content)),
            tag::universal::OCTET_STRING_CONSTRUCTED => {
                Err(Error::decode(0, DecodeErrorKind::ConstructedOctetString))
            }
            tag::universal::NULL => {
                if !content.is_empty() {
                    return Err(Error::decode(0, DecodeErrorKind::InvalidNull));
                }
                Ok(Self::Null)
            }
            tag::universal::OBJECT_IDENTIFIER => Ok(Self::ObjectIdentifier(Oid::from_ber(
                &content,
            )?)),
            tag::application::IP_ADDRESS => {
                if content.len() != 4 {
                    return Err(Error::decode(
                        0,
                        DecodeErrorKind::InvalidIpAddressLength {
                            length: content.len(),
                        },
                    ));
                }
                let mut addr = [0u8; 4];
                addr.copy_from_slice(&content);
                Ok(Self::IpAddress(addr))
            }
            tag::application::COUNTER32 => Ok(Self::Counter32(
                crate::ber::decode_unsigned(&content, 0, u32::MAX as u64)? as u32,
            )),
            tag::application::GAUGE32 => Ok(Self::Gauge32(
                crate::ber::decode_unsigned(&content, 0, u32::MAX as u64)? as u32,
            )),
            tag::application::TIMETICKS => Ok(Self::TimeTicks(
                crate::ber::decode_unsigned(&content, 0, u32::MAX as u64)? as u32,
            )),
            tag::application::OPAQUE => Ok(Self::Opaque(content)),
            tag::application::COUNTER64 => Ok(Self::Counter64(crate::ber::decode_unsigned(
                &content,
                0,
                u64::MAX,
            )?)),
            tag::context::NO_SUCH_OBJECT => Ok(Self::NoSuchObject),
            tag::context::NO_SUCH_INSTANCE => Ok(Self::NoSuchInstance),
            tag::context::END_OF_MIB_VIEW => Ok(Self::EndOfMibView),
            other => Err(Error::decode(
                0,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::INTEGER,
                    actual: other,
                },
            )),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "INTEGER: {}", v),
            Self::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) if s.chars().all(|c| !c.is_control() || c == '\t') => {
                    write!(f, "STRING: \"{}\"", s)
                }
                _ => write!(f, "Hex-STRING: {}", crate::util::HexBytes(bytes)),
            },
            Self::Null => write!(f, "NULL"),
            Self::ObjectIdentifier(oid) => write!(f, "OID: {}", oid),
            Self::IpAddress(addr) => {
                write!(f, "IpAddress: {}.{}.{}.{}", addr[0], addr[1], addr[2], addr[3])
            }
            Self::Counter32(v) => write!(f, "Counter32: {}", v),
            Self::Gauge32(v) => write!(f, "Gauge32: {}", v),
            Self::TimeTicks(v) => write!(f, "Timeticks: ({}) {}", v, format_timeticks(*v)),
            Self::Opaque(bytes) => write!(f, "Opaque: {}", crate::util::HexBytes(bytes)),
            Self::Counter64(v) => write!(f, "Counter64: {}", v),
            Self::NoSuchObject => write!(f, "noSuchObject"),
            Self::NoSuchInstance => write!(f, "noSuchInstance"),
            Self::EndOfMibView => write!(f, "endOfMibView"),
            Self::Dynamic(id) => write!(f, "Dynamic({})", id),
        }
    }
}

fn format_timeticks(ticks: u32) -> String {
    let total_seconds = ticks / 100;
    let hundredths = ticks % 100;
    let days = total_seconds / 86400;
    let hours = (total_seconds % 86400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!(
        "{}:{:02}:{:02}:{:02}.{:02}",
        days, hours, minutes, seconds, hundredths
    )
}
