//! RTR wire format: the fixed 8-byte header plus the nine body layouts.
//!
//! Field names follow `bgpkit-parser`'s `models::rpki::rtr` types
//! (`RtrPduType`, `RtrErrorCode`, the per-PDU struct shapes); the header
//! layout and integer sizes are RFC 6810/8210 §5. All integers are
//! network byte order. This module only does wire encode/decode -- the
//! state machine driving it lives in [`super::server`].

use std::convert::TryFrom;
use std::net::{Ipv4Addr, Ipv6Addr};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rpki::repository::resources::AsId;
use crate::error::Error;
use crate::rtr::serial::Serial;

const HEADER_LEN: usize = 8;


//------------ Version -------------------------------------------------------

/// The two published RTR protocol versions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Version {
    V0 = 0,
    V1 = 1,
}

impl Version {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Version::V0),
            1 => Some(Version::V1),
            _ => None,
        }
    }
}


//------------ PduType --------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PduType {
    SerialNotify = 0,
    SerialQuery = 1,
    ResetQuery = 2,
    CacheResponse = 3,
    Ipv4Prefix = 4,
    Ipv6Prefix = 6,
    EndOfData = 7,
    CacheReset = 8,
    RouterKey = 9,
    ErrorReport = 10,
}

impl PduType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PduType::SerialNotify),
            1 => Some(PduType::SerialQuery),
            2 => Some(PduType::ResetQuery),
            3 => Some(PduType::CacheResponse),
            4 => Some(PduType::Ipv4Prefix),
            6 => Some(PduType::Ipv6Prefix),
            7 => Some(PduType::EndOfData),
            8 => Some(PduType::CacheReset),
            9 => Some(PduType::RouterKey),
            10 => Some(PduType::ErrorReport),
            _ => None,
        }
    }
}


//------------ ErrorCode ------------------------------------------------------

/// Error Report error codes, RFC 8210 §10.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    CorruptData = 0,
    InternalError = 1,
    NoDataAvailable = 2,
    InvalidRequest = 3,
    UnsupportedProtocolVersion = 4,
    UnsupportedPduType = 5,
    WithdrawalOfUnknownRecord = 6,
    DuplicateAnnouncement = 7,
    UnexpectedProtocolVersion = 8,
}

impl ErrorCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        use ErrorCode::*;
        match value {
            0 => Some(CorruptData),
            1 => Some(InternalError),
            2 => Some(NoDataAvailable),
            3 => Some(InvalidRequest),
            4 => Some(UnsupportedProtocolVersion),
            5 => Some(UnsupportedPduType),
            6 => Some(WithdrawalOfUnknownRecord),
            7 => Some(DuplicateAnnouncement),
            8 => Some(UnexpectedProtocolVersion),
            _ => None,
        }
    }

    /// Whether receiving this code requires closing the session.
    ///
    /// Only `No Data Available` is non-fatal; every other code per RFC
    /// 8210 §10 ends the session.
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorCode::NoDataAvailable)
    }
}


//------------ Header ---------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub version: u8,
    pub pdu_type: u8,
    pub session_id: u16,
    pub length: u32,
}

impl Header {
    fn parse(buf: &mut Bytes) -> Result<Self, Error> {
        if buf.remaining() < HEADER_LEN {
            return Err(Error::protocol("PDU shorter than header"));
        }
        let version = buf.get_u8();
        let pdu_type = buf.get_u8();
        let session_id = buf.get_u16();
        let length = buf.get_u32();
        Ok(Header { version, pdu_type, session_id, length })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.pdu_type);
        buf.put_u16(self.session_id);
        buf.put_u32(self.length);
    }
}


//------------ Pdu ------------------------------------------------------------

/// A decoded RTR protocol data unit, either direction.
#[derive(Clone, Debug)]
pub enum Pdu {
    SerialNotify { version: u8, session_id: u16, serial: Serial },
    SerialQuery { version: u8, session_id: u16, serial: Serial },
    ResetQuery { version: u8 },
    CacheResponse { version: u8, session_id: u16 },
    Ipv4Prefix { version: u8, flags: u8, prefix_len: u8, max_len: u8, prefix: Ipv4Addr, asn: AsId },
    Ipv6Prefix { version: u8, flags: u8, prefix_len: u8, max_len: u8, prefix: Ipv6Addr, asn: AsId },
    EndOfData {
        version: u8, session_id: u16, serial: Serial,
        refresh: Option<u32>, retry: Option<u32>, expire: Option<u32>,
    },
    CacheReset { version: u8 },
    RouterKey { version: u8, flags: u8, ski: [u8; 20], asn: AsId, spki: Bytes },
    ErrorReport { version: u8, error_code: ErrorCode, erroneous_pdu: Bytes, error_text: String },
}

impl Pdu {
    pub fn version(&self) -> u8 {
        match *self {
            Pdu::SerialNotify { version, .. }
            | Pdu::SerialQuery { version, .. }
            | Pdu::ResetQuery { version }
            | Pdu::CacheResponse { version, .. }
            | Pdu::Ipv4Prefix { version, .. }
            | Pdu::Ipv6Prefix { version, .. }
            | Pdu::EndOfData { version, .. }
            | Pdu::CacheReset { version }
            | Pdu::RouterKey { version, .. }
            | Pdu::ErrorReport { version, .. } => version,
        }
    }

    pub fn pdu_type(&self) -> PduType {
        match self {
            Pdu::SerialNotify { .. } => PduType::SerialNotify,
            Pdu::SerialQuery { .. } => PduType::SerialQuery,
            Pdu::ResetQuery { .. } => PduType::ResetQuery,
            Pdu::CacheResponse { .. } => PduType::CacheResponse,
            Pdu::Ipv4Prefix { .. } => PduType::Ipv4Prefix,
            Pdu::Ipv6Prefix { .. } => PduType::Ipv6Prefix,
            Pdu::EndOfData { .. } => PduType::EndOfData,
            Pdu::CacheReset { .. } => PduType::CacheReset,
            Pdu::RouterKey { .. } => PduType::RouterKey,
            Pdu::ErrorReport { .. } => PduType::ErrorReport,
        }
    }

    /// Decodes a single PDU from the front of `data`, advancing it past
    /// the PDU's declared length.
    pub fn read(data: &mut Bytes) -> Result<Self, Error> {
        if data.remaining() < HEADER_LEN {
            return Err(Error::protocol("short read"));
        }
        let mut peek = data.clone();
        let header = Header::parse(&mut peek)?;
        let total = header.length as usize;
        if total < HEADER_LEN || data.remaining() < total {
            return Err(Error::protocol("PDU length out of bounds"));
        }
        let mut body = data.split_to(total);
        body.advance(HEADER_LEN);

        let pdu_type = PduType::from_u8(header.pdu_type)
            .ok_or_else(|| Error::protocol("unknown PDU type"))?;

        Ok(match pdu_type {
            PduType::SerialNotify => Pdu::SerialNotify {
                version: header.version, session_id: header.session_id,
                serial: Serial::from_be(body.get_u32()),
            },
            PduType::SerialQuery => Pdu::SerialQuery {
                version: header.version, session_id: header.session_id,
                serial: Serial::from_be(body.get_u32()),
            },
            PduType::ResetQuery => Pdu::ResetQuery { version: header.version },
            PduType::CacheResponse => Pdu::CacheResponse {
                version: header.version, session_id: header.session_id,
            },
            PduType::Ipv4Prefix => {
                let flags = body.get_u8();
                let prefix_len = body.get_u8();
                let max_len = body.get_u8();
                body.get_u8();
                let prefix = Ipv4Addr::from(body.get_u32());
                let asn = AsId::from(body.get_u32());
                Pdu::Ipv4Prefix {
                    version: header.version, flags, prefix_len, max_len, prefix, asn,
                }
            }
            PduType::Ipv6Prefix => {
                let flags = body.get_u8();
                let prefix_len = body.get_u8();
                let max_len = body.get_u8();
                body.get_u8();
                let mut octets = [0u8; 16];
                body.copy_to_slice(&mut octets);
                let prefix = Ipv6Addr::from(octets);
                let asn = AsId::from(body.get_u32());
                Pdu::Ipv6Prefix {
                    version: header.version, flags, prefix_len, max_len, prefix, asn,
                }
            }
            PduType::EndOfData => {
                let serial = Serial::from_be(body.get_u32());
                let (refresh, retry, expire) = if header.version >= 1 && body.remaining() >= 12 {
                    (Some(body.get_u32()), Some(body.get_u32()), Some(body.get_u32()))
                } else {
                    (None, None, None)
                };
                Pdu::EndOfData {
                    version: header.version, session_id: header.session_id, serial,
                    refresh, retry, expire,
                }
            }
            PduType::CacheReset => Pdu::CacheReset { version: header.version },
            PduType::RouterKey => {
                let mut ski = [0u8; 20];
                body.copy_to_slice(&mut ski);
                let flags = body.get_u8();
                body.get_u8();
                let asn = AsId::from(body.get_u32());
                let spki = body.copy_to_bytes(body.remaining());
                Pdu::RouterKey {
                    version: header.version, flags, ski, asn, spki,
                }
            }
            PduType::ErrorReport => {
                let error_code = ErrorCode::from_u16(header.session_id)
                    .ok_or_else(|| Error::protocol("unknown error code"))?;
                let pdu_len = body.get_u32() as usize;
                if body.remaining() < pdu_len {
                    return Err(Error::protocol("truncated Error Report"));
                }
                let erroneous_pdu = body.copy_to_bytes(pdu_len);
                let text_len = body.get_u32() as usize;
                if body.remaining() < text_len {
                    return Err(Error::protocol("truncated Error Report text"));
                }
                let mut text_bytes = vec![0u8; text_len];
                body.copy_to_slice(&mut text_bytes);
                let error_text = String::from_utf8(text_bytes)
                    .map_err(|_| Error::protocol("Error Report text not UTF-8"))?;
                Pdu::ErrorReport { version: header.version, error_code, erroneous_pdu, error_text }
            }
        })
    }

    /// Encodes this PDU, header included.
    pub fn write(&self, buf: &mut BytesMut) {
        let start = buf.len();
        // placeholder header, patched with the real length below.
        Header { version: self.version(), pdu_type: self.pdu_type() as u8, session_id: 0, length: 0 }
            .write(buf);

        match self {
            Pdu::SerialNotify { serial, .. } | Pdu::SerialQuery { serial, .. } => {
                buf.put_u32(serial.to_be());
            }
            Pdu::ResetQuery { .. } | Pdu::CacheResponse { .. }
            | Pdu::CacheReset { .. } => {}
            Pdu::Ipv4Prefix { flags, prefix_len, max_len, prefix, asn, .. } => {
                buf.put_u8(*flags);
                buf.put_u8(*prefix_len);
                buf.put_u8(*max_len);
                buf.put_u8(0);
                buf.put_u32((*prefix).into());
                buf.put_u32(u32::from(*asn));
            }
            Pdu::Ipv6Prefix { flags, prefix_len, max_len, prefix, asn, .. } => {
                buf.put_u8(*flags);
                buf.put_u8(*prefix_len);
                buf.put_u8(*max_len);
                buf.put_u8(0);
                buf.put_slice(&prefix.octets());
                buf.put_u32(u32::from(*asn));
            }
            Pdu::EndOfData { serial, refresh, retry, expire, .. } => {
                buf.put_u32(serial.to_be());
                if let (Some(r), Some(rt), Some(e)) = (refresh, retry, expire) {
                    buf.put_u32(*r);
                    buf.put_u32(*rt);
                    buf.put_u32(*e);
                }
            }
            Pdu::RouterKey { ski, flags, asn, spki, .. } => {
                buf.put_slice(ski);
                buf.put_u8(*flags);
                buf.put_u8(0);
                buf.put_u32(u32::from(*asn));
                buf.put_slice(spki);
            }
            Pdu::ErrorReport { erroneous_pdu, error_text, .. } => {
                buf.put_u32(erroneous_pdu.len() as u32);
                buf.put_slice(erroneous_pdu);
                buf.put_u32(error_text.len() as u32);
                buf.put_slice(error_text.as_bytes());
            }
        }

        let len = (buf.len() - start) as u32;
        let session_id = match self {
            Pdu::SerialNotify { session_id, .. }
            | Pdu::SerialQuery { session_id, .. }
            | Pdu::CacheResponse { session_id, .. }
            | Pdu::EndOfData { session_id, .. } => *session_id,
            Pdu::ErrorReport { error_code, .. } => *error_code as u16,
            _ => 0,
        };
        buf[start + 2..start + 4].copy_from_slice(&session_id.to_be_bytes());
        buf[start + 4..start + 8].copy_from_slice(&len.to_be_bytes());
    }
}

impl TryFrom<u8> for Version {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Version::from_u8(value).ok_or(())
    }
}


//============ Testing =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(pdu: Pdu) -> Pdu {
        let mut buf = BytesMut::new();
        pdu.write(&mut buf);
        let mut data = buf.freeze();
        Pdu::read(&mut data).unwrap()
    }

    #[test]
    fn serial_query_roundtrips() {
        let pdu = Pdu::SerialQuery { version: 1, session_id: 42, serial: Serial::from(7) };
        match roundtrip(pdu) {
            Pdu::SerialQuery { version, session_id, serial } => {
                assert_eq!(version, 1);
                assert_eq!(session_id, 42);
                assert_eq!(serial, Serial::from(7));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn ipv4_prefix_roundtrips() {
        let pdu = Pdu::Ipv4Prefix {
            version: 1, flags: 1, prefix_len: 24, max_len: 24,
            prefix: Ipv4Addr::new(192, 0, 2, 0), asn: AsId::from(65001),
        };
        match roundtrip(pdu) {
            Pdu::Ipv4Prefix { prefix, asn, flags, .. } => {
                assert_eq!(prefix, Ipv4Addr::new(192, 0, 2, 0));
                assert_eq!(asn, AsId::from(65001));
                assert_eq!(flags, 1);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn end_of_data_v1_carries_intervals() {
        let pdu = Pdu::EndOfData {
            version: 1, session_id: 1, serial: Serial::from(3),
            refresh: Some(3600), retry: Some(600), expire: Some(7200),
        };
        match roundtrip(pdu) {
            Pdu::EndOfData { refresh, retry, expire, .. } => {
                assert_eq!(refresh, Some(3600));
                assert_eq!(retry, Some(600));
                assert_eq!(expire, Some(7200));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn error_report_roundtrips() {
        let pdu = Pdu::ErrorReport {
            version: 1, error_code: ErrorCode::InvalidRequest,
            erroneous_pdu: Bytes::new(), error_text: "bad request".into(),
        };
        match roundtrip(pdu) {
            Pdu::ErrorReport { error_code, error_text, .. } => {
                assert_eq!(error_code, ErrorCode::InvalidRequest);
                assert_eq!(error_text, "bad request");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn fatal_classification_matches_rfc8210() {
        assert!(!ErrorCode::NoDataAvailable.is_fatal());
        assert!(ErrorCode::CorruptData.is_fatal());
        assert!(ErrorCode::UnsupportedPduType.is_fatal());
    }
}
