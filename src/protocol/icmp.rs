//! ICMP and ICMPv6 header parser.
//!
//! Both share the same 4-byte prefix; everything after it is kept as payload.
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |     Type      |     Code      |          Checksum             |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                     Rest (type specific)                      |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

use super::ParseError;
use serde::Serialize;
use std::fmt;

pub const ICMP_HEADER_LEN: usize = 4;

/// The ICMP messages the detectors care about, across both versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoReply,
    EchoRequest,
    DestinationUnreachable,
    TimeExceeded,
    Redirect,
    Other,
}

impl IcmpKind {
    pub fn classify(icmp_type: u8, is_v6: bool) -> Self {
        if is_v6 {
            match icmp_type {
                1 => IcmpKind::DestinationUnreachable,
                3 => IcmpKind::TimeExceeded,
                128 => IcmpKind::EchoRequest,
                129 => IcmpKind::EchoReply,
                137 => IcmpKind::Redirect,
                _ => IcmpKind::Other,
            }
        } else {
            match icmp_type {
                0 => IcmpKind::EchoReply,
                3 => IcmpKind::DestinationUnreachable,
                5 => IcmpKind::Redirect,
                8 => IcmpKind::EchoRequest,
                11 => IcmpKind::TimeExceeded,
                _ => IcmpKind::Other,
            }
        }
    }
}

impl fmt::Display for IcmpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcmpKind::EchoReply => write!(f, "Echo Reply"),
            IcmpKind::EchoRequest => write!(f, "Echo Request"),
            IcmpKind::DestinationUnreachable => write!(f, "Destination Unreachable"),
            IcmpKind::TimeExceeded => write!(f, "Time Exceeded"),
            IcmpKind::Redirect => write!(f, "Redirect"),
            IcmpKind::Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug)]
pub struct IcmpHeader<'a> {
    data: &'a [u8],
}

impl<'a> IcmpHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: ICMP_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(IcmpHeader { data })
    }

    #[inline]
    pub fn icmp_type(&self) -> u8 {
        self.data[0]
    }

    #[inline]
    pub fn code(&self) -> u8 {
        self.data[1]
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ICMP_HEADER_LEN..]
    }

    pub fn to_layer(&self, is_v6: bool) -> IcmpLayer {
        IcmpLayer {
            icmp_type: self.icmp_type(),
            code: self.code(),
            checksum: self.checksum(),
            is_v6,
            payload_len: self.payload().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IcmpLayer {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub is_v6: bool,
    pub payload_len: usize,
}

impl IcmpLayer {
    pub fn kind(&self) -> IcmpKind {
        IcmpKind::classify(self.icmp_type, self.is_v6)
    }
}

impl fmt::Display for IcmpLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = if self.is_v6 { "ICMPv6" } else { "ICMP" };
        match self.kind() {
            IcmpKind::Other => write!(f, "{} type={} code={}", version, self.icmp_type, self.code),
            kind => write!(f, "{} {} code={}", version, kind, self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_echo_request() {
        let pkt = [8u8, 0, 0xf7, 0xff, 0x00, 0x01, 0x00, 0x0A];
        let layer = IcmpHeader::parse(&pkt).unwrap().to_layer(false);
        assert_eq!(layer.kind(), IcmpKind::EchoRequest);
        assert_eq!(layer.code, 0);
        assert_eq!(layer.checksum, 0xf7ff);
        assert_eq!(layer.payload_len, 4);
    }

    #[test]
    fn v6_types_map_to_the_same_kinds() {
        assert_eq!(IcmpKind::classify(1, true), IcmpKind::DestinationUnreachable);
        assert_eq!(IcmpKind::classify(3, true), IcmpKind::TimeExceeded);
        assert_eq!(IcmpKind::classify(3, false), IcmpKind::DestinationUnreachable);
        assert_eq!(IcmpKind::classify(11, false), IcmpKind::TimeExceeded);
        assert_eq!(IcmpKind::classify(11, true), IcmpKind::Other);
    }

    #[test]
    fn four_bytes_is_enough() {
        let layer = IcmpHeader::parse(&[11, 0, 0, 0]).unwrap().to_layer(false);
        assert_eq!(layer.payload_len, 0);
        assert_eq!(layer.to_string(), "ICMP Time Exceeded code=0");
    }

    #[test]
    fn reject_short_icmp() {
        assert!(IcmpHeader::parse(&[3u8, 0, 0]).is_err());
    }
}
