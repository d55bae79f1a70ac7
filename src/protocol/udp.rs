//! Zero-copy UDP header parser.
//!
//! UDP header layout (8 bytes, fixed):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |          Source Port          |       Destination Port        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |            Length             |           Checksum            |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

use super::ParseError;
use serde::Serialize;
use std::fmt;

pub const UDP_HEADER_LEN: usize = 8;

#[derive(Debug)]
pub struct UdpHeader<'a> {
    data: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < UDP_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: UDP_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(UdpHeader { data })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Datagram length (header + payload) as declared on the wire.
    #[inline]
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.data[6], self.data[7]])
    }

    /// Payload clamped to the declared length and to the captured bytes.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let declared_len = self.length() as usize;
        let payload_len = declared_len.saturating_sub(UDP_HEADER_LEN);
        let available = self.data.len() - UDP_HEADER_LEN;
        let end = UDP_HEADER_LEN + payload_len.min(available);
        &self.data[UDP_HEADER_LEN..end]
    }

    pub fn to_layer(&self, base: usize) -> UdpLayer {
        UdpLayer {
            src_port: self.src_port(),
            dst_port: self.dst_port(),
            length: self.length(),
            checksum: self.checksum(),
            payload_offset: base + UDP_HEADER_LEN,
            payload_len: self.payload().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
    #[serde(skip)]
    pub payload_offset: usize,
    pub payload_len: usize,
}

impl<'a> fmt::Display for UdpHeader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ":{} -> :{} len={}",
            self.src_port(),
            self.dst_port(),
            self.length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_udp() {
        let mut pkt = vec![0x00, 0x35, 0xC0, 0x00, 0x00, 0x1C, 0x00, 0x00];
        pkt.extend_from_slice(&[0xAB; 20]);

        let hdr = UdpHeader::parse(&pkt).unwrap();
        assert_eq!(hdr.src_port(), 53);
        assert_eq!(hdr.dst_port(), 49152);
        assert_eq!(hdr.length(), 28);
        assert_eq!(hdr.payload().len(), 20);

        let layer = hdr.to_layer(34);
        assert_eq!(layer.payload_offset, 42);
        assert_eq!(layer.payload_len, 20);
    }

    #[test]
    fn payload_clamped_to_declared_length() {
        let mut pkt = vec![0x00, 0x35, 0xC0, 0x00, 0x00, 0x0C, 0x00, 0x00];
        pkt.extend_from_slice(&[0xAB; 20]);
        assert_eq!(UdpHeader::parse(&pkt).unwrap().payload().len(), 4);
    }

    #[test]
    fn payload_clamped_to_captured_bytes() {
        let mut pkt = vec![0x00, 0x35, 0xC0, 0x00, 0x01, 0x00, 0x00, 0x00];
        pkt.extend_from_slice(&[0xAB; 10]);
        assert_eq!(UdpHeader::parse(&pkt).unwrap().payload().len(), 10);
    }

    #[test]
    fn reject_short_udp() {
        let pkt = [0u8; 7];
        assert!(UdpHeader::parse(&pkt).is_err());
    }
}
