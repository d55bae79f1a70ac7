//! ARP over Ethernet/IPv4 (28 bytes).
//!
//!  +-----------------+-----------------+--------+--------+-----------------+
//!  | hardware type 2 | protocol type 2 | hlen 1 | plen 1 | opcode 2        |
//!  +-----------------+-----------------+--------+--------+-----------------+
//!  | sender MAC 6 | sender IPv4 4 | target MAC 6 | target IPv4 4           |
//!  +-----------------------------------------------------------------------+

use super::link::format_mac;
use super::ParseError;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

pub const ARP_LEN: usize = 28;

pub const OP_REQUEST: u16 = 1;
pub const OP_REPLY: u16 = 2;

#[derive(Debug)]
pub struct ArpHeader<'a> {
    data: &'a [u8],
}

impl<'a> ArpHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < ARP_LEN {
            return Err(ParseError::TooShort {
                expected: ARP_LEN,
                actual: data.len(),
            });
        }
        Ok(ArpHeader { data })
    }

    #[inline]
    pub fn hardware_type(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    #[inline]
    pub fn protocol_type(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    #[inline]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes([self.data[6], self.data[7]])
    }

    #[inline]
    fn ipv4_at(&self, at: usize) -> Ipv4Addr {
        Ipv4Addr::new(
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        )
    }

    pub fn to_packet(&self) -> ArpPacket {
        ArpPacket {
            hardware_type: self.hardware_type(),
            protocol_type: self.protocol_type(),
            hardware_size: self.data[4],
            protocol_size: self.data[5],
            opcode: self.opcode(),
            sender_mac: format_mac(&self.data[8..14]),
            sender_ip: self.ipv4_at(14),
            target_mac: format_mac(&self.data[18..24]),
            target_ip: self.ipv4_at(24),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hardware_size: u8,
    pub protocol_size: u8,
    pub opcode: u16,
    pub sender_mac: String,
    pub sender_ip: Ipv4Addr,
    pub target_mac: String,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Gratuitous ARP announces its own address: sender IP equals target IP.
    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip
    }
}

impl fmt::Display for ArpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            OP_REQUEST => write!(f, "who-has {} tell {}", self.target_ip, self.sender_ip),
            OP_REPLY => write!(f, "{} is-at {}", self.sender_ip, self.sender_mac),
            op => write!(f, "ARP op={} {} -> {}", op, self.sender_ip, self.target_ip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arp_reply() -> Vec<u8> {
        let mut pkt = vec![0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x02];
        pkt.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        pkt.extend_from_slice(&[192, 168, 1, 1]);
        pkt.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        pkt.extend_from_slice(&[192, 168, 1, 20]);
        pkt
    }

    #[test]
    fn parse_reply() {
        let arp = ArpHeader::parse(&arp_reply()).unwrap().to_packet();
        assert_eq!(arp.opcode, OP_REPLY);
        assert_eq!(arp.hardware_type, 1);
        assert_eq!(arp.protocol_type, 0x0800);
        assert_eq!(arp.sender_mac, "00:11:22:33:44:55");
        assert_eq!(arp.sender_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(arp.target_ip, Ipv4Addr::new(192, 168, 1, 20));
        assert!(!arp.is_gratuitous());
        assert_eq!(arp.to_string(), "192.168.1.1 is-at 00:11:22:33:44:55");
    }

    #[test]
    fn gratuitous_when_sender_is_target() {
        let mut pkt = arp_reply();
        pkt[24..28].copy_from_slice(&[192, 168, 1, 1]);
        assert!(ArpHeader::parse(&pkt).unwrap().to_packet().is_gratuitous());
    }

    #[test]
    fn reject_short_arp() {
        assert!(ArpHeader::parse(&arp_reply()[..27]).is_err());
    }
}
