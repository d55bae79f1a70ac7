//! Link-layer framing: Ethernet (with stacked 802.1Q tags), raw IP and the
//! two Linux cooked-capture variants.
//!
//! Ethernet II (14 bytes):
//!   - Destination MAC: 6 bytes
//!   - Source MAC:      6 bytes
//!   - EtherType:       2 bytes, 0x8100 means a 4-byte 802.1Q tag follows
//!
//! Linux cooked capture v1 (16 bytes):
//!   packet type (2) | ARPHRD (2) | address length (2) | address (8) | protocol (2)
//!
//! Linux cooked capture v2 (20 bytes):
//!   protocol (2) | reserved (2) | ifindex (4) | ARPHRD (2) | packet type (1) |
//!   address length (1) | address (8)

use super::{EtherType, ParseError};
use serde::Serialize;
use std::fmt;

/// Minimum Ethernet header length (no VLAN tags)
pub const ETH_HEADER_LEN: usize = 14;
/// One 802.1Q tag: TCI plus the inner EtherType.
pub const VLAN_TAG_LEN: usize = 4;
pub const SLL_HEADER_LEN: usize = 16;
pub const SLL2_HEADER_LEN: usize = 20;

const ARPHRD_ETHER: u16 = 1;

/// Link type attached to each captured record by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkType {
    Ethernet,
    RawIp,
    LinuxSll,
    LinuxSll2,
    Unknown(u32),
}

impl From<u32> for LinkType {
    fn from(value: u32) -> Self {
        match value {
            1 => LinkType::Ethernet,
            // 12 is DLT_RAW on the BSDs, 101 is LINKTYPE_RAW everywhere else.
            12 | 101 => LinkType::RawIp,
            113 => LinkType::LinuxSll,
            276 => LinkType::LinuxSll2,
            other => LinkType::Unknown(other),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Ethernet => write!(f, "Ethernet"),
            LinkType::RawIp => write!(f, "Raw IP"),
            LinkType::LinuxSll => write!(f, "Linux cooked v1"),
            LinkType::LinuxSll2 => write!(f, "Linux cooked v2"),
            LinkType::Unknown(v) => write!(f, "LinkType({})", v),
        }
    }
}

/// Zero-copy Ethernet header that borrows from the packet buffer.
#[derive(Debug)]
pub struct EthernetHeader<'a> {
    data: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    /// Parse an Ethernet header from a raw byte slice.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: ETH_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(EthernetHeader { data })
    }

    #[inline]
    pub fn dst_mac(&self) -> &'a [u8] {
        &self.data[0..6]
    }

    #[inline]
    pub fn src_mac(&self) -> &'a [u8] {
        &self.data[6..12]
    }

    #[inline]
    pub fn ether_type_raw(&self) -> u16 {
        u16::from_be_bytes([self.data[12], self.data[13]])
    }

    #[inline]
    pub fn ether_type(&self) -> EtherType {
        EtherType::from(self.ether_type_raw())
    }

    /// The bytes after the fixed 14-byte header (VLAN tags included).
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HEADER_LEN..]
    }
}

/// Format a MAC address as xx:xx:xx:xx:xx:xx
pub fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Decoded link framing for one packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkLayer {
    pub link_type: LinkType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_mac: Option<String>,
    /// EtherType of the network payload after all tags were stripped.
    pub ether_type: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vlan_ids: Vec<u16>,
    /// Offset of the network-layer payload within the frame.
    #[serde(skip)]
    pub payload_offset: usize,
}

impl LinkLayer {
    pub fn ether_type(&self) -> EtherType {
        EtherType::from(self.ether_type)
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst_mac.as_deref() == Some("ff:ff:ff:ff:ff:ff")
    }
}

/// Strip link framing according to the capture's link type.
///
/// Returns `None` when the frame is shorter than the link header or the link
/// type is not one we decode; no further layers are attempted in that case.
pub fn decode(link_type: LinkType, frame: &[u8]) -> Option<LinkLayer> {
    match link_type {
        LinkType::Ethernet => decode_ethernet(frame),
        LinkType::RawIp => decode_raw_ip(frame),
        LinkType::LinuxSll => decode_sll(frame),
        LinkType::LinuxSll2 => decode_sll2(frame),
        LinkType::Unknown(_) => None,
    }
}

fn decode_ethernet(frame: &[u8]) -> Option<LinkLayer> {
    let eth = EthernetHeader::parse(frame).ok()?;
    let mut ether_type = eth.ether_type_raw();
    let mut offset = ETH_HEADER_LEN;
    let mut vlan_ids = Vec::new();

    while EtherType::from(ether_type) == EtherType::VlanTagged
        && frame.len() >= offset + VLAN_TAG_LEN
    {
        let tci = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
        vlan_ids.push(tci & 0x0FFF);
        ether_type = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]);
        offset += VLAN_TAG_LEN;
    }

    Some(LinkLayer {
        link_type: LinkType::Ethernet,
        src_mac: Some(format_mac(eth.src_mac())),
        dst_mac: Some(format_mac(eth.dst_mac())),
        ether_type,
        vlan_ids,
        payload_offset: offset,
    })
}

fn decode_raw_ip(frame: &[u8]) -> Option<LinkLayer> {
    let ether_type = match frame.first()? >> 4 {
        4 => EtherType::Ipv4,
        6 => EtherType::Ipv6,
        _ => return None,
    };
    Some(LinkLayer {
        link_type: LinkType::RawIp,
        src_mac: None,
        dst_mac: None,
        ether_type: ether_type.as_u16(),
        vlan_ids: Vec::new(),
        payload_offset: 0,
    })
}

fn decode_sll(frame: &[u8]) -> Option<LinkLayer> {
    if frame.len() < SLL_HEADER_LEN {
        return None;
    }
    let arphrd = u16::from_be_bytes([frame[2], frame[3]]);
    let addr_len = u16::from_be_bytes([frame[4], frame[5]]) as usize;
    Some(LinkLayer {
        link_type: LinkType::LinuxSll,
        src_mac: cooked_address(arphrd, addr_len, &frame[6..14]),
        dst_mac: None,
        ether_type: u16::from_be_bytes([frame[14], frame[15]]),
        vlan_ids: Vec::new(),
        payload_offset: SLL_HEADER_LEN,
    })
}

fn decode_sll2(frame: &[u8]) -> Option<LinkLayer> {
    if frame.len() < SLL2_HEADER_LEN {
        return None;
    }
    let arphrd = u16::from_be_bytes([frame[8], frame[9]]);
    let addr_len = frame[11] as usize;
    Some(LinkLayer {
        link_type: LinkType::LinuxSll2,
        src_mac: cooked_address(arphrd, addr_len, &frame[12..20]),
        dst_mac: None,
        ether_type: u16::from_be_bytes([frame[0], frame[1]]),
        vlan_ids: Vec::new(),
        payload_offset: SLL2_HEADER_LEN,
    })
}

fn cooked_address(arphrd: u16, addr_len: usize, addr: &[u8]) -> Option<String> {
    if arphrd == ARPHRD_ETHER && addr_len == 6 {
        Some(format_mac(&addr[..6]))
    } else {
        None
    }
}

impl<'a> fmt::Display for EthernetHeader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            format_mac(self.src_mac()),
            format_mac(self.dst_mac()),
            self.ether_type()
        )
    }
}
