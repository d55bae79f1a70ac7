pub mod arp;
pub mod dns;
pub mod http;
pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod link;
pub mod tcp;
pub mod tls;
pub mod udp;

use serde::Serializer;
use std::fmt;
use std::net::IpAddr;

/// EtherType constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Arp,
    VlanTagged,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x0806 => EtherType::Arp,
            0x8100 => EtherType::VlanTagged,
            other => EtherType::Unknown(other),
        }
    }
}

impl EtherType {
    pub fn as_u16(&self) -> u16 {
        match self {
            EtherType::Ipv4 => 0x0800,
            EtherType::Ipv6 => 0x86DD,
            EtherType::Arp => 0x0806,
            EtherType::VlanTagged => 0x8100,
            EtherType::Unknown(v) => *v,
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Arp => write!(f, "ARP"),
            EtherType::VlanTagged => write!(f, "802.1Q VLAN"),
            EtherType::Unknown(v) => write!(f, "Unknown(0x{:04x})", v),
        }
    }
}

/// IP protocol numbers the transport decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Icmpv6,
    Unknown(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            58 => IpProtocol::Icmpv6,
            other => IpProtocol::Unknown(other),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::Icmp => write!(f, "ICMP"),
            IpProtocol::Tcp => write!(f, "TCP"),
            IpProtocol::Udp => write!(f, "UDP"),
            IpProtocol::Icmpv6 => write!(f, "ICMPv6"),
            IpProtocol::Unknown(v) => write!(f, "Proto({})", v),
        }
    }
}

/// Errors from protocol parsing
#[derive(Debug)]
pub enum ParseError {
    /// Not enough bytes to parse the header
    TooShort { expected: usize, actual: usize },
    /// Invalid header values
    InvalidHeader(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooShort { expected, actual } => {
                write!(f, "packet too short: need {} bytes, got {}", expected, actual)
            }
            ParseError::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// Application protocol chosen for a transport payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppProtocol {
    Dns,
    Http,
    Tls,
}

/// Transport carrying an application payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

pub const PORT_DNS: u16 = 53;
pub const PORT_HTTP: u16 = 80;
pub const PORT_HTTP_ALT: u16 = 8080;
pub const PORT_HTTPS: u16 = 443;

/// Pick the application decoder for a transport payload.
///
/// Well-known ports win; TLS is additionally sniffed from the record header so
/// that TLS on non-standard ports still decodes. Anything else falls through
/// to `None` and no application layer is attempted.
pub fn select_application(
    transport: Transport,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Option<AppProtocol> {
    if payload.is_empty() {
        return None;
    }
    let either = |port: u16| src_port == port || dst_port == port;

    if either(PORT_DNS) {
        return Some(AppProtocol::Dns);
    }
    if transport != Transport::Tcp {
        return None;
    }
    if either(PORT_HTTP) || either(PORT_HTTP_ALT) {
        return Some(AppProtocol::Http);
    }
    if either(PORT_HTTPS) || tls::looks_like_record(payload) {
        return Some(AppProtocol::Tls);
    }
    None
}

// Cursor helpers. Each returns the decoded value together with the offset just
// past it, or `None` when the read would run off the end of `data`.

#[inline]
pub(crate) fn read_u8(data: &[u8], offset: usize) -> Option<(u8, usize)> {
    data.get(offset).map(|b| (*b, offset + 1))
}

#[inline]
pub(crate) fn read_u16(data: &[u8], offset: usize) -> Option<(u16, usize)> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some((u16::from_be_bytes([bytes[0], bytes[1]]), offset + 2))
}

#[inline]
pub(crate) fn read_u24(data: &[u8], offset: usize) -> Option<(u32, usize)> {
    let bytes = data.get(offset..offset.checked_add(3)?)?;
    Some((
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
        offset + 3,
    ))
}

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<(u32, usize)> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some((
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        offset + 4,
    ))
}

#[inline]
pub(crate) fn read_bytes(data: &[u8], offset: usize, len: usize) -> Option<(&[u8], usize)> {
    let end = offset.checked_add(len)?;
    data.get(offset..end).map(|bytes| (bytes, end))
}

/// Render an address the way reports show it: dotted decimal for IPv4 and
/// full, uncompressed colon-hex for IPv6.
pub fn format_ip(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(addr) => addr.to_string(),
        IpAddr::V6(addr) => ipv6::format_ipv6_full(addr),
    }
}

pub(crate) fn serialize_ip<S: Serializer>(ip: &IpAddr, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_ip(ip))
}
