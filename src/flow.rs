//! Bidirectional TCP/UDP connection aggregation.

use crate::packet::ParsedPacket;
use crate::protocol::tcp::TcpFlags;
use crate::protocol::{format_ip, serialize_ip};
use ahash::AHashMap;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    #[serde(serialize_with = "serialize_ip")]
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(_) => write!(f, "{}:{}", format_ip(&self.ip), self.port),
            IpAddr::V6(_) => write!(f, "[{}]:{}", format_ip(&self.ip), self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for FlowProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowProtocol::Tcp => write!(f, "TCP"),
            FlowProtocol::Udp => write!(f, "UDP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    AtoB,
    BtoA,
}

/// Unordered endpoint pair plus protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub protocol: FlowProtocol,
    pub a: Endpoint,
    pub b: Endpoint,
}

impl FlowKey {
    /// Build the canonical key and report which way `src -> dst` runs
    /// relative to it.
    pub fn new(protocol: FlowProtocol, src: Endpoint, dst: Endpoint) -> (Self, FlowDirection) {
        if endpoint_key(&src) <= endpoint_key(&dst) {
            (
                FlowKey {
                    protocol,
                    a: src,
                    b: dst,
                },
                FlowDirection::AtoB,
            )
        } else {
            (
                FlowKey {
                    protocol,
                    a: dst,
                    b: src,
                },
                FlowDirection::BtoA,
            )
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} <-> {}", self.protocol, self.a, self.b)
    }
}

fn endpoint_key(endpoint: &Endpoint) -> (u8, [u8; 16], u16) {
    let (version, addr) = ip_key(endpoint.ip);
    (version, addr, endpoint.port)
}

fn ip_key(ip: IpAddr) -> (u8, [u8; 16]) {
    match ip {
        IpAddr::V4(addr) => {
            let mut bytes = [0u8; 16];
            bytes[12..].copy_from_slice(&addr.octets());
            (4, bytes)
        }
        IpAddr::V6(addr) => (6, addr.octets()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    SynSent,
    SynReceived,
    Established,
    FinWait,
    Reset,
    Unknown,
}

impl TcpState {
    /// State implied by one segment's flags, or `None` when the flags imply
    /// nothing. Only the latest segment counts; earlier states are not
    /// consulted.
    pub fn from_flags(flags: &TcpFlags) -> Option<TcpState> {
        if flags.rst {
            Some(TcpState::Reset)
        } else if flags.fin {
            Some(TcpState::FinWait)
        } else if flags.syn && flags.ack {
            Some(TcpState::SynReceived)
        } else if flags.syn {
            Some(TcpState::SynSent)
        } else if flags.ack {
            Some(TcpState::Established)
        } else {
            None
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcpState::SynSent => write!(f, "SYN_SENT"),
            TcpState::SynReceived => write!(f, "SYN_RECEIVED"),
            TcpState::Established => write!(f, "ESTABLISHED"),
            TcpState::FinWait => write!(f, "FIN_WAIT"),
            TcpState::Reset => write!(f, "RESET"),
            TcpState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub key: String,
    pub protocol: FlowProtocol,
    /// Source of the first packet seen.
    pub src: Endpoint,
    pub dst: Endpoint,
    pub packets: u64,
    pub bytes: u64,
    pub packets_a_to_b: u64,
    pub packets_b_to_a: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_state: Option<TcpState>,
}

impl ConnectionStats {
    fn new(key: &FlowKey, src: Endpoint, dst: Endpoint, ts: f64) -> Self {
        ConnectionStats {
            key: key.to_string(),
            protocol: key.protocol,
            src,
            dst,
            packets: 0,
            bytes: 0,
            packets_a_to_b: 0,
            packets_b_to_a: 0,
            start_time: ts,
            end_time: ts,
            duration: 0.0,
            tcp_state: match key.protocol {
                FlowProtocol::Tcp => Some(TcpState::Unknown),
                FlowProtocol::Udp => None,
            },
        }
    }

    fn observe(&mut self, ts: f64, direction: FlowDirection, bytes: u64, flags: Option<&TcpFlags>) {
        self.packets += 1;
        self.bytes += bytes;
        match direction {
            FlowDirection::AtoB => self.packets_a_to_b += 1,
            FlowDirection::BtoA => self.packets_b_to_a += 1,
        }
        if ts > self.end_time {
            self.end_time = ts;
        }
        self.duration = (self.end_time - self.start_time).max(0.0);
        if let Some(state) = flags.and_then(TcpState::from_flags) {
            self.tcp_state = Some(state);
        }
    }
}

/// Transport protocol and (source, destination) endpoints of a TCP or UDP
/// packet.
pub fn packet_endpoints(packet: &ParsedPacket) -> Option<(FlowProtocol, Endpoint, Endpoint)> {
    let src_ip = packet.src_ip()?;
    let dst_ip = packet.dst_ip()?;
    let (protocol, src_port, dst_port) = match (&packet.tcp, &packet.udp) {
        (Some(tcp), _) => (FlowProtocol::Tcp, tcp.src_port, tcp.dst_port),
        (None, Some(udp)) => (FlowProtocol::Udp, udp.src_port, udp.dst_port),
        _ => return None,
    };
    let src = Endpoint {
        ip: src_ip,
        port: src_port,
    };
    let dst = Endpoint {
        ip: dst_ip,
        port: dst_port,
    };
    Some((protocol, src, dst))
}

/// Connection table in first-seen order.
#[derive(Debug, Default)]
pub struct FlowTracker {
    connections: Vec<ConnectionStats>,
    index: AHashMap<FlowKey, usize>,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Account one packet. Packets without an IP and TCP/UDP layer are ignored.
    pub fn observe(&mut self, packet: &ParsedPacket) {
        let Some((protocol, src, dst)) = packet_endpoints(packet) else {
            return;
        };
        let flags = packet.tcp.as_ref().map(|tcp| &tcp.flags);
        let (key, direction) = FlowKey::new(protocol, src, dst);
        let ts = packet.timestamp;

        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.connections.len();
                self.connections
                    .push(ConnectionStats::new(&key, src, dst, ts));
                self.index.insert(key, slot);
                slot
            }
        };
        self.connections[slot].observe(ts, direction, packet.original_length as u64, flags);
    }

    pub fn connections(&self) -> &[ConnectionStats] {
        &self.connections
    }

    pub fn into_connections(self) -> Vec<ConnectionStats> {
        self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawRecord;
    use crate::packet;
    use crate::protocol::link::LinkType;
    use crate::protocol::tcp::flags;
    use crate::testutil::{udp_frame, TcpSeg};
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn decoded(frame: &[u8], ts: f64) -> ParsedPacket {
        packet::decode(
            0,
            &RawRecord {
                timestamp: ts,
                data: frame,
                original_length: frame.len() as u32,
                link_type: LinkType::Ethernet,
            },
        )
    }

    #[test]
    fn flow_key_is_directionless() {
        let a = Endpoint {
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port: 1234,
        };
        let b = Endpoint {
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            port: 80,
        };
        let (key_ab, dir_ab) = FlowKey::new(FlowProtocol::Tcp, a, b);
        let (key_ba, dir_ba) = FlowKey::new(FlowProtocol::Tcp, b, a);
        assert_eq!(key_ab, key_ba);
        assert_ne!(dir_ab, dir_ba);
    }

    #[test]
    fn flow_key_orders_ipv4_before_ipv6() {
        let v4 = Endpoint {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            port: 443,
        };
        let v6 = Endpoint {
            ip: IpAddr::V6(Ipv6Addr::LOCALHOST),
            port: 443,
        };
        let (key, dir) = FlowKey::new(FlowProtocol::Udp, v6, v4);
        assert_eq!(key.a, v4);
        assert_eq!(key.b, v6);
        assert_eq!(dir, FlowDirection::BtoA);
    }

    #[test]
    fn both_directions_share_one_connection() {
        let mut tracker = FlowTracker::new();
        let out = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 80, flags::SYN).frame();
        let back = TcpSeg::new("10.0.0.2", 80, "10.0.0.1", 40000, flags::SYN | flags::ACK).frame();
        tracker.observe(&decoded(&out, 1.0));
        tracker.observe(&decoded(&back, 1.5));

        assert_eq!(tracker.len(), 1);
        let conn = &tracker.connections()[0];
        assert_eq!(conn.packets, 2);
        assert_eq!(conn.bytes, (out.len() + back.len()) as u64);
        assert_eq!(conn.src.port, 40000);
        assert_eq!(conn.duration, 0.5);
        assert_eq!(conn.tcp_state, Some(TcpState::SynReceived));
        assert_eq!(conn.key, "TCP 10.0.0.1:40000 <-> 10.0.0.2:80");
    }

    #[test]
    fn connections_keep_first_seen_order() {
        let mut tracker = FlowTracker::new();
        let second = udp_frame("10.0.0.9", 5000, "10.0.0.1", 53, b"x");
        let first = udp_frame("10.0.0.5", 5000, "10.0.0.1", 53, b"x");
        tracker.observe(&decoded(&second, 0.0));
        tracker.observe(&decoded(&first, 0.1));
        tracker.observe(&decoded(&second, 0.2));
        let ips: Vec<String> = tracker
            .connections()
            .iter()
            .map(|c| c.src.ip.to_string())
            .collect();
        assert_eq!(ips, vec!["10.0.0.9", "10.0.0.5"]);
        assert_eq!(tracker.connections()[0].tcp_state, None);
    }

    #[test]
    fn tcp_state_follows_flag_precedence() {
        let f = |bits| TcpFlags::from_bits(bits);
        assert_eq!(TcpState::from_flags(&f(flags::RST | flags::ACK)), Some(TcpState::Reset));
        assert_eq!(TcpState::from_flags(&f(flags::FIN | flags::ACK)), Some(TcpState::FinWait));
        assert_eq!(
            TcpState::from_flags(&f(flags::SYN | flags::ACK)),
            Some(TcpState::SynReceived)
        );
        assert_eq!(TcpState::from_flags(&f(flags::SYN)), Some(TcpState::SynSent));
        assert_eq!(TcpState::from_flags(&f(flags::ACK)), Some(TcpState::Established));
        assert_eq!(TcpState::from_flags(&f(flags::PSH)), None);
    }

    #[test]
    fn stray_ack_after_reset_reads_established() {
        // Last-flags-wins: the state has no memory of the earlier RST.
        let mut tracker = FlowTracker::new();
        let rst = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 80, flags::RST).frame();
        let ack = TcpSeg::new("10.0.0.2", 80, "10.0.0.1", 40000, flags::ACK).frame();
        tracker.observe(&decoded(&rst, 0.0));
        assert_eq!(tracker.connections()[0].tcp_state, Some(TcpState::Reset));
        tracker.observe(&decoded(&ack, 0.1));
        assert_eq!(tracker.connections()[0].tcp_state, Some(TcpState::Established));
    }

    #[test]
    fn flagless_segment_keeps_state() {
        let mut tracker = FlowTracker::new();
        let syn = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 80, flags::SYN).frame();
        let bare = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 80, 0).frame();
        tracker.observe(&decoded(&syn, 0.0));
        tracker.observe(&decoded(&bare, 0.1));
        assert_eq!(tracker.connections()[0].tcp_state, Some(TcpState::SynSent));
    }
}
