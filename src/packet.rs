//! Packet assembler: runs one captured record through the layer decoders.
//!
//! Each layer is attempted only when the layer below it decoded. A layer that
//! fails is simply absent; it never removes what was decoded before it.

use crate::capture::RawRecord;
use crate::protocol::arp::{ArpHeader, ArpPacket};
use crate::protocol::dns::DnsMessage;
use crate::protocol::http::HttpMessage;
use crate::protocol::icmp::{IcmpHeader, IcmpLayer};
use crate::protocol::ipv4::{Ipv4Header, Ipv4Layer};
use crate::protocol::ipv6::{Ipv6Header, Ipv6Layer};
use crate::protocol::link::{self, LinkLayer, LinkType};
use crate::protocol::tcp::{TcpHeader, TcpLayer};
use crate::protocol::tls::{self, ClientHello, ServerHello, TlsRecord};
use crate::protocol::udp::{UdpHeader, UdpLayer};
use crate::protocol::{select_application, AppProtocol, EtherType, IpProtocol, Transport};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPacket {
    pub index: usize,
    pub timestamp: f64,
    pub captured_length: usize,
    pub original_length: u32,
    pub link_type: LinkType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<UdpLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp: Option<IcmpLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arp: Option<ArpPacket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_record: Option<TlsRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_hello: Option<ClientHello>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_server_hello: Option<ServerHello>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ParsedPacket {
    fn bare(index: usize, record: &RawRecord<'_>) -> Self {
        ParsedPacket {
            index,
            timestamp: record.timestamp,
            captured_length: record.data.len(),
            original_length: record.original_length,
            link_type: record.link_type,
            link: None,
            ipv4: None,
            ipv6: None,
            tcp: None,
            udp: None,
            icmp: None,
            arp: None,
            dns: None,
            http: None,
            tls_record: None,
            tls_client_hello: None,
            tls_server_hello: None,
            data: record.data.to_vec(),
        }
    }

    pub fn src_ip(&self) -> Option<IpAddr> {
        if let Some(v4) = &self.ipv4 {
            return Some(IpAddr::V4(v4.src));
        }
        self.ipv6.as_ref().map(|v6| IpAddr::V6(v6.src))
    }

    pub fn dst_ip(&self) -> Option<IpAddr> {
        if let Some(v4) = &self.ipv4 {
            return Some(IpAddr::V4(v4.dst));
        }
        self.ipv6.as_ref().map(|v6| IpAddr::V6(v6.dst))
    }

    /// (source, destination) ports of the TCP or UDP layer.
    pub fn ports(&self) -> Option<(u16, u16)> {
        if let Some(tcp) = &self.tcp {
            return Some((tcp.src_port, tcp.dst_port));
        }
        self.udp.as_ref().map(|udp| (udp.src_port, udp.dst_port))
    }

    /// Transport payload bytes (empty when there is no TCP/UDP layer).
    pub fn payload(&self) -> &[u8] {
        let (offset, len) = match (&self.tcp, &self.udp) {
            (Some(tcp), _) => (tcp.payload_offset, tcp.payload_len),
            (None, Some(udp)) => (udp.payload_offset, udp.payload_len),
            _ => return &[],
        };
        self.data.get(offset..offset + len).unwrap_or(&[])
    }

    pub fn has_tls(&self) -> bool {
        self.tls_record.is_some() || self.tls_client_hello.is_some() || self.tls_server_hello.is_some()
    }

    /// Link-layer broadcast, or the IPv4 limited broadcast address when the
    /// capture has no MAC header.
    pub fn is_broadcast(&self) -> bool {
        if let Some(link) = &self.link {
            if link.dst_mac.is_some() {
                return link.is_broadcast();
            }
        }
        matches!(&self.ipv4, Some(v4) if v4.dst == Ipv4Addr::BROADCAST)
    }

    /// Highest decoded protocol, used for the protocol breakdown.
    pub fn protocol_label(&self) -> &'static str {
        if self.has_tls() {
            "TLS"
        } else if self.http.is_some() {
            "HTTP"
        } else if self.dns.is_some() {
            "DNS"
        } else if self.arp.is_some() {
            "ARP"
        } else if self.tcp.is_some() {
            "TCP"
        } else if self.udp.is_some() {
            "UDP"
        } else if let Some(icmp) = &self.icmp {
            if icmp.is_v6 {
                "ICMPv6"
            } else {
                "ICMP"
            }
        } else if self.ipv4.is_some() {
            "IPv4"
        } else if self.ipv6.is_some() {
            "IPv6"
        } else if self.link_type == LinkType::Ethernet && self.link.is_some() {
            "Ethernet"
        } else {
            "Other"
        }
    }
}

/// Decode every layer of one record.
pub fn decode(index: usize, record: &RawRecord<'_>) -> ParsedPacket {
    let mut pkt = ParsedPacket::bare(index, record);
    let frame = record.data;

    let Some(link) = link::decode(record.link_type, frame) else {
        tracing::trace!(index, link_type = %record.link_type, "no link layer");
        return pkt;
    };
    let net_offset = link.payload_offset;
    let ether_type = link.ether_type();
    pkt.link = Some(link);
    let net = &frame[net_offset..];

    match ether_type {
        EtherType::Ipv4 => match Ipv4Header::parse(net) {
            Ok(hdr) => {
                let layer = hdr.to_layer();
                // Non-first fragments carry no transport header.
                let decode_transport = layer.fragment_offset == 0;
                pkt.ipv4 = Some(layer);
                if decode_transport {
                    let base = net_offset + hdr.header_len();
                    decode_l4(&mut pkt, hdr.protocol(), hdr.payload(), base);
                }
            }
            Err(e) => tracing::trace!(index, error = %e, "IPv4 decode failed"),
        },
        EtherType::Ipv6 => match Ipv6Header::parse(net) {
            Ok(hdr) => {
                pkt.ipv6 = Some(hdr.to_layer());
                let base = net_offset + crate::protocol::ipv6::IPV6_HEADER_LEN;
                decode_l4(&mut pkt, hdr.next_header(), hdr.payload(), base);
            }
            Err(e) => tracing::trace!(index, error = %e, "IPv6 decode failed"),
        },
        EtherType::Arp => match ArpHeader::parse(net) {
            Ok(hdr) => pkt.arp = Some(hdr.to_packet()),
            Err(e) => tracing::trace!(index, error = %e, "ARP decode failed"),
        },
        _ => {}
    }

    pkt
}

fn decode_l4(pkt: &mut ParsedPacket, protocol: IpProtocol, data: &[u8], base: usize) {
    match protocol {
        IpProtocol::Tcp => match TcpHeader::parse(data) {
            Ok(hdr) => {
                let (src, dst) = (hdr.src_port(), hdr.dst_port());
                let payload = hdr.payload();
                pkt.tcp = Some(hdr.to_layer(base));
                decode_app(pkt, Transport::Tcp, src, dst, payload);
            }
            Err(e) => tracing::trace!(index = pkt.index, error = %e, "TCP decode failed"),
        },
        IpProtocol::Udp => match UdpHeader::parse(data) {
            Ok(hdr) => {
                let (src, dst) = (hdr.src_port(), hdr.dst_port());
                let payload = hdr.payload();
                pkt.udp = Some(hdr.to_layer(base));
                decode_app(pkt, Transport::Udp, src, dst, payload);
            }
            Err(e) => tracing::trace!(index = pkt.index, error = %e, "UDP decode failed"),
        },
        IpProtocol::Icmp | IpProtocol::Icmpv6 => match IcmpHeader::parse(data) {
            Ok(hdr) => pkt.icmp = Some(hdr.to_layer(protocol == IpProtocol::Icmpv6)),
            Err(e) => tracing::trace!(index = pkt.index, error = %e, "ICMP decode failed"),
        },
        IpProtocol::Unknown(_) => {}
    }
}

fn decode_app(
    pkt: &mut ParsedPacket,
    transport: Transport,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) {
    match select_application(transport, src_port, dst_port, payload) {
        Some(AppProtocol::Dns) => {
            // DNS over TCP is preceded by a two-byte message length.
            let message = match transport {
                Transport::Tcp => payload.get(2..).unwrap_or(&[]),
                Transport::Udp => payload,
            };
            pkt.dns = DnsMessage::parse(message);
        }
        Some(AppProtocol::Http) => pkt.http = HttpMessage::parse(payload),
        Some(AppProtocol::Tls) => {
            pkt.tls_record = TlsRecord::parse(payload);
            pkt.tls_client_hello = tls::parse_client_hello(payload);
            pkt.tls_server_hello = tls::parse_server_hello(payload);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tls::build;
    use crate::testutil::*;

    fn record(frame: &[u8]) -> RawRecord<'_> {
        RawRecord {
            timestamp: 1.0,
            data: frame,
            original_length: frame.len() as u32,
            link_type: LinkType::Ethernet,
        }
    }

    #[test]
    fn tcp_http_request() {
        let frame = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 80, 0x18)
            .payload(b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n")
            .frame();
        let pkt = decode(7, &record(&frame));
        assert_eq!(pkt.index, 7);
        assert!(pkt.link.is_some());
        assert_eq!(pkt.src_ip(), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(pkt.ports(), Some((40000, 80)));
        assert!(pkt.payload().starts_with(b"GET /"));
        assert_eq!(pkt.http.as_ref().unwrap().header("host"), Some("a.test"));
        assert_eq!(pkt.protocol_label(), "HTTP");
    }

    #[test]
    fn udp_dns_query() {
        let frame = udp_frame("10.0.0.1", 5353, "8.8.8.8", 53, &dns_query(9, "example.com", 1));
        let pkt = decode(0, &record(&frame));
        let dns = pkt.dns.as_ref().unwrap();
        assert_eq!(dns.id, 9);
        assert_eq!(dns.questions[0].name, "example.com");
        assert_eq!(pkt.protocol_label(), "DNS");
    }

    #[test]
    fn tcp_dns_strips_length_prefix() {
        let query = dns_query(3, "example.net", 28);
        let mut framed = (query.len() as u16).to_be_bytes().to_vec();
        framed.extend(query);
        let frame = TcpSeg::new("10.0.0.1", 40000, "10.0.0.53", 53, 0x18)
            .payload(&framed)
            .frame();
        let pkt = decode(0, &record(&frame));
        assert_eq!(pkt.dns.as_ref().unwrap().questions[0].name, "example.net");
    }

    #[test]
    fn tls_client_hello_on_443() {
        let frame = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 443, 0x18)
            .payload(&build::client_hello(0x0303, Some("site.test")))
            .frame();
        let pkt = decode(0, &record(&frame));
        assert!(pkt.tls_record.is_some());
        assert_eq!(
            pkt.tls_client_hello.as_ref().unwrap().sni.as_deref(),
            Some("site.test")
        );
        assert!(pkt.tls_server_hello.is_none());
        assert_eq!(pkt.protocol_label(), "TLS");
    }

    #[test]
    fn arp_frame_decodes() {
        let frame = arp_frame(1, MAC_A, "10.0.0.1", "10.0.0.9", BROADCAST);
        let pkt = decode(0, &record(&frame));
        assert_eq!(pkt.arp.as_ref().unwrap().target_ip, ip("10.0.0.9"));
        assert!(pkt.is_broadcast());
        assert_eq!(pkt.protocol_label(), "ARP");
    }

    #[test]
    fn failed_transport_keeps_network_layer() {
        let ip_pkt = ipv4(ip("10.0.0.1"), ip("10.0.0.2"), 6, &[0u8; 10]);
        let frame = ethernet(MAC_A, MAC_B, 0x0800, &ip_pkt);
        let pkt = decode(0, &record(&frame));
        assert!(pkt.ipv4.is_some());
        assert!(pkt.tcp.is_none());
        assert!(pkt.payload().is_empty());
        assert_eq!(pkt.protocol_label(), "IPv4");
    }

    #[test]
    fn short_frame_has_no_layers() {
        let frame = [0u8; 10];
        let pkt = decode(0, &record(&frame));
        assert!(pkt.link.is_none());
        assert_eq!(pkt.captured_length, 10);
        assert_eq!(pkt.protocol_label(), "Other");
    }

    #[test]
    fn later_fragments_skip_transport() {
        let ip_pkt = ipv4_frag(ip("10.0.0.1"), ip("10.0.0.2"), 17, &[0u8; 16], false, 185);
        let frame = ethernet(MAC_A, MAC_B, 0x0800, &ip_pkt);
        let pkt = decode(0, &record(&frame));
        assert!(pkt.ipv4.as_ref().unwrap().is_fragment());
        assert!(pkt.udp.is_none());
    }

    #[test]
    fn raw_ip_link_type() {
        let ip_pkt = ipv4(ip("10.0.0.1"), ip("10.0.0.2"), 17, &udp(1000, 2000, b"x"));
        let rec = RawRecord {
            timestamp: 0.0,
            data: &ip_pkt,
            original_length: ip_pkt.len() as u32,
            link_type: LinkType::RawIp,
        };
        let pkt = decode(0, &rec);
        assert_eq!(pkt.payload(), b"x");
        assert_eq!(pkt.protocol_label(), "UDP");
    }
}
