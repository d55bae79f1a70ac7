//! Summary tables computed from the decoded packets.
//!
//! Every table is ordered deterministically: hash maps are only used as
//! indexes into insertion-ordered vectors, and sorts are stable.

use crate::flow::{packet_endpoints, FlowKey};
use crate::packet::ParsedPacket;
use crate::protocol::format_ip;
use crate::protocol::http::HttpStartLine;
use crate::protocol::tls;
use ahash::AHashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::hash::Hash;
use std::net::IpAddr;

/// Insertion-ordered counter.
#[derive(Debug)]
pub(crate) struct Tally<K> {
    index: AHashMap<K, usize>,
    entries: Vec<(K, Vec<usize>)>,
}

impl<K: Hash + Eq + Clone> Tally<K> {
    pub(crate) fn new() -> Self {
        Tally {
            index: AHashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Count one occurrence of `key`, remembering the packet index.
    pub(crate) fn add(&mut self, key: K, packet: usize) {
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1.push(packet),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, vec![packet]));
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by count, highest first; ties keep first-seen order.
    pub(crate) fn by_count(mut self) -> Vec<(K, Vec<usize>)> {
        self.entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<(K, Vec<usize>)> {
        self.entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStat {
    pub protocol: String,
    pub packet_count: u64,
    pub bytes: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTalker {
    pub ip: String,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsQueryStat {
    pub domain: String,
    pub query_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConnection {
    pub packet_index: usize,
    pub client: String,
    pub server: String,
    pub sni: Option<String>,
    pub client_version: String,
    pub server_version: Option<String>,
    pub cipher_suite: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTransaction {
    pub packet_index: usize,
    pub client: String,
    pub server: String,
    pub method: String,
    pub uri: String,
    pub host: Option<String>,
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub response_packet_index: Option<usize>,
}

/// Packets and bytes per highest decoded protocol. Counts sum to the total
/// packet count and percentages to 100.
pub fn protocol_breakdown(packets: &[ParsedPacket]) -> Vec<ProtocolStat> {
    let mut rows: Vec<ProtocolStat> = Vec::new();
    let mut index: AHashMap<&'static str, usize> = AHashMap::new();
    for pkt in packets {
        let label = pkt.protocol_label();
        let slot = *index.entry(label).or_insert_with(|| {
            rows.push(ProtocolStat {
                protocol: label.to_string(),
                packet_count: 0,
                bytes: 0,
                percentage: 0.0,
            });
            rows.len() - 1
        });
        rows[slot].packet_count += 1;
        rows[slot].bytes += pkt.original_length as u64;
    }

    let total = packets.len() as f64;
    for row in &mut rows {
        row.percentage = row.packet_count as f64 * 100.0 / total;
    }
    rows.sort_by(|a, b| {
        b.packet_count
            .cmp(&a.packet_count)
            .then_with(|| a.protocol.cmp(&b.protocol))
    });
    rows
}

/// Hosts by total bytes sent and received, at most `limit` rows.
pub fn top_talkers(packets: &[ParsedPacket], limit: usize) -> Vec<TopTalker> {
    let mut hosts: Vec<(IpAddr, TopTalker)> = Vec::new();
    let mut index: AHashMap<IpAddr, usize> = AHashMap::new();
    let mut slot_for = |ip: IpAddr, hosts: &mut Vec<(IpAddr, TopTalker)>| -> usize {
        *index.entry(ip).or_insert_with(|| {
            hosts.push((
                ip,
                TopTalker {
                    ip: format_ip(&ip),
                    packets_sent: 0,
                    packets_received: 0,
                    bytes_sent: 0,
                    bytes_received: 0,
                    total_bytes: 0,
                },
            ));
            hosts.len() - 1
        })
    };

    for pkt in packets {
        let (Some(src), Some(dst)) = (pkt.src_ip(), pkt.dst_ip()) else {
            continue;
        };
        let bytes = pkt.original_length as u64;
        let s = slot_for(src, &mut hosts);
        hosts[s].1.packets_sent += 1;
        hosts[s].1.bytes_sent += bytes;
        hosts[s].1.total_bytes += bytes;
        let d = slot_for(dst, &mut hosts);
        hosts[d].1.packets_received += 1;
        hosts[d].1.bytes_received += bytes;
        hosts[d].1.total_bytes += bytes;
    }

    hosts.sort_by(|a, b| b.1.total_bytes.cmp(&a.1.total_bytes).then_with(|| a.0.cmp(&b.0)));
    hosts.into_iter().take(limit).map(|(_, t)| t).collect()
}

/// Distinct (name, type) pairs of DNS queries, most frequent first.
pub fn dns_queries(packets: &[ParsedPacket], limit: usize) -> Vec<DnsQueryStat> {
    let mut tally = Tally::new();
    for pkt in packets {
        let Some(dns) = &pkt.dns else { continue };
        if dns.is_response() {
            continue;
        }
        for q in &dns.questions {
            tally.add((q.name.clone(), q.record_type().to_string()), pkt.index);
        }
    }
    let mut rows: Vec<DnsQueryStat> = tally
        .into_entries()
        .into_iter()
        .map(|((domain, query_type), hits)| DnsQueryStat {
            domain,
            query_type,
            count: hits.len() as u64,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.domain.cmp(&b.domain))
            .then_with(|| a.query_type.cmp(&b.query_type))
    });
    rows.truncate(limit);
    rows
}

/// Total DNS queries seen (questions in non-response messages).
pub fn dns_query_count(packets: &[ParsedPacket]) -> usize {
    packets
        .iter()
        .filter_map(|p| p.dns.as_ref())
        .filter(|d| !d.is_response())
        .map(|d| d.questions.len())
        .sum()
}

/// One row per ClientHello, completed by the next ServerHello on the same
/// connection.
pub fn tls_connections(packets: &[ParsedPacket]) -> Vec<TlsConnection> {
    let mut rows: Vec<TlsConnection> = Vec::new();
    let mut pending: AHashMap<FlowKey, usize> = AHashMap::new();

    for pkt in packets {
        let Some((protocol, src, dst)) = packet_endpoints(pkt) else {
            continue;
        };
        let (key, _) = FlowKey::new(protocol, src, dst);
        if let Some(hello) = &pkt.tls_client_hello {
            pending.insert(key.clone(), rows.len());
            rows.push(TlsConnection {
                packet_index: pkt.index,
                client: src.to_string(),
                server: dst.to_string(),
                sni: hello.sni.clone(),
                client_version: tls::version_name(hello.version),
                server_version: None,
                cipher_suite: None,
            });
        }
        if let Some(hello) = &pkt.tls_server_hello {
            if let Some(slot) = pending.remove(&key) {
                rows[slot].server_version = Some(tls::version_name(hello.negotiated_version()));
                rows[slot].cipher_suite = Some(cipher_label(hello.cipher_suite));
            }
        }
    }
    rows
}

fn cipher_label(suite: u16) -> String {
    match tls::weak_cipher_name(suite) {
        Some(name) => name.to_string(),
        None => format!("0x{:04x}", suite),
    }
}

/// HTTP requests paired with responses in order on the same connection.
pub fn http_transactions(packets: &[ParsedPacket]) -> Vec<HttpTransaction> {
    let mut rows: Vec<HttpTransaction> = Vec::new();
    let mut pending: AHashMap<FlowKey, VecDeque<usize>> = AHashMap::new();

    for pkt in packets {
        let Some(http) = &pkt.http else { continue };
        let Some((protocol, src, dst)) = packet_endpoints(pkt) else {
            continue;
        };
        let (key, _) = FlowKey::new(protocol, src, dst);
        match &http.start {
            HttpStartLine::Request { method, uri, .. } => {
                pending.entry(key).or_default().push_back(rows.len());
                rows.push(HttpTransaction {
                    packet_index: pkt.index,
                    client: src.to_string(),
                    server: dst.to_string(),
                    method: method.clone(),
                    uri: uri.clone(),
                    host: http.header("host").map(str::to_string),
                    status_code: None,
                    status_text: None,
                    response_packet_index: None,
                });
            }
            HttpStartLine::Response {
                status_code, reason, ..
            } => {
                let Some(slot) = pending.get_mut(&key).and_then(|q| q.pop_front()) else {
                    tracing::trace!(index = pkt.index, "HTTP response without request");
                    continue;
                };
                rows[slot].status_code = Some(*status_code);
                rows[slot].status_text = Some(reason.clone());
                rows[slot].response_packet_index = Some(pkt.index);
            }
        }
    }
    rows
}
