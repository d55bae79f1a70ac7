//! Finding detectors.
//!
//! Each detector is a pure function over the decoded packets and the
//! connection table. They run in a fixed order so that findings of equal
//! severity come out in the same order on every run.

mod dns;
mod http;
mod network;
mod tcp;
mod tls;

use super::finding::{Category, Finding, Severity};
use crate::config::DetectorConfig;
use crate::flow::{packet_endpoints, ConnectionStats};
use crate::packet::ParsedPacket;
use crate::protocol::format_ip;

pub struct DetectorContext<'a> {
    pub packets: &'a [ParsedPacket],
    pub connections: &'a [ConnectionStats],
    pub config: &'a DetectorConfig,
}

pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// `src -> dst` for a TCP/UDP packet, bare addresses otherwise.
pub(crate) fn route(pkt: &ParsedPacket) -> String {
    if let Some((_, src, dst)) = packet_endpoints(pkt) {
        return format!("{} -> {}", src, dst);
    }
    match (pkt.src_ip(), pkt.dst_ip()) {
        (Some(src), Some(dst)) => format!("{} -> {}", format_ip(&src), format_ip(&dst)),
        _ => format!("packet #{}", pkt.index),
    }
}

pub type Detector = fn(&DetectorContext<'_>) -> Vec<Finding>;

/// Detectors in emission order.
const DETECTORS: &[(&str, Detector)] = &[
    ("tcp-resets", tcp::resets),
    ("tcp-syn-flood", tcp::syn_flood),
    ("tcp-zero-window", tcp::zero_window),
    ("tcp-retransmissions", tcp::retransmissions),
    ("dns-errors", dns::response_errors),
    ("dns-slow-responses", dns::slow_responses),
    ("dns-tunneling", dns::tunneling),
    ("tls-deprecated", tls::deprecated_versions),
    ("tls-weak-ciphers", tls::weak_ciphers),
    ("tls-alerts", tls::alerts),
    ("tls-missing-sni", tls::missing_sni),
    ("http-errors", http::error_statuses),
    ("cleartext-credentials", http::cleartext_credentials),
    ("port-scan", network::port_scan),
    ("arp-gratuitous-flood", network::gratuitous_arp),
    ("icmp", network::icmp_errors),
    ("ip-fragmentation", network::fragmentation),
    ("excessive-broadcast", network::broadcast),
    ("arp-ip-conflict", network::arp_conflicts),
    ("tcp-small-windows", tcp::small_windows),
    ("long-lived-connections", network::long_lived),
];

/// Run every detector, then the all-clear check. Output is in emission
/// order; the caller sorts.
pub fn run_all(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (name, detector) in DETECTORS {
        let found = detector(ctx);
        tracing::debug!(detector = name, findings = found.len(), "detector finished");
        findings.extend(found);
    }
    if let Some(ok) = no_major_issues(ctx, &findings) {
        findings.push(ok);
    }
    findings
}

fn no_major_issues(ctx: &DetectorContext<'_>, findings: &[Finding]) -> Option<Finding> {
    if ctx.packets.is_empty() || findings.iter().any(|f| f.severity.is_problem()) {
        return None;
    }
    Some(
        Finding::new(
            "no-major-issues",
            Severity::Success,
            Category::General,
            "No major issues detected",
        )
        .description(format!(
            "{} packets across {} connections were checked without critical or warning findings.",
            ctx.packets.len(),
            ctx.connections.len()
        )),
    )
}
