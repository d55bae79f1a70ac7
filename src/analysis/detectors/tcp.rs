use super::{percent, route, DetectorContext};
use crate::analysis::finding::{Category, Finding, Severity};
use crate::analysis::stats::Tally;
use crate::flow::{packet_endpoints, Endpoint};
use crate::packet::ParsedPacket;
use crate::protocol::tcp::TcpLayer;
use ahash::AHashSet;

fn tcp_packets(packets: &[ParsedPacket]) -> impl Iterator<Item = (&ParsedPacket, &TcpLayer)> {
    packets
        .iter()
        .filter_map(|p| p.tcp.as_ref().map(|tcp| (p, tcp)))
}

pub fn resets(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut by_route = Tally::new();
    let mut affected = Vec::new();
    for (pkt, tcp) in tcp_packets(ctx.packets) {
        if tcp.flags.rst {
            by_route.add(route(pkt), pkt.index);
            affected.push(pkt.index);
        }
    }
    if affected.is_empty() {
        return Vec::new();
    }

    let count = affected.len();
    let severity = if count > cfg.reset_critical {
        Severity::Critical
    } else {
        Severity::Warning
    };
    let details = by_route
        .by_count()
        .into_iter()
        .map(|(r, hits)| format!("{}: {} reset(s)", r, hits.len()));
    vec![Finding::new(
        "tcp-resets",
        severity,
        Category::Performance,
        format!("{} TCP connection reset(s)", count),
    )
    .description(
        "Connections were aborted with RST segments. Resets point at closed ports, \
         crashed services, firewalls or load balancers dropping state.",
    )
    .details(details, cfg.max_details)
    .recommend(&[
        "Check that the services on the reset ports are listening",
        "Review firewall and load balancer idle timeouts",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn syn_flood(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut syns = Vec::new();
    let mut syn_acks = 0usize;
    for (pkt, tcp) in tcp_packets(ctx.packets) {
        if tcp.flags.is_bare_syn() {
            syns.push(pkt.index);
        } else if tcp.flags.is_syn_ack() {
            syn_acks += 1;
        }
    }

    let unanswered = syns.len().saturating_sub(syn_acks);
    if unanswered <= cfg.syn_flood_min_unanswered
        || (unanswered as f64) <= cfg.syn_flood_ratio * syn_acks as f64
    {
        return Vec::new();
    }
    vec![Finding::new(
        "tcp-syn-flood",
        Severity::Warning,
        Category::Security,
        format!("{} unanswered SYN segments", unanswered),
    )
    .description(
        "Far more connection attempts were started than were answered. \
         This matches a SYN flood or a server that cannot keep up.",
    )
    .details(
        [
            format!("SYN: {}", syns.len()),
            format!("SYN/ACK: {}", syn_acks),
            format!("Unanswered: {}", unanswered),
        ],
        cfg.max_details,
    )
    .recommend(&[
        "Enable SYN cookies on the targeted hosts",
        "Rate-limit new connections per source at the edge",
    ])
    .affected(&syns, cfg.max_affected_packets)]
}

pub fn zero_window(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut by_route = Tally::new();
    let mut affected = Vec::new();
    for (pkt, tcp) in tcp_packets(ctx.packets) {
        if tcp.window == 0 && !tcp.flags.rst {
            by_route.add(route(pkt), pkt.index);
            affected.push(pkt.index);
        }
    }
    if affected.is_empty() {
        return Vec::new();
    }
    let details = by_route
        .by_count()
        .into_iter()
        .map(|(r, hits)| format!("{}: {} zero-window segment(s)", r, hits.len()));
    vec![Finding::new(
        "tcp-zero-window",
        Severity::Warning,
        Category::Performance,
        format!("{} zero-window segment(s)", affected.len()),
    )
    .description(
        "A receiver advertised a zero window and stopped the sender. \
         The receiving application is not reading data fast enough.",
    )
    .details(details, cfg.max_details)
    .recommend(&[
        "Check CPU and memory pressure on the receiving host",
        "Increase socket receive buffers if the application is healthy",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn retransmissions(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut seen: AHashSet<(Endpoint, Endpoint, u32)> = AHashSet::new();
    let mut affected = Vec::new();
    let mut total = 0usize;
    for (pkt, tcp) in tcp_packets(ctx.packets) {
        total += 1;
        if tcp.payload_len == 0 {
            continue;
        }
        let Some((_, src, dst)) = packet_endpoints(pkt) else {
            continue;
        };
        if !seen.insert((src, dst, tcp.seq)) {
            affected.push(pkt.index);
        }
    }
    if affected.is_empty() {
        return Vec::new();
    }

    let rate = percent(affected.len(), total);
    let severity = if rate > cfg.retransmission_critical_pct {
        Severity::Critical
    } else if rate > cfg.retransmission_warning_pct {
        Severity::Warning
    } else {
        Severity::Info
    };
    vec![Finding::new(
        "tcp-retransmissions",
        severity,
        Category::Performance,
        format!("{:.2}% TCP retransmissions", rate),
    )
    .description(format!(
        "{} of {} TCP segments repeated a sequence number already sent with data. \
         Retransmissions mean packet loss or excessive delay on the path.",
        affected.len(),
        total
    ))
    .recommend(&[
        "Look for congested or lossy links between the endpoints",
        "Check interface error counters and duplex settings",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn small_windows(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut sample = 0usize;
    let mut small = Vec::new();
    for (pkt, tcp) in tcp_packets(ctx.packets) {
        if tcp.flags.rst {
            continue;
        }
        sample += 1;
        if tcp.window < cfg.small_window_bytes {
            small.push(pkt.index);
        }
    }
    let share = percent(small.len(), sample);
    if sample <= cfg.small_window_min_sample || share <= cfg.small_window_pct {
        return Vec::new();
    }
    vec![Finding::new(
        "tcp-small-windows",
        Severity::Warning,
        Category::Performance,
        format!("{:.1}% of TCP segments advertise small windows", share),
    )
    .description(format!(
        "{} of {} segments advertised a receive window below {} bytes, \
         which caps throughput on high-latency paths.",
        small.len(),
        sample,
        cfg.small_window_bytes
    ))
    .recommend(&[
        "Enable TCP window scaling on both endpoints",
        "Raise the receive buffer size of the affected application",
    ])
    .affected(&small, cfg.max_affected_packets)]
}
